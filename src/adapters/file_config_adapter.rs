//! INI configuration over `configparser`.
//!
//! Only `=` separates a key from its value, so `squareoff_time = 15:15`
//! keeps its colon. Section and key lookups ignore case. Typed getters trim
//! the raw text and fall back to the default when it is absent or does not
//! parse.

use configparser::ini::{Ini, IniDefault};
use std::path::Path;
use std::str::FromStr;

use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;

pub struct FileConfigAdapter {
    ini: Ini,
    source: String,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let source = path.as_ref().display().to_string();
        let mut ini = parser();
        match ini.load(path.as_ref()) {
            Ok(_) => Ok(FileConfigAdapter { ini, source }),
            Err(reason) => Err(EngineError::ConfigParse {
                file: source,
                reason,
            }),
        }
    }

    pub fn from_string(content: &str) -> Result<Self, EngineError> {
        let source = String::from("<string>");
        let mut ini = parser();
        match ini.read(content.to_string()) {
            Ok(_) => Ok(FileConfigAdapter { ini, source }),
            Err(reason) => Err(EngineError::ConfigParse {
                file: source,
                reason,
            }),
        }
    }

    /// File path, or `<string>` for inline content.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Sections present that are not in `known`, sorted.
    pub fn unknown_sections(&self, known: &[&str]) -> Vec<String> {
        let mut unknown: Vec<String> = self
            .ini
            .sections()
            .into_iter()
            .filter(|s| !known.contains(&s.as_str()))
            .collect();
        unknown.sort();
        unknown
    }

    fn parsed<T: FromStr>(&self, section: &str, key: &str) -> Option<T> {
        self.get_string(section, key)?.trim().parse().ok()
    }
}

fn parser() -> Ini {
    let mut defaults = IniDefault::default();
    defaults.delimiters = vec!['='];
    Ini::new_from_defaults(defaults)
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.parsed(section, key).unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.parsed::<f64>(section, key)
            .filter(|v| v.is_finite())
            .unwrap_or(default)
    }

    /// Accepts true/yes/on/1 and false/no/off/0 in any case.
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .getboolcoerce(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "
[risk]
tp_pct = 0.05
squareoff_time = 15:15
allow_shorting = off

[session]
timeframes = 5, 15

[engine]
lane_capacity = 64
event_capacity = lots
";

    fn sample() -> FileConfigAdapter {
        FileConfigAdapter::from_string(SAMPLE).unwrap()
    }

    #[test]
    fn colon_in_value_is_kept() {
        let adapter = sample();
        assert_eq!(
            adapter.get_string("risk", "squareoff_time").as_deref(),
            Some("15:15")
        );
        assert_eq!(
            adapter.get_string("session", "timeframes").as_deref(),
            Some("5, 15")
        );
        assert_eq!(adapter.get_string("risk", "missing"), None);
        assert_eq!(adapter.get_string("nowhere", "tp_pct"), None);
    }

    #[test]
    fn typed_getters_fall_back_on_garbage() {
        let adapter = sample();
        assert_eq!(adapter.get_int("engine", "lane_capacity", 0), 64);
        assert_eq!(adapter.get_int("engine", "event_capacity", 42), 42);
        assert_eq!(adapter.get_int("engine", "missing", 7), 7);
        assert_eq!(adapter.get_double("risk", "tp_pct", 0.0), 0.05);
        assert_eq!(adapter.get_double("engine", "event_capacity", 1.5), 1.5);
    }

    #[test]
    fn non_finite_double_uses_default() {
        let adapter = FileConfigAdapter::from_string("[signal]\nrsi_buy_threshold = inf\n").unwrap();
        assert_eq!(adapter.get_double("signal", "rsi_buy_threshold", 60.0), 60.0);
    }

    #[test]
    fn booleans_coerce() {
        let adapter = FileConfigAdapter::from_string(
            "[risk]\na = true\nb = Yes\nc = 1\nd = off\ne = NO\nf = maybe\n",
        )
        .unwrap();
        assert!(adapter.get_bool("risk", "a", false));
        assert!(adapter.get_bool("risk", "b", false));
        assert!(adapter.get_bool("risk", "c", false));
        assert!(!adapter.get_bool("risk", "d", true));
        assert!(!adapter.get_bool("risk", "e", true));
        assert!(adapter.get_bool("risk", "f", true));
        assert!(!sample().get_bool("risk", "allow_shorting", true));
    }

    #[test]
    fn lookups_ignore_case() {
        let adapter = FileConfigAdapter::from_string("[Risk]\nTP_PCT = 0.05\n").unwrap();
        assert_eq!(adapter.get_double("risk", "tp_pct", 0.0), 0.05);
    }

    #[test]
    fn unknown_sections_are_listed() {
        let adapter = FileConfigAdapter::from_string(
            "[risk]\ntp_pct = 0.05\n[zeta]\nx = 1\n[alpha]\ny = 2\n",
        )
        .unwrap();
        assert_eq!(
            adapter.unknown_sections(&["risk", "session"]),
            vec!["alpha".to_string(), "zeta".to_string()]
        );
        assert!(sample()
            .unknown_sections(&["risk", "session", "engine"])
            .is_empty());
    }

    #[test]
    fn file_source_is_recorded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway]\ntimeout_ms = 1500").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_int("gateway", "timeout_ms", 0), 1500);
        assert_eq!(adapter.source(), file.path().display().to_string());
        assert_eq!(sample().source(), "<string>");
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let err = FileConfigAdapter::from_file("/nonexistent/lanetrader.ini")
            .err()
            .unwrap();
        assert!(matches!(
            err,
            EngineError::ConfigParse { ref file, .. } if file == "/nonexistent/lanetrader.ini"
        ));
    }
}
