use clap::Parser;
use lanetrader::cli::{run, Cli};
use lanetrader::logging;

fn main() -> std::process::ExitCode {
    logging::init();
    run(Cli::parse())
}
