//! Paper trading gateway: fills every order immediately at its reference
//! price and remembers it for status queries.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;

use crate::domain::error::GatewayError;
use crate::ports::order_gateway::{OrderAck, OrderGateway, OrderRequest, OrderStatus};

#[derive(Debug, Default)]
pub struct PaperGateway {
    fills: DashMap<String, OrderRequest>,
    latency: Option<Duration>,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every fill, to exercise timeouts.
    pub fn with_latency(latency: Duration) -> Self {
        PaperGateway {
            fills: DashMap::new(),
            latency: Some(latency),
        }
    }

    pub fn order_count(&self) -> usize {
        self.fills.len()
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn place(&self, request: &OrderRequest) -> Result<OrderAck, GatewayError> {
        if request.qty == 0 {
            return Err(GatewayError::Failure {
                reason: "quantity must be positive".into(),
            });
        }
        if !(request.reference_price.is_finite() && request.reference_price > 0.0) {
            return Err(GatewayError::Failure {
                reason: format!("no usable price for {}", request.instrument),
            });
        }
        // recorded first so a timed-out placement still shows as filled
        self.fills
            .insert(request.client_ref.clone(), request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(OrderAck {
            order_ref: request.client_ref.clone(),
            fill_price: request.reference_price,
        })
    }

    async fn status(&self, order_ref: &str) -> Result<OrderStatus, GatewayError> {
        self.fills
            .get(order_ref)
            .map(|fill| OrderStatus::Filled(fill.reference_price))
            .ok_or_else(|| GatewayError::UnknownOrder {
                order_ref: order_ref.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::Side;

    fn request(client_ref: &str, qty: u64, price: f64) -> OrderRequest {
        OrderRequest {
            client_ref: client_ref.into(),
            instrument: "NIFTY".into(),
            side: Side::Buy,
            qty,
            reference_price: price,
        }
    }

    #[tokio::test]
    async fn fills_at_reference_price() {
        let gateway = PaperGateway::new();
        let ack = gateway.place(&request("a", 5, 101.5)).await.unwrap();
        assert_eq!(ack.order_ref, "a");
        assert_eq!(ack.fill_price, 101.5);
        assert_eq!(gateway.status("a").await.unwrap(), OrderStatus::Filled(101.5));
        assert_eq!(gateway.order_count(), 1);
    }

    #[tokio::test]
    async fn unknown_order_status() {
        let gateway = PaperGateway::new();
        assert!(matches!(
            gateway.status("nope").await,
            Err(GatewayError::UnknownOrder { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_zero_quantity_and_bad_price() {
        let gateway = PaperGateway::new();
        assert!(gateway.place(&request("a", 0, 100.0)).await.is_err());
        assert!(gateway.place(&request("b", 1, f64::NAN)).await.is_err());
        assert_eq!(gateway.order_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fill_times_out_but_reconciles() {
        let gateway = PaperGateway::with_latency(Duration::from_secs(5));
        let err = gateway
            .place_timeout(&request("slow", 1, 100.0), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Timeout { timeout_ms: 100 });
        assert_eq!(
            gateway.status("slow").await.unwrap(),
            OrderStatus::Filled(100.0)
        );
    }
}
