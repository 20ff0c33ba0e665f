//! Order gateway port.
//!
//! The engine assigns every order its `client_ref` before placing it, so a
//! placement that timed out can be looked up with [`OrderGateway::status`]
//! instead of being blindly retried.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::error::GatewayError;
use crate::domain::signal::Side;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub client_ref: String,
    pub instrument: String,
    pub side: Side,
    pub qty: u64,
    /// Last price the engine saw. Paper fills happen here; a live gateway
    /// may use it as a protection limit.
    pub reference_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_ref: String,
    pub fill_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderStatus {
    Filled(f64),
    Pending,
    Rejected,
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Places a market order and waits for the fill.
    async fn place(&self, request: &OrderRequest) -> Result<OrderAck, GatewayError>;

    /// Looks up an order by the ref the client assigned.
    async fn status(&self, order_ref: &str) -> Result<OrderStatus, GatewayError>;

    /// [`place`](Self::place) bounded by `timeout`.
    async fn place_timeout(
        &self,
        request: &OrderRequest,
        timeout: Duration,
    ) -> Result<OrderAck, GatewayError> {
        tokio::time::timeout(timeout, self.place(request))
            .await
            .map_err(|_| GatewayError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    /// [`status`](Self::status) bounded by `timeout`.
    async fn status_timeout(
        &self,
        order_ref: &str,
        timeout: Duration,
    ) -> Result<OrderStatus, GatewayError> {
        tokio::time::timeout(timeout, self.status(order_ref))
            .await
            .map_err(|_| GatewayError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })?
    }
}
