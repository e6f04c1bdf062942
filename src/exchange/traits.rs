//! Venue-agnostic execution gateway capability trait.
//!
//! One method per venue operation, with explicit types throughout.
//! Every call is idempotent-safe to retry: either the venue
//! acknowledges (cancel done, order id returned) or the call failed
//! as a whole and may be re-issued.

use crate::exchange::error::GatewayError;
use crate::exchange::types::{Candle, OrderId, OrderIntent, PositionRecord, Ticker};
use async_trait::async_trait;

/// Outbound capability set against a single perpetuals venue.
///
/// Implementations classify every failure as transient or terminal via
/// [`GatewayError::is_transient`]; the transport retry policy and the
/// reconciliation engine rely on that split.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Cancel every resting order on the (sub)account.
    async fn cancel_all_orders(&self) -> Result<(), GatewayError>;

    /// Fetch all open position records, signed contracts per record.
    async fn fetch_positions(&self) -> Result<Vec<PositionRecord>, GatewayError>;

    /// Fetch the current best bid/ask for one instrument.
    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, GatewayError>;

    /// Fetch up to `limit` historical candles, oldest first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError>;

    /// Submit a post-only limit order. A post-only rejection (the
    /// order would have crossed the spread) surfaces as
    /// [`GatewayError::Rejected`].
    async fn submit_limit_order(&self, intent: &OrderIntent) -> Result<OrderId, GatewayError>;
}
