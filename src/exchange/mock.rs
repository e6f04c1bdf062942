//! In-memory gateway for tests and paper runs.
//!
//! Holds scriptable venue state (positions, tickers, candles), records
//! every submitted order, and supports failure injection per
//! operation so retry and isolation behavior can be exercised without
//! network I/O.

use crate::exchange::error::GatewayError;
use crate::exchange::traits::ExecutionGateway;
use crate::exchange::types::{Candle, OrderId, OrderIntent, PositionRecord, Ticker};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MockState {
    positions: Vec<PositionRecord>,
    tickers: HashMap<String, Ticker>,
    candles: HashMap<String, Vec<Candle>>,
    submitted: Vec<OrderIntent>,
    /// Remaining injected transient failures, keyed by operation name.
    transient_failures: HashMap<String, u32>,
    /// Symbols whose order submissions are rejected terminally.
    reject_symbols: HashSet<String>,
    calls: HashMap<String, u32>,
}

/// Scriptable [`ExecutionGateway`] over in-memory state.
#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<RwLock<MockState>>,
    order_ids: Arc<AtomicU64>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_positions(&self, positions: Vec<PositionRecord>) {
        self.state.write().await.positions = positions;
    }

    pub async fn set_ticker(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        self.state
            .write()
            .await
            .tickers
            .insert(symbol.to_string(), Ticker { bid, ask });
    }

    pub async fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.state
            .write()
            .await
            .candles
            .insert(symbol.to_string(), candles);
    }

    /// Fail the next `count` invocations of `op` transiently.
    pub async fn fail_transient(&self, op: &str, count: u32) {
        self.state
            .write()
            .await
            .transient_failures
            .insert(op.to_string(), count);
    }

    /// Reject order submissions for `symbol` terminally.
    pub async fn reject_orders_for(&self, symbol: &str) {
        self.state
            .write()
            .await
            .reject_symbols
            .insert(symbol.to_string());
    }

    /// Orders accepted so far, in submission order.
    pub async fn submitted_orders(&self) -> Vec<OrderIntent> {
        self.state.read().await.submitted.clone()
    }

    /// Total invocations of `op`, including failed ones.
    pub async fn call_count(&self, op: &str) -> u32 {
        self.state.read().await.calls.get(op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: &str) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        *state.calls.entry(op.to_string()).or_insert(0) += 1;
        if let Some(remaining) = state.transient_failures.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GatewayError::RateLimited);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionGateway for MockGateway {
    async fn cancel_all_orders(&self) -> Result<(), GatewayError> {
        self.enter("cancel_all_orders").await
    }

    async fn fetch_positions(&self) -> Result<Vec<PositionRecord>, GatewayError> {
        self.enter("fetch_positions").await?;
        Ok(self.state.read().await.positions.clone())
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, GatewayError> {
        self.enter("fetch_ticker").await?;
        self.state
            .read()
            .await
            .tickers
            .get(symbol)
            .cloned()
            .ok_or_else(|| GatewayError::rejected(format!("unknown market {symbol}")))
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        _resolution: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        self.enter("fetch_candles").await?;
        let state = self.state.read().await;
        let candles = state
            .candles
            .get(symbol)
            .cloned()
            .ok_or_else(|| GatewayError::rejected(format!("unknown market {symbol}")))?;
        let skip = candles.len().saturating_sub(limit);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn submit_limit_order(&self, intent: &OrderIntent) -> Result<OrderId, GatewayError> {
        self.enter("submit_limit_order").await?;
        let mut state = self.state.write().await;
        if state.reject_symbols.contains(&intent.symbol) {
            return Err(GatewayError::rejected("order rejected by venue rule"));
        }
        state.submitted.push(intent.clone());
        let id = self.order_ids.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OrderId(id.to_string()))
    }
}
