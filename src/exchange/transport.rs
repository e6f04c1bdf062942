//! Retry and rate-limit wrapper applied uniformly to venue calls.
//!
//! Every outbound call goes through [`Transport`]: wait for rate-limit
//! capacity, issue the call, retry transient failures up to a fixed
//! bound with a fixed backoff, surface the final failure to the
//! caller. Terminal failures do not consume retry budget.

use crate::exchange::error::GatewayError;
use crate::exchange::traits::ExecutionGateway;
use crate::exchange::types::{Candle, OrderId, OrderIntent, PositionRecord, Ticker};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Bounded retry with fixed inter-attempt delay.
///
/// Transient failures are logged and retried; terminal failures
/// surface immediately. The backoff sleep aborts promptly on shutdown.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    cancel: CancellationToken,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration, cancel: CancellationToken) -> Self {
        Self {
            max_attempts,
            backoff,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `call` up to `max_attempts` times.
    pub async fn run<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 1u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        op,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "venue call failed, retrying"
                    );
                    attempt += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(self.backoff) => {}
                        _ = self.cancel.cancelled() => return Err(e),
                    }
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(
                            op,
                            attempt,
                            max_attempts = self.max_attempts,
                            error = %e,
                            "venue call failed, retry budget exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Sliding-window rate limiter shared across instrument tasks.
///
/// This is the only cross-instrument shared mutable resource during a
/// reconciliation pass.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests as usize)),
        }
    }

    /// Whether a request may be sent right now.
    pub fn can_send(&self) -> bool {
        self.cleanup();
        self.timestamps.lock().len() < self.max_requests as usize
    }

    /// Record a sent request.
    pub fn record_send(&self) {
        self.cleanup();
        self.timestamps.lock().push_back(Instant::now());
    }

    /// Requests sent within the current window.
    pub fn current_count(&self) -> u32 {
        self.cleanup();
        self.timestamps.lock().len() as u32
    }

    /// Wait until a request may be sent, or shutdown is requested.
    pub async fn wait_for_capacity(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError> {
        while !self.can_send() {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                _ = cancel.cancelled() => return Err(GatewayError::Shutdown),
            }
        }
        Ok(())
    }

    fn cleanup(&self) {
        let cutoff = Instant::now() - self.window;
        let mut timestamps = self.timestamps.lock();
        while timestamps.front().is_some_and(|&t| t < cutoff) {
            timestamps.pop_front();
        }
    }
}

/// Gateway decorator applying the retry policy and rate limiter to
/// every capability uniformly.
pub struct Transport<G> {
    inner: Arc<G>,
    retry: RetryPolicy,
    limiter: Arc<RateLimiter>,
}

impl<G: ExecutionGateway> Transport<G> {
    pub fn new(inner: Arc<G>, retry: RetryPolicy, limiter: Arc<RateLimiter>) -> Self {
        Self {
            inner,
            retry,
            limiter,
        }
    }

    async fn call<T, F, Fut>(&self, op: &str, f: F) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.retry
            .run(op, || async {
                self.limiter
                    .wait_for_capacity(self.retry.cancel_token())
                    .await?;
                self.limiter.record_send();
                f().await
            })
            .await
    }
}

#[async_trait]
impl<G: ExecutionGateway> ExecutionGateway for Transport<G> {
    async fn cancel_all_orders(&self) -> Result<(), GatewayError> {
        self.call("cancel_all_orders", || self.inner.cancel_all_orders())
            .await
    }

    async fn fetch_positions(&self) -> Result<Vec<PositionRecord>, GatewayError> {
        self.call("fetch_positions", || self.inner.fetch_positions())
            .await
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, GatewayError> {
        self.call("fetch_ticker", || self.inner.fetch_ticker(symbol))
            .await
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        self.call("fetch_candles", || {
            self.inner.fetch_candles(symbol, resolution, limit)
        })
        .await
    }

    async fn submit_limit_order(&self, intent: &OrderIntent) -> Result<OrderId, GatewayError> {
        self.call("submit_limit_order", || {
            self.inner.submit_limit_order(intent)
        })
        .await
    }
}
