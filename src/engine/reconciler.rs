//! The reconciliation engine.
//!
//! Holds the desired-exposure map and, once per cycle, drives every
//! configured instrument from observed venue exposure toward its
//! target with one minimal post-only order. Instruments are processed
//! independently: one failing never aborts the others. Nothing but the
//! desired map survives a cycle, so an abandoned order is naturally
//! retried next cycle at a fresh price.

use crate::config::EngineConfig;
use crate::exchange::{
    ExecutionGateway, GatewayError, OrderId, OrderIntent, OrderSide, PositionRecord, Ticker,
};
use crate::signal::SignalProvider;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Why an instrument was left alone this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No desired exposure has ever been computed for the symbol.
    NoTarget,
    /// Observed exposure already matches the target.
    OnTarget,
    /// Delta is below the venue minimum notional.
    BelowMinNotional,
    /// The passive side of the book carries no usable quote.
    NoQuote,
}

/// Terminal state of one instrument-cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentOutcome {
    Submitted {
        intent: OrderIntent,
        order_id: OrderId,
    },
    Skipped(SkipReason),
    Failed,
}

/// Per-cycle report over all instruments.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub outcomes: Vec<(String, InstrumentOutcome)>,
}

impl CycleReport {
    pub fn outcome(&self, symbol: &str) -> Option<&InstrumentOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, o)| o)
    }

    pub fn submitted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, InstrumentOutcome::Submitted { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, InstrumentOutcome::Failed))
            .count()
    }
}

/// What one reconciliation pass decided for an instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderPlan {
    Submit(OrderIntent),
    Skip(SkipReason),
}

/// Compute the minimal corrective order for one instrument.
///
/// `delta = desired − observed` in notional terms; the order side
/// always matches the sign of the delta, the notional is clamped to
/// the per-cycle maximum, and the price is the passive side of the
/// book (bid for buys, ask for sells) for post-only submission.
pub fn plan_order(
    symbol: &str,
    desired: Decimal,
    observed_notional: Decimal,
    ticker: &Ticker,
    max_order_notional: Decimal,
    min_order_notional: Decimal,
) -> OrderPlan {
    let delta = desired - observed_notional;
    if delta.is_zero() {
        return OrderPlan::Skip(SkipReason::OnTarget);
    }

    let (side, price) = if delta > Decimal::ZERO {
        (OrderSide::Buy, ticker.bid)
    } else {
        (OrderSide::Sell, ticker.ask)
    };
    // An empty book side quotes as zero; there is nothing to rest
    // against and the size division below would be undefined.
    if price <= Decimal::ZERO {
        return OrderPlan::Skip(SkipReason::NoQuote);
    }

    let notional = delta.abs().min(max_order_notional);
    if notional < min_order_notional {
        return OrderPlan::Skip(SkipReason::BelowMinNotional);
    }

    OrderPlan::Submit(OrderIntent {
        symbol: symbol.to_string(),
        side,
        price,
        size: (notional / price).round_dp(6),
    })
}

/// Sum signed position sizes per symbol.
pub fn observed_contracts(positions: &[PositionRecord]) -> HashMap<String, Decimal> {
    let mut out: HashMap<String, Decimal> = HashMap::new();
    for record in positions {
        *out.entry(record.symbol.clone()).or_insert(Decimal::ZERO) += record.net_size;
    }
    out
}

/// Signal-driven position reconciliation engine.
pub struct Reconciler<G> {
    gateway: Arc<G>,
    instruments: Vec<String>,
    config: EngineConfig,
    /// Desired signed notional per instrument. Replaced wholesale on
    /// signal refresh; reconcile passes read an `Arc` snapshot.
    desired: RwLock<Arc<HashMap<String, Decimal>>>,
}

impl<G: ExecutionGateway + 'static> Reconciler<G> {
    pub fn new(gateway: Arc<G>, instruments: Vec<String>, config: EngineConfig) -> Self {
        Self {
            gateway,
            instruments,
            config,
            desired: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Current desired exposure for a symbol, if one has been set.
    pub fn desired_exposure(&self, symbol: &str) -> Option<Decimal> {
        self.desired.read().get(symbol).copied()
    }

    fn desired_snapshot(&self) -> Arc<HashMap<String, Decimal>> {
        self.desired.read().clone()
    }

    /// Refresh desired exposures from the signal provider.
    ///
    /// Fetches candle history for the instruments plus any provider
    /// extras; a failed fetch or a "no signal" result leaves that
    /// symbol's previous target untouched. The map is swapped in as a
    /// whole so a concurrent reader never sees a torn update.
    pub async fn refresh_signals(&self, provider: &dyn SignalProvider) -> usize {
        let mut symbols = self.instruments.clone();
        for extra in provider.extra_symbols() {
            if !symbols.contains(&extra) {
                symbols.push(extra);
            }
        }

        let mut candles = HashMap::new();
        for symbol in &symbols {
            match self
                .gateway
                .fetch_candles(symbol, provider.resolution(), provider.candle_limit())
                .await
            {
                Ok(history) => {
                    candles.insert(symbol.clone(), history);
                }
                Err(e) => {
                    warn!(%symbol, error = %e, "candle fetch failed, keeping previous target");
                }
            }
        }

        let computed = provider.desired_exposures(&candles);
        let mut next: HashMap<String, Decimal> = (*self.desired_snapshot()).clone();
        let mut updated = 0;
        for symbol in &self.instruments {
            match computed.get(symbol) {
                Some(Some(target)) => {
                    next.insert(symbol.clone(), *target);
                    updated += 1;
                }
                _ => {
                    info!(%symbol, strategy = provider.name(), "no signal, keeping previous target");
                }
            }
        }
        *self.desired.write() = Arc::new(next);
        info!(strategy = provider.name(), updated, "signal refresh complete");
        updated
    }

    /// Run one reconciliation cycle over all instruments.
    ///
    /// Cancel-all and the position fetch are cycle-level: their
    /// failure (after transport retries) aborts the whole cycle. From
    /// there each instrument runs independently under a concurrency
    /// bound.
    pub async fn reconcile_once(&self) -> Result<CycleReport, GatewayError> {
        self.gateway.cancel_all_orders().await?;
        let positions = self.gateway.fetch_positions().await?;
        let contracts = observed_contracts(&positions);
        let desired = self.desired_snapshot();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_instruments));
        let mut tasks: JoinSet<(String, InstrumentOutcome)> = JoinSet::new();

        for symbol in &self.instruments {
            let gateway = self.gateway.clone();
            let semaphore = semaphore.clone();
            let symbol = symbol.clone();
            let target = desired.get(&symbol).copied();
            let contracts = contracts.get(&symbol).copied().unwrap_or(Decimal::ZERO);
            let max_notional = self.config.max_order_notional;
            let min_notional = self.config.min_order_notional;

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                let outcome = reconcile_instrument(
                    gateway.as_ref(),
                    &symbol,
                    target,
                    contracts,
                    max_notional,
                    min_notional,
                )
                .await;
                (symbol, outcome)
            });
        }

        let mut report = CycleReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, outcome)) => report.outcomes.push((symbol, outcome)),
                Err(e) => error!(error = %e, "instrument task aborted"),
            }
        }

        info!(
            submitted = report.submitted(),
            failed = report.failed(),
            total = report.outcomes.len(),
            "reconciliation cycle complete"
        );
        Ok(report)
    }
}

/// Reconcile a single instrument. All errors end here: the outcome is
/// reported, never propagated, so sibling instruments proceed.
async fn reconcile_instrument<G: ExecutionGateway>(
    gateway: &G,
    symbol: &str,
    target: Option<Decimal>,
    contracts: Decimal,
    max_order_notional: Decimal,
    min_order_notional: Decimal,
) -> InstrumentOutcome {
    let Some(desired) = target else {
        info!(%symbol, "no desired exposure yet, skipping");
        return InstrumentOutcome::Skipped(SkipReason::NoTarget);
    };

    let ticker = match gateway.fetch_ticker(symbol).await {
        Ok(ticker) => ticker,
        Err(e) => {
            error!(%symbol, error = %e, "ticker fetch failed, abandoning instrument this cycle");
            return InstrumentOutcome::Failed;
        }
    };

    let observed = contracts * ticker.mid();
    info!(
        %symbol,
        desired = %desired,
        observed = %observed.round_dp(2),
        "position summary"
    );

    match plan_order(
        symbol,
        desired,
        observed,
        &ticker,
        max_order_notional,
        min_order_notional,
    ) {
        OrderPlan::Skip(SkipReason::NoQuote) => {
            warn!(%symbol, "no passive quote to price against, skipping");
            InstrumentOutcome::Skipped(SkipReason::NoQuote)
        }
        OrderPlan::Skip(reason) => {
            info!(%symbol, ?reason, "skipping");
            InstrumentOutcome::Skipped(reason)
        }
        OrderPlan::Submit(intent) => match gateway.submit_limit_order(&intent).await {
            Ok(order_id) => {
                info!(
                    %symbol,
                    side = %intent.side,
                    price = %intent.price,
                    size = %intent.size,
                    %order_id,
                    "order submitted"
                );
                InstrumentOutcome::Submitted { intent, order_id }
            }
            Err(e) if e.is_transient() => {
                error!(%symbol, error = %e, "submission abandoned this cycle");
                InstrumentOutcome::Failed
            }
            Err(e) => {
                // Expected for post-only orders that would cross; the
                // next cycle recomputes at a fresh price.
                info!(%symbol, error = %e, "order rejected by venue");
                InstrumentOutcome::Failed
            }
        },
    }
}
