//! Trading signal providers.
//!
//! A provider is a pure function from candle history to a desired
//! signed notional exposure per instrument. Providers never talk to
//! the venue; the engine fetches candles and hands them over, so a
//! strategy can be swapped or tested without exchange connectivity.

mod mean_reversion;
mod trend;

pub use mean_reversion::MeanReversion;
pub use trend::Trend;

use crate::exchange::Candle;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Maps candle history to desired exposures on the signal-refresh
/// cadence.
///
/// `None` for a symbol means "no signal" (typically insufficient
/// history); the engine then keeps the previous desired exposure for
/// that symbol rather than defaulting to zero.
pub trait SignalProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Candle timeframe to fetch, in venue resolution units.
    fn resolution(&self) -> &str;

    /// History depth to fetch per symbol.
    fn candle_limit(&self) -> usize;

    /// Symbols required beyond the traded instruments (e.g. a trend
    /// benchmark). Never traded themselves.
    fn extra_symbols(&self) -> Vec<String> {
        Vec::new()
    }

    /// Compute desired signed notional per instrument from the full
    /// per-symbol candle set in one pass, so cross-sectional
    /// normalization sees every instrument consistently.
    fn desired_exposures(
        &self,
        candles: &HashMap<String, Vec<Candle>>,
    ) -> HashMap<String, Option<Decimal>>;
}

/// Indicator math runs in f64; decimal precision only matters once a
/// number becomes money at the engine boundary.
pub(crate) fn to_f64(value: Decimal) -> Option<f64> {
    value.to_f64().filter(|v| v.is_finite())
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Exponentially weighted moving average, seeded with the first value
/// (pandas `ewm(adjust=False)` convention).
pub(crate) fn ema(series: &[f64], span: usize) -> Vec<f64> {
    if series.is_empty() {
        return Vec::new();
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(series.len());
    let mut current = series[0];
    out.push(current);
    for &value in &series[1..] {
        current = alpha * value + (1.0 - alpha) * current;
        out.push(current);
    }
    out
}
