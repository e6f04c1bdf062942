//! Cross-sectional mean-reversion signal.
//!
//! Per symbol, score = mean(ln(close/open)) / mean(ln(high/low)) over
//! the window: recent drift normalized by intrabar range. Scores are
//! z-scored across all scored symbols in one pass and the desired
//! exposure leans against the move, clamped to the exposure cap.

use crate::exchange::Candle;
use crate::signal::{mean, to_f64, SignalProvider};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

pub struct MeanReversion {
    resolution: String,
    candle_limit: usize,
    /// Maximum absolute desired notional per instrument.
    exposure_cap: Decimal,
    /// Notional scale per unit of z-score.
    step: Decimal,
}

impl MeanReversion {
    pub fn new(resolution: String, candle_limit: usize, exposure_cap: Decimal, step: Decimal) -> Self {
        Self {
            resolution,
            candle_limit,
            exposure_cap,
            step,
        }
    }

    /// Drift/range score for one symbol, `None` on short or degenerate
    /// history.
    fn score(&self, candles: &[Candle]) -> Option<f64> {
        if candles.len() < self.candle_limit {
            return None;
        }
        let mut drifts = Vec::with_capacity(candles.len());
        let mut ranges = Vec::with_capacity(candles.len());
        for candle in candles {
            let open = to_f64(candle.open)?;
            let close = to_f64(candle.close)?;
            let high = to_f64(candle.high)?;
            let low = to_f64(candle.low)?;
            if open <= 0.0 || close <= 0.0 || high <= 0.0 || low <= 0.0 {
                return None;
            }
            drifts.push((close / open).ln());
            ranges.push((high / low).ln());
        }
        let drift = mean(&drifts);
        let range = mean(&ranges);
        if range <= 0.0 {
            // Perfectly flat window; no usable signal.
            return None;
        }
        Some(drift / range)
    }
}

impl SignalProvider for MeanReversion {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn resolution(&self) -> &str {
        &self.resolution
    }

    fn candle_limit(&self) -> usize {
        self.candle_limit
    }

    fn desired_exposures(
        &self,
        candles: &HashMap<String, Vec<Candle>>,
    ) -> HashMap<String, Option<Decimal>> {
        let mut out: HashMap<String, Option<Decimal>> = HashMap::new();
        let mut scored: Vec<(String, f64)> = Vec::new();

        for (symbol, history) in candles {
            match self.score(history) {
                Some(score) => scored.push((symbol.clone(), score)),
                None => {
                    debug!(%symbol, "insufficient history for mean-reversion score");
                    out.insert(symbol.clone(), None);
                }
            }
        }

        // Cross-sectional z-score over everything that scored. With a
        // degenerate cross-section (one symbol, identical scores) the
        // z-score is zero and the book goes flat.
        let scores: Vec<f64> = scored.iter().map(|(_, s)| *s).collect();
        let mu = mean(&scores);
        let var = mean(&scores.iter().map(|s| (s - mu).powi(2)).collect::<Vec<_>>());
        let sigma = var.sqrt();

        let cap = self.exposure_cap;
        for (symbol, score) in scored {
            let z = if sigma > 0.0 { (score - mu) / sigma } else { 0.0 };
            let raw = Decimal::from_f64(z).unwrap_or(Decimal::ZERO) * self.step * Decimal::TWO;
            let desired = (-raw).clamp(-cap, cap);
            out.insert(symbol, Some(desired.round_dp(2)));
        }
        out
    }
}
