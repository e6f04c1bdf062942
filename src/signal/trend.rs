//! Benchmark-relative trend signal.
//!
//! MACD (fast EMA minus slow EMA) of ln(close / benchmark close),
//! aligned by candle timestamp. A positive MACD means the instrument
//! is outperforming the benchmark: go long the full exposure amount,
//! otherwise short it.

use crate::exchange::Candle;
use crate::signal::{ema, to_f64, SignalProvider};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

const FAST_SPAN: usize = 12;
const SLOW_SPAN: usize = 26;

pub struct Trend {
    resolution: String,
    candle_limit: usize,
    benchmark: String,
    /// Notional amount taken long or short per instrument.
    exposure: Decimal,
}

impl Trend {
    /// The benchmark is a reference series only: it never receives a
    /// desired exposure of its own, so it must not appear in the
    /// reconciled instrument list ([`crate::Config::validate`] rejects
    /// the overlap).
    pub fn new(resolution: String, candle_limit: usize, benchmark: String, exposure: Decimal) -> Self {
        Self {
            resolution,
            candle_limit,
            benchmark,
            exposure,
        }
    }

    /// ln(close/benchmark close) series over timestamp-aligned candles.
    fn relative_series(symbol_candles: &[Candle], benchmark_close: &HashMap<i64, f64>) -> Vec<f64> {
        symbol_candles
            .iter()
            .filter_map(|candle| {
                let close = to_f64(candle.close)?;
                let bench = benchmark_close.get(&candle.timestamp)?;
                if close <= 0.0 || *bench <= 0.0 {
                    return None;
                }
                Some((close / bench).ln())
            })
            .collect()
    }
}

impl SignalProvider for Trend {
    fn name(&self) -> &'static str {
        "trend"
    }

    fn resolution(&self) -> &str {
        &self.resolution
    }

    fn candle_limit(&self) -> usize {
        self.candle_limit
    }

    fn extra_symbols(&self) -> Vec<String> {
        vec![self.benchmark.clone()]
    }

    fn desired_exposures(
        &self,
        candles: &HashMap<String, Vec<Candle>>,
    ) -> HashMap<String, Option<Decimal>> {
        let mut out: HashMap<String, Option<Decimal>> = HashMap::new();

        let benchmark_close: HashMap<i64, f64> = match candles.get(&self.benchmark) {
            Some(bench) => bench
                .iter()
                .filter_map(|c| Some((c.timestamp, to_f64(c.close)?)))
                .collect(),
            None => {
                debug!(benchmark = %self.benchmark, "benchmark candles missing, no trend signal");
                for symbol in candles.keys() {
                    out.insert(symbol.clone(), None);
                }
                return out;
            }
        };

        for (symbol, history) in candles {
            if symbol == &self.benchmark {
                continue;
            }
            let series = Self::relative_series(history, &benchmark_close);
            if series.len() < SLOW_SPAN {
                debug!(%symbol, aligned = series.len(), "insufficient history for MACD");
                out.insert(symbol.clone(), None);
                continue;
            }
            let fast = ema(&series, FAST_SPAN);
            let slow = ema(&series, SLOW_SPAN);
            let macd = fast.last().copied().unwrap_or(0.0) - slow.last().copied().unwrap_or(0.0);
            let desired = if macd > 0.0 {
                self.exposure
            } else {
                -self.exposure
            };
            out.insert(symbol.clone(), Some(desired));
        }
        out
    }
}
