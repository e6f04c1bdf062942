//! Configuration for the reconciliation engine.
//!
//! Loaded once at startup from an optional config file plus
//! `PR__`-prefixed environment variables; never reloaded.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Venue credentials and endpoint
    #[serde(default)]
    pub venue: VenueConfig,
    /// Instruments to reconcile, fixed for the process lifetime
    #[serde(default = "default_instruments")]
    pub instruments: Vec<String>,
    /// Reconciliation engine parameters
    #[serde(default)]
    pub engine: EngineConfig,
    /// Wall-clock scheduling cadences
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Signal strategy selection and parameters
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Log output settings
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Subaccount to trade under, if any
    #[serde(default)]
    pub subaccount: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-cycle cap on one order's notional (rate of position change)
    #[serde(default = "default_max_order_notional")]
    pub max_order_notional: Decimal,
    /// Venue minimum order notional; smaller deltas are skipped
    #[serde(default = "default_min_order_notional")]
    pub min_order_notional: Decimal,
    /// Bound on concurrent per-instrument reconcile tasks
    #[serde(default = "default_max_concurrent_instruments")]
    pub max_concurrent_instruments: usize,
    /// Attempts per venue call before abandoning
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Fixed delay between attempts
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Venue request budget per minute (shared across instruments)
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Reconcile when minute % interval == 0
    #[serde(default = "default_reconcile_interval_min")]
    pub reconcile_interval_min: u32,
    /// Refresh signals when minute % interval == 0 (coarser cadence)
    #[serde(default = "default_signal_refresh_interval_min")]
    pub signal_refresh_interval_min: u32,
}

/// Which signal provider drives desired exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    MeanReversion,
    Trend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_strategy_kind")]
    pub kind: StrategyKind,
    /// Candle resolution in venue units (seconds)
    #[serde(default = "default_resolution")]
    pub resolution: String,
    /// History depth fetched per symbol
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,
    /// Maximum absolute desired notional per instrument
    #[serde(default = "default_exposure_cap")]
    pub exposure_cap: Decimal,
    /// Mean-reversion notional scale per unit of z-score
    #[serde(default = "default_step")]
    pub step: Decimal,
    /// Trend benchmark symbol
    #[serde(default = "default_benchmark")]
    pub benchmark: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory for append-only log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

// Default value functions

fn default_instruments() -> Vec<String> {
    vec!["BTC-PERP".to_string(), "ETH-PERP".to_string()]
}

fn default_base_url() -> String {
    "https://api.example-derivatives.com".to_string()
}

fn default_max_order_notional() -> Decimal {
    Decimal::new(50, 0) // $50 notional change per cycle
}

fn default_min_order_notional() -> Decimal {
    Decimal::new(1, 0)
}

fn default_max_concurrent_instruments() -> usize {
    4
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_rate_limit_per_minute() -> u32 {
    120
}

fn default_reconcile_interval_min() -> u32 {
    15
}

fn default_signal_refresh_interval_min() -> u32 {
    60
}

fn default_strategy_kind() -> StrategyKind {
    StrategyKind::MeanReversion
}

fn default_resolution() -> String {
    "900".to_string() // 15m candles
}

fn default_candle_limit() -> usize {
    20
}

fn default_exposure_cap() -> Decimal {
    Decimal::new(100, 0)
}

fn default_step() -> Decimal {
    Decimal::new(50, 0)
}

fn default_benchmark() -> String {
    "BTC-PERP".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Config {
    /// Load configuration from an optional file plus environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = config::File::with_name(path.unwrap_or("reconciler")).required(path.is_some());
        let config = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::default().separator("__").prefix("PR"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values. Fatal at startup on failure.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.instruments.is_empty(), "instrument list is empty");

        anyhow::ensure!(
            self.engine.max_order_notional > Decimal::ZERO,
            "max_order_notional must be positive"
        );

        anyhow::ensure!(
            self.engine.min_order_notional >= Decimal::ZERO
                && self.engine.min_order_notional <= self.engine.max_order_notional,
            "min_order_notional must be between 0 and max_order_notional"
        );

        anyhow::ensure!(
            self.engine.retry_attempts >= 1,
            "retry_attempts must be at least 1"
        );

        anyhow::ensure!(
            self.engine.max_concurrent_instruments >= 1,
            "max_concurrent_instruments must be at least 1"
        );

        let reconcile = self.schedule.reconcile_interval_min;
        let refresh = self.schedule.signal_refresh_interval_min;
        anyhow::ensure!(
            (1..=60).contains(&reconcile) && 60 % reconcile == 0,
            "reconcile_interval_min must divide 60"
        );
        anyhow::ensure!(
            (reconcile..=60).contains(&refresh) && 60 % refresh == 0 && refresh % reconcile == 0,
            "signal_refresh_interval_min must divide 60 and be a multiple of reconcile_interval_min"
        );

        anyhow::ensure!(
            self.strategy.exposure_cap > Decimal::ZERO,
            "exposure_cap must be positive"
        );

        anyhow::ensure!(self.strategy.candle_limit >= 2, "candle_limit too small");

        // The trend benchmark is a reference series, not a tradeable
        // target; an overlap would leave that instrument signal-less
        // forever.
        if self.strategy.kind == StrategyKind::Trend {
            anyhow::ensure!(
                !self.instruments.contains(&self.strategy.benchmark),
                "trend benchmark must not be a reconciled instrument"
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            venue: VenueConfig::default(),
            instruments: default_instruments(),
            engine: EngineConfig::default(),
            schedule: ScheduleConfig::default(),
            strategy: StrategyConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            subaccount: None,
            base_url: default_base_url(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_order_notional: default_max_order_notional(),
            min_order_notional: default_min_order_notional(),
            max_concurrent_instruments: default_max_concurrent_instruments(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_min: default_reconcile_interval_min(),
            signal_refresh_interval_min: default_signal_refresh_interval_min(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: default_strategy_kind(),
            resolution: default_resolution(),
            candle_limit: default_candle_limit(),
            exposure_cap: default_exposure_cap(),
            step: default_step(),
            benchmark: default_benchmark(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_instruments_rejected() {
        let mut config = Config::default();
        config.instruments.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_misaligned_intervals_rejected() {
        let mut config = Config::default();
        config.schedule.reconcile_interval_min = 7; // does not divide 60
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.schedule.signal_refresh_interval_min = 20; // not a multiple of 15
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trend_benchmark_overlapping_instruments_rejected() {
        let mut config = Config::default();
        config.strategy.kind = StrategyKind::Trend;
        // Default instruments include the default benchmark BTC-PERP.
        assert!(config.validate().is_err());

        config.instruments = vec!["ETH-PERP".to_string(), "SOL-PERP".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_notional_above_max_rejected() {
        let mut config = Config::default();
        config.engine.min_order_notional = config.engine.max_order_notional + Decimal::ONE;
        assert!(config.validate().is_err());
    }
}
