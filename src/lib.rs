//! # Perp Reconciler
//!
//! Signal-driven position reconciliation for perpetual futures
//! venues: a strategy periodically recomputes a desired exposure per
//! instrument, and the engine walks the observed venue position toward
//! it with minimal post-only orders, retrying transient venue failures
//! without duplicating work.
//!
//! ## Architecture
//!
//! - `config`: configuration loading and validation
//! - `exchange`: venue gateway trait, REST client, retry/rate-limit
//!   transport, and a scriptable mock
//! - `signal`: pluggable desired-exposure providers (mean reversion,
//!   benchmark-relative trend)
//! - `engine`: the reconciliation engine and its wall-clock scheduler

pub mod config;
pub mod engine;
pub mod exchange;
pub mod signal;

pub use config::Config;
