//! Venue connectivity.
//!
//! The engine only sees the [`ExecutionGateway`] capability trait; the
//! REST client, the retry/rate-limit transport, and the test mock all
//! implement it.

mod client;
mod error;
pub mod mock;
mod traits;
mod transport;
mod types;

pub use client::RestGateway;
pub use error::GatewayError;
pub use mock::MockGateway;
pub use traits::ExecutionGateway;
pub use transport::{RateLimiter, RetryPolicy, Transport};
pub use types::*;
