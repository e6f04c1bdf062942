//! Wall-clock boundary scheduling.
//!
//! Ticks are aligned to UTC minute boundaries (`minute % interval ==
//! 0`), not to process start, so a restarted process fires at the same
//! auditable times. The next fire instant is computed explicitly and
//! slept until, which avoids the drift and double-fire ambiguity of a
//! poll-and-modulo loop.

use crate::config::ScheduleConfig;
use crate::engine::Reconciler;
use crate::exchange::ExecutionGateway;
use crate::signal::SignalProvider;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Timelike, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Next instant strictly after `now` where `minute % interval_min == 0`
/// and seconds are zero. `interval_min` must divide 60.
pub fn next_boundary(now: DateTime<Utc>, interval_min: u32) -> DateTime<Utc> {
    let hour_start = now
        .duration_trunc(ChronoDuration::hours(1))
        .expect("hour truncation cannot overflow");
    let next_slot = (now.minute() / interval_min + 1) * interval_min;
    hour_start + ChronoDuration::minutes(next_slot as i64)
}

/// Whether a reconcile boundary is also a signal-refresh boundary.
pub fn is_refresh_boundary(at: DateTime<Utc>, refresh_interval_min: u32) -> bool {
    at.minute() % refresh_interval_min == 0
}

/// Drives the engine on two nested wall-clock cadences.
pub struct Scheduler<G> {
    engine: Arc<Reconciler<G>>,
    provider: Arc<dyn SignalProvider>,
    schedule: ScheduleConfig,
    cancel: CancellationToken,
}

impl<G: ExecutionGateway + 'static> Scheduler<G> {
    pub fn new(
        engine: Arc<Reconciler<G>>,
        provider: Arc<dyn SignalProvider>,
        schedule: ScheduleConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            provider,
            schedule,
            cancel,
        }
    }

    /// Run until shutdown. Never exits on its own: every tick error is
    /// caught, logged and followed by the next sleep.
    pub async fn run(&self) {
        info!(
            reconcile_min = self.schedule.reconcile_interval_min,
            refresh_min = self.schedule.signal_refresh_interval_min,
            strategy = self.provider.name(),
            "scheduler started"
        );

        // Desired exposure does not survive a restart; recompute it
        // up front instead of trading toward nothing until the next
        // refresh boundary.
        self.engine.refresh_signals(self.provider.as_ref()).await;

        loop {
            let now = Utc::now();
            let boundary = next_boundary(now, self.schedule.reconcile_interval_min);
            let wait = (boundary - now).to_std().unwrap_or_default();
            info!(at = %boundary.format("%H:%M"), "sleeping until next boundary");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.cancel.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
            }

            self.tick(boundary).await;
        }
    }

    /// One boundary firing: refresh signals on the coarser cadence,
    /// then reconcile.
    pub async fn tick(&self, boundary: DateTime<Utc>) {
        info!(at = %boundary.format("%H:%M"), "tick");

        if is_refresh_boundary(boundary, self.schedule.signal_refresh_interval_min) {
            self.engine.refresh_signals(self.provider.as_ref()).await;
        }

        if let Err(e) = self.engine.reconcile_once().await {
            error!(error = %e, "reconciliation cycle aborted, continuing");
        }
    }
}
