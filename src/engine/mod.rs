//! Reconciliation engine and its scheduler.

mod reconciler;
mod scheduler;

pub use reconciler::{
    observed_contracts, plan_order, CycleReport, InstrumentOutcome, OrderPlan, Reconciler,
    SkipReason,
};
pub use scheduler::{is_refresh_boundary, next_boundary, Scheduler};

#[cfg(test)]
mod cycle_tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::exchange::{MockGateway, PositionRecord, RateLimiter, RetryPolicy, Transport};
    use crate::signal::SignalProvider;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Provider returning fixed targets, for driving the engine
    /// without real candle math.
    struct FixedProvider {
        targets: HashMap<String, Option<Decimal>>,
    }

    impl FixedProvider {
        fn new(targets: &[(&str, Option<Decimal>)]) -> Self {
            Self {
                targets: targets
                    .iter()
                    .map(|(s, t)| (s.to_string(), *t))
                    .collect(),
            }
        }
    }

    impl SignalProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn resolution(&self) -> &str {
            "900"
        }
        fn candle_limit(&self) -> usize {
            1
        }
        fn desired_exposures(
            &self,
            _candles: &HashMap<String, Vec<crate::exchange::Candle>>,
        ) -> HashMap<String, Option<Decimal>> {
            self.targets.clone()
        }
    }

    fn engine_over(
        mock: &MockGateway,
        instruments: &[&str],
    ) -> Reconciler<Transport<MockGateway>> {
        let retry = RetryPolicy::new(3, Duration::from_millis(1), CancellationToken::new());
        let limiter = Arc::new(RateLimiter::new(10_000, Duration::from_secs(60)));
        let transport = Transport::new(Arc::new(mock.clone()), retry, limiter);
        Reconciler::new(
            Arc::new(transport),
            instruments.iter().map(|s| s.to_string()).collect(),
            EngineConfig::default(),
        )
    }

    async fn set_target(
        engine: &Reconciler<Transport<MockGateway>>,
        symbol: &str,
        target: Decimal,
    ) {
        let provider = FixedProvider::new(&[(symbol, Some(target))]);
        engine.refresh_signals(&provider).await;
    }

    #[tokio::test]
    async fn test_skip_when_no_target_set() {
        let mock = MockGateway::new();
        mock.set_ticker("A-PERP", dec!(10), dec!(10.1)).await;
        let engine = engine_over(&mock, &["A-PERP"]);

        let report = engine.reconcile_once().await.unwrap();
        assert_eq!(
            report.outcome("A-PERP"),
            Some(&InstrumentOutcome::Skipped(SkipReason::NoTarget))
        );
        assert!(mock.submitted_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_on_target_submits_nothing() {
        let mock = MockGateway::new();
        mock.set_ticker("A-PERP", dec!(10), dec!(10)).await;
        // 4 contracts at mid 10 = 40 notional, matching the target.
        mock.set_positions(vec![PositionRecord {
            symbol: "A-PERP".to_string(),
            net_size: dec!(4),
        }])
        .await;
        let engine = engine_over(&mock, &["A-PERP"]);
        set_target(&engine, "A-PERP", dec!(40)).await;

        let report = engine.reconcile_once().await.unwrap();
        assert_eq!(
            report.outcome("A-PERP"),
            Some(&InstrumentOutcome::Skipped(SkipReason::OnTarget))
        );
        assert!(mock.submitted_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_book_side_reported_as_skipped() {
        let mock = MockGateway::new();
        // Bid-less market: a buy toward the target has no quote to
        // rest against.
        mock.set_ticker("A-PERP", dec!(0), dec!(10)).await;
        let engine = engine_over(&mock, &["A-PERP"]);
        set_target(&engine, "A-PERP", dec!(100)).await;

        let report = engine.reconcile_once().await.unwrap();
        assert_eq!(
            report.outcome("A-PERP"),
            Some(&InstrumentOutcome::Skipped(SkipReason::NoQuote))
        );
        assert!(mock.submitted_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_submission_retried_then_accepted() {
        let mock = MockGateway::new();
        mock.set_ticker("A-PERP", dec!(10), dec!(10.1)).await;
        mock.fail_transient("submit_limit_order", 2).await;
        let engine = engine_over(&mock, &["A-PERP"]);
        set_target(&engine, "A-PERP", dec!(100)).await;

        let report = engine.reconcile_once().await.unwrap();
        assert!(matches!(
            report.outcome("A-PERP"),
            Some(InstrumentOutcome::Submitted { .. })
        ));
        // Two transient failures then the accepted attempt.
        assert_eq!(mock.call_count("submit_limit_order").await, 3);
        assert_eq!(mock.submitted_orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_abandons_instrument() {
        let mock = MockGateway::new();
        mock.set_ticker("A-PERP", dec!(10), dec!(10.1)).await;
        mock.fail_transient("submit_limit_order", 3).await;
        let engine = engine_over(&mock, &["A-PERP"]);
        set_target(&engine, "A-PERP", dec!(100)).await;

        let report = engine.reconcile_once().await.unwrap();
        assert_eq!(report.outcome("A-PERP"), Some(&InstrumentOutcome::Failed));
        assert_eq!(mock.call_count("submit_limit_order").await, 3);
        assert!(mock.submitted_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_instrument_failure_is_isolated() {
        let mock = MockGateway::new();
        mock.set_ticker("A-PERP", dec!(10), dec!(10.1)).await;
        mock.set_ticker("B-PERP", dec!(20), dec!(20.2)).await;
        mock.reject_orders_for("A-PERP").await;
        let engine = engine_over(&mock, &["A-PERP", "B-PERP"]);
        let provider =
            FixedProvider::new(&[("A-PERP", Some(dec!(100))), ("B-PERP", Some(dec!(-100)))]);
        engine.refresh_signals(&provider).await;

        let report = engine.reconcile_once().await.unwrap();
        assert_eq!(report.outcome("A-PERP"), Some(&InstrumentOutcome::Failed));
        assert!(matches!(
            report.outcome("B-PERP"),
            Some(InstrumentOutcome::Submitted { .. })
        ));

        let submitted = mock.submitted_orders().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].symbol, "B-PERP");
    }

    #[tokio::test]
    async fn test_identical_venue_state_yields_identical_intent() {
        let mock = MockGateway::new();
        mock.set_ticker("A-PERP", dec!(10), dec!(10.1)).await;
        mock.set_positions(vec![PositionRecord {
            symbol: "A-PERP".to_string(),
            net_size: dec!(1),
        }])
        .await;
        let engine = engine_over(&mock, &["A-PERP"]);
        set_target(&engine, "A-PERP", dec!(100)).await;

        engine.reconcile_once().await.unwrap();
        engine.reconcile_once().await.unwrap();

        let submitted = mock.submitted_orders().await;
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0], submitted[1]);
    }

    #[tokio::test]
    async fn test_no_signal_keeps_previous_target() {
        let mock = MockGateway::new();
        let engine = engine_over(&mock, &["A-PERP"]);
        set_target(&engine, "A-PERP", dec!(75)).await;
        assert_eq!(engine.desired_exposure("A-PERP"), Some(dec!(75)));

        let no_signal = FixedProvider::new(&[("A-PERP", None)]);
        engine.refresh_signals(&no_signal).await;
        assert_eq!(engine.desired_exposure("A-PERP"), Some(dec!(75)));
    }

    #[tokio::test]
    async fn test_position_fetch_failure_aborts_cycle() {
        let mock = MockGateway::new();
        mock.set_ticker("A-PERP", dec!(10), dec!(10.1)).await;
        // Exceeds the transport retry budget of 3.
        mock.fail_transient("fetch_positions", 5).await;
        let engine = engine_over(&mock, &["A-PERP"]);
        set_target(&engine, "A-PERP", dec!(100)).await;

        assert!(engine.reconcile_once().await.is_err());
        assert!(mock.submitted_orders().await.is_empty());
    }
}
