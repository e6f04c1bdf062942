//! Perp Reconciler - Main Entry Point

use anyhow::Result;
use clap::{Parser, Subcommand};
use perp_reconciler::config::{Config, StrategyKind};
use perp_reconciler::engine::{Reconciler, Scheduler};
use perp_reconciler::exchange::{RateLimiter, RestGateway, RetryPolicy, Transport};
use perp_reconciler::signal::{MeanReversion, SignalProvider, Trend};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Perp Reconciler CLI
#[derive(Parser)]
#[command(name = "perp-reconciler")]
#[command(version, about = "Signal-driven position reconciliation for perpetual futures venues")]
struct Cli {
    /// Path to a config file (default: reconciler.{toml,yaml,json})
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduled reconciliation loop (default)
    Run,

    /// Run a single signal refresh + reconciliation cycle, then exit
    Once,

    /// Load and validate configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;

    init_logging(&config.log.dir)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            log_config(&config);
            info!("configuration ok");
            return Ok(());
        }
        Commands::Once => {
            let (engine, provider, _cancel) = build_engine(&config)?;
            engine.refresh_signals(provider.as_ref()).await;
            let report = engine.reconcile_once().await?;
            info!(
                submitted = report.submitted(),
                failed = report.failed(),
                "single cycle finished"
            );
            return Ok(());
        }
        Commands::Run => {}
    }

    info!(
        "perp-reconciler v{} starting",
        env!("CARGO_PKG_VERSION")
    );
    log_config(&config);

    let (engine, provider, cancel) = build_engine(&config)?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received");
        shutdown.cancel();
    });

    let scheduler = Scheduler::new(engine, provider, config.schedule.clone(), cancel);
    scheduler.run().await;

    info!("perp-reconciler stopped");
    Ok(())
}

type LiveEngine = Arc<Reconciler<Transport<RestGateway>>>;

/// Wire gateway, transport, strategy and engine from configuration.
fn build_engine(config: &Config) -> Result<(LiveEngine, Arc<dyn SignalProvider>, CancellationToken)> {
    anyhow::ensure!(
        !config.venue.api_key.is_empty() && !config.venue.secret_key.is_empty(),
        "venue credentials are not configured"
    );

    let cancel = CancellationToken::new();
    let gateway = RestGateway::new(&config.venue)?;
    let retry = RetryPolicy::new(
        config.engine.retry_attempts,
        Duration::from_millis(config.engine.retry_backoff_ms),
        cancel.clone(),
    );
    let limiter = Arc::new(RateLimiter::new(
        config.engine.rate_limit_per_minute,
        Duration::from_secs(60),
    ));
    let transport = Transport::new(Arc::new(gateway), retry, limiter);

    let provider = build_provider(config);
    let engine = Arc::new(Reconciler::new(
        Arc::new(transport),
        config.instruments.clone(),
        config.engine.clone(),
    ));

    Ok((engine, provider, cancel))
}

fn build_provider(config: &Config) -> Arc<dyn SignalProvider> {
    let strategy = &config.strategy;
    match strategy.kind {
        StrategyKind::MeanReversion => Arc::new(MeanReversion::new(
            strategy.resolution.clone(),
            strategy.candle_limit,
            strategy.exposure_cap,
            strategy.step,
        )),
        StrategyKind::Trend => Arc::new(Trend::new(
            strategy.resolution.clone(),
            strategy.candle_limit,
            strategy.benchmark.clone(),
            strategy.exposure_cap,
        )),
    }
}

fn init_logging(log_dir: &str) -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all(log_dir)?;

    // Append-only daily file plus stdout.
    let file_appender = tracing_appender::rolling::daily(log_dir, "reconciler.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer guard alive for the program duration.
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("perp_reconciler=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup (credentials excluded).
fn log_config(config: &Config) {
    info!(
        instruments = ?config.instruments,
        strategy = ?config.strategy.kind,
        resolution = %config.strategy.resolution,
        exposure_cap = %config.strategy.exposure_cap,
        max_order_notional = %config.engine.max_order_notional,
        reconcile_min = config.schedule.reconcile_interval_min,
        refresh_min = config.schedule.signal_refresh_interval_min,
        "configuration"
    );
    if let Some(subaccount) = &config.venue.subaccount {
        info!(%subaccount, base_url = %config.venue.base_url, "venue");
    } else {
        info!(base_url = %config.venue.base_url, "venue");
    }
}
