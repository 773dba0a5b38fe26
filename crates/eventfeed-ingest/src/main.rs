//! Event feed ingestion daemon.
//!
//! Fetches the published XML event feed on a fixed interval and reconciles
//! it into the SQLite catalog. Each failed run is retried with a fixed delay.
//!
//! # Usage
//!
//! ```bash
//! # Run with environment configuration (FEED_URL, FEED_DB_PATH, ...)
//! eventfeed-ingest
//!
//! # Override the feed and catalog
//! eventfeed-ingest \
//!     --feed-url https://provider.example/api/events \
//!     --db-path /var/lib/eventfeed/events.db
//!
//! # Single run, no scheduling
//! eventfeed-ingest --once
//! ```
//!
//! # Graceful Shutdown
//!
//! On SIGINT (Ctrl+C) the daemon stops scheduling new runs and abandons
//! pending retries. A run already in progress finishes, or fails and rolls
//! back its unflushed batch, before the process exits.

use anyhow::{Context, Result};
use clap::Parser;
use eventfeed_core::metrics::{init_metrics, set_gauge, start_metrics_server};
use eventfeed_ingest::{FeedFetcher, FeedJob, IngestConfig, SqliteCatalog};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

/// Event feed ingestion daemon.
#[derive(Parser, Debug)]
#[command(name = "eventfeed-ingest")]
#[command(about = "Periodically reconcile an XML event feed into a catalog")]
#[command(version)]
struct Args {
    /// Feed URL (overrides FEED_URL)
    #[arg(long)]
    feed_url: Option<String>,

    /// SQLite catalog path (overrides FEED_DB_PATH)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Records per buffer before a durable flush (overrides FEED_BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Metrics HTTP server port, 0 to disable (overrides METRICS_PORT)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Run once (with retries) and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("eventfeed_ingest=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Event feed ingestion daemon starting...");

    let config = load_config(&args)?;

    if config.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(config.metrics_port, metrics_handle)
            .await
            .with_context(|| format!("Failed to start metrics server on {}", config.metrics_port))?;
    }

    // Set up graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    tracing::info!("Opening catalog at {}", config.db_path.display());
    let catalog = Arc::new(
        SqliteCatalog::open(config.catalog())
            .with_context(|| format!("Failed to open catalog at {:?}", config.db_path))?,
    );
    tracing::info!("Catalog opened: {} events", catalog.count()?);

    let fetcher = FeedFetcher::new(config.fetch()).context("Failed to build feed fetcher")?;
    tracing::info!("Fetching feed from {}", fetcher.url());
    let job = FeedJob::new(fetcher, Arc::clone(&catalog), config.pipeline(), config.retry())
        .with_shutdown_flag(Arc::clone(&running));

    let committed = if args.once {
        let report = job.run_with_retry().await?;
        tracing::info!(
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            "Single run complete"
        );
        1
    } else {
        tracing::info!(
            "Starting periodic ingestion every {}s",
            config.interval.as_secs()
        );
        job.run_periodic(config.interval).await
    };

    set_gauge("feed_job_running", 0.0);

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Committed runs:       {}", committed);
    tracing::info!("Catalog events:       {}", catalog.count()?);

    Ok(())
}

/// Environment configuration with command-line overrides applied.
fn load_config(args: &Args) -> Result<IngestConfig> {
    let mut config = IngestConfig::from_env()?;

    if let Some(url) = &args.feed_url {
        config.feed_url = url.clone();
    }
    if let Some(path) = &args.db_path {
        config.db_path = path.clone();
    }
    if let Some(batch_size) = args.batch_size {
        anyhow::ensure!(batch_size > 0, "--batch-size must be greater than zero");
        config.batch_size = batch_size;
    }
    if let Some(port) = args.metrics_port {
        config.metrics_port = port;
    }

    tracing::info!("Configuration:");
    tracing::info!("  Feed: {}", config.feed_url);
    tracing::info!("  Catalog: {}", config.db_path.display());
    tracing::info!("  Batch size: {}", config.batch_size);
    tracing::info!(
        "  Retries: {} x {}s",
        config.max_retries,
        config.retry_delay.as_secs()
    );

    Ok(config)
}
