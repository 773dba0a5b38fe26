//! Reconcile a local XML feed file into a catalog.
//!
//! Useful for backfills and for checking what a feed snapshot would change
//! before the daemon sees it.
//!
//! # Usage
//!
//! ```bash
//! # Reconcile into the SQLite catalog
//! ingest-file -i feed.xml --db-path ./data/events.db
//!
//! # Dry run against an empty in-memory catalog
//! ingest-file -i feed.xml --dry-run
//! ```

use anyhow::{Context, Result, bail};
use clap::Parser;
use eventfeed_ingest::{
    Catalog, MemoryCatalog, PipelineConfig, PipelineRunner, RunReport, SqliteCatalog,
    SqliteCatalogConfig, pipeline::DEFAULT_BATCH_SIZE,
};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Reconcile an XML event feed file into a catalog.
#[derive(Parser, Debug)]
#[command(name = "ingest-file")]
#[command(about = "Reconcile a local XML event feed file into a catalog")]
struct Args {
    /// Input XML feed file
    #[arg(short, long)]
    input: PathBuf,

    /// SQLite catalog path
    #[arg(long, default_value = "./data/events.db")]
    db_path: PathBuf,

    /// Records per buffer before a durable flush
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Reconcile into an empty in-memory catalog instead of SQLite
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();
    if args.batch_size == 0 {
        bail!("--batch-size must be greater than zero");
    }

    let config = PipelineConfig {
        batch_size: args.batch_size,
    };

    let report = if args.dry_run {
        let catalog = MemoryCatalog::new();
        let report = run(&catalog, &args, config)?;
        tracing::info!("Dry run: {} events would be stored", catalog.len());
        report
    } else {
        let catalog = SqliteCatalog::open(SqliteCatalogConfig {
            db_path: args.db_path.clone(),
        })
        .with_context(|| format!("Failed to open catalog at {:?}", args.db_path))?;
        let report = run(&catalog, &args, config)?;
        tracing::info!("Catalog now holds {} events", catalog.count()?);
        report
    };

    print_summary(&args, &report);
    Ok(())
}

fn run<C: Catalog>(catalog: &C, args: &Args, config: PipelineConfig) -> Result<RunReport> {
    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;

    let mut runner = PipelineRunner::new(catalog, config);
    runner
        .run(BufReader::new(file))
        .with_context(|| format!("Failed to ingest {}", args.input.display()))
}

fn print_summary(args: &Args, report: &RunReport) {
    let source = &report.source;

    println!("\n══════════════════════════════════════════════════════════════════");
    println!("SUMMARY");
    println!("══════════════════════════════════════════════════════════════════\n");

    println!("Input:       {}", args.input.display());
    if args.dry_run {
        println!("Catalog:     (in-memory, dry run)");
    } else {
        println!("Catalog:     {}", args.db_path.display());
    }
    println!();
    println!("Containers:        {:>12}", source.containers);
    if source.containers_skipped > 0 {
        println!("  - Skipped:         {:>10}", source.containers_skipped);
    }
    println!("Events seen:       {:>12}", source.events_seen);
    println!("Candidates:        {:>12}", source.candidates);
    println!("Skipped events:    {:>12}", source.events_skipped());
    if source.events_skipped() > 0 {
        println!("  - Bad timestamp:   {:>10}", source.invalid_timestamps);
        println!("  - Missing attr:    {:>10}", source.missing_attributes);
        println!("  - Bad price:       {:>10}", source.invalid_prices);
        println!("  - No zones:        {:>10}", source.without_zones);
    }
    println!();
    println!("Inserted:          {:>12}", report.inserted);
    println!("Updated:           {:>12}", report.updated);
    println!("Unchanged:         {:>12}", report.unchanged);
    println!("Batches flushed:   {:>12}", report.flushes);
    println!();
    println!("Elapsed:           {:>11.2}s", report.duration.as_secs_f64());
}
