//! Fetch-and-reconcile job with retries and a periodic trigger.
//!
//! One attempt fetches the feed over HTTP and runs the pipeline on the
//! blocking pool. A failed attempt is retried as a whole after a fixed
//! delay. Periodic runs are strictly sequential: the next tick is not
//! taken until the previous run, retries included, has finished.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eventfeed_core::metrics;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::fetch::FeedFetcher;
use crate::pipeline::{PipelineConfig, PipelineRunner, RunReport};
use crate::{Error, Result};

/// Granularity at which waits notice a shutdown request.
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// How failed runs are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(60),
        }
    }
}

/// Ties a fetcher and a catalog into a repeatable ingestion job.
pub struct FeedJob<C> {
    fetcher: FeedFetcher,
    catalog: Arc<C>,
    pipeline: PipelineConfig,
    retry: RetryPolicy,
    running: Arc<AtomicBool>,
}

impl<C> FeedJob<C>
where
    C: Catalog + Send + Sync + 'static,
{
    pub fn new(
        fetcher: FeedFetcher,
        catalog: Arc<C>,
        pipeline: PipelineConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            fetcher,
            catalog,
            pipeline,
            retry,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Use `running` as the shutdown flag; clearing it stops retries and
    /// periodic scheduling at the next wait.
    pub fn with_shutdown_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn catalog(&self) -> &Arc<C> {
        &self.catalog
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Fetch the feed once and reconcile it.
    pub async fn run_once(&self) -> Result<RunReport> {
        let body = self.fetcher.fetch().await?;
        self.process(body).await
    }

    /// Reconcile an already fetched payload on the blocking pool.
    pub async fn process(&self, body: Vec<u8>) -> Result<RunReport> {
        let catalog = Arc::clone(&self.catalog);
        let config = self.pipeline.clone();

        metrics::set_gauge("feed_job_running", 1.0);
        let result = tokio::task::spawn_blocking(move || {
            PipelineRunner::new(catalog.as_ref(), config).run(body.as_slice())
        })
        .await;
        metrics::set_gauge("feed_job_running", 0.0);

        result.map_err(|e| Error::Task(format!("pipeline task failed: {}", e)))?
    }

    /// Run once, retrying the whole run on failure.
    ///
    /// Returns the last error once `max_retries` retries have failed or a
    /// shutdown was requested while waiting.
    pub async fn run_with_retry(&self) -> Result<RunReport> {
        let mut attempt = 0u32;
        loop {
            let err = match self.run_once().await {
                Ok(report) => return Ok(report),
                Err(e) => e,
            };

            if attempt >= self.retry.max_retries {
                error!(
                    attempts = attempt + 1,
                    error = %err,
                    "Feed run failed, retries exhausted"
                );
                return Err(err);
            }

            attempt += 1;
            metrics::increment("feed_run_retries_total", 1);
            warn!(
                attempt,
                max_retries = self.retry.max_retries,
                delay_secs = self.retry.delay.as_secs_f64(),
                error = %err,
                "Feed run failed, retrying"
            );

            if !self.pause(self.retry.delay).await {
                info!("Shutdown requested, abandoning retries");
                return Err(err);
            }
        }
    }

    /// Trigger [`run_with_retry`](Self::run_with_retry) every `interval`
    /// until the shutdown flag clears. Returns the number of runs that
    /// committed.
    pub async fn run_periodic(&self, interval: Duration) -> usize {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut runs = 0usize;
        let mut committed = 0usize;

        while self.is_running() {
            let next = ticker.tick().await + interval;
            runs += 1;

            match self.run_with_retry().await {
                Ok(report) => {
                    committed += 1;
                    info!(
                        run = runs,
                        inserted = report.inserted,
                        updated = report.updated,
                        unchanged = report.unchanged,
                        "Scheduled run complete"
                    );
                }
                Err(e) => {
                    error!(run = runs, error = %e, "Scheduled run failed");
                }
            }

            let remaining = next.saturating_duration_since(Instant::now());
            if !self.pause(remaining).await {
                break;
            }
        }

        info!(runs, committed, "Periodic ingestion stopped");
        committed
    }

    /// Sleep for `duration` in short slices. Returns false if the shutdown
    /// flag cleared first.
    async fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if !self.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(SHUTDOWN_POLL)).await;
        }
    }
}
