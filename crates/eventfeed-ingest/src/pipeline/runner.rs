//! One feed run from bytes to committed catalog state.

use std::io::BufRead;
use std::time::{Duration, Instant};

use eventfeed_core::metrics;
use tracing::{debug, error, info, warn};

use super::batch::{BatchWriter, DEFAULT_BATCH_SIZE};
use super::reconcile::{Reconciliation, reconcile};
use crate::Result;
use crate::catalog::{Catalog, CatalogSession};
use crate::source::{FeedReader, SourceStats};

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pending records per buffer before a durable flush.
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Lifecycle of a [`PipelineRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    /// A session is held and the feed is being processed.
    Running,
    /// End of stream reached and the final flush succeeded.
    Committed,
    /// The run aborted; unflushed work was rolled back.
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }
}

/// Outcome of a committed run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Extraction counters.
    pub source: SourceStats,
    pub inserted: usize,
    pub updated: usize,
    /// Candidates equal to their stored record.
    pub unchanged: usize,
    /// Committed batches.
    pub flushes: usize,
    pub duration: Duration,
}

/// Drives extraction, reconciliation and batching against one catalog.
pub struct PipelineRunner<'c, C> {
    catalog: &'c C,
    config: PipelineConfig,
    state: RunState,
}

impl<'c, C: Catalog> PipelineRunner<'c, C> {
    pub fn new(catalog: &'c C, config: PipelineConfig) -> Self {
        Self {
            catalog,
            config,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Process one feed payload.
    ///
    /// Returns the insert/update counts when the run commits. On error every
    /// batch flushed before the failure stays durable, the unflushed
    /// remainder is rolled back, and the session is released.
    pub fn run<R: BufRead>(&mut self, source: R) -> Result<RunReport> {
        let start = Instant::now();
        self.state = RunState::Running;
        info!(batch_size = self.config.batch_size, "Starting feed run");

        let result = self.run_in_session(source);
        let elapsed = start.elapsed();
        metrics::record_seconds("feed_run_duration_seconds", elapsed.as_secs_f64());

        match result {
            Ok(mut report) => {
                report.duration = elapsed;
                self.state = RunState::Committed;
                metrics::increment_labeled("feed_runs_total", "outcome", self.state.as_str(), 1);
                info!(
                    inserted = report.inserted,
                    updated = report.updated,
                    unchanged = report.unchanged,
                    skipped = report.source.events_skipped(),
                    flushes = report.flushes,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Feed run committed"
                );
                Ok(report)
            }
            Err(e) => {
                self.state = RunState::Failed;
                metrics::increment_labeled("feed_runs_total", "outcome", self.state.as_str(), 1);
                error!(error = %e, elapsed_ms = elapsed.as_millis() as u64, "Feed run failed");
                Err(e)
            }
        }
    }

    /// Hold a session for the whole run; it is released when this returns.
    fn run_in_session<R: BufRead>(&self, source: R) -> Result<RunReport> {
        let mut session = self.catalog.session()?;

        match process(&mut session, source, self.config.batch_size) {
            Ok(report) => Ok(report),
            Err(e) => {
                if let Err(rollback_err) = session.rollback() {
                    warn!(error = %rollback_err, "Rollback after failed run also failed");
                }
                Err(e)
            }
        }
    }
}

fn process<S, R>(session: &mut S, source: R, batch_size: usize) -> Result<RunReport>
where
    S: CatalogSession,
    R: BufRead,
{
    let mut reader = FeedReader::new(source);
    let mut writer = BatchWriter::new(session, batch_size);
    let mut unchanged = 0;

    let source_stats = reader.process_containers(|candidates| {
        for candidate in candidates {
            let current = writer.current(&candidate.id)?;
            let outcome = reconcile(candidate, current);
            match &outcome {
                Reconciliation::Insert(record) => {
                    debug!(id = %record.id, "New event");
                }
                Reconciliation::Update {
                    record, changed, ..
                } => {
                    debug!(id = %record.id, fields = ?changed, "Changed event");
                }
                Reconciliation::NoOp => {
                    unchanged += 1;
                }
            }
            writer.apply(outcome)?;
        }
        writer.end_container()
    })?;

    let batch = writer.finish()?;
    metrics::increment("feed_records_unchanged_total", unchanged as u64);

    Ok(RunReport {
        source: source_stats,
        inserted: batch.inserted,
        updated: batch.updated,
        unchanged,
        flushes: batch.flushes,
        duration: Duration::ZERO,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::catalog::MemoryCatalog;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<eventList version="1.0">
  <output>
    <base_event base_event_id="291" sell_mode="online" title="Camela en concierto">
      <event event_start_date="2021-06-30T21:00:00" event_end_date="2021-06-30T22:00:00" event_id="291">
        <zone zone_id="40" capacity="243" price="20.00" name="Platea" numbered="true"/>
        <zone zone_id="38" capacity="100" price="15.00" name="Grada 2" numbered="false"/>
      </event>
    </base_event>
    <base_event base_event_id="322" sell_mode="online" title="Pantomima Full">
      <event event_start_date="2021-02-10T20:00:00" event_end_date="2021-02-10T21:30:00" event_id="1642">
        <zone zone_id="311" capacity="2" price="55.00" name="A28" numbered="true"/>
      </event>
    </base_event>
  </output>
</eventList>"#;

    #[test]
    fn test_run_commits_and_reports() {
        let catalog = MemoryCatalog::new();
        let mut runner = PipelineRunner::new(&catalog, PipelineConfig::default());
        assert_eq!(runner.state(), RunState::Idle);

        let report = runner.run(FEED.as_bytes()).unwrap();
        assert_eq!(runner.state(), RunState::Committed);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(report.unchanged, 0);
        assert_eq!(report.flushes, 1);
        assert_eq!(report.source.candidates, 2);

        let stored = catalog.get("291").unwrap();
        assert_eq!(stored.min_price, 15.0);
        assert_eq!(stored.max_price, 20.0);
        assert_eq!(stored.title, "Camela en concierto");
    }

    #[test]
    fn test_second_run_is_noop() {
        let catalog = MemoryCatalog::new();
        PipelineRunner::new(&catalog, PipelineConfig::default())
            .run(FEED.as_bytes())
            .unwrap();

        let report = PipelineRunner::new(&catalog, PipelineConfig::default())
            .run(FEED.as_bytes())
            .unwrap();
        assert_eq!(report.inserted, 0);
        assert_eq!(report.updated, 0);
        assert_eq!(report.unchanged, 2);
        assert_eq!(report.flushes, 0);
    }

    #[test]
    fn test_malformed_feed_fails_and_releases_session() {
        let catalog = MemoryCatalog::new();
        let mut runner = PipelineRunner::new(&catalog, PipelineConfig::default());

        let err = runner.run(&b"<root><base_event></root>"[..]).unwrap_err();
        assert!(matches!(err, Error::Xml(_) | Error::Feed(_)));
        assert_eq!(runner.state(), RunState::Failed);

        let stats = catalog.stats();
        assert_eq!(stats.sessions_opened, 1);
        assert_eq!(stats.sessions_released, 1);
        assert_eq!(stats.records, 0);
    }

    #[test]
    fn test_children_of_one_container_reconcile_against_each_other() {
        let feed = r#"<root>
  <base_event base_event_id="7" title="Tour" sell_mode="online">
    <event event_start_date="2021-07-01T20:00:00" event_end_date="2021-07-01T22:00:00">
      <zone price="10.00"/>
    </event>
    <event event_start_date="2021-07-02T20:00:00" event_end_date="2021-07-02T22:00:00">
      <zone price="12.00"/>
    </event>
  </base_event>
</root>"#;
        let catalog = MemoryCatalog::new();
        let first = PipelineRunner::new(&catalog, PipelineConfig::default())
            .run(feed.as_bytes())
            .unwrap();
        assert_eq!(first.inserted, 1);
        assert_eq!(catalog.get("7").unwrap().max_price, 12.0);

        let second = PipelineRunner::new(&catalog, PipelineConfig::default())
            .run(feed.as_bytes())
            .unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);

        // A batch of one must not split the container either
        let third = PipelineRunner::new(&catalog, PipelineConfig { batch_size: 1 })
            .run(feed.as_bytes())
            .unwrap();
        assert_eq!(third.inserted + third.updated, 0);
    }
}
