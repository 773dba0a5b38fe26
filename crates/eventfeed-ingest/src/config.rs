//! Daemon configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::catalog::SqliteCatalogConfig;
use crate::fetch::FetchConfig;
use crate::job::RetryPolicy;
use crate::pipeline::{DEFAULT_BATCH_SIZE, PipelineConfig};

/// Ingestion daemon configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Feed endpoint.
    pub feed_url: String,

    /// Path to the SQLite catalog.
    pub db_path: PathBuf,

    /// Pending records per buffer before a durable flush.
    pub batch_size: usize,

    /// Time between scheduled runs.
    pub interval: Duration,

    /// Extra attempts after a failed run.
    pub max_retries: u32,

    /// Fixed delay between attempts.
    pub retry_delay: Duration,

    /// Whole-request timeout for fetching the feed.
    pub fetch_timeout: Duration,

    /// Prometheus port (0 to disable).
    pub metrics_port: u16,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            feed_url: FetchConfig::default().url,
            db_path: SqliteCatalogConfig::default().db_path,
            batch_size: DEFAULT_BATCH_SIZE,
            interval: Duration::from_secs(30),
            max_retries: retry.max_retries,
            retry_delay: retry.delay,
            fetch_timeout: FetchConfig::default().timeout,
            metrics_port: 9092,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (all have defaults for local development):
    /// - `FEED_URL`: Feed endpoint (default: "http://localhost:8080/api/events")
    /// - `FEED_DB_PATH`: SQLite catalog path (default: "./data/events.db")
    /// - `FEED_BATCH_SIZE`: Flush threshold, > 0 (default: 100)
    /// - `FEED_INTERVAL_SECS`: Seconds between runs, > 0 (default: 30)
    /// - `FEED_MAX_RETRIES`: Retries per failed run (default: 3)
    /// - `FEED_RETRY_DELAY_SECS`: Seconds between retries (default: 60)
    /// - `FEED_FETCH_TIMEOUT_SECS`: Fetch timeout (default: 120)
    /// - `METRICS_PORT`: Prometheus port, 0 disables (default: 9092)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let feed_url = std::env::var("FEED_URL").unwrap_or(defaults.feed_url);
        let db_path = std::env::var("FEED_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let batch_size = env_parse("FEED_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 {
            bail!("FEED_BATCH_SIZE must be greater than zero");
        }

        let interval_secs = env_parse("FEED_INTERVAL_SECS", defaults.interval.as_secs())?;
        if interval_secs == 0 {
            bail!("FEED_INTERVAL_SECS must be greater than zero");
        }

        let max_retries = env_parse("FEED_MAX_RETRIES", defaults.max_retries)?;
        let retry_delay_secs = env_parse("FEED_RETRY_DELAY_SECS", defaults.retry_delay.as_secs())?;
        let fetch_timeout_secs =
            env_parse("FEED_FETCH_TIMEOUT_SECS", defaults.fetch_timeout.as_secs())?;
        let metrics_port = env_parse("METRICS_PORT", defaults.metrics_port)?;

        let config = Self {
            feed_url,
            db_path,
            batch_size,
            interval: Duration::from_secs(interval_secs),
            max_retries,
            retry_delay: Duration::from_secs(retry_delay_secs),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            metrics_port,
        };

        tracing::info!(
            feed_url = %config.feed_url,
            db_path = %config.db_path.display(),
            batch_size = config.batch_size,
            interval_secs,
            max_retries = config.max_retries,
            retry_delay_secs,
            metrics_port = config.metrics_port,
            "ingest configuration loaded"
        );

        Ok(config)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            batch_size: self.batch_size,
        }
    }

    pub fn fetch(&self) -> FetchConfig {
        FetchConfig {
            url: self.feed_url.clone(),
            timeout: self.fetch_timeout,
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: self.retry_delay,
        }
    }

    pub fn catalog(&self) -> SqliteCatalogConfig {
        SqliteCatalogConfig {
            db_path: self.db_path.clone(),
        }
    }
}

/// Parse an optional numeric variable; present but unparseable is an error.
fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}
