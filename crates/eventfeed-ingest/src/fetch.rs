//! HTTP retrieval of the feed payload.

use std::time::{Duration, Instant};

use eventfeed_core::metrics;
use reqwest::Url;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Configuration for fetching the feed.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Feed endpoint.
    pub url: String,
    /// Timeout for the whole request, body included.
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/api/events".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Downloads the feed document in one request.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    url: Url,
}

impl FeedFetcher {
    /// Build a fetcher. The URL must be absolute `http` or `https`.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("invalid feed URL {:?}: {}", config.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "feed URL must use http or https, got {:?}",
                url.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("eventfeed-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// GET the feed and return its body.
    ///
    /// A non-2xx answer is [`Error::FetchStatus`].
    pub async fn fetch(&self) -> Result<Vec<u8>> {
        let start = Instant::now();
        match self.fetch_inner().await {
            Ok(body) => {
                metrics::increment("feed_fetch_bytes_total", body.len() as u64);
                debug!(
                    url = %self.url,
                    bytes = body.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Fetched feed"
                );
                Ok(body)
            }
            Err(e) => {
                metrics::increment("feed_fetch_errors_total", 1);
                warn!(url = %self.url, error = %e, "Feed fetch failed");
                Err(e)
            }
        }
    }

    async fn fetch_inner(&self) -> Result<Vec<u8>> {
        let response = self.client.get(self.url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FetchStatus {
                url: self.url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
