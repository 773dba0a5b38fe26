//! Error types for the ingestion pipeline.
//!
//! Every variant here is fatal to a run. Per-record data problems are
//! [`eventfeed_core::Error`]s and are skipped, not raised.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum Error {
    /// Catalog database error.
    #[error("Database error: {0}")]
    Database(String),

    /// XML is not well-formed.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Feed is well-formed so far but structurally unusable (truncated, empty).
    #[error("Feed error: {0}")]
    Feed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error while fetching the feed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The feed endpoint answered with a non-success status.
    #[error("Fetching {url} failed with status {status}")]
    FetchStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A blocking pipeline task panicked or was cancelled.
    #[error("Task error: {0}")]
    Task(String),
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(err.into())
    }
}
