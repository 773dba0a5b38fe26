//! Event feed ingestion pipeline components.
//!
//! This crate reconciles a periodically published XML event feed into a
//! persisted catalog: new events are inserted, changed ones updated, and
//! unchanged ones left alone.
//!
//! # Modules
//!
//! - [`source`] - Streaming feed extraction
//! - [`pipeline`] - Reconciliation, batching and the run state machine
//! - [`catalog`] - Persistence sessions (SQLite, in-memory)
//! - [`fetch`] / [`job`] - HTTP retrieval and the retrying periodic trigger
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   FeedFetcher   │  HTTP GET of the whole feed
//! └────────┬────────┘
//!          │ bytes
//!          ▼
//! ┌─────────────────┐
//! │   FeedReader    │  quick-xml pull parser, one base_event at a time
//! └────────┬────────┘
//!          │ CandidateRecord
//!          ▼
//! ┌─────────────────┐
//! │    reconcile    │  Insert / Update / NoOp against staged view
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   BatchWriter   │  Commits every full batch, final flush at end
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Catalog     │  SQLite (WAL) or in-memory
//! └─────────────────┘
//! ```
//!
//! Each flushed batch is its own transaction, so a failed run keeps the
//! batches committed before the failure.

pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod job;
pub mod pipeline;
pub mod source;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use catalog::{
    Catalog, CatalogSession, MemoryCatalog, MemoryCatalogStats, SqliteCatalog, SqliteCatalogConfig,
};
pub use config::IngestConfig;
pub use fetch::{FeedFetcher, FetchConfig};
pub use job::{FeedJob, RetryPolicy};
pub use pipeline::{
    BatchStats, BatchWriter, PipelineConfig, PipelineRunner, Reconciliation, RunReport, RunState,
    reconcile,
};
pub use source::{BaseEventGroup, FeedReader, RawEvent, SourceStats};
