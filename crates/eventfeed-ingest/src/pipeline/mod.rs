//! Core pipeline components for feed reconciliation.
//!
//! - [`reconcile`] - pure insert/update/no-op decision per candidate
//! - [`BatchWriter`] - buffered writes, durable flush per full batch
//! - [`PipelineRunner`] - one run, from feed bytes to committed catalog
//!
//! # Architecture
//!
//! ```text
//! [FeedReader] → [reconcile] → [BatchWriter] → [CatalogSession]
//!                    ↑               │
//!                    └── staged view ┘
//! ```

mod batch;
mod reconcile;
mod runner;

pub use batch::{BatchStats, BatchWriter, DEFAULT_BATCH_SIZE};
pub use reconcile::{Reconciliation, changed_fields, reconcile};
pub use runner::{PipelineConfig, PipelineRunner, RunReport, RunState};
