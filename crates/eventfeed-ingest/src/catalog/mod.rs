//! Persistence of reconciled event records.
//!
//! A [`Catalog`] hands out one [`CatalogSession`] per pipeline run. The
//! session is the unit of work: writes become durable only on
//! [`CatalogSession::commit`], and dropping a session releases it and
//! discards anything uncommitted.
//!
//! Two implementations ship:
//! - [`SqliteCatalog`] - the production store
//! - [`MemoryCatalog`] - a `HashMap` store for dry runs and tests

mod memory;
mod schema;
mod sqlite;

pub use memory::{MemoryCatalog, MemoryCatalogStats, MemorySession};
pub use sqlite::{SqliteCatalog, SqliteCatalogConfig, SqliteSession};

use crate::Result;
use eventfeed_core::EventRecord;

/// A store of event records keyed by id.
pub trait Catalog {
    /// Session type, borrowing the catalog for its lifetime.
    type Session<'a>: CatalogSession
    where
        Self: 'a;

    /// Acquire a session for one run.
    ///
    /// Implementations may block until a previous session is released.
    fn session(&self) -> Result<Self::Session<'_>>;
}

/// A scoped unit of work against a [`Catalog`].
pub trait CatalogSession {
    /// Current record for `id`, including writes made earlier in this session.
    fn find(&mut self, id: &str) -> Result<Option<EventRecord>>;

    /// Insert new records. Any id that already exists is an error.
    fn insert_all(&mut self, records: &[EventRecord]) -> Result<usize>;

    /// Overwrite the compared fields of existing records, keyed by id.
    ///
    /// `title` is never written. An id with no stored record is an error.
    fn update_all(&mut self, records: &[EventRecord]) -> Result<usize>;

    /// Make all writes since the last commit durable.
    fn commit(&mut self) -> Result<()>;

    /// Discard all writes since the last commit.
    fn rollback(&mut self) -> Result<()>;
}
