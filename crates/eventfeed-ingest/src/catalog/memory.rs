//! In-memory event catalog for dry runs and tests.

use std::collections::HashMap;

use eventfeed_core::EventRecord;
use parking_lot::{Mutex, MutexGuard};

use super::{Catalog, CatalogSession};
use crate::{Error, Result};

/// Counters describing how a [`MemoryCatalog`] has been used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryCatalogStats {
    /// Committed records.
    pub records: usize,
    pub sessions_opened: usize,
    pub sessions_released: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, EventRecord>,
    sessions_opened: usize,
    sessions_released: usize,
    commits: usize,
    rollbacks: usize,
}

/// Event catalog held in a `HashMap`.
///
/// Writes are staged per session and applied on commit, mirroring the
/// transactional behavior of the SQLite catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<MemoryState>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog that already holds `records`.
    pub fn with_records(records: impl IntoIterator<Item = EventRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            state: Mutex::new(MemoryState {
                records,
                ..Default::default()
            }),
        }
    }

    /// Committed record for `id`.
    pub fn get(&self, id: &str) -> Option<EventRecord> {
        self.state.lock().records.get(id).cloned()
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> MemoryCatalogStats {
        let state = self.state.lock();
        MemoryCatalogStats {
            records: state.records.len(),
            sessions_opened: state.sessions_opened,
            sessions_released: state.sessions_released,
            commits: state.commits,
            rollbacks: state.rollbacks,
        }
    }
}

impl Catalog for MemoryCatalog {
    type Session<'a> = MemorySession<'a>;

    fn session(&self) -> Result<MemorySession<'_>> {
        let mut state = self.state.lock();
        state.sessions_opened += 1;
        Ok(MemorySession {
            state,
            staged: HashMap::new(),
        })
    }
}

/// Exclusive session over a [`MemoryCatalog`].
pub struct MemorySession<'a> {
    state: MutexGuard<'a, MemoryState>,
    staged: HashMap<String, EventRecord>,
}

impl CatalogSession for MemorySession<'_> {
    fn find(&mut self, id: &str) -> Result<Option<EventRecord>> {
        Ok(self
            .staged
            .get(id)
            .or_else(|| self.state.records.get(id))
            .cloned())
    }

    fn insert_all(&mut self, records: &[EventRecord]) -> Result<usize> {
        for record in records {
            if self.staged.contains_key(&record.id) || self.state.records.contains_key(&record.id)
            {
                return Err(Error::Database(format!(
                    "Cannot insert event {}: id already stored",
                    record.id
                )));
            }
            self.staged.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    fn update_all(&mut self, records: &[EventRecord]) -> Result<usize> {
        for record in records {
            let Some(current) = self.find(&record.id)? else {
                return Err(Error::Database(format!(
                    "Cannot update event {}: no stored record",
                    record.id
                )));
            };
            let updated = EventRecord {
                title: current.title,
                ..record.clone()
            };
            self.staged.insert(record.id.clone(), updated);
        }
        Ok(records.len())
    }

    fn commit(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        self.state.records.extend(staged);
        self.state.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.staged.clear();
        self.state.rollbacks += 1;
        Ok(())
    }
}

impl Drop for MemorySession<'_> {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            self.staged.clear();
            self.state.rollbacks += 1;
        }
        self.state.sessions_released += 1;
    }
}
