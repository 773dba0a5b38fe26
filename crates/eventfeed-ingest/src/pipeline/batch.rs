//! Buffered writes with threshold-triggered durable flushes.
//!
//! The writer keeps pending inserts and pending updates in two buffers.
//! At the end of each container, [`BatchWriter::end_container`] writes every
//! buffer that has reached the batch size through the session and commits it
//! on its own, so each flushed batch is durable even if the run later fails.
//! [`BatchWriter::finish`] flushes whatever is left.
//!
//! Flushes never fall between two children of one container. The children
//! share an id, so a commit in between would turn the later child into a
//! real update of the earlier one.
//!
//! The buffers double as the run's staged view: [`BatchWriter::current`]
//! answers from a pending record before asking the session, which keeps
//! several children of one container from each looking like a fresh insert.

use std::collections::HashMap;

use eventfeed_core::{EventRecord, metrics};
use tracing::{debug, info};

use super::reconcile::Reconciliation;
use crate::Result;
use crate::catalog::CatalogSession;

/// Default number of pending records per buffer before a flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Counters for what a [`BatchWriter`] wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Records written through `insert_all`.
    pub inserted: usize,
    /// Records written through `update_all`.
    pub updated: usize,
    /// Committed batches (inserts and updates counted separately).
    pub flushes: usize,
    /// Pending updates dropped because the record returned to its stored value.
    pub reverted: usize,
}

/// A buffer of pending records addressable by id.
#[derive(Debug, Default)]
struct Pending {
    records: Vec<EventRecord>,
    index: HashMap<String, usize>,
}

impl Pending {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn get(&self, id: &str) -> Option<&EventRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    fn push(&mut self, record: EventRecord) {
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
    }

    /// Replace the pending record with the same id. Returns false if absent.
    fn replace(&mut self, record: EventRecord) -> bool {
        match self.index.get(&record.id) {
            Some(&i) => {
                self.records[i] = record;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, id: &str) -> Option<EventRecord> {
        let i = self.index.remove(id)?;
        let removed = self.records.swap_remove(i);
        if let Some(moved) = self.records.get(i) {
            self.index.insert(moved.id.clone(), i);
        }
        Some(removed)
    }

    fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }
}

/// Accumulates reconciled records and flushes them in committed batches.
pub struct BatchWriter<'s, S> {
    session: &'s mut S,
    batch_size: usize,
    inserts: Pending,
    updates: Pending,
    /// Stored value of each pending update, as last committed.
    baselines: HashMap<String, EventRecord>,
    stats: BatchStats,
}

impl<'s, S: CatalogSession> BatchWriter<'s, S> {
    /// Create a writer over `session`. A batch size of zero is treated as one.
    pub fn new(session: &'s mut S, batch_size: usize) -> Self {
        Self {
            session,
            batch_size: batch_size.max(1),
            inserts: Pending::default(),
            updates: Pending::default(),
            baselines: HashMap::new(),
            stats: BatchStats::default(),
        }
    }

    /// Current state of `id`: a pending record if one is buffered, otherwise
    /// whatever the session has stored.
    pub fn current(&mut self, id: &str) -> Result<Option<EventRecord>> {
        if let Some(record) = self.inserts.get(id).or_else(|| self.updates.get(id)) {
            return Ok(Some(record.clone()));
        }
        self.session.find(id)
    }

    /// Number of records waiting in the insert and update buffers.
    pub fn pending(&self) -> (usize, usize) {
        (self.inserts.len(), self.updates.len())
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Route a reconciliation outcome to the matching buffer.
    pub fn apply(&mut self, outcome: Reconciliation) -> Result<()> {
        match outcome {
            Reconciliation::Insert(record) => self.add_insert(record),
            Reconciliation::Update {
                record, previous, ..
            } => self.add_update(record, previous),
            Reconciliation::NoOp => Ok(()),
        }
    }

    /// Buffer a new record.
    ///
    /// A record whose id is already pending as an insert replaces it.
    pub fn add_insert(&mut self, record: EventRecord) -> Result<()> {
        if !self.inserts.replace(record.clone()) {
            self.inserts.push(record);
        }
        Ok(())
    }

    /// Buffer a changed record.
    ///
    /// `previous` is the state the change was computed against. An update
    /// for a pending insert rewrites that insert; an update that brings a
    /// record back to its stored value cancels the pending update.
    pub fn add_update(&mut self, record: EventRecord, previous: EventRecord) -> Result<()> {
        if self.inserts.replace(record.clone()) {
            return Ok(());
        }

        if let Some(baseline) = self.baselines.get(&record.id) {
            if *baseline == record {
                self.updates.remove(&record.id);
                self.baselines.remove(&record.id);
                self.stats.reverted += 1;
                debug!(id = %record.id, "Pending update reverted to stored value");
            } else {
                self.updates.replace(record);
            }
            return Ok(());
        }

        self.baselines.insert(record.id.clone(), previous);
        self.updates.push(record);
        Ok(())
    }

    /// Close the current container: flush each buffer that is full.
    ///
    /// The two buffers are checked independently.
    pub fn end_container(&mut self) -> Result<()> {
        if self.inserts.len() >= self.batch_size {
            self.flush_inserts()?;
        }
        if self.updates.len() >= self.batch_size {
            self.flush_updates()?;
        }
        Ok(())
    }

    /// Write and commit all pending inserts.
    pub fn flush_inserts(&mut self) -> Result<()> {
        if self.inserts.is_empty() {
            return Ok(());
        }
        let written = self.session.insert_all(&self.inserts.records)?;
        self.session.commit()?;

        self.stats.inserted += written;
        self.stats.flushes += 1;
        self.inserts.clear();
        metrics::increment("feed_records_inserted_total", written as u64);
        metrics::increment_labeled("feed_batches_flushed_total", "kind", "insert", 1);
        info!(records = written, total = self.stats.inserted, "Flushed insert batch");
        Ok(())
    }

    /// Write and commit all pending updates.
    pub fn flush_updates(&mut self) -> Result<()> {
        if self.updates.is_empty() {
            return Ok(());
        }
        let written = self.session.update_all(&self.updates.records)?;
        self.session.commit()?;

        self.stats.updated += written;
        self.stats.flushes += 1;
        self.updates.clear();
        self.baselines.clear();
        metrics::increment("feed_records_updated_total", written as u64);
        metrics::increment_labeled("feed_batches_flushed_total", "kind", "update", 1);
        info!(records = written, total = self.stats.updated, "Flushed update batch");
        Ok(())
    }

    /// Flush both buffers regardless of size and return the final counts.
    pub fn finish(mut self) -> Result<BatchStats> {
        self.flush_inserts()?;
        self.flush_updates()?;
        Ok(self.stats)
    }
}
