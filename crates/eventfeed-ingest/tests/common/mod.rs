//! Shared helpers for pipeline integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{TimeZone, Utc};
use eventfeed_core::EventRecord;
use eventfeed_ingest::catalog::{Catalog, CatalogSession, MemoryCatalog, MemorySession};
use eventfeed_ingest::{Error, Result};
use parking_lot::Mutex;

/// One `<event>` element with the given dates and zone prices.
pub fn event(start: &str, end: &str, prices: &[&str]) -> String {
    let zones: String = prices
        .iter()
        .enumerate()
        .map(|(i, price)| {
            format!(
                r#"        <zone zone_id="{}" capacity="100" price="{}" name="Zone {}" numbered="false"/>
"#,
                i + 1,
                price,
                i + 1
            )
        })
        .collect();
    format!(
        r#"      <event event_start_date="{start}" event_end_date="{end}" sell_until="{end}">
{zones}      </event>
"#
    )
}

/// One `<base_event>` container around `events`.
pub fn base_event(id: &str, title: &str, sell_mode: &str, events: &[String]) -> String {
    format!(
        r#"    <base_event base_event_id="{id}" sell_mode="{sell_mode}" title="{title}">
{}    </base_event>
"#,
        events.concat()
    )
}

/// A full feed document around `containers`.
pub fn document(containers: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<eventList xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" version="1.0">
  <output>
{}  </output>
</eventList>
"#,
        containers.concat()
    )
}

/// `count` containers with ids `1..=count`, each holding one event priced
/// `min_price..max_price`.
pub fn numbered_feed(count: usize, min_price: f64, max_price: f64) -> String {
    let min = format!("{min_price:.2}");
    let max = format!("{max_price:.2}");
    let containers: Vec<String> = (1..=count)
        .map(|i| {
            base_event(
                &i.to_string(),
                &format!("Show {i}"),
                "online",
                &[event(
                    "2021-06-30T21:00:00",
                    "2021-06-30T22:00:00",
                    &[&max, &min],
                )],
            )
        })
        .collect();
    document(&containers)
}

/// Stored record matching the event produced by [`numbered_feed`].
pub fn stored_record(id: usize, min_price: f64, max_price: f64) -> EventRecord {
    EventRecord {
        id: id.to_string(),
        title: format!("Show {id}"),
        start_date: Utc.with_ymd_and_hms(2021, 6, 30, 21, 0, 0).unwrap(),
        end_date: Utc.with_ymd_and_hms(2021, 6, 30, 22, 0, 0).unwrap(),
        min_price,
        max_price,
        is_online: "online".to_string(),
    }
}

/// A [`MemoryCatalog`] that records every write batch and can fail the
/// Nth `insert_all` call.
#[derive(Default)]
pub struct ProbeCatalog {
    pub inner: MemoryCatalog,
    /// 1-based `insert_all` call to fail, if any.
    pub fail_on_insert: Option<usize>,
    insert_calls: AtomicUsize,
    insert_batches: Mutex<Vec<usize>>,
    update_batches: Mutex<Vec<usize>>,
}

impl ProbeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_insert(call: usize) -> Self {
        Self {
            fail_on_insert: Some(call),
            ..Self::default()
        }
    }

    pub fn seeded(records: impl IntoIterator<Item = EventRecord>) -> Self {
        Self {
            inner: MemoryCatalog::with_records(records),
            ..Self::default()
        }
    }

    /// Sizes of the insert batches that reached the session.
    pub fn insert_batches(&self) -> Vec<usize> {
        self.insert_batches.lock().clone()
    }

    pub fn update_batches(&self) -> Vec<usize> {
        self.update_batches.lock().clone()
    }
}

impl Catalog for ProbeCatalog {
    type Session<'a> = ProbeSession<'a>;

    fn session(&self) -> Result<ProbeSession<'_>> {
        Ok(ProbeSession {
            inner: self.inner.session()?,
            probe: self,
        })
    }
}

pub struct ProbeSession<'a> {
    inner: MemorySession<'a>,
    probe: &'a ProbeCatalog,
}

impl CatalogSession for ProbeSession<'_> {
    fn find(&mut self, id: &str) -> Result<Option<EventRecord>> {
        self.inner.find(id)
    }

    fn insert_all(&mut self, records: &[EventRecord]) -> Result<usize> {
        let call = self.probe.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.probe.fail_on_insert == Some(call) {
            return Err(Error::Database(format!("injected failure on insert call {call}")));
        }
        self.probe.insert_batches.lock().push(records.len());
        self.inner.insert_all(records)
    }

    fn update_all(&mut self, records: &[EventRecord]) -> Result<usize> {
        self.probe.update_batches.lock().push(records.len());
        self.inner.update_all(records)
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<()> {
        self.inner.rollback()
    }
}
