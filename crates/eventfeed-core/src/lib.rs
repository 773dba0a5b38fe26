//! Core types, normalization rules, and shared utilities for the event feed
//! ingester.
//!
//! This crate provides:
//! - The stored [`EventRecord`] and the transient [`CandidateRecord`]
//! - Tolerant ISO-8601 timestamp parsing and zone price reduction
//! - Per-record error types
//! - Prometheus metrics helpers

mod error;
pub mod metrics;
mod record;

// ═══════════════════════════════════════════════════════════════════════════
// Feed vocabulary
// ═══════════════════════════════════════════════════════════════════════════

/// Container element grouping one or more events.
pub const BASE_EVENT_TAG: &str = "base_event";

/// A single schedulable occurrence inside a container.
pub const EVENT_TAG: &str = "event";

/// A priced sub-category of an event.
pub const ZONE_TAG: &str = "zone";

pub use error::{Error, Result};
pub use record::{
    CandidateRecord, EventRecord, PriceRange, parse_feed_timestamp, parse_price,
};
