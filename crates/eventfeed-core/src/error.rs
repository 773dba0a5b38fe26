//! Error types for per-record feed data problems.
//!
//! These errors describe a single malformed feed entry. The ingestion
//! pipeline logs and skips the offending event; none of them abort a run.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while normalizing one feed entry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A required attribute is absent from an element.
    #[error("missing attribute '{attribute}' on <{element}>")]
    MissingAttribute {
        /// The element name (e.g. `base_event`).
        element: &'static str,
        /// The attribute that was expected.
        attribute: &'static str,
    },

    /// A timestamp attribute could not be parsed as ISO-8601.
    #[error("invalid timestamp in '{field}': {value:?} ({reason})")]
    InvalidTimestamp {
        /// The attribute the value came from.
        field: &'static str,
        /// The raw attribute value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A zone price is not a finite, non-negative number.
    #[error("invalid zone price: {value:?}")]
    InvalidPrice {
        /// The raw attribute value.
        value: String,
    },

    /// The event has no zones, so it has no price range.
    #[error("event has no price zones")]
    NoPriceZones,
}

impl Error {
    /// Short, stable label used for skip metrics and summaries.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingAttribute { .. } => "missing_attribute",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
            Self::InvalidPrice { .. } => "invalid_price",
            Self::NoPriceZones => "no_price_zones",
        }
    }
}
