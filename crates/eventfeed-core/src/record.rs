//! Event records and the normalization rules applied to raw feed values.
//!
//! A feed entry becomes a [`CandidateRecord`] once its timestamps and zone
//! prices have been normalized. A candidate is only a proposal; the catalog
//! stores [`EventRecord`]s.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Naive layouts accepted after RFC 3339 fails. `%.f` also matches a
/// missing fraction.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Offset layouts RFC 3339 rejects (no colon in the offset, space separator).
const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

/// Parse a feed timestamp with a tolerant ISO-8601 reader.
///
/// Accepted forms, tried in order:
/// - RFC 3339 with `Z` or a numeric offset (`2021-06-30T21:00:00+02:00`)
/// - the same with a compact offset or a space separator
/// - naive date-times (`2021-06-30T21:00:00`, `2021-06-30 21:00`), read as UTC
/// - bare dates (`2021-06-30`), read as midnight UTC
///
/// `field` names the attribute the value came from and is carried into the
/// error so skipped events can be diagnosed.
pub fn parse_feed_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|e| Error::InvalidTimestamp {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a zone `price` attribute.
///
/// Prices must be finite and non-negative; `NaN`, `inf` and negative values
/// are rejected even though Rust's float parser accepts them.
pub fn parse_price(value: &str) -> Result<f64> {
    match value.trim().parse::<f64>() {
        Ok(price) if price.is_finite() && price >= 0.0 => Ok(price),
        _ => Err(Error::InvalidPrice {
            value: value.to_string(),
        }),
    }
}

/// Minimum and maximum price across an event's zones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    /// Reduce zone prices to a range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPriceZones`] when `prices` is empty; an event
    /// without zones has no defined range.
    pub fn from_prices<I>(prices: I) -> Result<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        prices
            .into_iter()
            .fold(None, |range: Option<Self>, price| {
                Some(match range {
                    None => Self {
                        min: price,
                        max: price,
                    },
                    Some(r) => Self {
                        min: r.min.min(price),
                        max: r.max.max(price),
                    },
                })
            })
            .ok_or(Error::NoPriceZones)
    }
}

/// A normalized proposal built from one `<event>` element and its container.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    /// Container `base_event_id`, shared by every child event.
    pub id: String,
    /// Container title.
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub min_price: f64,
    pub max_price: f64,
    /// Container `sell_mode`, kept verbatim.
    pub is_online: String,
}

/// An event as stored in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: String,
    /// Set on insert and never changed afterwards.
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub min_price: f64,
    pub max_price: f64,
    pub is_online: String,
}

impl EventRecord {
    /// Create a new stored record from a candidate.
    pub fn from_candidate(candidate: CandidateRecord) -> Self {
        Self {
            id: candidate.id,
            title: candidate.title,
            start_date: candidate.start_date,
            end_date: candidate.end_date,
            min_price: candidate.min_price,
            max_price: candidate.max_price,
            is_online: candidate.is_online,
        }
    }
}
