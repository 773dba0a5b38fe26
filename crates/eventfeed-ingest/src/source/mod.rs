//! Feed source adapters.
//!
//! A feed is one XML document:
//!
//! ```text
//! <root>
//!   <base_event base_event_id=".." title=".." sell_mode="..">
//!     <event event_start_date=".." event_end_date="..">
//!       <zone price=".."/>
//!       ...
//!     </event>
//!     ...
//!   </base_event>
//!   ...
//! </root>
//! ```
//!
//! [`FeedReader`] walks it with a pull parser and hands out one
//! [`BaseEventGroup`] per closed container, so memory is bounded by the
//! largest container rather than the document.

mod feed;

pub use feed::{BaseEventGroup, FeedReader, RawEvent};

/// Statistics from extracting one feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// `base_event` containers closed.
    pub containers: usize,

    /// Containers skipped whole because a shared attribute was missing.
    pub containers_skipped: usize,

    /// `event` elements seen inside containers.
    pub events_seen: usize,

    /// Events normalized into candidate records.
    pub candidates: usize,

    /// Breakdown of skipped events by reason.
    pub invalid_timestamps: usize,
    pub missing_attributes: usize,
    pub invalid_prices: usize,
    pub without_zones: usize,
}

impl SourceStats {
    /// Total events dropped for bad data.
    pub fn events_skipped(&self) -> usize {
        self.invalid_timestamps + self.missing_attributes + self.invalid_prices + self.without_zones
    }

    /// Count a skipped event under its reason.
    pub(crate) fn record_skip(&mut self, err: &eventfeed_core::Error) {
        use eventfeed_core::Error;

        match err {
            Error::InvalidTimestamp { .. } => self.invalid_timestamps += 1,
            Error::MissingAttribute { .. } => self.missing_attributes += 1,
            Error::InvalidPrice { .. } => self.invalid_prices += 1,
            Error::NoPriceZones => self.without_zones += 1,
        }
    }
}
