//! Streaming XML feed reader.
//!
//! Pulls events from a `quick-xml` reader and assembles one
//! [`BaseEventGroup`] at a time. A group is handed out as soon as its
//! `</base_event>` is read and nothing of it is retained afterwards.

use super::SourceStats;
use crate::{Error, Result};
use eventfeed_core::{
    BASE_EVENT_TAG, CandidateRecord, EVENT_TAG, PriceRange, ZONE_TAG, metrics,
    parse_feed_timestamp, parse_price,
};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::BufRead;
use tracing::{debug, warn};

/// One `<event>` element with its raw attribute values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// `price` of every `<zone>` inside the event, in document order.
    pub zone_prices: Vec<Option<String>>,
}

/// One closed `<base_event>` container and its child events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseEventGroup {
    pub base_event_id: Option<String>,
    pub title: Option<String>,
    pub sell_mode: Option<String>,
    pub events: Vec<RawEvent>,
}

/// Container attributes shared by every child, validated once.
struct SharedFields {
    id: String,
    title: String,
    sell_mode: String,
}

impl BaseEventGroup {
    /// Normalize every child event into a candidate.
    ///
    /// The outer error means the container itself is unusable (a shared
    /// attribute is missing) and none of its events can be emitted. Inner
    /// errors are per event; the other events are unaffected.
    pub fn candidates(
        &self,
    ) -> eventfeed_core::Result<impl Iterator<Item = eventfeed_core::Result<CandidateRecord>> + '_>
    {
        let shared = SharedFields {
            id: require(&self.base_event_id, BASE_EVENT_TAG, "base_event_id")?.to_string(),
            title: require(&self.title, BASE_EVENT_TAG, "title")?.to_string(),
            sell_mode: require(&self.sell_mode, BASE_EVENT_TAG, "sell_mode")?.to_string(),
        };

        Ok(self
            .events
            .iter()
            .map(move |event| event.to_candidate(&shared)))
    }
}

impl RawEvent {
    fn to_candidate(&self, shared: &SharedFields) -> eventfeed_core::Result<CandidateRecord> {
        let start_date = parse_feed_timestamp(
            "event_start_date",
            require(&self.start_date, EVENT_TAG, "event_start_date")?,
        )?;
        let end_date = parse_feed_timestamp(
            "event_end_date",
            require(&self.end_date, EVENT_TAG, "event_end_date")?,
        )?;

        let prices = self
            .zone_prices
            .iter()
            .map(|price| parse_price(require(price, ZONE_TAG, "price")?))
            .collect::<eventfeed_core::Result<Vec<f64>>>()?;
        let range = PriceRange::from_prices(prices)?;

        Ok(CandidateRecord {
            id: shared.id.clone(),
            title: shared.title.clone(),
            start_date,
            end_date,
            min_price: range.min,
            max_price: range.max,
            is_online: shared.sell_mode.clone(),
        })
    }
}

fn require<'a>(
    value: &'a Option<String>,
    element: &'static str,
    attribute: &'static str,
) -> eventfeed_core::Result<&'a str> {
    value
        .as_deref()
        .ok_or(eventfeed_core::Error::MissingAttribute { element, attribute })
}

/// Owned view of one pull-parser event.
enum Tag {
    Open(BytesStart<'static>, bool),
    Close(TagKind),
    Eof,
}

#[derive(Clone, Copy)]
enum TagKind {
    BaseEvent,
    Event,
    Other,
}

impl TagKind {
    fn of(name: &[u8]) -> Self {
        if name == BASE_EVENT_TAG.as_bytes() {
            Self::BaseEvent
        } else if name == EVENT_TAG.as_bytes() {
            Self::Event
        } else {
            Self::Other
        }
    }
}

/// Incremental reader over a feed document.
///
/// Single pass: once [`FeedReader::next_group`] returns `Ok(None)` or an
/// error, the reader is exhausted.
pub struct FeedReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    /// Elements currently open.
    depth: usize,
    saw_root: bool,
    finished: bool,
    group: Option<BaseEventGroup>,
    event: Option<RawEvent>,
    stats: SourceStats,
}

impl<'a> FeedReader<&'a [u8]> {
    /// Read a feed held in memory.
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

impl<R: BufRead> FeedReader<R> {
    /// Create a reader over any buffered byte source.
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::with_capacity(8 * 1024),
            depth: 0,
            saw_root: false,
            finished: false,
            group: None,
            event: None,
            stats: SourceStats::default(),
        }
    }

    /// Extraction statistics so far.
    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    /// Read up to the next closed `<base_event>`.
    ///
    /// Returns `Ok(None)` at the end of a well-formed document.
    ///
    /// # Errors
    ///
    /// Malformed XML, a document that ends inside an open element, and a
    /// document without any element are fatal.
    pub fn next_group(&mut self) -> Result<Option<BaseEventGroup>> {
        if self.finished {
            return Ok(None);
        }

        let result = self.read_until_group_closes();
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    fn read_until_group_closes(&mut self) -> Result<Option<BaseEventGroup>> {
        loop {
            self.buf.clear();
            // Copy out what is needed so the borrow of `buf` ends here.
            let tag = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => Tag::Open(e.into_owned(), false),
                Event::Empty(e) => Tag::Open(e.into_owned(), true),
                Event::End(e) => Tag::Close(TagKind::of(e.local_name().as_ref())),
                Event::Eof => Tag::Eof,
                _ => continue,
            };

            match tag {
                Tag::Open(e, self_closing) => {
                    self.saw_root = true;
                    if !self_closing {
                        self.depth += 1;
                    }
                    if let Some(group) = self.open_element(&e, self_closing)? {
                        return Ok(Some(group));
                    }
                }
                Tag::Close(kind) => {
                    self.depth = self.depth.saturating_sub(1);
                    match kind {
                        TagKind::Event => self.close_event(),
                        TagKind::BaseEvent => {
                            if let Some(group) = self.close_group() {
                                return Ok(Some(group));
                            }
                        }
                        TagKind::Other => {}
                    }
                }
                Tag::Eof => {
                    if self.depth > 0 {
                        return Err(Error::Feed(format!(
                            "document ends with {} unclosed element(s) at byte {}",
                            self.depth,
                            self.reader.buffer_position()
                        )));
                    }
                    if !self.saw_root {
                        return Err(Error::Feed("document has no root element".to_string()));
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Handle an opening (or self-closing) tag. Returns a group when a
    /// self-closing `<base_event/>` completes one.
    fn open_element(
        &mut self,
        e: &BytesStart<'_>,
        self_closing: bool,
    ) -> Result<Option<BaseEventGroup>> {
        let name = e.local_name();

        if name.as_ref() == BASE_EVENT_TAG.as_bytes() {
            if let Some(outer) = &self.group {
                return Err(Error::Feed(format!(
                    "<base_event> nested inside container {:?} at byte {}",
                    outer.base_event_id.as_deref().unwrap_or("?"),
                    self.reader.buffer_position()
                )));
            }
            let mut group = BaseEventGroup::default();
            for attr in e.attributes() {
                let attr = attr?;
                let value = attr.unescape_value()?.into_owned();
                match attr.key.local_name().as_ref() {
                    b"base_event_id" => group.base_event_id = Some(value),
                    b"title" => group.title = Some(value),
                    b"sell_mode" => group.sell_mode = Some(value),
                    _ => {}
                }
            }
            self.group = Some(group);
            if self_closing {
                return Ok(self.close_group());
            }
        } else if name.as_ref() == EVENT_TAG.as_bytes() {
            if self.group.is_none() {
                return Ok(None);
            }
            let mut event = RawEvent::default();
            for attr in e.attributes() {
                let attr = attr?;
                let value = attr.unescape_value()?.into_owned();
                match attr.key.local_name().as_ref() {
                    b"event_start_date" => event.start_date = Some(value),
                    b"event_end_date" => event.end_date = Some(value),
                    _ => {}
                }
            }
            self.event = Some(event);
            if self_closing {
                self.close_event();
            }
        } else if name.as_ref() == ZONE_TAG.as_bytes()
            && let Some(event) = self.event.as_mut()
        {
            event.zone_prices.push(attribute(e, b"price")?);
        }

        Ok(None)
    }

    fn close_event(&mut self) {
        if let (Some(event), Some(group)) = (self.event.take(), self.group.as_mut()) {
            group.events.push(event);
        }
    }

    fn close_group(&mut self) -> Option<BaseEventGroup> {
        let group = self.group.take()?;
        self.stats.containers += 1;
        self.stats.events_seen += group.events.len();
        debug!(
            base_event_id = group.base_event_id.as_deref().unwrap_or("?"),
            title = group.title.as_deref().unwrap_or("?"),
            sell_mode = group.sell_mode.as_deref().unwrap_or("?"),
            events = group.events.len(),
            "Read container"
        );
        Some(group)
    }

    /// Drive the reader to the end, normalizing each event and passing the
    /// valid ones to `handler` in document order.
    ///
    /// Events with bad data are logged, counted, and skipped. The handler's
    /// errors and structural feed errors abort the walk.
    pub fn process<F>(&mut self, mut handler: F) -> Result<SourceStats>
    where
        F: FnMut(CandidateRecord) -> Result<()>,
    {
        self.process_containers(|candidates| candidates.into_iter().try_for_each(&mut handler))
    }

    /// Like [`FeedReader::process`], but hands over the valid candidates of
    /// one container at a time.
    ///
    /// A container whose events were all skipped is not passed on.
    pub fn process_containers<F>(&mut self, mut handler: F) -> Result<SourceStats>
    where
        F: FnMut(Vec<CandidateRecord>) -> Result<()>,
    {
        while let Some(group) = self.next_group()? {
            let candidates = match group.candidates() {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(
                        base_event_id = group.base_event_id.as_deref().unwrap_or("?"),
                        events = group.events.len(),
                        "Skipping container: {}",
                        e
                    );
                    self.stats.containers_skipped += 1;
                    for _ in &group.events {
                        self.stats.record_skip(&e);
                    }
                    metrics::increment_labeled(
                        "feed_events_skipped_total",
                        "reason",
                        e.reason(),
                        group.events.len() as u64,
                    );
                    continue;
                }
            };

            let mut valid = Vec::with_capacity(group.events.len());
            for candidate in candidates {
                match candidate {
                    Ok(candidate) => {
                        self.stats.candidates += 1;
                        metrics::increment("feed_events_extracted_total", 1);
                        valid.push(candidate);
                    }
                    Err(e) => {
                        warn!(
                            base_event_id = group.base_event_id.as_deref().unwrap_or("?"),
                            title = group.title.as_deref().unwrap_or("?"),
                            "Skipping event: {}",
                            e
                        );
                        self.stats.record_skip(&e);
                        metrics::increment_labeled(
                            "feed_events_skipped_total",
                            "reason",
                            e.reason(),
                            1,
                        );
                    }
                }
            }

            if !valid.is_empty() {
                handler(valid)?;
            }
        }

        Ok(self.stats.clone())
    }
}

impl<R: BufRead> Iterator for FeedReader<R> {
    type Item = Result<BaseEventGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_group().transpose()
    }
}

/// Extract one attribute value, unescaped.
fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
