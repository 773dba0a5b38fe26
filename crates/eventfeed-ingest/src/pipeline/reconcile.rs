//! Insert/update/no-op decision for one candidate.
//!
//! Pure: the caller supplies the current record (from pending batches or the
//! catalog) and applies the outcome. Comparison is exact for every field;
//! any drift replaces all compared fields at once.

use eventfeed_core::{CandidateRecord, EventRecord};

/// Outcome of reconciling a candidate against the current record.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// No record exists; the candidate becomes one.
    Insert(EventRecord),
    /// A record exists and differs.
    Update {
        /// The current record with every compared field overwritten.
        record: EventRecord,
        /// The record as it was before the update.
        previous: EventRecord,
        /// Names of the fields that differed.
        changed: Vec<&'static str>,
    },
    /// A record exists and all compared fields are equal.
    NoOp,
}

/// Decide what to do with `candidate` given the `current` record for its id.
///
/// `title` and `id` of an existing record are never touched.
pub fn reconcile(candidate: CandidateRecord, current: Option<EventRecord>) -> Reconciliation {
    let Some(previous) = current else {
        return Reconciliation::Insert(EventRecord::from_candidate(candidate));
    };

    let changed = changed_fields(&previous, &candidate);
    if changed.is_empty() {
        return Reconciliation::NoOp;
    }

    let record = EventRecord {
        id: previous.id.clone(),
        title: previous.title.clone(),
        start_date: candidate.start_date,
        end_date: candidate.end_date,
        min_price: candidate.min_price,
        max_price: candidate.max_price,
        is_online: candidate.is_online,
    };

    Reconciliation::Update {
        record,
        previous,
        changed,
    }
}

/// Compared fields whose values differ, in declaration order.
pub fn changed_fields(current: &EventRecord, candidate: &CandidateRecord) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if current.start_date != candidate.start_date {
        changed.push("start_date");
    }
    if current.end_date != candidate.end_date {
        changed.push("end_date");
    }
    if current.min_price != candidate.min_price {
        changed.push("min_price");
    }
    if current.max_price != candidate.max_price {
        changed.push("max_price");
    }
    if current.is_online != candidate.is_online {
        changed.push("is_online");
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn stored() -> EventRecord {
        EventRecord {
            id: "291".to_string(),
            title: "Camela en concierto".to_string(),
            start_date: Utc.with_ymd_and_hms(2021, 6, 30, 21, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2021, 6, 30, 22, 0, 0).unwrap(),
            min_price: 10.0,
            max_price: 50.0,
            is_online: "online".to_string(),
        }
    }

    fn matching_candidate() -> CandidateRecord {
        let record = stored();
        CandidateRecord {
            id: record.id,
            title: record.title,
            start_date: record.start_date,
            end_date: record.end_date,
            min_price: record.min_price,
            max_price: record.max_price,
            is_online: record.is_online,
        }
    }

    #[test]
    fn test_insert_when_absent() {
        let candidate = matching_candidate();
        match reconcile(candidate.clone(), None) {
            Reconciliation::Insert(record) => {
                assert_eq!(record.id, candidate.id);
                assert_eq!(record.title, candidate.title);
                assert_eq!(record.max_price, candidate.max_price);
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn test_noop_when_equal() {
        assert_eq!(
            reconcile(matching_candidate(), Some(stored())),
            Reconciliation::NoOp
        );
    }

    #[test]
    fn test_update_changes_only_drifted_price() {
        let candidate = CandidateRecord {
            max_price: 55.0,
            ..matching_candidate()
        };

        match reconcile(candidate, Some(stored())) {
            Reconciliation::Update {
                record,
                previous,
                changed,
            } => {
                assert_eq!(changed, vec!["max_price"]);
                assert_eq!(record.max_price, 55.0);
                assert_eq!(record.min_price, 10.0);
                assert_eq!(record.title, "Camela en concierto");
                assert_eq!(record.start_date, previous.start_date);
                assert_eq!(record.end_date, previous.end_date);
                assert_eq!(record.is_online, previous.is_online);
                assert_eq!(previous, stored());
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_title_is_never_updated() {
        let candidate = CandidateRecord {
            title: "Renamed".to_string(),
            ..matching_candidate()
        };
        // Title alone is not compared
        assert_eq!(reconcile(candidate.clone(), Some(stored())), Reconciliation::NoOp);

        let candidate = CandidateRecord {
            is_online: "offline".to_string(),
            ..candidate
        };
        match reconcile(candidate, Some(stored())) {
            Reconciliation::Update { record, changed, .. } => {
                assert_eq!(changed, vec!["is_online"]);
                assert_eq!(record.title, "Camela en concierto");
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_exact_comparison_has_no_tolerance() {
        let base = stored();
        let candidate = CandidateRecord {
            start_date: base.start_date + Duration::milliseconds(1),
            min_price: base.min_price + f64::EPSILON * 16.0,
            ..matching_candidate()
        };

        match reconcile(candidate, Some(base)) {
            Reconciliation::Update { changed, .. } => {
                assert_eq!(changed, vec!["start_date", "min_price"]);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }
}
