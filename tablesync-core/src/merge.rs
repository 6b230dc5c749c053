//! Last-writer-wins reconciliation of two record collections.
//!
//! ## Algorithm
//!
//! 1. Seed an ordered map from `primary`, keyed by normalised primary key.
//! 2. Walk `secondary`: unknown keys are appended, known keys are replaced
//!    only when the incoming timestamp is strictly later.
//! 3. Emit the map values in insertion order.
//!
//! Ties keep the entry that was seen first, so `primary` wins ties. Every
//! record is validated up front: a missing field, an unusable key or an
//! unparseable timestamp in either input fails the whole call.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;

use crate::error::{MergeError, Side};
use crate::types::{parse_timestamp, Collection, Record, RecordKey};

/// Counters describing how a merge resolved the secondary input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Secondary records that replaced an existing entry (strictly newer).
    pub replaced: usize,
    /// Secondary records whose key was new and got appended.
    pub appended: usize,
    /// Secondary records discarded because the existing entry was as new or newer.
    pub kept: usize,
}

/// Merge result plus its [`MergeStats`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub records: Collection,
    pub stats: MergeStats,
}

struct Slot<'a> {
    stamp: NaiveDateTime,
    record: &'a Record,
}

/// Merge `secondary` into `primary`; see the module docs for the rules.
pub fn merge(
    primary: &[Record],
    secondary: &[Record],
    pk_field: &str,
    date_field: &str,
) -> Result<Collection, MergeError> {
    merge_with_stats(primary, secondary, pk_field, date_field).map(|outcome| outcome.records)
}

/// Like [`merge`], also reporting how many secondary records won, lost or
/// were new.
pub fn merge_with_stats(
    primary: &[Record],
    secondary: &[Record],
    pk_field: &str,
    date_field: &str,
) -> Result<MergeOutcome, MergeError> {
    let mut order: Vec<RecordKey> = Vec::with_capacity(primary.len() + secondary.len());
    let mut slots: HashMap<RecordKey, Slot<'_>> = HashMap::with_capacity(order.capacity());
    let mut stats = MergeStats::default();

    for (side, records) in [(Side::Primary, primary), (Side::Secondary, secondary)] {
        for (index, record) in records.iter().enumerate() {
            let key = record_key(record, pk_field, side, index)?;
            let stamp = record_timestamp(record, date_field, side, index, &key)?;

            match slots.entry(key) {
                Entry::Occupied(mut existing) => {
                    if stamp > existing.get().stamp {
                        existing.insert(Slot { stamp, record });
                        if side == Side::Secondary {
                            stats.replaced += 1;
                        }
                    } else if side == Side::Secondary {
                        stats.kept += 1;
                    }
                }
                Entry::Vacant(vacant) => {
                    order.push(vacant.key().clone());
                    vacant.insert(Slot { stamp, record });
                    if side == Side::Secondary {
                        stats.appended += 1;
                    }
                }
            }
        }
    }

    let records = order
        .iter()
        .filter_map(|key| slots.remove(key))
        .map(|slot| slot.record.clone())
        .collect();

    Ok(MergeOutcome { records, stats })
}

/// Extract and normalise the primary key of `record`.
pub fn record_key(
    record: &Record,
    pk_field: &str,
    side: Side,
    index: usize,
) -> Result<RecordKey, MergeError> {
    let raw = record
        .get(pk_field)
        .ok_or_else(|| MergeError::MalformedRecord {
            side,
            index,
            field: pk_field.to_string(),
        })?;
    RecordKey::from_value(raw).ok_or_else(|| MergeError::InvalidKey {
        side,
        index,
        field: pk_field.to_string(),
        value: raw.clone(),
    })
}

fn record_timestamp(
    record: &Record,
    date_field: &str,
    side: Side,
    index: usize,
    key: &RecordKey,
) -> Result<NaiveDateTime, MergeError> {
    let raw = record
        .get(date_field)
        .ok_or_else(|| MergeError::MalformedRecord {
            side,
            index,
            field: date_field.to_string(),
        })?;
    match raw {
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
    .ok_or_else(|| MergeError::UnparseableTimestamp {
        side,
        key: key.clone(),
        field: date_field.to_string(),
        value: raw.clone(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn newer_secondary_replaces_and_new_keys_append() {
        let a = vec![rec(json!({"id": 1, "updated_at": "2021-01-01 00:00"}))];
        let b = vec![
            rec(json!({"id": 1, "updated_at": "2021-06-01 00:00"})),
            rec(json!({"id": 2, "updated_at": "2021-01-01 00:00"})),
        ];
        let outcome = merge_with_stats(&a, &b, "id", "updated_at").unwrap();
        assert_eq!(outcome.records, b);
        assert_eq!(
            outcome.stats,
            MergeStats {
                replaced: 1,
                appended: 1,
                kept: 0
            }
        );
    }

    #[test]
    fn tie_keeps_primary() {
        let a = vec![rec(json!({"id": 1, "updated_at": "2021-01-01 00:00", "v": "a"}))];
        let b = vec![rec(json!({"id": "1", "updated_at": "2021-01-01 00:00", "v": "b"}))];
        let merged = merge(&a, &b, "id", "updated_at").unwrap();
        assert_eq!(merged, a);
    }

    #[test]
    fn duplicate_keys_within_one_input_collapse() {
        let a = vec![
            rec(json!({"id": 1, "updated_at": "2021-01-01 00:00", "v": "old"})),
            rec(json!({"id": 1, "updated_at": "2021-02-01 00:00", "v": "new"})),
        ];
        let merged = merge(&a, &[], "id", "updated_at").unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0]["v"], json!("new"));
    }

    #[test]
    fn missing_key_field_is_malformed() {
        let a = vec![rec(json!({"updated_at": "2021-01-01 00:00"}))];
        let err = merge(&a, &[], "id", "updated_at").unwrap_err();
        assert!(matches!(
            err,
            MergeError::MalformedRecord { side: Side::Primary, index: 0, ref field } if field == "id"
        ));
    }

    #[test]
    fn missing_date_field_is_malformed() {
        let b = vec![
            rec(json!({"id": 1, "updated_at": "2021-01-01 00:00"})),
            rec(json!({"id": 2})),
        ];
        let err = merge(&[], &b, "id", "updated_at").unwrap_err();
        assert!(matches!(
            err,
            MergeError::MalformedRecord { side: Side::Secondary, index: 1, ref field } if field == "updated_at"
        ));
    }

    #[test]
    fn null_key_is_invalid() {
        let a = vec![rec(json!({"id": null, "updated_at": "2021-01-01 00:00"}))];
        let err = merge(&a, &[], "id", "updated_at").unwrap_err();
        assert!(matches!(err, MergeError::InvalidKey { .. }));
    }

    #[test]
    fn unparseable_timestamp_is_fatal() {
        let a = vec![rec(json!({"id": 1, "updated_at": "2021-01-01 00:00"}))];
        let b = vec![rec(json!({"id": 1, "updated_at": "not a date"}))];
        let err = merge(&a, &b, "id", "updated_at").unwrap_err();
        assert!(matches!(
            err,
            MergeError::UnparseableTimestamp { side: Side::Secondary, key: RecordKey::Int(1), .. }
        ));
        assert!(err.to_string().contains("not a date"));
    }

    #[test]
    fn non_string_timestamp_is_unparseable() {
        let a = vec![rec(json!({"id": 1, "updated_at": null}))];
        let err = merge(&a, &[], "id", "updated_at").unwrap_err();
        assert!(matches!(err, MergeError::UnparseableTimestamp { .. }));
    }

    #[test]
    fn custom_field_names_are_honoured() {
        let a = vec![rec(json!({"Id": "a", "Modified": "2021-01-01"}))];
        let b = vec![rec(json!({"Id": "a", "Modified": "2021-01-02"}))];
        let merged = merge(&a, &b, "Id", "Modified").unwrap();
        assert_eq!(merged, b);
    }
}
