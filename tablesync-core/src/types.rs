//! Domain types for table records.
//!
//! Records stay schemaless (`serde_json::Map`); only the primary-key and
//! timestamp fields are interpreted, through [`RecordKey`] and
//! [`parse_timestamp`].

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single table row: field name to arbitrary JSON value.
pub type Record = Map<String, Value>;

/// An ordered sequence of records. Order of first appearance is preserved by
/// every operation in this workspace.
pub type Collection = Vec<Record>;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of the remote table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName(pub String);

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TableName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TableName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Project (namespace) slug the remote table lives under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectSlug(pub String);

impl fmt::Display for ProjectSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectSlug {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectSlug {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Primary keys
// ---------------------------------------------------------------------------

/// Normalised primary-key value.
///
/// `1`, `"1"` and `1.0` all normalise to `RecordKey::Int(1)`, so records whose
/// keys differ only in JSON type are treated as the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum RecordKey {
    Int(i64),
    Text(String),
}

impl RecordKey {
    /// Normalise a raw JSON key. Returns `None` for `null`, booleans,
    /// containers, blank strings and non-integral numbers.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Some(Self::Int(i));
                }
                if let Some(u) = n.as_u64() {
                    // Larger than i64::MAX: keep the digits so the string form
                    // of the same key still matches.
                    return Some(Self::Text(u.to_string()));
                }
                n.as_f64().and_then(integral_f64).map(Self::Int)
            }
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                if let Ok(i) = trimmed.parse::<i64>() {
                    return Some(Self::Int(i));
                }
                if let Some(i) = trimmed.parse::<f64>().ok().and_then(integral_f64) {
                    return Some(Self::Int(i));
                }
                Some(Self::Text(trimmed.to_owned()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Int(i) => i.fmt(f),
            RecordKey::Text(s) => s.fmt(f),
        }
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn integral_f64(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Format used when this tool writes a timestamp into a record.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%d %H:%M%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse a record timestamp into its naive wall-clock value.
///
/// Any timezone annotation is accepted and then discarded:
/// `2021-01-01 10:00+02:00` and `2021-01-01 10:00Z` compare equal. This is a
/// known limitation for tables edited from several timezones, kept so that
/// comparisons match the stored wall-clock text.
///
/// Dates may use `/` as separator (`2021/10/25 12:01`), and offsets may give
/// hours only (`+00`, as PostgreSQL prints `timestamptz`).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut s = trimmed.to_string();
    if date_part(&s).contains('/') {
        s = s.replacen('/', "-", 2);
    }
    if let Some(expanded) = expand_hour_offset(&s) {
        s = expanded;
    }
    parse_normalised(&s)
}

fn parse_normalised(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_local());
        }
    }

    let naive = s
        .strip_suffix('Z')
        .or_else(|| s.strip_suffix('z'))
        .unwrap_or(s);
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn date_part(s: &str) -> &str {
    s.split(|c: char| c == ' ' || c == 'T').next().unwrap_or(s)
}

/// `12:01:02+00` -> `12:01:02+00:00`. Only a sign after the time part
/// counts, so the day of a bare date (`2021-10-25`) is left alone.
fn expand_hour_offset(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let n = bytes.len();
    if n < 4 {
        return None;
    }
    let sign = bytes[n - 3];
    let shaped = matches!(sign, b'+' | b'-')
        && bytes[n - 4].is_ascii_digit()
        && bytes[n - 2].is_ascii_digit()
        && bytes[n - 1].is_ascii_digit();
    if !shaped {
        return None;
    }
    let last_colon = s.rfind(':')?;
    (last_colon < n - 3).then(|| format!("{s}:00"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
