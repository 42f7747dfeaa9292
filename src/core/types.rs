use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::primitives::{datetime_to_unix_millis, parse_decimal_number, parse_timestamp};
use crate::error::{DashError, DashResult};

pub const FIELD_ID: &str = "id";
pub const FIELD_START_AT: &str = "start_at";
pub const FIELD_END_AT: &str = "end_at";

/// Record families owned by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Trips,
    Chargings,
}

impl CollectionKind {
    pub const ALL: [Self; 2] = [Self::Trips, Self::Chargings];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trips => "trips",
            Self::Chargings => "chargings",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trips" => Ok(Self::Trips),
            "chargings" => Ok(Self::Chargings),
            other => Err(DashError::InvalidData(format!(
                "unknown collection kind: {other}"
            ))),
        }
    }
}

/// A single cell value of a record or rendered table row.
///
/// Deserialization tries timestamps before plain text, so RFC 3339 strings
/// arriving from JSON become `Time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Time(DateTime<Utc>),
    Text(String),
}

impl FieldValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value. Text cells holding a decimal literal count.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => parse_decimal_number(text),
            Self::Time(time) => Some(datetime_to_unix_millis(*time) as f64),
            Self::Null | Self::Bool(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Timestamp view of the value, used to resolve `start_at` keys.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(time) => Some(*time),
            Self::Text(text) => parse_timestamp(text),
            _ => None,
        }
    }

    /// Orders two values when they are comparable.
    ///
    /// Timestamps compare against numbers as epoch milliseconds, which is the
    /// unit of the date slider. `Null` is never comparable.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            (Self::Time(_), Self::Number(_)) | (Self::Number(_), Self::Time(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Self::Time(a), Self::Text(_)) => Some(a.cmp(&other.as_timestamp()?)),
            (Self::Text(_), Self::Time(b)) => Some(self.as_timestamp()?.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Number(_), Self::Text(_)) | (Self::Text(_), Self::Number(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            _ => None,
        }
    }

    /// Loose equality used by filters; strict `PartialEq` is used by diffs.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Time(time) => write!(f, "{}", time.to_rfc3339()),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Time(value)
    }
}

/// One trip or one charging session.
///
/// `id` is the 1-indexed position inside the owning collection and is
/// assigned by [`Collection::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub id: u64,
    pub start_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: IndexMap<String, FieldValue>,
}

impl Record {
    #[must_use]
    pub fn new(start_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            start_at,
            end_at: None,
            fields: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_end_at(mut self, end_at: DateTime<Utc>) -> Self {
        self.end_at = Some(end_at);
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn start_at_millis(&self) -> i64 {
        datetime_to_unix_millis(self.start_at)
    }

    /// Reads any field, including the built-in `id`, `start_at` and `end_at`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<FieldValue> {
        match field {
            FIELD_ID => Some(FieldValue::from(self.id)),
            FIELD_START_AT => Some(FieldValue::Time(self.start_at)),
            FIELD_END_AT => Some(self.end_at.map_or(FieldValue::Null, FieldValue::Time)),
            other => self.fields.get(other).cloned(),
        }
    }

    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        matches!(field, FIELD_ID | FIELD_START_AT | FIELD_END_AT) || self.fields.contains_key(field)
    }

    /// Writes a field. The identity columns `id` and `start_at` are read-only.
    pub fn set(&mut self, field: &str, value: FieldValue) -> DashResult<()> {
        match field {
            FIELD_ID | FIELD_START_AT => Err(DashError::InvalidData(format!(
                "{field} is an identity column and cannot be updated"
            ))),
            FIELD_END_AT => {
                self.end_at = match value {
                    FieldValue::Null => None,
                    other => Some(other.as_timestamp().ok_or_else(|| {
                        DashError::InvalidData("end_at must be a timestamp".to_owned())
                    })?),
                };
                Ok(())
            }
            other => {
                self.fields.insert(other.to_owned(), value);
                Ok(())
            }
        }
    }
}

/// Ordered records of one kind. Sorted by `start_at`, which is unique.
///
/// Only built through [`Collection::new`], so there is no `Deserialize`;
/// load raw records and canonicalize them instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    kind: CollectionKind,
    records: Vec<Record>,
}

impl Collection {
    /// Builds a canonical collection: sorted by `start_at`, the last record of
    /// a duplicated `start_at` wins, ids reassigned from 1.
    #[must_use]
    pub fn new(kind: CollectionKind, records: Vec<Record>) -> Self {
        Self {
            kind,
            records: canonicalize_records(kind, records),
        }
    }

    #[must_use]
    pub fn empty(kind: CollectionKind) -> Self {
        Self {
            kind,
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First and last `start_at`. Only the endpoints are consulted.
    #[must_use]
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.records.first()?.start_at, self.records.last()?.start_at))
    }

    #[must_use]
    pub fn find_by_start_at(&self, start_at: DateTime<Utc>) -> Option<&Record> {
        self.position_of(start_at).map(|index| &self.records[index])
    }

    #[must_use]
    pub fn find_by_id(&self, id: u64) -> Option<&Record> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.records.get(index)
    }

    #[must_use]
    pub fn position_of(&self, start_at: DateTime<Utc>) -> Option<usize> {
        self.records
            .binary_search_by(|record| record.start_at.cmp(&start_at))
            .ok()
    }

    pub(crate) fn record_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.records.get_mut(index)
    }
}

fn canonicalize_records(kind: CollectionKind, mut records: Vec<Record>) -> Vec<Record> {
    let original_len = records.len();
    records.sort_by(|a, b| a.start_at.cmp(&b.start_at));

    let mut deduped: Vec<Record> = Vec::with_capacity(records.len());
    let mut duplicate_count = 0_usize;
    for record in records {
        if let Some(last) = deduped.last_mut() {
            if last.start_at == record.start_at {
                *last = record;
                duplicate_count += 1;
                continue;
            }
        }
        deduped.push(record);
    }

    for (index, record) in deduped.iter_mut().enumerate() {
        record.id = index as u64 + 1;
    }

    if duplicate_count > 0 {
        warn!(
            %kind,
            original_len,
            duplicate_count,
            canonical_count = deduped.len(),
            "canonicalized records with duplicate start_at"
        );
    }
    deduped
}
