use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::{Collection, CollectionKind, FieldValue, Record};
use crate::error::DashResult;

use super::RecordStore;

/// Batch computation of one field from the other fields of a record.
pub trait DerivedField: Send + Sync {
    fn kind(&self) -> CollectionKind;
    fn field(&self) -> &str;

    /// Value for `record`, or `None` when it cannot be derived yet.
    fn compute(&self, record: &Record) -> Option<FieldValue>;
}

/// `field = minuend - subtrahend`, e.g. altitude gained over a trip.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDifference {
    kind: CollectionKind,
    field: String,
    minuend: String,
    subtrahend: String,
}

impl FieldDifference {
    #[must_use]
    pub fn new(
        kind: CollectionKind,
        field: impl Into<String>,
        minuend: impl Into<String>,
        subtrahend: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            field: field.into(),
            minuend: minuend.into(),
            subtrahend: subtrahend.into(),
        }
    }
}

impl DerivedField for FieldDifference {
    fn kind(&self) -> CollectionKind {
        self.kind
    }

    fn field(&self) -> &str {
        &self.field
    }

    fn compute(&self, record: &Record) -> Option<FieldValue> {
        let minuend = record.get(&self.minuend)?.as_f64()?;
        let subtrahend = record.get(&self.subtrahend)?.as_f64()?;
        let value = minuend - subtrahend;
        value.is_finite().then_some(FieldValue::Number(value))
    }
}

/// Fills a constant into records that have no value yet (default charging price).
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultValue {
    kind: CollectionKind,
    field: String,
    value: FieldValue,
}

impl DefaultValue {
    #[must_use]
    pub fn new(kind: CollectionKind, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            kind,
            field: field.into(),
            value: value.into(),
        }
    }
}

impl DerivedField for DefaultValue {
    fn kind(&self) -> CollectionKind {
        self.kind
    }

    fn field(&self) -> &str {
        &self.field
    }

    fn compute(&self, _record: &Record) -> Option<FieldValue> {
        Some(self.value.clone())
    }
}

/// Values for records where the derived field is absent or null.
#[must_use]
pub fn missing_derived_values(
    collection: &Collection,
    derived: &dyn DerivedField,
) -> Vec<(DateTime<Utc>, FieldValue)> {
    collection
        .records()
        .iter()
        .filter(|record| record.get(derived.field()).is_none_or(|value| value.is_null()))
        .filter_map(|record| Some((record.start_at, derived.compute(record)?)))
        .collect()
}

/// Computes and persists a derived field. Safe to rerun.
pub fn run_derivation<S>(store: &S, derived: &dyn DerivedField) -> DashResult<usize>
where
    S: RecordStore + ?Sized,
{
    let collection = store.load_all(derived.kind())?;
    let values = missing_derived_values(&collection, derived);
    if values.is_empty() {
        return Ok(0);
    }
    let written = store.append_derived_field(derived.kind(), derived.field(), &values)?;
    debug!(
        kind = %derived.kind(),
        field = derived.field(),
        candidates = values.len(),
        written,
        "ran derivation"
    );
    Ok(written)
}
