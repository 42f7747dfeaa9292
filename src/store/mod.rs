//! Record Store contract consumed by the dashboard core.
//!
//! The store is the only writer of persisted state. Every call acquires its
//! backing resource, uses it and releases it before returning.

mod derived;
mod memory;
mod session;

use chrono::{DateTime, Utc};

use crate::core::{Collection, CollectionKind, FieldValue, Record};
use crate::error::DashResult;

pub use derived::{DefaultValue, DerivedField, FieldDifference, missing_derived_values, run_derivation};
pub use memory::MemoryStore;

/// Callback invoked after a write changed persisted data.
pub type ChangeListener = Box<dyn Fn(CollectionKind) + Send + Sync>;

/// Point-update surface keyed by `start_at`.
pub trait RecordStore {
    /// Loads a full collection, sorted by `start_at`.
    fn load_all(&self, kind: CollectionKind) -> DashResult<Collection>;

    /// Sets one field of the record whose `start_at` matches `row_key`.
    ///
    /// Returns the updated record, or `None` when no record matches. The
    /// update is atomic: either the field is written or nothing changes.
    fn update_field(
        &self,
        kind: CollectionKind,
        row_key: &FieldValue,
        field: &str,
        value: FieldValue,
    ) -> DashResult<Option<Record>>;

    /// Batch-writes a computed field. Rerunning with the same values is a no-op.
    ///
    /// The batch is all-or-nothing: if any value is rejected, no row changes.
    ///
    /// Derived writes happen as part of a refresh and do not notify listeners.
    /// Returns the number of records whose value changed.
    fn append_derived_field(
        &self,
        kind: CollectionKind,
        field: &str,
        values: &[(DateTime<Utc>, FieldValue)],
    ) -> DashResult<usize>;

    /// Registers a callback fired whenever persisted data changes.
    fn subscribe(&self, listener: ChangeListener);
}
