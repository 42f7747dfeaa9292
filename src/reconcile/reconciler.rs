use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::core::{CollectionKind, FIELD_START_AT, FieldValue, Record};
use crate::error::DashError;
use crate::store::RecordStore;

use super::diff::{Diff, RowPairing, TableRow, diff_snapshots};

/// Result of applying one diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied { diff: Diff, record: Record },
    /// The store has no row for the key: table and store have diverged.
    NotFound { diff: Diff },
    /// The column is not editable for this collection.
    Ignored { diff: Diff },
    /// The store rejected or could not run the update.
    Failed { diff: Diff, error: String },
}

impl ApplyOutcome {
    #[must_use]
    pub fn diff(&self) -> &Diff {
        match self {
            Self::Applied { diff, .. }
            | Self::NotFound { diff }
            | Self::Ignored { diff }
            | Self::Failed { diff, .. } => diff,
        }
    }

    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Per-diff outcomes of one edit event, in emission order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub outcomes: Vec<ApplyOutcome>,
}

impl ReconcileReport {
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    #[must_use]
    pub fn not_found(&self) -> Vec<&Diff> {
        self.outcomes
            .iter()
            .filter(|o| o.is_not_found())
            .map(ApplyOutcome::diff)
            .collect()
    }

    /// True when any diff hit a row the store no longer has.
    #[must_use]
    pub fn has_divergence(&self) -> bool {
        self.outcomes.iter().any(ApplyOutcome::is_not_found)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Columns a user may edit out of the box: the charging price.
#[must_use]
pub fn default_editable_columns() -> IndexMap<CollectionKind, Vec<String>> {
    let mut editable = IndexMap::new();
    editable.insert(CollectionKind::Chargings, vec!["price".to_owned()]);
    editable
}

/// Turns table edits into store updates.
///
/// Starts with [`default_editable_columns`]; `with_editable` overrides one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct EditReconciler {
    key_column: String,
    pairing: RowPairing,
    editable: IndexMap<CollectionKind, Vec<String>>,
}

impl Default for EditReconciler {
    fn default() -> Self {
        Self::new(FIELD_START_AT)
    }
}

impl EditReconciler {
    #[must_use]
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            pairing: RowPairing::default(),
            editable: default_editable_columns(),
        }
    }

    #[must_use]
    pub fn with_pairing(mut self, pairing: RowPairing) -> Self {
        self.pairing = pairing;
        self
    }

    #[must_use]
    pub fn with_editable(mut self, kind: CollectionKind, columns: &[&str]) -> Self {
        self.editable
            .insert(kind, columns.iter().map(|c| (*c).to_owned()).collect());
        self
    }

    pub(crate) fn set_editable(&mut self, editable: IndexMap<CollectionKind, Vec<String>>) {
        self.editable = editable;
    }

    #[must_use]
    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    #[must_use]
    pub fn is_editable(&self, kind: CollectionKind, column: &str) -> bool {
        column != self.key_column
            && self
                .editable
                .get(&kind)
                .is_some_and(|columns| columns.iter().any(|c| c == column))
    }

    #[must_use]
    pub fn diff(&self, before: &[TableRow], after: &[TableRow]) -> Vec<Diff> {
        diff_snapshots(before, after, &self.key_column, self.pairing)
    }

    /// Applies one diff as a point update keyed by its row key.
    ///
    /// Never fails: NotFound and store errors are logged and reported.
    pub fn apply<S>(&self, store: &S, kind: CollectionKind, diff: Diff) -> ApplyOutcome
    where
        S: RecordStore + ?Sized,
    {
        if !self.is_editable(kind, &diff.column_name) {
            debug!(%kind, column = %diff.column_name, "edit on read-only column ignored");
            return ApplyOutcome::Ignored { diff };
        }

        let value = coerce_like(&diff.previous_value, diff.new_value.clone());
        match store.update_field(kind, &diff.row_key, &diff.column_name, value) {
            Ok(Some(record)) => {
                debug!(
                    %kind,
                    row_key = %diff.row_key,
                    column = %diff.column_name,
                    value = %diff.new_value,
                    "applied table edit"
                );
                ApplyOutcome::Applied { diff, record }
            }
            Ok(None) => {
                let err = DashError::ReconciliationNotFound {
                    kind,
                    row_key: diff.row_key.to_string(),
                };
                error!(error = %err, column = %diff.column_name, "table and store diverged");
                ApplyOutcome::NotFound { diff }
            }
            Err(err) => {
                error!(%kind, row_key = %diff.row_key, error = %err, "table edit not applied");
                ApplyOutcome::Failed {
                    diff,
                    error: err.to_string(),
                }
            }
        }
    }

    /// Diffs two snapshots and applies every diff in emission order.
    pub fn reconcile<S>(
        &self,
        store: &S,
        kind: CollectionKind,
        before: &[TableRow],
        after: &[TableRow],
    ) -> ReconcileReport
    where
        S: RecordStore + ?Sized,
    {
        let outcomes: Vec<ApplyOutcome> = self
            .diff(before, after)
            .into_iter()
            .map(|diff| self.apply(store, kind, diff))
            .collect();
        let report = ReconcileReport { outcomes };
        if report.has_divergence() {
            warn!(
                %kind,
                not_found = report.not_found().len(),
                "edit reconciled against a stale snapshot"
            );
        }
        report
    }
}

/// Numeric and date columns edited as text are stored with their original type.
fn coerce_like(previous: &FieldValue, new_value: FieldValue) -> FieldValue {
    let FieldValue::Text(text) = &new_value else {
        return new_value;
    };
    match previous {
        FieldValue::Number(_) | FieldValue::Null if text.trim().is_empty() => FieldValue::Null,
        FieldValue::Number(_) | FieldValue::Null => {
            new_value.as_f64().map_or(new_value, FieldValue::Number)
        }
        FieldValue::Time(_) => new_value.as_timestamp().map_or(new_value, FieldValue::Time),
        _ => new_value,
    }
}
