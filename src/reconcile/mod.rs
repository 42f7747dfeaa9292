//! Edit reconciliation: typed diffs between rendered table snapshots, applied
//! as point updates to the record store.

mod diff;
mod reconciler;

pub use diff::{Diff, RowPairing, TableRow, diff_snapshots};
pub use reconciler::{ApplyOutcome, EditReconciler, ReconcileReport, default_editable_columns};
