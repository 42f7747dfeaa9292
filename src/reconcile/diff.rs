use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::FieldValue;

/// One row of a rendered table, column name to cell value.
pub type TableRow = IndexMap<String, FieldValue>;

/// A changed cell. `row_key` is read from the pre-edit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub row_key: FieldValue,
    pub column_name: String,
    pub previous_value: FieldValue,
    pub new_value: FieldValue,
}

/// How rows of the two snapshots are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowPairing {
    /// Row `i` before is row `i` after. Misattributes edits if rows were reordered.
    ByPosition,
    /// Rows are matched on the key column; reordering is harmless.
    #[default]
    ByKey,
}

/// Every cell that differs between `before` and `after`, in row then column order.
#[must_use]
pub fn diff_snapshots(
    before: &[TableRow],
    after: &[TableRow],
    key_column: &str,
    pairing: RowPairing,
) -> Vec<Diff> {
    let pairs = match pairing {
        RowPairing::ByPosition => pair_by_position(before, after),
        RowPairing::ByKey => pair_by_key(before, after, key_column),
    };

    let mut diffs = Vec::new();
    for (old, new) in pairs {
        let Some(row_key) = old.get(key_column).filter(|key| !key.is_null()) else {
            warn!(key_column, "table row has no key, edits on it are skipped");
            continue;
        };
        diffs.extend(diff_rows(row_key, old, new));
    }
    diffs
}

fn diff_rows(row_key: &FieldValue, old: &TableRow, new: &TableRow) -> Vec<Diff> {
    let columns: IndexSet<&String> = old.keys().chain(new.keys()).collect();
    columns
        .into_iter()
        .filter_map(|column| {
            let previous_value = old.get(column).cloned().unwrap_or_default();
            let new_value = new.get(column).cloned().unwrap_or_default();
            (previous_value != new_value).then(|| Diff {
                row_key: row_key.clone(),
                column_name: column.clone(),
                previous_value,
                new_value,
            })
        })
        .collect()
}

fn pair_by_position<'a>(
    before: &'a [TableRow],
    after: &'a [TableRow],
) -> Vec<(&'a TableRow, &'a TableRow)> {
    if before.len() != after.len() {
        warn!(
            before_len = before.len(),
            after_len = after.len(),
            "snapshots differ in length, extra rows are ignored"
        );
    }
    before.iter().zip(after.iter()).collect()
}

fn pair_by_key<'a>(
    before: &'a [TableRow],
    after: &'a [TableRow],
    key_column: &str,
) -> Vec<(&'a TableRow, &'a TableRow)> {
    let indexed: IndexMap<String, &TableRow> = before
        .iter()
        .filter_map(|row| Some((row.get(key_column)?.to_string(), row)))
        .collect();

    let mut unmatched = 0_usize;
    let pairs: Vec<_> = after
        .iter()
        .filter_map(|row| {
            let paired = row
                .get(key_column)
                .and_then(|key| indexed.get(&key.to_string()))
                .map(|old| (*old, row));
            if paired.is_none() {
                unmatched += 1;
            }
            paired
        })
        .collect();

    if unmatched > 0 {
        warn!(
            key_column,
            unmatched, "edited rows without a matching pre-edit row are ignored"
        );
    }
    pairs
}
