use serde::{Deserialize, Serialize};

use crate::core::{Collection, CollectionKind, Record};
use crate::filter::{Dataset, ProjectedRow, ViewBinding, ViewKind};

use super::config::CellDetailConfig;

/// Focused cell of a rendered table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCell {
    /// Index into the rows currently displayed.
    pub row: usize,
    pub column_id: String,
    /// 1-indexed record id of the row, when the table exposes it.
    pub row_id: Option<u64>,
}

/// Detail popup requested by an active cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellDetail {
    /// Charging-speed curve for one charging session.
    BatteryCurve { row: ProjectedRow },
    /// Altitude profile of one trip.
    Altitude { record: Record },
}

/// Resolves an active table cell into the detail it opens, if any.
#[must_use]
pub(super) fn resolve_cell_detail(
    config: &CellDetailConfig,
    binding: &ViewBinding,
    displayed: &Dataset,
    source: &Collection,
    cell: &ActiveCell,
) -> Option<CellDetail> {
    if binding.kind != ViewKind::Table {
        return None;
    }
    let column = cell.column_id.as_str();
    match source.kind() {
        CollectionKind::Chargings if contains(&config.battery_curve_columns, column) => {
            displayed
                .rows
                .get(cell.row)
                .cloned()
                .map(|row| CellDetail::BatteryCurve { row })
        }
        CollectionKind::Trips if contains(&config.altitude_columns, column) => source
            .find_by_id(cell.row_id?)
            .cloned()
            .map(|record| CellDetail::Altitude { record }),
        _ => None,
    }
}

fn contains(columns: &[String], column: &str) -> bool {
    columns.iter().any(|c| c == column)
}
