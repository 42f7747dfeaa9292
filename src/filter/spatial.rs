//! Map selections become field predicates in two explicit steps:
//! spatial selection -> record id range -> `id` range predicate.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{FIELD_ID, FieldValue};
use crate::error::{DashError, DashResult};

use super::predicate::FilterPredicate;
use super::view::Dataset;

/// Selection made on a geographic view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpatialSelection {
    /// Record ids of the picked map points (1-indexed).
    Points { record_ids: Vec<u64> },
    /// Lasso or box selection bounds, inclusive.
    BoundingBox {
        lat_min: f64,
        lat_max: f64,
        long_min: f64,
        long_max: f64,
    },
}

/// Inclusive range of 1-indexed record ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub first: u64,
    pub last: u64,
}

impl IdRange {
    #[must_use]
    pub fn contains(self, id: u64) -> bool {
        id >= self.first && id <= self.last
    }

    #[must_use]
    pub fn to_predicate(self) -> FilterPredicate {
        FilterPredicate::range(FIELD_ID, self.first, self.last)
    }
}

/// Step one: ids of the map rows picked by the selection, ascending.
///
/// Ids absent from `map_dataset` are dropped with a warning.
#[must_use]
pub fn selected_record_ids(
    selection: &SpatialSelection,
    map_dataset: &Dataset,
    axes: (&str, &str),
) -> Vec<u64> {
    let known = map_dataset.ids();
    let mut ids: Vec<u64> = match selection {
        SpatialSelection::Points { record_ids } => {
            let (kept, dropped): (Vec<u64>, Vec<u64>) =
                record_ids.iter().copied().partition(|id| known.contains(id));
            if !dropped.is_empty() {
                warn!(
                    view = %map_dataset.view,
                    dropped = ?dropped,
                    "map selection references unknown record ids"
                );
            }
            kept
        }
        SpatialSelection::BoundingBox {
            lat_min,
            lat_max,
            long_min,
            long_max,
        } => {
            let (lat_field, long_field) = axes;
            let lat_range = ordered(*lat_min, *lat_max);
            let long_range = ordered(*long_min, *long_max);
            map_dataset
                .rows
                .iter()
                .filter(|row| {
                    within(row.get(lat_field), lat_range) && within(row.get(long_field), long_range)
                })
                .filter_map(|row| row.id())
                .collect()
        }
    };
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Step two: the smallest id range covering the selected ids.
#[must_use]
pub fn ids_to_range(ids: &[u64]) -> Option<IdRange> {
    let first = *ids.iter().min()?;
    let last = *ids.iter().max()?;
    Some(IdRange { first, last })
}

/// Full translation.
///
/// No picked points (`Ok(None)`) clears the filter. A box over an empty area
/// selects nothing, so it yields an empty `id` set and the linked views
/// show no rows.
pub fn spatial_to_predicate(
    selection: &SpatialSelection,
    map_dataset: &Dataset,
    axes: (&str, &str),
) -> DashResult<Option<FilterPredicate>> {
    if let SpatialSelection::Points { record_ids } = selection {
        if record_ids.is_empty() {
            return Ok(None);
        }
    }

    let ids = selected_record_ids(selection, map_dataset, axes);
    match ids_to_range(&ids) {
        Some(range) => Ok(Some(range.to_predicate())),
        None if matches!(selection, SpatialSelection::BoundingBox { .. }) => {
            Ok(Some(FilterPredicate::one_of(FIELD_ID, Vec::new())))
        }
        None => Err(DashError::InvalidPredicate(format!(
            "map selection on {} matches no known rows",
            map_dataset.view
        ))),
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

fn within(value: Option<&FieldValue>, (min, max): (f64, f64)) -> bool {
    value
        .and_then(FieldValue::as_f64)
        .is_some_and(|value| value >= min && value <= max)
}
