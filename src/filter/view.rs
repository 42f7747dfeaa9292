use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::core::{
    Collection, CollectionKind, FIELD_END_AT, FIELD_ID, FIELD_START_AT, FieldValue, Record,
};
use crate::error::{DashError, DashResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(String);

impl ViewId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ViewId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Graph,
    /// Geographic view; the first two projected fields are latitude and longitude.
    Map,
    Table,
}

/// Declares what a view renders and which of its fields accept selections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewBinding {
    pub id: ViewId,
    pub kind: ViewKind,
    pub sources: Vec<CollectionKind>,
    /// Projected fields. Empty projects every field (tables).
    pub fields: Vec<String>,
    pub filterable: Vec<String>,
}

impl ViewBinding {
    /// Graph over `x_field` against `y_fields`, selectable on `x_field`.
    #[must_use]
    pub fn graph(
        id: impl Into<ViewId>,
        source: CollectionKind,
        x_field: impl Into<String>,
        y_fields: &[&str],
    ) -> Self {
        let x_field = x_field.into();
        let mut fields = vec![x_field.clone()];
        fields.extend(y_fields.iter().map(|field| (*field).to_owned()));
        Self {
            id: id.into(),
            kind: ViewKind::Graph,
            sources: vec![source],
            fields,
            filterable: vec![x_field],
        }
    }

    /// Map view. Selections on it are spatial and resolve to record ids.
    #[must_use]
    pub fn map(
        id: impl Into<ViewId>,
        source: CollectionKind,
        lat_field: impl Into<String>,
        long_field: impl Into<String>,
        extra_fields: &[&str],
    ) -> Self {
        let mut fields = vec![lat_field.into(), long_field.into()];
        fields.extend(extra_fields.iter().map(|field| (*field).to_owned()));
        Self {
            id: id.into(),
            kind: ViewKind::Map,
            sources: vec![source],
            fields,
            filterable: vec![FIELD_ID.to_owned()],
        }
    }

    /// Table projecting every field of its collection.
    #[must_use]
    pub fn table(id: impl Into<ViewId>, source: CollectionKind) -> Self {
        Self {
            id: id.into(),
            kind: ViewKind::Table,
            sources: vec![source],
            fields: Vec::new(),
            filterable: vec![FIELD_START_AT.to_owned()],
        }
    }

    #[must_use]
    pub fn with_sources(mut self, sources: Vec<CollectionKind>) -> Self {
        self.sources = sources;
        self
    }

    #[must_use]
    pub fn with_filterable(mut self, fields: &[&str]) -> Self {
        self.filterable = fields.iter().map(|field| (*field).to_owned()).collect();
        self
    }

    pub fn validate(&self) -> DashResult<()> {
        if self.id.as_str().is_empty() {
            return Err(DashError::InvalidData("view id must not be empty".to_owned()));
        }
        if self.sources.is_empty() {
            return Err(DashError::InvalidData(format!(
                "view {} must render at least one collection",
                self.id
            )));
        }
        if self.kind == ViewKind::Map && self.fields.len() < 2 {
            return Err(DashError::InvalidData(format!(
                "map view {} needs latitude and longitude fields",
                self.id
            )));
        }
        Ok(())
    }

    /// `(latitude, longitude)` field names of a map view.
    #[must_use]
    pub fn map_axes(&self) -> Option<(&str, &str)> {
        if self.kind != ViewKind::Map {
            return None;
        }
        match self.fields.as_slice() {
            [lat, long, ..] => Some((lat.as_str(), long.as_str())),
            _ => None,
        }
    }

    #[must_use]
    pub fn accepts_selection_on(&self, field: &str) -> bool {
        self.filterable.iter().any(|candidate| candidate == field)
    }

    /// Whether projected rows carry `field`. `id` and `start_at` are always carried.
    #[must_use]
    pub fn carries(&self, field: &str) -> bool {
        self.fields.is_empty()
            || field == FIELD_ID
            || field == FIELD_START_AT
            || self.fields.iter().any(|candidate| candidate == field)
    }

    #[must_use]
    pub fn shares_source_with(&self, other: &Self) -> bool {
        self.sources.iter().any(|kind| other.sources.contains(kind))
    }

    /// Projects the bound collections into this view's rows, ordered by `start_at`.
    #[must_use]
    pub fn project(&self, collections: &IndexMap<CollectionKind, Collection>) -> Dataset {
        let mut rows = Vec::new();
        for kind in &self.sources {
            if let Some(collection) = collections.get(kind) {
                rows.extend(project_records(*kind, collection.records(), &self.fields));
            }
        }
        if self.sources.len() > 1 {
            rows.sort_by(|a, b| a.start_at.cmp(&b.start_at));
        }
        Dataset {
            view: self.id.clone(),
            rows,
        }
    }
}

/// One projected record as a view sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedRow {
    pub kind: CollectionKind,
    pub start_at: DateTime<Utc>,
    pub values: IndexMap<String, FieldValue>,
}

impl ProjectedRow {
    fn from_record(kind: CollectionKind, record: &Record, fields: &[String]) -> Self {
        let mut values = IndexMap::with_capacity(fields.len() + 2);
        values.insert(FIELD_ID.to_owned(), FieldValue::from(record.id));
        values.insert(FIELD_START_AT.to_owned(), FieldValue::Time(record.start_at));
        if fields.is_empty() {
            if let Some(end_at) = record.end_at {
                values.insert(FIELD_END_AT.to_owned(), FieldValue::Time(end_at));
            }
            values.extend(record.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        } else {
            for field in fields {
                let value = record.get(field).unwrap_or_default();
                values.insert(field.clone(), value);
            }
        }
        Self {
            kind,
            start_at: record.start_at,
            values,
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.get(FIELD_ID)
            .and_then(FieldValue::as_f64)
            .map(|id| id as u64)
    }
}

#[cfg(not(feature = "parallel-projection"))]
fn project_records(kind: CollectionKind, records: &[Record], fields: &[String]) -> Vec<ProjectedRow> {
    records
        .iter()
        .map(|record| ProjectedRow::from_record(kind, record, fields))
        .collect()
}

#[cfg(feature = "parallel-projection")]
fn project_records(kind: CollectionKind, records: &[Record], fields: &[String]) -> Vec<ProjectedRow> {
    use rayon::prelude::*;

    records
        .par_iter()
        .map(|record| ProjectedRow::from_record(kind, record, fields))
        .collect()
}

/// Rows handed to a view's renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub view: ViewId,
    pub rows: Vec<ProjectedRow>,
}

impl Dataset {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        self.rows.iter().filter_map(ProjectedRow::id).collect()
    }

    /// Numeric `[min, max]` of a field over the rows, for axis fitting.
    #[must_use]
    pub fn extent(&self, field: &str) -> Option<(f64, f64)> {
        let values = || {
            self.rows
                .iter()
                .filter_map(|row| row.get(field).and_then(FieldValue::as_f64))
                .filter(|value| value.is_finite())
                .map(OrderedFloat)
        };
        Some((values().min()?.0, values().max()?.0))
    }
}

/// Render callback attached to a view.
pub trait ViewRenderer {
    fn render(&mut self, view: &ViewBinding, dataset: &Dataset) -> DashResult<()>;
}

/// No-op renderer for headless use and tests; remembers what it was handed.
#[derive(Debug, Default)]
pub struct NullViewRenderer {
    pub render_count: usize,
    pub last_row_count: usize,
}

impl ViewRenderer for NullViewRenderer {
    fn render(&mut self, _view: &ViewBinding, dataset: &Dataset) -> DashResult<()> {
        self.render_count += 1;
        self.last_row_count = dataset.len();
        Ok(())
    }
}
