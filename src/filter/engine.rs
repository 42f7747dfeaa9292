use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::core::{Collection, CollectionKind, FIELD_START_AT, FieldValue};
use crate::error::{DashError, DashResult};

use super::predicate::FilterPredicate;
use super::spatial::{SpatialSelection, spatial_to_predicate};
use super::view::{Dataset, ProjectedRow, ViewBinding, ViewId, ViewRenderer};

/// What a user did on a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Selection {
    Clear,
    Predicate { predicate: FilterPredicate },
    Spatial { selection: SpatialSelection },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionEvent {
    pub view: ViewId,
    pub selection: Selection,
}

impl SelectionEvent {
    #[must_use]
    pub fn predicate(view: impl Into<ViewId>, predicate: FilterPredicate) -> Self {
        Self {
            view: view.into(),
            selection: Selection::Predicate { predicate },
        }
    }

    #[must_use]
    pub fn spatial(view: impl Into<ViewId>, selection: SpatialSelection) -> Self {
        Self {
            view: view.into(),
            selection: Selection::Spatial { selection },
        }
    }

    #[must_use]
    pub fn clear(view: impl Into<ViewId>) -> Self {
        Self {
            view: view.into(),
            selection: Selection::Clear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectionOutcome {
    Applied {
        predicate: FilterPredicate,
        affected: Vec<ViewId>,
    },
    Cleared {
        affected: Vec<ViewId>,
    },
    /// Nothing changed; the reason was logged.
    Rejected { reason: String },
}

impl SelectionOutcome {
    #[must_use]
    pub fn affected(&self) -> &[ViewId] {
        match self {
            Self::Applied { affected, .. } | Self::Cleared { affected } => affected,
            Self::Rejected { .. } => &[],
        }
    }
}

/// Where an active filter came from. Each origin holds at most one filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterOrigin {
    /// The shared date slider.
    Global,
    View(ViewId),
}

/// How a predicate reaches a target view.
#[derive(Debug, Clone, PartialEq)]
enum Join {
    /// The target carries the predicate's field.
    Direct,
    /// The target shares a collection but not the field; rows are matched on `start_at`.
    ViaKey,
}

/// One origin's selection as raised, plus its per-target resolution.
///
/// The raw predicate is kept so targets can be re-resolved after a reload.
struct ActiveFilter {
    source: Option<ViewId>,
    predicate: FilterPredicate,
    targets: IndexMap<ViewId, ScopedPredicate>,
}

/// Predicate resolved for one target, limited to rows of `scope`.
#[derive(Debug, Clone, PartialEq)]
struct ScopedPredicate {
    predicate: FilterPredicate,
    scope: Vec<CollectionKind>,
}

impl ScopedPredicate {
    fn admits(&self, row: &ProjectedRow) -> bool {
        !self.scope.contains(&row.kind) || self.predicate.matches(row.get(&self.predicate.field))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheState {
    Fresh,
    NeedsRebuild,
}

struct ViewSlot {
    binding: ViewBinding,
    renderer: Box<dyn ViewRenderer>,
    full: Dataset,
    current: Dataset,
}

/// Per-dashboard cross-filter state.
///
/// Holds one full and one filtered dataset per registered view. Filtered
/// datasets are always recomputed from the full ones, so repeating a
/// selection is idempotent and clearing restores the full rows exactly.
pub struct CrossFilterEngine {
    views: IndexMap<ViewId, ViewSlot>,
    filters: IndexMap<FilterOrigin, ActiveFilter>,
    state: CacheState,
}

impl Default for CrossFilterEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossFilterEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            views: IndexMap::new(),
            filters: IndexMap::new(),
            state: CacheState::NeedsRebuild,
        }
    }

    /// Registers a view. Re-registering an id replaces the previous binding.
    pub fn register(
        &mut self,
        binding: ViewBinding,
        renderer: Box<dyn ViewRenderer>,
    ) -> DashResult<()> {
        binding.validate()?;
        let id = binding.id.clone();
        let empty = Dataset {
            view: id.clone(),
            rows: Vec::new(),
        };
        let replaced = self
            .views
            .insert(
                id.clone(),
                ViewSlot {
                    binding,
                    renderer,
                    full: empty.clone(),
                    current: empty,
                },
            )
            .is_some();
        if replaced {
            warn!(view = %id, "view registered twice, previous binding replaced");
        }
        debug!(view = %id, "registered view");
        self.invalidate();
        Ok(())
    }

    #[must_use]
    pub fn views(&self) -> Vec<&ViewBinding> {
        self.views.values().map(|slot| &slot.binding).collect()
    }

    #[must_use]
    pub fn binding(&self, view: &ViewId) -> Option<&ViewBinding> {
        self.views.get(view).map(|slot| &slot.binding)
    }

    #[must_use]
    pub fn state(&self) -> CacheState {
        self.state
    }

    #[must_use]
    pub fn needs_rebuild(&self) -> bool {
        self.state == CacheState::NeedsRebuild
    }

    /// Marks every cached dataset stale. The next `load_sources` rebuilds all of them.
    pub fn invalidate(&mut self) {
        if self.state != CacheState::NeedsRebuild {
            trace!("cross-filter cache invalidated");
        }
        self.state = CacheState::NeedsRebuild;
    }

    /// Rebuilds every view from freshly loaded collections and renders it.
    ///
    /// Active filters survive the reload: each one is resolved again against
    /// the new rows before anything is rendered.
    pub fn load_sources(&mut self, collections: &IndexMap<CollectionKind, Collection>) {
        for slot in self.views.values_mut() {
            slot.full = slot.binding.project(collections);
        }

        let origins: Vec<FilterOrigin> = self.filters.keys().cloned().collect();
        for origin in &origins {
            let Some(filter) = self.filters.get(origin) else {
                continue;
            };
            let targets = self.resolve_targets(filter.source.as_ref(), &filter.predicate);
            if let Some(filter) = self.filters.get_mut(origin) {
                filter.targets = targets;
            }
        }

        let ids: Vec<ViewId> = self.views.keys().cloned().collect();
        self.recompute(&ids);
        self.state = CacheState::Fresh;
        debug!(
            views = self.views.len(),
            filters = origins.len(),
            "cross-filter datasets rebuilt"
        );
        self.render(&ids);
    }

    /// Filtered dataset a view currently shows.
    #[must_use]
    pub fn dataset(&self, view: &ViewId) -> Option<&Dataset> {
        self.views.get(view).map(|slot| &slot.current)
    }

    #[must_use]
    pub fn full_dataset(&self, view: &ViewId) -> Option<&Dataset> {
        self.views.get(view).map(|slot| &slot.full)
    }

    #[must_use]
    pub fn active_origins(&self) -> Vec<FilterOrigin> {
        self.filters.keys().cloned().collect()
    }

    /// Handles a selection raised by a view. Never fails; rejects are logged.
    pub fn apply_selection(&mut self, event: SelectionEvent) -> SelectionOutcome {
        let origin = FilterOrigin::View(event.view.clone());
        match self.selection_predicate(&event) {
            Ok(Some(predicate)) => self.apply_from(origin, Some(&event.view), predicate),
            Ok(None) => self.clear_origin(&origin),
            Err(err) => reject(&event.view.to_string(), &err),
        }
    }

    /// Applies a predicate that is not owned by any view (the date slider).
    pub fn apply_global(&mut self, predicate: FilterPredicate) -> SelectionOutcome {
        self.apply_from(FilterOrigin::Global, None, predicate)
    }

    pub fn clear_global(&mut self) -> SelectionOutcome {
        self.clear_origin(&FilterOrigin::Global)
    }

    /// Drops every active filter and restores all views.
    pub fn clear_all(&mut self) -> SelectionOutcome {
        let affected: Vec<ViewId> = self
            .filters
            .drain(..)
            .flat_map(|(_, filter)| filter.targets.into_keys())
            .fold(Vec::new(), push_unique);
        self.recompute(&affected);
        self.render(&affected);
        SelectionOutcome::Cleared { affected }
    }

    fn selection_predicate(&self, event: &SelectionEvent) -> DashResult<Option<FilterPredicate>> {
        let slot = self.views.get(&event.view).ok_or_else(|| {
            DashError::InvalidPredicate(format!("unknown view {}", event.view))
        })?;
        if self.needs_rebuild() {
            return Err(DashError::InvalidPredicate(
                "datasets are stale and need a rebuild".to_owned(),
            ));
        }

        let predicate = match &event.selection {
            Selection::Clear => return Ok(None),
            Selection::Predicate { predicate } => predicate.clone(),
            Selection::Spatial { selection } => {
                let axes = slot.binding.map_axes().ok_or_else(|| {
                    DashError::InvalidPredicate(format!(
                        "spatial selection on non-map view {}",
                        event.view
                    ))
                })?;
                match spatial_to_predicate(selection, &slot.full, axes)? {
                    Some(predicate) => predicate,
                    None => return Ok(None),
                }
            }
        };

        if !slot.binding.accepts_selection_on(&predicate.field) {
            return Err(DashError::InvalidPredicate(format!(
                "view {} does not filter on {}",
                event.view, predicate.field
            )));
        }
        predicate.validated().map(Some)
    }

    fn apply_from(
        &mut self,
        origin: FilterOrigin,
        source: Option<&ViewId>,
        predicate: FilterPredicate,
    ) -> SelectionOutcome {
        let label = source.map_or_else(|| "global".to_owned(), ToString::to_string);
        if self.needs_rebuild() {
            return reject(
                &label,
                &DashError::InvalidPredicate("datasets are stale and need a rebuild".to_owned()),
            );
        }
        let predicate = match predicate.validated() {
            Ok(predicate) => predicate,
            Err(err) => return reject(&label, &err),
        };

        let targets = self.resolve_targets(source, &predicate);
        let active = ActiveFilter {
            source: source.cloned(),
            predicate: predicate.clone(),
            targets: targets.clone(),
        };
        let previous = self
            .filters
            .insert(origin, active)
            .map(|old| old.targets.into_keys().collect::<Vec<_>>())
            .unwrap_or_default();
        let affected = previous
            .into_iter()
            .chain(targets.into_keys())
            .fold(Vec::new(), push_unique);

        self.recompute(&affected);
        self.render(&affected);
        debug!(
            origin = %label,
            field = %predicate.field,
            affected = affected.len(),
            "selection applied"
        );
        SelectionOutcome::Applied {
            predicate,
            affected,
        }
    }

    fn clear_origin(&mut self, origin: &FilterOrigin) -> SelectionOutcome {
        let affected: Vec<ViewId> = self
            .filters
            .shift_remove(origin)
            .map(|filter| filter.targets.into_keys().collect())
            .unwrap_or_default();
        self.recompute(&affected);
        self.render(&affected);
        trace!(affected = affected.len(), "selection cleared");
        SelectionOutcome::Cleared { affected }
    }

    fn resolve_targets(
        &self,
        source: Option<&ViewId>,
        predicate: &FilterPredicate,
    ) -> IndexMap<ViewId, ScopedPredicate> {
        let source_slot = source.and_then(|id| self.views.get(id));
        let mut targets = IndexMap::new();

        for (id, slot) in &self.views {
            if Some(id) == source {
                continue;
            }
            let target = &slot.binding;
            let Some(join) = resolve_join(source_slot.map(|s| &s.binding), target, &predicate.field)
            else {
                continue;
            };

            let scoped = match (join, source_slot) {
                (Join::Direct, Some(src)) if predicate.field != FIELD_START_AT => ScopedPredicate {
                    predicate: predicate.clone(),
                    scope: shared_sources(&src.binding, target),
                },
                (Join::Direct, _) => ScopedPredicate {
                    predicate: predicate.clone(),
                    scope: target.sources.clone(),
                },
                (Join::ViaKey, Some(src)) => {
                    let scope = shared_sources(&src.binding, target);
                    ScopedPredicate {
                        predicate: key_predicate(&src.full, predicate, &scope),
                        scope,
                    }
                }
                (Join::ViaKey, None) => continue,
            };
            targets.insert(id.clone(), scoped);
        }
        targets
    }

    fn recompute(&mut self, views: &[ViewId]) {
        for id in views {
            let active: Vec<&ScopedPredicate> = self
                .filters
                .values()
                .filter_map(|filter| filter.targets.get(id))
                .collect();
            let Some(slot) = self.views.get(id) else {
                continue;
            };
            let rows = slot
                .full
                .rows
                .iter()
                .filter(|row| active.iter().all(|scoped| scoped.admits(row)))
                .cloned()
                .collect();
            let current = Dataset {
                view: id.clone(),
                rows,
            };
            if let Some(slot) = self.views.get_mut(id) {
                slot.current = current;
            }
        }
    }

    fn render(&mut self, views: &[ViewId]) {
        for id in views {
            let Some(slot) = self.views.get_mut(id) else {
                continue;
            };
            if let Err(err) = slot.renderer.render(&slot.binding, &slot.current) {
                warn!(view = %id, error = %err, "view render callback failed");
            }
        }
    }
}

fn resolve_join(source: Option<&ViewBinding>, target: &ViewBinding, field: &str) -> Option<Join> {
    let Some(source) = source else {
        return target.carries(field).then_some(Join::Direct);
    };
    if field == FIELD_START_AT {
        return target.carries(field).then_some(Join::Direct);
    }
    if !source.shares_source_with(target) {
        return None;
    }
    if target.carries(field) {
        Some(Join::Direct)
    } else {
        Some(Join::ViaKey)
    }
}

fn shared_sources(source: &ViewBinding, target: &ViewBinding) -> Vec<CollectionKind> {
    target
        .sources
        .iter()
        .copied()
        .filter(|kind| source.sources.contains(kind))
        .collect()
}

/// Translates a predicate on a field the target lacks into a `start_at` set
/// taken from the source rows it selects.
fn key_predicate(
    source_rows: &Dataset,
    predicate: &FilterPredicate,
    scope: &[CollectionKind],
) -> FilterPredicate {
    let keys = source_rows
        .rows
        .iter()
        .filter(|row| scope.contains(&row.kind))
        .filter(|row| predicate.matches(row.get(&predicate.field)))
        .map(|row| FieldValue::Time(row.start_at))
        .collect();
    FilterPredicate::one_of(FIELD_START_AT, keys)
}

fn push_unique(mut acc: Vec<ViewId>, id: ViewId) -> Vec<ViewId> {
    if !acc.contains(&id) {
        acc.push(id);
    }
    acc
}

fn reject(origin: &str, err: &DashError) -> SelectionOutcome {
    warn!(origin, error = %err, "selection rejected, filters unchanged");
    SelectionOutcome::Rejected {
        reason: err.to_string(),
    }
}
