use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::core::{
    Collection, CollectionKind, Record, WindowOutcome, build_time_window_tuned,
    records_in_time_window,
};
use crate::error::{DashError, DashResult};
use crate::filter::{
    CrossFilterEngine, Dataset, FilterPredicate, SelectionEvent, SelectionOutcome, ViewBinding,
    ViewId, ViewRenderer,
};
use crate::reconcile::{EditReconciler, ReconcileReport, TableRow};
use crate::store::{DefaultValue, DerivedField, FieldDifference, RecordStore, run_derivation};

use super::config::DashboardConfig;
use super::detail::{ActiveCell, CellDetail, resolve_cell_detail};
use super::json_contract::DashboardSnapshot;

/// Cell edits made in a rendered table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditEvent {
    pub view: ViewId,
    pub before: Vec<TableRow>,
    pub after: Vec<TableRow>,
}

/// Cached layout state. Rebuilt as a whole, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardLayout {
    pub generation: u64,
    pub window: WindowOutcome,
}

/// Process-scoped dashboard state.
///
/// Owns the loaded collections, the cross-filter engine and the cached
/// layout. Events are delivered one at a time by the host.
pub struct Dashboard<S: RecordStore> {
    store: S,
    config: DashboardConfig,
    engine: CrossFilterEngine,
    reconciler: EditReconciler,
    derivations: Vec<Box<dyn DerivedField>>,
    collections: IndexMap<CollectionKind, Collection>,
    layout: Option<DashboardLayout>,
    refresh_pending: Arc<AtomicBool>,
    generation: u64,
}

impl<S: RecordStore> Dashboard<S> {
    pub fn new(store: S, config: DashboardConfig) -> DashResult<Self> {
        config.validate()?;

        let refresh_pending = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&refresh_pending);
        store.subscribe(Box::new(move |kind| {
            trace!(%kind, "store changed, refresh scheduled");
            flag.store(true, Ordering::Release);
        }));

        let mut reconciler = EditReconciler::new(config.key_column.clone())
            .with_pairing(config.row_pairing);
        reconciler.set_editable(config.editable_columns.clone());

        let mut derivations: Vec<Box<dyn DerivedField>> = Vec::new();
        if config.derive_altitude_diff {
            derivations.push(Box::new(FieldDifference::new(
                CollectionKind::Trips,
                "altitude_diff",
                "end_altitude",
                "start_altitude",
            )));
        }
        if let Some(price) = config.default_charging_price {
            derivations.push(Box::new(DefaultValue::new(
                CollectionKind::Chargings,
                "price",
                price,
            )));
        }

        Ok(Self {
            store,
            config,
            engine: CrossFilterEngine::new(),
            reconciler,
            derivations,
            collections: IndexMap::new(),
            layout: None,
            refresh_pending,
            generation: 0,
        })
    }

    #[must_use]
    pub fn with_derivation(mut self, derivation: Box<dyn DerivedField>) -> Self {
        self.derivations.push(derivation);
        self.refresh_pending.store(true, Ordering::Release);
        self
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    #[must_use]
    pub fn collection(&self, kind: CollectionKind) -> Option<&Collection> {
        self.collections.get(&kind)
    }

    #[must_use]
    pub fn is_refresh_pending(&self) -> bool {
        self.refresh_pending.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn views(&self) -> Vec<&ViewBinding> {
        self.engine.views()
    }

    pub fn register_view(
        &mut self,
        binding: ViewBinding,
        renderer: Box<dyn ViewRenderer>,
    ) -> DashResult<()> {
        self.engine.register(binding, renderer)?;
        self.invalidate();
        Ok(())
    }

    /// Reloads every collection from the store.
    ///
    /// On failure the previously loaded collections and layout stay in place
    /// and the error is returned. Safe to call again at any time.
    pub fn refresh(&mut self) -> DashResult<()> {
        info!("refreshing dashboard data");
        for derivation in &self.derivations {
            run_derivation(&self.store, derivation.as_ref()).inspect_err(|err| {
                warn!(
                    field = derivation.field(),
                    error = %err,
                    "derived field refresh failed, keeping cached data"
                );
            })?;
        }

        let mut collections = IndexMap::with_capacity(CollectionKind::ALL.len());
        for kind in CollectionKind::ALL {
            let collection = self.store.load_all(kind).inspect_err(|err| {
                warn!(%kind, error = %err, "collection load failed, keeping cached data");
            })?;
            if collection.is_empty() {
                debug!(%kind, "no records yet");
            }
            collections.insert(kind, collection);
        }

        self.collections = collections;
        self.refresh_pending.store(false, Ordering::Release);
        self.invalidate();
        Ok(())
    }

    /// Marks the layout and every view dataset for rebuild on next access.
    pub fn invalidate(&mut self) {
        self.layout = None;
        self.engine.invalidate();
    }

    /// Current layout, refreshing and rebuilding first when needed.
    ///
    /// A failed refresh keeps serving the cached layout when there is one.
    pub fn layout(&mut self) -> DashResult<&DashboardLayout> {
        if self.is_refresh_pending() {
            if let Err(err) = self.refresh() {
                if self.layout.is_none() {
                    return Err(err);
                }
                warn!(error = %err, "refresh failed, serving cached layout");
            }
        }

        if self.layout.is_none() {
            let window = build_time_window_tuned(self.collections.values(), self.config.time_window);
            self.engine.load_sources(&self.collections);
            self.generation += 1;
            debug!(
                generation = self.generation,
                no_window = window.is_no_window(),
                "rebuilt dashboard layout"
            );
            self.layout = Some(DashboardLayout {
                generation: self.generation,
                window,
            });
        }

        self.layout
            .as_ref()
            .ok_or_else(|| DashError::InvalidData("layout rebuild produced nothing".to_owned()))
    }

    pub fn window(&mut self) -> DashResult<WindowOutcome> {
        Ok(self.layout()?.window.clone())
    }

    /// Full slider range in epoch milliseconds, the slider's initial value.
    pub fn slider_bounds(&mut self) -> DashResult<(i64, i64)> {
        let window = self.layout()?.window.require()?;
        Ok((window.min_millis, window.max_millis))
    }

    #[must_use]
    pub fn dataset(&self, view: &ViewId) -> Option<&Dataset> {
        self.engine.dataset(view)
    }

    pub fn handle_selection(&mut self, event: SelectionEvent) -> SelectionOutcome {
        if let Err(err) = self.layout() {
            return layout_unavailable(&err);
        }
        self.engine.apply_selection(event)
    }

    /// Applies the date slider range (epoch milliseconds) to every view.
    pub fn apply_time_range(&mut self, start_millis: i64, end_millis: i64) -> SelectionOutcome {
        if let Err(err) = self.layout() {
            return layout_unavailable(&err);
        }
        self.engine
            .apply_global(FilterPredicate::time_range(start_millis, end_millis))
    }

    pub fn clear_time_range(&mut self) -> SelectionOutcome {
        if let Err(err) = self.layout() {
            return layout_unavailable(&err);
        }
        self.engine.clear_global()
    }

    /// Reconciles a table edit against the store.
    ///
    /// Successful writes schedule a refresh through the store's change
    /// notification. Rows the store no longer has are reported, and the
    /// displayed table is left as it is.
    pub fn handle_edit(&mut self, event: EditEvent) -> DashResult<ReconcileReport> {
        let binding = self
            .engine
            .binding(&event.view)
            .ok_or_else(|| DashError::InvalidData(format!("unknown view {}", event.view)))?;
        let kind = match binding.sources.as_slice() {
            [kind] => *kind,
            _ => {
                return Err(DashError::InvalidData(format!(
                    "view {} spans several collections and cannot be edited",
                    event.view
                )));
            }
        };

        let report = self
            .reconciler
            .reconcile(&self.store, kind, &event.before, &event.after);
        debug!(
            view = %event.view,
            %kind,
            diffs = report.outcomes.len(),
            applied = report.applied_count(),
            "edit event reconciled"
        );
        Ok(report)
    }

    /// Records of `kind` whose `start_at` lies in the slider range.
    #[must_use]
    pub fn visible_records(&self, kind: CollectionKind, start_millis: i64, end_millis: i64) -> Vec<Record> {
        self.collections
            .get(&kind)
            .map(|collection| records_in_time_window(collection.records(), start_millis, end_millis))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn resolve_cell_detail(&self, view: &ViewId, cell: &ActiveCell) -> Option<CellDetail> {
        let binding = self.engine.binding(view)?;
        let displayed = self.engine.dataset(view)?;
        let source = binding
            .sources
            .first()
            .and_then(|kind| self.collections.get(kind))?;
        resolve_cell_detail(&self.config.cell_detail, binding, displayed, source, cell)
    }

    pub fn snapshot(&mut self) -> DashResult<DashboardSnapshot> {
        let layout = self.layout()?.clone();
        let datasets = self
            .engine
            .views()
            .iter()
            .filter_map(|binding| self.engine.dataset(&binding.id).cloned())
            .collect();
        Ok(DashboardSnapshot {
            generation: layout.generation,
            window: layout.window,
            datasets,
        })
    }
}

fn layout_unavailable(err: &DashError) -> SelectionOutcome {
    warn!(error = %err, "selection dropped, dashboard has no data");
    SelectionOutcome::Rejected {
        reason: err.to_string(),
    }
}
