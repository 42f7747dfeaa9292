use std::fmt;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::core::{Collection, CollectionKind, FieldValue, Record};
use crate::error::{DashError, DashResult};

use super::session::StoreSession;
use super::{ChangeListener, RecordStore};

type SharedListener = Arc<dyn Fn(CollectionKind) + Send + Sync>;

/// Backing state behind a [`MemoryStore`] session.
#[derive(Debug, Default)]
pub(crate) struct MemoryState {
    collections: IndexMap<CollectionKind, Collection>,
}

impl MemoryState {
    fn collection(&self, kind: CollectionKind) -> Collection {
        self.collections
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Collection::empty(kind))
    }

    fn collection_mut(&mut self, kind: CollectionKind) -> &mut Collection {
        self.collections
            .entry(kind)
            .or_insert_with(|| Collection::empty(kind))
    }
}

/// In-process record store.
///
/// Collections are fed by the telemetry proxy through [`MemoryStore::ingest`]
/// or loaded from a JSON dump. Availability can be toggled to model a backend
/// outage.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    listeners: Mutex<Vec<SharedListener>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("available", &self.available.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            listeners: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Builds a store from records per kind. Each collection is canonicalized.
    #[must_use]
    pub fn with_collections<I>(collections: I) -> Self
    where
        I: IntoIterator<Item = (CollectionKind, Vec<Record>)>,
    {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            for (kind, records) in collections {
                state.collections.insert(kind, Collection::new(kind, records));
            }
        }
        store
    }

    /// Loads a JSON object of the form `{"trips": [...], "chargings": [...]}`.
    pub fn from_json_str(input: &str) -> DashResult<Self> {
        let payload: IndexMap<CollectionKind, Vec<Record>> = serde_json::from_str(input)
            .map_err(|e| DashError::InvalidData(format!("failed to parse store json: {e}")))?;
        Ok(Self::with_collections(payload))
    }

    pub fn to_json_pretty(&self) -> DashResult<String> {
        let session = self.session("export")?;
        let payload: IndexMap<CollectionKind, &[Record]> = session
            .collections
            .iter()
            .map(|(kind, collection)| (*kind, collection.records()))
            .collect();
        serde_json::to_string_pretty(&payload)
            .map_err(|e| DashError::InvalidData(format!("failed to serialize store json: {e}")))
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Replaces a collection with a fresh fetch from the telemetry proxy.
    ///
    /// A failed fetch leaves an empty collection behind; the error is logged
    /// and never returned.
    pub fn ingest<E: fmt::Display>(
        &self,
        kind: CollectionKind,
        fetched: Result<Vec<Record>, E>,
    ) -> DashResult<()> {
        let records = fetched.unwrap_or_else(|err| {
            warn!(%kind, error = %err, "telemetry fetch failed, collection left empty");
            Vec::new()
        });
        self.replace_collection(kind, records)
    }

    pub fn replace_collection(&self, kind: CollectionKind, records: Vec<Record>) -> DashResult<()> {
        {
            let mut session = self.session("replace_collection")?;
            let collection = Collection::new(kind, records);
            debug!(%kind, count = collection.len(), "replace collection");
            session.collections.insert(kind, collection);
        }
        self.notify(kind);
        Ok(())
    }

    pub(crate) fn session(&self, operation: &'static str) -> DashResult<StoreSession<'_>> {
        if !self.available.load(Ordering::Relaxed) {
            return Err(DashError::StoreUnavailable(format!(
                "{operation}: backend is offline"
            )));
        }
        let guard = self.state.lock().map_err(|_| {
            DashError::StoreUnavailable(format!("{operation}: store state is poisoned"))
        })?;
        Ok(StoreSession::new(guard, operation))
    }

    /// Calls every listener with the listener list unlocked, so listeners
    /// may subscribe or write back into the store.
    fn notify(&self, kind: CollectionKind) {
        let listeners: Vec<SharedListener> = match self.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(_) => {
                warn!(%kind, "store listeners poisoned, change not propagated");
                return;
            }
        };
        trace!(%kind, listeners = listeners.len(), "notify store listeners");
        for listener in &listeners {
            listener(kind);
        }
    }
}

impl RecordStore for MemoryStore {
    fn load_all(&self, kind: CollectionKind) -> DashResult<Collection> {
        let session = self.session("load_all")?;
        let collection = session.collection(kind);
        trace!(%kind, count = collection.len(), "load collection");
        Ok(collection)
    }

    fn update_field(
        &self,
        kind: CollectionKind,
        row_key: &FieldValue,
        field: &str,
        value: FieldValue,
    ) -> DashResult<Option<Record>> {
        let updated = {
            let mut session = self.session("update_field")?;
            let Some(start_at) = row_key.as_timestamp() else {
                debug!(
                    operation = session.operation(),
                    %kind,
                    %row_key,
                    "row key is not a timestamp"
                );
                return Ok(None);
            };
            let collection = session.collection_mut(kind);
            let Some(index) = collection.position_of(start_at) else {
                return Ok(None);
            };
            let Some(record) = collection.record_mut(index) else {
                return Ok(None);
            };

            // Stage the write on a copy so a rejected value leaves the row intact.
            let mut staged = record.clone();
            staged.set(field, value)?;
            *record = staged.clone();
            staged
        };

        debug!(%kind, %row_key, field, "updated record field");
        self.notify(kind);
        Ok(Some(updated))
    }

    fn append_derived_field(
        &self,
        kind: CollectionKind,
        field: &str,
        values: &[(DateTime<Utc>, FieldValue)],
    ) -> DashResult<usize> {
        let mut session = self.session("append_derived_field")?;
        let collection = session.collection_mut(kind);
        let mut staged: Vec<(usize, Record)> = Vec::with_capacity(values.len());
        let mut missing = 0_usize;
        for (start_at, value) in values {
            let Some(index) = collection.position_of(*start_at) else {
                missing += 1;
                continue;
            };
            let Some(record) = collection.records().get(index) else {
                continue;
            };
            if record.get(field).as_ref() == Some(value) {
                continue;
            }
            let mut record = record.clone();
            record.set(field, value.clone())?;
            staged.push((index, record));
        }

        // Commit only once every value was accepted.
        let changed = staged.len();
        for (index, record) in staged {
            if let Some(slot) = collection.record_mut(index) {
                *slot = record;
            }
        }

        if missing > 0 {
            warn!(%kind, field, missing, "derived values reference unknown rows");
        }
        debug!(%kind, field, changed, "appended derived field");
        Ok(changed)
    }

    fn subscribe(&self, listener: ChangeListener) {
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push(Arc::from(listener)),
            Err(_) => warn!("store listeners poisoned, subscription dropped"),
        }
    }
}
