//! Recorder registry
//!
//! The [`RecorderManager`] is constructed once per application and handed to
//! every recorder as an `Arc`. It owns the entry store handle, hands out
//! storage slots, allocates recording ids and keeps the registry of saved
//! recordings.
//!
//! # Persisted registry
//!
//! The registry lives in the [`REGISTRY_NAMESPACE`] namespace. Each row is
//! keyed by the recording namespace (`recording_<id>`) and stores the owning
//! [`RecorderId`] together with the [`SavedRecording`] metadata, so the list
//! of recordings survives a restart.
//!
//! # Start-up
//!
//! When [`AppConfig::release_orphans_on_start`] is set, [`RecorderManager::new`]
//! runs [`RecorderManager::release_all`], which drops recorder slots and any
//! recording namespace the registry does not know about. Those are left over
//! by a previous process that did not shut down cleanly.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::aggregator::Aggregator;
use super::base::Recorder;
use super::callback::RecorderCallback;
use crate::backend::EntryStore;
use crate::config::{AppConfig, PlaybackSettings};
use crate::error::{RecorderError, Result, ResultExt};
use crate::types::{
    recording_id_from_namespace, recording_namespace, RecorderId, RecorderKind, RecordingId,
    SavedRecording, REGISTRY_NAMESPACE,
};

/// One persisted registry row
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryRow {
    recorder: RecorderId,
    #[serde(flatten)]
    recording: SavedRecording,
}

#[derive(Debug, Default)]
struct ManagerState {
    /// Next slot ordinal per recorder kind
    next_ordinal: HashMap<RecorderKind, u32>,
    /// Live recorders per kind
    active: HashMap<RecorderKind, usize>,
    /// Saved recordings by id
    registry: BTreeMap<RecordingId, RegistryRow>,
    /// Next recording id to hand out
    next_recording_id: u32,
}

/// Application-scoped registry shared by all recorders
pub struct RecorderManager {
    store: Arc<dyn EntryStore>,
    playback_defaults: PlaybackSettings,
    state: Mutex<ManagerState>,
}

impl std::fmt::Debug for RecorderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderManager")
            .field("playback_defaults", &self.playback_defaults)
            .field("state", &self.lock())
            .finish()
    }
}

impl RecorderManager {
    /// Create the registry, loading persisted recordings from `store`
    pub fn new(store: Arc<dyn EntryStore>, config: &AppConfig) -> Result<Self> {
        let manager = Self {
            store,
            playback_defaults: config.playback.clone(),
            state: Mutex::new(ManagerState::default()),
        };
        manager.load_registry().context("Failed to load recording registry")?;
        if config.release_orphans_on_start {
            manager.release_all()?;
        }
        Ok(manager)
    }

    /// Convenience constructor returning the shared handle recorders expect
    pub fn shared(store: Arc<dyn EntryStore>, config: &AppConfig) -> Result<Arc<Self>> {
        Self::new(store, config).map(Arc::new)
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_registry(&self) -> Result<()> {
        let rows = self.store.get_all(REGISTRY_NAMESPACE)?;
        let mut state = self.lock();
        for (key, document) in rows {
            let row: RegistryRow = match serde_json::from_value(document) {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!("Skipping malformed registry row {}: {}", key, e);
                    continue;
                }
            };
            state.next_recording_id = state.next_recording_id.max(row.recording.id.0 + 1);
            state.registry.insert(row.recording.id, row);
        }
        tracing::info!("Loaded {} saved recordings", state.registry.len());
        Ok(())
    }

    /// Store shared by every recorder of this manager
    pub fn store(&self) -> Arc<dyn EntryStore> {
        Arc::clone(&self.store)
    }

    /// Playback settings new recorders start from
    pub fn playback_defaults(&self) -> &PlaybackSettings {
        &self.playback_defaults
    }

    // ==================== Recorder slots ====================

    /// Register a new recorder and return its slot namespace
    pub fn register_recorder(&self, kind: RecorderKind) -> String {
        let mut state = self.lock();
        let ordinal = state.next_ordinal.entry(kind).or_insert(0);
        let slot = kind.slot_name(*ordinal);
        *ordinal += 1;
        *state.active.entry(kind).or_insert(0) += 1;
        tracing::debug!("Registered recorder slot {}", slot);
        slot
    }

    /// A recorder of `kind` was released
    pub fn recorder_released(&self, kind: RecorderKind) {
        let mut state = self.lock();
        if let Some(count) = state.active.get_mut(&kind) {
            *count = count.saturating_sub(1);
        }
    }

    /// Number of live recorders of `kind`
    pub fn active_recorder_count(&self, kind: RecorderKind) -> usize {
        self.lock().active.get(&kind).copied().unwrap_or(0)
    }

    // ==================== Recordings ====================

    /// Reserve the id for a new recording; ids are never handed out twice
    pub fn allocate_recording_id(&self) -> RecordingId {
        let mut state = self.lock();
        let id = RecordingId(state.next_recording_id);
        state.next_recording_id += 1;
        id
    }

    /// Register a fully written recording
    pub fn recording_created(&self, recorder: RecorderId, recording: SavedRecording) -> Result<()> {
        let row = RegistryRow {
            recorder,
            recording,
        };
        let key = row.recording.namespace();
        self.store
            .append(REGISTRY_NAMESPACE, &key, &serde_json::to_value(&row)?)
            .with_context(|| format!("Failed to register {}", key))?;

        let mut state = self.lock();
        state.next_recording_id = state.next_recording_id.max(row.recording.id.0 + 1);
        tracing::info!("Recording {} saved for {}", row.recording.id, recorder);
        state.registry.insert(row.recording.id, row);
        Ok(())
    }

    /// Recordings made by `recorder`, oldest first
    pub fn recordings(&self, recorder: RecorderId) -> Vec<SavedRecording> {
        let mut recordings: Vec<_> = self
            .lock()
            .registry
            .values()
            .filter(|row| row.recorder == recorder)
            .map(|row| row.recording.clone())
            .collect();
        recordings.sort();
        recordings
    }

    /// Every saved recording, oldest first
    pub fn all_recordings(&self) -> Vec<SavedRecording> {
        let mut recordings: Vec<_> = self
            .lock()
            .registry
            .values()
            .map(|row| row.recording.clone())
            .collect();
        recordings.sort();
        recordings
    }

    /// Look up a recording by id
    pub fn recording(&self, id: RecordingId) -> Option<SavedRecording> {
        self.lock().registry.get(&id).map(|row| row.recording.clone())
    }

    /// Number of saved recordings
    pub fn total_recordings_count(&self) -> usize {
        self.lock().registry.len()
    }

    /// Delete one recording and its entries
    pub fn delete_recording(&self, id: RecordingId) -> Result<()> {
        let namespace = recording_namespace(id);
        self.store.remove(REGISTRY_NAMESPACE, &namespace)?;
        self.store.delete(&namespace)?;
        self.lock().registry.remove(&id);
        tracing::info!("Deleted recording {}", id);
        Ok(())
    }

    /// Delete every recording made by `recorder`
    pub fn delete_recordings(&self, recorder: RecorderId) -> Result<usize> {
        let ids: Vec<RecordingId> = self
            .recordings(recorder)
            .iter()
            .map(|recording| recording.id)
            .collect();
        for id in &ids {
            self.delete_recording(*id)?;
        }
        Ok(ids.len())
    }

    /// Delete every recording of every recorder
    pub fn clear_recording_data(&self) -> Result<()> {
        let ids: Vec<RecordingId> = self.lock().registry.keys().copied().collect();
        for id in ids {
            self.store.delete(&recording_namespace(id))?;
        }
        self.store.delete(REGISTRY_NAMESPACE)?;
        self.lock().registry.clear();
        tracing::info!("Cleared all recording data");
        Ok(())
    }

    /// Drop every recorder slot and every recording namespace the registry
    /// does not reference
    pub fn release_all(&self) -> Result<usize> {
        let known: Vec<RecordingId> = self.lock().registry.keys().copied().collect();
        let mut released = 0;
        for namespace in self.store.namespaces()? {
            let orphan = if namespace == REGISTRY_NAMESPACE {
                false
            } else if let Some(id) = recording_id_from_namespace(&namespace) {
                !known.contains(&id)
            } else {
                namespace.starts_with(RecorderKind::Action.slot_prefix())
                    || namespace.starts_with(RecorderKind::Fixed.slot_prefix())
            };
            if orphan {
                self.store.delete(&namespace)?;
                released += 1;
            }
        }
        if released > 0 {
            tracing::info!("Released {} orphaned namespaces", released);
        }
        Ok(released)
    }

    // ==================== Shared callbacks ====================

    /// Install one callback on several recorders
    ///
    /// The callback receives each lifecycle event once, after every recorder
    /// has reported it. Errors are forwarded as they arrive.
    pub fn set_shared_callback(
        &self,
        recorders: &[&dyn Recorder],
        callback: Arc<dyn RecorderCallback>,
    ) -> Result<Arc<Aggregator>> {
        if recorders.is_empty() {
            return Err(RecorderError::InvalidArgument(
                "A shared callback needs at least one recorder".to_string(),
            ));
        }
        let aggregator = Arc::new(Aggregator::new(recorders.len(), callback)?);
        for recorder in recorders {
            recorder.set_callback(aggregator.clone());
        }
        Ok(aggregator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStore, MockEntryStore};
    use serde_json::json;

    fn manager_with(store: Arc<dyn EntryStore>) -> RecorderManager {
        RecorderManager::new(store, &AppConfig::in_memory()).unwrap()
    }

    #[test]
    fn test_slots_are_unique_per_kind() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        assert_eq!(manager.register_recorder(RecorderKind::Action), "action_record_data_0");
        assert_eq!(manager.register_recorder(RecorderKind::Action), "action_record_data_1");
        assert_eq!(
            manager.register_recorder(RecorderKind::Fixed),
            "fixed_action_record_data_0"
        );
        assert_eq!(manager.active_recorder_count(RecorderKind::Action), 2);

        manager.recorder_released(RecorderKind::Action);
        assert_eq!(manager.active_recorder_count(RecorderKind::Action), 1);
        // Released slots are not reused
        assert_eq!(manager.register_recorder(RecorderKind::Action), "action_record_data_2");
    }

    #[test]
    fn test_recording_ids_never_reused() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let first = manager.allocate_recording_id();
        manager
            .recording_created(RecorderId(1), SavedRecording::new(first, None))
            .unwrap();
        manager.delete_recording(first).unwrap();

        let second = manager.allocate_recording_id();
        assert_ne!(first, second);
        assert_eq!(manager.total_recordings_count(), 0);
    }

    #[test]
    fn test_registry_survives_restart() {
        let store: Arc<dyn EntryStore> = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        for recorder in [1, 1, 2] {
            let id = manager.allocate_recording_id();
            store.create(&recording_namespace(id)).unwrap();
            manager
                .recording_created(RecorderId(recorder), SavedRecording::new(id, Some("t".into())))
                .unwrap();
        }

        let reloaded = manager_with(store);
        assert_eq!(reloaded.total_recordings_count(), 3);
        assert_eq!(reloaded.recordings(RecorderId(1)).len(), 2);
        assert_eq!(reloaded.allocate_recording_id(), RecordingId(3));
    }

    #[test]
    fn test_release_all_keeps_registered_recordings() {
        let store: Arc<dyn EntryStore> = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        let id = manager.allocate_recording_id();
        store.append(&recording_namespace(id), "entry", &json!(1)).unwrap();
        manager
            .recording_created(RecorderId(0), SavedRecording::new(id, None))
            .unwrap();

        store.create("action_record_data_7").unwrap();
        store.create("recording_99").unwrap();
        store.create("host_data").unwrap();

        assert_eq!(manager.release_all().unwrap(), 2);
        let mut namespaces = store.namespaces().unwrap();
        namespaces.sort();
        assert_eq!(namespaces, vec!["host_data", "recorder_recordings", "recording_0"]);
    }

    #[test]
    fn test_delete_recordings_for_one_recorder() {
        let store: Arc<dyn EntryStore> = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        for recorder in [1, 2, 1] {
            let id = manager.allocate_recording_id();
            store.create(&recording_namespace(id)).unwrap();
            manager
                .recording_created(RecorderId(recorder), SavedRecording::new(id, None))
                .unwrap();
        }

        assert_eq!(manager.delete_recordings(RecorderId(1)).unwrap(), 2);
        assert_eq!(manager.all_recordings().len(), 1);
        assert!(!store.exists("recording_0").unwrap());
        assert!(store.exists("recording_1").unwrap());

        manager.clear_recording_data().unwrap();
        assert_eq!(manager.total_recordings_count(), 0);
        assert!(!store.exists("recording_1").unwrap());
    }

    #[test]
    fn test_registry_write_failure_is_storage_fault() {
        let mut store = MockEntryStore::new();
        store.expect_get_all().returning(|_| Ok(Vec::new()));
        store.expect_namespaces().returning(|| Ok(Vec::new()));
        store
            .expect_append()
            .returning(|_, _, _| Err(RecorderError::Storage("disk full".into())));

        let manager = manager_with(Arc::new(store));
        let id = manager.allocate_recording_id();
        let err = manager
            .recording_created(RecorderId(0), SavedRecording::new(id, None))
            .unwrap_err();
        assert!(err.is_storage_fault());
        assert!(manager.recording(id).is_none());
    }
}
