//! Builders for managers and pre-populated recordings

use std::sync::Arc;

use eventrecord_rs::{
    backend::append_entry,
    types::{recording_namespace, StoredEntry},
    AppConfig, EntryStore, FaultPolicy, MemoryStore, RecorderId, RecorderManager, RecordingId,
    SavedRecording,
};
use serde::Serialize;

/// Builder for a [`RecorderManager`] over a test store
pub struct ManagerBuilder {
    store: Arc<dyn EntryStore>,
    config: AppConfig,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            config: AppConfig::in_memory(),
        }
    }

    pub fn store(mut self, store: Arc<dyn EntryStore>) -> Self {
        self.store = store;
        self
    }

    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.config.playback.fault_policy = policy;
        self
    }

    pub fn save_on_interrupt(mut self, save: bool) -> Self {
        self.config.playback.save_on_interrupt = save;
        self
    }

    pub fn release_orphans(mut self, release: bool) -> Self {
        self.config.release_orphans_on_start = release;
        self
    }

    pub fn build(self) -> Arc<RecorderManager> {
        RecorderManager::shared(self.store, &self.config).unwrap()
    }
}

/// Write a recording straight into the store and register it
///
/// Each step is `(payload, delay in ms)`.
pub fn seed_recording<T: Serialize>(
    manager: &RecorderManager,
    recorder: RecorderId,
    steps: &[(T, u64)],
) -> RecordingId {
    let documents: Vec<StoredEntry> = steps
        .iter()
        .map(|(payload, delay)| StoredEntry {
            payload: serde_json::to_value(payload).unwrap(),
            duration_ms: *delay,
        })
        .collect();
    seed_raw_recording(manager, recorder, &documents)
}

/// Write already encoded entries as a recording, bypassing payload typing
pub fn seed_raw_recording(
    manager: &RecorderManager,
    recorder: RecorderId,
    entries: &[StoredEntry],
) -> RecordingId {
    let store = manager.store();
    let id = manager.allocate_recording_id();
    let namespace = recording_namespace(id);
    store.create(&namespace).unwrap();
    for entry in entries {
        append_entry(store.as_ref(), &namespace, entry).unwrap();
    }
    manager
        .recording_created(recorder, SavedRecording::new(id, None))
        .unwrap();
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_recording_is_registered() {
        let manager = ManagerBuilder::new().build();
        let id = seed_recording(&manager, RecorderId(3), &[("a", 10), ("b", 20)]);

        assert_eq!(manager.recordings(RecorderId(3)).len(), 1);
        assert_eq!(manager.store().count(&recording_namespace(id)).unwrap(), 2);
    }
}
