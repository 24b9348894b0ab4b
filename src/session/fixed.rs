//! Fixed action recorder for authored scripts
//!
//! A [`FixedActionRecorder`] has no recording phase. The caller writes the
//! script directly into the recorder's slot with
//! [`FixedActionRecorder::insert_action`], choosing each delay up front, and
//! replays the slot with [`FixedActionRecorder::start_playback`].

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::base::{Recorder, RecorderCore};
use super::callback::{RecorderCallback, TriggerListener};
use super::manager::RecorderManager;
use super::types::RecorderState;
use crate::backend::append_entry;
use crate::error::Result;
use crate::types::{Entry, PlaybackLimit, RecorderKind};

/// One scripted step: a payload and the delay before it fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action<T> {
    /// Payload delivered to the trigger listener
    pub data: T,
    /// Delay in milliseconds; negative values are treated as 0
    pub next_action_millis: i64,
}

impl<T> Action<T> {
    /// Create an action
    pub fn new(data: T, next_action_millis: i64) -> Self {
        Self {
            data,
            next_action_millis,
        }
    }
}

/// Recorder replaying a script written ahead of time
pub struct FixedActionRecorder<T> {
    core: RecorderCore<T>,
}

impl<T> std::fmt::Debug for FixedActionRecorder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedActionRecorder")
            .field("core", &self.core)
            .finish()
    }
}

impl<T> FixedActionRecorder<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Create a recorder registered with `manager`
    pub fn new(manager: Arc<RecorderManager>) -> Result<Self> {
        Ok(Self {
            core: RecorderCore::new(manager, RecorderKind::Fixed)?,
        })
    }

    /// Append a step to the script
    ///
    /// Writes synchronously; returns `false` if the store rejects it.
    pub fn insert_action(&self, data: T, next_action_millis: i64) -> bool {
        if self.core.is_released() {
            tracing::warn!("{}: insert on a released recorder", self.core.slot());
            return false;
        }
        let stored = match Entry::from_millis(data, next_action_millis).to_stored() {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("{}: failed to encode action: {}", self.core.slot(), e);
                return false;
            }
        };
        match append_entry(self.core.store().as_ref(), self.core.slot(), &stored) {
            Ok(index) => {
                tracing::trace!("{}: inserted action {}", self.core.slot(), index);
                true
            }
            Err(e) => {
                tracing::warn!("{}: failed to insert action: {}", self.core.slot(), e);
                false
            }
        }
    }

    /// Append an [`Action`] to the script
    pub fn insert(&self, action: Action<T>) -> bool {
        self.insert_action(action.data, action.next_action_millis)
    }

    /// Replay the script, delivering every payload to `listener`
    pub fn start_playback(&self, listener: Arc<dyn TriggerListener<T>>) -> Result<()> {
        self.core
            .begin_playback(self.core.slot().to_string(), listener)
    }

    /// Set how many runs the next playback session performs
    pub fn set_playback_limit(&self, limit: PlaybackLimit) {
        self.core.set_playback_limit(limit);
    }

    /// Run limit of the next playback session
    pub fn playback_limit(&self) -> PlaybackLimit {
        self.core.playback_limit()
    }

    /// Runs completed by the current or last playback session
    pub fn runs_completed(&self) -> u32 {
        self.core.runs_completed()
    }

    /// Shared state machine
    pub fn core(&self) -> &RecorderCore<T> {
        &self.core
    }

    /// Receiver of playback-mode changes
    pub fn subscribe_playback_mode(&self) -> Receiver<bool> {
        self.core.subscribe_playback_mode()
    }
}

impl<T> Recorder for FixedActionRecorder<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn state(&self) -> RecorderState {
        self.core.state()
    }

    fn slot(&self) -> &str {
        self.core.slot()
    }

    fn set_callback(&self, callback: Arc<dyn RecorderCallback>) {
        self.core.set_callback(callback);
    }

    fn stop_playback(&self) -> Result<()> {
        self.core.stop_playback()
    }

    fn clear_recording_data(&self) -> Result<()> {
        self.core.clear_slot()
    }

    fn release(&self) -> Result<()> {
        self.core.release()
    }

    fn entry_count(&self) -> Result<u64> {
        self.core.slot_entry_count()
    }

    fn flush_callbacks(&self, timeout: Duration) -> bool {
        self.core.flush_callbacks(timeout)
    }
}

impl<T> Drop for FixedActionRecorder<T> {
    fn drop(&mut self) {
        self.core.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{load_entries, MemoryStore, MockEntryStore};
    use crate::config::AppConfig;
    use crate::error::RecorderError;
    use crossbeam_channel::unbounded;

    fn recorder() -> FixedActionRecorder<String> {
        let manager =
            RecorderManager::shared(Arc::new(MemoryStore::new()), &AppConfig::in_memory()).unwrap();
        FixedActionRecorder::new(manager).unwrap()
    }

    #[test]
    fn test_insert_clamps_negative_delay() {
        let recorder = recorder();
        assert!(recorder.insert_action("a".into(), 15));
        assert!(recorder.insert(Action::new("b".into(), -20)));
        assert_eq!(recorder.entry_count().unwrap(), 2);

        let entries = load_entries(recorder.core().store().as_ref(), recorder.slot()).unwrap();
        assert_eq!(entries[0].duration_ms, 15);
        assert_eq!(entries[1].duration_ms, 0);
    }

    #[test]
    fn test_insert_returns_false_on_storage_fault() {
        let mut store = MockEntryStore::new();
        store.expect_get_all().returning(|_| Ok(Vec::new()));
        store.expect_namespaces().returning(|| Ok(Vec::new()));
        store.expect_create().returning(|_| Ok(()));
        store
            .expect_count()
            .returning(|_| Err(RecorderError::Storage("gone".into())));
        let manager = RecorderManager::shared(Arc::new(store), &AppConfig::in_memory()).unwrap();

        let recorder = FixedActionRecorder::<String>::new(manager).unwrap();
        assert!(!recorder.insert_action("a".into(), 10));
    }

    #[test]
    fn test_plays_script_in_order() {
        let recorder = recorder();
        for (payload, delay) in [("one", 5), ("two", 5), ("three", 5)] {
            assert!(recorder.insert_action(payload.to_string(), delay));
        }
        recorder.set_playback_limit(PlaybackLimit::from_runs(1));

        let (tx, rx) = unbounded();
        recorder
            .start_playback(Arc::new(move |payload: String| {
                let _ = tx.send(payload);
            }))
            .unwrap();

        let wait = Duration::from_secs(5);
        let seen: Vec<String> = (0..3).map(|_| rx.recv_timeout(wait).unwrap()).collect();
        assert_eq!(seen, vec!["one", "two", "three"]);

        let deadline = std::time::Instant::now() + wait;
        while recorder.is_playing_back() {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(recorder.runs_completed(), 1);
    }

    #[test]
    fn test_clear_empties_script() {
        let recorder = recorder();
        recorder.insert_action("a".into(), 1);
        recorder.clear_recording_data().unwrap();
        assert_eq!(recorder.entry_count().unwrap(), 0);
    }
}
