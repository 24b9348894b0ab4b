//! Action recorder for capturing live actions
//!
//! An [`ActionRecorder`] measures the time between calls to
//! [`ActionRecorder::action_performed`] while recording, buffers the entries
//! in memory and, when the recording is stopped with persistence, writes them
//! to a fresh `recording_<id>` namespace on a background worker.
//!
//! # Saving
//!
//! The save worker reports `on_recording_save_progress` after every entry and
//! `on_recording_saved` once the recording is registered with the
//! [`RecorderManager`]. A failure is reported once through `on_error`; entries
//! already written stay in the store.
//!
//! # Example
//!
//! ```ignore
//! let recorder = ActionRecorder::<Tap>::new(manager.clone(), RecorderId(1))?;
//! recorder.start_recording()?;
//! recorder.action_performed(Tap { x: 10, y: 20 });
//! recorder.stop_recording(true)?;
//!
//! let saved = recorder.latest_recording().unwrap();
//! recorder.start_playback(saved.id, Arc::new(|tap: Tap| println!("{:?}", tap)))?;
//! ```

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::Receiver;
use serde::{de::DeserializeOwned, Serialize};

use super::base::{Recorder, RecorderCore};
use super::callback::{RecorderCallback, RecorderEvent, TriggerListener};
use super::manager::RecorderManager;
use super::types::RecorderState;
use crate::error::{RecorderError, Result, ResultExt};
use crate::types::{
    entry_key, recording_namespace, Entry, PlaybackLimit, RecorderId, RecorderKind, RecordingId,
    SavedRecording,
};

/// Recorder that measures the delay between live actions
pub struct ActionRecorder<T> {
    /// Shared state machine
    core: RecorderCore<T>,
    /// Groups the recordings made by this recorder
    recorder_id: RecorderId,
    /// Entries captured by the current recording
    buffer: Mutex<Vec<Entry<T>>>,
}

impl<T> std::fmt::Debug for ActionRecorder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRecorder")
            .field("recorder_id", &self.recorder_id)
            .field("core", &self.core)
            .finish()
    }
}

impl<T> ActionRecorder<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Create a recorder registered with `manager`
    pub fn new(manager: Arc<RecorderManager>, recorder_id: RecorderId) -> Result<Self> {
        Ok(Self {
            core: RecorderCore::new(manager, RecorderKind::Action)?,
            recorder_id,
            buffer: Mutex::new(Vec::new()),
        })
    }

    fn lock_buffer(&self) -> MutexGuard<'_, Vec<Entry<T>>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Identifier grouping this recorder's recordings
    pub fn recorder_id(&self) -> RecorderId {
        self.recorder_id
    }

    // ==================== Recording ====================

    /// Start a new recording
    ///
    /// Stops playback first if needed. Fails if a recording is already in
    /// progress.
    pub fn start_recording(&self) -> Result<()> {
        self.core.begin_recording(|| self.lock_buffer().clear())
    }

    /// Capture an action; returns `false` and does nothing unless recording
    pub fn action_performed(&self, payload: T) -> bool {
        self.core.record_step(|elapsed| {
            tracing::trace!("{}: action after {:?}", self.core.slot(), elapsed);
            self.lock_buffer().push(Entry::new(payload, elapsed));
        })
    }

    /// Number of entries captured by the current recording
    pub fn buffered_len(&self) -> usize {
        self.lock_buffer().len()
    }

    /// Stop recording, persisting the captured entries when `persist` is set
    ///
    /// A no-op when not recording.
    pub fn stop_recording(&self, persist: bool) -> Result<()> {
        self.finish_recording(persist, None)
    }

    /// Stop recording and persist the captured entries under `title`
    pub fn stop_recording_titled(&self, title: impl Into<String>) -> Result<()> {
        self.finish_recording(true, Some(title.into()))
    }

    fn finish_recording(&self, persist: bool, title: Option<String>) -> Result<()> {
        let mut captured = Vec::new();
        let stopped = self
            .core
            .end_recording(|| captured = mem::take(&mut *self.lock_buffer()))?;
        if !stopped {
            return Ok(());
        }
        if !persist {
            tracing::debug!(
                "{}: discarded {} unsaved entries",
                self.core.slot(),
                captured.len()
            );
            return Ok(());
        }

        let core = self.core.clone();
        let recorder_id = self.recorder_id;
        self.core
            .spawn_worker("save", move || save_recording(&core, recorder_id, captured, title))
    }

    // ==================== Recordings ====================

    /// Recordings made by this recorder, oldest first
    pub fn recordings(&self) -> Vec<SavedRecording> {
        self.core.manager().recordings(self.recorder_id)
    }

    /// Most recent recording made by this recorder
    pub fn latest_recording(&self) -> Option<SavedRecording> {
        self.recordings().pop()
    }

    /// Number of entries in a saved recording
    pub fn recording_entry_count(&self, id: RecordingId) -> Result<u64> {
        let saved = self
            .core
            .manager()
            .recording(id)
            .ok_or(RecorderError::UnknownRecording(id))?;
        self.core.store().count(&saved.namespace())
    }

    // ==================== Playback ====================

    /// Replay a saved recording, delivering every payload to `listener`
    ///
    /// A recording in progress is stopped first. It is only persisted when
    /// the playback settings ask for `save_on_interrupt`.
    pub fn start_playback(&self, id: RecordingId, listener: Arc<dyn TriggerListener<T>>) -> Result<()> {
        self.core.ensure_usable()?;
        let state = self.core.state();
        if state.is_playing_back() {
            return Err(RecorderError::illegal("start playback", state));
        }
        let saved = self
            .core
            .manager()
            .recording(id)
            .ok_or(RecorderError::UnknownRecording(id))?;

        if state.is_recording() {
            let persist = self.core.playback_settings().save_on_interrupt;
            self.finish_recording(persist, None)?;
        }
        self.core.begin_playback(saved.namespace(), listener)
    }

    /// Replay the most recent recording
    pub fn start_playback_latest(&self, listener: Arc<dyn TriggerListener<T>>) -> Result<()> {
        let latest = self.latest_recording().ok_or_else(|| {
            RecorderError::InvalidArgument(format!("{} has no saved recordings", self.recorder_id))
        })?;
        self.start_playback(latest.id, listener)
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

    /// Receiver of recording-mode changes
    pub fn subscribe_recording_mode(&self) -> Receiver<bool> {
        self.core.subscribe_recording_mode()
    }

    /// Receiver of playback-mode changes
    pub fn subscribe_playback_mode(&self) -> Receiver<bool> {
        self.core.subscribe_playback_mode()
    }
}

/// Save worker body
fn save_recording<T: Serialize + DeserializeOwned + Send + 'static>(
    core: &RecorderCore<T>,
    recorder_id: RecorderId,
    entries: Vec<Entry<T>>,
    title: Option<String>,
) {
    match write_recording(core, recorder_id, &entries, title) {
        Ok(saved) => core.emit(RecorderEvent::RecordingSaved(saved)),
        Err(e) => {
            tracing::error!("{}: save failed: {}", core.slot(), e);
            core.report_error(e);
        }
    }
}

fn write_recording<T: Serialize + DeserializeOwned + Send + 'static>(
    core: &RecorderCore<T>,
    recorder_id: RecorderId,
    entries: &[Entry<T>],
    title: Option<String>,
) -> Result<SavedRecording> {
    let manager = core.manager();
    let store = core.store();
    let id = manager.allocate_recording_id();
    let namespace = recording_namespace(id);

    store
        .create(&namespace)
        .with_context(|| format!("Failed to create {}", namespace))?;

    let total = entries.len();
    for (index, entry) in entries.iter().enumerate() {
        let document = entry.to_stored()?.to_document()?;
        store
            .append(&namespace, &entry_key(index as u64), &document)
            .with_context(|| format!("Failed to write entry {} of {}", index, namespace))?;
        tracing::trace!("{}: saved entry {}/{}", core.slot(), index + 1, total);
        core.emit(RecorderEvent::SaveProgress(
            (index + 1) as f64 / total as f64 * 100.0,
        ));
    }

    let saved = SavedRecording::new(id, title);
    manager.recording_created(recorder_id, saved.clone())?;
    Ok(saved)
}

impl<T> Recorder for ActionRecorder<T>
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

    /// Delete every recording of this recorder and clear its slot
    fn clear_recording_data(&self) -> Result<()> {
        self.core.ensure_usable()?;
        self.core.manager().delete_recordings(self.recorder_id)?;
        self.core.clear_slot()
    }

    fn release(&self) -> Result<()> {
        self.lock_buffer().clear();
        self.core.release()
    }

    /// Entries of the most recent recording (0 when there is none)
    fn entry_count(&self) -> Result<u64> {
        self.core.ensure_usable()?;
        match self.latest_recording() {
            Some(saved) => self.core.store().count(&saved.namespace()),
            None => Ok(0),
        }
    }

    fn flush_callbacks(&self, timeout: Duration) -> bool {
        self.core.flush_callbacks(timeout)
    }
}

impl<T> Drop for ActionRecorder<T> {
    fn drop(&mut self) {
        self.core.cancel();
    }
}
