//! Recorder state machine
//!
//! [`RecorderCore`] is the part shared by every recorder kind: the
//! `Idle`/`Recording`/`PlayingBack` mode, elapsed-time accounting, the two
//! mode observables, the callback and the dispatch thread that delivers it.
//!
//! # Locking
//!
//! All mode changes happen under one state mutex. Events are queued on the
//! dispatch channel while that mutex is held, so callbacks observe state
//! changes in the order they happened. Background workers identify
//! themselves with a session number; a worker whose session is no longer the
//! active one cannot change state or fire triggers.
//!
//! # Cancellation
//!
//! Each playback session owns the receiving end of a stop channel. Ending the
//! session drops the sender, which wakes the worker out of its timed wait,
//! and closes the dispatcher's trigger gate. Caller-facing operations that
//! end a session also wait for a trigger already inside the listener, so no
//! `on_trigger` runs once they return.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};
use serde::{de::DeserializeOwned, Serialize};

use super::callback::{NoopCallback, RecorderCallback, RecorderEvent, TriggerListener};
use super::dispatch::{Dispatcher, Notification};
use super::manager::RecorderManager;
use super::observable::ModeWatch;
use super::player::PlaybackEngine;
use super::types::RecorderState;
use crate::backend::EntryStore;
use crate::config::PlaybackSettings;
use crate::error::{RecorderError, Result, ResultExt};
use crate::types::{PlaybackLimit, RecorderKind};

/// Operations every recorder kind supports
///
/// Object safe, so heterogeneous recorders can be handled together (for
/// example by [`RecorderManager::set_shared_callback`]).
pub trait Recorder: Send + Sync {
    /// Current mode
    fn state(&self) -> RecorderState;

    /// Check if recording
    fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    /// Check if playing back
    fn is_playing_back(&self) -> bool {
        self.state().is_playing_back()
    }

    /// Storage slot namespace owned by this recorder
    fn slot(&self) -> &str;

    /// Replace the lifecycle callback
    fn set_callback(&self, callback: Arc<dyn RecorderCallback>);

    /// Leave playback; always reports `on_playback_stopped`
    fn stop_playback(&self) -> Result<()>;

    /// Delete this recorder's persisted entries
    fn clear_recording_data(&self) -> Result<()>;

    /// Free the storage slot; the recorder is unusable afterwards
    fn release(&self) -> Result<()>;

    /// Number of persisted entries (synchronous store read)
    fn entry_count(&self) -> Result<u64>;

    /// Block until every callback queued so far has been delivered
    fn flush_callbacks(&self, timeout: Duration) -> bool;
}

#[derive(Debug)]
struct CoreState {
    mode: RecorderState,
    /// Incremented for every playback session
    session: u64,
    /// Reference point for elapsed-time accounting
    reset_at: Instant,
    released: bool,
    /// Dropping this wakes and stops the playback worker
    stop_signal: Option<Sender<()>>,
    /// Runs completed by the current or last playback session
    runs_completed: u32,
}

struct CoreInner<T> {
    slot: String,
    kind: RecorderKind,
    store: Arc<dyn EntryStore>,
    manager: Arc<RecorderManager>,
    state: Mutex<CoreState>,
    recording_mode: ModeWatch,
    playback_mode: ModeWatch,
    callback: RwLock<Arc<dyn RecorderCallback>>,
    settings: Mutex<PlaybackSettings>,
    dispatcher: Dispatcher<T>,
}

/// Shared state machine behind every recorder
///
/// Cheap to clone; background workers hold clones.
pub struct RecorderCore<T> {
    inner: Arc<CoreInner<T>>,
}

impl<T> Clone for RecorderCore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for RecorderCore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderCore")
            .field("slot", &self.inner.slot)
            .field("state", &*self.lock())
            .finish()
    }
}

impl<T> RecorderCore<T> {
    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop any activity without reporting it
    pub(crate) fn cancel(&self) {
        let mut state = self.lock();
        match state.mode {
            RecorderState::PlayingBack => {
                state.mode = RecorderState::Idle;
                state.stop_signal = None;
                self.inner.dispatcher.close_gate();
                self.inner.playback_mode.publish(false);
            }
            RecorderState::Recording => {
                state.mode = RecorderState::Idle;
                self.inner.recording_mode.publish(false);
            }
            RecorderState::Idle => {}
        }
    }
}

impl<T> RecorderCore<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Register a new recorder of `kind` with the manager and create its slot
    pub(crate) fn new(manager: Arc<RecorderManager>, kind: RecorderKind) -> Result<Self> {
        let slot = manager.register_recorder(kind);
        let store = manager.store();
        if let Err(e) = store.create(&slot) {
            manager.recorder_released(kind);
            return Err(e.with_context(format!("Failed to create slot {}", slot)));
        }
        let dispatcher = Dispatcher::spawn(&slot)?;
        let settings = manager.playback_defaults().clone();

        tracing::debug!("Recorder {} created", slot);
        Ok(Self {
            inner: Arc::new(CoreInner {
                slot,
                kind,
                store,
                manager,
                state: Mutex::new(CoreState {
                    mode: RecorderState::Idle,
                    session: 0,
                    reset_at: Instant::now(),
                    released: false,
                    stop_signal: None,
                    runs_completed: 0,
                }),
                recording_mode: ModeWatch::new(),
                playback_mode: ModeWatch::new(),
                callback: RwLock::new(Arc::new(NoopCallback)),
                settings: Mutex::new(settings),
                dispatcher,
            }),
        })
    }

    // ==================== Accessors ====================

    /// Current mode
    pub fn state(&self) -> RecorderState {
        self.lock().mode
    }

    /// Slot namespace
    pub fn slot(&self) -> &str {
        &self.inner.slot
    }

    /// Recorder kind
    pub fn kind(&self) -> RecorderKind {
        self.inner.kind
    }

    /// Entry store
    pub fn store(&self) -> &Arc<dyn EntryStore> {
        &self.inner.store
    }

    /// Owning manager
    pub fn manager(&self) -> &Arc<RecorderManager> {
        &self.inner.manager
    }

    /// Check whether `release` was called
    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Fail with [`RecorderError::Released`] once released
    pub fn ensure_usable(&self) -> Result<()> {
        if self.is_released() {
            Err(RecorderError::Released)
        } else {
            Ok(())
        }
    }

    /// Receiver of recording-mode changes, starting with the current value
    pub fn subscribe_recording_mode(&self) -> crossbeam_channel::Receiver<bool> {
        self.inner.recording_mode.subscribe()
    }

    /// Receiver of playback-mode changes, starting with the current value
    pub fn subscribe_playback_mode(&self) -> crossbeam_channel::Receiver<bool> {
        self.inner.playback_mode.subscribe()
    }

    /// Snapshot of the playback settings
    pub fn playback_settings(&self) -> PlaybackSettings {
        self.inner
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the playback settings used by the next session
    pub fn set_playback_settings(&self, settings: PlaybackSettings) {
        *self.inner.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Set the run limit used by the next session
    pub fn set_playback_limit(&self, limit: PlaybackLimit) {
        self.inner
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_limit(limit);
    }

    /// Run limit used by the next session
    pub fn playback_limit(&self) -> PlaybackLimit {
        self.playback_settings().limit()
    }

    /// Runs completed by the current or last playback session
    pub fn runs_completed(&self) -> u32 {
        self.lock().runs_completed
    }

    // ==================== Callbacks ====================

    /// Replace the lifecycle callback
    pub fn set_callback(&self, callback: Arc<dyn RecorderCallback>) {
        *self.inner.callback.write().unwrap_or_else(PoisonError::into_inner) = callback;
    }

    fn callback(&self) -> Arc<dyn RecorderCallback> {
        Arc::clone(&self.inner.callback.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Queue a lifecycle event for the callback
    pub(crate) fn emit(&self, event: RecorderEvent) {
        self.inner.dispatcher.lifecycle(self.callback(), event);
    }

    /// Surface a background fault through the callback
    pub(crate) fn report_error(&self, error: RecorderError) {
        self.emit(RecorderEvent::Error(Arc::new(error)));
    }

    /// Block until every queued notification was delivered
    pub fn flush_callbacks(&self, timeout: Duration) -> bool {
        self.inner.dispatcher.flush(timeout)
    }

    // ==================== Recording ====================

    /// Enter `Recording`, stopping playback first if needed
    ///
    /// `on_start` runs under the state lock before the mode flips.
    pub(crate) fn begin_recording(&self, on_start: impl FnOnce()) -> Result<()> {
        {
            let mut state = self.lock();
            if state.released {
                return Err(RecorderError::Released);
            }
            if state.mode.is_recording() {
                return Err(RecorderError::illegal("start recording", state.mode));
            }
            if state.mode.is_playing_back() {
                self.leave_playback(&mut state);
                self.emit(RecorderEvent::PlaybackStopped);
            }

            on_start();
            state.mode = RecorderState::Recording;
            state.reset_at = Instant::now();
            self.inner.recording_mode.publish(true);
            self.emit(RecorderEvent::RecordingStarted);
        }
        self.inner.dispatcher.wait_for_triggers();
        tracing::info!("{}: recording started", self.inner.slot);
        Ok(())
    }

    /// Measure the time since the last step and reset the reference
    ///
    /// Returns `false` without calling `step` when not recording.
    pub(crate) fn record_step(&self, step: impl FnOnce(Duration)) -> bool {
        let mut state = self.lock();
        if !state.mode.is_recording() {
            return false;
        }
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.reset_at);
        state.reset_at = now;
        step(elapsed);
        true
    }

    /// Leave `Recording`; returns `false` (and emits nothing) if not recording
    ///
    /// `on_stop` runs under the state lock after the mode flips.
    pub(crate) fn end_recording(&self, on_stop: impl FnOnce()) -> Result<bool> {
        let mut state = self.lock();
        if state.released {
            return Err(RecorderError::Released);
        }
        if !state.mode.is_recording() {
            return Ok(false);
        }
        state.mode = RecorderState::Idle;
        on_stop();
        self.inner.recording_mode.publish(false);
        self.emit(RecorderEvent::RecordingStopped);
        tracing::info!("{}: recording stopped", self.inner.slot);
        Ok(true)
    }

    // ==================== Playback ====================

    /// Enter `PlayingBack` and spawn the playback worker for `namespace`
    ///
    /// Rejected while already playing back. A recording in progress is
    /// stopped without persisting; callers that want it saved stop it first.
    pub(crate) fn begin_playback(
        &self,
        namespace: String,
        listener: Arc<dyn TriggerListener<T>>,
    ) -> Result<()> {
        let settings = self.playback_settings();
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let session = {
            let mut state = self.lock();
            if state.released {
                return Err(RecorderError::Released);
            }
            if state.mode.is_playing_back() {
                return Err(RecorderError::illegal("start playback", state.mode));
            }
            if state.mode.is_recording() {
                state.mode = RecorderState::Idle;
                self.inner.recording_mode.publish(false);
                self.emit(RecorderEvent::RecordingStopped);
            }

            state.session += 1;
            state.mode = RecorderState::PlayingBack;
            state.stop_signal = Some(stop_tx);
            state.runs_completed = 0;
            self.inner.dispatcher.open_gate(state.session);
            self.inner.playback_mode.publish(true);
            self.emit(RecorderEvent::PrePlayback);
            state.session
        };

        tracing::info!("{}: playback of {} requested", self.inner.slot, namespace);
        let engine = PlaybackEngine::new(
            self.clone(),
            session,
            namespace,
            listener,
            stop_rx,
            settings,
        );
        let spawned = thread::Builder::new()
            .name(format!("playback-{}", self.inner.slot))
            .spawn(move || engine.run());
        if let Err(e) = spawned {
            self.finish_playback(session);
            return Err(RecorderError::Channel(format!(
                "Failed to spawn playback worker: {}",
                e
            )));
        }
        Ok(())
    }

    fn leave_playback(&self, state: &mut CoreState) {
        state.mode = RecorderState::Idle;
        state.stop_signal = None;
        self.inner.dispatcher.close_gate();
        self.inner.playback_mode.publish(false);
        tracing::info!("{}: playback stopped", self.inner.slot);
    }

    /// Leave playback on request of the caller
    ///
    /// Reports `on_playback_stopped` even when no session was active. Once
    /// this returns the listener receives no further triggers.
    pub(crate) fn stop_playback(&self) -> Result<()> {
        {
            let mut state = self.lock();
            if state.released {
                return Err(RecorderError::Released);
            }
            if state.mode.is_playing_back() {
                self.leave_playback(&mut state);
            }
            self.emit(RecorderEvent::PlaybackStopped);
        }
        self.inner.dispatcher.wait_for_triggers();
        Ok(())
    }

    /// Check that `session` is the active playback session
    pub(crate) fn is_session_active(&self, session: u64) -> bool {
        let state = self.lock();
        state.mode.is_playing_back() && state.session == session
    }

    /// End `session` from the worker side; no-op if it is no longer active
    pub(crate) fn finish_playback(&self, session: u64) -> bool {
        let mut state = self.lock();
        if !(state.mode.is_playing_back() && state.session == session) {
            return false;
        }
        self.leave_playback(&mut state);
        self.emit(RecorderEvent::PlaybackStopped);
        true
    }

    /// Report that `session` finished loading
    pub(crate) fn announce_playback_started(&self, session: u64) -> bool {
        let state = self.lock();
        if !(state.mode.is_playing_back() && state.session == session) {
            return false;
        }
        self.emit(RecorderEvent::PlaybackStarted);
        true
    }

    /// Hand a trigger to the listener if `session` is still active
    ///
    /// Blocks until the dispatch thread has handled it, so a slow listener
    /// holds back the rest of the session. Returns `false` if the session
    /// had already ended or the dispatch thread is gone.
    pub(crate) fn fire_trigger(
        &self,
        session: u64,
        listener: &Arc<dyn TriggerListener<T>>,
        payload: T,
    ) -> bool {
        let handled = {
            let state = self.lock();
            if !(state.mode.is_playing_back() && state.session == session) {
                return false;
            }
            self.inner
                .dispatcher
                .trigger(Arc::clone(listener), payload, session)
        };
        handled.recv().is_ok()
    }

    /// Record progress of `session`
    pub(crate) fn record_runs(&self, session: u64, runs: u32) {
        let mut state = self.lock();
        if state.session == session {
            state.runs_completed = runs;
        }
    }

    /// Stop `session` because of a fault and surface the fault once
    ///
    /// The listener and the callback both receive the error, after
    /// `on_playback_stopped`.
    pub(crate) fn fail_playback(
        &self,
        session: u64,
        listener: &Arc<dyn TriggerListener<T>>,
        error: RecorderError,
    ) {
        tracing::error!("{}: playback failed: {}", self.inner.slot, error);
        let error = Arc::new(error);
        let mut state = self.lock();
        if state.mode.is_playing_back() && state.session == session {
            self.leave_playback(&mut state);
            self.emit(RecorderEvent::PlaybackStopped);
        }
        self.inner.dispatcher.send(Notification::TriggerError(
            Arc::clone(listener),
            Arc::clone(&error),
        ));
        self.emit(RecorderEvent::Error(error));
    }

    // ==================== Storage ====================

    /// Number of entries in the slot namespace
    pub(crate) fn slot_entry_count(&self) -> Result<u64> {
        self.ensure_usable()?;
        self.inner.store.count(&self.inner.slot)
    }

    /// Clear the slot namespace and report `on_recording_data_cleared`
    pub(crate) fn clear_slot(&self) -> Result<()> {
        self.ensure_usable()?;
        self.inner
            .store
            .clear(&self.inner.slot)
            .with_context(|| format!("Failed to clear {}", self.inner.slot))?;
        self.emit(RecorderEvent::DataCleared);
        tracing::info!("{}: recording data cleared", self.inner.slot);
        Ok(())
    }

    /// Run `work` on a named background thread
    pub(crate) fn spawn_worker<F>(&self, name: &str, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        thread::Builder::new()
            .name(format!("{}-{}", name, self.inner.slot))
            .spawn(work)
            .map(|_| ())
            .map_err(|e| RecorderError::Channel(format!("Failed to spawn {} worker: {}", name, e)))
    }

    // ==================== Teardown ====================

    /// Stop all activity, delete the slot and mark the recorder released
    pub(crate) fn release(&self) -> Result<()> {
        {
            let mut state = self.lock();
            if state.released {
                return Err(RecorderError::Released);
            }
            match state.mode {
                RecorderState::Recording => {
                    state.mode = RecorderState::Idle;
                    self.inner.recording_mode.publish(false);
                    self.emit(RecorderEvent::RecordingStopped);
                }
                RecorderState::PlayingBack => {
                    self.leave_playback(&mut state);
                    self.emit(RecorderEvent::PlaybackStopped);
                }
                RecorderState::Idle => {}
            }
            state.released = true;
        }
        self.inner.dispatcher.wait_for_triggers();

        self.inner.manager.recorder_released(self.inner.kind);
        tracing::info!("{}: released", self.inner.slot);
        self.inner
            .store
            .delete(&self.inner.slot)
            .with_context(|| format!("Failed to delete {}", self.inner.slot))
    }
}
