//! Playback engine for replaying recordings
//!
//! A [`PlaybackEngine`] runs on its own thread for exactly one playback
//! session. It loads the whole recording first, then walks the entries in
//! order, waiting each entry's duration before handing its payload to the
//! trigger listener.
//!
//! # Timing
//!
//! The wait is a blocking receive with a deadline on the session's stop
//! channel: it returns early only when the session is cancelled, so a
//! trigger never fires before its declared delay has passed. Handing a
//! trigger over blocks until the listener returned, and the next deadline is
//! taken only afterwards, so a slow listener delays every later trigger by
//! at least its own duration and jitter only ever adds delay.
//!
//! # Faults
//!
//! A load failure ends the session and is reported once. An entry whose
//! payload cannot be decoded is handled according to [`FaultPolicy`]: `Halt`
//! ends the session and reports the error, `Skip` reports it through the
//! recorder callback and moves on.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{de::DeserializeOwned, Serialize};

use super::base::RecorderCore;
use super::callback::TriggerListener;
use super::types::PlaybackCursor;
use crate::backend::load_entries;
use crate::config::{FaultPolicy, PlaybackSettings};
use crate::error::ResultExt;
use crate::types::PlaybackLimit;

/// Replay worker for one playback session
pub struct PlaybackEngine<T> {
    /// Recorder that owns the session
    core: RecorderCore<T>,
    /// Session number assigned by the recorder
    session: u64,
    /// Namespace holding the recording
    namespace: String,
    /// Receives every replayed payload
    listener: Arc<dyn TriggerListener<T>>,
    /// Disconnects when the session is stopped
    stop_rx: Receiver<()>,
    /// Runs before stopping on its own
    limit: PlaybackLimit,
    /// Behaviour on undecodable payloads
    fault_policy: FaultPolicy,
}

impl<T> PlaybackEngine<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Create the worker for `session`
    pub(crate) fn new(
        core: RecorderCore<T>,
        session: u64,
        namespace: String,
        listener: Arc<dyn TriggerListener<T>>,
        stop_rx: Receiver<()>,
        settings: PlaybackSettings,
    ) -> Self {
        Self {
            core,
            session,
            namespace,
            listener,
            stop_rx,
            limit: settings.limit(),
            fault_policy: settings.fault_policy,
        }
    }

    /// Run the session to completion
    pub fn run(self) {
        let entries = match load_entries(self.core.store().as_ref(), &self.namespace)
            .with_context(|| format!("Failed to load {}", self.namespace))
        {
            Ok(entries) => entries,
            Err(e) => {
                self.core.fail_playback(self.session, &self.listener, e);
                return;
            }
        };

        tracing::debug!(
            "{}: loaded {} entries from {}",
            self.core.slot(),
            entries.len(),
            self.namespace
        );
        if !self.core.announce_playback_started(self.session) {
            return;
        }

        let mut cursor = PlaybackCursor::new(entries);
        if cursor.is_empty() {
            self.core.finish_playback(self.session);
            return;
        }

        while let Some(entry) = cursor.current() {
            let deadline = Instant::now() + entry.duration();
            match self.stop_rx.recv_deadline(deadline) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            if !self.core.is_session_active(self.session) {
                break;
            }

            match entry.decode_payload::<T>() {
                Ok(payload) => {
                    tracing::trace!(
                        "{}: trigger {} of run {}",
                        self.core.slot(),
                        cursor.current_index(),
                        cursor.runs_completed() + 1
                    );
                    if !self.core.fire_trigger(self.session, &self.listener, payload) {
                        break;
                    }
                }
                Err(e) => {
                    let e = e.with_context(format!(
                        "Entry {} of {}",
                        cursor.current_index(),
                        self.namespace
                    ));
                    match self.fault_policy {
                        FaultPolicy::Halt => {
                            self.core.fail_playback(self.session, &self.listener, e);
                            break;
                        }
                        FaultPolicy::Skip => {
                            tracing::warn!("{}: skipping entry: {}", self.core.slot(), e);
                            self.core.report_error(e);
                        }
                    }
                }
            }

            cursor.advance();
            self.core.record_runs(self.session, cursor.runs_completed());
            if self.limit.is_reached(cursor.runs_completed()) {
                tracing::debug!(
                    "{}: playback limit of {} runs reached",
                    self.core.slot(),
                    cursor.runs_completed()
                );
                self.core.finish_playback(self.session);
                break;
            }
        }
    }
}
