//! Multi-recorder callback barrier
//!
//! An [`Aggregator`] is installed as the callback of N recorders and forwards
//! each lifecycle event to a single target callback once all N recorders have
//! reported it. Every event kind has its own counter; when a counter reaches
//! N it is reset to zero and the target is called exactly once.
//!
//! Errors are not counted. Every member error reaches the target
//! immediately.
//!
//! # Example
//!
//! ```ignore
//! let shared = manager.set_shared_callback(&[&positions, &controls], Arc::new(MyUi))?;
//! positions.start_recording()?;
//! controls.start_recording()?; // MyUi::on_recording_started fires here
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::callback::{EventKind, RecorderCallback, RecorderEvent};
use crate::error::{RecorderError, Result};
use crate::types::SavedRecording;

/// Callback barrier for a fixed number of member recorders
pub struct Aggregator {
    /// Number of member recorders
    members: usize,
    /// Receives the aggregated events
    target: Arc<dyn RecorderCallback>,
    /// Arrivals per event kind in the current round
    counters: Mutex<HashMap<EventKind, usize>>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("members", &self.members)
            .field("counters", &self.counters)
            .finish()
    }
}

impl Aggregator {
    /// Create a barrier for `members` recorders
    pub fn new(members: usize, target: Arc<dyn RecorderCallback>) -> Result<Self> {
        if members == 0 {
            return Err(RecorderError::InvalidArgument(
                "An aggregator needs at least one member".to_string(),
            ));
        }
        Ok(Self {
            members,
            target,
            counters: Mutex::new(HashMap::new()),
        })
    }

    /// Number of member recorders
    pub fn members(&self) -> usize {
        self.members
    }

    /// Arrivals of `kind` in the current round
    pub fn pending(&self, kind: EventKind) -> usize {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    fn arrive(&self, event: RecorderEvent) {
        let kind = event.kind();
        let complete = {
            let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
            let count = counters.entry(kind).or_insert(0);
            *count += 1;
            if *count >= self.members {
                *count = 0;
                true
            } else {
                false
            }
        };
        if complete {
            tracing::trace!("Aggregated {:?} from {} recorders", kind, self.members);
            event.deliver(self.target.as_ref());
        }
    }
}

impl RecorderCallback for Aggregator {
    fn on_recording_started(&self) {
        self.arrive(RecorderEvent::RecordingStarted);
    }

    fn on_recording_stopped(&self) {
        self.arrive(RecorderEvent::RecordingStopped);
    }

    fn on_recording_save_progress(&self, progress: f64) {
        self.arrive(RecorderEvent::SaveProgress(progress));
    }

    fn on_recording_saved(&self, recording: &SavedRecording) {
        self.arrive(RecorderEvent::RecordingSaved(recording.clone()));
    }

    fn on_recording_data_cleared(&self) {
        self.arrive(RecorderEvent::DataCleared);
    }

    fn on_pre_playback(&self) {
        self.arrive(RecorderEvent::PrePlayback);
    }

    fn on_playback_started(&self) {
        self.arrive(RecorderEvent::PlaybackStarted);
    }

    fn on_playback_stopped(&self) {
        self.arrive(RecorderEvent::PlaybackStopped);
    }

    fn on_error(&self, error: &RecorderError) {
        self.target.on_error(error);
    }
}
