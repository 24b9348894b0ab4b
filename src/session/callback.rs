//! Callback traits and lifecycle events
//!
//! Recorders report their lifecycle to a [`RecorderCallback`] and deliver
//! replayed payloads to a [`TriggerListener`]. Every method has a no-op
//! default, so implementors only override what they care about.
//!
//! Internally each lifecycle notification travels as a [`RecorderEvent`] over
//! the recorder's dispatch channel and is turned back into a method call on
//! the dispatch thread.

use std::fmt;
use std::sync::Arc;

use crate::error::RecorderError;
use crate::types::SavedRecording;

/// Receiver of recorder lifecycle events
///
/// Called from the recorder's dispatch thread, never from the caller's thread.
pub trait RecorderCallback: Send + Sync {
    /// Recording has started
    fn on_recording_started(&self) {}

    /// Recording has stopped
    fn on_recording_stopped(&self) {}

    /// A saved entry was flushed; `progress` is in `[0, 100]`
    fn on_recording_save_progress(&self, _progress: f64) {}

    /// Every buffered entry was written and the recording was registered
    fn on_recording_saved(&self, _recording: &SavedRecording) {}

    /// The recorder's persisted data was cleared
    fn on_recording_data_cleared(&self) {}

    /// Playback was requested and is about to load its entries
    fn on_pre_playback(&self) {}

    /// Entries are loaded and the replay loop is running
    fn on_playback_started(&self) {}

    /// Playback has stopped
    fn on_playback_stopped(&self) {}

    /// A background save or playback failed
    fn on_error(&self, _error: &RecorderError) {}
}

/// Callback that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallback;

impl RecorderCallback for NoopCallback {}

/// Receiver of replayed payloads
pub trait TriggerListener<T>: Send + Sync {
    /// One replayed entry fired
    fn on_trigger(&self, payload: T);

    /// The playback session hit an unrecoverable fault
    fn on_error(&self, _error: &RecorderError) {}
}

impl<T, F> TriggerListener<T> for F
where
    F: Fn(T) + Send + Sync,
{
    fn on_trigger(&self, payload: T) {
        self(payload)
    }
}

/// Kind of a lifecycle event, used by the aggregator to count rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RecordingStarted,
    RecordingStopped,
    SaveProgress,
    RecordingSaved,
    DataCleared,
    PrePlayback,
    PlaybackStarted,
    PlaybackStopped,
    Error,
}

/// A lifecycle notification
#[derive(Clone)]
pub enum RecorderEvent {
    RecordingStarted,
    RecordingStopped,
    SaveProgress(f64),
    RecordingSaved(SavedRecording),
    DataCleared,
    PrePlayback,
    PlaybackStarted,
    PlaybackStopped,
    Error(Arc<RecorderError>),
}

impl RecorderEvent {
    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            RecorderEvent::RecordingStarted => EventKind::RecordingStarted,
            RecorderEvent::RecordingStopped => EventKind::RecordingStopped,
            RecorderEvent::SaveProgress(_) => EventKind::SaveProgress,
            RecorderEvent::RecordingSaved(_) => EventKind::RecordingSaved,
            RecorderEvent::DataCleared => EventKind::DataCleared,
            RecorderEvent::PrePlayback => EventKind::PrePlayback,
            RecorderEvent::PlaybackStarted => EventKind::PlaybackStarted,
            RecorderEvent::PlaybackStopped => EventKind::PlaybackStopped,
            RecorderEvent::Error(_) => EventKind::Error,
        }
    }

    /// Invoke the matching callback method
    pub fn deliver(&self, callback: &dyn RecorderCallback) {
        match self {
            RecorderEvent::RecordingStarted => callback.on_recording_started(),
            RecorderEvent::RecordingStopped => callback.on_recording_stopped(),
            RecorderEvent::SaveProgress(progress) => callback.on_recording_save_progress(*progress),
            RecorderEvent::RecordingSaved(saved) => callback.on_recording_saved(saved),
            RecorderEvent::DataCleared => callback.on_recording_data_cleared(),
            RecorderEvent::PrePlayback => callback.on_pre_playback(),
            RecorderEvent::PlaybackStarted => callback.on_playback_started(),
            RecorderEvent::PlaybackStopped => callback.on_playback_stopped(),
            RecorderEvent::Error(error) => callback.on_error(error),
        }
    }
}

impl fmt::Debug for RecorderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderEvent::SaveProgress(progress) => write!(f, "SaveProgress({:.1})", progress),
            RecorderEvent::RecordingSaved(saved) => write!(f, "RecordingSaved({})", saved.id),
            RecorderEvent::Error(error) => write!(f, "Error({})", error),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}
