//! Session data types

use std::fmt;

use crate::types::StoredEntry;

/// Mode of a recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecorderState {
    /// Neither recording nor playing back
    #[default]
    Idle,
    /// Capturing actions into the in-memory buffer
    Recording,
    /// Replaying a recording on the playback worker
    PlayingBack,
}

impl RecorderState {
    /// Check if currently recording
    pub fn is_recording(&self) -> bool {
        matches!(self, RecorderState::Recording)
    }

    /// Check if currently playing back
    pub fn is_playing_back(&self) -> bool {
        matches!(self, RecorderState::PlayingBack)
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::PlayingBack => "playing back",
        })
    }
}

/// Position of an active playback session
///
/// Created fresh for every playback session and dropped when it ends.
#[derive(Debug, Clone, Default)]
pub struct PlaybackCursor {
    /// Snapshot of the recording taken when playback started
    entries: Vec<StoredEntry>,
    /// Entry that fires next
    current_index: usize,
    /// Completed passes over the whole recording
    runs_completed: u32,
}

impl PlaybackCursor {
    /// Create a cursor positioned on the first entry
    pub fn new(entries: Vec<StoredEntry>) -> Self {
        Self {
            entries,
            current_index: 0,
            runs_completed: 0,
        }
    }

    /// Number of entries in the snapshot
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry that fires next, `None` for an empty recording
    pub fn current(&self) -> Option<&StoredEntry> {
        self.entries.get(self.current_index)
    }

    /// Index of the entry that fires next
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Completed passes over the recording
    pub fn runs_completed(&self) -> u32 {
        self.runs_completed
    }

    /// Move to the next entry, returning `true` when a run was completed
    pub fn advance(&mut self) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        self.current_index += 1;
        if self.current_index >= self.entries.len() {
            self.current_index = 0;
            self.runs_completed = self.runs_completed.saturating_add(1);
            return true;
        }
        false
    }
}
