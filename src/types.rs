//! Core data types for eventrecord-rs
//!
//! This module contains the data structures shared by the recorders, the
//! playback engine and the entry stores.
//!
//! # Main Types
//!
//! - [`Entry`] - An in-memory `(payload, duration)` pair captured while recording
//! - [`StoredEntry`] - The persisted form of an entry, payload kept as JSON
//! - [`RecordingId`] / [`RecorderId`] - Identifiers for saved recordings and recorders
//! - [`SavedRecording`] - Registry metadata for a saved recording
//! - [`PlaybackLimit`] - How many full runs a playback session performs
//!
//! # Storage Namespaces
//!
//! Every recorder owns one storage namespace (its *slot*), every saved
//! recording lives in its own `recording_<id>` namespace, and the registry
//! lives in [`REGISTRY_NAMESPACE`]. The helpers at the bottom of this module
//! derive those names.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::error::{RecorderError, Result};

/// Namespace holding the recording registry
pub const REGISTRY_NAMESPACE: &str = "recorder_recordings";

/// Prefix of saved recording namespaces
pub const RECORDING_NAMESPACE_PREFIX: &str = "recording_";

/// Prefix of entry keys inside a namespace
pub const ENTRY_KEY_PREFIX: &str = "entry_";

/// Identifier of a saved recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordingId(pub u32);

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Caller-chosen identifier grouping the recordings made by one recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecorderId(pub u32);

impl fmt::Display for RecorderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recorder-{}", self.0)
    }
}

/// The kinds of recorder that own a storage slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecorderKind {
    /// Measured recording ([`crate::session::ActionRecorder`])
    Action,
    /// Authored script ([`crate::session::FixedActionRecorder`])
    Fixed,
}

impl RecorderKind {
    /// Prefix of the slot namespace for this kind
    pub fn slot_prefix(&self) -> &'static str {
        match self {
            RecorderKind::Action => "action_record_data_",
            RecorderKind::Fixed => "fixed_action_record_data_",
        }
    }

    /// Slot namespace for the n-th recorder of this kind
    pub fn slot_name(&self, ordinal: u32) -> String {
        format!("{}{}", self.slot_prefix(), ordinal)
    }
}

/// One captured action: the payload and the time that elapsed before it fired
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    /// Caller payload
    pub payload: T,
    /// Delay relative to the previous entry (or to the start of recording)
    pub duration: Duration,
}

impl<T> Entry<T> {
    /// Create an entry from a duration
    pub fn new(payload: T, duration: Duration) -> Self {
        Self { payload, duration }
    }

    /// Create an entry from signed milliseconds; negative values are clamped to zero
    pub fn from_millis(payload: T, millis: i64) -> Self {
        if millis < 0 {
            tracing::warn!("Negative entry duration {}ms clamped to 0", millis);
        }
        Self {
            payload,
            duration: Duration::from_millis(millis.max(0) as u64),
        }
    }

    /// Duration in whole milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis().min(u64::MAX as u128) as u64
    }
}

impl<T: Serialize> Entry<T> {
    /// Serialize into the persisted form
    pub fn to_stored(&self) -> Result<StoredEntry> {
        Ok(StoredEntry {
            payload: serde_json::to_value(&self.payload)?,
            duration_ms: self.duration_ms(),
        })
    }
}

/// Persisted form of an [`Entry`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Payload as a JSON document, decoded again at trigger time
    pub payload: serde_json::Value,
    /// Delay before this entry fires, in milliseconds
    pub duration_ms: u64,
}

impl StoredEntry {
    /// Decode a stored document into an entry record
    pub fn from_document(document: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(document)?)
    }

    /// Encode into the document written to the store
    pub fn to_document(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Delay before this entry fires
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Re-materialize the payload as the caller's type
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.payload).map_err(|e| RecorderError::Data(e.to_string()))
    }
}

/// Registry metadata for a saved recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRecording {
    /// Recording identifier
    pub id: RecordingId,
    /// Optional human readable title
    pub title: Option<String>,
    /// When the recording finished saving
    pub created_at: DateTime<Utc>,
}

impl SavedRecording {
    /// Create metadata stamped with the current time
    pub fn new(id: RecordingId, title: Option<String>) -> Self {
        Self {
            id,
            title,
            created_at: Utc::now(),
        }
    }

    /// Namespace the entries of this recording live in
    pub fn namespace(&self) -> String {
        recording_namespace(self.id)
    }
}

impl PartialOrd for SavedRecording {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SavedRecording {
    fn cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then(self.id.cmp(&other.id))
    }
}

/// How many full runs a playback session performs before stopping itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackLimit {
    /// Loop until stopped
    #[default]
    Unlimited,
    /// Stop after this many complete passes over the recording
    Runs(NonZeroU32),
}

impl PlaybackLimit {
    /// Build from a run count where `0` means unlimited
    pub fn from_runs(runs: u32) -> Self {
        NonZeroU32::new(runs)
            .map(PlaybackLimit::Runs)
            .unwrap_or(PlaybackLimit::Unlimited)
    }

    /// Check whether the limit is reached after `runs_completed` runs
    pub fn is_reached(&self, runs_completed: u32) -> bool {
        match self {
            PlaybackLimit::Unlimited => false,
            PlaybackLimit::Runs(limit) => runs_completed >= limit.get(),
        }
    }
}

/// Key of the entry at `index` inside a namespace
///
/// Zero padded so lexical order matches insertion order.
pub fn entry_key(index: u64) -> String {
    format!("{}{:010}", ENTRY_KEY_PREFIX, index)
}

/// Namespace of a saved recording
pub fn recording_namespace(id: RecordingId) -> String {
    format!("{}{}", RECORDING_NAMESPACE_PREFIX, id.0)
}

/// Parse the recording id back out of a recording namespace
pub fn recording_id_from_namespace(namespace: &str) -> Option<RecordingId> {
    namespace
        .strip_prefix(RECORDING_NAMESPACE_PREFIX)
        .and_then(|id| id.parse().ok())
        .map(RecordingId)
}
