//! Playback settings shared by all recorders
//!
//! These settings control how a playback session behaves once started:
//! how many runs it performs, what happens when a stored payload cannot be
//! decoded, and whether an interrupted recording is saved before playback.
//!
//! # Main Types
//!
//! - [`PlaybackSettings`] - Serializable defaults applied to new recorders
//! - [`FaultPolicy`] - Halt or skip on a poisoned entry

use serde::{Deserialize, Serialize};

use crate::types::PlaybackLimit;

/// What the playback loop does when an entry's payload cannot be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Surface the error and stop playback
    #[default]
    Halt,
    /// Surface the error and continue with the next entry
    Skip,
}

/// Playback settings applied to newly created recorders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Number of full runs before playback stops on its own (absent or 0 = unlimited)
    #[serde(default)]
    pub playback_limit: Option<u32>,

    /// Behaviour on undecodable payloads
    #[serde(default)]
    pub fault_policy: FaultPolicy,

    /// Persist the in-progress recording when playback interrupts it
    #[serde(default)]
    pub save_on_interrupt: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            playback_limit: None,
            fault_policy: FaultPolicy::Halt,
            save_on_interrupt: false,
        }
    }
}

impl PlaybackSettings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved playback limit
    pub fn limit(&self) -> PlaybackLimit {
        PlaybackLimit::from_runs(self.playback_limit.unwrap_or(0))
    }

    /// Set the playback limit
    pub fn set_limit(&mut self, limit: PlaybackLimit) {
        self.playback_limit = match limit {
            PlaybackLimit::Unlimited => None,
            PlaybackLimit::Runs(runs) => Some(runs.get()),
        };
    }
}
