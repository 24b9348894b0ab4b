//! # EventRecord-RS: record and replay timed actions
//!
//! A library for capturing a sequence of timestamped actions (arbitrary
//! serializable payloads plus the delay before each one), persisting them and
//! replaying them later with the same relative timing.
//!
//! ## Architecture
//!
//! - **Session**: Recorder state machine, save and playback workers, callback
//!   barrier and the recording registry
//! - **Backend**: The [`backend::EntryStore`] seam with in-memory and
//!   JSON-lines file implementations
//! - **Communication**: Crossbeam channels carry typed events from the workers
//!   to a per-recorder dispatch thread
//!
//! ## Configuration
//!
//! Configuration and the file store live in the platform-appropriate data
//! directory under `dev.eventrecord.eventrecord-rs`:
//!
//! - **Linux**: `~/.local/share/dev.eventrecord.eventrecord-rs/`
//! - **macOS**: `~/Library/Application Support/dev.eventrecord.eventrecord-rs/`
//! - **Windows**: `%APPDATA%\dev.eventrecord.eventrecord-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use eventrecord_rs::{backend::open_store, AppConfig, ActionRecorder, RecorderId, RecorderManager};
//! use std::sync::Arc;
//!
//! let config = AppConfig::load_or_default(AppConfig::default_path()?);
//! let manager = RecorderManager::shared(open_store(&config.store)?, &config)?;
//!
//! let recorder = ActionRecorder::<String>::new(manager, RecorderId(1))?;
//! recorder.start_recording()?;
//! recorder.action_performed("tap".to_string());
//! recorder.stop_recording(true)?;
//!
//! // Later, once on_recording_saved fired
//! recorder.start_playback_latest(Arc::new(|payload: String| println!("{payload}")))?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use backend::{EntryStore, FileStore, MemoryStore};
pub use config::{AppConfig, FaultPolicy, PlaybackSettings};
pub use error::{RecorderError, Result};
pub use session::{
    ActionRecorder, Aggregator, FixedActionRecorder, Recorder, RecorderCallback, RecorderManager,
    RecorderState, TriggerListener,
};
pub use types::{Entry, PlaybackLimit, RecorderId, RecordingId, SavedRecording};
