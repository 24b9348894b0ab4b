//! Session recording and playback module
//!
//! This module holds the recorder state machine and everything around it:
//! capturing live actions, authored scripts, the timed replay worker, the
//! callback barrier for several recorders and the application-wide registry.
//!
//! # Main Types
//!
//! - [`ActionRecorder`] - Measures the delay between live actions and saves them
//! - [`FixedActionRecorder`] - Replays a script written ahead of time
//! - [`Recorder`] - Object-safe operations shared by both recorder kinds
//! - [`RecorderManager`] - Slots, recording ids and the saved-recording registry
//! - [`Aggregator`] - Fires one callback once N recorders reported an event
//! - [`PlaybackEngine`] - Worker that replays one session
//!
//! # Threads
//!
//! The caller's thread only starts and stops things. Saving and playback run
//! on their own worker threads, and every recorder owns a dispatch thread
//! that invokes [`RecorderCallback`] and [`TriggerListener`] methods in the
//! order the events happened.

pub mod aggregator;
pub mod base;
pub mod callback;
pub(crate) mod dispatch;
pub mod fixed;
pub mod manager;
pub mod observable;
pub mod player;
pub mod recorder;
pub mod types;

pub use aggregator::Aggregator;
pub use base::{Recorder, RecorderCore};
pub use callback::{EventKind, NoopCallback, RecorderCallback, RecorderEvent, TriggerListener};
pub use fixed::{Action, FixedActionRecorder};
pub use manager::RecorderManager;
pub use observable::ModeWatch;
pub use player::PlaybackEngine;
pub use recorder::ActionRecorder;
pub use types::{PlaybackCursor, RecorderState};
