//! Error handling for eventrecord-rs
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the library.
//!
//! # Categories
//!
//! Every error falls into one of the families the recorders care about:
//!
//! - **State** - an illegal transition or a request that cannot be honoured
//!   in the current mode. Returned synchronously to the caller.
//! - **Storage** - I/O or serialization failure while saving or loading.
//!   Raised on a background worker and surfaced once through `on_error`.
//! - **Data** - a payload that cannot be decoded at trigger time.
//!
//! Use [`RecorderError::category`] to branch on the family.

use thiserror::Error;

use crate::session::types::RecorderState;
use crate::types::RecordingId;

/// Error family, see the module documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Illegal transition or invalid request
    State,
    /// I/O or serialization failure in the entry store
    Storage,
    /// Undecodable payload
    Data,
    /// Configuration and plumbing errors
    Other,
}

/// Main error type for recorder operations
#[derive(Error, Debug)]
pub enum RecorderError {
    /// The operation is not legal in the recorder's current state
    #[error("Cannot {operation} while {state}")]
    IllegalTransition {
        operation: &'static str,
        state: RecorderState,
    },

    /// Playback was requested for a recording the registry does not know
    #[error("Recording {0} does not exist")]
    UnknownRecording(RecordingId),

    /// The recorder was released and can no longer be used
    #[error("Recorder has been released")]
    Released,

    /// A caller supplied an argument outside the accepted range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Errors reported by an entry store
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors while writing or reading stored documents
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored payload could not be turned back into the recorder's type
    #[error("Data error: {0}")]
    Data(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RecorderError>,
    },
}

impl RecorderError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RecorderError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for an illegal transition error
    pub fn illegal(operation: &'static str, state: RecorderState) -> Self {
        RecorderError::IllegalTransition { operation, state }
    }

    /// Classify the error
    pub fn category(&self) -> ErrorCategory {
        match self {
            RecorderError::IllegalTransition { .. }
            | RecorderError::UnknownRecording(_)
            | RecorderError::Released
            | RecorderError::InvalidArgument(_) => ErrorCategory::State,
            RecorderError::Storage(_)
            | RecorderError::Io(_)
            | RecorderError::Serialization(_) => ErrorCategory::Storage,
            RecorderError::Data(_) => ErrorCategory::Data,
            RecorderError::Config(_) | RecorderError::Channel(_) => ErrorCategory::Other,
            RecorderError::WithContext { source, .. } => source.category(),
        }
    }

    /// Check if this is a state error
    pub fn is_state_error(&self) -> bool {
        self.category() == ErrorCategory::State
    }

    /// Check if this is a storage fault
    pub fn is_storage_fault(&self) -> bool {
        self.category() == ErrorCategory::Storage
    }

    /// Check if this is a data fault
    pub fn is_data_fault(&self) -> bool {
        self.category() == ErrorCategory::Data
    }
}

/// Result type alias for recorder operations
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| RecorderError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| RecorderError::Io(e).with_context(f()))
    }
}
