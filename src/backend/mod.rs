//! Backend module for durable entry storage
//!
//! This module holds the storage seam the recorders write through. The
//! recorders never touch files directly: every read and write goes through an
//! [`EntryStore`] shared behind an `Arc`, so hosts can plug in their own
//! persistence and tests can inject faults.
//!
//! # Components
//!
//! - [`EntryStore`] - Namespaced, ordered key/document store trait
//! - [`MemoryStore`] - Volatile store for tests and demos
//! - [`FileStore`] - JSON-lines files, one per namespace
//! - [`open_store`] - Build the store selected by a [`StoreConfig`]
//!
//! # Example
//!
//! ```ignore
//! use eventrecord_rs::backend::{open_store, load_entries};
//! use eventrecord_rs::config::StoreConfig;
//!
//! let store = open_store(&StoreConfig::memory())?;
//! store.append("recording_1", "entry_0000000000", &doc)?;
//! let entries = load_entries(store.as_ref(), "recording_1")?;
//! ```

pub mod file_store;
pub mod memory_store;
pub mod store_trait;

pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use store_trait::{append_entry, load_entries, EntryStore};

#[cfg(test)]
pub use store_trait::MockEntryStore;

use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{Result, ResultExt};

/// Build the entry store described by `config`
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn EntryStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory entry store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::File => {
            let dir = config.resolve_data_dir()?;
            tracing::info!("Using file entry store at {:?}", dir);
            let store = FileStore::open(&dir)
                .with_context(|| format!("Failed to open store at {}", dir.display()))?;
            Ok(Arc::new(store))
        }
    }
}
