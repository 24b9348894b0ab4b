//! EntryStore trait for a unified storage interface
//!
//! This module provides the common trait for every durable store the
//! recorders write to, enabling both the file-backed store used by
//! applications and the in-memory store used by tests and demos.
//!
//! # Contract
//!
//! A store is a set of named namespaces, each an ordered map from string key
//! to an opaque JSON document. Keys produced by the recorders are
//! [`crate::types::entry_key`] values, so ordering by key is ordering by
//! insertion. Stores are not required to support concurrent writers to the
//! same namespace; the recorders guarantee a single writer per namespace.
//!
//! Implementations must not keep a handle open between calls: every method
//! acquires whatever resource it needs and releases it before returning.

use crate::error::{RecorderError, Result};
use crate::types::{entry_key, StoredEntry};
use serde_json::Value;

/// A durable, ordered key/value store split into namespaces
#[cfg_attr(test, mockall::automock)]
pub trait EntryStore: Send + Sync {
    /// Create an empty namespace (no-op if it already exists)
    fn create(&self, namespace: &str) -> Result<()>;

    /// Append a document under `key`, creating the namespace if needed
    fn append(&self, namespace: &str, key: &str, document: &Value) -> Result<()>;

    /// Number of documents in a namespace (0 if it does not exist)
    fn count(&self, namespace: &str) -> Result<u64>;

    /// All documents in a namespace, ordered by key
    fn get_all(&self, namespace: &str) -> Result<Vec<(String, Value)>>;

    /// Remove a single document, returning whether it existed
    fn remove(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Delete a namespace and everything in it
    fn delete(&self, namespace: &str) -> Result<()>;

    /// Remove every document from a namespace but keep the namespace
    fn clear(&self, namespace: &str) -> Result<()>;

    /// Names of all namespaces currently present
    fn namespaces(&self) -> Result<Vec<String>>;

    /// Check whether a namespace exists
    fn exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces()?.iter().any(|ns| ns == namespace))
    }
}

/// Append an entry under the next free entry key
pub fn append_entry(store: &dyn EntryStore, namespace: &str, entry: &StoredEntry) -> Result<u64> {
    let index = store.count(namespace)?;
    store.append(namespace, &entry_key(index), &entry.to_document()?)?;
    Ok(index)
}

/// Load every entry of a namespace in key order
pub fn load_entries(store: &dyn EntryStore, namespace: &str) -> Result<Vec<StoredEntry>> {
    store
        .get_all(namespace)?
        .into_iter()
        .map(|(key, document)| {
            StoredEntry::from_document(document).map_err(|e| {
                RecorderError::Storage(format!("Malformed entry {} in {}: {}", key, namespace, e))
            })
        })
        .collect()
}

/// Validate a namespace name before it is used as a path component
pub(crate) fn validate_namespace(namespace: &str) -> Result<()> {
    let valid = !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(RecorderError::InvalidArgument(format!(
            "Invalid namespace name '{}'",
            namespace
        )))
    }
}
