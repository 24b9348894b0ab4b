//! In-memory entry store
//!
//! Keeps every namespace in a `BTreeMap` behind a mutex. Nothing survives
//! the process; use it for tests, demos and hosts that persist elsewhere.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::store_trait::{validate_namespace, EntryStore};
use crate::error::Result;

type Namespaces = BTreeMap<String, BTreeMap<String, Value>>;

/// Volatile entry store
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: Mutex<Namespaces>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Namespaces> {
        self.namespaces.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EntryStore for MemoryStore {
    fn create(&self, namespace: &str) -> Result<()> {
        validate_namespace(namespace)?;
        self.lock().entry(namespace.to_string()).or_default();
        Ok(())
    }

    fn append(&self, namespace: &str, key: &str, document: &Value) -> Result<()> {
        validate_namespace(namespace)?;
        self.lock()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), document.clone());
        Ok(())
    }

    fn count(&self, namespace: &str) -> Result<u64> {
        Ok(self
            .lock()
            .get(namespace)
            .map(|docs| docs.len() as u64)
            .unwrap_or(0))
    }

    fn get_all(&self, namespace: &str) -> Result<Vec<(String, Value)>> {
        Ok(self
            .lock()
            .get(namespace)
            .map(|docs| {
                docs.iter()
                    .map(|(key, doc)| (key.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self
            .lock()
            .get_mut(namespace)
            .map(|docs| docs.remove(key).is_some())
            .unwrap_or(false))
    }

    fn delete(&self, namespace: &str) -> Result<()> {
        self.lock().remove(namespace);
        Ok(())
    }

    fn clear(&self, namespace: &str) -> Result<()> {
        if let Some(docs) = self.lock().get_mut(namespace) {
            docs.clear();
        }
        Ok(())
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.lock().contains_key(namespace))
    }
}
