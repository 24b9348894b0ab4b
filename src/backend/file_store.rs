//! File-backed entry store
//!
//! Each namespace is a JSON-lines file `<root>/<namespace>.jsonl`; every line
//! holds one `{ "key": ..., "doc": ... }` record. Appends are plain file
//! appends, so a save that fails half way leaves the already written entries
//! in place. A later line with the same key replaces an earlier one.
//!
//! Every operation opens and closes its own file handle.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::store_trait::{validate_namespace, EntryStore};
use crate::error::{RecorderError, Result, ResultExt};

/// Extension of namespace files
pub const NAMESPACE_FILE_EXTENSION: &str = "jsonl";

#[derive(Debug, Serialize, Deserialize)]
struct Line {
    key: String,
    doc: Value,
}

/// Entry store writing JSON-lines files under a root directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { root: root.into() };
        store.ensure_root()?;
        tracing::debug!("File store opened at {:?}", store.root);
        Ok(store)
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            RecorderError::Storage(format!(
                "Failed to create store directory {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    fn path_for(&self, namespace: &str) -> Result<PathBuf> {
        validate_namespace(namespace)?;
        Ok(self
            .root
            .join(format!("{}.{}", namespace, NAMESPACE_FILE_EXTENSION)))
    }

    fn read_lines(&self, namespace: &str) -> Result<BTreeMap<String, Value>> {
        let path = self.path_for(namespace)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to open {}", path.display())),
        };

        let mut docs = BTreeMap::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Line = serde_json::from_str(&line).map_err(|e| {
                RecorderError::Storage(format!(
                    "{} line {}: {}",
                    path.display(),
                    number + 1,
                    e
                ))
            })?;
            docs.insert(record.key, record.doc);
        }
        Ok(docs)
    }

    fn write_lines(&self, namespace: &str, docs: &BTreeMap<String, Value>) -> Result<()> {
        let path = self.path_for(namespace)?;
        let mut file =
            File::create(&path).with_context(|| format!("Failed to rewrite {}", path.display()))?;
        for (key, doc) in docs {
            let line = serde_json::to_string(&Line {
                key: key.clone(),
                doc: doc.clone(),
            })?;
            writeln!(file, "{}", line)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }
}

impl EntryStore for FileStore {
    fn create(&self, namespace: &str) -> Result<()> {
        self.ensure_root()?;
        let path = self.path_for(namespace)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(())
    }

    fn append(&self, namespace: &str, key: &str, document: &Value) -> Result<()> {
        self.ensure_root()?;
        let path = self.path_for(namespace)?;
        let line = serde_json::to_string(&Line {
            key: key.to_string(),
            doc: document.clone(),
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        writeln!(file, "{}", line).with_context(|| format!("Failed to append to {}", path.display()))
    }

    fn count(&self, namespace: &str) -> Result<u64> {
        Ok(self.read_lines(namespace)?.len() as u64)
    }

    fn get_all(&self, namespace: &str) -> Result<Vec<(String, Value)>> {
        Ok(self.read_lines(namespace)?.into_iter().collect())
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut docs = self.read_lines(namespace)?;
        if docs.remove(key).is_none() {
            return Ok(false);
        }
        self.write_lines(namespace, &docs)?;
        Ok(true)
    }

    fn delete(&self, namespace: &str) -> Result<()> {
        let path = self.path_for(namespace)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }

    fn clear(&self, namespace: &str) -> Result<()> {
        if self.exists(namespace)? {
            self.write_lines(namespace, &BTreeMap::new())?;
        }
        Ok(())
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", self.root.display()))
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.context("Failed to list store directory")?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(NAMESPACE_FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.path_for(namespace)?.is_file())
    }
}
