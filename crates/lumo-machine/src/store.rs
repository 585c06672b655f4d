//! JSON-file-backed key-value stores.
//!
//! Used for agent memory and saved pipelines. Not versioned: the file is
//! loaded fully at startup and rewritten on every mutation, last-write-wins.
//! Stores are injected into whoever needs them; there are no globals.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::MachineResult;
use crate::pipeline::Pipeline;

/// A JSON-file-backed string-to-value map.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, Value>>,
}

impl JsonStore {
    /// Open a store, loading existing contents if the file exists.
    pub fn open(path: impl AsRef<Path>) -> MachineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let entries: HashMap<String, Value> = serde_json::from_str(&content)?;
            info!(path = %path.display(), keys = entries.len(), "store_loaded");
            entries
        } else {
            debug!(path = %path.display(), "store_new");
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().expect("store lock").get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) -> MachineResult<()> {
        let mut entries = self.entries.lock().expect("store lock");
        entries.insert(key.into(), value);
        self.persist(&entries)
    }

    pub fn remove(&self, key: &str) -> MachineResult<Option<Value>> {
        let mut entries = self.entries.lock().expect("store lock");
        let removed = entries.remove(key);
        if removed.is_some() {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .expect("store lock")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the full map atomically: temp file, then rename.
    fn persist(&self, entries: &HashMap<String, Value>) -> MachineResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Agent memory: free-form key-value facts the agent persists across runs.
#[derive(Debug)]
pub struct MemoryStore {
    store: JsonStore,
}

impl MemoryStore {
    pub fn open(path: impl AsRef<Path>) -> MachineResult<Self> {
        Ok(Self {
            store: JsonStore::open(path)?,
        })
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(key)
    }

    pub fn set(&self, key: impl Into<String>, value: Value) -> MachineResult<()> {
        self.store.set(key, value)
    }

    pub fn remove(&self, key: &str) -> MachineResult<Option<Value>> {
        self.store.remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }
}

/// Saved pipelines, keyed by name.
#[derive(Debug)]
pub struct PipelineStore {
    store: JsonStore,
}

impl PipelineStore {
    pub fn open(path: impl AsRef<Path>) -> MachineResult<Self> {
        Ok(Self {
            store: JsonStore::open(path)?,
        })
    }

    pub fn save(&self, pipeline: &Pipeline) -> MachineResult<()> {
        let value = serde_json::to_value(pipeline)?;
        self.store.set(pipeline.name.clone(), value)
    }

    pub fn load(&self, name: &str) -> Option<Pipeline> {
        let value = self.store.get(name)?;
        match serde_json::from_value(value) {
            Ok(pipeline) => Some(pipeline),
            Err(e) => {
                warn!(name, error = %e, "pipeline_store_corrupt_entry");
                None
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.store.keys()
    }
}
