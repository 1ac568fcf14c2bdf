// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key/value backends for persisted client state.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Synchronous string key/value storage.
///
/// Multi-key writes apply all entries or none.
pub trait TokenStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set_many(&self, entries: &[(&str, &str)]) -> anyhow::Result<()>;
    fn remove_many(&self, keys: &[&str]) -> anyhow::Result<()>;

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.remove_many(&[key])
    }
}

/// In-process storage. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> anyhow::Result<()> {
        let mut values = self.values.lock();
        for (key, value) in entries {
            values.insert((*key).to_owned(), (*value).to_owned());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> anyhow::Result<()> {
        let mut values = self.values.lock();
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

/// JSON-file storage. Every mutation rewrites the whole file, and memory
/// only changes once the write has landed.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`.
    ///
    /// A missing file starts empty; an unreadable or corrupt file is an error.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values: Mutex::new(values) })
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        save_atomic(&self.path, values)
    }
}

impl TokenStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> anyhow::Result<()> {
        let mut values = self.values.lock();
        let mut next = values.clone();
        for (key, value) in entries {
            next.insert((*key).to_owned(), (*value).to_owned());
        }
        self.flush(&next)?;
        *values = next;
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> anyhow::Result<()> {
        let mut values = self.values.lock();
        let mut next = values.clone();
        let before = next.len();
        next.retain(|key, _| !keys.contains(&key.as_str()));
        if next.len() == before {
            return Ok(());
        }
        self.flush(&next)?;
        *values = next;
        Ok(())
    }
}

/// Write `values` as JSON to `path` atomically (write tmp + rename).
///
/// The temp name carries the PID and a counter so two writers never share
/// a temp file.
fn save_atomic(path: &Path, values: &BTreeMap<String, String>) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(values)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
