#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RemindoError;
use crate::task::model::Task;

pub const TASKS_KEY: &str = "tasks";
pub const THEME_KEY: &str = "theme";

/// Durable string key-value slots.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<String>, RemindoError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), RemindoError>;
    fn remove(&mut self, key: &str) -> Result<(), RemindoError>;
}

/// One JSON file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf, RemindoError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, RemindoError> {
        let path = self.slot_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RemindoError::IoPath { path, source }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), RemindoError> {
        let path = self.slot_path(key)?;
        std::fs::create_dir_all(&self.dir).map_err(|source| RemindoError::IoPath {
            path: self.dir.clone(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value.as_bytes()).map_err(|source| RemindoError::IoPath {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| RemindoError::IoPath { path, source })
    }

    fn remove(&mut self, key: &str) -> Result<(), RemindoError> {
        let path = self.slot_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RemindoError::IoPath { path, source }),
        }
    }
}

/// In-process slots. `reject_writes` simulates a full or read-only medium.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    slots: HashMap<String, String>,
    pub reject_writes: bool,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_slot(mut self, key: &str, value: &str) -> Self {
        self.slots.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, RemindoError> {
        Ok(self.slots.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), RemindoError> {
        if self.reject_writes {
            return Err(RemindoError::StorageFull);
        }
        self.slots.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), RemindoError> {
        if self.reject_writes {
            return Err(RemindoError::StorageFull);
        }
        self.slots.remove(key);
        Ok(())
    }
}

/// Best-effort persistence of the task list.
///
/// Reads never fail: a missing slot is an empty list and unreadable or
/// malformed content resets to empty. Writes log and swallow failures; the
/// in-memory list stays authoritative for the session.
#[derive(Debug)]
pub struct TaskStorage<K> {
    kv: K,
}

impl<K: KvStore> TaskStorage<K> {
    #[must_use]
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    #[must_use]
    pub fn kv(&self) -> &K {
        &self.kv
    }

    #[must_use]
    pub fn load(&self) -> Vec<Task> {
        let raw = match self.kv.get(TASKS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "cannot read task list, starting empty");
                return Vec::new();
            }
        };
        let mut tasks: Vec<Task> = match serde_json::from_str(&raw) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "malformed task list, starting empty");
                return Vec::new();
            }
        };
        let mut seen = HashSet::new();
        tasks.retain_mut(|task| {
            if task.repair() {
                debug!(task_id = %task.id, "repaired stored task");
            }
            if task.text.is_empty() {
                debug!(task_id = %task.id, "dropped stored task with empty text");
                return false;
            }
            if !seen.insert(task.id.clone()) {
                debug!(task_id = %task.id, "dropped stored task with duplicate id");
                return false;
            }
            true
        });
        tasks
    }

    /// Returns whether the write reached durable storage.
    pub fn save(&mut self, tasks: &[Task]) -> bool {
        let data = match serde_json::to_string(tasks) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "cannot serialize task list");
                return false;
            }
        };
        match self.kv.set(TASKS_KEY, &data) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "cannot persist task list");
                false
            }
        }
    }

    #[must_use]
    pub fn load_theme(&self) -> Option<Theme> {
        let raw = self.kv.get(THEME_KEY).ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn save_theme(&mut self, theme: Theme) -> Result<(), RemindoError> {
        let data = serde_json::to_string(&theme)
            .map_err(|e| RemindoError::Other(format!("cannot serialize theme: {e}")))?;
        self.kv.set(THEME_KEY, &data)
    }

    pub fn reset_theme(&mut self) -> Result<(), RemindoError> {
        self.kv.remove(THEME_KEY)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

fn validate_key(key: &str) -> Result<(), RemindoError> {
    if key.trim().is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key.contains("..")
    {
        return Err(RemindoError::InvalidKey(key.to_owned()));
    }
    Ok(())
}
