//! File-backed storage shared by every process on the terminal.
//!
//! All items live in one JSON object at `<dir>/storage.json`. Writes go to a
//! temporary file that is renamed over the original, so readers never see a
//! half-written map.

use crate::backend::{StorageBackend, StorageEvent, StorageEvents};
use errors::StorageError;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const STORAGE_FILE: &str = "storage.json";
const EVENT_CAPACITY: usize = 64;

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    write_lock: Mutex<()>,
    /// Raw file contents last written or observed by this instance.
    last_seen: Mutex<Option<String>>,
    events: broadcast::Sender<StorageEvent>,
}

impl Inner {
    fn read_raw(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match self.read_raw()? {
            None => Ok(BTreeMap::new()),
            Some(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| StorageError::Serialization {
                reason: format!("{}: {e}", self.path.display()),
            }),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let raw = serde_json::to_string_pretty(map).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &raw)?;
        *self.last_seen.lock() = Some(raw);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Called from the watcher thread. Emits only when the file differs from
    /// what this instance last wrote or saw.
    fn on_fs_event(&self, event: &notify::Event) {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return;
        }

        let file_name = self.path.file_name();
        if !event.paths.iter().any(|p| p.file_name() == file_name) {
            return;
        }

        let current = match self.read_raw() {
            Ok(current) => current,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to re-read storage file");
                return;
            }
        };

        {
            let mut last_seen = self.last_seen.lock();
            if *last_seen == current {
                return;
            }
            last_seen.clone_from(&current);
        }

        debug!(path = %self.path.display(), "Storage file changed externally");
        let _ = self.events.send(StorageEvent::unknown());
    }
}

/// JSON-file storage backend with change notifications via `notify`.
pub struct FileStorage {
    inner: Arc<Inner>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("path", &self.inner.path)
            .field("watching", &self.watcher.lock().is_some())
            .finish()
    }
}

impl FileStorage {
    /// Open (or create) the store in `dir`.
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(STORAGE_FILE);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = Arc::new(Inner {
            path,
            write_lock: Mutex::new(()),
            last_seen: Mutex::new(None),
            events,
        });
        let initial = inner.read_raw()?;
        *inner.last_seen.lock() = initial;

        Ok(Self {
            inner,
            watcher: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn start_watcher(&self) -> Result<(), notify::Error> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => inner.on_fs_event(&event),
                Err(e) => warn!("Storage watch error: {}", e),
            }
        })?;

        let dir = self.inner.path.parent().unwrap_or_else(|| Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!("Watching storage file: {:?}", self.inner.path);

        *slot = Some(watcher);
        Ok(())
    }
}

impl StorageBackend for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.inner.read_map()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.inner.write_lock.lock();
        let mut map = self.inner.read_map()?;
        if map.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        map.insert(key.to_string(), value.to_string());
        self.inner.write_map(&map)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.inner.write_lock.lock();
        let mut map = self.inner.read_map()?;
        if map.remove(key).is_none() {
            return Ok(());
        }
        self.inner.write_map(&map)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.inner.read_map()?.into_keys().collect())
    }

    fn subscribe(&self) -> Option<StorageEvents> {
        if let Err(e) = self.start_watcher() {
            warn!(
                path = %self.inner.path.display(),
                error = %e,
                "Storage change notifications unavailable"
            );
            return None;
        }
        Some(StorageEvents::new(self.inner.events.subscribe(), None))
    }
}
