//! Preview/persistence store: the in-memory preview and its durable copy.
//!
//! The durable side is a single key-value slot. Writes are whole-value
//! overwrites with no versioning or expiry. Storage failures never reach
//! the in-memory preview: it is updated first, and the failure is logged
//! and handed back to the caller to display.

use crate::error::LensError;
use crate::media::{PreviewEncoding, RawImage};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Durable string key-value storage.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, LensError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), LensError>;
    fn remove(&mut self, key: &str) -> Result<(), LensError>;
}

/// A JSON object on disk, rewritten atomically on every change.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<String>, LensError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LensError::Storage(format!(
                "cannot read '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, LensError> {
        match self.read()? {
            Some(text) if !text.trim().is_empty() => serde_json::from_str(&text).map_err(|e| {
                LensError::Storage(format!("'{}' is corrupt: {}", self.path.display(), e))
            }),
            _ => Ok(BTreeMap::new()),
        }
    }

    /// Entries to rewrite on the next save, and whether the file on disk was
    /// corrupt. A corrupt file is replaced rather than blocking every later
    /// write.
    fn load_for_write(&self) -> Result<(BTreeMap<String, String>, bool), LensError> {
        match self.read()? {
            Some(text) if !text.trim().is_empty() => match serde_json::from_str(&text) {
                Ok(entries) => Ok((entries, false)),
                Err(e) => {
                    warn!("Overwriting corrupt store '{}': {}", self.path.display(), e);
                    Ok((BTreeMap::new(), true))
                }
            },
            _ => Ok((BTreeMap::new(), false)),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), LensError> {
        let io_err =
            |e: std::io::Error| LensError::Storage(format!("cannot write '{}': {}", self.path.display(), e));

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| LensError::Storage(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, LensError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LensError> {
        let (mut entries, _) = self.load_for_write()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&mut self, key: &str) -> Result<(), LensError> {
        let (mut entries, corrupt) = self.load_for_write()?;
        if entries.remove(key).is_some() || corrupt {
            self.save(&entries)?;
        }
        Ok(())
    }
}

/// In-memory storage. Clones share the same slots, so a clone handed to a
/// second [`PreviewStore`] behaves like the same page being reloaded.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse writes whose value exceeds `bytes`, like a full browser quota.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::default()
        }
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, LensError> {
        self.entries
            .lock()
            .map_err(|_| LensError::Storage("memory store poisoned".into()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, LensError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LensError> {
        if let Some(quota) = self.quota {
            if value.len() > quota {
                return Err(LensError::Storage(format!(
                    "quota exceeded: {} bytes > {} bytes",
                    value.len(),
                    quota
                )));
            }
        }
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), LensError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Holds the current preview and mirrors it into one storage slot.
pub struct PreviewStore {
    storage: Box<dyn KeyValueStore>,
    key: String,
    preview: Option<PreviewEncoding>,
}

impl PreviewStore {
    pub fn new(storage: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            preview: None,
        }
    }

    pub fn preview(&self) -> Option<&PreviewEncoding> {
        self.preview.as_ref()
    }

    /// Replace the preview with one derived from `raw` and persist it.
    ///
    /// The in-memory preview is updated even when persisting fails. The slot
    /// is then emptied, so a reload shows nothing rather than an older image.
    pub fn set_image(&mut self, raw: &RawImage) -> Result<(), LensError> {
        let encoded = PreviewEncoding::from_raw(raw);
        debug!("Preview for {} → {} chars", raw.filename, encoded.as_str().len());

        let result = self.storage.set(&self.key, encoded.as_str());
        self.preview = Some(encoded);

        if let Err(ref e) = result {
            warn!("Could not persist preview: {}", e);
            if let Err(e) = self.storage.remove(&self.key) {
                warn!("Could not drop previous persisted preview: {}", e);
            }
        }
        result
    }

    /// Drop the preview from memory and from storage.
    pub fn clear(&mut self) -> Result<(), LensError> {
        self.preview = None;
        let result = self.storage.remove(&self.key);
        if let Err(ref e) = result {
            warn!("Could not remove persisted preview: {}", e);
        }
        result
    }

    /// Load the persisted preview, if any. Returns whether one was restored.
    ///
    /// Values that are not base64 data URIs are ignored.
    pub fn restore_on_init(&mut self) -> Result<bool, LensError> {
        let stored = match self.storage.get(&self.key) {
            Ok(v) => v,
            Err(e) => {
                warn!("Could not read persisted preview: {}", e);
                return Err(e);
            }
        };

        let Some(value) = stored else {
            return Ok(false);
        };

        match PreviewEncoding::parse(value) {
            Some(preview) => {
                info!("Restored persisted preview ({})", preview.mime());
                self.preview = Some(preview);
                Ok(true)
            }
            None => {
                warn!("Ignoring persisted value under '{}': not a data URI", self.key);
                Ok(false)
            }
        }
    }
}
