//! Storage backends for cached visibility data and registration results
//!
//! ## Table of Contents
//! - **ByteStore**: Trait for opaque key/value backends
//! - **MemoryStore**: In-memory store (tests, single-process use)
//! - **FileStore**: One file per key under a root directory
//! - **encode / decode**: bincode payload codec
//! - **keys**: Key builders

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{GeoRefError, Result};

/// Trait for byte storage backends
pub trait ByteStore: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a value
    fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete a key (absent keys are not an error)
    fn delete(&self, key: &str) -> Result<()>;

    /// List keys with a prefix
    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Store name for logging
    fn name(&self) -> &str;
}

/// Serialize a value into the opaque payload format
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| GeoRefError::storage(format!("encode failed: {}", e)))
}

/// Deserialize a payload stored under `key`
pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| GeoRefError::CacheCorruption {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Get and decode a value from the store
pub fn store_get<T: DeserializeOwned>(store: &dyn ByteStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => decode(key, &bytes).map(Some),
        None => Ok(None),
    }
}

/// Encode and set a value in the store
pub fn store_set<T: Serialize>(store: &dyn ByteStore, key: &str, value: &T) -> Result<()> {
    store.set(key, encode(value)?)
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ByteStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .data
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// File-based persistent storage.
///
/// Each key is one file directly under the root directory. File names are
/// the key with every byte outside `[A-Za-z0-9._-]` escaped as `%XX`.
pub struct FileStore {
    root: PathBuf,
}

const FILE_EXTENSION: &str = "bin";

impl FileStore {
    /// Open or create a file store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .map_err(|e| GeoRefError::storage(format!("Failed to create {}: {}", root.display(), e)))?;
        info!(path = %root.display(), "File store opened");
        Ok(Self { root })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", escape_key(key), FILE_EXTENSION))
    }
}

impl ByteStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GeoRefError::storage(format!("Failed to read {}: {}", key, e))),
        }
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key);
        // Entries become visible only once fully written
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &value)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| GeoRefError::storage(format!("Failed to write {}: {}", key, e)))?;
        debug!(key, bytes = value.len(), "File store entry written");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GeoRefError::storage(format!("Failed to delete {}: {}", key, e))),
        }
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| GeoRefError::storage(format!("Failed to list {}: {}", self.root.display(), e)))?;
        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).and_then(unescape_key) else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &str {
        "file"
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn unescape_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Type alias for a shared store
pub type SharedStore = Arc<dyn ByteStore>;

/// Key prefixes for different data types
pub mod keys {
    /// Visible-set key prefix
    pub const VISIBLE: &str = "georef/visible";
    /// Projection results key prefix
    pub const PROJECTIONS: &str = "georef/projections";

    /// Build the visible-set key of a photograph
    pub fn visible_set(photo_id: &str) -> String {
        format!("{}/{}", VISIBLE, photo_id)
    }

    /// Build the projection-results key of a photograph against one catalog
    pub fn projections(photo_id: &str, catalog_id: &str) -> String {
        format!("{}/{}/{}", PROJECTIONS, photo_id, catalog_id)
    }
}
