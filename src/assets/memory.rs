//! In-memory asset store.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use super::{Asset, AssetError, AssetStore, AssetWriter, LocatableAssetStore};

/// Map-backed store; clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetStore {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct MemoryWriter {
    key: String,
    buf: Vec<u8>,
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AssetWriter for MemoryWriter {
    fn close(self: Box<Self>) -> Result<(), AssetError> {
        let MemoryWriter { key, buf, entries } = *self;
        entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, buf);
        Ok(())
    }

    fn close_new(self: Box<Self>) -> Result<(), AssetError> {
        let MemoryWriter { key, buf, entries } = *self;
        let mut entries = entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.contains_key(&key) {
            return Err(AssetError::AlreadyExists(key));
        }
        entries.insert(key, buf);
        Ok(())
    }
}

impl AssetStore for MemoryAssetStore {
    fn writer(&self, asset: &Asset) -> Result<Box<dyn AssetWriter>, AssetError> {
        Ok(Box::new(MemoryWriter {
            key: asset.key()?,
            buf: Vec::new(),
            entries: Arc::clone(&self.entries),
        }))
    }

    fn reader(&self, asset: &Asset) -> Result<Box<dyn Read + Send>, AssetError> {
        let key = asset.key()?;
        match self.lock().get(&key) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(AssetError::NotFound(key)),
        }
    }

    fn exists(&self, asset: &Asset) -> Result<bool, AssetError> {
        let key = asset.key()?;
        Ok(self.lock().contains_key(&key))
    }
}

impl LocatableAssetStore for MemoryAssetStore {
    fn url(&self, asset: &Asset) -> Result<String, AssetError> {
        Ok(format!("memory:///{}", asset.key()?))
    }
}
