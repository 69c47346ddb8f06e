//! Directory-backed asset store.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Asset, AssetError, AssetStore, AssetWriter, LocatableAssetStore};

/// Stores each asset as a file under `root/<key>`.
///
/// Writes go to a hidden temp file next to the destination and are renamed
/// into place on close, so readers never see partial content.
#[derive(Debug, Clone)]
pub struct FilesystemAssetStore {
    root: PathBuf,
}

impl FilesystemAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, asset: &Asset) -> Result<(String, PathBuf), AssetError> {
        let key = asset.key()?;
        let path = self.root.join(&key);
        Ok((key, path))
    }
}

struct FileWriter {
    key: String,
    file: Option<BufWriter<File>>,
    temp_path: PathBuf,
    dest: PathBuf,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "writer closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl FileWriter {
    fn finish(&mut self) -> Result<(), AssetError> {
        if let Some(file) = self.file.take() {
            let file = file
                .into_inner()
                .map_err(|e| AssetError::io(&self.key, e.into_error()))?;
            file.sync_all().map_err(|e| AssetError::io(&self.key, e))?;
        }
        Ok(())
    }
}

impl AssetWriter for FileWriter {
    fn close(mut self: Box<Self>) -> Result<(), AssetError> {
        let finished = self.finish();
        let result = finished.and_then(|()| {
            fs::rename(&self.temp_path, &self.dest).map_err(|e| AssetError::io(&self.key, e))
        });
        if result.is_err() {
            let _ = fs::remove_file(&self.temp_path);
        }
        result?;
        debug!(key = %self.key, "asset written");
        Ok(())
    }

    fn close_new(mut self: Box<Self>) -> Result<(), AssetError> {
        let finished = self.finish();
        // hard_link refuses an existing destination, unlike rename
        let linked = finished.and_then(|()| match fs::hard_link(&self.temp_path, &self.dest) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(AssetError::AlreadyExists(self.key.clone()))
            }
            Err(e) => Err(AssetError::io(&self.key, e)),
        });
        let _ = fs::remove_file(&self.temp_path);
        linked?;
        debug!(key = %self.key, "asset created");
        Ok(())
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

impl AssetStore for FilesystemAssetStore {
    fn writer(&self, asset: &Asset) -> Result<Box<dyn AssetWriter>, AssetError> {
        let (key, dest) = self.path_for(asset)?;
        let parent = dest
            .parent()
            .ok_or_else(|| AssetError::InvalidKey(key.clone()))?;
        fs::create_dir_all(parent).map_err(|e| AssetError::io(&key, e))?;
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = parent.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));
        let file = File::create(&temp_path).map_err(|e| AssetError::io(&key, e))?;
        Ok(Box::new(FileWriter {
            key,
            file: Some(BufWriter::new(file)),
            temp_path,
            dest,
        }))
    }

    fn reader(&self, asset: &Asset) -> Result<Box<dyn Read + Send>, AssetError> {
        let (key, path) = self.path_for(asset)?;
        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(AssetError::NotFound(key)),
            Err(e) => Err(AssetError::io(&key, e)),
        }
    }

    fn exists(&self, asset: &Asset) -> Result<bool, AssetError> {
        let (_, path) = self.path_for(asset)?;
        Ok(path.is_file())
    }
}

impl LocatableAssetStore for FilesystemAssetStore {
    fn url(&self, asset: &Asset) -> Result<String, AssetError> {
        let key = asset.key()?;
        Ok(format!(
            "file://{}/{}",
            self.root.display().to_string().trim_end_matches('/'),
            key
        ))
    }
}
