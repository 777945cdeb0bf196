//! One-file-per-entry store.
//!
//! Each entry is a JSON document holding the value plus RFC 3339
//! `createdAt` / `expiresAt` timestamps. Filenames are the URL-safe base64
//! of the key's UTF-8 bytes plus a configurable extension, so arbitrary
//! keys map to safe filenames.
//!
//! The store is not transactional. A crash between directory creation and
//! file write leaves at worst an empty directory; a crash mid-write leaves
//! a corrupt file, which the next `get` deletes and reports as absent.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, warn};

use super::Store;
use crate::entry::{Entry, PersistedEntry};
use crate::error::{CacheError, CacheResult};

const DEFAULT_EXTENSION: &str = "cache";

/// Stores each entry as `<base64url(key)>.<extension>` under one directory.
///
/// The directory is created lazily on the first write.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    extension: String,
}

impl FileStore {
    /// Creates a store rooted at `dir` with the default `.cache` extension.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStore::with_extension(dir, DEFAULT_EXTENSION)
    }

    /// Creates a store rooted at `dir` with a custom extension (leading dot
    /// optional).
    pub fn with_extension(dir: impl Into<PathBuf>, extension: impl AsRef<str>) -> Self {
        FileStore {
            dir: dir.into(),
            extension: extension.as_ref().trim_start_matches('.').to_string(),
        }
    }

    /// Directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        let encoded = URL_SAFE_NO_PAD.encode(key.as_bytes());
        self.dir.join(format!("{encoded}.{}", self.extension))
    }

    fn key_of(&self, path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != self.extension {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = URL_SAFE_NO_PAD.decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }

    async fn ensure_dir(&self) -> CacheResult<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn heal_corrupt(&self, path: &Path, detail: &str) {
        warn!(path = %path.display(), detail, "deleting corrupt cache file");
        if let Err(err) = fs::remove_file(path).await {
            warn!(path = %path.display(), %err, "failed to delete corrupt cache file");
        }
    }
}

#[async_trait]
impl<V> Store<V> for FileStore
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn put(&self, key: &str, entry: Entry<V>) -> CacheResult<()> {
        self.ensure_dir().await?;
        let persisted = PersistedEntry::from_entry(&entry);
        let json = serde_json::to_string(&persisted).map_err(|err| CacheError::StoreIo {
            detail: err.to_string(),
        })?;
        fs::write(self.file_path(key), json).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Entry<V>>> {
        let path = self.file_path(key);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str::<PersistedEntry<V>>(&json) {
            Ok(persisted) => Ok(Some(persisted.into_entry())),
            Err(err) => {
                self.heal_corrupt(&path, &err.to_string()).await;
                Ok(None)
            }
        }
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut keys = Vec::new();
        while let Some(dirent) = dir.next_entry().await? {
            match self.key_of(&dirent.path()) {
                Some(key) => keys.push(key),
                None => debug!(path = %dirent.path().display(), "skipping foreign file"),
            }
        }
        Ok(keys)
    }

    async fn contains_key(&self, key: &str) -> CacheResult<bool> {
        match fs::metadata(self.file_path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        while let Some(dirent) = dir.next_entry().await? {
            let path = dirent.path();
            if self.key_of(&path).is_some() {
                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }

    async fn len(&self) -> CacheResult<u64> {
        let keys = <Self as Store<V>>::keys(self).await?;
        Ok(keys.len() as u64)
    }

    async fn close(&self) -> CacheResult<()> {
        Ok(())
    }
}
