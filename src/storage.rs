//! Blob storage for uploaded diagrams and parse artifacts.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::error::NetdocError;

/// Object storage addressed by slash-separated keys.
///
/// Implementations report outages as [`NetdocError::StorageUnavailable`] (or `Io`) so the
/// caller retries them, and a missing key as [`NetdocError::NotFound`], which is permanent.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, NetdocError>;
    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<(), NetdocError>;
}

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsBlobStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` below the root. Keys may not escape it.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, NetdocError> {
        let relative = Path::new(key.trim_start_matches('/'));
        if key.trim().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(NetdocError::InvalidRequest(format!(
                "blob key {key:?} is not a relative path"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, NetdocError> {
        let path = self.path_for(key)?;
        tracing::debug!("Fetching blob {key} from {:?}", path);
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => NetdocError::NotFound(key.to_string()),
            _ => NetdocError::StorageUnavailable(format!("{key}: {e}")),
        })
    }

    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<(), NetdocError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // write-then-rename so readers never observe a partial artifact
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tracing::debug!("Stored {} byte(s) at {:?}", bytes.len(), path);
        Ok(())
    }
}

/// In-process blob store with failure injection, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    failing_fetches: Mutex<u32>,
    failing_stores: Mutex<u32>,
    fetches: AtomicUsize,
    stores: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.write().insert(key.into(), bytes);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.blobs.read().keys().cloned().collect()
    }

    /// Make the next `n` fetches fail with [`NetdocError::StorageUnavailable`].
    pub fn fail_next_fetches(&self, n: u32) {
        *self.failing_fetches.lock() = n;
    }

    /// Make the next `n` stores fail with [`NetdocError::StorageUnavailable`].
    pub fn fail_next_stores(&self, n: u32) {
        *self.failing_stores.lock() = n;
    }

    /// Number of fetch calls so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &Mutex<u32>) -> bool {
        let mut remaining = counter.lock();
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, NetdocError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_fetches) {
            return Err(NetdocError::StorageUnavailable(format!(
                "injected fetch failure for {key}"
            )));
        }
        self.get(key)
            .ok_or_else(|| NetdocError::NotFound(key.to_string()))
    }

    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<(), NetdocError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_stores) {
            return Err(NetdocError::StorageUnavailable(format!(
                "injected store failure for {key}"
            )));
        }
        self.insert(key, bytes);
        Ok(())
    }
}
