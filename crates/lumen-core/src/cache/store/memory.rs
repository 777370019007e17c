//! In-process blob store for tests and embedding.

use super::traits::BlobStore;
use crate::error::{LumenError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Blob store holding objects in a map.
///
/// Can simulate an outage and slow reads, and counts downloads and uploads.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, String>>,
    unavailable: AtomicBool,
    read_delay: Option<Duration>,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every download by `delay`.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Make every operation fail until set back to true.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(LumenError::CacheUnavailable {
                message: "memory blob store marked unavailable".into(),
            })
        } else {
            Ok(())
        }
    }

    fn objects(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.objects.lock().map_err(|e| LumenError::CacheUnavailable {
            message: format!("blob map poisoned: {}", e),
        })
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn check_connection(&self) -> Result<()> {
        self.ensure_available()
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.objects()?.contains_key(path))
    }

    async fn download_text(&self, path: &str) -> Result<Option<String>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        self.ensure_available()?;
        Ok(self.objects()?.get(path).cloned())
    }

    async fn upload_text(&self, path: &str, content: &str) -> Result<()> {
        self.ensure_available()?;
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.objects()?.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.ensure_available()?;
        Ok(self
            .objects()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
