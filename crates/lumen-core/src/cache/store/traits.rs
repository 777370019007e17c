//! Blob store trait.

use crate::error::Result;
use async_trait::async_trait;

/// Durable text-object storage addressed by slash-separated paths.
///
/// Only the result cache talks to a blob store. Implementations report
/// failures as errors; the cache decides how to absorb them.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Probe the backend once, at cache startup.
    async fn check_connection(&self) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Download an object as text. `None` if it does not exist.
    async fn download_text(&self, path: &str) -> Result<Option<String>>;

    /// Create or overwrite an object.
    async fn upload_text(&self, path: &str, content: &str) -> Result<()>;

    /// Paths of all objects starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
