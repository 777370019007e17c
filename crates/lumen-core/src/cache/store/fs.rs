//! Filesystem blob store.
//!
//! Objects map to files below a root directory. Writes go to a temp file
//! followed by a rename, so readers never observe a partial object.

use super::traits::BlobStore;
use crate::error::{LumenError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(LumenError::validation(
                "path",
                format!("object path '{}' must be relative and stay below the root", path),
            ));
        }
        Ok(self.root.join(relative))
    }
}

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[async_trait]
impl BlobStore for FsBlobStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn check_connection(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| LumenError::CacheUnavailable {
                message: format!("cannot create {}: {}", self.root.display(), e),
            })?;
        let meta = fs::metadata(&self.root)
            .await
            .map_err(|e| LumenError::io_with_path(e, &self.root))?;
        if meta.permissions().readonly() {
            return Err(LumenError::CacheUnavailable {
                message: format!("{} is read-only", self.root.display()),
            });
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        fs::try_exists(&full)
            .await
            .map_err(|e| LumenError::io_with_path(e, full))
    }

    async fn download_text(&self, path: &str) -> Result<Option<String>> {
        let full = self.resolve(path)?;
        match fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LumenError::io_with_path(e, full)),
        }
    }

    async fn upload_text(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LumenError::io_with_path(e, parent))?;
        }

        // Unique per write: tasks sharing a thread interleave at await points.
        let seq = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let temp = full.with_extension(format!("{}.{}.tmp", std::process::id(), seq));
        fs::write(&temp, content)
            .await
            .map_err(|e| LumenError::io_with_path(e, &temp))?;
        if let Err(e) = fs::rename(&temp, &full).await {
            let _ = fs::remove_file(&temp).await;
            return Err(LumenError::io_with_path(e, full));
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let (dir, name_prefix) = match prefix.rfind('/') {
            Some(idx) => (&prefix[..idx], &prefix[idx + 1..]),
            None => ("", prefix),
        };
        let dir_path = if dir.is_empty() {
            self.root.clone()
        } else {
            self.resolve(dir)?
        };

        let mut entries = match fs::read_dir(&dir_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LumenError::io_with_path(e, dir_path)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LumenError::io_with_path(e, &dir_path))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !name.starts_with(name_prefix) || name.ends_with(".tmp") {
                continue;
            }
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                paths.push(if dir.is_empty() {
                    name
                } else {
                    format!("{}/{}", dir, name)
                });
            }
        }
        paths.sort();
        Ok(paths)
    }
}
