//! File-backed get-or-compute cache for serialized response bodies.
//!
//! Each key maps to `<dir>/<key>_cache.json`. Concurrent misses on the same
//! key are coalesced behind a per-key mutex, so only the first caller runs
//! the computation; the rest wait and read what it wrote. Artifacts are
//! written to a temporary file and renamed into place.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;

/// Key of the full traveler listing artifact.
pub const LISTING_KEY: &str = "static_travelers";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize cached value: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to compute cached value: {0}")]
    Compute(#[from] AppError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

impl CacheOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
        }
    }
}

pub struct ResponseCache {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: DashMap::new(),
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}_cache.json"))
    }

    pub async fn contains(&self, key: &str) -> bool {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .unwrap_or(false)
    }

    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        compute: F,
    ) -> Result<(CacheOutcome, Vec<u8>), CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, CacheError>>,
    {
        let path = self.path_for(key);
        if let Some(body) = read_if_present(&path).await? {
            debug!(key, "cache hit");
            return Ok((CacheOutcome::Hit, body));
        }

        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        // Another caller may have filled the entry while we waited.
        if let Some(body) = read_if_present(&path).await? {
            debug!(key, "cache hit after wait");
            return Ok((CacheOutcome::Hit, body));
        }

        let body = compute().await?;
        self.write_atomic(&path, &body).await?;
        info!(key, path = %path.display(), bytes = body.len(), "cache artifact written");

        Ok((CacheOutcome::Miss, body))
    }

    /// Removes the artifact for `key`. Returns whether one existed.
    pub async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => {
                info!(key, "cache artifact invalidated");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(CacheError::Io(err)),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_default().clone()
    }

    async fn write_atomic(&self, path: &Path, body: &[u8]) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = self
            .dir
            .join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        tokio::fs::write(&tmp, body).await?;
        if let Err(err) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::Io(err));
        }
        Ok(())
    }
}

async fn read_if_present(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
    match tokio::fs::read(path).await {
        Ok(body) => Ok(Some(body)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(CacheError::Io(err)),
    }
}
