//! File-based TTL cache for fetched web content

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex digest of a string.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One cached fetch, stored as a JSON file named by the URL digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub content: String,
    pub content_hash: String,
    pub http_status: u16,
    /// Unix seconds at store time.
    pub cached_at: i64,
}

/// Content-addressed file cache keyed by URL digest.
///
/// Eviction is lazy: expired entries are unlinked when read. There is no
/// background sweep, so disk usage is only bounded by `clear`.
pub struct ContentCache {
    dir: PathBuf,
    ttl: Duration,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, ttl })
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        self.dir.join(format!("{:x}.json", hasher.finalize()))
    }

    /// Return the cached entry for `url`, or None when absent, expired or
    /// unreadable. Expired and corrupt entries are removed.
    pub fn get(&self, url: &str) -> Option<CacheEntry> {
        let path = self.entry_path(url);
        let contents = fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&contents) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Dropping corrupt cache entry");
                remove_quietly(&path);
                return None;
            }
        };

        let age = Utc::now().timestamp().saturating_sub(entry.cached_at);
        if age > self.ttl.as_secs() as i64 {
            tracing::debug!(url = %url, age_seconds = age, "Cache entry expired");
            remove_quietly(&path);
            return None;
        }

        tracing::debug!(url = %url, "Cache hit");
        Some(entry)
    }

    /// Store content for `url`, overwriting any previous entry. Returns the
    /// content digest.
    pub fn put(&self, url: &str, content: &str, http_status: u16) -> std::io::Result<String> {
        let hash = content_hash(content);
        let entry = CacheEntry {
            url: url.to_string(),
            content: content.to_string(),
            content_hash: hash.clone(),
            http_status,
            cached_at: Utc::now().timestamp(),
        };
        let path = self.entry_path(url);
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&path, json)?;
        tracing::debug!(url = %url, content_hash = %hash, "Cached content");
        Ok(hash)
    }

    /// Remove every cache file. Returns the number removed.
    pub fn clear(&self) -> std::io::Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(entry.path())?;
                count += 1;
            }
        }
        Ok(count)
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }
}
