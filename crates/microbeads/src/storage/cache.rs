//! Read-through cache for full record scans.
//!
//! The cache file holds every decoded record plus a fingerprint of the
//! record directory. Any write renames a new file into place, which changes
//! the fingerprint, so a stale cache is simply ignored and rebuilt.

use crate::domain::Issue;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;

pub const CACHE_FILE: &str = "cache.json";

#[derive(Serialize, Deserialize)]
struct CacheFile {
    fingerprint: String,
    issues: Vec<Issue>,
}

#[derive(Debug, Clone)]
pub struct RecordCache {
    path: PathBuf,
}

impl RecordCache {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(CACHE_FILE),
        }
    }

    /// SHA-256 over the name, size and modification time of every record file.
    pub fn fingerprint(&self, issues_dir: &Path) -> Result<String> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(issues_dir)
            .with_context(|| format!("Failed to read {}", issues_dir.display()))?
        {
            let entry = entry.context("Failed to read directory entry")?;
            let meta = entry
                .metadata()
                .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            entries.push((entry.file_name(), meta.len(), mtime));
        }
        entries.sort();

        let mut hasher = Sha256::new();
        for (name, len, mtime) in &entries {
            hasher.update(name.to_string_lossy().as_bytes());
            hasher.update([0]);
            hasher.update(len.to_le_bytes());
            hasher.update(mtime.to_le_bytes());
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Cached records, if the cache exists and matches `fingerprint`.
    pub fn load(&self, fingerprint: &str) -> Option<Vec<Issue>> {
        let bytes = fs::read(&self.path).ok()?;
        let cached: CacheFile = serde_json::from_slice(&bytes).ok()?;
        (cached.fingerprint == fingerprint).then_some(cached.issues)
    }

    pub fn store(&self, fingerprint: &str, issues: &[Issue]) -> Result<()> {
        let cached = CacheFile {
            fingerprint: fingerprint.to_string(),
            issues: issues.to_vec(),
        };
        let bytes = serde_json::to_vec(&cached).context("Failed to serialize record cache")?;

        let dir = self
            .path
            .parent()
            .context("Cache path has no parent directory")?;
        let mut temp = NamedTempFile::new_in(dir).context("Failed to create cache temp file")?;
        temp.write_all(&bytes)
            .context("Failed to write cache temp file")?;
        temp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to persist {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_tracks_directory_changes() {
        let temp = TempDir::new().unwrap();
        let cache = RecordCache::new(temp.path());
        let dir = temp.path().join("issues");
        fs::create_dir_all(&dir).unwrap();

        let empty = cache.fingerprint(&dir).unwrap();
        assert_eq!(empty, cache.fingerprint(&dir).unwrap());

        fs::write(dir.join("bd-1.json"), "{}").unwrap();
        let one = cache.fingerprint(&dir).unwrap();
        assert_ne!(empty, one);

        fs::write(dir.join("bd-1.json"), "{ }").unwrap();
        assert_ne!(one, cache.fingerprint(&dir).unwrap());
    }

    #[test]
    fn test_load_requires_matching_fingerprint() {
        let temp = TempDir::new().unwrap();
        let cache = RecordCache::new(temp.path());
        let issues = vec![Issue::new("bd-1", "Cached", Utc::now())];

        assert!(cache.load("abc").is_none());
        cache.store("abc", &issues).unwrap();
        assert_eq!(cache.load("abc").unwrap(), issues);
        assert!(cache.load("def").is_none());
    }

    #[test]
    fn test_corrupt_cache_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let cache = RecordCache::new(temp.path());
        fs::write(temp.path().join(CACHE_FILE), "not json").unwrap();
        assert!(cache.load("abc").is_none());
    }
}
