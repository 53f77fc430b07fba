//! JSON file-based storage implementation.
//!
//! Each issue is one canonical JSON file under `issues/`. There is no index
//! file: the directory listing is the record set. Writes go to a temporary
//! file in the same directory and are renamed into place, so a concurrent
//! reader sees the old record or the new one, never a torn write.

use crate::codec;
use crate::domain::Issue;
use crate::errors::TrackerError;
use crate::storage::cache::RecordCache;
use crate::storage::IssueStore;
use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub const ISSUES_DIR: &str = "issues";
const RECORD_EXTENSION: &str = "json";

/// File-per-record storage rooted at the store directory.
#[derive(Clone)]
pub struct JsonFileStorage {
    root: PathBuf,
    cache: Option<RecordCache>,
}

impl JsonFileStorage {
    /// Create a new JSON file storage instance at the given root path
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cache: None,
        }
    }

    /// Serve full scans through the read-through cache file.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(|| RecordCache::new(&self.root));
        self
    }

    pub fn issues_dir(&self) -> PathBuf {
        self.root.join(ISSUES_DIR)
    }

    fn issue_path(&self, id: &str) -> PathBuf {
        self.issues_dir()
            .join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    /// Check that the store has been initialized.
    pub fn validate(&self) -> Result<()> {
        if !self.issues_dir().is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "No issue store found at {}. Run 'mb init' first",
                    self.root.display()
                ),
            )
            .into());
        }
        Ok(())
    }

    /// Write canonical bytes into a temp file next to `path`.
    fn stage(&self, issue: &Issue) -> Result<NamedTempFile> {
        let bytes = codec::encode(issue)?;
        let mut temp = NamedTempFile::new_in(self.issues_dir())
            .context("Failed to create temporary record file")?;
        temp.write_all(&bytes)
            .context("Failed to write temporary record file")?;
        temp.as_file()
            .sync_all()
            .context("Failed to flush temporary record file")?;
        Ok(temp)
    }

    fn read_record(&self, id: &str, path: &Path) -> Result<Issue> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TrackerError::NotFound { id: id.to_string() }.into())
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.to_string());
        Ok(codec::decode(&bytes).map_err(|e| e.with_source_name(file_name))?)
    }

    fn scan(&self) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        for id in self.list_ids()? {
            match self.read_record(&id, &self.issue_path(&id)) {
                Ok(issue) if issue.id == id => issues.push(issue),
                Ok(issue) => {
                    warn!(file = %id, found = %issue.id, "record id does not match file name, skipping");
                }
                Err(e) => warn!(file = %id, error = %e, "skipping unreadable record"),
            }
        }
        Ok(issues)
    }
}

impl IssueStore for JsonFileStorage {
    fn init(&self) -> Result<()> {
        fs::create_dir_all(self.issues_dir()).context("Failed to create issues directory")?;
        Ok(())
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn insert_new(&self, issue: &Issue) -> Result<()> {
        let path = self.issue_path(&issue.id);
        let temp = self.stage(issue)?;
        temp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                anyhow::Error::from(TrackerError::AlreadyExists {
                    id: issue.id.clone(),
                })
            } else {
                anyhow::Error::from(e.error)
                    .context(format!("Failed to create {}", path.display()))
            }
        })?;
        debug!(id = %issue.id, "created record");
        Ok(())
    }

    fn save_issue(&self, issue: &Issue) -> Result<()> {
        let path = self.issue_path(&issue.id);
        if !path.is_file() {
            return Err(TrackerError::NotFound {
                id: issue.id.clone(),
            }
            .into());
        }
        let temp = self.stage(issue)?;
        temp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        debug!(id = %issue.id, "saved record");
        Ok(())
    }

    fn load_issue(&self, id: &str) -> Result<Issue> {
        self.read_record(id, &self.issue_path(id))
    }

    fn exists(&self, id: &str) -> bool {
        self.issue_path(id).is_file()
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        let dir = self.issues_dir();
        let entries = fs::read_dir(&dir)
            .with_context(|| format!("Failed to read {}", dir.display()))?;

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.context("Failed to read directory entry")?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn list_issues(&self) -> Result<Vec<Issue>> {
        let Some(cache) = &self.cache else {
            return self.scan();
        };

        let fingerprint = cache.fingerprint(&self.issues_dir())?;
        if let Some(issues) = cache.load(&fingerprint) {
            debug!("record cache hit");
            return Ok(issues);
        }

        let issues = self.scan()?;
        if let Err(e) = cache.store(&fingerprint, &issues) {
            warn!(error = %e, "failed to write record cache");
        }
        Ok(issues)
    }
}
