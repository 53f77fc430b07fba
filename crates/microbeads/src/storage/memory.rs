//! In-memory storage implementation for testing.
//!
//! Records are kept as canonical bytes, so the codec runs on every load and
//! save just as it does against files.

use crate::codec;
use crate::domain::Issue;
use crate::errors::TrackerError;
use crate::storage::IssueStore;
use anyhow::Result;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// In-memory storage backend.
///
/// Uses `Rc<RefCell<>>` for shared interior mutability - clones share the same data.
#[derive(Clone)]
pub struct InMemoryStorage {
    records: Rc<RefCell<BTreeMap<String, Vec<u8>>>>,
    root: PathBuf,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            records: Rc::new(RefCell::new(BTreeMap::new())),
            root: std::env::temp_dir().join("microbeads-memory"),
        }
    }

    /// Store raw bytes under an id, bypassing the codec.
    pub fn put_raw(&self, id: &str, bytes: impl Into<Vec<u8>>) {
        self.records
            .borrow_mut()
            .insert(id.to_string(), bytes.into());
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl IssueStore for InMemoryStorage {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn insert_new(&self, issue: &Issue) -> Result<()> {
        let bytes = codec::encode(issue)?;
        let mut records = self.records.borrow_mut();
        if records.contains_key(&issue.id) {
            return Err(TrackerError::AlreadyExists {
                id: issue.id.clone(),
            }
            .into());
        }
        records.insert(issue.id.clone(), bytes);
        Ok(())
    }

    fn save_issue(&self, issue: &Issue) -> Result<()> {
        let bytes = codec::encode(issue)?;
        let mut records = self.records.borrow_mut();
        match records.get_mut(&issue.id) {
            Some(slot) => {
                *slot = bytes;
                Ok(())
            }
            None => Err(TrackerError::NotFound {
                id: issue.id.clone(),
            }
            .into()),
        }
    }

    fn load_issue(&self, id: &str) -> Result<Issue> {
        let records = self.records.borrow();
        let bytes = records
            .get(id)
            .ok_or_else(|| TrackerError::NotFound { id: id.to_string() })?;
        Ok(codec::decode(bytes).map_err(|e| e.with_source_name(id))?)
    }

    fn exists(&self, id: &str) -> bool {
        self.records.borrow().contains_key(id)
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self.records.borrow().keys().cloned().collect())
    }

    fn list_issues(&self) -> Result<Vec<Issue>> {
        Ok(self
            .records
            .borrow()
            .iter()
            .filter_map(|(id, bytes)| match codec::decode(bytes) {
                Ok(issue) => Some(issue),
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "skipping unreadable record");
                    None
                }
            })
            .collect())
    }
}
