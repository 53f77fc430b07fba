//! Storage abstraction layer for issue records.
//!
//! This module defines the `IssueStore` trait that abstracts record
//! persistence, so the repository and command layers run unchanged against
//! the on-disk store or the in-memory one used by tests.

use crate::domain::Issue;
use crate::errors::TrackerError;
use anyhow::Result;
use std::path::Path;

pub mod cache;
pub mod json;
pub mod memory;

pub use json::JsonFileStorage;
pub use memory::InMemoryStorage;

/// Trait for storage backends that persist issue records.
///
/// Every record is addressed independently; no operation spans more than
/// one record. Implementations must be `Clone` to support shared access
/// patterns.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use microbeads::domain::Issue;
/// use microbeads::storage::{InMemoryStorage, IssueStore};
///
/// let storage = InMemoryStorage::new();
/// storage.init().unwrap();
///
/// let issue = Issue::new("bd-1234", "Fix bug", Utc::now());
/// storage.insert_new(&issue).unwrap();
///
/// let loaded = storage.load_issue("bd-1234").unwrap();
/// assert_eq!(loaded.title, "Fix bug");
/// ```
pub trait IssueStore: Clone {
    /// Initialize the storage backend (idempotent).
    fn init(&self) -> Result<()>;

    /// Root directory of the store; configuration lives here.
    fn root(&self) -> &Path;

    /// Persist a record under an id that must not be taken yet.
    ///
    /// # Errors
    ///
    /// `TrackerError::AlreadyExists` if a record with this id is present;
    /// nothing is overwritten.
    fn insert_new(&self, issue: &Issue) -> Result<()>;

    /// Replace an existing record in full.
    ///
    /// # Errors
    ///
    /// `TrackerError::NotFound` if no record with this id exists.
    fn save_issue(&self, issue: &Issue) -> Result<()>;

    /// Load a record by exact id.
    ///
    /// # Errors
    ///
    /// `TrackerError::NotFound` for an unknown id, `TrackerError::Parse` if
    /// the stored bytes do not decode.
    fn load_issue(&self, id: &str) -> Result<Issue>;

    fn exists(&self, id: &str) -> bool;

    /// All stored ids, sorted.
    fn list_ids(&self) -> Result<Vec<String>>;

    /// All records that decode. Undecodable records are skipped with a
    /// warning so one bad file does not hide the rest of the store.
    fn list_issues(&self) -> Result<Vec<Issue>>;

    /// Resolve a full or partial issue id to the stored id.
    ///
    /// An exact match wins; otherwise the input must match exactly one
    /// stored id by prefix or substring.
    fn resolve_issue_id(&self, partial_id: &str) -> Result<String> {
        let ids = self.list_ids()?;
        Ok(resolve_partial_id(&ids, partial_id)?)
    }
}

/// Match `partial` against `ids`: exact, then unique prefix, then unique substring.
pub fn resolve_partial_id(ids: &[String], partial: &str) -> Result<String, TrackerError> {
    let partial = partial.trim();
    if partial.is_empty() {
        return Err(TrackerError::validation("Issue id cannot be empty"));
    }
    if let Some(exact) = ids.iter().find(|id| id.as_str() == partial) {
        return Ok(exact.clone());
    }

    let by_prefix: Vec<&String> = ids.iter().filter(|id| id.starts_with(partial)).collect();
    let candidates = if by_prefix.is_empty() {
        ids.iter().filter(|id| id.contains(partial)).collect()
    } else {
        by_prefix
    };

    match candidates.as_slice() {
        [] => Err(TrackerError::NotFound {
            id: partial.to_string(),
        }),
        [only] => Ok((*only).clone()),
        many => Err(TrackerError::AmbiguousId {
            prefix: partial.to_string(),
            matches: many.iter().map(|id| id.to_string()).collect(),
        }),
    }
}
