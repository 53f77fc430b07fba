//! Command execution logic for all CLI operations.
//!
//! The `CommandExecutor` handles the business logic behind each subcommand
//! and returns plain data; rendering is left to the binary.
//!
//! This module is organized into submodules by functional area:
//! - `issue`: Issue CRUD operations and lifecycle management
//! - `dependency`: Dependency edges and the dependency tree
//! - `query`: Ready/blocked queries
//! - `merge_driver`: Entry point for the version-control merge driver
//! - `import`: Bringing issues over from the beads CLI

mod dependency;
pub mod import;
mod issue;
pub mod merge_driver;
mod query;

pub use dependency::DependencyChange;
pub use import::ImportSummary;
pub use issue::IssueUpdate;
pub use query::BlockedIssue;

use crate::config::TrackerConfig;
use crate::domain::Issue;
use crate::graph::DependencyGraph;
use crate::id_gen::{derive_prefix, validate_prefix, IdGenerator};
use crate::repository::{Clock, IssueRepository, SystemClock};
use crate::storage::IssueStore;
use anyhow::{Context, Result};
use tracing::info;

/// Executes CLI commands with business logic and validation.
///
/// Generic over storage backend so the same logic runs against files or
/// the in-memory store.
pub struct CommandExecutor<S: IssueStore> {
    repo: IssueRepository<S>,
    config: TrackerConfig,
}

impl<S: IssueStore> CommandExecutor<S> {
    /// Create an executor using the wall clock and random identifiers.
    pub fn new(storage: S, config: TrackerConfig) -> Result<Self> {
        Self::with_clock(storage, config, Box::new(SystemClock))
    }

    pub fn with_clock(storage: S, config: TrackerConfig, clock: Box<dyn Clock>) -> Result<Self> {
        let ids = IdGenerator::new(&config.id_prefix(), config.id_length())
            .context("Invalid [ids] section in config.toml")?;
        Ok(Self::with_parts(storage, config, ids, clock))
    }

    /// Assemble an executor from explicit parts; used by tests that script ids.
    pub fn with_parts(
        storage: S,
        config: TrackerConfig,
        ids: IdGenerator,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            repo: IssueRepository::new(storage, ids, clock),
            config,
        }
    }

    pub fn storage(&self) -> &S {
        self.repo.store()
    }

    pub fn repository(&self) -> &IssueRepository<S> {
        &self.repo
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Create the store layout and a default config (idempotent).
    ///
    /// Without an explicit prefix one is derived from the name of the
    /// directory containing the store. Returns the prefix in effect.
    pub fn init(&self, prefix: Option<&str>) -> Result<String> {
        let storage = self.storage();
        storage.init()?;

        let prefix = match prefix {
            Some(prefix) => {
                validate_prefix(prefix)?;
                prefix.to_string()
            }
            None => {
                let dir_name = storage
                    .root()
                    .canonicalize()
                    .ok()
                    .and_then(|root| {
                        root.parent()
                            .and_then(|p| p.file_name())
                            .map(|n| n.to_string_lossy().into_owned())
                    })
                    .unwrap_or_default();
                derive_prefix(&dir_name)
            }
        };

        if TrackerConfig::with_prefix(&prefix).write_if_missing(storage.root())? {
            info!(%prefix, root = %storage.root().display(), "initialized store");
            Ok(prefix)
        } else {
            // An existing config keeps its own prefix
            Ok(TrackerConfig::load(storage.root())?.id_prefix())
        }
    }

    /// Load every readable record and run `f` against the dependency graph.
    fn with_graph<T>(&self, f: impl FnOnce(&DependencyGraph<'_, Issue>) -> Result<T>) -> Result<T> {
        let issues = self.repo.all()?;
        let refs: Vec<&Issue> = issues.iter().collect();
        let graph = DependencyGraph::new(&refs);
        f(&graph)
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use crate::id_gen::SuffixSource;
    use crate::repository::FixedClock;
    use crate::storage::InMemoryStorage;
    use chrono::{TimeZone, Utc};

    /// Sequential suffixes: 0001, 0002, ...
    pub struct Counter(pub u32);

    impl SuffixSource for Counter {
        fn hex(&mut self, len: usize) -> String {
            self.0 += 1;
            format!("{:0width$x}", self.0, width = len)
        }
    }

    pub fn setup() -> (CommandExecutor<InMemoryStorage>, FixedClock) {
        setup_with_config(TrackerConfig::default())
    }

    pub fn setup_with_config(config: TrackerConfig) -> (CommandExecutor<InMemoryStorage>, FixedClock) {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        let ids = IdGenerator::with_source("bd", 4, Box::new(Counter(0))).unwrap();
        let executor = CommandExecutor::with_parts(
            InMemoryStorage::new(),
            config,
            ids,
            Box::new(clock.clone()),
        );
        executor.storage().init().unwrap();
        (executor, clock)
    }
}
