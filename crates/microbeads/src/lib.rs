//! Microbeads issue tracker library
//!
//! One JSON file per issue, a dependency engine answering "what is ready"
//! and "what is blocked", and a field-level merge resolver that lets
//! concurrent branches edit the same issue without textual conflicts.
//! The `mb` binary is a thin layer over [`CommandExecutor`].

pub mod cli;
pub mod codec;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod graph;
pub mod id_gen;
pub mod merge;
pub mod output;
pub mod repository;
pub mod storage;
pub mod telemetry;

// Re-export commonly used types
pub use commands::CommandExecutor;
pub use config::TrackerConfig;
pub use domain::{Issue, IssueType, NewIssue, Priority, Status};
pub use errors::TrackerError;
pub use merge::{merge, merge_bytes, MergeFallback};
pub use output::{ExitCode, JsonError, JsonOutput};
pub use storage::{InMemoryStorage, IssueStore, JsonFileStorage};
