//! Entry point for the version-control merge driver.
//!
//! Register with:
//!
//! ```text
//! # .gitattributes
//! .microbeads/issues/*.json merge=microbeads
//!
//! # .git/config
//! [merge "microbeads"]
//!     name = microbeads record merge
//!     driver = mb merge-driver %O %A %B
//! ```

use crate::merge::{merge_bytes, MergeFallback};
use anyhow::{Context, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Result of one driver invocation.
#[derive(Debug)]
pub enum MergeOutcome {
    /// The merged record was written over `ours`.
    Merged,
    /// The resolver declined; `ours` was left untouched.
    Fallback(MergeFallback),
}

/// Merge the three files and write the result over `ours`.
///
/// A missing `base` file means both sides added the record.
pub fn run_merge_driver(base: &Path, ours: &Path, theirs: &Path) -> Result<MergeOutcome> {
    let base_bytes = match fs::read(base) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read base {}", base.display()))
        }
    };
    let ours_bytes =
        fs::read(ours).with_context(|| format!("Failed to read ours {}", ours.display()))?;
    let theirs_bytes =
        fs::read(theirs).with_context(|| format!("Failed to read theirs {}", theirs.display()))?;

    let merged = match merge_bytes(base_bytes.as_deref(), &ours_bytes, &theirs_bytes) {
        Ok(merged) => merged,
        Err(fallback) => {
            warn!(path = %ours.display(), "merge fallback: {}", fallback);
            return Ok(MergeOutcome::Fallback(fallback));
        }
    };

    write_atomic(ours, &merged)?;
    info!(path = %ours.display(), "merged record");
    Ok(MergeOutcome::Merged)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .context("Failed to write merged record")?;
    tmp.as_file()
        .sync_all()
        .context("Failed to sync merged record")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
