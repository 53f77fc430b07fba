//! Short, collision-checked issue identifiers.
//!
//! Identifiers look like `bd-3f9a0c21`: a store-wide prefix, a dash, and a
//! fixed-length lowercase hex suffix drawn from a random source.

use crate::errors::TrackerError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use uuid::Uuid;

pub const DEFAULT_PREFIX: &str = "bd";
pub const DEFAULT_SUFFIX_LEN: usize = 8;
pub const MIN_SUFFIX_LEN: usize = 4;
pub const MAX_SUFFIX_LEN: usize = 16;

/// Attempts before giving up on finding an unused id.
const MAX_ATTEMPTS: usize = 64;

static PREFIX_REGEX: OnceLock<Regex> = OnceLock::new();

fn prefix_regex() -> &'static Regex {
    PREFIX_REGEX.get_or_init(|| Regex::new(r"^[a-z][a-z0-9]{0,7}$").expect("Prefix regex should compile"))
}

/// Source of random hex characters for id suffixes.
pub trait SuffixSource {
    /// Return at least `len` lowercase hex characters.
    fn hex(&mut self, len: usize) -> String;
}

/// Random suffixes from v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSource;

impl SuffixSource for UuidSource {
    fn hex(&mut self, len: usize) -> String {
        let mut out = String::with_capacity(len);
        while out.len() < len {
            out.push_str(&Uuid::new_v4().simple().to_string());
        }
        out.truncate(len);
        out
    }
}

/// Produces identifiers that are not yet in use.
pub struct IdGenerator {
    prefix: String,
    suffix_len: usize,
    source: Box<dyn SuffixSource>,
}

impl IdGenerator {
    pub fn new(prefix: &str, suffix_len: usize) -> Result<Self, TrackerError> {
        Self::with_source(prefix, suffix_len, Box::new(UuidSource))
    }

    pub fn with_source(
        prefix: &str,
        suffix_len: usize,
        source: Box<dyn SuffixSource>,
    ) -> Result<Self, TrackerError> {
        validate_prefix(prefix)?;
        if !(MIN_SUFFIX_LEN..=MAX_SUFFIX_LEN).contains(&suffix_len) {
            return Err(TrackerError::validation(format!(
                "Id length must be between {} and {}, got {}",
                MIN_SUFFIX_LEN, MAX_SUFFIX_LEN, suffix_len
            )));
        }
        Ok(Self {
            prefix: prefix.to_string(),
            suffix_len,
            source,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Generate an id not present in `existing`, retrying on collision.
    pub fn next_id(&mut self, existing: &HashSet<String>) -> Result<String, TrackerError> {
        for attempt in 0..MAX_ATTEMPTS {
            let candidate = format!("{}-{}", self.prefix, self.source.hex(self.suffix_len));
            if !existing.contains(&candidate) {
                return Ok(candidate);
            }
            tracing::debug!(%candidate, attempt, "generated id collides, retrying");
        }
        Err(TrackerError::validation(format!(
            "Could not find an unused id after {} attempts; increase [ids] length",
            MAX_ATTEMPTS
        )))
    }
}

pub fn validate_prefix(prefix: &str) -> Result<(), TrackerError> {
    if prefix_regex().is_match(prefix) {
        Ok(())
    } else {
        Err(TrackerError::validation(format!(
            "Invalid id prefix '{}'. Expected 1-8 lowercase letters or digits, starting with a letter",
            prefix
        )))
    }
}

/// Derive an id prefix from a directory name.
///
/// `my-project` -> `mp`, `microbeads` -> `mi`, `foo_bar_baz` -> `fbb`.
pub fn derive_prefix(name: &str) -> String {
    let name = name.to_lowercase();
    let parts: Vec<&str> = name
        .split(['-', '_', '.'])
        .filter(|part| !part.is_empty())
        .collect();

    let candidate: String = if parts.len() > 1 {
        parts.iter().take(4).filter_map(|p| p.chars().next()).collect()
    } else {
        name.chars().take(2).collect()
    };

    if validate_prefix(&candidate).is_ok() {
        candidate
    } else {
        DEFAULT_PREFIX.to_string()
    }
}
