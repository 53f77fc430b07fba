//! Error taxonomy for tracker operations.
//!
//! Every failure an operation can report is one of the variants below. The
//! command layer wraps them in `anyhow` context; the binary walks the chain
//! back to the `TrackerError` to choose an exit code and a JSON error code.

use crate::output::{ErrorCode, ExitCode};
use thiserror::Error;

/// Failures surfaced by the codec, repository and dependency engine.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The id does not resolve to a stored record.
    #[error("Issue not found: {id}")]
    NotFound { id: String },

    /// An out-of-domain field value, empty title, self-dependency, etc.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Record bytes do not decode into a valid issue.
    #[error("Failed to parse record{}: {reason}", .source_name.as_deref().map(|s| format!(" {}", s)).unwrap_or_default())]
    Parse {
        /// File name or other label for the offending buffer
        source_name: Option<String>,
        reason: String,
    },

    /// A dependency traversal revisited an id on its current path.
    #[error("Dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// A partial id matched more than one stored record.
    #[error("Ambiguous issue id '{prefix}' matches: {}", .matches.join(", "))]
    AmbiguousId {
        prefix: String,
        matches: Vec<String>,
    },

    /// A record file already exists for a freshly generated id.
    #[error("Issue already exists: {id}")]
    AlreadyExists { id: String },
}

impl TrackerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        TrackerError::Validation(msg.into())
    }

    pub fn parse(reason: impl Into<String>) -> Self {
        TrackerError::Parse {
            source_name: None,
            reason: reason.into(),
        }
    }

    /// Attach the file name (or other label) of the buffer that failed to decode.
    pub fn with_source_name(self, name: impl Into<String>) -> Self {
        match self {
            TrackerError::Parse { reason, .. } => TrackerError::Parse {
                source_name: Some(name.into()),
                reason,
            },
            other => other,
        }
    }

    /// Stable machine-readable code used in `--json` error output.
    pub fn code(&self) -> &'static str {
        match self {
            TrackerError::NotFound { .. } => ErrorCode::ISSUE_NOT_FOUND,
            TrackerError::Validation(_) => ErrorCode::VALIDATION_FAILED,
            TrackerError::Parse { .. } => ErrorCode::PARSE_ERROR,
            TrackerError::Cycle { .. } => ErrorCode::CYCLE_DETECTED,
            TrackerError::AmbiguousId { .. } => ErrorCode::INVALID_ARGUMENT,
            TrackerError::AlreadyExists { .. } => ErrorCode::ALREADY_EXISTS,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ErrorCode::to_exit_code(self.code())
    }

    /// Remediation hints shown alongside the error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            TrackerError::NotFound { .. } => vec![
                "Run 'mb list' to see available issues".to_string(),
                "Check if the issue ID is correct".to_string(),
            ],
            TrackerError::Cycle { .. } => vec![
                "Remove one of the dependencies on the cycle with 'mb dep rm'".to_string(),
                "Inspect the graph with 'mb dep tree <id>'".to_string(),
            ],
            TrackerError::AmbiguousId { .. } => {
                vec!["Use a longer prefix or the full issue ID".to_string()]
            }
            TrackerError::Parse { .. } => vec![
                "The record file may have been edited by hand or left with conflict markers"
                    .to_string(),
            ],
            _ => Vec::new(),
        }
    }
}

/// Find the first `TrackerError` in an `anyhow` error chain.
pub fn find_tracker_error(error: &anyhow::Error) -> Option<&TrackerError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<TrackerError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_codes_follow_taxonomy() {
        assert_eq!(
            TrackerError::NotFound { id: "bd-1".into() }.exit_code(),
            ExitCode::NotFound
        );
        assert_eq!(
            TrackerError::validation("empty title").exit_code(),
            ExitCode::ValidationFailed
        );
        assert_eq!(
            TrackerError::Cycle {
                path: vec!["a".into(), "b".into(), "a".into()]
            }
            .exit_code(),
            ExitCode::ValidationFailed
        );
        assert_eq!(
            TrackerError::AmbiguousId {
                prefix: "bd".into(),
                matches: vec![]
            }
            .exit_code(),
            ExitCode::InvalidArgument
        );
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let err = TrackerError::Cycle {
            path: vec!["bd-a".into(), "bd-b".into(), "bd-a".into()],
        };
        assert_eq!(
            err.to_string(),
            "Dependency cycle detected: bd-a -> bd-b -> bd-a"
        );
    }

    #[test]
    fn test_parse_error_names_source() {
        let err = TrackerError::parse("missing field `title`").with_source_name("bd-1.json");
        assert_eq!(
            err.to_string(),
            "Failed to parse record bd-1.json: missing field `title`"
        );
    }

    #[test]
    fn test_find_tracker_error_through_context() {
        let result: anyhow::Result<()> = Err(TrackerError::NotFound { id: "x".into() })
            .context("Failed to show issue");
        let err = result.unwrap_err();
        assert!(matches!(
            find_tracker_error(&err),
            Some(TrackerError::NotFound { .. })
        ));
    }
}
