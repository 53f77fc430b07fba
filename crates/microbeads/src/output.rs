//! Structured output formatting for CLI commands.
//!
//! Every command prints either human-readable text or, with `--json`, a
//! single envelope: `JsonOutput` on success, `JsonError` on failure. Both
//! carry the same `Metadata` block.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::io::{self, Write};

use crate::domain::{Issue, IssueType, Priority, Status};
use crate::errors::TrackerError;

/// Version of the JSON output format
const OUTPUT_VERSION: &str = "0.1.0";

// ============================================================================
// Output Context for Quiet Mode
// ============================================================================

/// Context for controlling output verbosity
pub struct OutputContext {
    quiet: bool,
    json: bool,
}

impl OutputContext {
    pub fn new(quiet: bool, json: bool) -> Self {
        Self { quiet, json }
    }

    /// Print essential output (always shown unless --json)
    pub fn print_data(&self, msg: impl Display) -> io::Result<()> {
        if !self.json {
            writeln_safe(&format!("{}", msg))
        } else {
            Ok(())
        }
    }

    /// Print success message (suppressed by --quiet or --json)
    pub fn print_success(&self, msg: impl Display) -> io::Result<()> {
        if !self.quiet && !self.json {
            writeln_safe(&format!("{}", msg))
        } else {
            Ok(())
        }
    }

    /// Print warning (suppressed by --quiet or --json)
    pub fn print_warning(&self, msg: impl Display) -> io::Result<()> {
        if !self.quiet && !self.json {
            writeln_safe_stderr(&format!("Warning: {}", msg))
        } else {
            Ok(())
        }
    }

    /// Print error (always shown to stderr)
    pub fn print_error(&self, msg: impl Display) -> io::Result<()> {
        writeln_safe_stderr(&format!("Error: {}", msg))
    }

    /// Print a JSON success envelope (only in --json mode)
    pub fn print_json<T: Serialize>(&self, data: T, command: &str) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data, command);
            writeln_safe(&output.to_json_string()?)?;
        }
        Ok(())
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn is_json(&self) -> bool {
        self.json
    }
}

/// Safe println that handles broken pipes gracefully
fn writeln_safe(msg: &str) -> io::Result<()> {
    match writeln!(io::stdout(), "{}", msg) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            // Expected when piping to head and the like
            std::process::exit(0);
        }
        Err(e) => Err(e),
    }
}

fn writeln_safe_stderr(msg: &str) -> io::Result<()> {
    match writeln!(io::stderr(), "{}", msg) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            std::process::exit(0);
        }
        Err(e) => Err(e),
    }
}

// ============================================================================
// JSON Output Types
// ============================================================================

/// Wrapper for successful command output with metadata
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub metadata: Metadata,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn success(data: T, command: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            metadata: Metadata::new(command),
        }
    }

    /// Serialize to JSON string with pretty formatting
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Wrapper for error output with suggestions
#[derive(Debug, Serialize)]
pub struct JsonError {
    pub success: bool,
    pub error: ErrorDetail,
    pub metadata: Metadata,
}

impl JsonError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
                suggestions: Vec::new(),
            },
            metadata: Metadata::new(command),
        }
    }

    /// Build the envelope for a tracker failure, with details and hints.
    pub fn from_tracker_error(err: &TrackerError, command: impl Into<String>) -> Self {
        let details = match err {
            TrackerError::NotFound { id } => Some(serde_json::json!({ "issue_id": id })),
            TrackerError::Cycle { path } => Some(serde_json::json!({ "cycle": path })),
            TrackerError::AmbiguousId { prefix, matches } => {
                Some(serde_json::json!({ "prefix": prefix, "matches": matches }))
            }
            TrackerError::AlreadyExists { id } => Some(serde_json::json!({ "issue_id": id })),
            TrackerError::Parse {
                source_name: Some(name),
                ..
            } => Some(serde_json::json!({ "source": name })),
            _ => None,
        };

        let mut error = Self::new(err.code(), err.to_string(), command)
            .with_suggestions(err.suggestions());
        if let Some(details) = details {
            error = error.with_details(details);
        }
        error
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.error.suggestions.extend(suggestions);
        self
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        ErrorCode::to_exit_code(&self.error.code)
    }
}

/// Error details including code, message, and suggestions
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code (e.g., "ISSUE_NOT_FOUND", "CYCLE_DETECTED")
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Suggested actions to resolve the error
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

// ============================================================================
// Exit Codes
// ============================================================================

/// Process exit codes for the `mb` binary
///
/// These codes follow Unix conventions and let scripts tell failure kinds
/// apart without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command succeeded (0)
    Success = 0,

    /// Generic error, including merge-driver fallback (1)
    GenericError = 1,

    /// Invalid arguments, usage error or ambiguous id (2)
    InvalidArgument = 2,

    /// Issue or store not found (3)
    NotFound = 3,

    /// Validation failed - bad field value, cycle detected (4)
    ValidationFailed = 4,

    /// Resource already exists (6)
    AlreadyExists = 6,

    /// File system failure (10)
    ExternalError = 10,
}

impl ExitCode {
    /// Convert exit code to i32 for `std::process::exit`
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Command succeeded",
            ExitCode::GenericError => "Generic error occurred",
            ExitCode::InvalidArgument => "Invalid arguments, usage error or ambiguous id",
            ExitCode::NotFound => "Issue or store not found",
            ExitCode::ValidationFailed => "Validation failed (bad value, dependency cycle)",
            ExitCode::AlreadyExists => "Resource already exists",
            ExitCode::ExternalError => "File system error",
        }
    }

    /// All exit codes as a formatted block for `--help`
    pub fn all_codes_documentation() -> String {
        [
            ExitCode::Success,
            ExitCode::GenericError,
            ExitCode::InvalidArgument,
            ExitCode::NotFound,
            ExitCode::ValidationFailed,
            ExitCode::AlreadyExists,
            ExitCode::ExternalError,
        ]
        .iter()
        .fold("Exit Codes:".to_string(), |mut doc, code| {
            doc.push_str(&format!("\n  {:<3}- {}", code.code(), code.description()));
            doc
        })
    }
}

// ============================================================================
// Error Codes (String constants for JSON responses)
// ============================================================================

/// Standard error codes for JSON error envelopes
pub struct ErrorCode;

impl ErrorCode {
    pub const ISSUE_NOT_FOUND: &'static str = "ISSUE_NOT_FOUND";
    pub const CYCLE_DETECTED: &'static str = "CYCLE_DETECTED";
    pub const INVALID_ARGUMENT: &'static str = "INVALID_ARGUMENT";
    pub const VALIDATION_FAILED: &'static str = "VALIDATION_FAILED";
    pub const ALREADY_EXISTS: &'static str = "ALREADY_EXISTS";
    pub const IO_ERROR: &'static str = "IO_ERROR";
    pub const PARSE_ERROR: &'static str = "PARSE_ERROR";
    pub const GENERIC_ERROR: &'static str = "ERROR";

    /// Map error code string to exit code
    pub fn to_exit_code(code: &str) -> ExitCode {
        match code {
            Self::ISSUE_NOT_FOUND => ExitCode::NotFound,
            Self::CYCLE_DETECTED | Self::VALIDATION_FAILED | Self::PARSE_ERROR => {
                ExitCode::ValidationFailed
            }
            Self::INVALID_ARGUMENT => ExitCode::InvalidArgument,
            Self::ALREADY_EXISTS => ExitCode::AlreadyExists,
            Self::IO_ERROR => ExitCode::ExternalError,
            _ => ExitCode::GenericError,
        }
    }
}

/// Metadata included in all responses
#[derive(Debug, Serialize)]
pub struct Metadata {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: chrono::DateTime<Utc>,
    /// Version of the output format
    pub version: String,
    /// Command that generated this response
    pub command: String,
}

impl Metadata {
    fn new(command: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            version: OUTPUT_VERSION.to_string(),
            command: command.into(),
        }
    }
}

fn serialize_timestamp<S>(dt: &chrono::DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&dt.to_rfc3339())
}

// ============================================================================
// Response Types
// ============================================================================

/// One line of a listing: the fields a human scans for.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct IssueSummary {
    pub id: String,
    pub title: String,
    pub status: Status,
    pub priority: Priority,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
}

impl From<&Issue> for IssueSummary {
    fn from(issue: &Issue) -> Self {
        Self {
            id: issue.id.clone(),
            title: issue.title.clone(),
            status: issue.status,
            priority: issue.priority,
            issue_type: issue.issue_type,
        }
    }
}

impl Display for IssueSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {} {}: {}",
            self.id, self.status, self.priority, self.issue_type, self.title
        )
    }
}

/// Response for `list` and `ready`
#[derive(Debug, Serialize, JsonSchema)]
pub struct IssueListResponse {
    pub issues: Vec<IssueSummary>,
    pub count: usize,
}

impl IssueListResponse {
    pub fn new(issues: Vec<IssueSummary>) -> Self {
        let count = issues.len();
        Self { issues, count }
    }
}

/// Issue held up by unfinished dependencies
#[derive(Debug, Serialize, JsonSchema)]
pub struct BlockedIssueSummary {
    #[serde(flatten)]
    pub issue: IssueSummary,
    /// Dependencies that exist and are not closed
    pub blocked_by: Vec<String>,
}

/// Response for `blocked`
#[derive(Debug, Serialize, JsonSchema)]
pub struct BlockedListResponse {
    pub issues: Vec<BlockedIssueSummary>,
    pub count: usize,
}

impl BlockedListResponse {
    pub fn new(issues: Vec<BlockedIssueSummary>) -> Self {
        let count = issues.len();
        Self { issues, count }
    }
}

/// Response for `show`: the full record plus reverse edges
#[derive(Debug, Serialize, JsonSchema)]
pub struct IssueShowResponse {
    #[serde(flatten)]
    pub issue: Issue,
    /// Issues that list this one as a dependency
    pub dependents: Vec<String>,
}

/// Issue in a `dep tree` response, listed once however often it is reached
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct TreeNodeView {
    pub id: String,
    pub title: String,
    pub status: Status,
    pub dependencies: Vec<TreeEdgeView>,
}

/// Outgoing edge of a tree node
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeEdgeView {
    /// Stored issue, described by the entry in `nodes` with this id
    Issue { id: String },
    Missing { id: String },
    /// Issue already on the path from the root
    Cycle { id: String },
}

/// Response for `dep tree`
#[derive(Debug, Serialize, JsonSchema)]
pub struct TreeResponse {
    pub root: String,
    /// Every stored issue in the closure, root first
    pub nodes: Vec<TreeNodeView>,
    pub cycles: Vec<Vec<String>>,
}

/// Indentation stops growing past this depth; deeper lines carry a label.
const MAX_TREE_INDENT: usize = 32;

impl TreeResponse {
    pub fn node(&self, id: &str) -> Option<&TreeNodeView> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Indented text rendering, depth first.
    ///
    /// An issue reached a second time is printed as a one-line reference
    /// instead of repeating its subtree.
    pub fn render_lines(&self) -> Vec<String> {
        let by_id: HashMap<&str, &TreeNodeView> =
            self.nodes.iter().map(|node| (node.id.as_str(), node)).collect();
        let mut printed: HashSet<&str> = HashSet::new();
        let mut lines = Vec::new();
        let mut stack = vec![(TreeLine::Issue(self.root.as_str()), 0usize)];

        while let Some((line, depth)) = stack.pop() {
            let indent = if depth > MAX_TREE_INDENT {
                format!("{}[depth {}] ", "  ".repeat(MAX_TREE_INDENT), depth)
            } else {
                "  ".repeat(depth)
            };
            match line {
                TreeLine::Issue(id) => match by_id.get(id) {
                    Some(node) if printed.insert(id) => {
                        lines.push(format!("{}{} [{}] {}", indent, id, node.status, node.title));
                        for edge in node.dependencies.iter().rev() {
                            let child = match edge {
                                TreeEdgeView::Issue { id } => TreeLine::Issue(id),
                                TreeEdgeView::Missing { id } => TreeLine::Missing(id),
                                TreeEdgeView::Cycle { id } => TreeLine::Cycle(id),
                            };
                            stack.push((child, depth + 1));
                        }
                    }
                    Some(node) => lines.push(format!(
                        "{}{} [{}] {} (see above)",
                        indent, id, node.status, node.title
                    )),
                    None => lines.push(format!("{}{} (missing)", indent, id)),
                },
                TreeLine::Missing(id) => lines.push(format!("{}{} (missing)", indent, id)),
                TreeLine::Cycle(id) => lines.push(format!("{}{} (cycle)", indent, id)),
            }
        }

        lines
    }
}

enum TreeLine<'a> {
    Issue(&'a str),
    Missing(&'a str),
    Cycle(&'a str),
}

/// Response for `dep add` / `dep rm`
#[derive(Debug, Serialize, JsonSchema)]
pub struct DependencyChangeResponse {
    pub from_id: String,
    pub to_id: String,
    /// False when the edge was already in the requested state
    pub changed: bool,
}
