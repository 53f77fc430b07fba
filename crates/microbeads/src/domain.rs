//! Core domain types for the issue tracker.
//!
//! An [`Issue`] is the only entity. Its field declaration order is the
//! alphabetical order of the serialized keys, which is what the record
//! codec relies on for a canonical byte form.

use crate::errors::TrackerError;
use chrono::{DateTime, SubsecRound, Utc};
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 500;
/// Maximum label length in characters.
pub const MAX_LABEL_LEN: usize = 100;

/// Issue lifecycle status (the stored field, not the derived classification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not started
    Open,
    /// Currently being worked on
    InProgress,
    /// Manually marked as blocked
    Blocked,
    /// Finished or abandoned
    Closed,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Open,
        Status::InProgress,
        Status::Blocked,
        Status::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::InProgress => "in_progress",
            Status::Blocked => "blocked",
            Status::Closed => "closed",
        }
    }

    /// Statuses in which work may start or continue.
    pub fn is_workable(self) -> bool {
        matches!(self, Status::Open | Status::InProgress)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                TrackerError::validation(format!(
                    "Invalid status '{}'. Valid statuses: open, in_progress, blocked, closed",
                    s
                ))
            })
    }
}

/// Kind of work an issue represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Bug,
    Feature,
    #[default]
    Task,
    Epic,
    Chore,
}

impl IssueType {
    pub const ALL: [IssueType; 5] = [
        IssueType::Bug,
        IssueType::Feature,
        IssueType::Task,
        IssueType::Epic,
        IssueType::Chore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::Bug => "bug",
            IssueType::Feature => "feature",
            IssueType::Task => "task",
            IssueType::Epic => "epic",
            IssueType::Chore => "chore",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IssueType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                TrackerError::validation(format!(
                    "Invalid type '{}'. Valid types: bug, feature, task, epic, chore",
                    s
                ))
            })
    }
}

/// Priority from 0 (critical) to 4 (low).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const CRITICAL: Priority = Priority(0);
    pub const LOW: Priority = Priority(4);

    pub fn new(value: i64) -> Result<Self, TrackerError> {
        if (0..=4).contains(&value) {
            Ok(Priority(value as u8))
        } else {
            Err(TrackerError::validation(format!(
                "Priority must be between 0 and 4, got {}",
                value
            )))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority(2)
    }
}

impl TryFrom<i64> for Priority {
    type Error = TrackerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Priority::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl FromStr for Priority {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches(['P', 'p']);
        let value: i64 = trimmed.parse().map_err(|_| {
            TrackerError::validation(format!("Invalid priority '{}'. Expected 0-4", s))
        })?;
        Priority::new(value)
    }
}

impl JsonSchema for Priority {
    fn schema_name() -> String {
        "Priority".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        let mut schema = <u8 as JsonSchema>::json_schema(gen).into_object();
        schema.number().minimum = Some(0.0);
        schema.number().maximum = Some(4.0);
        schema.into()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// An issue representing a unit of work.
///
/// Fields are declared in the alphabetical order of their serialized names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Issue {
    /// When the issue was closed; present iff `status == closed`
    #[serde(default, with = "crate::codec::timestamp::option")]
    #[schemars(with = "Option<DateTime<Utc>>")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Why the issue was closed; present iff `status == closed`
    #[serde(default)]
    pub closed_reason: Option<String>,
    #[serde(with = "crate::codec::timestamp")]
    #[schemars(with = "DateTime<Utc>")]
    pub created_at: DateTime<Utc>,
    /// IDs of issues this one is blocked by
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
    pub id: String,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    pub priority: Priority,
    pub status: Status,
    pub title: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    #[serde(with = "crate::codec::timestamp")]
    #[schemars(with = "DateTime<Utc>")]
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    /// Build an open issue with both timestamps set to `now`.
    ///
    /// Field values are taken as given; use [`NewIssue::validate`] first when
    /// they come from user input.
    pub fn new(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        let now = now.trunc_subsecs(0);
        Self {
            closed_at: None,
            closed_reason: None,
            created_at: now,
            dependencies: BTreeSet::new(),
            description: String::new(),
            id: id.into(),
            labels: BTreeSet::new(),
            priority: Priority::default(),
            status: Status::Open,
            title: title.into(),
            issue_type: IssueType::default(),
            updated_at: now,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == Status::Closed
    }

    /// Bump `updated_at`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let now = now.trunc_subsecs(0);
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Close the issue. Re-closing keeps the original `closed_at`.
    pub fn close(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        let now = now.trunc_subsecs(0);
        if !self.is_closed() || self.closed_at.is_none() {
            self.closed_at = Some(now.max(self.created_at));
        }
        self.status = Status::Closed;
        self.closed_reason = Some(reason.into());
        self.touch(now);
    }

    /// Reopen the issue, clearing both closed fields.
    pub fn reopen(&mut self, now: DateTime<Utc>) {
        self.status = Status::Open;
        self.closed_at = None;
        self.closed_reason = None;
        self.touch(now);
    }

    /// Change status while keeping the closed-field invariant.
    pub fn set_status(&mut self, status: Status, now: DateTime<Utc>) {
        match (self.is_closed(), status) {
            (_, Status::Closed) => {
                let reason = self.closed_reason.clone().unwrap_or_default();
                self.close(reason, now);
            }
            (true, other) => {
                self.reopen(now);
                self.status = other;
            }
            (false, other) => {
                self.status = other;
                self.touch(now);
            }
        }
    }

    /// Check the record-level invariants.
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.id.trim().is_empty() {
            return Err(TrackerError::validation("Issue id cannot be empty"));
        }
        validate_title(&self.title)?;
        for label in &self.labels {
            validate_label(label)?;
        }
        if self.dependencies.contains(&self.id) {
            return Err(TrackerError::validation(format!(
                "Issue {} cannot depend on itself",
                self.id
            )));
        }
        let closed_fields = (self.closed_at.is_some(), self.closed_reason.is_some());
        match (self.is_closed(), closed_fields) {
            (true, (true, true)) | (false, (false, false)) => {}
            (true, _) => {
                return Err(TrackerError::validation(format!(
                    "Closed issue {} must have both closed_at and closed_reason",
                    self.id
                )))
            }
            (false, _) => {
                return Err(TrackerError::validation(format!(
                    "Issue {} is {} but carries closed_at/closed_reason",
                    self.id, self.status
                )))
            }
        }
        if self.updated_at < self.created_at {
            return Err(TrackerError::validation(format!(
                "Issue {} has updated_at earlier than created_at",
                self.id
            )));
        }
        let stamps = [
            ("created_at", Some(self.created_at)),
            ("updated_at", Some(self.updated_at)),
            ("closed_at", self.closed_at),
        ];
        for (field, stamp) in stamps {
            if stamp.is_some_and(|ts| ts.timestamp_subsec_nanos() != 0) {
                return Err(TrackerError::validation(format!(
                    "Issue {} has a fractional-second {}",
                    self.id, field
                )));
            }
        }
        Ok(())
    }
}

/// Implement GraphNode for Issue to enable dependency graph operations
impl crate::graph::GraphNode for Issue {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }
}

/// User-supplied fields for a new issue, validated before any write.
#[derive(Debug, Clone, Default)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub issue_type: IssueType,
    pub priority: Priority,
    pub labels: Vec<String>,
}

impl NewIssue {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_type(mut self, issue_type: IssueType) -> Self {
        self.issue_type = issue_type;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Normalize and validate; returns the cleaned title, description and labels.
    pub fn validate(&self) -> Result<(String, String, BTreeSet<String>), TrackerError> {
        let title = validate_title(&self.title)?;
        let description = self.description.trim().to_string();
        let labels = validate_labels(&self.labels)?;
        Ok((title, description, labels))
    }
}

/// Trim and check a title.
pub fn validate_title(title: &str) -> Result<String, TrackerError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(TrackerError::validation("Title cannot be empty"));
    }
    let len = title.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(TrackerError::validation(format!(
            "Title too long ({} chars). Maximum is {} characters",
            len, MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

/// Trim and check a single label.
pub fn validate_label(label: &str) -> Result<String, TrackerError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(TrackerError::validation("Label cannot be empty"));
    }
    let len = label.chars().count();
    if len > MAX_LABEL_LEN {
        return Err(TrackerError::validation(format!(
            "Label '{}' too long ({} chars). Maximum is {} characters",
            label, len, MAX_LABEL_LEN
        )));
    }
    Ok(label.to_string())
}

pub fn validate_labels<S: AsRef<str>>(labels: &[S]) -> Result<BTreeSet<String>, TrackerError> {
    labels
        .iter()
        .map(|label| validate_label(label.as_ref()))
        .collect()
}
