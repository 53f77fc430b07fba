//! Importing issues exported by the beads CLI (`bd list --json`).

use super::*;
use crate::codec::timestamp;
use crate::domain::{IssueType, Priority, Status};
use crate::errors::{find_tracker_error, TrackerError};
use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// One issue as `bd list --json` prints it. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BeadsIssue {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<i64>,
    pub issue_type: Option<String>,
    pub labels: Option<Vec<String>>,
    pub dependencies: Option<Vec<BeadsDependency>>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub closed_at: Option<String>,
    pub close_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BeadsDependency {
    #[serde(alias = "depends_on_id")]
    pub depends_on: Option<String>,
}

/// Outcome of an import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    /// Ids already present in the store
    pub skipped: usize,
    /// Ids whose fields did not form a valid record
    pub rejected: Vec<String>,
}

/// Parse the JSON array printed by `bd list --json`; blank output is empty.
pub fn parse_beads_export(bytes: &[u8]) -> Result<Vec<BeadsIssue>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(bytes).map_err(|e| {
        TrackerError::parse(format!("Failed to parse beads output: {}", e)).into()
    })
}

/// Run `<program> list --json -s open` and parse what it prints.
pub fn fetch_beads_export(program: &str) -> Result<Vec<BeadsIssue>> {
    if which::which(program).is_err() {
        bail!(
            "'{}' (beads CLI) not found\n\n\
             Install beads, point MB_BEADS_BIN at it, or run init without --import-beads",
            program
        );
    }

    let mut cmd = Command::new(program);
    cmd.args(["list", "--json", "-s", "open"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let output = cmd.output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("Failed to get issues from beads: {}", stderr.trim());
    }

    parse_beads_export(&output.stdout)
}

impl BeadsIssue {
    /// Map onto a record, defaulting what beads leaves out.
    pub fn into_issue(self, id: String, now: DateTime<Utc>) -> Result<Issue, TrackerError> {
        let stamp = |raw: Option<&str>| -> Result<Option<DateTime<Utc>>, TrackerError> {
            raw.map(|raw| {
                timestamp::parse(raw).map_err(|e| {
                    TrackerError::validation(format!("invalid timestamp '{}': {}", raw, e))
                })
            })
            .transpose()
        };

        let created_at = stamp(self.created_at.as_deref())?.unwrap_or(now);
        let updated_at = stamp(self.updated_at.as_deref())?.unwrap_or(created_at);
        let closed_at = stamp(self.closed_at.as_deref())?;

        let mut issue = Issue::new(id, self.title.unwrap_or_default().trim(), created_at);
        issue.updated_at = updated_at;
        issue.description = self.description.unwrap_or_default().trim().to_string();
        issue.status = match self.status.as_deref() {
            Some(status) => status.parse::<Status>()?,
            None => Status::Open,
        };
        issue.issue_type = match self.issue_type.as_deref() {
            Some(issue_type) => issue_type.parse::<IssueType>()?,
            None => IssueType::default(),
        };
        issue.priority = match self.priority {
            Some(priority) => Priority::new(priority)?,
            None => Priority::default(),
        };
        issue.labels = self
            .labels
            .unwrap_or_default()
            .iter()
            .map(|label| label.trim().to_string())
            .collect();
        issue.dependencies = self
            .dependencies
            .unwrap_or_default()
            .into_iter()
            .filter_map(|dep| dep.depends_on)
            .filter(|dep| !dep.is_empty() && *dep != issue.id)
            .collect();

        if issue.is_closed() {
            issue.closed_at = Some(closed_at.unwrap_or(issue.updated_at));
            issue.closed_reason = Some(self.close_reason.unwrap_or_default());
        }

        issue.validate()?;
        Ok(issue)
    }
}

impl<S: IssueStore> CommandExecutor<S> {
    /// Store every exported issue whose id is not taken yet.
    pub fn import_beads(&self, records: Vec<BeadsIssue>) -> Result<ImportSummary> {
        let now = self.repo.now();
        let mut summary = ImportSummary::default();

        for record in records {
            let Some(id) = record.id.clone().filter(|id| !id.trim().is_empty()) else {
                debug!("skipping beads entry without an id");
                continue;
            };
            if self.repo.exists(&id) {
                summary.skipped += 1;
                continue;
            }

            let issue = match record.into_issue(id.clone(), now) {
                Ok(issue) => issue,
                Err(e) => {
                    warn!(%id, error = %e, "skipping beads issue");
                    summary.rejected.push(id);
                    continue;
                }
            };
            match self.repo.import(&issue) {
                Ok(()) => summary.imported += 1,
                Err(e)
                    if matches!(
                        find_tracker_error(&e),
                        Some(TrackerError::AlreadyExists { .. })
                    ) =>
                {
                    summary.skipped += 1
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            imported = summary.imported,
            skipped = summary.skipped,
            rejected = summary.rejected.len(),
            "imported issues from beads"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_helpers::setup;
    use crate::domain::NewIssue;

    const EXPORT: &str = r#"[
      {
        "id": "bd-a1b2",
        "title": "Port the parser",
        "description": "Start with the lexer",
        "status": "in_progress",
        "priority": 1,
        "issue_type": "feature",
        "labels": ["parser"],
        "dependencies": [{"issue_id": "bd-a1b2", "depends_on": "bd-c3d4", "type": "blocks"}],
        "created_at": "2024-03-01T10:00:00.123456Z",
        "updated_at": "2024-03-02T09:30:00+01:00",
        "assignee": "sam"
      },
      {
        "id": "bd-c3d4",
        "title": "Write grammar",
        "status": "closed",
        "close_reason": "done",
        "created_at": "2024-03-01T08:00:00Z",
        "updated_at": "2024-03-01T12:00:00Z"
      },
      {"title": "No id"},
      {"id": "bd-e5f6", "title": "Odd", "status": "tombstone"}
    ]"#;

    #[test]
    fn test_import_maps_beads_fields() {
        let (executor, _clock) = setup();
        let records = parse_beads_export(EXPORT.as_bytes()).unwrap();
        let summary = executor.import_beads(records).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                imported: 2,
                skipped: 0,
                rejected: vec!["bd-e5f6".into()],
            }
        );

        let parser = executor.repository().get("bd-a1b2").unwrap();
        assert_eq!(parser.status, Status::InProgress);
        assert_eq!(parser.issue_type, IssueType::Feature);
        assert_eq!(parser.priority.value(), 1);
        assert_eq!(parser.description, "Start with the lexer");
        assert!(parser.labels.contains("parser"));
        assert!(parser.dependencies.contains("bd-c3d4"));
        assert_eq!(timestamp::format(&parser.created_at), "2024-03-01T10:00:00Z");
        assert_eq!(timestamp::format(&parser.updated_at), "2024-03-02T08:30:00Z");

        let grammar = executor.repository().get("bd-c3d4").unwrap();
        assert!(grammar.is_closed());
        assert_eq!(grammar.closed_reason.as_deref(), Some("done"));
        assert_eq!(grammar.closed_at, Some(grammar.updated_at));
        assert_eq!(grammar.issue_type, IssueType::Task);
    }

    #[test]
    fn test_import_skips_existing_ids() {
        let (executor, _clock) = setup();
        let existing = executor.create_issue(NewIssue::new("Local")).unwrap();
        let records = vec![BeadsIssue {
            id: Some(existing.id.clone()),
            title: Some("From beads".into()),
            ..Default::default()
        }];

        let summary = executor.import_beads(records).unwrap();
        assert_eq!(summary.imported, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(executor.repository().get(&existing.id).unwrap().title, "Local");
    }

    #[test]
    fn test_blank_export_is_empty() {
        assert!(parse_beads_export(b"\n").unwrap().is_empty());
        assert!(parse_beads_export(b"{not json").is_err());
    }

    #[test]
    fn test_failing_beads_binary_is_reported() {
        let err = fetch_beads_export("mb-no-such-beads-binary").unwrap_err();
        assert!(err.to_string().contains("beads"));
    }
}
