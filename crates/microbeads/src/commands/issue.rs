//! Issue CRUD operations and lifecycle management

use super::*;
use crate::domain::{validate_label, validate_labels, validate_title, IssueType, NewIssue, Priority, Status};
use crate::errors::TrackerError;
use crate::graph::GraphNode;
use crate::repository::IssueFilter;

/// Field changes requested by `update`. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub issue_type: Option<IssueType>,
    /// Replace the whole label set
    pub labels: Option<Vec<String>>,
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
}

impl IssueUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.issue_type.is_none()
            && self.labels.is_none()
            && self.add_labels.is_empty()
            && self.remove_labels.is_empty()
    }
}

impl<S: IssueStore> CommandExecutor<S> {
    pub fn create_issue(&self, fields: NewIssue) -> Result<Issue> {
        self.repo.create(&fields)
    }

    /// Load an issue and the ids of issues that depend on it.
    pub fn show_issue(&self, id: &str) -> Result<(Issue, Vec<String>)> {
        let issue = self.repo.find(id)?;
        let dependents = self.with_graph(|graph| {
            Ok(graph
                .get_dependents(&issue.id)
                .into_iter()
                .map(|i| i.id().to_string())
                .collect())
        })?;
        Ok((issue, dependents))
    }

    pub fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.repo.list(filter)
    }

    /// Apply an update. Every field is validated before anything is written.
    pub fn update_issue(&self, id: &str, update: IssueUpdate) -> Result<Issue> {
        if update.is_empty() {
            return Err(TrackerError::validation("No changes specified").into());
        }
        let mut issue = self.repo.find(id)?;
        let now = self.repo.now();

        // Validate inputs up front so a bad label doesn't leave a half-applied change
        let title = update.title.as_deref().map(validate_title).transpose()?;
        let replace_labels = update.labels.as_deref().map(validate_labels).transpose()?;
        let add_labels = validate_labels(&update.add_labels)?;
        let remove_labels = update
            .remove_labels
            .iter()
            .map(|l| validate_label(l))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(title) = title {
            issue.title = title;
        }
        if let Some(description) = update.description {
            issue.description = description.trim().to_string();
        }
        if let Some(priority) = update.priority {
            issue.priority = priority;
        }
        if let Some(issue_type) = update.issue_type {
            issue.issue_type = issue_type;
        }
        if let Some(labels) = replace_labels {
            issue.labels = labels;
        }
        issue.labels.extend(add_labels);
        for label in &remove_labels {
            issue.labels.remove(label);
        }
        if let Some(status) = update.status {
            issue.set_status(status, now);
        }

        issue.touch(now);
        self.repo.save(&issue)?;
        info!(id = %issue.id, "updated issue");
        Ok(issue)
    }

    /// Close an issue. Closing again keeps the original `closed_at`.
    pub fn close_issue(&self, id: &str, reason: &str) -> Result<Issue> {
        let mut issue = self.repo.find(id)?;
        issue.close(reason.trim(), self.repo.now());
        self.repo.save(&issue)?;
        info!(id = %issue.id, "closed issue");
        Ok(issue)
    }

    pub fn reopen_issue(&self, id: &str) -> Result<Issue> {
        let mut issue = self.repo.find(id)?;
        issue.reopen(self.repo.now());
        self.repo.save(&issue)?;
        info!(id = %issue.id, "reopened issue");
        Ok(issue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_helpers::setup;
    use crate::errors::find_tracker_error;

    #[test]
    fn test_create_and_show() {
        let (executor, _clock) = setup();
        let created = executor
            .create_issue(NewIssue::new("Write docs").with_type(IssueType::Chore))
            .unwrap();
        assert_eq!(created.id, "bd-0001");

        let (shown, dependents) = executor.show_issue("0001").unwrap();
        assert_eq!(shown, created);
        assert!(dependents.is_empty());
    }

    #[test]
    fn test_show_lists_dependents() {
        let (executor, _clock) = setup();
        let base = executor.create_issue(NewIssue::new("Base")).unwrap();
        let child = executor.create_issue(NewIssue::new("Child")).unwrap();
        executor.add_dependency(&child.id, &base.id).unwrap();

        let (_, dependents) = executor.show_issue(&base.id).unwrap();
        assert_eq!(dependents, vec![child.id]);
    }

    #[test]
    fn test_update_fields_and_labels() {
        let (executor, clock) = setup();
        let issue = executor
            .create_issue(NewIssue::new("Draft").with_label("old").with_label("keep"))
            .unwrap();
        clock.advance(60);

        let updated = executor
            .update_issue(
                &issue.id,
                IssueUpdate {
                    title: Some("  Final  ".into()),
                    priority: Some(Priority::CRITICAL),
                    add_labels: vec!["new".into()],
                    remove_labels: vec!["old".into()],
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "Final");
        assert_eq!(updated.priority, Priority::CRITICAL);
        assert_eq!(
            updated.labels.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["keep", "new"]
        );
        assert_eq!(updated.updated_at, issue.updated_at + chrono::Duration::seconds(60));
        assert_eq!(updated.created_at, issue.created_at);
    }

    #[test]
    fn test_update_rejects_bad_input_without_writing() {
        let (executor, _clock) = setup();
        let issue = executor.create_issue(NewIssue::new("Stable")).unwrap();

        let err = executor
            .update_issue(
                &issue.id,
                IssueUpdate {
                    title: Some("Changed".into()),
                    add_labels: vec!["   ".into()],
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            find_tracker_error(&err),
            Some(TrackerError::Validation(_))
        ));
        assert_eq!(executor.show_issue(&issue.id).unwrap().0.title, "Stable");

        assert!(executor
            .update_issue(&issue.id, IssueUpdate::default())
            .is_err());
    }

    #[test]
    fn test_update_status_keeps_closed_invariant() {
        let (executor, clock) = setup();
        let issue = executor.create_issue(NewIssue::new("Flow")).unwrap();

        clock.advance(1);
        let closed = executor
            .update_issue(
                &issue.id,
                IssueUpdate {
                    status: Some(Status::Closed),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(closed.closed_at.is_some());
        assert_eq!(closed.closed_reason.as_deref(), Some(""));

        clock.advance(1);
        let reopened = executor
            .update_issue(
                &issue.id,
                IssueUpdate {
                    status: Some(Status::Blocked),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(reopened.status, Status::Blocked);
        assert!(reopened.closed_at.is_none());
        assert!(reopened.closed_reason.is_none());
    }

    #[test]
    fn test_close_is_idempotent_on_closed_at() {
        let (executor, clock) = setup();
        let issue = executor.create_issue(NewIssue::new("Finish")).unwrap();

        clock.advance(10);
        let first = executor.close_issue(&issue.id, "done").unwrap();
        clock.advance(10);
        let second = executor.close_issue(&issue.id, "done").unwrap();

        assert_eq!(first.closed_at, second.closed_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[test]
    fn test_reopen_clears_closed_fields() {
        let (executor, _clock) = setup();
        let issue = executor.create_issue(NewIssue::new("Again")).unwrap();
        executor.close_issue(&issue.id, "dup").unwrap();

        let reopened = executor.reopen_issue(&issue.id).unwrap();
        assert_eq!(reopened.status, Status::Open);
        assert!(reopened.closed_at.is_none());
        assert!(reopened.closed_reason.is_none());
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (executor, _clock) = setup();
        let err = executor.close_issue("bd-none", "x").unwrap_err();
        assert!(matches!(
            find_tracker_error(&err),
            Some(TrackerError::NotFound { .. })
        ));
    }
}
