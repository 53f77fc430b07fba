//! Issue repository: CRUD over individual record files.
//!
//! The repository validates user input, assigns identifiers and timestamps,
//! and delegates persistence to an [`IssueStore`]. It holds no index; every
//! listing is a fresh scan of the store.

use crate::domain::{Issue, IssueType, NewIssue, Priority, Status};
use crate::errors::{find_tracker_error, TrackerError};
use crate::id_gen::IdGenerator;
use crate::storage::IssueStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::{debug, info};

/// Times a creation is retried when the generated id is taken between
/// the existence check and the write.
const CREATE_ATTEMPTS: usize = 3;

/// Provides the current time.
///
/// Substituting a fixed clock makes timestamps deterministic in tests.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.set(self.now.get() + Duration::seconds(seconds));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// Conjunctive filter for `list`; `None` and empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub issue_type: Option<IssueType>,
    /// Every listed label must be present
    pub labels: Vec<String>,
}

impl IssueFilter {
    pub fn matches(&self, issue: &Issue) -> bool {
        self.status.map_or(true, |s| issue.status == s)
            && self.priority.map_or(true, |p| issue.priority == p)
            && self.issue_type.map_or(true, |t| issue.issue_type == t)
            && self.labels.iter().all(|l| issue.labels.contains(l))
    }
}

/// Sort by priority, then creation time, then id.
pub fn sort_issues<T: std::borrow::Borrow<Issue>>(issues: &mut [T]) {
    issues.sort_by(|a, b| {
        let (a, b) = (a.borrow(), b.borrow());
        a.priority
            .cmp(&b.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub struct IssueRepository<S: IssueStore> {
    store: S,
    ids: RefCell<IdGenerator>,
    clock: Box<dyn Clock>,
}

impl<S: IssueStore> IssueRepository<S> {
    pub fn new(store: S, ids: IdGenerator, clock: Box<dyn Clock>) -> Self {
        Self {
            store,
            ids: RefCell::new(ids),
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current time at record precision.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(0)
    }

    /// Validate `fields`, assign a fresh id and persist a new open issue.
    ///
    /// Nothing is written if validation fails.
    pub fn create(&self, fields: &NewIssue) -> Result<Issue> {
        let (title, description, labels) = fields.validate()?;

        for attempt in 1..=CREATE_ATTEMPTS {
            let existing: HashSet<String> = self.store.list_ids()?.into_iter().collect();
            let id = self.ids.borrow_mut().next_id(&existing)?;

            let mut issue = Issue::new(id, title.clone(), self.now());
            issue.description = description.clone();
            issue.issue_type = fields.issue_type;
            issue.priority = fields.priority;
            issue.labels = labels.clone();

            match self.store.insert_new(&issue) {
                Ok(()) => {
                    info!(id = %issue.id, "created issue");
                    return Ok(issue);
                }
                Err(e)
                    if matches!(
                        find_tracker_error(&e),
                        Some(TrackerError::AlreadyExists { .. })
                    ) =>
                {
                    debug!(id = %issue.id, attempt, "id taken during create, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(TrackerError::validation("Could not allocate an unused issue id").into())
    }

    /// Persist a record brought in from elsewhere under its own id.
    ///
    /// # Errors
    ///
    /// Validation failures, or `TrackerError::AlreadyExists` if the id is taken.
    pub fn import(&self, issue: &Issue) -> Result<()> {
        issue.validate()?;
        self.store.insert_new(issue)?;
        debug!(id = %issue.id, "imported issue");
        Ok(())
    }

    /// Load a record by exact id.
    pub fn get(&self, id: &str) -> Result<Issue> {
        self.store.load_issue(id)
    }

    /// Resolve a full or partial id to a stored id.
    pub fn resolve(&self, partial_id: &str) -> Result<String> {
        self.store.resolve_issue_id(partial_id)
    }

    /// Resolve a partial id and load the record.
    pub fn find(&self, partial_id: &str) -> Result<Issue> {
        let id = self.resolve(partial_id)?;
        self.get(&id)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.store.exists(id)
    }

    /// Overwrite one existing record after checking its invariants.
    pub fn save(&self, issue: &Issue) -> Result<()> {
        issue.validate()?;
        self.store
            .save_issue(issue)
            .with_context(|| format!("Failed to save issue {}", issue.id))
    }

    /// Every readable record, in listing order.
    pub fn all(&self) -> Result<Vec<Issue>> {
        let mut issues = self.store.list_issues()?;
        sort_issues(&mut issues);
        Ok(issues)
    }

    pub fn list(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|issue| filter.matches(issue))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_gen::SuffixSource;
    use crate::storage::InMemoryStorage;
    use chrono::TimeZone;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<&'static str>);

    impl SuffixSource for Scripted {
        fn hex(&mut self, _len: usize) -> String {
            self.0.pop_front().unwrap_or("ffff").to_string()
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn repo(suffixes: Vec<&'static str>) -> (IssueRepository<InMemoryStorage>, FixedClock) {
        let clock = FixedClock::new(start());
        let ids = IdGenerator::with_source("bd", 4, Box::new(Scripted(suffixes.into()))).unwrap();
        let repo = IssueRepository::new(InMemoryStorage::new(), ids, Box::new(clock.clone()));
        (repo, clock)
    }

    #[test]
    fn test_create_assigns_id_and_timestamps() {
        let (repo, _clock) = repo(vec!["aaaa"]);
        let issue = repo
            .create(&NewIssue::new("First").with_label("x"))
            .unwrap();

        assert_eq!(issue.id, "bd-aaaa");
        assert_eq!(issue.created_at, start());
        assert_eq!(issue.updated_at, start());
        assert_eq!(issue.status, Status::Open);
        assert_eq!(repo.get("bd-aaaa").unwrap(), issue);
    }

    #[test]
    fn test_create_skips_existing_ids() {
        let (repo, _clock) = repo(vec!["aaaa", "aaaa", "bbbb"]);
        repo.create(&NewIssue::new("One")).unwrap();
        let second = repo.create(&NewIssue::new("Two")).unwrap();
        assert_eq!(second.id, "bd-bbbb");
    }

    #[test]
    fn test_invalid_create_writes_nothing() {
        let (repo, _clock) = repo(vec!["aaaa"]);
        let err = repo.create(&NewIssue::new("   ")).unwrap_err();
        assert!(matches!(
            find_tracker_error(&err),
            Some(TrackerError::Validation(_))
        ));
        assert!(repo.all().unwrap().is_empty());
    }

    #[test]
    fn test_save_unknown_issue_is_not_found() {
        let (repo, _clock) = repo(vec![]);
        let ghost = Issue::new("bd-ghost", "Nope", start());
        let err = repo.save(&ghost).unwrap_err();
        assert!(matches!(
            find_tracker_error(&err),
            Some(TrackerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_filters_compose_and_order() {
        let (repo, clock) = repo(vec!["aaaa", "bbbb", "cccc", "dddd"]);
        repo.create(&NewIssue::new("Low").with_priority(Priority::LOW))
            .unwrap();
        clock.advance(1);
        repo.create(
            &NewIssue::new("Urgent bug")
                .with_priority(Priority::CRITICAL)
                .with_type(IssueType::Bug)
                .with_label("backend"),
        )
        .unwrap();
        clock.advance(1);
        repo.create(&NewIssue::new("Normal").with_label("backend"))
            .unwrap();
        clock.advance(1);
        let mut done = repo.create(&NewIssue::new("Done")).unwrap();
        done.close("shipped", repo.now());
        repo.save(&done).unwrap();

        let titles = |filter: IssueFilter| -> Vec<String> {
            repo.list(&filter)
                .unwrap()
                .into_iter()
                .map(|i| i.title)
                .collect()
        };

        assert_eq!(
            titles(IssueFilter::default()),
            vec!["Urgent bug", "Normal", "Done", "Low"]
        );
        assert_eq!(
            titles(IssueFilter {
                labels: vec!["backend".into()],
                ..Default::default()
            }),
            vec!["Urgent bug", "Normal"]
        );
        assert_eq!(
            titles(IssueFilter {
                labels: vec!["backend".into()],
                issue_type: Some(IssueType::Task),
                ..Default::default()
            }),
            vec!["Normal"]
        );
        assert_eq!(
            titles(IssueFilter {
                status: Some(Status::Closed),
                ..Default::default()
            }),
            vec!["Done"]
        );
        assert_eq!(
            titles(IssueFilter {
                priority: Some(Priority::CRITICAL),
                ..Default::default()
            }),
            vec!["Urgent bug"]
        );
        assert_eq!(
            titles(IssueFilter {
                priority: Some(Priority::default()),
                labels: vec!["backend".into()],
                ..Default::default()
            }),
            vec!["Normal"]
        );
        assert!(titles(IssueFilter {
            priority: Some(Priority::new(1).unwrap()),
            ..Default::default()
        })
        .is_empty());
    }
}
