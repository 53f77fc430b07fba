//! Three-way merge of a single issue record.
//!
//! Invoked when two histories that both edited the same record file are
//! combined. Each field is reconciled on its own: a field changed on only
//! one side takes that side's value, a field changed on both sides follows
//! the per-field policy below. The result is always a valid record, so
//! nobody is asked to hand-edit conflict markers inside a JSON document.
//!
//! | field | both sides changed |
//! |---|---|
//! | `labels`, `dependencies` | union |
//! | `status` (with `closed_at`/`closed_reason`) | newer `updated_at` wins, tie keeps ours |
//! | `title`, `description`, `type`, `priority` | newer `updated_at` wins, tie keeps ours |
//! | `created_at` | earlier value |
//! | `updated_at` | later value |

use crate::codec;
use crate::domain::{Issue, Status};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Which of the three merge inputs a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Base,
    Ours,
    Theirs,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Base => "base",
            Side::Ours => "ours",
            Side::Theirs => "theirs",
        })
    }
}

/// The resolver declines; the caller should present a textual conflict.
#[derive(Debug, Error, PartialEq)]
pub enum MergeFallback {
    #[error("{side} does not decode as an issue record: {reason}")]
    Undecodable { side: Side, reason: String },

    #[error("records describe different issues ({side} has id {found}, expected {expected})")]
    IdMismatch {
        side: Side,
        expected: String,
        found: String,
    },

    #[error("merged record is invalid: {0}")]
    Invalid(String),
}

/// Merge three record buffers into canonical bytes.
///
/// A `base` that is absent or blank means both sides created the record
/// independently; there is then no common ancestor.
pub fn merge_bytes(
    base: Option<&[u8]>,
    ours: &[u8],
    theirs: &[u8],
) -> Result<Vec<u8>, MergeFallback> {
    let decode = |side: Side, bytes: &[u8]| {
        codec::decode(bytes).map_err(|e| MergeFallback::Undecodable {
            side,
            reason: e.to_string(),
        })
    };

    let base = match base {
        Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
            Some(decode(Side::Base, bytes)?)
        }
        _ => None,
    };
    let ours = decode(Side::Ours, ours)?;
    let theirs = decode(Side::Theirs, theirs)?;

    let merged = merge(base.as_ref(), &ours, &theirs)?;
    codec::encode(&merged).map_err(|e| MergeFallback::Invalid(e.to_string()))
}

/// Reconcile `ours` and `theirs` against their common ancestor.
pub fn merge(base: Option<&Issue>, ours: &Issue, theirs: &Issue) -> Result<Issue, MergeFallback> {
    if ours.id != theirs.id {
        return Err(MergeFallback::IdMismatch {
            side: Side::Theirs,
            expected: ours.id.clone(),
            found: theirs.id.clone(),
        });
    }
    if let Some(base) = base {
        if base.id != ours.id {
            return Err(MergeFallback::IdMismatch {
                side: Side::Base,
                expected: ours.id.clone(),
                found: base.id.clone(),
            });
        }
    }

    let newer = if theirs.updated_at > ours.updated_at {
        Side::Theirs
    } else {
        Side::Ours
    };
    let resolver = FieldResolver { newer };

    let title = resolver.scalar(
        "title",
        base.map(|b| &b.title),
        &ours.title,
        &theirs.title,
    );
    let description = resolver.scalar(
        "description",
        base.map(|b| &b.description),
        &ours.description,
        &theirs.description,
    );
    let issue_type = resolver.scalar(
        "type",
        base.map(|b| &b.issue_type),
        &ours.issue_type,
        &theirs.issue_type,
    );
    let priority = resolver.scalar(
        "priority",
        base.map(|b| &b.priority),
        &ours.priority,
        &theirs.priority,
    );
    let labels = resolver.set(
        "labels",
        base.map(|b| &b.labels),
        &ours.labels,
        &theirs.labels,
    );
    let dependencies = resolver.set(
        "dependencies",
        base.map(|b| &b.dependencies),
        &ours.dependencies,
        &theirs.dependencies,
    );

    // Status travels with its closed fields so the winner's triple stays consistent
    let status_source = match resolver.pick(
        "status",
        base.map(status_fields).as_ref(),
        &status_fields(ours),
        &status_fields(theirs),
    ) {
        Side::Theirs => theirs,
        _ => ours,
    };
    let (closed_at, closed_reason) = if status_source.is_closed() {
        (status_source.closed_at, status_source.closed_reason.clone())
    } else {
        (None, None)
    };

    let merged = Issue {
        closed_at,
        closed_reason,
        created_at: ours.created_at.min(theirs.created_at),
        dependencies,
        description,
        id: ours.id.clone(),
        labels,
        priority,
        status: status_source.status,
        title,
        issue_type,
        updated_at: ours.updated_at.max(theirs.updated_at),
    };

    merged
        .validate()
        .map_err(|e| MergeFallback::Invalid(e.to_string()))?;
    Ok(merged)
}

type StatusFields = (Status, Option<DateTime<Utc>>, Option<String>);

fn status_fields(issue: &Issue) -> StatusFields {
    (issue.status, issue.closed_at, issue.closed_reason.clone())
}

struct FieldResolver {
    /// Side with the later `updated_at`; ours on a tie
    newer: Side,
}

impl FieldResolver {
    /// Which sides changed a field relative to the ancestor.
    fn changes<T: PartialEq>(base: Option<&T>, ours: &T, theirs: &T) -> (bool, bool) {
        match base {
            Some(base) => (ours != base, theirs != base),
            None => {
                let differ = ours != theirs;
                (differ, differ)
            }
        }
    }

    /// Decide which side supplies a field.
    fn pick<T: PartialEq>(&self, field: &str, base: Option<&T>, ours: &T, theirs: &T) -> Side {
        match Self::changes(base, ours, theirs) {
            (_, false) => Side::Ours,
            (false, true) => Side::Theirs,
            (true, true) => {
                debug!(field, winner = %self.newer, "both sides changed field");
                self.newer
            }
        }
    }

    fn scalar<T: PartialEq + Clone>(&self, field: &str, base: Option<&T>, ours: &T, theirs: &T) -> T {
        match self.pick(field, base, ours, theirs) {
            Side::Theirs => theirs.clone(),
            _ => ours.clone(),
        }
    }

    fn set(
        &self,
        field: &str,
        base: Option<&BTreeSet<String>>,
        ours: &BTreeSet<String>,
        theirs: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        match Self::changes(base, ours, theirs) {
            (true, true) => {
                debug!(field, "both sides changed set, taking union");
                ours.union(theirs).cloned().collect()
            }
            (false, true) => theirs.clone(),
            _ => ours.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IssueType, Priority};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn base() -> Issue {
        Issue::new("bd-aaaa", "Original title", at(0))
    }

    fn edit(from: &Issue, when: i64, f: impl FnOnce(&mut Issue)) -> Issue {
        let mut issue = from.clone();
        f(&mut issue);
        issue.touch(at(when));
        issue
    }

    #[test]
    fn test_one_sided_change_wins_regardless_of_time() {
        let base = base();
        let ours = edit(&base, 100, |i| i.title = "Renamed".into());
        let theirs = edit(&base, 200, |i| i.description = "Details".into());

        let merged = merge(Some(&base), &ours, &theirs).unwrap();
        assert_eq!(merged.title, "Renamed");
        assert_eq!(merged.description, "Details");
        assert_eq!(merged.updated_at, at(200));
    }

    #[test]
    fn test_offline_priority_and_label_edits() {
        let base = base();
        let ours = edit(&base, 10, |i| i.priority = Priority::new(1).unwrap());
        let theirs = edit(&base, 20, |i| {
            i.priority = Priority::CRITICAL;
            i.labels.insert("urgent".into());
        });

        let merged = merge(Some(&base), &ours, &theirs).unwrap();
        assert_eq!(merged.priority, Priority::CRITICAL);
        assert!(merged.labels.contains("urgent"));
    }

    #[test]
    fn test_both_sides_add_labels_and_dependencies() {
        let base = base();
        let ours = edit(&base, 10, |i| {
            i.labels.insert("a".into());
            i.dependencies.insert("bd-0001".into());
        });
        let theirs = edit(&base, 5, |i| {
            i.labels.insert("b".into());
            i.dependencies.insert("bd-0002".into());
        });

        let merged = merge(Some(&base), &ours, &theirs).unwrap();
        assert_eq!(
            merged.labels.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(merged.dependencies.len(), 2);
    }

    #[test]
    fn test_one_sided_removal_is_kept() {
        let mut base = base();
        base.labels.insert("stale".into());
        let ours = edit(&base, 10, |i| {
            i.labels.remove("stale");
        });
        let theirs = edit(&base, 20, |i| i.title = "Other".into());

        let merged = merge(Some(&base), &ours, &theirs).unwrap();
        assert!(merged.labels.is_empty());
    }

    #[test]
    fn test_tie_keeps_ours() {
        let base = base();
        let ours = edit(&base, 10, |i| i.issue_type = IssueType::Bug);
        let theirs = edit(&base, 10, |i| i.issue_type = IssueType::Epic);

        assert_eq!(
            merge(Some(&base), &ours, &theirs).unwrap().issue_type,
            IssueType::Bug
        );
        assert_eq!(
            merge(Some(&base), &theirs, &ours).unwrap().issue_type,
            IssueType::Epic
        );
    }

    #[test]
    fn test_closed_fields_follow_winning_status() {
        let base = base();
        let ours = edit(&base, 10, |i| i.close("fixed", at(10)));
        let theirs = edit(&base, 20, |i| i.status = Status::InProgress);

        let merged = merge(Some(&base), &ours, &theirs).unwrap();
        assert_eq!(merged.status, Status::InProgress);
        assert!(merged.closed_at.is_none());
        assert!(merged.closed_reason.is_none());

        let later_close = edit(&base, 30, |i| i.close("wontfix", at(30)));
        let merged = merge(Some(&base), &theirs, &later_close).unwrap();
        assert_eq!(merged.status, Status::Closed);
        assert_eq!(merged.closed_at, Some(at(30)));
        assert_eq!(merged.closed_reason.as_deref(), Some("wontfix"));
    }

    #[test]
    fn test_one_sided_close_survives_other_edits() {
        let base = base();
        let ours = edit(&base, 50, |i| {
            i.labels.insert("later".into());
        });
        let theirs = edit(&base, 10, |i| i.close("done", at(10)));

        let merged = merge(Some(&base), &ours, &theirs).unwrap();
        assert_eq!(merged.status, Status::Closed);
        assert_eq!(merged.closed_reason.as_deref(), Some("done"));
        assert!(merged.labels.contains("later"));
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn test_created_at_takes_earlier_value() {
        let base = base();
        let ours = base.clone();
        let mut theirs = base.clone();
        theirs.created_at = at(-50);

        let merged = merge(None, &ours, &theirs).unwrap();
        assert_eq!(merged.created_at, at(-50));
    }

    #[test]
    fn test_no_ancestor_treats_differences_as_conflicts() {
        let base = base();
        let ours = edit(&base, 10, |i| {
            i.title = "Ours".into();
            i.labels.insert("x".into());
        });
        let theirs = edit(&base, 20, |i| {
            i.title = "Theirs".into();
            i.labels.insert("y".into());
        });

        let merged = merge(None, &ours, &theirs).unwrap();
        assert_eq!(merged.title, "Theirs");
        assert_eq!(merged.labels.len(), 2);
    }

    #[test]
    fn test_id_mismatch_falls_back() {
        let ours = base();
        let theirs = Issue::new("bd-bbbb", "Other", at(0));
        assert!(matches!(
            merge(None, &ours, &theirs),
            Err(MergeFallback::IdMismatch { .. })
        ));
    }

    #[test]
    fn test_merge_bytes_round_trip() {
        let base = base();
        let ours = edit(&base, 10, |i| {
            i.labels.insert("a".into());
        });
        let theirs = edit(&base, 20, |i| {
            i.labels.insert("b".into());
        });

        let out = merge_bytes(
            Some(codec::encode(&base).unwrap().as_slice()),
            &codec::encode(&ours).unwrap(),
            &codec::encode(&theirs).unwrap(),
        )
        .unwrap();
        let merged = codec::decode(&out).unwrap();
        assert_eq!(merged.labels.len(), 2);
        assert_eq!(out, codec::encode(&merged).unwrap());
    }

    #[test]
    fn test_merge_bytes_declines_on_corrupt_side() {
        let good = codec::encode(&base()).unwrap();
        let result = merge_bytes(Some(good.as_slice()), b"<<<<<<< HEAD\n", &good);
        assert!(matches!(
            result,
            Err(MergeFallback::Undecodable {
                side: Side::Ours,
                ..
            })
        ));
    }

    #[test]
    fn test_merge_bytes_declines_on_corrupt_theirs_or_base() {
        let good = codec::encode(&base()).unwrap();
        let half_written: &[u8] = b"{\"id\": \"bd-aaaa\", \"title\": ";

        let result = merge_bytes(Some(good.as_slice()), &good, half_written);
        assert!(matches!(
            result,
            Err(MergeFallback::Undecodable {
                side: Side::Theirs,
                ..
            })
        ));

        let result = merge_bytes(Some(half_written), &good, &good);
        assert!(matches!(
            result,
            Err(MergeFallback::Undecodable {
                side: Side::Base,
                ..
            })
        ));
    }

    #[test]
    fn test_merge_bytes_declines_on_id_mismatch() {
        let ours = base();
        let other = Issue::new("bd-bbbb", "Other", at(0));
        let ours_bytes = codec::encode(&ours).unwrap();
        let other_bytes = codec::encode(&other).unwrap();

        assert_eq!(
            merge_bytes(Some(ours_bytes.as_slice()), &ours_bytes, &other_bytes),
            Err(MergeFallback::IdMismatch {
                side: Side::Theirs,
                expected: ours.id.clone(),
                found: "bd-bbbb".into(),
            })
        );
        assert_eq!(
            merge_bytes(Some(other_bytes.as_slice()), &ours_bytes, &ours_bytes),
            Err(MergeFallback::IdMismatch {
                side: Side::Base,
                expected: ours.id.clone(),
                found: "bd-bbbb".into(),
            })
        );
    }

    #[test]
    fn test_merge_bytes_blank_base_means_no_ancestor() {
        let ours = base();
        let theirs = edit(&ours, 10, |i| i.title = "Changed".into());
        let out = merge_bytes(
            Some(&b""[..]),
            &codec::encode(&ours).unwrap(),
            &codec::encode(&theirs).unwrap(),
        )
        .unwrap();
        assert_eq!(codec::decode(&out).unwrap().title, "Changed");
    }
}
