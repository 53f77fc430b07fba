//! Canonical record encoding.
//!
//! One issue is one JSON document: keys in sorted order, two-space
//! indentation, sorted `labels`/`dependencies`, second-precision UTC
//! timestamps and a trailing newline. Two writers that agree on content
//! produce identical bytes, which keeps version-control diffs small and
//! lets the merge driver work field by field.

use crate::domain::Issue;
use crate::errors::TrackerError;

/// Serialize an issue to its canonical byte form.
pub fn encode(issue: &Issue) -> Result<Vec<u8>, TrackerError> {
    let mut bytes = serde_json::to_vec_pretty(issue)
        .map_err(|e| TrackerError::parse(format!("Failed to serialize issue: {}", e)))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse record bytes, enforcing the value domains and record invariants.
pub fn decode(bytes: &[u8]) -> Result<Issue, TrackerError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(TrackerError::parse("record is empty"));
    }
    let issue: Issue =
        serde_json::from_slice(bytes).map_err(|e| TrackerError::parse(e.to_string()))?;
    issue
        .validate()
        .map_err(|e| TrackerError::parse(e.to_string()))?;
    Ok(issue)
}

/// Serde adapters for second-precision ISO-8601 UTC timestamps.
pub mod timestamp {
    use chrono::{DateTime, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn format(value: &DateTime<Utc>) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc).trunc_subsecs(0))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(|e| {
            serde::de::Error::custom(format!("invalid timestamp '{}': {}", raw, e))
        })
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(ts) => serializer.serialize_some(&super::format(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|raw| {
                super::parse(&raw).map_err(|e| {
                    serde::de::Error::custom(format!("invalid timestamp '{}': {}", raw, e))
                })
            })
            .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IssueType, Priority, Status};
    use chrono::{TimeZone, Utc};

    fn sample() -> Issue {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut issue = Issue::new("bd-1a2b3c4d", "Fix login", created);
        issue.description = "Session cookie is dropped".to_string();
        issue.issue_type = IssueType::Bug;
        issue.priority = Priority::new(1).unwrap();
        issue.labels.insert("ui".to_string());
        issue.labels.insert("auth".to_string());
        issue.dependencies.insert("bd-00000002".to_string());
        issue.dependencies.insert("bd-00000001".to_string());
        issue.updated_at = Utc.with_ymd_and_hms(2024, 3, 2, 8, 30, 15).unwrap();
        issue
    }

    #[test]
    fn test_encode_is_canonical() {
        let text = String::from_utf8(encode(&sample()).unwrap()).unwrap();
        let expected = r#"{
  "closed_at": null,
  "closed_reason": null,
  "created_at": "2024-03-01T12:00:00Z",
  "dependencies": [
    "bd-00000001",
    "bd-00000002"
  ],
  "description": "Session cookie is dropped",
  "id": "bd-1a2b3c4d",
  "labels": [
    "auth",
    "ui"
  ],
  "priority": 1,
  "status": "open",
  "title": "Fix login",
  "type": "bug",
  "updated_at": "2024-03-02T08:30:15Z"
}
"#;
        assert_eq!(text, expected);
    }

    #[test]
    fn test_round_trip_with_empty_sets() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let issue = Issue::new("bd-empty", "Nothing attached", created);
        let decoded = decode(&encode(&issue).unwrap()).unwrap();
        assert_eq!(decoded, issue);
    }

    #[test]
    fn test_round_trip_closed_issue() {
        let mut issue = sample();
        issue.close("shipped", Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap());
        let decoded = decode(&encode(&issue).unwrap()).unwrap();
        assert_eq!(decoded, issue);
        assert_eq!(decoded.status, Status::Closed);
    }

    #[test]
    fn test_decode_accepts_key_order_and_defaults() {
        let raw = br#"{"title":"t","id":"bd-1","status":"in_progress","type":"chore",
            "priority":0,"created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00+00:00"}"#;
        let issue = decode(raw).unwrap();
        assert_eq!(issue.status, Status::InProgress);
        assert!(issue.labels.is_empty());
        assert_eq!(issue.description, "");
    }

    #[test]
    fn test_decode_rejects_missing_required_field() {
        let raw = br#"{"id":"bd-1","status":"open","type":"task","priority":2,
            "created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}"#;
        let err = decode(raw).unwrap_err();
        assert!(matches!(err, TrackerError::Parse { .. }));
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_decode_rejects_out_of_domain_values() {
        let base = String::from_utf8(encode(&sample()).unwrap()).unwrap();
        for (from, to) in [
            ("\"status\": \"open\"", "\"status\": \"done\""),
            ("\"type\": \"bug\"", "\"type\": \"story\""),
            ("\"priority\": 1", "\"priority\": 7"),
            ("\"priority\": 1", "\"priority\": \"1\""),
        ] {
            let broken = base.replace(from, to);
            assert!(
                matches!(decode(broken.as_bytes()), Err(TrackerError::Parse { .. })),
                "expected parse error for {}",
                to
            );
        }
    }

    #[test]
    fn test_decode_rejects_conflict_markers_and_empty() {
        let raw = b"<<<<<<< ours\n{}\n=======\n{}\n>>>>>>> theirs\n";
        assert!(decode(raw).is_err());
        assert!(decode(b"  \n").is_err());
    }

    #[test]
    fn test_decode_rejects_closed_without_timestamp() {
        let base = String::from_utf8(encode(&sample()).unwrap()).unwrap();
        let broken = base.replace("\"status\": \"open\"", "\"status\": \"closed\"");
        assert!(decode(broken.as_bytes()).is_err());
    }

    #[test]
    fn test_fractional_seconds_are_truncated() {
        let raw = br#"{"title":"t","id":"bd-1","status":"open","type":"task","priority":2,
            "created_at":"2024-01-01T00:00:00.750Z","updated_at":"2024-01-01T00:00:01Z"}"#;
        let issue = decode(raw).unwrap();
        let text = String::from_utf8(encode(&issue).unwrap()).unwrap();
        assert!(text.contains("\"created_at\": \"2024-01-01T00:00:00Z\""));
    }
}
