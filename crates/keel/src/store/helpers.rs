//! Helper functions for database row conversion and parsing.
//!
//! These utilities convert between database representations and domain types.
//! Also provides SQL column list constants to reduce duplication across query
//! modules.

use chrono::{DateTime, Utc};

use crate::domain::{
    Issue, IssueId, IssueScope, IssueState, IssueSummary, IssueType, Link, RelatedIssue, Severity,
};

/// SQL column list for an issue joined with its scope.
///
/// Use with [`row_to_issue`]; expects the issues table aliased `i` and the
/// issue_scopes table aliased `s`.
pub(crate) const ISSUE_COLUMNS: &str =
    "i.id, i.title, i.description, i.severity, i.issue_type, i.state, i.namespace, \
     i.detected_at, i.resolved_at, i.created_at, i.updated_at, \
     s.id, s.resource_type, s.resource_name, s.resource_namespace";

/// SQL column list for a relationship edge joined with the counterpart issue
/// and its scope.
///
/// Use with [`row_to_related`]; expects the related_issues table aliased `r`,
/// the counterpart issue aliased `o`, and its scope aliased `s`.
pub(crate) const RELATED_COLUMNS: &str =
    "r.id, r.source_id, r.target_id, \
     o.id, o.title, o.severity, o.issue_type, o.state, o.namespace, \
     s.id, s.resource_type, s.resource_name, s.resource_namespace";

/// SQL column list for the links table.
pub(crate) const LINK_COLUMNS: &str = "id, title, url, issue_id";

/// Parse a severity string from the database.
///
/// Returns an error for unrecognized values, indicating possible database
/// corruption.
pub(crate) fn parse_severity(s: &str) -> rusqlite::Result<Severity> {
    match s {
        "info" => Ok(Severity::Info),
        "minor" => Ok(Severity::Minor),
        "major" => Ok(Severity::Major),
        "critical" => Ok(Severity::Critical),
        unknown => Err(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("Unknown severity '{unknown}' in database. Database may be corrupted or from a newer version.").into(),
        )),
    }
}

/// Parse an issue type string from the database.
///
/// Returns an error for unrecognized values, indicating possible database
/// corruption.
pub(crate) fn parse_issue_type(s: &str) -> rusqlite::Result<IssueType> {
    match s {
        "build" => Ok(IssueType::Build),
        "test" => Ok(IssueType::Test),
        "release" => Ok(IssueType::Release),
        "dependency" => Ok(IssueType::Dependency),
        "pipeline" => Ok(IssueType::Pipeline),
        unknown => Err(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("Unknown issue type '{unknown}' in database. Database may be corrupted or from a newer version.").into(),
        )),
    }
}

/// Parse a lifecycle state string from the database.
///
/// Returns an error for unrecognized values, indicating possible database
/// corruption.
pub(crate) fn parse_state(s: &str) -> rusqlite::Result<IssueState> {
    match s {
        "ACTIVE" => Ok(IssueState::Active),
        "RESOLVED" => Ok(IssueState::Resolved),
        unknown => Err(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("Unknown issue state '{unknown}' in database. Database may be corrupted or from a newer version.").into(),
        )),
    }
}

/// Convert a timestamp to the integer microsecond form stored in the database.
pub(crate) fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Convert stored integer microseconds back to a timestamp.
pub(crate) fn micros_to_ts(us: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Integer,
            format!("Timestamp {us} out of range").into(),
        )
    })
}

/// Stored dedup key for an issue: the five identity fields joined with the
/// unit separator so field boundaries stay unambiguous.
pub(crate) fn dedup_key(
    namespace: &str,
    issue_type: &str,
    resource_type: &str,
    resource_name: &str,
    resource_namespace: &str,
) -> String {
    format!(
        "{namespace}\u{1f}{issue_type}\u{1f}{resource_type}\u{1f}{resource_name}\u{1f}{resource_namespace}"
    )
}

/// Returns `true` when the error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Convert a database row to an [`Issue`] with its scope.
///
/// Expected columns: [`ISSUE_COLUMNS`]. Links and relationship edges are
/// loaded separately by the caller.
pub(crate) fn row_to_issue(row: &rusqlite::Row) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: IssueId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        severity: parse_severity(&row.get::<_, String>(3)?)?,
        issue_type: parse_issue_type(&row.get::<_, String>(4)?)?,
        state: parse_state(&row.get::<_, String>(5)?)?,
        namespace: row.get(6)?,
        detected_at: micros_to_ts(row.get(7)?)?,
        resolved_at: row.get::<_, Option<i64>>(8)?.map(micros_to_ts).transpose()?,
        created_at: micros_to_ts(row.get(9)?)?,
        updated_at: micros_to_ts(row.get(10)?)?,
        scope: IssueScope {
            id: row.get(11)?,
            resource_type: row.get(12)?,
            resource_name: row.get(13)?,
            resource_namespace: row.get(14)?,
        },
        links: Vec::new(),
        related_from: Vec::new(),
        related_to: Vec::new(),
    })
}

/// Convert a database row to a [`Link`].
///
/// Expected columns: [`LINK_COLUMNS`].
pub(crate) fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<Link> {
    Ok(Link {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        issue_id: IssueId::new(row.get::<_, String>(3)?),
    })
}

/// Convert a database row to a [`RelatedIssue`] edge with the counterpart
/// issue summary.
///
/// Expected columns: [`RELATED_COLUMNS`].
pub(crate) fn row_to_related(row: &rusqlite::Row) -> rusqlite::Result<RelatedIssue> {
    Ok(RelatedIssue {
        id: row.get(0)?,
        source_id: IssueId::new(row.get::<_, String>(1)?),
        target_id: IssueId::new(row.get::<_, String>(2)?),
        issue: IssueSummary {
            id: IssueId::new(row.get::<_, String>(3)?),
            title: row.get(4)?,
            severity: parse_severity(&row.get::<_, String>(5)?)?,
            issue_type: parse_issue_type(&row.get::<_, String>(6)?)?,
            state: parse_state(&row.get::<_, String>(7)?)?,
            namespace: row.get(8)?,
            scope: IssueScope {
                id: row.get(9)?,
                resource_type: row.get(10)?,
                resource_name: row.get(11)?,
                resource_namespace: row.get(12)?,
            },
        },
    })
}
