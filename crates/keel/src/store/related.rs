//! Relationship edge operations for the keel store.
//!
//! Edges are stored directed (source → target) but treated as undirected for
//! uniqueness: an edge between the same pair in either direction counts as a
//! duplicate, and removal matches either direction.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::info;

use super::{RELATED_COLUMNS, SqliteStore, row_to_related};
use crate::domain::{IssueId, RelatedIssue};
use crate::error::{Error, Result};

impl SqliteStore {
    /// Create a relationship edge between two issues.
    ///
    /// # Errors
    ///
    /// Returns `Error::Conflict` when either issue does not exist, when the
    /// edge would relate an issue to itself, or when an edge between the pair
    /// already exists in either direction. Returns `Error::Database` on
    /// storage failure.
    pub fn add_related_issue(&self, source: &IssueId, target: &IssueId) -> Result<()> {
        if source == target {
            return Err(Error::Conflict(
                "cannot relate an issue to itself".to_string(),
            ));
        }

        {
            let mut conn = self.connection()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            for id in [source, target] {
                let exists: Option<i64> = tx
                    .query_row("SELECT 1 FROM issues WHERE id = ?1", [id.as_str()], |row| {
                        row.get(0)
                    })
                    .optional()?;
                if exists.is_none() {
                    return Err(Error::Conflict(format!("issue {id} does not exist")));
                }
            }

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM related_issues
                     WHERE (source_id = ?1 AND target_id = ?2)
                        OR (source_id = ?2 AND target_id = ?1)",
                    params![source.as_str(), target.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Err(Error::Conflict("relationship already exists".to_string()));
            }

            tx.execute(
                "INSERT INTO related_issues (id, source_id, target_id) VALUES (?1, ?2, ?3)",
                params![Self::new_id(), source.as_str(), target.as_str()],
            )?;
            tx.commit()?;
        }

        info!(source_id = %source, target_id = %target, "Added related issue");
        Ok(())
    }

    /// Remove the relationship edge between two issues, matching either
    /// direction.
    ///
    /// # Errors
    ///
    /// Returns `Error::Conflict` when no edge exists between the pair and
    /// `Error::Database` on storage failure.
    pub fn remove_related_issue(&self, source: &IssueId, target: &IssueId) -> Result<()> {
        let removed = {
            let conn = self.connection()?;
            conn.execute(
                "DELETE FROM related_issues
                 WHERE (source_id = ?1 AND target_id = ?2)
                    OR (source_id = ?2 AND target_id = ?1)",
                params![source.as_str(), target.as_str()],
            )?
        };

        if removed == 0 {
            return Err(Error::Conflict("relationship not found".to_string()));
        }

        info!(source_id = %source, target_id = %target, "Removed related issue");
        Ok(())
    }
}

/// Load the edges where `issue_id` is the source, with each target issue and
/// its scope.
pub(crate) fn edges_from_issue(conn: &Connection, issue_id: &IssueId) -> Result<Vec<RelatedIssue>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RELATED_COLUMNS} FROM related_issues r
         JOIN issues o ON o.id = r.target_id
         JOIN issue_scopes s ON s.id = o.scope_id
         WHERE r.source_id = ?1 ORDER BY r.rowid"
    ))?;

    let edges = stmt
        .query_map([issue_id.as_str()], row_to_related)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(edges)
}

/// Load the edges where `issue_id` is the target, with each source issue and
/// its scope.
pub(crate) fn edges_to_issue(conn: &Connection, issue_id: &IssueId) -> Result<Vec<RelatedIssue>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RELATED_COLUMNS} FROM related_issues r
         JOIN issues o ON o.id = r.source_id
         JOIN issue_scopes s ON s.id = o.scope_id
         WHERE r.target_id = ?1 ORDER BY r.rowid"
    ))?;

    let edges = stmt
        .query_map([issue_id.as_str()], row_to_related)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(edges)
}
