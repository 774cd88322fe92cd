//! Filtered retrieval with scope, link, and relationship associations.

use rusqlite::{Connection, OptionalExtension, ToSql, params_from_iter};

use super::links::links_for_issue;
use super::related::{edges_from_issue, edges_to_issue};
use super::{ISSUE_COLUMNS, SqliteStore, row_to_issue};
use crate::domain::{Issue, IssueFilter, IssueId};
use crate::error::Result;

/// Page size used when the filter does not set one.
const DEFAULT_LIMIT: u32 = 50;

impl SqliteStore {
    /// Load one issue with its scope, links, and both relationship
    /// directions (each edge carrying the counterpart issue and its scope).
    ///
    /// Returns `Ok(None)` for an unknown id.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on storage failure.
    pub fn find_by_id(&self, id: &IssueId) -> Result<Option<Issue>> {
        let conn = self.connection()?;

        let issue = conn
            .query_row(
                &format!(
                    "SELECT {ISSUE_COLUMNS} FROM issues i
                     JOIN issue_scopes s ON i.scope_id = s.id
                     WHERE i.id = ?1"
                ),
                [id.as_str()],
                row_to_issue,
            )
            .optional()?;

        let Some(mut issue) = issue else {
            return Ok(None);
        };
        load_associations(&conn, &mut issue)?;
        Ok(Some(issue))
    }

    /// Filtered, paginated listing ordered by detection time, newest first.
    ///
    /// Filters are independently optional and combined with AND. Returns the
    /// requested page and the total match count independent of pagination.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on storage failure.
    pub fn find_all(&self, filter: &IssueFilter) -> Result<(Vec<Issue>, u64)> {
        let conn = self.connection()?;

        let mut clauses: Vec<&'static str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(namespace) = &filter.namespace {
            clauses.push("i.namespace = ?");
            values.push(Box::new(namespace.clone()));
        }
        if let Some(severity) = filter.severity {
            clauses.push("i.severity = ?");
            values.push(Box::new(severity.as_str()));
        }
        if let Some(issue_type) = filter.issue_type {
            clauses.push("i.issue_type = ?");
            values.push(Box::new(issue_type.as_str()));
        }
        if let Some(state) = filter.state {
            clauses.push("i.state = ?");
            values.push(Box::new(state.as_str()));
        }
        if let Some(resource_type) = &filter.resource_type {
            clauses.push("s.resource_type = ?");
            values.push(Box::new(resource_type.clone()));
        }
        if let Some(resource_name) = &filter.resource_name {
            clauses.push("s.resource_name = ?");
            values.push(Box::new(resource_name.clone()));
        }
        if let Some(search) = &filter.search {
            clauses.push("(LOWER(i.title) LIKE LOWER(?) OR LOWER(i.description) LIKE LOWER(?))");
            let pattern = format!("%{search}%");
            values.push(Box::new(pattern.clone()));
            values.push(Box::new(pattern));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let from_sql = "FROM issues i JOIN issue_scopes s ON i.scope_id = s.id";

        // Total count for pagination, independent of the page returned.
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) {from_sql}{where_sql}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let limit = i64::from(filter.limit.unwrap_or(DEFAULT_LIMIT));
        let offset = i64::from(filter.offset.unwrap_or(0));
        values.push(Box::new(limit));
        values.push(Box::new(offset));

        let mut stmt = conn.prepare(&format!(
            "SELECT {ISSUE_COLUMNS} {from_sql}{where_sql}
             ORDER BY i.detected_at DESC LIMIT ? OFFSET ?"
        ))?;
        let mut issues = stmt
            .query_map(params_from_iter(values.iter()), row_to_issue)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for issue in &mut issues {
            load_associations(&conn, issue)?;
        }

        // COUNT(*) is non-negative
        #[allow(clippy::cast_sign_loss)]
        let total = total as u64;
        Ok((issues, total))
    }
}

/// Fill in the links and both relationship directions for `issue`.
fn load_associations(conn: &Connection, issue: &mut Issue) -> Result<()> {
    issue.links = links_for_issue(conn, &issue.id)?;
    issue.related_from = edges_from_issue(conn, &issue.id)?;
    issue.related_to = edges_to_issue(conn, &issue.id)?;
    Ok(())
}
