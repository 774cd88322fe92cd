//! Issue lifecycle operations: create-or-update with deduplication, sparse
//! updates, bulk resolution, and cascading deletion.
//!
//! The create flows carry the engine's core correctness property: for any set
//! of concurrent reports with the same dedup key, exactly one issue row exists
//! afterwards and every caller converges on it. Two mechanisms combine for
//! that. Write transactions are opened IMMEDIATE, so the duplicate check and
//! the subsequent write hold the database write lock together. And the UNIQUE
//! index on `issues.dedup_key` arbitrates inserts racing in from other
//! connections: locking cannot serialize writers against a row that does not
//! exist yet, the constraint can.

use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, info};

use super::links::{insert_link_in_tx, replace_links_in_tx};
use super::{SqliteStore, dedup_key, is_unique_violation, parse_state, to_micros};
use crate::domain::{Issue, IssueId, IssueState, IssueUpdate, NewIssue, ScopeUpdate};
use crate::error::{Error, Result};

/// Outcome of the conditional insert for a new dedup key.
enum InsertOutcome {
    /// The row was inserted.
    Inserted(IssueId),

    /// The unique dedup index rejected the insert: another connection created
    /// the row for this key first.
    Conflicted,
}

impl SqliteStore {
    /// Create a new issue for `report`, or update the existing record with
    /// the same dedup key, whether that record is ACTIVE or RESOLVED. A
    /// matched RESOLVED record is reopened (state ACTIVE, resolution time
    /// cleared) unless the report carries an explicit state.
    ///
    /// Safe to call concurrently from any number of threads and connections;
    /// all callers racing on one dedup key converge on a single record.
    ///
    /// Returns the record with scope, links, and both relationship directions
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if required report fields are empty, and
    /// `Error::Database` if the transaction fails; in that case nothing was
    /// committed.
    pub fn create_or_update(&self, report: &NewIssue) -> Result<Issue> {
        report.validate()?;
        let (id, updated) = self.upsert_report(report)?;

        if updated {
            info!(issue_id = %id, "Updated existing issue");
        } else {
            info!(issue_id = %id, "Created new issue");
        }

        // Reload with associations outside the write transaction.
        self.find_by_id(&id)?
            .ok_or_else(|| Error::Internal(format!("issue {id} missing after commit")))
    }

    /// Create an issue record, converging on an existing duplicate instead of
    /// creating a sibling when one is found.
    ///
    /// Identical dedup behavior to [`Self::create_or_update`]; exposed for
    /// callers whose own flow has strict create semantics.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_or_update`].
    pub fn create(&self, report: &NewIssue) -> Result<Issue> {
        self.create_or_update(report)
    }

    /// Look up an existing issue with `report`'s dedup key, ACTIVE or
    /// RESOLVED.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for malformed reports and
    /// `Error::Database` on storage failure. No duplicate is `Ok(None)`, not
    /// an error.
    pub fn find_duplicate(&self, report: &NewIssue) -> Result<Option<Issue>> {
        report.validate()?;

        let existing = {
            let conn = self.connection()?;
            let key = report_key(report);
            conn.query_row(
                "SELECT id FROM issues WHERE dedup_key = ?1",
                [&key],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        };

        match existing {
            Some(id) => {
                debug!(existing_issue_id = %id, "Found duplicate issue");
                self.find_by_id(&IssueId::new(id))
            }
            None => Ok(None),
        }
    }

    /// Apply a sparse update to an existing issue and return the updated
    /// record with associations. Only present fields change; the update
    /// timestamp is always refreshed.
    ///
    /// # Errors
    ///
    /// Returns `Error::IssueNotFound` if `id` does not exist,
    /// `Error::Conflict` if a namespace or scope change collides with another
    /// issue's dedup key, and `Error::Database` on storage failure.
    pub fn update(&self, id: &IssueId, update: &IssueUpdate) -> Result<Issue> {
        {
            let mut conn = self.connection()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            apply_update_in_tx(&tx, id, update)?;
            tx.commit()?;
        }

        info!(issue_id = %id, "Updated issue");
        self.find_by_id(id)?
            .ok_or_else(|| Error::Internal(format!("issue {id} missing after commit")))
    }

    /// Resolve every ACTIVE issue in `namespace` whose scope matches
    /// (`resource_type`, `resource_name`). Already-RESOLVED issues are left
    /// untouched; all matches share one resolution timestamp.
    ///
    /// Returns the number of issues resolved. Zero matches is success, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on storage failure.
    pub fn resolve_by_scope(
        &self,
        resource_type: &str,
        resource_name: &str,
        namespace: &str,
    ) -> Result<u64> {
        let now_us = to_micros(Self::now());

        let count = {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE issues SET state = ?1, resolved_at = ?2, updated_at = ?2
                 WHERE state = ?3 AND namespace = ?4
                   AND scope_id IN (SELECT id FROM issue_scopes
                                    WHERE resource_type = ?5 AND resource_name = ?6)",
                params![
                    IssueState::Resolved.as_str(),
                    now_us,
                    IssueState::Active.as_str(),
                    namespace,
                    resource_type,
                    resource_name
                ],
            )?
        };

        if count == 0 {
            debug!(
                resource_type,
                resource_name, namespace, "No active issues found for scope"
            );
        } else {
            info!(
                resource_type,
                resource_name, namespace, count, "Resolved issues by scope"
            );
        }

        Ok(count as u64)
    }

    /// Delete an issue and everything that hangs off it, in dependency order:
    /// relationship edges (either direction), links, the issue row, then its
    /// scope. Runs as one transaction; a failure mid-way leaves everything in
    /// place.
    ///
    /// # Errors
    ///
    /// Returns `Error::IssueNotFound` if `id` does not exist and
    /// `Error::Database` on storage failure.
    pub fn delete(&self, id: &IssueId) -> Result<()> {
        {
            let mut conn = self.connection()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let scope_id: String = tx
                .query_row(
                    "SELECT scope_id FROM issues WHERE id = ?1",
                    [id.as_str()],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| Error::IssueNotFound(id.to_string()))?;

            tx.execute(
                "DELETE FROM related_issues WHERE source_id = ?1 OR target_id = ?1",
                [id.as_str()],
            )?;
            tx.execute("DELETE FROM links WHERE issue_id = ?1", [id.as_str()])?;
            tx.execute("DELETE FROM issues WHERE id = ?1", [id.as_str()])?;
            tx.execute("DELETE FROM issue_scopes WHERE id = ?1", [&scope_id])?;

            tx.commit()?;
        }

        info!(issue_id = %id, "Deleted issue");
        Ok(())
    }

    /// Dedup-and-write for the create flows. Returns the canonical issue id
    /// and whether an existing record was updated.
    fn upsert_report(&self, report: &NewIssue) -> Result<(IssueId, bool)> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let result = match find_duplicate_in_tx(&tx, report)? {
            Some(id) => {
                apply_update_in_tx(&tx, &id, &IssueUpdate::from_report(report))?;
                (id, true)
            }
            None => match insert_issue_in_tx(&tx, report)? {
                InsertOutcome::Inserted(id) => (id, false),
                InsertOutcome::Conflicted => {
                    // The unique dedup index arbitrated a racing insert from
                    // another connection; converge on the winner's row.
                    let id = find_duplicate_in_tx(&tx, report)?.ok_or_else(|| {
                        Error::Internal("dedup key conflicted but no row matches it".into())
                    })?;
                    apply_update_in_tx(&tx, &id, &IssueUpdate::from_report(report))?;
                    (id, true)
                }
            },
        };

        tx.commit()?;
        Ok(result)
    }
}

/// Dedup key for a report, with the resource namespace defaulted.
fn report_key(report: &NewIssue) -> String {
    dedup_key(
        &report.namespace,
        report.issue_type.as_str(),
        &report.scope.resource_type,
        &report.scope.resource_name,
        report.resource_namespace(),
    )
}

/// Find the issue matching `report`'s dedup key inside `tx`.
fn find_duplicate_in_tx(tx: &Transaction<'_>, report: &NewIssue) -> Result<Option<IssueId>> {
    let key = report_key(report);
    let id = tx
        .query_row("SELECT id FROM issues WHERE dedup_key = ?1", [&key], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(id.map(IssueId::new))
}

/// Insert a fresh issue with its scope and links for `report`.
fn insert_issue_in_tx(tx: &Transaction<'_>, report: &NewIssue) -> Result<InsertOutcome> {
    let now = SqliteStore::now();
    let now_us = to_micros(now);
    let state = report.state.unwrap_or(IssueState::Active);
    let resolved_at = match state {
        IssueState::Resolved => Some(report.resolved_at.unwrap_or(now)),
        IssueState::Active => None,
    };

    let scope_id = SqliteStore::new_id();
    let issue_id = SqliteStore::new_id();

    tx.execute(
        "INSERT INTO issue_scopes (id, resource_type, resource_name, resource_namespace)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            scope_id,
            report.scope.resource_type,
            report.scope.resource_name,
            report.resource_namespace()
        ],
    )?;

    let inserted = tx.execute(
        "INSERT INTO issues (id, title, description, severity, issue_type, state, namespace,
                             detected_at, resolved_at, scope_id, dedup_key, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(dedup_key) DO NOTHING",
        params![
            issue_id,
            report.title,
            report.description,
            report.severity.as_str(),
            report.issue_type.as_str(),
            state.as_str(),
            report.namespace,
            now_us,
            resolved_at.map(to_micros),
            scope_id,
            report_key(report),
            now_us,
            now_us
        ],
    )?;

    if inserted == 0 {
        // The insert lost; drop the scope row created for it.
        tx.execute("DELETE FROM issue_scopes WHERE id = ?1", [&scope_id])?;
        return Ok(InsertOutcome::Conflicted);
    }

    let issue_id = IssueId::new(issue_id);
    for link in &report.links {
        insert_link_in_tx(tx, &issue_id, link)?;
    }

    Ok(InsertOutcome::Inserted(issue_id))
}

/// Apply `update` to the issue `id` inside `tx`.
///
/// Only present fields change; `updated_at` is always refreshed. A state
/// transition to RESOLVED records a resolution time (explicit, or now); a
/// transition to ACTIVE clears it. Supplied links replace the whole set;
/// supplied scope fields update the scope row in place, never its identity.
pub(crate) fn apply_update_in_tx(
    tx: &Transaction<'_>,
    id: &IssueId,
    update: &IssueUpdate,
) -> Result<()> {
    let (current_state, scope_id) = tx
        .query_row(
            "SELECT state, scope_id FROM issues WHERE id = ?1",
            [id.as_str()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?
        .ok_or_else(|| Error::IssueNotFound(id.to_string()))?;
    let current_state = parse_state(&current_state)?;

    let now = SqliteStore::now();
    let mut sets: Vec<&'static str> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(title) = &update.title {
        sets.push("title = ?");
        values.push(Box::new(title.clone()));
    }
    if let Some(description) = &update.description {
        sets.push("description = ?");
        values.push(Box::new(description.clone()));
    }
    if let Some(severity) = update.severity {
        sets.push("severity = ?");
        values.push(Box::new(severity.as_str()));
    }
    if let Some(issue_type) = update.issue_type {
        sets.push("issue_type = ?");
        values.push(Box::new(issue_type.as_str()));
    }
    if let Some(namespace) = &update.namespace {
        sets.push("namespace = ?");
        values.push(Box::new(namespace.clone()));
    }
    if let Some(state) = update.state {
        sets.push("state = ?");
        values.push(Box::new(state.as_str()));
        match state {
            IssueState::Resolved => {
                if current_state != IssueState::Resolved {
                    sets.push("resolved_at = ?");
                    values.push(Box::new(to_micros(update.resolved_at.unwrap_or(now))));
                } else if let Some(ts) = update.resolved_at {
                    sets.push("resolved_at = ?");
                    values.push(Box::new(to_micros(ts)));
                }
            }
            IssueState::Active => {
                sets.push("resolved_at = ?");
                values.push(Box::new(None::<i64>));
            }
        }
    }

    // The update timestamp is always refreshed.
    sets.push("updated_at = ?");
    values.push(Box::new(to_micros(now)));

    values.push(Box::new(id.as_str().to_string()));
    tx.execute(
        &format!("UPDATE issues SET {} WHERE id = ?", sets.join(", ")),
        rusqlite::params_from_iter(values.iter()),
    )?;

    if let Some(links) = &update.links {
        replace_links_in_tx(tx, id, links)?;
    }

    if let Some(scope) = &update.scope
        && !scope.is_empty()
    {
        update_scope_in_tx(tx, &scope_id, scope)?;
    }

    // A namespace or scope change moves the issue to a different dedup key.
    if update.namespace.is_some() || update.scope.as_ref().is_some_and(|s| !s.is_empty()) {
        refresh_dedup_key_in_tx(tx, id)?;
    }

    Ok(())
}

/// Update the scope row in place; the scope id and ownership never change.
fn update_scope_in_tx(tx: &Transaction<'_>, scope_id: &str, scope: &ScopeUpdate) -> Result<()> {
    let mut sets: Vec<&'static str> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(resource_type) = &scope.resource_type {
        sets.push("resource_type = ?");
        values.push(Box::new(resource_type.clone()));
    }
    if let Some(resource_name) = &scope.resource_name {
        sets.push("resource_name = ?");
        values.push(Box::new(resource_name.clone()));
    }
    if let Some(resource_namespace) = &scope.resource_namespace {
        sets.push("resource_namespace = ?");
        values.push(Box::new(resource_namespace.clone()));
    }

    values.push(Box::new(scope_id.to_string()));
    tx.execute(
        &format!("UPDATE issue_scopes SET {} WHERE id = ?", sets.join(", ")),
        rusqlite::params_from_iter(values.iter()),
    )?;
    Ok(())
}

/// Recompute the stored dedup key from the issue's current fields.
fn refresh_dedup_key_in_tx(tx: &Transaction<'_>, id: &IssueId) -> Result<()> {
    let key: String = tx.query_row(
        "SELECT i.namespace, i.issue_type, s.resource_type, s.resource_name, s.resource_namespace
         FROM issues i JOIN issue_scopes s ON i.scope_id = s.id WHERE i.id = ?1",
        [id.as_str()],
        |row| {
            Ok(dedup_key(
                &row.get::<_, String>(0)?,
                &row.get::<_, String>(1)?,
                &row.get::<_, String>(2)?,
                &row.get::<_, String>(3)?,
                &row.get::<_, String>(4)?,
            ))
        },
    )?;

    tx.execute(
        "UPDATE issues SET dedup_key = ?1 WHERE id = ?2",
        params![key, id.as_str()],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            Error::Conflict("another issue already tracks this scope".into())
        } else {
            e.into()
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewLink, NewScope, Severity};

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn report(namespace: &str, resource_name: &str) -> NewIssue {
        NewIssue {
            title: "Pipeline run failed".to_string(),
            description: "Task build-container exited 1".to_string(),
            severity: Severity::Major,
            issue_type: crate::domain::IssueType::Pipeline,
            namespace: namespace.to_string(),
            scope: NewScope {
                resource_type: "pipelinerun".to_string(),
                resource_name: resource_name.to_string(),
                resource_namespace: None,
            },
            links: vec![],
            state: None,
            resolved_at: None,
        }
    }

    #[test]
    fn create_sets_defaults() {
        let store = store();
        let issue = store.create_or_update(&report("team-a", "run-1")).unwrap();

        assert_eq!(issue.state, IssueState::Active);
        assert!(issue.resolved_at.is_none());
        assert_eq!(issue.scope.resource_namespace, "team-a");
        assert_eq!(issue.detected_at, issue.created_at);
    }

    #[test]
    fn sequential_reports_converge_on_one_record() {
        let store = store();
        let first = store.create_or_update(&report("team-a", "run-1")).unwrap();

        let mut second_report = report("team-a", "run-1");
        second_report.description = "Task build-container exited 137".to_string();
        let second = store.create_or_update(&second_report).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.description, "Task build-container exited 137");

        let conn = store.connection().unwrap();
        let issues: i64 = conn
            .query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))
            .unwrap();
        let scopes: i64 = conn
            .query_row("SELECT COUNT(*) FROM issue_scopes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(issues, 1);
        assert_eq!(scopes, 1);
    }

    #[test]
    fn matching_report_reopens_resolved_issue() {
        let store = store();
        let issue = store.create_or_update(&report("team-a", "run-1")).unwrap();

        let resolved = store
            .resolve_by_scope("pipelinerun", "run-1", "team-a")
            .unwrap();
        assert_eq!(resolved, 1);

        let reopened = store.create_or_update(&report("team-a", "run-1")).unwrap();
        assert_eq!(reopened.id, issue.id);
        assert_eq!(reopened.state, IssueState::Active);
        assert!(reopened.resolved_at.is_none());
    }

    #[test]
    fn report_with_explicit_resolved_state_stays_resolved() {
        let store = store();
        let mut r = report("team-a", "run-1");
        r.state = Some(IssueState::Resolved);

        let issue = store.create_or_update(&r).unwrap();
        assert_eq!(issue.state, IssueState::Resolved);
        assert!(issue.resolved_at.is_some());
    }

    #[test]
    fn create_stores_report_links() {
        let store = store();
        let mut r = report("team-a", "run-1");
        r.links = vec![NewLink {
            title: "logs".to_string(),
            url: "https://ci.example.com/run-1".to_string(),
        }];

        let issue = store.create_or_update(&r).unwrap();
        assert_eq!(issue.links.len(), 1);
        assert_eq!(issue.links[0].issue_id, issue.id);
    }

    #[test]
    fn update_missing_issue_is_not_found() {
        let store = store();
        let err = store
            .update(&IssueId::new("nope"), &IssueUpdate::default())
            .unwrap_err();
        assert!(matches!(err, Error::IssueNotFound(_)));
    }

    #[test]
    fn scope_change_colliding_with_other_issue_is_conflict() {
        let store = store();
        let a = store.create_or_update(&report("team-a", "run-1")).unwrap();
        let _b = store.create_or_update(&report("team-a", "run-2")).unwrap();

        // Move run-1's scope onto run-2's dedup key.
        let update = IssueUpdate {
            scope: Some(ScopeUpdate {
                resource_name: Some("run-2".to_string()),
                ..ScopeUpdate::default()
            }),
            ..IssueUpdate::default()
        };
        let err = store.update(&a.id, &update).unwrap_err();
        assert!(err.is_conflict());
    }
}
