//! [`IssueEngine`] implementation for [`SqliteStore`].
//!
//! Operations run synchronously on the store's connection; the store never
//! holds its lock or an open transaction across an await point.

use async_trait::async_trait;

use super::SqliteStore;
use crate::domain::{Issue, IssueFilter, IssueId, IssueUpdate, NewIssue};
use crate::engine::IssueEngine;
use crate::error::Result;

#[async_trait]
impl IssueEngine for SqliteStore {
    async fn create_or_update(&self, report: NewIssue) -> Result<Issue> {
        SqliteStore::create_or_update(self, &report)
    }

    async fn create(&self, report: NewIssue) -> Result<Issue> {
        SqliteStore::create(self, &report)
    }

    async fn find_duplicate(&self, report: NewIssue) -> Result<Option<Issue>> {
        SqliteStore::find_duplicate(self, &report)
    }

    async fn find_by_id(&self, id: &IssueId) -> Result<Option<Issue>> {
        SqliteStore::find_by_id(self, id)
    }

    async fn find_all(&self, filter: &IssueFilter) -> Result<(Vec<Issue>, u64)> {
        SqliteStore::find_all(self, filter)
    }

    async fn update(&self, id: &IssueId, update: IssueUpdate) -> Result<Issue> {
        SqliteStore::update(self, id, &update)
    }

    async fn delete(&self, id: &IssueId) -> Result<()> {
        SqliteStore::delete(self, id)
    }

    async fn resolve_by_scope(
        &self,
        resource_type: &str,
        resource_name: &str,
        namespace: &str,
    ) -> Result<u64> {
        SqliteStore::resolve_by_scope(self, resource_type, resource_name, namespace)
    }

    async fn add_related_issue(&self, source: &IssueId, target: &IssueId) -> Result<()> {
        SqliteStore::add_related_issue(self, source, target)
    }

    async fn remove_related_issue(&self, source: &IssueId, target: &IssueId) -> Result<()> {
        SqliteStore::remove_related_issue(self, source, target)
    }
}
