//! Engine boundary for issue deduplication and lifecycle management.
//!
//! This module defines the interface consumed by transport layers (HTTP
//! handlers, cluster watchers) and a factory for creating engine instances.
//! The trait is object-safe, allowing dynamic dispatch via
//! `Box<dyn IssueEngine>`.
//!
//! # Method Categories
//!
//! - **Create flows**: `create_or_update`, `create`, `find_duplicate`
//! - **Queries**: `find_by_id`, `find_all`
//! - **Lifecycle**: `update`, `delete`, `resolve_by_scope`
//! - **Relationships**: `add_related_issue`, `remove_related_issue`
//!
//! # Concurrency
//!
//! Implementations must be `Send + Sync` and safe to call from any number of
//! tasks; every call is one logical transaction, and no transaction is held
//! across an await point controlled by the caller. Cancellation and timeouts
//! belong to the caller (e.g. `tokio::time::timeout` around a call); an
//! aborted operation leaves stored state unchanged.
//!
//! # Example
//!
//! ```no_run
//! use keel::domain::{IssueType, NewIssue, NewScope, Severity};
//! use keel::engine::{EngineBackend, create_engine};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> keel::Result<()> {
//!     let engine = create_engine(&EngineBackend::InMemory)?;
//!
//!     let report = NewIssue {
//!         title: "Pipeline run failed".to_string(),
//!         description: "Task build-container exited 1".to_string(),
//!         severity: Severity::Major,
//!         issue_type: IssueType::Pipeline,
//!         namespace: "team-alpha".to_string(),
//!         scope: NewScope {
//!             resource_type: "pipelinerun".to_string(),
//!             resource_name: "build-1".to_string(),
//!             resource_namespace: None,
//!         },
//!         links: vec![],
//!         state: None,
//!         resolved_at: None,
//!     };
//!
//!     let issue = engine.create_or_update(report).await?;
//!     println!("tracking issue {}", issue.id);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::{Issue, IssueFilter, IssueId, IssueUpdate, NewIssue};
use crate::error::Result;
use crate::store::SqliteStore;

/// Core engine trait for issue deduplication and lifecycle management.
#[async_trait]
pub trait IssueEngine: Send + Sync {
    /// Create a new issue for the report, or update the existing record with
    /// the same dedup key (ACTIVE or RESOLVED). All concurrent callers with
    /// one dedup key converge on a single record.
    ///
    /// Returns the record with scope, links, and both relationship
    /// directions loaded.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for malformed reports and
    /// `Error::Database` when the transaction fails (nothing is committed).
    async fn create_or_update(&self, report: NewIssue) -> Result<Issue>;

    /// Create an issue record with the same dedup behavior as
    /// [`Self::create_or_update`], for callers wanting strict create
    /// semantics in their own flow.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_or_update`].
    async fn create(&self, report: NewIssue) -> Result<Issue>;

    /// Find the existing issue matching the report's dedup key, if any.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for malformed reports; no match is
    /// `Ok(None)`, not an error.
    async fn find_duplicate(&self, report: NewIssue) -> Result<Option<Issue>>;

    /// Get an issue by ID with all associations loaded.
    ///
    /// Returns `Ok(None)` if the issue doesn't exist.
    async fn find_by_id(&self, id: &IssueId) -> Result<Option<Issue>>;

    /// List issues matching the filter, ordered by detection time descending.
    ///
    /// Returns the page and the total match count independent of pagination.
    async fn find_all(&self, filter: &IssueFilter) -> Result<(Vec<Issue>, u64)>;

    /// Apply a sparse update: only fields present in `update` are modified,
    /// and the update timestamp is always refreshed.
    ///
    /// # Errors
    ///
    /// Returns `Error::IssueNotFound` if the issue doesn't exist and
    /// `Error::Conflict` if a namespace or scope change collides with
    /// another issue's dedup key.
    async fn update(&self, id: &IssueId, update: IssueUpdate) -> Result<Issue>;

    /// Delete an issue together with its links, incident relationship edges,
    /// and scope, as one transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::IssueNotFound` if the issue doesn't exist.
    async fn delete(&self, id: &IssueId) -> Result<()>;

    /// Resolve all ACTIVE issues in `namespace` whose scope matches
    /// (`resource_type`, `resource_name`), returning how many were resolved.
    /// Zero matches is success with count 0.
    async fn resolve_by_scope(
        &self,
        resource_type: &str,
        resource_name: &str,
        namespace: &str,
    ) -> Result<u64>;

    /// Create a relationship edge between two issues. Edges are unique
    /// irrespective of direction.
    ///
    /// # Errors
    ///
    /// Returns `Error::Conflict` if either issue is missing, the edge would
    /// be a self-edge, or an edge already exists between the pair.
    async fn add_related_issue(&self, source: &IssueId, target: &IssueId) -> Result<()>;

    /// Remove the relationship edge between two issues, matching either
    /// direction.
    ///
    /// # Errors
    ///
    /// Returns `Error::Conflict` if no edge exists between the pair.
    async fn remove_related_issue(&self, source: &IssueId, target: &IssueId) -> Result<()>;
}

/// Engine backend configuration.
///
/// Determines which storage the engine runs on.
#[derive(Debug, Clone)]
pub enum EngineBackend {
    /// Ephemeral in-memory database (tests, previews)
    InMemory,

    /// SQLite database file (persistent)
    Sqlite(PathBuf),
}

/// Create an engine instance for the given backend.
///
/// The returned trait object can be shared across tasks and used
/// polymorphically regardless of the backend.
///
/// # Errors
///
/// Returns `Error::Io` or `Error::Database` when the backing database cannot
/// be opened or initialized.
pub fn create_engine(backend: &EngineBackend) -> Result<Box<dyn IssueEngine>> {
    match backend {
        EngineBackend::InMemory => Ok(Box::new(SqliteStore::open_in_memory()?)),
        EngineBackend::Sqlite(path) => Ok(Box::new(SqliteStore::open(path)?)),
    }
}
