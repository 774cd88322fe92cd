//! # Keel: issue deduplication and lifecycle engine
//!
//! Keel tracks issues, structured records of problems detected in external
//! resources (pipeline runs, releases, dependency scans), and guarantees
//! that repeated reports of the same underlying problem converge onto a
//! single record instead of piling up duplicates. Records can be reopened,
//! updated, resolved in bulk, and linked to other issues.
//!
//! ## Design Philosophy
//!
//! - **Converge, don't duplicate** - reports are keyed by (namespace, issue
//!   type, resource scope); a unique index on that key lets the database
//!   arbitrate concurrent first reports, so exactly one record exists per key
//! - **Transactional lifecycle** - create-or-update, bulk resolution, and
//!   cascading deletion each run as a single transaction; nothing partially
//!   commits
//! - **Embeddable** - library first; HTTP routing, authorization, and the
//!   watchers that decide *when* something is broken live in the callers
//!
//! ## Quick Start
//!
//! ```no_run
//! use keel::domain::{IssueType, NewIssue, NewScope, Severity};
//! use keel::store::SqliteStore;
//! use std::path::Path;
//!
//! # fn main() -> keel::Result<()> {
//! let store = SqliteStore::open(Path::new("keel.db"))?;
//!
//! let report = NewIssue {
//!     title: "Pipeline run failed".to_string(),
//!     description: "Task build-container exited 1".to_string(),
//!     severity: Severity::Major,
//!     issue_type: IssueType::Pipeline,
//!     namespace: "team-alpha".to_string(),
//!     scope: NewScope {
//!         resource_type: "pipelinerun".to_string(),
//!         resource_name: "build-1".to_string(),
//!         resource_namespace: None,
//!     },
//!     links: vec![],
//!     state: None,
//!     resolved_at: None,
//! };
//!
//! // First report creates the record; identical-key reports update it.
//! let issue = store.create_or_update(&report)?;
//! let again = store.create_or_update(&report)?;
//! assert_eq!(issue.id, again.id);
//!
//! // When the pipeline recovers, clear everything it was blamed for.
//! let resolved = store.resolve_by_scope("pipelinerun", "build-1", "team-alpha")?;
//! println!("resolved {resolved} issue(s)");
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod engine;
pub mod error;
pub mod store;

pub use engine::{EngineBackend, IssueEngine, create_engine};
pub use error::{Error, Result};
pub use store::SqliteStore;
