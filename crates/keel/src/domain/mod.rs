//! Domain types for the keel issue engine.
//!
//! An [`Issue`] is the canonical record of a problem detected in an external
//! resource. Its [`IssueScope`] identifies what the problem is about, and the
//! tuple (namespace, issue type, scope) forms the dedup key: at most one issue
//! exists per key, whether ACTIVE or RESOLVED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Unique identifier for an issue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueId(pub String);

impl IssueId {
    /// Create a new issue ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IssueId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IssueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Severity of an issue, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational only
    Info,

    /// Minor problem, no action required
    Minor,

    /// Significant problem, action recommended
    Major,

    /// Blocking problem, action required
    Critical,
}

impl Severity {
    /// Stable string form, as persisted and serialized.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }
}

/// Kind of problem an issue describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    /// Build failure
    Build,

    /// Test failure
    Test,

    /// Release failure
    Release,

    /// Dependency problem (e.g. vulnerable or outdated dependency)
    Dependency,

    /// Pipeline failure
    Pipeline,
}

impl IssueType {
    /// Stable string form, as persisted and serialized.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Test => "test",
            Self::Release => "release",
            Self::Dependency => "dependency",
            Self::Pipeline => "pipeline",
        }
    }
}

/// Lifecycle state of an issue.
///
/// RESOLVED records are kept for history (with their resolution time) rather
/// than deleted, and a later report with the same dedup key reopens them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueState {
    /// The problem is currently present
    Active,

    /// The problem has cleared
    Resolved,
}

impl IssueState {
    /// Stable string form, as persisted and serialized.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Resolved => "RESOLVED",
        }
    }
}

/// Identification of the affected resource an issue is about.
///
/// Owned 1:1 by its issue; created and destroyed with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueScope {
    /// Unique identifier for the scope row
    pub id: String,

    /// Kind of resource, free-form (e.g. "component", "pipelinerun")
    pub resource_type: String,

    /// Name of the resource
    pub resource_name: String,

    /// Namespace where the resource lives
    pub resource_namespace: String,
}

/// A titled URL attached to an issue.
///
/// Owned exclusively by one issue; the whole set is replaced on update and
/// deleted with the issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Unique identifier for the link row
    pub id: String,

    /// Display title
    pub title: String,

    /// Target URL
    pub url: String,

    /// Owning issue
    pub issue_id: IssueId,
}

/// Compact form of an issue carried on relationship edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSummary {
    /// Issue identifier
    pub id: IssueId,

    /// Issue title
    pub title: String,

    /// Severity
    pub severity: Severity,

    /// Issue type
    pub issue_type: IssueType,

    /// Lifecycle state
    pub state: IssueState,

    /// Tenant namespace
    pub namespace: String,

    /// The issue's scope
    pub scope: IssueScope,
}

/// A relationship edge incident to an issue.
///
/// Edges are stored directed (source → target) but unique irrespective of
/// direction: a second edge between the same pair, in either order, is
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedIssue {
    /// Unique identifier for the edge row
    pub id: String,

    /// Source end of the edge
    pub source_id: IssueId,

    /// Target end of the edge
    pub target_id: IssueId,

    /// The issue on the other end of the edge, with its own scope
    pub issue: IssueSummary,
}

/// The canonical record of a problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Unique identifier
    pub id: IssueId,

    /// Issue title
    pub title: String,

    /// Issue description
    pub description: String,

    /// Severity
    pub severity: Severity,

    /// Issue type
    pub issue_type: IssueType,

    /// Lifecycle state
    pub state: IssueState,

    /// Tenant namespace the issue belongs to
    pub namespace: String,

    /// When the problem was first detected
    pub detected_at: DateTime<Utc>,

    /// When the problem was resolved; set iff the issue has transitioned to
    /// RESOLVED, cleared again when it is reopened
    pub resolved_at: Option<DateTime<Utc>>,

    /// The affected resource (exactly one per issue)
    pub scope: IssueScope,

    /// Attached links
    pub links: Vec<Link>,

    /// Edges where this issue is the source
    pub related_from: Vec<RelatedIssue>,

    /// Edges where this issue is the target
    pub related_to: Vec<RelatedIssue>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Scope fields of an incoming report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScope {
    /// Kind of resource (e.g. "pipelinerun")
    pub resource_type: String,

    /// Name of the resource
    pub resource_name: String,

    /// Namespace of the resource; defaults to the issue namespace when absent
    pub resource_namespace: Option<String>,
}

/// A link carried on a report or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    /// Display title
    pub title: String,

    /// Target URL
    pub url: String,
}

/// An incoming report of a problem; input to the create flows.
#[derive(Debug, Clone)]
pub struct NewIssue {
    /// Issue title
    pub title: String,

    /// Issue description
    pub description: String,

    /// Severity
    pub severity: Severity,

    /// Issue type
    pub issue_type: IssueType,

    /// Tenant namespace
    pub namespace: String,

    /// The affected resource
    pub scope: NewScope,

    /// Links to attach
    pub links: Vec<NewLink>,

    /// Explicit lifecycle state; ACTIVE when absent
    pub state: Option<IssueState>,

    /// Explicit resolution time, for reports arriving already resolved
    pub resolved_at: Option<DateTime<Utc>>,
}

impl NewIssue {
    /// Check required report fields. Runs before any transaction starts.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` when the title, namespace, or scope
    /// resource type/name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".into()));
        }
        if self.namespace.trim().is_empty() {
            return Err(Error::Validation("namespace must not be empty".into()));
        }
        if self.scope.resource_type.trim().is_empty() {
            return Err(Error::Validation(
                "scope resource_type must not be empty".into(),
            ));
        }
        if self.scope.resource_name.trim().is_empty() {
            return Err(Error::Validation(
                "scope resource_name must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Effective resource namespace: the explicit one, or the issue namespace.
    #[must_use]
    pub fn resource_namespace(&self) -> &str {
        self.scope
            .resource_namespace
            .as_deref()
            .unwrap_or(&self.namespace)
    }
}

/// Scope fields of a sparse update; only `Some` fields change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeUpdate {
    /// New resource type (if updating)
    pub resource_type: Option<String>,

    /// New resource name (if updating)
    pub resource_name: Option<String>,

    /// New resource namespace (if updating)
    pub resource_namespace: Option<String>,
}

impl ScopeUpdate {
    /// `true` when no scope field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resource_type.is_none()
            && self.resource_name.is_none()
            && self.resource_namespace.is_none()
    }
}

/// Sparse update payload: only fields wrapped in `Some` are applied, so an
/// absent field and a field the caller wants cleared are never confused.
/// The update timestamp is always refreshed.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    /// New title (if updating)
    pub title: Option<String>,

    /// New description (if updating)
    pub description: Option<String>,

    /// New severity (if updating)
    pub severity: Option<Severity>,

    /// New issue type (if updating)
    pub issue_type: Option<IssueType>,

    /// New namespace (if updating)
    pub namespace: Option<String>,

    /// New lifecycle state (if updating). A transition to RESOLVED sets the
    /// resolution time; a transition to ACTIVE clears it.
    pub state: Option<IssueState>,

    /// Explicit resolution time to record with a RESOLVED state
    pub resolved_at: Option<DateTime<Utc>>,

    /// Full replacement for the link set (no merge)
    pub links: Option<Vec<NewLink>>,

    /// In-place update of the issue's scope row
    pub scope: Option<ScopeUpdate>,
}

impl IssueUpdate {
    /// The update equivalent to re-applying `report` to a matched record.
    ///
    /// Used by the create flows when the dedup key matches an existing issue:
    /// the report's fields overwrite the record's, links are replaced only
    /// when the report carries any, and the state defaults to ACTIVE so a
    /// RESOLVED record is reopened by a fresh report.
    #[must_use]
    pub fn from_report(report: &NewIssue) -> Self {
        Self {
            title: Some(report.title.clone()),
            description: Some(report.description.clone()),
            severity: Some(report.severity),
            issue_type: Some(report.issue_type),
            namespace: Some(report.namespace.clone()),
            state: Some(report.state.unwrap_or(IssueState::Active)),
            resolved_at: report.resolved_at,
            links: if report.links.is_empty() {
                None
            } else {
                Some(report.links.clone())
            },
            scope: Some(ScopeUpdate {
                resource_type: Some(report.scope.resource_type.clone()),
                resource_name: Some(report.scope.resource_name.clone()),
                resource_namespace: Some(report.resource_namespace().to_string()),
            }),
        }
    }
}

/// Filter for querying issues. Filters are independently optional and
/// combined with AND.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    /// Filter by namespace
    pub namespace: Option<String>,

    /// Filter by severity
    pub severity: Option<Severity>,

    /// Filter by issue type
    pub issue_type: Option<IssueType>,

    /// Filter by lifecycle state
    pub state: Option<IssueState>,

    /// Filter by scope resource type
    pub resource_type: Option<String>,

    /// Filter by scope resource name
    pub resource_name: Option<String>,

    /// Case-insensitive substring match against title or description
    pub search: Option<String>,

    /// Page size (defaults to 50)
    pub limit: Option<u32>,

    /// Page offset (defaults to 0)
    pub offset: Option<u32>,
}
