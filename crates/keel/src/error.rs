//! Error types for keel operations.
//!
//! Errors fall into two broad groups:
//!
//! - **Caller errors**: the request itself is at fault (validation failures,
//!   conflicts with existing records, lookups that require an existing issue).
//!   These are rejected without touching storage, or abort the transaction
//!   before anything is written.
//! - **Storage errors**: the underlying database or filesystem failed. The
//!   transaction in flight is rolled back and nothing is partially committed.
//!
//! Read operations do not treat a miss as an error; `find_by_id` and
//! `find_duplicate` return `Ok(None)` instead.

use thiserror::Error;

/// Result type for keel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for keel operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed (creating the database directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation requires an issue that does not exist.
    #[error("issue not found: {0}")]
    IssueNotFound(String),

    /// Required report fields are missing or malformed. Raised before any
    /// transaction starts.
    #[error("validation error: {0}")]
    Validation(String),

    /// The request contradicts existing records: a duplicate relationship
    /// edge, a missing relationship endpoint, removal of a nonexistent edge,
    /// or a scope change that collides with another issue's dedup key.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Engine invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns `true` if the error was caused by the request rather than the
    /// storage layer.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::IssueNotFound(_) | Self::Validation(_) | Self::Conflict(_)
        )
    }

    /// Returns `true` if the error originated in storage or engine internals.
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        !self.is_caller_error()
    }

    /// Returns `true` for validation failures.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns `true` for conflicts with existing records.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
