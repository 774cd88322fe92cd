//! Database schema definition for the keel store.

/// Database schema definition.
///
/// `issues.dedup_key` stores the joined dedup fields (namespace, issue type,
/// scope triple); its UNIQUE index is what arbitrates concurrent first-time
/// creation for a key.
pub(crate) const SCHEMA: &str = r"
-- Resource scopes; exactly one per issue, owned by it
CREATE TABLE IF NOT EXISTS issue_scopes (
    id TEXT PRIMARY KEY,
    resource_type TEXT NOT NULL,
    resource_name TEXT NOT NULL,
    resource_namespace TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scopes_resource ON issue_scopes(resource_type, resource_name);

-- Canonical problem records
CREATE TABLE IF NOT EXISTS issues (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    severity TEXT NOT NULL,
    issue_type TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'ACTIVE',
    namespace TEXT NOT NULL,
    detected_at INTEGER NOT NULL,       -- unix microseconds
    resolved_at INTEGER,                -- unix microseconds, NULL while ACTIVE
    scope_id TEXT NOT NULL UNIQUE REFERENCES issue_scopes(id),
    dedup_key TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_issues_namespace ON issues(namespace);
CREATE INDEX IF NOT EXISTS idx_issues_state ON issues(state);
CREATE INDEX IF NOT EXISTS idx_issues_detected_at ON issues(detected_at);

-- Titled URLs owned by one issue; replaced as a set on update
CREATE TABLE IF NOT EXISTS links (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    issue_id TEXT NOT NULL REFERENCES issues(id)
);

CREATE INDEX IF NOT EXISTS idx_links_issue ON links(issue_id);

-- Relationship edges, stored directed but unique irrespective of direction.
-- The UNIQUE constraint backs the stored ordering; the reversed ordering is
-- checked before insert.
CREATE TABLE IF NOT EXISTS related_issues (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES issues(id),
    target_id TEXT NOT NULL REFERENCES issues(id),
    UNIQUE (source_id, target_id)
);

CREATE INDEX IF NOT EXISTS idx_related_source ON related_issues(source_id);
CREATE INDEX IF NOT EXISTS idx_related_target ON related_issues(target_id);
";
