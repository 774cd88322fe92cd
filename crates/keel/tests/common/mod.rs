//! Common test utilities shared across integration tests.

// Not every test binary uses every helper.
#![allow(dead_code)]

use keel::domain::{IssueType, NewIssue, NewLink, NewScope, Severity};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Initialize test logging once per binary; honours `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A pipeline-failure report scoped to (`resource_type`, `resource_name`) in
/// `namespace`.
pub fn report(namespace: &str, resource_type: &str, resource_name: &str) -> NewIssue {
    report_with_type(namespace, resource_type, resource_name, IssueType::Pipeline)
}

/// Like [`report`], with an explicit issue type.
pub fn report_with_type(
    namespace: &str,
    resource_type: &str,
    resource_name: &str,
    issue_type: IssueType,
) -> NewIssue {
    NewIssue {
        title: format!("{resource_name} failed"),
        description: "Task build-container exited 1".to_string(),
        severity: Severity::Major,
        issue_type,
        namespace: namespace.to_string(),
        scope: NewScope {
            resource_type: resource_type.to_string(),
            resource_name: resource_name.to_string(),
            resource_namespace: None,
        },
        links: vec![],
        state: None,
        resolved_at: None,
    }
}

/// A link payload.
pub fn link(title: &str, url: &str) -> NewLink {
    NewLink {
        title: title.to_string(),
        url: url.to_string(),
    }
}
