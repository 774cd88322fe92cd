//! Integration tests for the issue lifecycle: deduplicated creation, sparse
//! updates, link replacement, bulk resolution, and cascading deletion.

mod common;

use chrono::{TimeZone, Utc};
use common::{init_tracing, link, report, report_with_type};
use keel::SqliteStore;
use keel::domain::{IssueFilter, IssueId, IssueState, IssueType, IssueUpdate, ScopeUpdate};
use std::thread::sleep;
use std::time::Duration;

fn store() -> SqliteStore {
    init_tracing();
    SqliteStore::open_in_memory().unwrap()
}

// ========== Deduplicated Creation ==========

#[test]
fn identical_key_reports_converge_and_add_no_rows() {
    let store = store();

    let first = store.create_or_update(&report("team-a", "pipelinerun", "run-1")).unwrap();
    let second = store.create_or_update(&report("team-a", "pipelinerun", "run-1")).unwrap();
    let third = store.create(&report("team-a", "pipelinerun", "run-1")).unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.id, third.id);

    let counts = store.counts().unwrap();
    assert_eq!(counts.issues, 1);
    assert_eq!(counts.scopes, 1);
}

#[test]
fn different_key_reports_create_separate_issues() {
    let store = store();

    // Same scope, different issue types; all five dedup fields count.
    let a = store.create_or_update(&report_with_type("team-a", "pipelinerun", "run-1", IssueType::Pipeline)).unwrap();
    let b = store.create_or_update(&report_with_type("team-a", "pipelinerun", "run-1", IssueType::Build)).unwrap();
    let c = store.create_or_update(&report("team-b", "pipelinerun", "run-1")).unwrap();

    assert_ne!(a.id, b.id);
    assert_ne!(a.id, c.id);
    assert_eq!(store.counts().unwrap().issues, 3);
}

#[test]
fn find_duplicate_spans_active_and_resolved() {
    let store = store();
    let r = report("team-a", "pipelinerun", "run-1");

    assert!(store.find_duplicate(&r).unwrap().is_none());

    let created = store.create_or_update(&r).unwrap();
    let found = store.find_duplicate(&r).unwrap().expect("active duplicate");
    assert_eq!(found.id, created.id);

    store.resolve_by_scope("pipelinerun", "run-1", "team-a").unwrap();
    let found = store.find_duplicate(&r).unwrap().expect("resolved duplicate");
    assert_eq!(found.id, created.id);
    assert_eq!(found.state, IssueState::Resolved);
}

// ========== Sparse Updates ==========

#[test]
fn update_with_only_title_leaves_everything_else_alone() {
    let store = store();
    let mut r = report("team-a", "pipelinerun", "run-1");
    r.links = vec![link("logs", "https://ci.example.com/run-1")];
    let created = store.create_or_update(&r).unwrap();

    sleep(Duration::from_millis(2));
    let updated = store
        .update(
            &created.id,
            &IssueUpdate {
                title: Some("Renamed".to_string()),
                ..IssueUpdate::default()
            },
        )
        .unwrap();

    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.description, created.description);
    assert_eq!(updated.severity, created.severity);
    assert_eq!(updated.state, created.state);
    assert_eq!(updated.scope, created.scope);
    assert_eq!(updated.links, created.links);
    assert_eq!(updated.detected_at, created.detected_at);
    assert!(updated.updated_at > created.updated_at);
}

#[test]
fn update_with_links_replaces_the_whole_set() {
    let store = store();
    let mut r = report("team-a", "pipelinerun", "run-1");
    r.links = vec![
        link("logs", "https://ci.example.com/run-1"),
        link("dashboard", "https://dash.example.com/run-1"),
    ];
    let created = store.create_or_update(&r).unwrap();
    assert_eq!(created.links.len(), 2);

    let updated = store
        .update(
            &created.id,
            &IssueUpdate {
                links: Some(vec![link("retry", "https://ci.example.com/run-1/retry")]),
                ..IssueUpdate::default()
            },
        )
        .unwrap();

    assert_eq!(updated.links.len(), 1);
    assert_eq!(updated.links[0].title, "retry");
    assert_eq!(store.counts().unwrap().links, 1);
}

#[test]
fn update_scope_in_place_keeps_scope_identity() {
    let store = store();
    let created = store.create_or_update(&report("team-a", "pipelinerun", "run-1")).unwrap();

    let updated = store
        .update(
            &created.id,
            &IssueUpdate {
                scope: Some(ScopeUpdate {
                    resource_name: Some("run-1-retry".to_string()),
                    ..ScopeUpdate::default()
                }),
                ..IssueUpdate::default()
            },
        )
        .unwrap();

    assert_eq!(updated.scope.id, created.scope.id);
    assert_eq!(updated.scope.resource_name, "run-1-retry");
    assert_eq!(updated.scope.resource_type, "pipelinerun");

    // The old key is free again: a report for it creates a fresh issue.
    let fresh = store.create_or_update(&report("team-a", "pipelinerun", "run-1")).unwrap();
    assert_ne!(fresh.id, created.id);
}

#[test]
fn explicit_resolution_time_wins_over_now() {
    let store = store();
    let created = store.create_or_update(&report("team-a", "pipelinerun", "run-1")).unwrap();

    let ts = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
    let updated = store
        .update(
            &created.id,
            &IssueUpdate {
                state: Some(IssueState::Resolved),
                resolved_at: Some(ts),
                ..IssueUpdate::default()
            },
        )
        .unwrap();

    assert_eq!(updated.state, IssueState::Resolved);
    assert_eq!(updated.resolved_at, Some(ts));
}

// ========== Bulk Resolution ==========

#[test]
fn resolve_by_scope_resolves_exactly_the_active_matches() {
    let store = store();

    // Three active issues of different types share one scope.
    for issue_type in [IssueType::Pipeline, IssueType::Build, IssueType::Test] {
        store
            .create_or_update(&report_with_type("team-a", "pipelinerun", "run-1", issue_type))
            .unwrap();
    }
    // Already resolved on the same scope; must not be touched.
    let mut resolved_report =
        report_with_type("team-a", "pipelinerun", "run-1", IssueType::Release);
    resolved_report.state = Some(IssueState::Resolved);
    let pre_resolved = store.create_or_update(&resolved_report).unwrap();
    // Different scope; must stay active.
    let other = store.create_or_update(&report("team-a", "pipelinerun", "run-2")).unwrap();

    let count = store.resolve_by_scope("pipelinerun", "run-1", "team-a").unwrap();
    assert_eq!(count, 3);

    let (issues, _) = store
        .find_all(&IssueFilter {
            namespace: Some("team-a".to_string()),
            state: Some(IssueState::Resolved),
            ..IssueFilter::default()
        })
        .unwrap();
    assert_eq!(issues.len(), 4);
    for issue in &issues {
        assert!(issue.resolved_at.is_some());
    }

    let untouched = store.find_by_id(&pre_resolved.id).unwrap().unwrap();
    assert_eq!(untouched.resolved_at, pre_resolved.resolved_at);
    assert_eq!(untouched.updated_at, pre_resolved.updated_at);

    let other = store.find_by_id(&other.id).unwrap().unwrap();
    assert_eq!(other.state, IssueState::Active);
}

#[test]
fn resolve_by_scope_with_no_matches_returns_zero() {
    let store = store();
    let count = store.resolve_by_scope("pipelinerun", "ghost", "team-a").unwrap();
    assert_eq!(count, 0);
}

// ========== Cascading Deletion ==========

#[test]
fn delete_removes_issue_scope_links_and_edges() {
    let store = store();
    let mut r = report("team-a", "pipelinerun", "run-1");
    r.links = vec![link("logs", "https://ci.example.com/run-1")];
    let doomed = store.create_or_update(&r).unwrap();
    let neighbor = store.create_or_update(&report("team-a", "pipelinerun", "run-2")).unwrap();
    store.add_related_issue(&doomed.id, &neighbor.id).unwrap();

    let before = store.counts().unwrap();
    assert_eq!((before.issues, before.scopes, before.links, before.related), (2, 2, 1, 1));

    store.delete(&doomed.id).unwrap();

    let after = store.counts().unwrap();
    assert_eq!((after.issues, after.scopes, after.links, after.related), (1, 1, 0, 0));

    assert!(store.find_by_id(&doomed.id).unwrap().is_none());
    let neighbor = store.find_by_id(&neighbor.id).unwrap().unwrap();
    assert!(neighbor.related_from.is_empty());
    assert!(neighbor.related_to.is_empty());
}

#[test]
fn delete_missing_issue_is_not_found() {
    let store = store();
    let err = store.delete(&IssueId::new("missing")).unwrap_err();
    assert!(matches!(err, keel::Error::IssueNotFound(_)));
}

// ========== Queries ==========

#[test]
fn find_all_orders_newest_first_and_paginates() {
    let store = store();
    for n in 1..=3 {
        store.create_or_update(&report("team-a", "pipelinerun", &format!("run-{n}"))).unwrap();
        sleep(Duration::from_millis(2));
    }

    let (issues, total) = store.find_all(&IssueFilter::default()).unwrap();
    assert_eq!(total, 3);
    let names: Vec<_> = issues.iter().map(|i| i.scope.resource_name.as_str()).collect();
    assert_eq!(names, ["run-3", "run-2", "run-1"]);

    let (page, total) = store
        .find_all(&IssueFilter {
            limit: Some(1),
            offset: Some(1),
            ..IssueFilter::default()
        })
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].scope.resource_name, "run-2");
}

// ========== Full Scenario ==========

#[test]
fn pipeline_issue_lifecycle_scenario() {
    let store = store();
    let r = report("team-a", "pipelinerun", "build-1");

    // First report creates the record.
    let created = store.create_or_update(&r).unwrap();
    assert_eq!(created.state, IssueState::Active);

    // Identical-key report with a new description updates in place.
    let mut second = r.clone();
    second.description = "Task build-container exited 137".to_string();
    let updated = store.create_or_update(&second).unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.description, "Task build-container exited 137");
    assert_eq!(updated.state, IssueState::Active);

    // The pipeline recovers; its scope clears.
    let count = store.resolve_by_scope("pipelinerun", "build-1", "team-a").unwrap();
    assert_eq!(count, 1);
    let resolved = store.find_by_id(&created.id).unwrap().unwrap();
    assert_eq!(resolved.state, IssueState::Resolved);
    assert!(resolved.resolved_at.is_some());

    // The problem comes back: the same record is reopened, not duplicated.
    let reopened = store.create_or_update(&r).unwrap();
    assert_eq!(reopened.id, created.id);
    assert_eq!(reopened.state, IssueState::Active);
    assert!(reopened.resolved_at.is_none());
    assert_eq!(store.counts().unwrap().issues, 1);
}
