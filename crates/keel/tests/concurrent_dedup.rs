//! Concurrency tests for the engine's core correctness property: concurrent
//! reporters with one dedup key converge on exactly one persisted record.

mod common;

use common::{init_tracing, report};
use keel::SqliteStore;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn racing_connections_converge_on_one_issue() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keel.db");

    // One store (and therefore one connection) per thread, all released at
    // the same instant, so the database itself has to arbitrate the first
    // insert for the key.
    const WRITERS: usize = 8;
    let barrier = Arc::new(Barrier::new(WRITERS));
    let mut handles = Vec::new();
    for _ in 0..WRITERS {
        let barrier = Arc::clone(&barrier);
        let path = path.clone();
        handles.push(thread::spawn(move || {
            let store = SqliteStore::open(&path).unwrap();
            let r = report("team-a", "pipelinerun", "run-1");
            barrier.wait();
            store.create_or_update(&r).unwrap().id
        }));
    }

    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.iter().all(|id| *id == ids[0]), "all callers must converge on one id");

    let store = SqliteStore::open(&path).unwrap();
    let counts = store.counts().unwrap();
    assert_eq!(counts.issues, 1, "exactly one issue row for the key");
    assert_eq!(counts.scopes, 1, "no orphaned scope rows from losing inserts");
}

#[test]
fn shared_store_handles_parallel_distinct_keys() {
    init_tracing();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());

    const WRITERS: usize = 8;
    let barrier = Arc::new(Barrier::new(WRITERS));
    let mut handles = Vec::new();
    for n in 0..WRITERS {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let r = report("team-a", "pipelinerun", &format!("run-{n}"));
            barrier.wait();
            store.create_or_update(&r).unwrap().id
        }));
    }

    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), WRITERS);

    let counts = store.counts().unwrap();
    assert_eq!(counts.issues, WRITERS);
    assert_eq!(counts.scopes, WRITERS);
}

#[test]
fn racing_connections_on_a_resolved_issue_reopen_it_once() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keel.db");

    let store = SqliteStore::open(&path).unwrap();
    let created = store.create_or_update(&report("team-a", "pipelinerun", "run-1")).unwrap();
    store.resolve_by_scope("pipelinerun", "run-1", "team-a").unwrap();

    const WRITERS: usize = 4;
    let barrier = Arc::new(Barrier::new(WRITERS));
    let mut handles = Vec::new();
    for _ in 0..WRITERS {
        let barrier = Arc::clone(&barrier);
        let path = path.clone();
        handles.push(thread::spawn(move || {
            let store = SqliteStore::open(&path).unwrap();
            let r = report("team-a", "pipelinerun", "run-1");
            barrier.wait();
            store.create_or_update(&r).unwrap().id
        }));
    }
    for handle in handles {
        assert_eq!(handle.join().unwrap(), created.id);
    }

    assert_eq!(store.counts().unwrap().issues, 1);
    let reopened = store.find_by_id(&created.id).unwrap().unwrap();
    assert_eq!(reopened.state, keel::domain::IssueState::Active);
}
