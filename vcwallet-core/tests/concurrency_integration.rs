//! Concurrency integration tests.
mod common;

use std::sync::Arc;
use std::thread;

use vcwallet_core::{
    ApprovalStatus, CredentialRecord, Decision, DidMinter, Foyer, StoreError,
};

#[test]
fn test_parallel_accepts_all_persist() {
    let root = common::temp_root();
    let store = common::open_store(root.path());
    store
        .initialize(&common::passphrase("pw1"), &DidMinter)
        .expect("initialize");
    let foyer = Arc::new(Foyer::new(Arc::clone(&store)));

    let offered: Vec<_> = foyer
        .enqueue((0..8).map(|i| {
            common::credential("did:web:issuer.example", &format!("did:key:z{i}"), "Course")
        }))
        .collect();

    let handles: Vec<_> = offered
        .iter()
        .map(|pending| {
            let foyer = Arc::clone(&foyer);
            let id = pending.id;
            thread::spawn(move || foyer.decide(id, Decision::Accept))
        })
        .collect();
    for handle in handles {
        assert_eq!(
            handle.join().expect("join"),
            Some(ApprovalStatus::Accepted)
        );
    }
    assert_eq!(store.get_all_credentials().expect("list").len(), 8);
}

#[test]
fn test_racing_decisions_on_one_entry_settle_once() {
    let root = common::temp_root();
    let store = common::open_store(root.path());
    store
        .initialize(&common::passphrase("pw1"), &DidMinter)
        .expect("initialize");
    let foyer = Arc::new(Foyer::new(Arc::clone(&store)));
    let id = foyer
        .enqueue([common::credential("did:web:a", "did:key:z1", "Course")])
        .next()
        .expect("offer")
        .id;

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let foyer = Arc::clone(&foyer);
            let decision = if i % 2 == 0 {
                Decision::Accept
            } else {
                Decision::Reject
            };
            thread::spawn(move || foyer.decide(id, decision))
        })
        .collect();
    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("join"))
        .collect();

    let first = outcomes[0];
    assert!(outcomes.iter().all(|outcome| *outcome == first));
    let persisted = store.get_all_credentials().expect("list").len();
    match first {
        Some(ApprovalStatus::Accepted) => assert_eq!(persisted, 1),
        Some(ApprovalStatus::Rejected) => assert_eq!(persisted, 0),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_lock_during_writes_never_corrupts() {
    let root = common::temp_root();
    let store = common::open_store(root.path());
    store
        .initialize(&common::passphrase("pw1"), &DidMinter)
        .expect("initialize");

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            let mut written = 0;
            for i in 0..20 {
                let record = CredentialRecord::from_credential(
                    common::credential("did:web:a", &format!("did:key:z{i}"), "Course"),
                    i,
                );
                match store.add_credential(&record) {
                    Ok(()) => written += 1,
                    Err(StoreError::StoreLocked) => {}
                    Err(err) => panic!("unexpected error {err}"),
                }
            }
            written
        })
    };
    store.lock();
    let written = writer.join().expect("join");

    store.unlock(&common::passphrase("pw1")).expect("unlock");
    assert_eq!(store.get_all_credentials().expect("list").len(), written);
}

#[test]
fn test_second_handle_sees_writes_of_first() {
    let root = common::temp_root();
    let first = common::open_store(root.path());
    first
        .initialize(&common::passphrase("pw1"), &DidMinter)
        .expect("initialize");
    let second = common::open_store(root.path());
    assert!(second.is_initialized());
    assert!(!second.is_unlocked());
    second.unlock(&common::passphrase("pw1")).expect("unlock");

    let record = CredentialRecord::from_credential(
        common::credential("did:web:a", "did:key:z1", "Course"),
        1,
    );
    first.add_credential(&record).expect("add");
    assert_eq!(second.get_all_credentials().expect("list").len(), 1);

    second.reset().expect("reset");
    assert!(!first.is_initialized());
    assert!(!first.is_unlocked());
    assert!(matches!(
        first.add_credential(&record),
        Err(StoreError::NotInitialized)
    ));
}
