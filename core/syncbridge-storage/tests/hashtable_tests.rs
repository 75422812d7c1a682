//! Tests for the change-hash store.

use std::collections::BTreeMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use syncbridge_storage::{HashTable, KvStore, MemoryKv, SqliteKv, StorageError};
use syncbridge_types::{ChangeType, MemberId};

fn table(kv: &Arc<dyn KvStore>) -> HashTable {
    HashTable::new(kv.clone(), MemberId::new(1), "contact")
}

fn memory() -> Arc<dyn KvStore> {
    Arc::new(MemoryKv::new())
}

// ── Classification ──────────────────────────────────────────────

#[test]
fn first_pass_adds_everything() {
    let kv = memory();
    let hashes = table(&kv);
    let mut pass = hashes.begin_pass(false).unwrap();
    assert_eq!(pass.classify("u1", "h1"), ChangeType::Added);
    assert_eq!(pass.classify("u2", "h2"), ChangeType::Added);
    assert!(pass.deleted_uids().is_empty());
    pass.commit().unwrap();

    assert_eq!(hashes.get("u1").unwrap(), Some("h1".to_string()));
    assert_eq!(hashes.len().unwrap(), 2);
}

#[test]
fn second_pass_classifies_against_stored_hashes() {
    let kv = memory();
    let hashes = table(&kv);
    let mut pass = hashes.begin_pass(false).unwrap();
    for (uid, hash) in [("keep", "a"), ("edit", "b"), ("gone", "c")] {
        pass.classify(uid, hash);
    }
    pass.commit().unwrap();

    let mut pass = hashes.begin_pass(false).unwrap();
    assert_eq!(pass.classify("keep", "a"), ChangeType::Unchanged);
    assert_eq!(pass.classify("edit", "b2"), ChangeType::Modified);
    assert_eq!(pass.classify("new", "d"), ChangeType::Added);
    assert_eq!(pass.deleted_uids(), vec!["gone".to_string()]);
    pass.commit().unwrap();

    assert_eq!(
        hashes.entries().unwrap(),
        vec![
            ("edit".to_string(), "b2".to_string()),
            ("keep".to_string(), "a".to_string()),
            ("new".to_string(), "d".to_string()),
        ]
    );
}

#[test]
fn reported_uids_are_not_deleted() {
    let kv = memory();
    let hashes = table(&kv);
    let mut pass = hashes.begin_pass(false).unwrap();
    pass.classify("u1", "h1");
    pass.commit().unwrap();

    let mut pass = hashes.begin_pass(false).unwrap();
    pass.report("u1");
    assert!(pass.deleted_uids().is_empty());
    pass.commit().unwrap();
    assert_eq!(hashes.get("u1").unwrap(), Some("h1".to_string()));
}

#[test]
fn slow_sync_adds_everything_and_replaces_scope() {
    let kv = memory();
    let hashes = table(&kv);
    let mut pass = hashes.begin_pass(false).unwrap();
    pass.classify("old", "x");
    pass.classify("same", "y");
    pass.commit().unwrap();

    let mut pass = hashes.begin_pass(true).unwrap();
    assert!(pass.is_slow_sync());
    assert_eq!(pass.classify("same", "y"), ChangeType::Added);
    assert!(pass.deleted_uids().is_empty());
    pass.commit().unwrap();

    assert_eq!(
        hashes.entries().unwrap(),
        vec![("same".to_string(), "y".to_string())]
    );
}

// ── Atomicity ───────────────────────────────────────────────────

#[test]
fn dropped_pass_changes_nothing() {
    let kv = memory();
    let hashes = table(&kv);
    let mut pass = hashes.begin_pass(false).unwrap();
    pass.classify("u1", "h1");
    drop(pass);
    assert!(hashes.is_empty().unwrap());

    // Re-running the abandoned pass gives the same answers.
    let mut pass = hashes.begin_pass(false).unwrap();
    assert_eq!(pass.classify("u1", "h1"), ChangeType::Added);
}

#[test]
fn passes_of_several_scopes_write_as_one_batch() {
    let kv = memory();
    let alice = HashTable::new(kv.clone(), MemberId::new(1), "contact");
    let bob = HashTable::new(kv.clone(), MemberId::new(2), "contact");

    let mut first = alice.begin_pass(false).unwrap();
    first.classify("a1", "h1");
    let mut second = bob.begin_pass(true).unwrap();
    second.classify("b1", "h2");
    let mut ops = first.into_batch();
    ops.extend(second.into_batch());
    assert!(alice.is_empty().unwrap());

    kv.write_batch(ops).unwrap();
    assert_eq!(alice.get("a1").unwrap().as_deref(), Some("h1"));
    assert_eq!(bob.get("b1").unwrap().as_deref(), Some("h2"));
}

#[test]
fn scopes_are_isolated() {
    let kv = memory();
    let contacts = HashTable::new(kv.clone(), MemberId::new(1), "contact");
    let events = HashTable::new(kv.clone(), MemberId::new(1), "event");
    let other_member = HashTable::new(kv.clone(), MemberId::new(2), "contact");

    let mut pass = contacts.begin_pass(false).unwrap();
    pass.classify("u1", "h1");
    pass.commit().unwrap();

    assert!(events.is_empty().unwrap());
    assert!(other_member.is_empty().unwrap());
    let mut pass = other_member.begin_pass(true).unwrap();
    pass.classify("u9", "h9");
    pass.commit().unwrap();
    assert_eq!(contacts.len().unwrap(), 1);
}

#[test]
fn nested_object_type_names_are_separate_scopes() {
    let kv = memory();
    let notes = HashTable::new(kv.clone(), MemberId::new(1), "note");
    let nested = HashTable::new(kv.clone(), MemberId::new(1), "note/x");

    let mut pass = nested.begin_pass(false).unwrap();
    pass.classify("u1", "h");
    pass.commit().unwrap();
    assert!(notes.entries().unwrap().is_empty());

    // A slow-sync commit only replaces its own scope.
    let mut pass = notes.begin_pass(true).unwrap();
    pass.classify("n1", "h");
    pass.commit().unwrap();
    assert_eq!(nested.entries().unwrap(), vec![("u1".to_string(), "h".to_string())]);
    assert_eq!(notes.entries().unwrap(), vec![("n1".to_string(), "h".to_string())]);
}

#[test]
fn reset_clears_scope() {
    let kv = memory();
    let hashes = table(&kv);
    let mut pass = hashes.begin_pass(false).unwrap();
    pass.classify("u1", "h1");
    pass.commit().unwrap();
    hashes.reset().unwrap();
    assert!(hashes.is_empty().unwrap());
}

#[test]
fn foreach_visits_every_entry() {
    let kv = memory();
    let hashes = table(&kv);
    let mut pass = hashes.begin_pass(false).unwrap();
    pass.classify("a", "1");
    pass.classify("b/with/slash", "2");
    pass.commit().unwrap();

    let mut seen = BTreeMap::new();
    hashes
        .foreach(|uid, hash| {
            seen.insert(uid.to_string(), hash.to_string());
        })
        .unwrap();
    assert_eq!(seen.get("b/with/slash").map(String::as_str), Some("2"));
    assert_eq!(seen.len(), 2);
}

#[test]
fn point_upsert_and_remove() {
    let kv = memory();
    let hashes = table(&kv);
    hashes.upsert("u1", "h1").unwrap();
    hashes.upsert("u1", "h2").unwrap();
    assert_eq!(hashes.get("u1").unwrap().as_deref(), Some("h2"));

    let mut pass = hashes.begin_pass(false).unwrap();
    assert_eq!(pass.classify("u1", "h2"), ChangeType::Unchanged);
    drop(pass);

    hashes.remove("u1").unwrap();
    assert!(hashes.get("u1").unwrap().is_none());
}

#[test]
fn non_utf8_hash_is_corrupt() {
    let kv = memory();
    kv.put("hash/1/contact/bad", &[0xff, 0xfe]).unwrap();
    let hashes = table(&kv);
    assert!(matches!(
        hashes.get("bad"),
        Err(StorageError::Corrupt { key, .. }) if key == "hash/1/contact/bad"
    ));
    assert!(hashes.begin_pass(false).is_err());
}

#[test]
fn sqlite_backend_round_trips_a_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hashes.db");
    {
        let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::open(&path).unwrap());
        let hashes = table(&kv);
        let mut pass = hashes.begin_pass(false).unwrap();
        pass.classify("u1", "h1");
        pass.commit().unwrap();
    }
    let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::open(&path).unwrap());
    let hashes = table(&kv);
    let mut pass = hashes.begin_pass(false).unwrap();
    assert_eq!(pass.classify("u1", "h1"), ChangeType::Unchanged);
}

// ── Properties ──────────────────────────────────────────────────

proptest! {
    /// Replaying the same (uid, hash) set leaves every UID unchanged and
    /// deletes nothing.
    #[test]
    fn replay_is_idempotent(
        entries in prop::collection::btree_map("[a-z0-9]{1,8}", "[a-f0-9]{8}", 0..20),
    ) {
        let kv = memory();
        let hashes = table(&kv);

        let mut first = hashes.begin_pass(false).unwrap();
        for (uid, hash) in &entries {
            prop_assert_eq!(first.classify(uid, hash), ChangeType::Added);
        }
        prop_assert!(first.deleted_uids().is_empty());
        first.commit().unwrap();

        let mut second = hashes.begin_pass(false).unwrap();
        for (uid, hash) in &entries {
            prop_assert_eq!(second.classify(uid, hash), ChangeType::Unchanged);
        }
        prop_assert!(second.deleted_uids().is_empty());
        second.commit().unwrap();

        prop_assert_eq!(hashes.len().unwrap(), entries.len());
    }
}
