mod common;

use std::sync::Arc;

use docsql::{
    config::{AutoCreate, StoreOptions},
    prelude::*,
    sqlite::SqliteExecutor,
};
use uuid::Uuid;

use common::*;

#[test]
fn tenants_only_see_their_own_documents() {
    let store = store();

    let mut one = store.session_for_tenant("one");
    let han_one = one.store(User::new("Han", "Solo", "han")).unwrap();
    one.save_changes().unwrap();

    let mut two = store.session_for_tenant("two");
    let han_two = two.store(User::new("Han", "Solo", "han")).unwrap();
    two.save_changes().unwrap();
    assert_ne!(han_one.id, han_two.id);

    let mut session = store.session_for_tenant("one");
    let found = session
        .query(&UserByUserName { user_name: "han".into() })
        .unwrap()
        .unwrap();
    assert_eq!(found.id, han_one.id);

    assert!(session.load::<User>(han_two.id).unwrap().is_none());
    assert_eq!(
        session
            .query(&CountByFirstName { first_name: "Han".into() })
            .unwrap(),
        1
    );
}

#[test]
fn loads_return_one_instance_per_id() {
    let store = store();
    let seeded = seed(&store);
    let mut session = store.open_session();

    let first = session.load::<User>(seeded[1].id).unwrap().unwrap();
    let second = session.load::<User>(seeded[1].id).unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.user_name, "shadetreedev");
    assert!(session.load::<User>(Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn stored_documents_are_tracked_before_commit() {
    let store = store();
    let mut session = store.open_session();

    let stored = session.store(User::new("Jeremy", "Miller", "jdm")).unwrap();
    assert!(!stored.id.is_nil());

    let loaded = session.load::<User>(stored.id).unwrap().unwrap();
    assert!(Arc::ptr_eq(&stored, &loaded));

    let other = store.open_session().load::<User>(stored.id).unwrap();
    assert!(other.is_none());
}

#[test]
fn storing_another_instance_with_a_tracked_id_fails() {
    let store = store();
    let mut session = store.open_session();

    let stored = session.store(User::new("Jeremy", "Miller", "jdm")).unwrap();
    assert!(session.store_shared(Arc::clone(&stored)).is_ok());

    let mut copy = (*stored).clone();
    copy.user_name = "jeremy".into();
    let result = session.store(copy.clone());
    assert!(matches!(result, Err(DocumentStoreError::DuplicateIdentity(_, _))));

    let replaced = session.store_versioned(copy, None).unwrap();
    assert_eq!(replaced.user_name, "jeremy");
    assert!(Arc::ptr_eq(&replaced, &session.load::<User>(stored.id).unwrap().unwrap()));
}

#[test]
fn eject_forces_the_next_load_to_read_the_store() {
    let store = store();
    let seeded = seed(&store);
    let mut session = store.open_session();

    let first = session.load::<User>(seeded[0].id).unwrap().unwrap();
    let ejected = session.eject(&*first).unwrap();
    assert!(ejected.is_some());
    assert!(session.eject_by_id::<User>(seeded[0].id).unwrap().is_none());

    let reloaded = session.load::<User>(seeded[0].id).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&first, &reloaded));
    assert_eq!(*first, *reloaded);
}

#[test]
fn eject_keeps_pending_writes() {
    let store = store();
    let mut session = store.open_session();

    let stored = session.store(User::new("Han", "Solo", "han")).unwrap();
    let ejected = session.eject(&*stored).unwrap();
    assert!(ejected.is_some());
    assert!(session.identity_map().is_empty());
    assert_eq!(session.pending_count(), 1);

    assert_eq!(session.save_changes().unwrap(), 1);

    let loaded = store
        .open_session()
        .load::<User>(stored.id)
        .unwrap()
        .unwrap();
    assert_eq!(loaded.user_name, "han");
}

#[test]
fn load_many_fetches_untracked_ids_once() {
    let store = store();
    let seeded = seed(&store);
    let mut session = store.open_session();

    let tracked = session.load::<User>(seeded[2].id).unwrap().unwrap();

    let loaded = session
        .load_many::<User, _>([seeded[0].id, seeded[2].id, Uuid::new_v4(), seeded[0].id, seeded[4].id])
        .unwrap();

    assert_eq!(loaded.len(), 3);
    assert!(Arc::ptr_eq(&loaded[0], &tracked));
    let mut names = loaded
        .iter()
        .map(|user| user.user_name.as_str())
        .collect::<Vec<_>>();
    names.sort();
    assert_eq!(names, vec!["frank", "jdm", "myusername"]);

    let again = session
        .load_many::<User, _>([seeded[0].id, seeded[4].id])
        .unwrap();
    assert!(again
        .iter()
        .all(|user| loaded.iter().any(|other| Arc::ptr_eq(user, other))));
}

#[test]
fn deletes_apply_on_commit() {
    let store = store();
    let seeded = seed(&store);

    let mut session = store.open_session();
    session.delete_by_id::<User>(seeded[3].id).unwrap();
    assert_eq!(session.pending_count(), 1);
    assert_eq!(session.save_changes().unwrap(), 1);

    let mut fresh = store.open_session();
    assert!(fresh.load::<User>(seeded[3].id).unwrap().is_none());
    assert_eq!(
        fresh
            .query(&CountByFirstName { first_name: "Max".into() })
            .unwrap(),
        0
    );
}

#[test]
fn commits_record_versions_that_later_loads_see() {
    let store = store();
    let mut session = store.open_session();

    let user = session.store(User::new("Jeremy", "Miller", "jdm")).unwrap();
    assert_eq!(session.version_of::<User>(user.id).unwrap(), None);

    session.save_changes().unwrap();
    let committed = session.version_of::<User>(user.id).unwrap();
    assert!(committed.is_some());

    let mut fresh = store.open_session();
    fresh.load::<User>(user.id).unwrap().unwrap();
    assert_eq!(fresh.version_of::<User>(user.id).unwrap(), committed);

    session.store_shared(Arc::clone(&user)).unwrap();
    session.save_changes().unwrap();
    assert_ne!(session.version_of::<User>(user.id).unwrap(), committed);
}

#[test]
fn updates_replace_stored_bodies() {
    let store = store();
    let seeded = seed(&store);

    let mut session = store.open_session();
    let mut max = (*session.load::<User>(seeded[3].id).unwrap().unwrap()).clone();
    max.first_name = "Maxwell".into();
    session.store_versioned(max, None).unwrap();
    session.save_changes().unwrap();

    let mut fresh = store.open_session();
    let reloaded = fresh.load::<User>(seeded[3].id).unwrap().unwrap();
    assert_eq!(reloaded.first_name, "Maxwell");
}

#[test]
fn integer_ids_keep_their_representation() {
    let store = store();
    let mut session = store.open_session();

    session
        .store(Issue { number: 7, title: "Plans leak across tenants".into() })
        .unwrap();
    session.save_changes().unwrap();

    let mut fresh = store.open_session();
    let issue = fresh.load::<Issue>(7_i64).unwrap().unwrap();
    assert_eq!(issue.title, "Plans leak across tenants");

    let mismatch = fresh.load::<Issue>("7");
    assert!(matches!(mismatch, Err(DocumentStoreError::TypeMismatch { .. })));

    assert_eq!(store.storage::<Issue>().unwrap().table(), "mt_doc_issue");
}

#[test]
fn failed_commits_keep_pending_writes() {
    let executor = SqliteExecutor::in_memory().unwrap();
    let options = StoreOptions {
        auto_create: AutoCreate::None,
        ..StoreOptions::default()
    };
    let store = DocumentStore::builder(executor)
        .options(options)
        .build()
        .unwrap();

    let mut session = store.open_session();
    session.store(User::new("Jeremy", "Miller", "jdm")).unwrap();

    let result = session.save_changes();
    assert!(matches!(result, Err(DocumentStoreError::Backend(_))));
    assert_eq!(session.pending_count(), 1);
}
