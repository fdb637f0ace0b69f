mod common;

use std::sync::Arc;

use docsql::prelude::*;
use serde_json::Value;

use common::*;

fn user_names(results: impl Iterator<Item = DocumentStoreResult<Arc<User>>>) -> Vec<String> {
    results
        .map(|user| user.unwrap().user_name.clone())
        .collect()
}

#[test]
fn list_and_count_queries_share_a_filter() {
    let store = store();
    seed(&store);
    let mut session = store.open_session();

    let jeremies = session
        .query(&UsersByFirstName { first_name: "Jeremy".into() })
        .unwrap();
    assert_eq!(user_names(jeremies), vec!["jdm", "shadetreedev"]);

    let count = session
        .query(&CountByFirstName { first_name: "Jeremy".into() })
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn reused_definitions_are_not_retranslated() {
    let store = store();
    seed(&store);
    let mut session = store.open_session();

    let before = store.plan_cache().stats();

    let lindsey = session
        .query(&UserByUserName { user_name: "myusername".into() })
        .unwrap()
        .unwrap();
    assert_eq!(lindsey.first_name, "Lindsey");

    let jeremy = session
        .query(&UserByUserName { user_name: "jdm".into() })
        .unwrap()
        .unwrap();
    assert_eq!(jeremy.last_name, "Miller");
    assert_eq!(jeremy.first_name, "Jeremy");

    let after = store.plan_cache().stats();
    assert_eq!(after.builds - before.builds, 1);
    assert_eq!(after.hits - before.hits, 1);
    assert_eq!(after.rebuilds, before.rebuilds);
}

#[test]
fn plans_are_shared_across_sessions() {
    let store = store();
    seed(&store);

    for user_name in ["jdm", "max", "frank"] {
        let mut session = store.open_session();
        let user = session
            .query(&UserByUserName { user_name: user_name.into() })
            .unwrap();
        assert!(user.is_some());
    }

    let stats = store.plan_cache().stats();
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.hits, 2);
}

#[test]
fn concurrent_first_use_translates_once() {
    let store = store();
    seed(&store);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let mut session = store.open_session();
                let count = session
                    .query(&CountByFirstName { first_name: "Jeremy".into() })
                    .unwrap();
                assert_eq!(count, 2);
            });
        }
    });

    let stats = store.plan_cache().stats();
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.hits, 7);
}

#[test]
fn single_results_report_missing_documents() {
    let store = store();
    seed(&store);
    let mut session = store.open_session();

    let missing = session
        .query(&UserByUserName { user_name: "nobody".into() })
        .unwrap();
    assert!(missing.is_none());

    let required = session.query(&RequiredUser { user_name: "nobody".into() });
    assert!(matches!(required, Err(DocumentStoreError::NotFound(_))));

    let found = session
        .query(&RequiredUser { user_name: "max".into() })
        .unwrap();
    assert_eq!(found.first_name, "Max");
}

#[test]
fn single_results_reject_ambiguous_matches() {
    let store = store();
    seed(&store);
    let mut session = store.open_session();

    let ambiguous = session.query(&OnlyUserNamed { first_name: "Jeremy".into() });
    assert!(matches!(ambiguous, Err(DocumentStoreError::MultipleResults(_))));
    assert!(session.identity_map().is_empty());

    let lindsey = session
        .query(&OnlyUserNamed { first_name: "Lindsey".into() })
        .unwrap();
    assert_eq!(lindsey.user_name, "myusername");
}

#[test]
fn null_parameters_match_missing_values() {
    let store = store();
    let mut session = store.open_session();
    session.store(Pet::new("Rex", Some("rex"))).unwrap();
    session.store(Pet::new("Tom", None)).unwrap();
    session.save_changes().unwrap();

    let unnamed = session
        .query(&PetsByNickname { nickname: None })
        .unwrap();
    assert_eq!(unnamed, 1);

    let named = session
        .query(&PetsByNickname { nickname: Some("rex".into()) })
        .unwrap();
    assert_eq!(named, 1);

    let stats = store.plan_cache().stats();
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.rebuilds, 0);
}

#[test]
fn any_of_queries_rebuild_for_each_execution() {
    let store = store();
    seed(&store);
    let mut session = store.open_session();

    let two = session
        .query(&UsersNamed { user_names: vec!["max".into(), "jdm".into()] })
        .unwrap();
    assert_eq!(user_names(two), vec!["jdm", "max"]);

    let three = session
        .query(&UsersNamed { user_names: vec!["frank".into(), "max".into(), "myusername".into()] })
        .unwrap();
    assert_eq!(user_names(three), vec!["frank", "max", "myusername"]);

    let none = session
        .query(&UsersNamed { user_names: Vec::new() })
        .unwrap();
    assert_eq!(none.count(), 0);

    let stats = store.plan_cache().stats();
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.rebuilds, 2);
    assert_eq!(stats.hits, 0);
}

#[test]
fn element_predicates_search_arrays() {
    let store = store();
    seed(&store);
    let mut session = store.open_session();

    let developers = session
        .query(&UsersTagged { tag: "dev".into() })
        .unwrap();
    assert_eq!(user_names(developers), vec!["jdm", "shadetreedev"]);

    let musicians = session
        .query(&UsersTagged { tag: "music".into() })
        .unwrap();
    assert_eq!(user_names(musicians), vec!["frank"]);
}

#[test]
fn existence_and_scalar_results() {
    let store = store();
    let mut session = store.open_session();

    assert!(!session.query(&AnyInternalUsers).unwrap());
    assert_eq!(session.query(&AverageAge).unwrap(), None);

    seed(&store);

    assert!(session.query(&AnyInternalUsers).unwrap());
    assert_eq!(session.query(&AverageAge).unwrap(), Some(30.0));
}

#[test]
fn paging_binds_skip_and_take() {
    let store = store();
    seed(&store);
    let mut session = store.open_session();

    let page = session.query(&UserPage { skip: 1, take: 2 }).unwrap();
    assert_eq!(user_names(page), vec!["jdm", "max"]);

    let last = session.query(&UserPage { skip: 4, take: 10 }).unwrap();
    assert_eq!(user_names(last), vec!["shadetreedev"]);
}

#[test]
fn query_results_share_tracked_instances() {
    let store = store();
    let seeded = seed(&store);
    let mut session = store.open_session();

    let loaded = session.load::<User>(seeded[0].id).unwrap().unwrap();
    let queried = session
        .query(&UserByUserName { user_name: "jdm".into() })
        .unwrap()
        .unwrap();

    assert!(Arc::ptr_eq(&loaded, &queried));
}

#[test]
fn raw_json_bypasses_deserialization() {
    let store = store();
    seed(&store);
    let session = store.open_session();

    let body = session
        .to_json_one(&UserByUserName { user_name: "jdm".into() })
        .unwrap()
        .unwrap();
    let parsed: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["first_name"], "Jeremy");

    let bodies = session
        .to_json_many(&UsersByFirstName { first_name: "Jeremy".into() })
        .unwrap();
    assert_eq!(bodies.len(), 2);

    assert!(session.identity_map().is_empty());
}

#[test]
fn projections_shape_raw_json() {
    let store = store();
    seed(&store);
    let mut session = store.open_session();

    let bodies = session
        .to_json_many(&UserNamesByFirstName { first_name: "Jeremy".into() })
        .unwrap();
    let parsed = bodies
        .iter()
        .map(|body| serde_json::from_str::<Value>(body).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(parsed[0], serde_json::json!({ "user_name": "jdm", "age": 40 }));
    assert_eq!(parsed[1], serde_json::json!({ "user_name": "shadetreedev", "age": 35 }));

    let typed = session.query(&UserNamesByFirstName { first_name: "Jeremy".into() });
    assert!(matches!(typed, Err(DocumentStoreError::Translation { .. })));
}

#[test]
fn streams_write_json_to_a_sink() {
    let store = store();
    seed(&store);
    let session = store.open_session();

    let mut many = Vec::new();
    let written = session
        .stream_json_many(&UsersByFirstName { first_name: "Jeremy".into() }, &mut many)
        .unwrap();
    assert_eq!(written, 2);
    let parsed: Value = serde_json::from_slice(&many).unwrap();
    assert_eq!(parsed.as_array().map(Vec::len), Some(2));
    assert_eq!(parsed[1]["user_name"], "shadetreedev");

    let mut none = Vec::new();
    let found = session
        .stream_json_one(&UserByUserName { user_name: "nobody".into() }, &mut none)
        .unwrap();
    assert!(!found);
    assert!(none.is_empty());

    let mut one = Vec::new();
    assert!(session
        .stream_json_one(&UserByUserName { user_name: "max".into() }, &mut one)
        .unwrap());
    let parsed: Value = serde_json::from_slice(&one).unwrap();
    assert_eq!(parsed["first_name"], "Max");
}

#[test]
fn explain_reports_the_engine_plan() {
    let store = store();
    seed(&store);
    let session = store.open_session();

    let command = session
        .preview_command(&UsersByFirstName { first_name: "Jeremy".into() })
        .unwrap();
    assert!(command.sql.contains("json_extract(d.data, '$.first_name') IS ?"));
    assert!(command.sql.ends_with("ORDER BY json_extract(d.data, '$.user_name') ASC"));

    let plan = session
        .explain_plan(&UsersByFirstName { first_name: "Jeremy".into() })
        .unwrap();
    assert!(!plan.is_empty());
}
