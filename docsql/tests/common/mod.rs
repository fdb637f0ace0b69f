#![allow(dead_code)]

use std::sync::Arc;

use docsql::{prelude::*, sqlite::SqliteExecutor};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(name = "users")]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub user_name: String,
    pub internal: bool,
    pub age: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl User {
    pub fn new(first_name: &str, last_name: &str, user_name: &str) -> Self {
        Self {
            id: Uuid::nil(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            user_name: user_name.to_string(),
            internal: false,
            age: 30,
            tags: Vec::new(),
        }
    }

    pub fn with_age(mut self, age: i64) -> Self {
        self.age = age;
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|tag| tag.to_string()).collect();
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

/// A document keyed by an integer the caller assigns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
pub struct Issue {
    #[id]
    pub number: i64,
    pub title: String,
}

/// A document with an optional field, for null comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(name = "pets")]
pub struct Pet {
    pub id: Uuid,
    pub name: String,
    pub nickname: Option<String>,
}

impl Pet {
    pub fn new(name: &str, nickname: Option<&str>) -> Self {
        Self {
            id: Uuid::nil(),
            name: name.to_string(),
            nickname: nickname.map(str::to_string),
        }
    }
}

pub struct PetsByNickname {
    pub nickname: Option<String>,
}

impl QueryDefinition for PetsByNickname {
    type Document = Pet;
    type Result = Count;

    fn shape() -> DefinitionShape<Self> {
        QueryShape::new()
            .filter(Filter::eq("nickname", param!(nickname)))
            .count()
    }
}

pub struct UsersByFirstName {
    pub first_name: String,
}

impl QueryDefinition for UsersByFirstName {
    type Document = User;
    type Result = ToList;

    fn shape() -> DefinitionShape<Self> {
        QueryShape::new()
            .filter(Filter::eq("first_name", param!(first_name)))
            .order_by("user_name", SortDirection::Asc)
    }
}

pub struct CountByFirstName {
    pub first_name: String,
}

impl QueryDefinition for CountByFirstName {
    type Document = User;
    type Result = Count;

    fn shape() -> DefinitionShape<Self> {
        QueryShape::new()
            .filter(Filter::eq("first_name", param!(first_name)))
            .count()
    }
}

pub struct UserByUserName {
    pub user_name: String,
}

impl QueryDefinition for UserByUserName {
    type Document = User;
    type Result = SingleOrDefault;

    fn shape() -> DefinitionShape<Self> {
        QueryShape::new().filter(Filter::eq("user_name", param!(user_name)))
    }
}

pub struct RequiredUser {
    pub user_name: String,
}

impl QueryDefinition for RequiredUser {
    type Document = User;
    type Result = Single;

    fn shape() -> DefinitionShape<Self> {
        QueryShape::new().filter(Filter::eq("user_name", param!(user_name)))
    }
}

pub struct OnlyUserNamed {
    pub first_name: String,
}

impl QueryDefinition for OnlyUserNamed {
    type Document = User;
    type Result = Single;

    fn shape() -> DefinitionShape<Self> {
        QueryShape::new().filter(Filter::eq("first_name", param!(first_name)))
    }
}

pub struct UsersNamed {
    pub user_names: Vec<String>,
}

impl QueryDefinition for UsersNamed {
    type Document = User;
    type Result = ToList;

    fn shape() -> DefinitionShape<Self> {
        QueryShape::new()
            .filter(Filter::any_of("user_name", param!(user_names)))
            .order_by("user_name", SortDirection::Asc)
    }
}

pub struct UsersTagged {
    pub tag: String,
}

impl QueryDefinition for UsersTagged {
    type Document = User;
    type Result = ToList;

    fn shape() -> DefinitionShape<Self> {
        QueryShape::new()
            .filter(Filter::any_element("tags", Filter::eq("", param!(tag))))
            .order_by("user_name", SortDirection::Asc)
    }
}

pub struct AnyInternalUsers;

impl QueryDefinition for AnyInternalUsers {
    type Document = User;
    type Result = Exists;

    fn shape() -> DefinitionShape<Self> {
        QueryShape::new()
            .filter(Filter::eq("internal", true))
            .exists()
    }
}

pub struct AverageAge;

impl QueryDefinition for AverageAge {
    type Document = User;
    type Result = ScalarValue;

    fn shape() -> DefinitionShape<Self> {
        QueryShape::new().aggregate(AggregateOp::Average, "age")
    }
}

pub struct UserPage {
    pub skip: i64,
    pub take: i64,
}

impl QueryDefinition for UserPage {
    type Document = User;
    type Result = ToList;

    fn shape() -> DefinitionShape<Self> {
        QueryShape::new()
            .order_by("user_name", SortDirection::Asc)
            .skip(param!(skip))
            .take(param!(take))
    }
}

pub struct UserNamesByFirstName {
    pub first_name: String,
}

impl QueryDefinition for UserNamesByFirstName {
    type Document = User;
    type Result = ToList;

    fn shape() -> DefinitionShape<Self> {
        QueryShape::new()
            .filter(Filter::eq("first_name", param!(first_name)))
            .select(["user_name", "age"])
            .order_by("user_name", SortDirection::Asc)
    }
}

pub fn store() -> DocumentStore {
    let executor = SqliteExecutor::in_memory().expect("in-memory database");

    DocumentStore::builder(executor)
        .register::<User>()
        .register::<Pet>()
        .build()
        .expect("document store")
}

/// Five users, two of them named Jeremy.
pub fn seed(store: &DocumentStore) -> Vec<Arc<User>> {
    let mut session = store.open_session();

    let users = vec![
        User::new("Jeremy", "Miller", "jdm").with_age(40).with_tags(&["admin", "dev"]),
        User::new("Jeremy", "Tree", "shadetreedev").with_age(35).with_tags(&["dev"]),
        User::new("Lindsey", "Miller", "myusername").with_age(30).internal(),
        User::new("Max", "Miller", "max").with_age(20),
        User::new("Frank", "Zappa", "frank").with_age(25).with_tags(&["music"]),
    ];

    let stored = users
        .into_iter()
        .map(|user| session.store(user))
        .collect::<DocumentStoreResult<Vec<_>>>()
        .expect("store users");
    session.save_changes().expect("commit seed");

    stored
}
