//! Main docsql crate providing document-oriented access over a relational store.
//!
//! This crate is the primary entry point for users of the docsql framework.
//! It re-exports the core types from `docsql-core`, the `Document` derive, and
//! the SQLite backing store.
//!
//! # Features
//!
//! - **Typed documents** - Define your data structures with Serde and `#[derive(Document)]`
//! - **Compiled queries** - Query definitions are translated once per type and reused with new values
//! - **Identity map** - A session hands out one shared instance per document id
//! - **Unit of work** - Stores and deletes are committed together by `save_changes`
//! - **Multi-tenancy** - Every command is scoped to the session's tenant
//!
//! # Quick Start
//!
//! ```ignore
//! use docsql::{prelude::*, sqlite::SqliteExecutor};
//! use serde::{Deserialize, Serialize};
//! use uuid::Uuid;
//!
//! #[derive(Debug, Serialize, Deserialize, Document)]
//! #[document(name = "users")]
//! pub struct User {
//!     pub id: Uuid,
//!     pub first_name: String,
//!     pub user_name: String,
//! }
//!
//! pub struct UserByName {
//!     pub user_name: String,
//! }
//!
//! impl QueryDefinition for UserByName {
//!     type Document = User;
//!     type Result = SingleOrDefault;
//!
//!     fn shape() -> DefinitionShape<Self> {
//!         QueryShape::new().filter(Filter::eq("user_name", param!(user_name)))
//!     }
//! }
//!
//! fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::builder(SqliteExecutor::in_memory()?).build()?;
//!
//!     let mut session = store.open_session();
//!     session.store(User {
//!         id: Uuid::nil(),
//!         first_name: "Jeremy".into(),
//!         user_name: "jdm".into(),
//!     })?;
//!     session.save_changes()?;
//!
//!     let user = session.query(&UserByName { user_name: "jdm".into() })?;
//!     println!("found: {user:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`sqlite`] - Embedded SQLite backing store (requires the `sqlite` feature, on by default)

#[allow(unused_extern_crates)]
extern crate self as docsql;

pub mod prelude;

pub use docsql_core::{
    backend, cache, cancel, config, definition, document, error, identity, pending, plan, query,
    resolver, session, sql, storage, store, translator, value,
};
pub use docsql_core::param;
pub use docsql_macros::Document;

// Re-exported so derived documents and definitions need no extra dependencies
pub use serde;
pub use serde_json;
pub use uuid;

/// SQLite backing store.
///
/// This module is only available when the `sqlite` feature is enabled.
#[cfg(feature = "sqlite")]
pub mod sqlite {
    pub use docsql_sqlite::{SqliteError, SqliteExecutor, SqliteExecutorBuilder};
}
