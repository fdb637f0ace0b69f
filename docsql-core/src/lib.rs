//! A JSON document store over a relational engine, with compiled queries.
//!
//! This crate is the core of the docsql project and provides:
//!
//! - **Documents** ([`document`]) - Traits for persisted types and their ids
//! - **Query shapes** ([`query`]) - The closed set of fragments a query is built from
//! - **Query definitions** ([`definition`]) - Typed, parameterized, reusable queries
//! - **Plans** ([`plan`], [`cache`]) - Translate once per definition type, bind many times
//! - **Translation** ([`translator`], [`sql`]) - Query shapes to JSON SQL
//! - **Result resolvers** ([`resolver`]) - Single, list, scalar and existence results
//! - **Sessions** ([`session`]) - Unit of work with an identity map and pending writes
//! - **Storage** ([`storage`]) - Per-type store, eject and load
//! - **Backing store** ([`backend`]) - The executor trait implemented by engines
//! - **Configuration** ([`config`], [`store`]) - Store options and the store builder
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docsql::prelude::*;
//!
//! #[derive(Debug, Serialize, Deserialize, Document)]
//! #[document(name = "users")]
//! pub struct User {
//!     #[id]
//!     pub id: Uuid,
//!     pub first_name: String,
//!     pub user_name: String,
//! }
//!
//! pub struct UsersByFirstName {
//!     pub first_name: String,
//! }
//!
//! impl QueryDefinition for UsersByFirstName {
//!     type Document = User;
//!     type Result = ToList;
//!
//!     fn shape() -> DefinitionShape<Self> {
//!         QueryShape::new().filter(Filter::eq("first_name", param!(first_name)))
//!     }
//! }
//!
//! let mut session = store.open_session();
//! for user in session.query(&UsersByFirstName { first_name: "Jeremy".into() })? {
//!     println!("{}", user?.user_name);
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod definition;
pub mod document;
pub mod error;
pub mod identity;
pub mod pending;
pub mod plan;
pub mod query;
pub mod resolver;
pub mod session;
pub mod sql;
pub mod storage;
pub mod store;
pub mod translator;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;
