//! SQLite backing store for docsql.
//!
//! This crate implements [`CommandExecutor`](docsql_core::backend::CommandExecutor)
//! on top of an embedded SQLite database through `rusqlite`. Document bodies are
//! stored as JSON text and queried with SQLite's built-in JSON functions.
//!
//! To use this backend, include the `sqlite` feature in your `Cargo.toml`
//! (it is enabled by default):
//!
//! ```toml
//! [dependencies]
//! docsql = { version = "x.y.z", features = ["sqlite"] }
//! ```
//!
//! # Features
//!
//! - **File or in-memory databases** - Open a database file or a private in-memory one
//! - **Atomic batches** - Pending session writes commit in one transaction
//! - **Suspending calls** - Async operations run on tokio's blocking pool
//! - **Plan inspection** - `explain` returns SQLite's `EXPLAIN QUERY PLAN` output
//!
//! # Example
//!
//! ```ignore
//! use docsql::{backend::CommandExecutorBuilder, prelude::*, sqlite::SqliteExecutor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = SqliteExecutor::builder()
//!         .path("documents.db")
//!         .build()
//!         .await?;
//!     let store = DocumentStore::builder(executor).build()?;
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod executor;
mod value;

pub use error::SqliteError;
pub use executor::{SqliteExecutor, SqliteExecutorBuilder};
