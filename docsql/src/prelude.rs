//! Convenient re-exports of commonly used types from docsql.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docsql::prelude::*;
//! ```
//!
//! This provides access to:
//! - Document traits and the `Document` derive
//! - Query shapes, definitions and result markers
//! - The store, its builder and sessions
//! - Executor traits and error types

pub use docsql_core::{
    backend::{BoundCommand, CommandExecutor, CommandExecutorBuilder, RowCursor},
    cancel::{CancelHandle, CancelToken, cancellation},
    config::{AutoCreate, StoreOptions},
    definition::{DefinitionShape, Param, QueryDefinition},
    document::{Document, DocumentExt, Identity},
    error::{DocumentStoreError, DocumentStoreResult},
    param,
    query::{AggregateOp, Expr, Filter, QueryShape, SortDirection},
    resolver::{Count, Exists, QueryResults, ResultResolver, ScalarValue, Single, SingleOrDefault, ToList},
    session::DocumentSession,
    store::{DocumentStore, DocumentStoreBuilder},
    value::DbValue,
};
pub use docsql_macros::Document;
