//! Backing-store abstraction.
//!
//! The [`CommandExecutor`] trait is the only way this crate talks to the
//! relational engine: it runs bound commands and hands back a forward-only
//! [`RowCursor`]. Sync and suspending forms are both required and must
//! behave identically apart from how they wait.
//!
//! # Traits
//!
//! - [`CommandExecutor`]: executes commands, batches, and explains
//! - [`CommandExecutorBuilder`]: factory trait for creating executors
//!
//! # Examples
//!
//! ```ignore
//! use docsql::backend::{BoundCommand, CommandExecutor};
//! use docsql::value::DbValue;
//!
//! let command = BoundCommand::new(
//!     "SELECT d.data FROM mt_doc_users AS d WHERE d.tenant_id = ?",
//!     vec![DbValue::from("*DEFAULT*")],
//! );
//!
//! for row in executor.execute(&command)? {
//!     println!("{}", row?.text(0)?);
//! }
//! ```

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;

use crate::{
    error::DocumentStoreResult,
    value::{DbValue, Row},
};

/// A command template with its placeholder values, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCommand {
    /// Command text with positional `?` placeholders.
    pub sql: String,
    /// One value per placeholder, in order.
    pub params: Vec<DbValue>,
}

impl BoundCommand {
    pub fn new(sql: impl Into<String>, params: Vec<DbValue>) -> Self {
        Self { sql: sql.into(), params }
    }
}

/// Forward-only, single-pass sequence of result rows.
///
/// Dropping the cursor releases it, whether or not it was fully consumed.
pub type RowCursor = Box<dyn Iterator<Item = DocumentStoreResult<Row>> + Send>;

/// Abstract interface for the relational backing store.
///
/// # Thread Safety
///
/// Implementations are shared by every session of a store and must support
/// concurrent calls.
///
/// # Error Handling
///
/// Failures are reported as [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend)
/// and are never retried by callers.
#[async_trait]
pub trait CommandExecutor: Send + Sync + Debug {
    /// Executes a query command and returns its rows.
    fn execute(&self, command: &BoundCommand) -> DocumentStoreResult<RowCursor>;

    /// Suspending form of [`execute`](Self::execute).
    ///
    /// Dropping the returned future abandons the round trip.
    async fn execute_async(&self, command: &BoundCommand) -> DocumentStoreResult<RowCursor>;

    /// Executes write commands atomically: either all apply or none do.
    fn execute_batch(&self, commands: &[BoundCommand]) -> DocumentStoreResult<()>;

    /// Suspending form of [`execute_batch`](Self::execute_batch).
    async fn execute_batch_async(&self, commands: &[BoundCommand]) -> DocumentStoreResult<()>;

    /// Returns the engine's description of how it would run `command`.
    fn explain(&self, command: &BoundCommand) -> DocumentStoreResult<String>;

    /// Creates the document table `table` if it does not exist.
    ///
    /// Columns: `id` (untyped, so integer and text ids keep their
    /// representation), `tenant_id`, `data`, `mt_version`, `mt_last_modified`;
    /// primary key `(tenant_id, id)`.
    fn ensure_table(&self, table: &str) -> DocumentStoreResult<()>;

    /// Releases connections and other resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<E> CommandExecutor for Arc<E>
where
    E: CommandExecutor + ?Sized,
{
    fn execute(&self, command: &BoundCommand) -> DocumentStoreResult<RowCursor> {
        (**self).execute(command)
    }

    async fn execute_async(&self, command: &BoundCommand) -> DocumentStoreResult<RowCursor> {
        (**self)
            .execute_async(command)
            .await
    }

    fn execute_batch(&self, commands: &[BoundCommand]) -> DocumentStoreResult<()> {
        (**self).execute_batch(commands)
    }

    async fn execute_batch_async(&self, commands: &[BoundCommand]) -> DocumentStoreResult<()> {
        (**self)
            .execute_batch_async(commands)
            .await
    }

    fn explain(&self, command: &BoundCommand) -> DocumentStoreResult<String> {
        (**self).explain(command)
    }

    fn ensure_table(&self, table: &str) -> DocumentStoreResult<()> {
        (**self).ensure_table(table)
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        (**self).shutdown().await
    }
}

/// Factory trait for creating executors, usually from connection settings.
#[async_trait]
pub trait CommandExecutorBuilder {
    type Executor: CommandExecutor;

    async fn build(self) -> DocumentStoreResult<Self::Executor>;
}
