use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, params_from_iter};
use tracing::{debug, info};

use docsql_core::{
    backend::{BoundCommand, CommandExecutor, CommandExecutorBuilder, RowCursor},
    error::{DocumentStoreError, DocumentStoreResult},
    sql,
    value::Row,
};

use crate::{
    error::SqliteError,
    value::{from_sql, to_sql},
};

/// A [`CommandExecutor`] over a single SQLite connection.
///
/// The connection is shared behind a mutex, so commands from concurrent
/// sessions run one at a time. Cloning the executor shares the connection.
/// Result rows are read in full before the cursor is returned, so the lock
/// is never held by a cursor the caller has not finished with.
#[derive(Clone)]
pub struct SqliteExecutor {
    connection: Arc<Mutex<Connection>>,
    location: String,
}

impl SqliteExecutor {
    pub fn new(connection: Connection) -> Self {
        let location = connection
            .path()
            .filter(|path| !path.is_empty())
            .unwrap_or(":memory:")
            .to_string();

        Self {
            connection: Arc::new(Mutex::new(connection)),
            location,
        }
    }

    pub fn builder() -> SqliteExecutorBuilder {
        SqliteExecutorBuilder::new()
    }

    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DocumentStoreResult<Self> {
        Connection::open(path)
            .map(Self::new)
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> DocumentStoreResult<Self> {
        Connection::open_in_memory()
            .map(Self::new)
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    async fn blocking<R, F>(&self, work: F) -> DocumentStoreResult<R>
    where
        F: FnOnce(&mut Connection) -> Result<R, SqliteError> + Send + 'static,
        R: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);

        let result = tokio::task::spawn_blocking(move || {
            let mut guard = connection.lock();
            work(&mut *guard)
        })
        .await
        .map_err(SqliteError::from)?;

        Ok(result?)
    }
}

fn query_rows(connection: &Connection, command: &BoundCommand) -> Result<Vec<Row>, SqliteError> {
    debug!(sql = %command.sql, params = command.params.len(), "executing query");

    let mut statement = connection.prepare_cached(&command.sql)?;
    let columns = statement.column_count();
    let mut rows = statement.query(params_from_iter(command.params.iter().map(to_sql)))?;

    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let values = (0..columns)
            .map(|index| row.get_ref(index).map(from_sql))
            .collect::<Result<Vec<_>, _>>()?;
        collected.push(Row::new(values));
    }

    Ok(collected)
}

fn run_batch(connection: &mut Connection, commands: &[BoundCommand]) -> Result<(), SqliteError> {
    debug!(commands = commands.len(), "executing batch");

    let transaction = connection.transaction()?;
    for command in commands {
        transaction.execute(&command.sql, params_from_iter(command.params.iter().map(to_sql)))?;
    }
    transaction.commit()?;

    Ok(())
}

fn cursor(rows: Vec<Row>) -> RowCursor {
    Box::new(rows.into_iter().map(Ok::<_, DocumentStoreError>))
}

#[async_trait]
impl CommandExecutor for SqliteExecutor {
    fn execute(&self, command: &BoundCommand) -> DocumentStoreResult<RowCursor> {
        let rows = query_rows(&self.connection.lock(), command)?;
        Ok(cursor(rows))
    }

    async fn execute_async(&self, command: &BoundCommand) -> DocumentStoreResult<RowCursor> {
        let command = command.clone();
        let rows = self
            .blocking(move |connection| query_rows(connection, &command))
            .await?;

        Ok(cursor(rows))
    }

    fn execute_batch(&self, commands: &[BoundCommand]) -> DocumentStoreResult<()> {
        Ok(run_batch(&mut self.connection.lock(), commands)?)
    }

    async fn execute_batch_async(&self, commands: &[BoundCommand]) -> DocumentStoreResult<()> {
        let commands = commands.to_vec();
        self.blocking(move |connection| run_batch(connection, &commands))
            .await
    }

    fn explain(&self, command: &BoundCommand) -> DocumentStoreResult<String> {
        let explain = BoundCommand::new(
            format!("EXPLAIN QUERY PLAN {}", command.sql),
            command.params.clone(),
        );

        // columns: id, parent, notused, detail
        let rows = query_rows(&self.connection.lock(), &explain)?;
        let details = rows
            .iter()
            .map(|row| row.text(3).map(str::to_string))
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        Ok(details.join("\n"))
    }

    fn ensure_table(&self, table: &str) -> DocumentStoreResult<()> {
        let table = sql::table_name(table).map_err(DocumentStoreError::InvalidDocument)?;

        debug!(table = %table, "ensuring document table");
        self.connection
            .lock()
            .execute_batch(&sql::create_table(table))
            .map_err(SqliteError::from)?;

        Ok(())
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        info!(location = %self.location, "closing SQLite executor");
        Ok(())
    }
}

impl fmt::Debug for SqliteExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteExecutor")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SqliteExecutor`].
///
/// Defaults to a private in-memory database.
#[derive(Debug, Clone, Default)]
pub struct SqliteExecutorBuilder {
    path: Option<PathBuf>,
    busy_timeout: Option<Duration>,
}

impl SqliteExecutorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn in_memory(mut self) -> Self {
        self.path = None;
        self
    }

    /// How long a command waits on a database locked by another process.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl CommandExecutorBuilder for SqliteExecutorBuilder {
    type Executor = SqliteExecutor;

    async fn build(self) -> DocumentStoreResult<Self::Executor> {
        let connection = match &self.path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if let Some(timeout) = self.busy_timeout {
            connection
                .busy_timeout(timeout)
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        }

        let executor = SqliteExecutor::new(connection);
        info!(location = %executor.location, "opened SQLite executor");
        Ok(executor)
    }
}
