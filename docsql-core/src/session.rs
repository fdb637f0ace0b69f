//! Sessions: the unit of work.
//!
//! A [`DocumentSession`] owns an identity map, a pending-write registry and a
//! tenant id. Queries and loads run through it, and `save_changes` commits
//! its pending writes in one batch. Sessions are single-owner; open one per
//! logical task.

use std::{any::type_name, io::Write, sync::Arc};

use chrono::Utc;
use futures::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::{
    backend::{BoundCommand, RowCursor},
    cancel::{CancelToken, with_cancel},
    definition::QueryDefinition,
    document::{Document, resolve_id},
    error::DocumentStoreResult,
    identity::IdentityMap,
    pending::{PendingWrites, WriteOp},
    plan::{PlanBuilder, QueryPlan, ResultShape},
    resolver::{DocumentMapper, ResultResolver},
    sql,
    storage::StorageContext,
    store::DocumentStore,
    value::DbValue,
};

/// The output of running query definition `D` in a session.
pub type QueryOutput<'s, D> = <<D as QueryDefinition>::Result as ResultResolver<
    <D as QueryDefinition>::Document,
>>::Output<'s>;

type VersionUpdate = (std::any::TypeId, DbValue, Option<Uuid>);

/// One unit of work against a [`DocumentStore`].
#[derive(Debug)]
pub struct DocumentSession {
    store: DocumentStore,
    tenant: String,
    identity: IdentityMap,
    pending: PendingWrites,
}

impl DocumentSession {
    pub(crate) fn new(store: DocumentStore, tenant: String) -> Self {
        Self {
            store,
            tenant,
            identity: IdentityMap::new(),
            pending: PendingWrites::new(),
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// The store this session was opened from.
    pub fn document_store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn identity_map(&self) -> &IdentityMap {
        &self.identity
    }

    /// Number of writes `save_changes` would apply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn context(&mut self) -> StorageContext<'_> {
        StorageContext {
            identity: &mut self.identity,
            pending: &mut self.pending,
            tenant: &self.tenant,
            executor: self.store.executor(),
        }
    }

    fn plan<D: QueryDefinition>(
        &self,
        definition: &D,
        shape: ResultShape,
    ) -> DocumentStoreResult<Arc<QueryPlan<D>>> {
        let storage = self.store.storage::<D::Document>()?;
        let builder = PlanBuilder::new(self.store.translator(), storage.table());
        self.store
            .plan_cache()
            .plan_for(definition, shape, &builder)
    }

    fn command<D: QueryDefinition>(
        &self,
        definition: &D,
        shape: ResultShape,
    ) -> DocumentStoreResult<BoundCommand> {
        let command = self
            .plan(definition, shape)?
            .bind_values(definition, &self.tenant);
        trace!(
            definition = type_name::<D>(),
            tenant = %self.tenant,
            sql = %command.sql,
            parameters = command.params.len(),
            "bound query"
        );
        Ok(command)
    }

    // Queries

    /// Runs `definition` and returns its declared result.
    ///
    /// List results are lazy and borrow the session until dropped.
    ///
    /// # Errors
    ///
    /// Translation errors, [`NotFound`](crate::error::DocumentStoreError::NotFound)
    /// for single results with no match, and backing-store errors.
    pub fn query<D: QueryDefinition>(&mut self, definition: &D) -> DocumentStoreResult<QueryOutput<'_, D>> {
        let command = self.command(definition, <D::Result as ResultResolver<D::Document>>::SHAPE)?;
        let cursor = self.store.executor().execute(&command)?;
        <D::Result as ResultResolver<D::Document>>::resolve(
            type_name::<D>(),
            cursor,
            DocumentMapper::new(&mut self.identity),
        )
    }

    /// Suspending form of [`query`](Self::query).
    ///
    /// The first use of a document type creates its table through the
    /// executor's blocking `ensure_table`; register types on the
    /// [`DocumentStoreBuilder`](crate::store::DocumentStoreBuilder) to do that
    /// before any session runs.
    pub async fn query_async<D: QueryDefinition>(
        &mut self,
        definition: &D,
    ) -> DocumentStoreResult<QueryOutput<'_, D>> {
        self.run_query_async(definition, None).await
    }

    /// [`query_async`](Self::query_async) aborted when `cancel` is cancelled.
    pub async fn query_async_cancellable<D: QueryDefinition>(
        &mut self,
        definition: &D,
        cancel: CancelToken,
    ) -> DocumentStoreResult<QueryOutput<'_, D>> {
        self.run_query_async(definition, Some(cancel)).await
    }

    async fn run_query_async<D: QueryDefinition>(
        &mut self,
        definition: &D,
        cancel: Option<CancelToken>,
    ) -> DocumentStoreResult<QueryOutput<'_, D>> {
        let command = self.command(definition, <D::Result as ResultResolver<D::Document>>::SHAPE)?;
        let executor = self.store.executor_handle();
        let cursor = with_cancel(cancel, executor.execute_async(&command)).await?;
        <D::Result as ResultResolver<D::Document>>::resolve(
            type_name::<D>(),
            cursor,
            DocumentMapper::new(&mut self.identity),
        )
    }

    /// The command `definition` would run, without running it.
    pub fn preview_command<D: QueryDefinition>(&self, definition: &D) -> DocumentStoreResult<BoundCommand> {
        self.command(definition, <D::Result as ResultResolver<D::Document>>::SHAPE)
    }

    /// The backing store's plan description for `definition`.
    pub fn explain_plan<D: QueryDefinition>(&self, definition: &D) -> DocumentStoreResult<String> {
        let command = self.preview_command(definition)?;
        self.store.executor().explain(&command)
    }

    // Raw JSON

    fn raw_cursor<D: QueryDefinition>(&self, definition: &D, shape: ResultShape) -> DocumentStoreResult<RowCursor> {
        let command = self.command(definition, shape)?;
        self.store.executor().execute(&command)
    }

    async fn raw_cursor_async<D: QueryDefinition>(
        &self,
        definition: &D,
        shape: ResultShape,
        cancel: Option<CancelToken>,
    ) -> DocumentStoreResult<RowCursor> {
        let command = self.command(definition, shape)?;
        let executor = self.store.executor_handle();
        with_cancel(cancel, executor.execute_async(&command)).await
    }

    /// The stored JSON body of the first match, without deserializing it.
    pub fn to_json_one<D: QueryDefinition>(&self, definition: &D) -> DocumentStoreResult<Option<String>> {
        first_body(self.raw_cursor(definition, ResultShape::RawJsonSingle)?)
    }

    /// The stored JSON bodies of every match.
    pub fn to_json_many<D: QueryDefinition>(&self, definition: &D) -> DocumentStoreResult<Vec<String>> {
        all_bodies(self.raw_cursor(definition, ResultShape::RawJsonList)?)
    }

    pub async fn to_json_one_async<D: QueryDefinition>(
        &self,
        definition: &D,
    ) -> DocumentStoreResult<Option<String>> {
        first_body(
            self.raw_cursor_async(definition, ResultShape::RawJsonSingle, None)
                .await?,
        )
    }

    pub async fn to_json_one_async_cancellable<D: QueryDefinition>(
        &self,
        definition: &D,
        cancel: CancelToken,
    ) -> DocumentStoreResult<Option<String>> {
        first_body(
            self.raw_cursor_async(definition, ResultShape::RawJsonSingle, Some(cancel))
                .await?,
        )
    }

    pub async fn to_json_many_async<D: QueryDefinition>(&self, definition: &D) -> DocumentStoreResult<Vec<String>> {
        all_bodies(
            self.raw_cursor_async(definition, ResultShape::RawJsonList, None)
                .await?,
        )
    }

    pub async fn to_json_many_async_cancellable<D: QueryDefinition>(
        &self,
        definition: &D,
        cancel: CancelToken,
    ) -> DocumentStoreResult<Vec<String>> {
        all_bodies(
            self.raw_cursor_async(definition, ResultShape::RawJsonList, Some(cancel))
                .await?,
        )
    }

    /// Writes the first match's body to `sink`. Returns whether one matched;
    /// nothing is written otherwise.
    pub fn stream_json_one<D, W>(&self, definition: &D, sink: &mut W) -> DocumentStoreResult<bool>
    where
        D: QueryDefinition,
        W: Write + ?Sized,
    {
        let mut cursor = self.raw_cursor(definition, ResultShape::RawJsonSingle)?;
        match cursor.next() {
            Some(row) => {
                sink.write_all(row?.text(0)?.as_bytes())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes every match's body to `sink` as one JSON array. Returns the
    /// number of documents written.
    pub fn stream_json_many<D, W>(&self, definition: &D, sink: &mut W) -> DocumentStoreResult<usize>
    where
        D: QueryDefinition,
        W: Write + ?Sized,
    {
        let cursor = self.raw_cursor(definition, ResultShape::RawJsonList)?;

        sink.write_all(b"[")?;
        let mut count = 0;
        for row in cursor {
            if count > 0 {
                sink.write_all(b",")?;
            }
            sink.write_all(row?.text(0)?.as_bytes())?;
            count += 1;
        }
        sink.write_all(b"]")?;

        Ok(count)
    }

    pub async fn stream_json_one_async<D, W>(&self, definition: &D, sink: &mut W) -> DocumentStoreResult<bool>
    where
        D: QueryDefinition,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.write_json_one_async(definition, sink, None).await
    }

    /// [`stream_json_one_async`](Self::stream_json_one_async) aborted when
    /// `cancel` is cancelled before the row arrives.
    pub async fn stream_json_one_async_cancellable<D, W>(
        &self,
        definition: &D,
        sink: &mut W,
        cancel: CancelToken,
    ) -> DocumentStoreResult<bool>
    where
        D: QueryDefinition,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.write_json_one_async(definition, sink, Some(cancel)).await
    }

    async fn write_json_one_async<D, W>(
        &self,
        definition: &D,
        sink: &mut W,
        cancel: Option<CancelToken>,
    ) -> DocumentStoreResult<bool>
    where
        D: QueryDefinition,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut cursor = self
            .raw_cursor_async(definition, ResultShape::RawJsonSingle, cancel)
            .await?;
        match cursor.next() {
            Some(row) => {
                sink.write_all(row?.text(0)?.as_bytes()).await?;
                sink.flush().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes each body to `sink` as its row is read from the cursor.
    pub async fn stream_json_many_async<D, W>(&self, definition: &D, sink: &mut W) -> DocumentStoreResult<usize>
    where
        D: QueryDefinition,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.write_json_many_async(definition, sink, None).await
    }

    pub async fn stream_json_many_async_cancellable<D, W>(
        &self,
        definition: &D,
        sink: &mut W,
        cancel: CancelToken,
    ) -> DocumentStoreResult<usize>
    where
        D: QueryDefinition,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.write_json_many_async(definition, sink, Some(cancel)).await
    }

    async fn write_json_many_async<D, W>(
        &self,
        definition: &D,
        sink: &mut W,
        cancel: Option<CancelToken>,
    ) -> DocumentStoreResult<usize>
    where
        D: QueryDefinition,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let cursor = self
            .raw_cursor_async(definition, ResultShape::RawJsonList, cancel)
            .await?;

        sink.write_all(b"[").await?;
        let mut count = 0;
        for row in cursor {
            let row = row?;
            if count > 0 {
                sink.write_all(b",").await?;
            }
            sink.write_all(row.text(0)?.as_bytes()).await?;
            count += 1;
        }
        sink.write_all(b"]").await?;
        sink.flush().await?;

        Ok(count)
    }

    // Storage

    /// Tracks `document` and registers it for upsert on the next commit.
    ///
    /// # Errors
    ///
    /// [`DuplicateIdentity`](crate::error::DocumentStoreError::DuplicateIdentity)
    /// when a different instance with the same id is already tracked.
    pub fn store<T: Document>(&mut self, document: T) -> DocumentStoreResult<Arc<T>> {
        let storage = self.store.storage::<T>()?;
        storage.store(&mut self.context(), document)
    }

    /// Tracks an instance the caller already shares, such as one returned by a load.
    pub fn store_shared<T: Document>(&mut self, document: Arc<T>) -> DocumentStoreResult<Arc<T>> {
        let storage = self.store.storage::<T>()?;
        storage.store_shared(&mut self.context(), document)
    }

    /// Tracks `document` with an expected version, replacing any tracked
    /// instance with the same id. `None` clears the recorded version.
    pub fn store_versioned<T: Document>(
        &mut self,
        document: T,
        version: Option<Uuid>,
    ) -> DocumentStoreResult<Arc<T>> {
        let storage = self.store.storage::<T>()?;
        storage.store_versioned(&mut self.context(), document, version)
    }

    /// Stops tracking `document`. A no-op when it is not tracked.
    pub fn eject<T: Document>(&mut self, document: &T) -> DocumentStoreResult<Option<Arc<T>>> {
        let storage = self.store.storage::<T>()?;
        Ok(storage.eject(&mut self.context(), &document.id()))
    }

    pub fn eject_by_id<T: Document>(&mut self, id: impl Into<DbValue>) -> DocumentStoreResult<Option<Arc<T>>> {
        let id = resolve_id::<T>(&id.into())?;
        let storage = self.store.storage::<T>()?;
        Ok(storage.eject(&mut self.context(), &id))
    }

    /// Stops tracking `document` and registers its deletion.
    pub fn delete<T: Document>(&mut self, document: &T) -> DocumentStoreResult<()> {
        let storage = self.store.storage::<T>()?;
        storage.delete(&mut self.context(), &document.id());
        Ok(())
    }

    pub fn delete_by_id<T: Document>(&mut self, id: impl Into<DbValue>) -> DocumentStoreResult<()> {
        let id = resolve_id::<T>(&id.into())?;
        let storage = self.store.storage::<T>()?;
        storage.delete(&mut self.context(), &id);
        Ok(())
    }

    /// Loads a document by id, returning the tracked instance when there is one.
    ///
    /// # Errors
    ///
    /// [`TypeMismatch`](crate::error::DocumentStoreError::TypeMismatch) when
    /// `id` cannot represent an id of `T`.
    pub fn load<T: Document>(&mut self, id: impl Into<DbValue>) -> DocumentStoreResult<Option<Arc<T>>> {
        let id = resolve_id::<T>(&id.into())?;
        let storage = self.store.storage::<T>()?;
        storage.load(&mut self.context(), &id)
    }

    pub async fn load_async<T: Document>(
        &mut self,
        id: impl Into<DbValue>,
    ) -> DocumentStoreResult<Option<Arc<T>>> {
        let id = resolve_id::<T>(&id.into())?;
        let storage = self.store.storage::<T>()?;
        storage
            .load_async(&mut self.context(), &id, None)
            .await
    }

    pub async fn load_async_cancellable<T: Document>(
        &mut self,
        id: impl Into<DbValue>,
        cancel: CancelToken,
    ) -> DocumentStoreResult<Option<Arc<T>>> {
        let id = resolve_id::<T>(&id.into())?;
        let storage = self.store.storage::<T>()?;
        storage
            .load_async(&mut self.context(), &id, Some(cancel))
            .await
    }

    /// Loads several documents, fetching only untracked ids, in one round trip.
    ///
    /// Repeated ids yield one result; see
    /// [`DocumentStorage::load_many`](crate::storage::DocumentStorage::load_many)
    /// for ordering.
    pub fn load_many<T, I>(&mut self, ids: I) -> DocumentStoreResult<Vec<Arc<T>>>
    where
        T: Document,
        I: IntoIterator,
        I::Item: Into<DbValue>,
    {
        let ids = resolve_ids::<T, I>(ids)?;
        let storage = self.store.storage::<T>()?;
        storage.load_many(&mut self.context(), &ids)
    }

    pub async fn load_many_async<T, I>(&mut self, ids: I) -> DocumentStoreResult<Vec<Arc<T>>>
    where
        T: Document,
        I: IntoIterator,
        I::Item: Into<DbValue>,
    {
        let ids = resolve_ids::<T, I>(ids)?;
        let storage = self.store.storage::<T>()?;
        storage
            .load_many_async(&mut self.context(), &ids, None)
            .await
    }

    /// [`load_many_async`](Self::load_many_async) aborted when `cancel` is
    /// cancelled. A cancelled load tracks nothing.
    pub async fn load_many_async_cancellable<T, I>(
        &mut self,
        ids: I,
        cancel: CancelToken,
    ) -> DocumentStoreResult<Vec<Arc<T>>>
    where
        T: Document,
        I: IntoIterator,
        I::Item: Into<DbValue>,
    {
        let ids = resolve_ids::<T, I>(ids)?;
        let storage = self.store.storage::<T>()?;
        storage
            .load_many_async(&mut self.context(), &ids, Some(cancel))
            .await
    }

    /// The version recorded for a document by a load, a versioned store or a commit.
    pub fn version_of<T: Document>(&self, id: impl Into<DbValue>) -> DocumentStoreResult<Option<Uuid>> {
        let id = resolve_id::<T>(&id.into())?;
        Ok(self.identity.version::<T>(&id))
    }

    // Commit

    /// Applies every pending write in one batch and clears the registry.
    ///
    /// Each upserted document gets a fresh version, recorded in the session.
    /// Returns the number of writes applied. On failure nothing is applied and
    /// the pending writes are kept.
    pub fn save_changes(&mut self) -> DocumentStoreResult<usize> {
        let (commands, versions) = self.commit_commands()?;
        if commands.is_empty() {
            return Ok(0);
        }

        self.store
            .executor()
            .execute_batch(&commands)?;
        Ok(self.finish_commit(versions))
    }

    /// Suspending form of [`save_changes`](Self::save_changes).
    pub async fn save_changes_async(&mut self) -> DocumentStoreResult<usize> {
        self.commit_async(None).await
    }

    /// [`save_changes_async`](Self::save_changes_async) aborted when `cancel`
    /// is cancelled. A cancelled commit keeps its pending writes; a batch the
    /// backing store already started still runs to completion or rollback.
    pub async fn save_changes_async_cancellable(&mut self, cancel: CancelToken) -> DocumentStoreResult<usize> {
        self.commit_async(Some(cancel)).await
    }

    async fn commit_async(&mut self, cancel: Option<CancelToken>) -> DocumentStoreResult<usize> {
        let (commands, versions) = self.commit_commands()?;
        if commands.is_empty() {
            return Ok(0);
        }

        let executor = self.store.executor_handle();
        with_cancel(cancel, executor.execute_batch_async(&commands)).await?;
        Ok(self.finish_commit(versions))
    }

    fn commit_commands(&self) -> DocumentStoreResult<(Vec<BoundCommand>, Vec<VersionUpdate>)> {
        let modified = Utc::now().to_rfc3339();
        let tenant = DbValue::from(self.tenant.as_str());

        let mut commands = Vec::with_capacity(self.pending.len());
        let mut versions = Vec::with_capacity(self.pending.len());

        for write in self.pending.iter() {
            match &write.op {
                WriteOp::Upsert(document) => {
                    let version = Uuid::new_v4();
                    commands.push(BoundCommand::new(
                        sql::upsert(&write.table),
                        vec![
                            write.id.clone(),
                            tenant.clone(),
                            DbValue::from(document.to_any_body()?),
                            DbValue::from(version),
                            DbValue::from(modified.as_str()),
                        ],
                    ));
                    versions.push((write.type_id, write.id.clone(), Some(version)));
                }
                WriteOp::Delete => {
                    commands.push(BoundCommand::new(
                        sql::delete_by_id(&write.table),
                        vec![tenant.clone(), write.id.clone()],
                    ));
                    versions.push((write.type_id, write.id.clone(), None));
                }
            }
            debug!(document = write.document, id = ?write.id, op = ?write.op, "pending write");
        }

        Ok((commands, versions))
    }

    fn finish_commit(&mut self, versions: Vec<VersionUpdate>) -> usize {
        let applied = versions.len();
        for (type_id, id, version) in versions {
            self.identity.record_version(type_id, &id, version);
        }
        self.pending.clear();

        info!(tenant = %self.tenant, writes = applied, "committed session");
        applied
    }
}

fn first_body(mut cursor: RowCursor) -> DocumentStoreResult<Option<String>> {
    cursor
        .next()
        .map(|row| -> DocumentStoreResult<String> { Ok(row?.text(0)?.to_string()) })
        .transpose()
}

fn all_bodies(cursor: RowCursor) -> DocumentStoreResult<Vec<String>> {
    cursor
        .map(|row| -> DocumentStoreResult<String> { Ok(row?.text(0)?.to_string()) })
        .collect()
}

fn resolve_ids<T, I>(ids: I) -> DocumentStoreResult<Vec<T::Id>>
where
    T: Document,
    I: IntoIterator,
    I::Item: Into<DbValue>,
{
    ids.into_iter()
        .map(|id| resolve_id::<T>(&id.into()))
        .collect()
}
