//! Per-document-type storage.
//!
//! [`DocumentStorage`] is created once per document type by the store and
//! shared by every session. It holds no per-call state: each operation gets
//! the calling session's identity map, pending writes, tenant and executor
//! through a [`StorageContext`].

use std::{any::type_name, collections::HashSet, fmt, marker::PhantomData, sync::Arc};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::{
    backend::{BoundCommand, CommandExecutor, RowCursor},
    cancel::{CancelToken, with_cancel},
    document::{Document, Identity},
    error::{DocumentStoreError, DocumentStoreResult},
    identity::IdentityMap,
    pending::PendingWrites,
    resolver::DocumentMapper,
    sql,
    value::DbValue,
};

/// The session state a storage operation reads and mutates.
pub struct StorageContext<'s> {
    pub identity: &'s mut IdentityMap,
    pub pending: &'s mut PendingWrites,
    pub tenant: &'s str,
    pub executor: &'s dyn CommandExecutor,
}

/// Store, eject and load operations for documents of type `T`.
pub struct DocumentStorage<T: Document> {
    table: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> DocumentStorage<T> {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            _marker: PhantomData,
        }
    }

    /// The backing table of `T`.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Tracks `document` and registers it for upsert, generating an id first
    /// when it has none.
    ///
    /// Storing the instance the session already tracks again is allowed.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::DuplicateIdentity`] when the session tracks a
    /// different instance with the same id, and
    /// [`DocumentStoreError::InvalidDocument`] when the document has no id
    /// and `T::Id` cannot be generated.
    pub fn store(&self, cx: &mut StorageContext<'_>, document: T) -> DocumentStoreResult<Arc<T>> {
        self.track(cx, Arc::new(assign_id(document)?), None)
    }

    /// Like [`store`](Self::store) for an instance the caller already shares.
    pub fn store_shared(
        &self,
        cx: &mut StorageContext<'_>,
        document: Arc<T>,
    ) -> DocumentStoreResult<Arc<T>> {
        if document.id().is_unassigned() {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "{} must have an id before it is stored as a shared instance",
                type_name::<T>()
            )));
        }
        self.track(cx, document, None)
    }

    /// Tracks `document`, replacing any tracked instance with the same id,
    /// and records `version` as its expected version (`None` clears it).
    pub fn store_versioned(
        &self,
        cx: &mut StorageContext<'_>,
        document: T,
        version: Option<Uuid>,
    ) -> DocumentStoreResult<Arc<T>> {
        self.track(cx, Arc::new(assign_id(document)?), Some(version))
    }

    fn track(
        &self,
        cx: &mut StorageContext<'_>,
        document: Arc<T>,
        version: Option<Option<Uuid>>,
    ) -> DocumentStoreResult<Arc<T>> {
        let id = document.id();

        let conflicting = version.is_none()
            && cx
                .identity
                .get::<T>(&id)
                .is_some_and(|existing| !Arc::ptr_eq(&existing, &document));
        if conflicting {
            return Err(DocumentStoreError::DuplicateIdentity(
                format!("{id:?}"),
                type_name::<T>(),
            ));
        }

        cx.identity
            .insert(id.clone(), Arc::clone(&document))?;
        if let Some(version) = version {
            cx.identity.set_version::<T>(&id, version)?;
        }
        cx.pending
            .upsert(&self.table, &id, Arc::clone(&document));

        trace!(document = type_name::<T>(), ?id, "stored document");
        Ok(document)
    }

    /// Stops tracking `id`. Pending writes are unaffected.
    pub fn eject(&self, cx: &mut StorageContext<'_>, id: &T::Id) -> Option<Arc<T>> {
        cx.identity.remove::<T>(id)
    }

    /// Stops tracking `id` and registers it for deletion.
    pub fn delete(&self, cx: &mut StorageContext<'_>, id: &T::Id) {
        cx.identity.remove::<T>(id);
        cx.pending.delete::<T>(&self.table, id);
    }

    /// Returns the tracked instance, or fetches the document by id.
    ///
    /// A tracked instance is returned without I/O, even if the backing store
    /// has changed since it was tracked.
    pub fn load(&self, cx: &mut StorageContext<'_>, id: &T::Id) -> DocumentStoreResult<Option<Arc<T>>> {
        if let Some(document) = cx.identity.get::<T>(id) {
            trace!(document = type_name::<T>(), ?id, "identity map hit");
            return Ok(Some(document));
        }

        let cursor = cx
            .executor
            .execute(&self.load_command(cx.tenant, id))?;
        map_first::<T>(cx.identity, cursor)
    }

    /// Suspending form of [`load`](Self::load).
    pub async fn load_async(
        &self,
        cx: &mut StorageContext<'_>,
        id: &T::Id,
        cancel: Option<CancelToken>,
    ) -> DocumentStoreResult<Option<Arc<T>>> {
        if let Some(document) = cx.identity.get::<T>(id) {
            trace!(document = type_name::<T>(), ?id, "identity map hit");
            return Ok(Some(document));
        }

        let command = self.load_command(cx.tenant, id);
        let cursor = with_cancel(cancel, cx.executor.execute_async(&command)).await?;
        map_first::<T>(cx.identity, cursor)
    }

    /// Loads several documents: tracked ones without I/O, the rest with one
    /// batched fetch.
    ///
    /// Repeated ids are fetched and returned once. Tracked documents come
    /// first in input order, then fetched ones in backing-store order; ids
    /// with no document are skipped.
    pub fn load_many(
        &self,
        cx: &mut StorageContext<'_>,
        ids: &[T::Id],
    ) -> DocumentStoreResult<Vec<Arc<T>>> {
        let (mut found, missing) = partition::<T>(cx.identity, ids);
        if missing.is_empty() {
            return Ok(found);
        }

        let command = self.load_many_command(cx.tenant, &missing);
        let cursor = cx.executor.execute(&command)?;
        self.map_fetched(cx.identity, cursor, &mut found, missing.len())?;
        Ok(found)
    }

    /// Suspending form of [`load_many`](Self::load_many).
    pub async fn load_many_async(
        &self,
        cx: &mut StorageContext<'_>,
        ids: &[T::Id],
        cancel: Option<CancelToken>,
    ) -> DocumentStoreResult<Vec<Arc<T>>> {
        let (mut found, missing) = partition::<T>(cx.identity, ids);
        if missing.is_empty() {
            return Ok(found);
        }

        let command = self.load_many_command(cx.tenant, &missing);
        let cursor = with_cancel(cancel, cx.executor.execute_async(&command)).await?;
        self.map_fetched(cx.identity, cursor, &mut found, missing.len())?;
        Ok(found)
    }

    fn map_fetched(
        &self,
        identity: &mut IdentityMap,
        cursor: RowCursor,
        found: &mut Vec<Arc<T>>,
        requested: usize,
    ) -> DocumentStoreResult<()> {
        let mapped = found.len();
        let mut mapper = DocumentMapper::<T>::new(identity);
        for row in cursor {
            found.push(mapper.map_row(row?)?);
        }

        debug!(
            document = type_name::<T>(),
            mapped,
            requested,
            fetched = found.len() - mapped,
            "batched document load"
        );
        Ok(())
    }

    fn load_command(&self, tenant: &str, id: &T::Id) -> BoundCommand {
        BoundCommand::new(sql::select_by_id(&self.table), vec![DbValue::from(tenant), id.to_db()])
    }

    fn load_many_command(&self, tenant: &str, ids: &[T::Id]) -> BoundCommand {
        let params = std::iter::once(DbValue::from(tenant))
            .chain(ids.iter().map(Identity::to_db))
            .collect();
        BoundCommand::new(sql::select_by_ids(&self.table, ids.len()), params)
    }
}

impl<T: Document> fmt::Debug for DocumentStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStorage")
            .field("document", &type_name::<T>())
            .field("table", &self.table)
            .finish()
    }
}

fn assign_id<T: Document>(mut document: T) -> DocumentStoreResult<T> {
    if document.id().is_unassigned() {
        match T::Id::generate() {
            Some(id) => document.set_id(id),
            None => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "{} has no id and {} ids cannot be generated",
                    type_name::<T>(),
                    <T::Id as Identity>::KIND
                )));
            }
        }
    }
    Ok(document)
}

/// Splits `ids` into tracked instances and distinct untracked ids.
fn partition<T: Document>(identity: &IdentityMap, ids: &[T::Id]) -> (Vec<Arc<T>>, Vec<T::Id>) {
    let mut seen = HashSet::with_capacity(ids.len());
    let mut found = Vec::new();
    let mut missing = Vec::new();

    for id in ids {
        if !seen.insert(id) {
            continue;
        }
        match identity.get::<T>(id) {
            Some(document) => found.push(document),
            None => missing.push(id.clone()),
        }
    }

    (found, missing)
}

fn map_first<T: Document>(
    identity: &mut IdentityMap,
    mut cursor: RowCursor,
) -> DocumentStoreResult<Option<Arc<T>>> {
    let mut mapper = DocumentMapper::<T>::new(identity);
    cursor
        .next()
        .map(|row| mapper.map_row(row?))
        .transpose()
}
