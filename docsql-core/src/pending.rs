//! Writes registered by a session and applied on commit.
//!
//! Ordered by first registration. Registering the same `(type, id)` again
//! replaces the operation in place, so a store followed by a delete commits
//! as a single delete.

use std::{
    any::{TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use crate::{
    document::{AnyDocument, Document, Identity},
    value::DbValue,
};

/// What to do with a document on commit.
#[derive(Clone)]
pub enum WriteOp {
    Upsert(Arc<dyn AnyDocument>),
    Delete,
}

impl fmt::Debug for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOp::Upsert(document) => f
                .debug_tuple("Upsert")
                .field(&document.document_collection())
                .finish(),
            WriteOp::Delete => f.write_str("Delete"),
        }
    }
}

/// One pending write.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub type_id: TypeId,
    pub document: &'static str,
    pub table: String,
    pub id: DbValue,
    pub op: WriteOp,
}

/// The pending-write registry of one session.
#[derive(Debug, Default)]
pub struct PendingWrites {
    writes: Vec<PendingWrite>,
    index: HashMap<(TypeId, String), usize>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `document` for upsert into `table`.
    pub fn upsert<T: Document>(&mut self, table: &str, id: &T::Id, document: Arc<T>) {
        self.register::<T>(table, id, WriteOp::Upsert(document));
    }

    /// Registers a delete of `id` from `table`.
    pub fn delete<T: Document>(&mut self, table: &str, id: &T::Id) {
        self.register::<T>(table, id, WriteOp::Delete);
    }

    fn register<T: Document>(&mut self, table: &str, id: &T::Id, op: WriteOp) {
        let key = (TypeId::of::<T>(), format!("{id:?}"));

        match self.index.get(&key) {
            Some(&position) => self.writes[position].op = op,
            None => {
                self.index.insert(key, self.writes.len());
                self.writes.push(PendingWrite {
                    type_id: TypeId::of::<T>(),
                    document: type_name::<T>(),
                    table: table.to_string(),
                    id: id.to_db(),
                    op,
                });
            }
        }
    }

    /// Whether `id` of type `T` has a pending write.
    pub fn contains<T: Document>(&self, id: &T::Id) -> bool {
        self.index
            .contains_key(&(TypeId::of::<T>(), format!("{id:?}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingWrite> {
        self.writes.iter()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn clear(&mut self) {
        self.writes.clear();
        self.index.clear();
    }
}
