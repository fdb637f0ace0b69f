//! Per-session identity map.
//!
//! Holds at most one live instance per `(document type, id)` for the lifetime
//! of a session, plus the concurrency version last seen for each id. Inner
//! maps are created on first use of a type and are typed; the registry only
//! holds them type-erased, and they are downcast at the accessor.

use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use uuid::Uuid;

use crate::{
    document::{Document, Identity},
    error::{DocumentStoreError, DocumentStoreResult},
    value::DbValue,
};

/// Instances and versions of one document type.
struct TypedSlot<T: Document> {
    documents: HashMap<T::Id, Arc<T>>,
    versions: HashMap<T::Id, Uuid>,
}

impl<T: Document> Default for TypedSlot<T> {
    fn default() -> Self {
        Self {
            documents: HashMap::new(),
            versions: HashMap::new(),
        }
    }
}

/// Operations the registry needs without knowing the document type.
trait ErasedSlot: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn record_version(&mut self, key: &DbValue, version: Option<Uuid>);
    fn len(&self) -> usize;
}

impl<T: Document> ErasedSlot for TypedSlot<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn record_version(&mut self, key: &DbValue, version: Option<Uuid>) {
        let Some(id) = T::Id::from_db(key) else {
            return;
        };
        match version {
            Some(version) => self.versions.insert(id, version),
            None => self.versions.remove(&id),
        };
    }

    fn len(&self) -> usize {
        self.documents.len()
    }
}

/// Document type to (id to instance) registry scoped to one session.
#[derive(Default)]
pub struct IdentityMap {
    slots: HashMap<TypeId, Box<dyn ErasedSlot>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot<T: Document>(&self) -> Option<&TypedSlot<T>> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.as_any().downcast_ref())
    }

    fn slot_mut<T: Document>(&mut self) -> DocumentStoreResult<&mut TypedSlot<T>> {
        self.slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(TypedSlot::<T>::default()) as Box<dyn ErasedSlot>)
            .as_any_mut()
            .downcast_mut()
            .ok_or_else(|| {
                DocumentStoreError::InvalidDocument(format!(
                    "identity map slot for {} holds another type",
                    type_name::<T>()
                ))
            })
    }

    /// Returns the tracked instance for `id`, if any.
    pub fn get<T: Document>(&self, id: &T::Id) -> Option<Arc<T>> {
        self.slot::<T>()
            .and_then(|slot| slot.documents.get(id))
            .cloned()
    }

    pub fn contains<T: Document>(&self, id: &T::Id) -> bool {
        self.slot::<T>()
            .is_some_and(|slot| slot.documents.contains_key(id))
    }

    /// Tracks `document` under `id`, returning the instance it replaced.
    pub fn insert<T: Document>(
        &mut self,
        id: T::Id,
        document: Arc<T>,
    ) -> DocumentStoreResult<Option<Arc<T>>> {
        Ok(self
            .slot_mut::<T>()?
            .documents
            .insert(id, document))
    }

    /// Stops tracking `id`. Returns the instance that was tracked.
    pub fn remove<T: Document>(&mut self, id: &T::Id) -> Option<Arc<T>> {
        self.slots
            .get_mut(&TypeId::of::<T>())
            .and_then(|slot| slot.as_any_mut().downcast_mut::<TypedSlot<T>>())
            .and_then(|slot| slot.documents.remove(id))
    }

    /// The concurrency version recorded for `id`.
    pub fn version<T: Document>(&self, id: &T::Id) -> Option<Uuid> {
        self.slot::<T>()
            .and_then(|slot| slot.versions.get(id))
            .copied()
    }

    /// Records or clears the version for `id`.
    pub fn set_version<T: Document>(
        &mut self,
        id: &T::Id,
        version: Option<Uuid>,
    ) -> DocumentStoreResult<()> {
        let slot = self.slot_mut::<T>()?;
        match version {
            Some(version) => slot.versions.insert(id.clone(), version),
            None => slot.versions.remove(id),
        };
        Ok(())
    }

    /// Records a version for a document known only by type and id value.
    ///
    /// Does nothing when no instance of that type was ever tracked.
    pub fn record_version(&mut self, type_id: TypeId, key: &DbValue, version: Option<Uuid>) {
        if let Some(slot) = self.slots.get_mut(&type_id) {
            slot.record_version(key, version);
        }
    }

    /// Number of tracked instances of `T`.
    pub fn count<T: Document>(&self) -> usize {
        self.slot::<T>()
            .map_or(0, |slot| slot.documents.len())
    }

    /// Number of tracked instances across all types.
    pub fn len(&self) -> usize {
        self.slots
            .values()
            .map(|slot| slot.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

impl fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityMap")
            .field("types", &self.slots.len())
            .field("documents", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Person, Tag};

    #[test]
    fn one_live_instance_per_type_and_id() {
        let mut map = IdentityMap::new();
        let person = Arc::new(Person::new("Jeremy", "jdm"));
        let id = person.id;

        assert!(map.insert(id, Arc::clone(&person)).unwrap().is_none());
        assert!(Arc::ptr_eq(&map.get::<Person>(&id).unwrap(), &person));

        let replacement = Arc::new(Person::new("Jeremy", "jeremy"));
        let previous = map.insert(id, replacement).unwrap().unwrap();
        assert!(Arc::ptr_eq(&previous, &person));
        assert_eq!(map.count::<Person>(), 1);
    }

    #[test]
    fn types_are_isolated() {
        let mut map = IdentityMap::new();
        let tag = Arc::new(Tag { id: 7, name: "rust".into() });

        map.insert(7, tag).unwrap();

        assert!(map.contains::<Tag>(&7));
        assert_eq!(map.count::<Person>(), 0);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_is_a_no_op_for_unknown_ids() {
        let mut map = IdentityMap::new();
        assert!(map.remove::<Person>(&Uuid::new_v4()).is_none());

        let person = Arc::new(Person::new("Han", "han"));
        let id = person.id;
        map.insert(id, person).unwrap();

        assert!(map.remove::<Person>(&id).is_some());
        assert!(!map.contains::<Person>(&id));
    }

    #[test]
    fn versions_are_recorded_by_typed_and_erased_paths() {
        let mut map = IdentityMap::new();
        let person = Arc::new(Person::new("Han", "han"));
        let id = person.id;
        map.insert(id, person).unwrap();

        let first = Uuid::new_v4();
        map.set_version::<Person>(&id, Some(first)).unwrap();
        assert_eq!(map.version::<Person>(&id), Some(first));

        let second = Uuid::new_v4();
        map.record_version(TypeId::of::<Person>(), &id.to_db(), Some(second));
        assert_eq!(map.version::<Person>(&id), Some(second));

        map.record_version(TypeId::of::<Person>(), &id.to_db(), None);
        assert_eq!(map.version::<Person>(&id), None);
    }
}
