//! Process-long cache of query plans.
//!
//! One slot per `(query definition type, result shape)`. A slot is a
//! [`OnceCell`], so concurrent first executions of the same definition type
//! translate once while the others wait for that build; readers of other
//! types only take the map's read lock. A failed build leaves the slot empty
//! and the next execution tries again.

use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::trace;

use crate::{
    definition::QueryDefinition,
    error::{DocumentStoreError, DocumentStoreResult},
    plan::{PlanBuilder, PlanEntry, QueryPlan, ResultShape},
};

type SlotKey = (TypeId, ResultShape);
type Slot = Arc<dyn Any + Send + Sync>;

/// Counters describing how plans were obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanCacheStats {
    /// Executions served by a cached plan.
    pub hits: u64,
    /// First-time translations.
    pub builds: u64,
    /// Translations of definitions marked always-rebuild.
    pub rebuilds: u64,
}

/// Cache of translated plans keyed by query definition type.
///
/// Owned by a [`DocumentStore`](crate::store::DocumentStore) and shared by
/// all of its sessions.
#[derive(Default)]
pub struct PlanCache {
    slots: RwLock<HashMap<SlotKey, Slot>>,
    hits: AtomicU64,
    builds: AtomicU64,
    rebuilds: AtomicU64,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a plan for `instance`, translating with `builder` on a miss or
    /// for value-dependent definitions.
    ///
    /// # Errors
    ///
    /// Translation errors are returned unchanged and leave no entry behind.
    pub fn plan_for<D: QueryDefinition>(
        &self,
        instance: &D,
        hint: ResultShape,
        builder: &PlanBuilder<'_>,
    ) -> DocumentStoreResult<Arc<QueryPlan<D>>> {
        let slot = self.slot::<D>(hint)?;

        if let Some(entry) = slot.get() {
            return self.from_entry(entry, instance, hint, builder);
        }

        let mut built = None;
        let entry = slot.get_or_try_init(|| {
            let plan = builder.build_template(instance, hint)?;
            self.builds.fetch_add(1, Ordering::Relaxed);
            let entry = PlanEntry::classify(&plan);
            built = Some(plan);
            Ok::<_, DocumentStoreError>(entry)
        })?;

        match built {
            Some(plan) => Ok(plan),
            // Another caller finished the build first.
            None => self.from_entry(entry, instance, hint, builder),
        }
    }

    fn from_entry<D: QueryDefinition>(
        &self,
        entry: &PlanEntry<D>,
        instance: &D,
        hint: ResultShape,
        builder: &PlanBuilder<'_>,
    ) -> DocumentStoreResult<Arc<QueryPlan<D>>> {
        match entry {
            PlanEntry::Cached(plan) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(definition = type_name::<D>(), ?hint, "plan cache hit");
                Ok(Arc::clone(plan))
            }
            PlanEntry::AlwaysRebuild => {
                self.rebuilds.fetch_add(1, Ordering::Relaxed);
                builder.build_template(instance, hint)
            }
        }
    }

    fn slot<D: QueryDefinition>(
        &self,
        hint: ResultShape,
    ) -> DocumentStoreResult<Arc<OnceCell<PlanEntry<D>>>> {
        let key = (TypeId::of::<D>(), hint);

        let existing = self.slots.read().get(&key).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => Arc::clone(
                self.slots
                    .write()
                    .entry(key)
                    .or_insert_with(|| Arc::new(OnceCell::<PlanEntry<D>>::new()) as Slot),
            ),
        };

        slot.downcast::<OnceCell<PlanEntry<D>>>()
            .map_err(|_| {
                DocumentStoreError::translation(type_name::<D>(), "plan cache slot holds another type")
            })
    }

    /// Number of definition/shape slots, including ones still being built.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached plan. Plans already handed out stay valid.
    pub fn clear(&self) {
        self.slots.write().clear();
    }

    pub fn stats(&self) -> PlanCacheStats {
        PlanCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanCache")
            .field("slots", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}
