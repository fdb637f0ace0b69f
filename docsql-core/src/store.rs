//! The document store: configuration, shared services and session factory.
//!
//! A [`DocumentStore`] is created once per process (or per test) and owns
//! everything sessions share: the backing-store executor, the expression
//! translator, the plan cache and one [`DocumentStorage`] per document type.
//! Cloning a store is cheap and shares all of it.
//!
//! # Example
//!
//! ```ignore
//! use docsql::prelude::*;
//!
//! let store = DocumentStore::builder(executor)
//!     .options(StoreOptions::default())
//!     .register::<User>()
//!     .build()?;
//!
//! let mut session = store.open_session();
//! session.store(User::new("Jeremy", "jdm"))?;
//! session.save_changes()?;
//! ```

use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::{
    backend::CommandExecutor,
    cache::PlanCache,
    config::{AutoCreate, StoreOptions},
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult},
    session::DocumentSession,
    sql::{self, SqlTranslator},
    storage::DocumentStorage,
    translator::ExpressionTranslator,
};

type Registration = fn(&DocumentStore) -> DocumentStoreResult<()>;

struct StoreInner {
    executor: Arc<dyn CommandExecutor>,
    translator: Arc<dyn ExpressionTranslator>,
    options: StoreOptions,
    plans: PlanCache,
    storages: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

/// Shared entry point for sessions.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

impl DocumentStore {
    /// Starts configuring a store on top of `executor`.
    pub fn builder(executor: impl CommandExecutor + 'static) -> DocumentStoreBuilder {
        DocumentStoreBuilder::new(Arc::new(executor))
    }

    /// Opens a session for the default tenant.
    pub fn open_session(&self) -> DocumentSession {
        let tenant = self.inner.options.default_tenant.clone();
        DocumentSession::new(self.clone(), tenant)
    }

    /// Opens a session scoped to `tenant`.
    pub fn session_for_tenant(&self, tenant: impl Into<String>) -> DocumentSession {
        DocumentSession::new(self.clone(), tenant.into())
    }

    /// Returns the storage of `T`, creating it (and, unless disabled, its
    /// table) on first use.
    ///
    /// Table creation calls the executor's blocking `ensure_table`, also when
    /// the first use comes from a suspending session call. Types registered
    /// with [`DocumentStoreBuilder::register`] are set up by `build` instead.
    ///
    /// # Errors
    ///
    /// Fails when the table name is invalid or table creation fails.
    pub fn storage<T: Document>(&self) -> DocumentStoreResult<Arc<DocumentStorage<T>>> {
        let key = TypeId::of::<T>();

        let existing = self.inner.storages.read().get(&key).cloned();
        let storage = match existing {
            Some(storage) => storage,
            None => {
                let table = self.inner.options.table_for::<T>();
                sql::table_name(&table).map_err(DocumentStoreError::InvalidDocument)?;

                if self.inner.options.auto_create == AutoCreate::CreateOrUpdate {
                    self.inner.executor.ensure_table(&table)?;
                }
                debug!(document = type_name::<T>(), table = %table, "registered document storage");

                let created: Arc<dyn Any + Send + Sync> = Arc::new(DocumentStorage::<T>::new(table));
                Arc::clone(
                    self.inner
                        .storages
                        .write()
                        .entry(key)
                        .or_insert(created),
                )
            }
        };

        storage
            .downcast::<DocumentStorage<T>>()
            .map_err(|_| {
                DocumentStoreError::InvalidDocument(format!(
                    "storage registered for {} has another type",
                    type_name::<T>()
                ))
            })
    }

    pub fn executor(&self) -> &dyn CommandExecutor {
        self.inner.executor.as_ref()
    }

    /// A shared handle to the executor, for work that outlives a borrow of the store.
    pub fn executor_handle(&self) -> Arc<dyn CommandExecutor> {
        Arc::clone(&self.inner.executor)
    }

    pub fn translator(&self) -> &dyn ExpressionTranslator {
        self.inner.translator.as_ref()
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.inner.plans
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Shuts down the executor. Sessions opened afterwards fail on I/O.
    pub async fn shutdown(&self) -> DocumentStoreResult<()> {
        info!("shutting down document store");
        self.inner.executor.shutdown().await
    }
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("executor", &self.inner.executor)
            .field("translator", &self.inner.translator)
            .field("options", &self.inner.options)
            .field("plans", &self.inner.plans)
            .finish()
    }
}

/// Builder for [`DocumentStore`].
pub struct DocumentStoreBuilder {
    executor: Arc<dyn CommandExecutor>,
    translator: Option<Arc<dyn ExpressionTranslator>>,
    options: StoreOptions,
    registrations: Vec<Registration>,
}

impl DocumentStoreBuilder {
    fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            translator: None,
            options: StoreOptions::default(),
            registrations: Vec::new(),
        }
    }

    /// Replaces the default [`SqlTranslator`].
    pub fn translator(mut self, translator: impl ExpressionTranslator + 'static) -> Self {
        self.translator = Some(Arc::new(translator));
        self
    }

    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.table_prefix = prefix.into();
        self
    }

    pub fn default_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.options.default_tenant = tenant.into();
        self
    }

    /// Sets up storage for `T` at build time instead of on first use.
    pub fn register<T: Document>(mut self) -> Self {
        self.registrations
            .push(|store| store.storage::<T>().map(|_| ()));
        self
    }

    /// Builds the store and sets up registered document types.
    ///
    /// # Errors
    ///
    /// Fails when a registered type's table cannot be created.
    pub fn build(self) -> DocumentStoreResult<DocumentStore> {
        let store = DocumentStore {
            inner: Arc::new(StoreInner {
                executor: self.executor,
                translator: self
                    .translator
                    .unwrap_or_else(|| Arc::new(SqlTranslator::new()) as Arc<dyn ExpressionTranslator>),
                options: self.options,
                plans: PlanCache::new(),
                storages: RwLock::default(),
            }),
        };

        for register in self.registrations {
            register(&store)?;
        }

        info!(
            table_prefix = %store.options().table_prefix,
            default_tenant = %store.options().default_tenant,
            "document store ready"
        );
        Ok(store)
    }
}
