//! Store configuration.

use serde::Deserialize;

use crate::{document::Document, error::DocumentStoreResult};

/// Whether the store creates missing document tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoCreate {
    /// Create each document table the first time its type is used.
    #[default]
    CreateOrUpdate,
    /// Expect every table to exist.
    None,
}

/// Options shared by every session of a store.
///
/// Deserializable from configuration files; missing fields take defaults.
///
/// ```ignore
/// let options: StoreOptions = serde_json::from_str(r#"{ "table_prefix": "app_" }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Prepended to each collection name to form its table name.
    pub table_prefix: String,
    /// Tenant used by sessions opened without one.
    pub default_tenant: String,
    pub auto_create: AutoCreate,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            table_prefix: "mt_doc_".to_string(),
            default_tenant: "*DEFAULT*".to_string(),
            auto_create: AutoCreate::default(),
        }
    }
}

impl StoreOptions {
    /// Parses options from JSON.
    pub fn from_json(json: &str) -> DocumentStoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The table holding documents of type `T`.
    pub fn table_for<T: Document>(&self) -> String {
        format!("{}{}", self.table_prefix, T::collection_name())
    }
}
