//! Core traits for document representation, identity and serialization.
//!
//! Every persisted type implements [`Document`]. Its associated [`Identity`]
//! type decides how ids are represented in the backing store, whether the
//! store may generate them, and which caller-supplied ids are acceptable.

use std::{any::Any, fmt::Debug, hash::Hash};

use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    value::DbValue,
};

/// Core trait that all documents stored in a document store must implement.
///
/// # Example
///
/// ```ignore
/// use docsql::document::Document;
/// use serde::{Serialize, Deserialize};
/// use uuid::Uuid;
///
/// #[derive(Debug, Serialize, Deserialize)]
/// pub struct User {
///     pub id: Uuid,
///     pub user_name: String,
/// }
///
/// impl Document for User {
///     type Id = Uuid;
///
///     fn id(&self) -> Uuid {
///         self.id
///     }
///
///     fn set_id(&mut self, id: Uuid) {
///         self.id = id;
///     }
///
///     fn collection_name() -> &'static str {
///         "users"
///     }
/// }
/// ```
///
/// Most types use `#[derive(Document)]` instead of writing this by hand.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The id type of this document.
    type Id: Identity;

    /// Returns this document's identifier.
    fn id(&self) -> Self::Id;

    /// Assigns an identifier, used when the store generates one on `store`.
    fn set_id(&mut self, id: Self::Id);

    /// Returns the logical name of the collection this document belongs to.
    ///
    /// The backing table is named from this value and the configured prefix.
    fn collection_name() -> &'static str;
}

/// Representation of a document id in memory and in the backing store.
pub trait Identity: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Name of the representation, reported by `TypeMismatch` errors.
    const KIND: &'static str;

    /// Converts the id into a placeholder value.
    fn to_db(&self) -> DbValue;

    /// Parses an id from a placeholder or column value.
    ///
    /// Returns `None` when the value has the wrong representation.
    fn from_db(value: &DbValue) -> Option<Self>;

    /// Whether this id is the "not yet assigned" value for its type.
    fn is_unassigned(&self) -> bool {
        false
    }

    /// Generates a fresh id, for id types the store can assign itself.
    fn generate() -> Option<Self> {
        None
    }
}

impl Identity for Uuid {
    const KIND: &'static str = "uuid";

    fn to_db(&self) -> DbValue {
        DbValue::from(*self)
    }

    fn from_db(value: &DbValue) -> Option<Self> {
        value
            .as_str()
            .and_then(|text| Uuid::parse_str(text).ok())
    }

    fn is_unassigned(&self) -> bool {
        self.is_nil()
    }

    fn generate() -> Option<Self> {
        Some(Uuid::new_v4())
    }
}

impl Identity for String {
    const KIND: &'static str = "string";

    fn to_db(&self) -> DbValue {
        DbValue::Text(self.clone())
    }

    fn from_db(value: &DbValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }

    fn is_unassigned(&self) -> bool {
        self.is_empty()
    }
}

impl Identity for i64 {
    const KIND: &'static str = "integer";

    fn to_db(&self) -> DbValue {
        DbValue::Integer(*self)
    }

    fn from_db(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl Identity for i32 {
    const KIND: &'static str = "integer";

    fn to_db(&self) -> DbValue {
        DbValue::Integer(*self as i64)
    }

    fn from_db(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Integer(value) => i32::try_from(*value).ok(),
            _ => None,
        }
    }
}

/// Resolves a caller-supplied id value to the id type of `D`.
///
/// # Errors
///
/// Returns [`DocumentStoreError::TypeMismatch`] when the value cannot represent a `D::Id`.
pub fn resolve_id<D: Document>(value: &DbValue) -> DocumentStoreResult<D::Id> {
    D::Id::from_db(value).ok_or_else(|| DocumentStoreError::TypeMismatch {
        document: std::any::type_name::<D>(),
        expected: <D::Id as Identity>::KIND,
        actual: value.kind(),
    })
}

/// Extension trait providing body serialization for documents.
///
/// This trait is automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Serializes this document to its stored JSON body.
    fn to_body(&self) -> DocumentStoreResult<String>;

    /// Deserializes a document from a stored JSON body.
    fn from_body(body: &str) -> DocumentStoreResult<Self>;
}

impl<D: Document> DocumentExt for D {
    fn to_body(&self) -> DocumentStoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn from_body(body: &str) -> DocumentStoreResult<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Type-erased document used where sessions hold documents of many types together.
///
/// Pending writes keep their documents as `Arc<dyn AnyDocument>` until commit.
pub trait AnyDocument: Send + Sync {
    /// Returns the document id as a placeholder value.
    fn document_key(&self) -> DbValue;

    /// Returns the name of the collection this document belongs to.
    fn document_collection(&self) -> &'static str;

    /// Returns a reference to the document as a generic `Any` type.
    fn as_any(&self) -> &dyn Any;

    /// Serializes the document to its JSON body.
    fn to_any_body(&self) -> DocumentStoreResult<String>;
}

impl dyn AnyDocument {
    /// Attempts to downcast a reference to a specific document type.
    pub fn downcast_ref<D: Document>(&self) -> Option<&D> {
        self.as_any().downcast_ref::<D>()
    }
}

impl<D: Document> AnyDocument for D {
    fn document_key(&self) -> DbValue {
        self.id().to_db()
    }

    fn document_collection(&self) -> &'static str {
        Self::collection_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_any_body(&self) -> DocumentStoreResult<String> {
        DocumentExt::to_body(self)
    }
}
