//! Error types and result types for document store operations.
//!
//! Every fallible operation in this crate returns [`DocumentStoreResult<T>`].
//! Errors surface from the call that caused them; nothing is retried or
//! deferred at this layer.

use std::io::Error as IoError;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when working with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The query shape cannot be expressed as a backing-store command.
    ///
    /// Raised by the expression translator; never retried. No plan is cached
    /// for a definition whose translation failed.
    #[error("Unsupported query shape for {definition}: {message}")]
    Translation {
        /// Type name of the query definition being translated.
        definition: &'static str,
        /// What the translator rejected.
        message: String,
    },
    /// A query that requires exactly one result matched no rows.
    #[error("No document matched query {0}")]
    NotFound(&'static str),
    /// A query that requires exactly one result matched more than one row.
    #[error("More than one document matched query {0}")]
    MultipleResults(&'static str),
    /// A different instance was stored for an id already held by the session.
    /// The first argument is the document id, the second the document type.
    #[error("Document {0} of type {1} is already tracked by this session as a different instance")]
    DuplicateIdentity(String, &'static str),
    /// An id of the wrong representation was supplied for a document type.
    #[error("Id type mismatch for {document}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The document type being accessed.
        document: &'static str,
        /// The id representation the document type uses.
        expected: &'static str,
        /// The representation the caller supplied.
        actual: &'static str,
    },
    /// A suspending operation was cancelled while waiting on the backing store.
    #[error("Operation cancelled")]
    Cancelled,
    /// Serialization/deserialization error when converting document bodies.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The document violates identity rules or has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the backing store. Passed through unmodified.
    #[error("Backend error: {0}")]
    Backend(String),
    /// Writing raw bodies to a caller supplied sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl DocumentStoreError {
    /// Creates a translation error for the named query definition.
    pub fn translation(definition: &'static str, message: impl Into<String>) -> Self {
        DocumentStoreError::Translation {
            definition,
            message: message.into(),
        }
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
