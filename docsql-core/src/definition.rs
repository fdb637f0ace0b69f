//! Strongly-typed query definitions.
//!
//! A query definition is a plain value type whose fields are the free
//! parameters of one query. Its *type* identifies the query: the shape is an
//! associated function, so it cannot depend on field values, and every value
//! reaches the command through a [`Param`] extractor keyed by field name.
//!
//! ```ignore
//! use docsql::prelude::*;
//!
//! struct UsersByFirstName {
//!     first_name: String,
//! }
//!
//! impl QueryDefinition for UsersByFirstName {
//!     type Document = User;
//!     type Result = ToList;
//!
//!     fn shape() -> DefinitionShape<Self> {
//!         QueryShape::new().filter(Filter::eq("first_name", param!(first_name)))
//!     }
//! }
//! ```

use std::{fmt, sync::Arc};

use crate::{
    document::Document,
    query::{Operand, QueryShape},
    resolver::ResultResolver,
    value::DbValue,
};

/// A reusable, parameterized query over one document type.
pub trait QueryDefinition: Send + Sync + Sized + 'static {
    /// The document type the query reads.
    type Document: Document;

    /// How rows are turned into the query's result.
    type Result: ResultResolver<Self::Document>;

    /// The query's structure. Called once per plan build, never per execution.
    fn shape() -> DefinitionShape<Self>;
}

/// Shape type produced by query definitions.
pub type DefinitionShape<D> = QueryShape<Param<D>>;

type Extractor<D> = Arc<dyn Fn(&D) -> DbValue + Send + Sync>;

/// A query parameter: a field identity plus a function reading its value.
///
/// Plans keep the extractor, not the value, so later instances of the same
/// definition type substitute their own values without re-translation.
pub struct Param<D> {
    field: &'static str,
    extract: Extractor<D>,
}

impl<D: 'static> Param<D> {
    pub fn new<V, F>(field: &'static str, extract: F) -> Self
    where
        V: Into<DbValue>,
        F: Fn(&D) -> V + Send + Sync + 'static,
    {
        Self {
            field,
            extract: Arc::new(move |definition: &D| extract(definition).into()),
        }
    }
}

impl<D> Param<D> {
    /// The field this parameter reads.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Reads the parameter's current value from a definition instance.
    pub fn extract(&self, definition: &D) -> DbValue {
        (self.extract)(definition)
    }
}

impl<D> Clone for Param<D> {
    fn clone(&self) -> Self {
        Self {
            field: self.field,
            extract: Arc::clone(&self.extract),
        }
    }
}

impl<D> fmt::Debug for Param<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

impl<D> From<Param<D>> for Operand<Param<D>> {
    fn from(param: Param<D>) -> Self {
        Operand::Param(param)
    }
}

/// Declares a [`Param`] reading a field of the enclosing query definition.
///
/// `param!(first_name)` expands to a parameter named `"first_name"` whose
/// extractor clones `self.first_name`.
#[macro_export]
macro_rules! param {
    ($field:ident) => {
        $crate::definition::Param::new(stringify!($field), |query: &Self| query.$field.clone())
    };
}
