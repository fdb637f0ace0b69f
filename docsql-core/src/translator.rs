//! The expression translator seam.
//!
//! A translator turns one erased [`QueryShape`] into a command template and an
//! ordered list of bindings. It must be deterministic for a given shape and
//! sample: plan caching relies on translating once and binding many times.
//! The default implementation is [`SqlTranslator`](crate::sql::SqlTranslator).

use std::fmt::Debug;

use crate::{
    error::DocumentStoreResult,
    plan::{Binding, CommandTemplate, ResultShape},
    query::QueryShape,
    value::DbValue,
};

/// A parameter as seen by a translator: its field identity, its slot in the
/// definition's parameter list, and the sample instance's current value.
///
/// Translators bind `Binding::Param(slot)` to keep a template reusable. They
/// may read `sample` to decide structure (expanding a list, for example), in
/// which case they bind the values they used as `Binding::Captured` and mark
/// the [`Translation`] value dependent.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRef {
    pub field: &'static str,
    pub slot: usize,
    pub sample: DbValue,
}

/// Everything a translator needs to translate one query definition.
#[derive(Debug)]
pub struct TranslationRequest<'a> {
    /// Type name of the query definition, for error messages.
    pub definition: &'static str,
    /// Table holding the queried document type.
    pub table: &'a str,
    /// The result shape the caller wants.
    pub hint: ResultShape,
    /// The definition's shape with parameters erased to slots.
    pub shape: &'a QueryShape<ParamRef>,
}

/// Translator output: a template plus bindings in placeholder order.
#[derive(Debug, Clone)]
pub struct Translation {
    pub template: CommandTemplate,
    pub bindings: Vec<Binding<usize>>,
    pub shape: ResultShape,
    /// Set when the template's structure was derived from sample values.
    ///
    /// Any `Binding::Captured` implies this; a translator must also set it
    /// when a sample value changed the structure without being bound, as an
    /// empty list does.
    pub value_dependent: bool,
}

/// Translates query shapes into backing-store commands.
pub trait ExpressionTranslator: Send + Sync + Debug {
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Translation`](crate::error::DocumentStoreError::Translation)
    /// for shapes the translator does not support.
    fn translate(&self, request: &TranslationRequest<'_>) -> DocumentStoreResult<Translation>;
}
