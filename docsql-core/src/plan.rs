//! Query plans: translate once, bind many.
//!
//! [`PlanBuilder::build_template`] runs the translator against one sample
//! instance and keeps, for every referenced parameter, its extractor rather
//! than its value. [`QueryPlan::bind_values`] later re-runs those extractors
//! against any instance of the same definition type.

use std::{any::type_name, sync::Arc};

use tracing::debug;

use crate::{
    backend::BoundCommand,
    definition::{Param, QueryDefinition},
    error::{DocumentStoreError, DocumentStoreResult},
    translator::{ExpressionTranslator, ParamRef, TranslationRequest},
    value::DbValue,
};

/// How rows of a command are turned into a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    /// Exactly one document; no rows is an error.
    Single,
    /// At most one document; no rows is `None`.
    SingleOrDefault,
    /// A lazy sequence of documents.
    List,
    /// One scalar computed by an aggregate.
    Scalar,
    /// Whether any document matches.
    Exists,
    /// One raw JSON body, if any.
    RawJsonSingle,
    /// Every matching raw JSON body.
    RawJsonList,
}

/// The text of a command with positional `?` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    sql: String,
}

impl CommandTemplate {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// The source of one placeholder's value.
#[derive(Debug, Clone)]
pub enum Binding<P> {
    /// A query parameter, re-extracted from every instance.
    Param(P),
    /// The executing session's tenant id.
    Tenant,
    /// A constant that belongs to the shape.
    Constant(DbValue),
    /// A value copied from the sample instance during translation.
    ///
    /// Its presence means the template's structure depends on that value,
    /// so the plan cannot be reused for other instances.
    Captured(DbValue),
}

impl<P> Binding<P> {
    pub fn is_captured(&self) -> bool {
        matches!(self, Binding::Captured(_))
    }
}

/// An immutable, translated query: template, bindings and result shape.
#[derive(Debug)]
pub struct QueryPlan<D> {
    template: CommandTemplate,
    bindings: Vec<Binding<Param<D>>>,
    shape: ResultShape,
    value_dependent: bool,
}

impl<D> QueryPlan<D> {
    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }

    pub fn bindings(&self) -> &[Binding<Param<D>>] {
        &self.bindings
    }

    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    /// Whether this plan's structure came from the instance it was built from.
    pub fn is_value_dependent(&self) -> bool {
        self.value_dependent
    }

    /// Produces a command for `instance`, executing under `tenant`.
    pub fn bind_values(&self, instance: &D, tenant: &str) -> BoundCommand {
        let params = self
            .bindings
            .iter()
            .map(|binding| match binding {
                Binding::Param(param) => param.extract(instance),
                Binding::Tenant => DbValue::from(tenant),
                Binding::Constant(value) | Binding::Captured(value) => value.clone(),
            })
            .collect();

        BoundCommand::new(self.template.sql(), params)
    }
}

/// A plan cache entry for one query definition type and result shape.
#[derive(Debug)]
pub enum PlanEntry<D> {
    /// A reusable plan.
    Cached(Arc<QueryPlan<D>>),
    /// The shape depends on values; every execution translates again.
    AlwaysRebuild,
}

impl<D> Clone for PlanEntry<D> {
    fn clone(&self) -> Self {
        match self {
            PlanEntry::Cached(plan) => PlanEntry::Cached(Arc::clone(plan)),
            PlanEntry::AlwaysRebuild => PlanEntry::AlwaysRebuild,
        }
    }
}

impl<D> PlanEntry<D> {
    /// Classifies a freshly built plan.
    pub fn classify(plan: &Arc<QueryPlan<D>>) -> Self {
        if plan.is_value_dependent() {
            PlanEntry::AlwaysRebuild
        } else {
            PlanEntry::Cached(Arc::clone(plan))
        }
    }
}

/// Runs the translator for one document table.
pub struct PlanBuilder<'a> {
    translator: &'a dyn ExpressionTranslator,
    table: &'a str,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(translator: &'a dyn ExpressionTranslator, table: &'a str) -> Self {
        Self { translator, table }
    }

    /// Translates `D`'s shape using `sample` for parameter sample values.
    ///
    /// # Errors
    ///
    /// Returns the translator's error unchanged.
    pub fn build_template<D: QueryDefinition>(
        &self,
        sample: &D,
        hint: ResultShape,
    ) -> DocumentStoreResult<Arc<QueryPlan<D>>> {
        let definition = type_name::<D>();
        let mut params: Vec<Param<D>> = Vec::new();

        let shape = D::shape().map_params(|param| {
            let reference = ParamRef {
                field: param.field(),
                slot: params.len(),
                sample: param.extract(sample),
            };
            params.push(param);
            reference
        });

        let translation = self.translator.translate(&TranslationRequest {
            definition,
            table: self.table,
            hint,
            shape: &shape,
        })?;

        let bindings = translation
            .bindings
            .into_iter()
            .map(|binding| {
                Ok(match binding {
                    Binding::Param(slot) => Binding::Param(
                        params
                            .get(slot)
                            .cloned()
                            .ok_or_else(|| {
                                DocumentStoreError::translation(
                                    definition,
                                    format!("translator bound unknown parameter slot {slot}"),
                                )
                            })?,
                    ),
                    Binding::Tenant => Binding::Tenant,
                    Binding::Constant(value) => Binding::Constant(value),
                    Binding::Captured(value) => Binding::Captured(value),
                })
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        let value_dependent =
            translation.value_dependent || bindings.iter().any(Binding::is_captured);

        let plan = QueryPlan {
            template: translation.template,
            bindings,
            shape: translation.shape,
            value_dependent,
        };

        debug!(
            definition,
            ?hint,
            parameters = params.len(),
            value_dependent = plan.is_value_dependent(),
            "translated query definition"
        );

        Ok(Arc::new(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        definition::DefinitionShape,
        param,
        query::{Filter, QueryShape},
        resolver::ToList,
        sql::SqlTranslator,
        testing::Person,
    };

    struct ByName {
        name: String,
    }

    impl QueryDefinition for ByName {
        type Document = Person;
        type Result = ToList;

        fn shape() -> DefinitionShape<Self> {
            QueryShape::new().filter(Filter::eq("name", param!(name)))
        }
    }

    struct ByNames {
        names: Vec<String>,
    }

    impl QueryDefinition for ByNames {
        type Document = Person;
        type Result = ToList;

        fn shape() -> DefinitionShape<Self> {
            QueryShape::new().filter(Filter::any_of("name", param!(names)))
        }
    }

    #[test]
    fn binding_substitutes_new_values_into_the_same_template() {
        let translator = SqlTranslator::new();
        let builder = PlanBuilder::new(&translator, "mt_doc_people");
        let plan = builder
            .build_template(&ByName { name: "jdm".into() }, ResultShape::List)
            .unwrap();

        assert!(!plan.is_value_dependent());

        let first = plan.bind_values(&ByName { name: "jdm".into() }, "one");
        let second = plan.bind_values(&ByName { name: "shadetreedev".into() }, "two");

        assert_eq!(first.sql, second.sql);
        assert_eq!(first.params, vec![DbValue::from("one"), DbValue::from("jdm")]);
        assert_eq!(second.params, vec![DbValue::from("two"), DbValue::from("shadetreedev")]);
    }

    #[test]
    fn expanded_lists_make_a_plan_value_dependent() {
        let translator = SqlTranslator::new();
        let builder = PlanBuilder::new(&translator, "mt_doc_people");
        let plan = builder
            .build_template(&ByNames { names: vec!["a".into(), "b".into()] }, ResultShape::List)
            .unwrap();

        assert!(plan.is_value_dependent());
        assert!(matches!(PlanEntry::classify(&plan), PlanEntry::AlwaysRebuild));
        assert!(plan.template().sql().contains("IN (?, ?)"));
    }
}
