//! Query shapes: the closed set of fragments a query definition can be built from.
//!
//! A [`QueryShape`] is a list of [`Fragment`]s: filter, projection, ordering,
//! aggregate, existence, take and skip. Filters are [`Expr`] trees. Both are
//! generic over the parameter type `P`:
//!
//! - query definitions build `QueryShape<Param<Self>>`, where every free value
//!   is a [`Param`](crate::definition::Param) extractor keyed by field name;
//! - translators receive `QueryShape<ParamRef>`, where each parameter is a slot
//!   number with the sample instance's current value attached.
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides static methods for building filter expressions:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`
//! - Existence: `exists`, `not_exists`, `any_element`
//! - List membership: `any_of`
//! - Logical: `and`, `or`
//!
//! ```ignore
//! use docsql::query::{Filter, QueryShape, SortDirection};
//!
//! let shape = QueryShape::new()
//!     .filter(Filter::eq("first_name", param!(first_name)))
//!     .order_by("user_name", SortDirection::Asc)
//!     .take(10);
//! ```

use uuid::Uuid;

use crate::{error::DocumentStoreError, value::DbValue};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String field contains the value.
    Contains,
    /// String field starts with the value.
    StartsWith,
    /// String field ends with the value.
    EndsWith,
    /// Field equals any value of a list.
    AnyOf,
}

/// The right-hand side of a comparison.
#[derive(Debug, Clone)]
pub enum Operand<P> {
    /// A query parameter, substituted on every execution.
    Param(P),
    /// A constant that is part of the query's shape.
    Value(DbValue),
}

impl<P> Operand<P> {
    /// Converts the parameter type, keeping constants as they are.
    pub fn map_param<Q>(self, f: &mut impl FnMut(P) -> Q) -> Operand<Q> {
        match self {
            Operand::Param(param) => Operand::Param(f(param)),
            Operand::Value(value) => Operand::Value(value),
        }
    }
}

macro_rules! operand_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl<P> From<$ty> for Operand<P> {
                fn from(value: $ty) -> Self {
                    Operand::Value(DbValue::from(value))
                }
            }
        )*
    };
}

operand_from_value!(bool, i32, i64, u32, f64, String, &str, Uuid, DbValue);

/// A filter expression.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex predicates. Field paths are dotted JSON paths into the
/// document body (`"address.city"`); inside [`Expr::AnyElement`] they are
/// relative to the array element, and the empty path names the element itself.
#[derive(Debug, Clone)]
pub enum Expr<P> {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr<P>>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr<P>>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr<P>>),
    /// Checks if a field is present and non-null (`true`) or absent/null (`false`).
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field path to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        operand: Operand<P>,
    },
    /// Existence predicate over the elements of an array field.
    ///
    /// Matches when at least one element satisfies `predicate`, or when the
    /// array is non-empty if there is no predicate.
    AnyElement {
        /// The array field path.
        collection: String,
        /// Predicate evaluated against each element.
        predicate: Option<Box<Expr<P>>>,
    },
}

impl<P> Expr<P> {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, operand: Operand<P>) -> Self {
        Expr::Field { field, op, operand }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr<P>) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr<P>) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Converts every parameter in the tree, depth first, left to right.
    pub fn map_params<Q>(self, f: &mut impl FnMut(P) -> Q) -> Expr<Q> {
        match self {
            Expr::And(exprs) => Expr::And(exprs.into_iter().map(|expr| expr.map_params(f)).collect()),
            Expr::Or(exprs) => Expr::Or(exprs.into_iter().map(|expr| expr.map_params(f)).collect()),
            Expr::Not(expr) => Expr::Not(Box::new(expr.map_params(f))),
            Expr::Exists(field, should_exist) => Expr::Exists(field, should_exist),
            Expr::Field { field, op, operand } => Expr::Field {
                field,
                op,
                operand: operand.map_param(f),
            },
            Expr::AnyElement { collection, predicate } => Expr::AnyElement {
                collection,
                predicate: predicate.map(|expr| Box::new(expr.map_params(f))),
            },
        }
    }
}

/// Helper struct for constructing filter expressions.
///
/// Operands accept either a constant (anything convertible to [`DbValue`]) or
/// a [`Param`](crate::definition::Param).
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the operand.
    pub fn eq<P>(field: impl Into<String>, operand: impl Into<Operand<P>>) -> Expr<P> {
        Expr::field(field.into(), FieldOp::Eq, operand.into())
    }

    /// Matches documents where the field does not equal the operand.
    pub fn ne<P>(field: impl Into<String>, operand: impl Into<Operand<P>>) -> Expr<P> {
        Expr::field(field.into(), FieldOp::Ne, operand.into())
    }

    pub fn gt<P>(field: impl Into<String>, operand: impl Into<Operand<P>>) -> Expr<P> {
        Expr::field(field.into(), FieldOp::Gt, operand.into())
    }

    pub fn gte<P>(field: impl Into<String>, operand: impl Into<Operand<P>>) -> Expr<P> {
        Expr::field(field.into(), FieldOp::Gte, operand.into())
    }

    pub fn lt<P>(field: impl Into<String>, operand: impl Into<Operand<P>>) -> Expr<P> {
        Expr::field(field.into(), FieldOp::Lt, operand.into())
    }

    pub fn lte<P>(field: impl Into<String>, operand: impl Into<Operand<P>>) -> Expr<P> {
        Expr::field(field.into(), FieldOp::Lte, operand.into())
    }

    /// Matches documents where the string field starts with the operand (case-sensitive).
    pub fn starts_with<P>(field: impl Into<String>, operand: impl Into<Operand<P>>) -> Expr<P> {
        Expr::field(field.into(), FieldOp::StartsWith, operand.into())
    }

    /// Matches documents where the string field ends with the operand (case-sensitive).
    pub fn ends_with<P>(field: impl Into<String>, operand: impl Into<Operand<P>>) -> Expr<P> {
        Expr::field(field.into(), FieldOp::EndsWith, operand.into())
    }

    /// Matches documents where the string field contains the operand (case-sensitive).
    pub fn contains<P>(field: impl Into<String>, operand: impl Into<Operand<P>>) -> Expr<P> {
        Expr::field(field.into(), FieldOp::Contains, operand.into())
    }

    /// Matches documents where the field equals any value of a list operand.
    pub fn any_of<P>(field: impl Into<String>, operand: impl Into<Operand<P>>) -> Expr<P> {
        Expr::field(field.into(), FieldOp::AnyOf, operand.into())
    }

    /// Matches documents where the field is present and not null.
    pub fn exists<P>(field: impl Into<String>) -> Expr<P> {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field is missing or null.
    pub fn not_exists<P>(field: impl Into<String>) -> Expr<P> {
        Expr::Exists(field.into(), false)
    }

    /// Matches documents whose array field has an element satisfying `predicate`.
    pub fn any_element<P>(collection: impl Into<String>, predicate: Expr<P>) -> Expr<P> {
        Expr::AnyElement {
            collection: collection.into(),
            predicate: Some(Box::new(predicate)),
        }
    }

    /// Matches documents whose array field is non-empty.
    pub fn not_empty<P>(collection: impl Into<String>) -> Expr<P> {
        Expr::AnyElement {
            collection: collection.into(),
            predicate: None,
        }
    }

    /// Combines multiple expressions such that all must match.
    pub fn and<P>(exprs: impl IntoIterator<Item = Expr<P>>) -> Expr<P> {
        Expr::And(exprs.into_iter().collect())
    }

    /// Combines multiple expressions such that any can match.
    pub fn or<P>(exprs: impl IntoIterator<Item = Expr<P>>) -> Expr<P> {
        Expr::Or(exprs.into_iter().collect())
    }
}

/// Aggregate functions a shape can compute instead of returning documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Min,
    Max,
    Average,
}

/// An aggregate over the matched documents; `field` is `None` only for `Count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub op: AggregateOp,
    pub field: Option<String>,
}

/// One fragment of a query shape. Each kind has its own translation rule.
#[derive(Debug, Clone)]
pub enum Fragment<P> {
    /// Restricts the matched documents. Multiple filters are combined with AND.
    Filter(Expr<P>),
    /// Selects a subset of body fields; only valid for raw JSON results.
    Projection(Vec<String>),
    /// Orders the matched documents. Multiple orderings apply in sequence.
    Ordering(Sort),
    /// Computes a scalar over the matched documents.
    Aggregate(Aggregate),
    /// Asks whether any document matches.
    Existence,
    /// Limits the number of matched documents.
    Take(Operand<P>),
    /// Skips leading matched documents.
    Skip(Operand<P>),
}

/// The translated structure of a query: an ordered list of fragments.
#[derive(Debug, Clone)]
pub struct QueryShape<P> {
    fragments: Vec<Fragment<P>>,
}

impl<P> Default for QueryShape<P> {
    fn default() -> Self {
        Self { fragments: Vec::new() }
    }
}

impl<P> QueryShape<P> {
    /// Creates a shape matching every document of the queried type.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fragments(&self) -> &[Fragment<P>] {
        &self.fragments
    }

    /// Appends an arbitrary fragment.
    pub fn fragment(mut self, fragment: Fragment<P>) -> Self {
        self.fragments.push(fragment);
        self
    }

    /// Adds a filter expression.
    pub fn filter(self, filter: Expr<P>) -> Self {
        self.fragment(Fragment::Filter(filter))
    }

    /// Projects the given fields into the raw JSON body.
    pub fn select<S: Into<String>>(self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fragment(Fragment::Projection(fields.into_iter().map(Into::into).collect()))
    }

    /// Adds a sort key.
    pub fn order_by(self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.fragment(Fragment::Ordering(Sort { field: field.into(), direction }))
    }

    /// Counts the matched documents.
    pub fn count(self) -> Self {
        self.fragment(Fragment::Aggregate(Aggregate { op: AggregateOp::Count, field: None }))
    }

    /// Computes `op` over a numeric field of the matched documents.
    pub fn aggregate(self, op: AggregateOp, field: impl Into<String>) -> Self {
        self.fragment(Fragment::Aggregate(Aggregate { op, field: Some(field.into()) }))
    }

    /// Asks whether any document matches.
    pub fn exists(self) -> Self {
        self.fragment(Fragment::Existence)
    }

    /// Limits the number of matched documents.
    pub fn take(self, count: impl Into<Operand<P>>) -> Self {
        self.fragment(Fragment::Take(count.into()))
    }

    /// Skips leading matched documents.
    pub fn skip(self, count: impl Into<Operand<P>>) -> Self {
        self.fragment(Fragment::Skip(count.into()))
    }

    /// Converts every parameter in the shape, in fragment order.
    pub fn map_params<Q>(self, mut f: impl FnMut(P) -> Q) -> QueryShape<Q> {
        QueryShape {
            fragments: self
                .fragments
                .into_iter()
                .map(|fragment| match fragment {
                    Fragment::Filter(expr) => Fragment::Filter(expr.map_params(&mut f)),
                    Fragment::Projection(fields) => Fragment::Projection(fields),
                    Fragment::Ordering(sort) => Fragment::Ordering(sort),
                    Fragment::Aggregate(aggregate) => Fragment::Aggregate(aggregate),
                    Fragment::Existence => Fragment::Existence,
                    Fragment::Take(operand) => Fragment::Take(operand.map_param(&mut f)),
                    Fragment::Skip(operand) => Fragment::Skip(operand.map_param(&mut f)),
                })
                .collect(),
        }
    }
}

/// Visitor over filter expressions, used by translators.
pub trait QueryVisitor<P> {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr<P>]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr<P>]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr<P>) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: FieldOp,
        operand: &Operand<P>,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_any_element(
        &mut self,
        collection: &str,
        predicate: Option<&Expr<P>>,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr<P>) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, operand } => self.visit_field(field, *op, operand),
            Expr::AnyElement { collection, predicate } => {
                self.visit_any_element(collection, predicate.as_deref())
            }
        }
    }
}
