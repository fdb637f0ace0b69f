//! SQL generation for JSON document tables.
//!
//! Documents live in one table per type, one row per `(tenant_id, id)`, with
//! the serialized body in a JSON `data` column. [`SqlTranslator`] turns query
//! shapes into `SELECT` templates over that table using the engine's JSON
//! functions (`json_extract`, `json_each`, `json_object`); the free functions
//! build the fixed statements used by document storage.
//!
//! Every generated `WHERE` clause starts with `d.tenant_id = ?` bound to
//! [`Binding::Tenant`], which keeps templates independent of the tenant.

use tracing::trace;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    plan::{Binding, CommandTemplate, ResultShape},
    query::{Aggregate, AggregateOp, Expr, FieldOp, Fragment, Operand, QueryVisitor, Sort, SortDirection},
    translator::{ExpressionTranslator, ParamRef, Translation, TranslationRequest},
    value::DbValue,
};

/// Columns selected for document rows: id, body, version.
pub const DOCUMENT_COLUMNS: &str = "d.id, d.data, d.mt_version";

/// The default [`ExpressionTranslator`], targeting SQLite's JSON1 functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlTranslator;

impl SqlTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionTranslator for SqlTranslator {
    fn translate(&self, request: &TranslationRequest<'_>) -> DocumentStoreResult<Translation> {
        let definition = request.definition;
        let table = table_name(request.table)
            .map_err(|message| DocumentStoreError::translation(definition, message))?;

        let parts = ShapeParts::collect(request)?;
        let mut writer = SqlWriter::new(definition);
        writer.bindings.push(Binding::Tenant);

        let mut where_clause = String::from("d.tenant_id = ?");
        for filter in &parts.filters {
            let condition = writer.visit_expr(filter)?;
            where_clause.push_str(" AND (");
            where_clause.push_str(&condition);
            where_clause.push(')');
        }

        let order_clause = parts
            .orderings
            .iter()
            .map(|sort| {
                let direction = match sort.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                Ok(format!("{} {direction}", writer.field_expr(&sort.field)?))
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?
            .join(", ");

        let limit_clause = writer.limit_clause(parts.take, parts.skip, request.hint);

        let columns = match request.hint {
            ResultShape::Scalar | ResultShape::Exists => "d.data".to_string(),
            ResultShape::RawJsonSingle | ResultShape::RawJsonList => match parts.projection {
                Some(fields) => projection(definition, fields)?,
                None => "d.data".to_string(),
            },
            ResultShape::Single | ResultShape::SingleOrDefault | ResultShape::List => {
                DOCUMENT_COLUMNS.to_string()
            }
        };

        let mut select = format!("SELECT {columns} FROM {table} AS d WHERE {where_clause}");
        if !order_clause.is_empty() {
            select.push_str(" ORDER BY ");
            select.push_str(&order_clause);
        }
        select.push_str(&limit_clause);

        let sql = match (request.hint, parts.aggregate) {
            (ResultShape::Scalar, Some(aggregate)) => {
                format!("SELECT {} FROM ({select}) AS d", aggregate_expr(definition, aggregate)?)
            }
            (ResultShape::Exists, _) => format!("SELECT EXISTS ({select})"),
            _ => select,
        };

        trace!(definition, sql = %sql, "generated query template");

        Ok(Translation {
            template: CommandTemplate::new(sql),
            bindings: writer.bindings,
            shape: request.hint,
            value_dependent: writer.value_dependent,
        })
    }
}

/// The fragments of one shape, grouped by kind and checked against the hint.
struct ShapeParts<'s> {
    filters: Vec<&'s Expr<ParamRef>>,
    orderings: Vec<&'s Sort>,
    projection: Option<&'s [String]>,
    aggregate: Option<&'s Aggregate>,
    take: Option<&'s Operand<ParamRef>>,
    skip: Option<&'s Operand<ParamRef>>,
}

impl<'s> ShapeParts<'s> {
    fn collect(request: &TranslationRequest<'s>) -> DocumentStoreResult<Self> {
        let definition = request.definition;
        let fail = |message: &str| DocumentStoreError::translation(definition, message);

        let mut parts = ShapeParts {
            filters: Vec::new(),
            orderings: Vec::new(),
            projection: None,
            aggregate: None,
            take: None,
            skip: None,
        };
        let mut existence = false;

        for fragment in request.shape.fragments() {
            match fragment {
                Fragment::Filter(expr) => parts.filters.push(expr),
                Fragment::Ordering(sort) => parts.orderings.push(sort),
                Fragment::Projection(fields) => {
                    if parts.projection.replace(fields).is_some() {
                        return Err(fail("a query can have at most one projection"));
                    }
                }
                Fragment::Aggregate(aggregate) => {
                    if parts.aggregate.replace(aggregate).is_some() {
                        return Err(fail("a query can have at most one aggregate"));
                    }
                }
                Fragment::Existence => existence = true,
                Fragment::Take(operand) => {
                    if parts.take.replace(operand).is_some() {
                        return Err(fail("take specified more than once"));
                    }
                }
                Fragment::Skip(operand) => {
                    if parts.skip.replace(operand).is_some() {
                        return Err(fail("skip specified more than once"));
                    }
                }
            }
        }

        let raw = matches!(request.hint, ResultShape::RawJsonSingle | ResultShape::RawJsonList);
        if parts.projection.is_some() && !raw {
            return Err(fail("projections are only supported for raw JSON results"));
        }
        if parts.aggregate.is_some() != (request.hint == ResultShape::Scalar) {
            return Err(fail("scalar results require exactly one aggregate"));
        }
        if existence && request.hint != ResultShape::Exists {
            return Err(fail("existence queries must be executed for an existence result"));
        }

        Ok(parts)
    }
}

/// Expression writer: accumulates bindings in placeholder order.
struct SqlWriter {
    definition: &'static str,
    bindings: Vec<Binding<usize>>,
    value_dependent: bool,
    /// Aliases of the enclosing `json_each` scopes, innermost last.
    scopes: Vec<String>,
    next_alias: usize,
}

impl SqlWriter {
    fn new(definition: &'static str) -> Self {
        Self {
            definition,
            bindings: Vec::new(),
            value_dependent: false,
            scopes: Vec::new(),
            next_alias: 0,
        }
    }

    fn fail(&self, message: impl Into<String>) -> DocumentStoreError {
        DocumentStoreError::translation(self.definition, message)
    }

    /// The SQL expression reading `field` in the current scope.
    fn field_expr(&self, field: &str) -> DocumentStoreResult<String> {
        match (self.scopes.last(), field.is_empty()) {
            (Some(alias), true) => Ok(format!("{alias}.value")),
            (Some(alias), false) => Ok(format!("json_extract({alias}.value, '{}')", self.json_path(field)?)),
            (None, true) => Err(self.fail("empty field path outside an element predicate")),
            (None, false) => Ok(format!("json_extract(d.data, '{}')", self.json_path(field)?)),
        }
    }

    fn json_path(&self, field: &str) -> DocumentStoreResult<String> {
        field_path(field).map_err(|message| self.fail(message))
    }

    /// Appends a binding for `operand` and returns its placeholder.
    fn bind(&mut self, operand: &Operand<ParamRef>) -> &'static str {
        self.bindings.push(match operand {
            Operand::Param(param) => Binding::Param(param.slot),
            Operand::Value(value) => Binding::Constant(value.clone()),
        });
        "?"
    }

    fn any_of(&mut self, target: String, operand: &Operand<ParamRef>) -> DocumentStoreResult<String> {
        let (items, wrap): (Vec<DbValue>, fn(DbValue) -> Binding<usize>) = match operand {
            Operand::Param(param) => {
                self.value_dependent = true;
                let items = match &param.sample {
                    DbValue::List(items) => items.clone(),
                    DbValue::Null => Vec::new(),
                    other => {
                        return Err(self.fail(format!(
                            "any_of parameter `{}` must be a list, got {}",
                            param.field,
                            other.kind()
                        )));
                    }
                };
                (items, Binding::Captured)
            }
            Operand::Value(DbValue::List(items)) => (items.clone(), Binding::Constant),
            Operand::Value(other) => {
                return Err(self.fail(format!("any_of requires a list, got {}", other.kind())));
            }
        };

        if items.is_empty() {
            return Ok("1 = 0".to_string());
        }

        let placeholders = vec!["?"; items.len()].join(", ");
        self.bindings.extend(items.into_iter().map(wrap));
        Ok(format!("{target} IN ({placeholders})"))
    }

    fn limit_clause(
        &mut self,
        take: Option<&Operand<ParamRef>>,
        skip: Option<&Operand<ParamRef>>,
        hint: ResultShape,
    ) -> String {
        let single = matches!(
            hint,
            ResultShape::Single | ResultShape::SingleOrDefault | ResultShape::RawJsonSingle
        );

        let mut clause = match take {
            Some(operand) => format!(" LIMIT {}", self.bind(operand)),
            // a second row lets the resolver reject ambiguous matches
            None if hint == ResultShape::Single => " LIMIT 2".to_string(),
            None if single => " LIMIT 1".to_string(),
            None if skip.is_some() => " LIMIT -1".to_string(),
            None => String::new(),
        };
        if let Some(operand) = skip {
            clause.push_str(" OFFSET ");
            clause.push_str(self.bind(operand));
        }
        clause
    }

    fn join(
        &mut self,
        exprs: &[Expr<ParamRef>],
        separator: &str,
        empty: &str,
    ) -> DocumentStoreResult<String> {
        if exprs.is_empty() {
            return Ok(empty.to_string());
        }
        let parts = exprs
            .iter()
            .map(|expr| self.visit_expr(expr).map(|sql| format!("({sql})")))
            .collect::<DocumentStoreResult<Vec<_>>>()?;
        Ok(parts.join(separator))
    }
}

impl QueryVisitor<ParamRef> for SqlWriter {
    type Output = String;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr<ParamRef>]) -> Result<Self::Output, Self::Error> {
        self.join(exprs, " AND ", "1 = 1")
    }

    fn visit_or(&mut self, exprs: &[Expr<ParamRef>]) -> Result<Self::Output, Self::Error> {
        self.join(exprs, " OR ", "1 = 0")
    }

    fn visit_not(&mut self, expr: &Expr<ParamRef>) -> Result<Self::Output, Self::Error> {
        Ok(format!("NOT ({})", self.visit_expr(expr)?))
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        let target = self.field_expr(field)?;
        Ok(if should_exist {
            format!("{target} IS NOT NULL")
        } else {
            format!("{target} IS NULL")
        })
    }

    fn visit_field(
        &mut self,
        field: &str,
        op: FieldOp,
        operand: &Operand<ParamRef>,
    ) -> Result<Self::Output, Self::Error> {
        let target = self.field_expr(field)?;

        if let Operand::Value(DbValue::Null) = operand {
            match op {
                FieldOp::Eq => return Ok(format!("{target} IS NULL")),
                FieldOp::Ne => return Ok(format!("{target} IS NOT NULL")),
                _ => return Err(self.fail(format!("null is not comparable with {op:?}"))),
            }
        }

        Ok(match op {
            // `IS` keeps a null parameter value meaning "is null", as a null constant does
            FieldOp::Eq => match operand {
                Operand::Param(_) => format!("{target} IS {}", self.bind(operand)),
                Operand::Value(_) => format!("{target} = {}", self.bind(operand)),
            },
            FieldOp::Ne => format!("{target} IS NOT {}", self.bind(operand)),
            FieldOp::Gt => format!("{target} > {}", self.bind(operand)),
            FieldOp::Gte => format!("{target} >= {}", self.bind(operand)),
            FieldOp::Lt => format!("{target} < {}", self.bind(operand)),
            FieldOp::Lte => format!("{target} <= {}", self.bind(operand)),
            FieldOp::Contains => format!("instr({target}, {}) > 0", self.bind(operand)),
            FieldOp::StartsWith => {
                let length = self.bind(operand);
                let prefix = self.bind(operand);
                format!("substr({target}, 1, length({length})) = {prefix}")
            }
            FieldOp::EndsWith => {
                let guard = self.bind(operand);
                let length = self.bind(operand);
                let suffix = self.bind(operand);
                format!("(length({guard}) = 0 OR substr({target}, -length({length})) = {suffix})")
            }
            FieldOp::AnyOf => self.any_of(target, operand)?,
        })
    }

    fn visit_any_element(
        &mut self,
        collection: &str,
        predicate: Option<&Expr<ParamRef>>,
    ) -> Result<Self::Output, Self::Error> {
        let source = match (self.scopes.last(), collection.is_empty()) {
            (Some(alias), true) => format!("{alias}.value"),
            (Some(alias), false) => format!("{alias}.value, '{}'", self.json_path(collection)?),
            (None, true) => return Err(self.fail("element predicates need a collection path")),
            (None, false) => format!("d.data, '{}'", self.json_path(collection)?),
        };

        let alias = format!("e{}", self.next_alias);
        self.next_alias += 1;

        self.scopes.push(alias.clone());
        let condition = predicate.map(|expr| self.visit_expr(expr)).transpose();
        self.scopes.pop();

        Ok(match condition? {
            Some(condition) => {
                format!("EXISTS (SELECT 1 FROM json_each({source}) AS {alias} WHERE {condition})")
            }
            None => format!("EXISTS (SELECT 1 FROM json_each({source}) AS {alias})"),
        })
    }
}

fn aggregate_expr(definition: &'static str, aggregate: &Aggregate) -> DocumentStoreResult<String> {
    let function = match aggregate.op {
        AggregateOp::Count => "COUNT",
        AggregateOp::Sum => "SUM",
        AggregateOp::Min => "MIN",
        AggregateOp::Max => "MAX",
        AggregateOp::Average => "AVG",
    };

    match (&aggregate.field, aggregate.op) {
        (None, AggregateOp::Count) => Ok("COUNT(*)".to_string()),
        (None, op) => Err(DocumentStoreError::translation(
            definition,
            format!("{op:?} requires a field"),
        )),
        (Some(field), _) => {
            let path = field_path(field).map_err(|message| DocumentStoreError::translation(definition, message))?;
            Ok(format!("{function}(json_extract(d.data, '{path}'))"))
        }
    }
}

fn projection(definition: &'static str, fields: &[String]) -> DocumentStoreResult<String> {
    if fields.is_empty() {
        return Err(DocumentStoreError::translation(definition, "empty projection"));
    }

    let pairs = fields
        .iter()
        .map(|field| {
            let path = field_path(field).map_err(|message| DocumentStoreError::translation(definition, message))?;
            let key = field.rsplit('.').next().unwrap_or(field);
            Ok(format!("'{key}', json_extract(d.data, '{path}')"))
        })
        .collect::<DocumentStoreResult<Vec<_>>>()?;

    Ok(format!("json_object({})", pairs.join(", ")))
}

/// Converts a dotted field path into a JSON path, rejecting anything that
/// could escape the quoted literal.
fn field_path(field: &str) -> Result<String, String> {
    let valid = !field.is_empty()
        && field.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(format!("$.{field}"))
    } else {
        Err(format!("invalid field path `{field}`"))
    }
}

/// Validates a table name for direct interpolation.
pub fn table_name(table: &str) -> Result<&str, String> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());

    if valid {
        Ok(table)
    } else {
        Err(format!("invalid table name `{table}`"))
    }
}

/// `CREATE TABLE IF NOT EXISTS` for a document table.
pub fn create_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         id NOT NULL, \
         tenant_id TEXT NOT NULL, \
         data TEXT NOT NULL, \
         mt_version TEXT, \
         mt_last_modified TEXT, \
         PRIMARY KEY (tenant_id, id))"
    )
}

/// Fetches one document row by id. Binds tenant, then id.
pub fn select_by_id(table: &str) -> String {
    format!("SELECT {DOCUMENT_COLUMNS} FROM {table} AS d WHERE d.tenant_id = ? AND d.id = ?")
}

/// Fetches document rows for `count` ids. Binds tenant, then each id.
pub fn select_by_ids(table: &str, count: usize) -> String {
    let placeholders = vec!["?"; count].join(", ");
    format!("SELECT {DOCUMENT_COLUMNS} FROM {table} AS d WHERE d.tenant_id = ? AND d.id IN ({placeholders})")
}

/// Inserts or replaces a document. Binds id, tenant, data, version, last modified.
pub fn upsert(table: &str) -> String {
    format!(
        "INSERT INTO {table} (id, tenant_id, data, mt_version, mt_last_modified) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (tenant_id, id) DO UPDATE SET \
         data = excluded.data, \
         mt_version = excluded.mt_version, \
         mt_last_modified = excluded.mt_last_modified"
    )
}

/// Deletes a document. Binds tenant, then id.
pub fn delete_by_id(table: &str) -> String {
    format!("DELETE FROM {table} WHERE tenant_id = ? AND id = ?")
}
