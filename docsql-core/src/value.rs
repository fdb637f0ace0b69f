//! Parameter and column values exchanged with the backing store.

use uuid::Uuid;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A scalar (or list) value bound to a command placeholder or read from a row column.
///
/// `List` only exists on the way in: translators expand list parameters into
/// one placeholder per element before a command reaches the backing store.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    List(Vec<DbValue>),
}

impl DbValue {
    /// Short name of the value's representation, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            DbValue::Null => "null",
            DbValue::Bool(_) => "bool",
            DbValue::Integer(_) => "integer",
            DbValue::Real(_) => "real",
            DbValue::Text(_) => "text",
            DbValue::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DbValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DbValue::Integer(value) => Some(*value),
            DbValue::Bool(value) => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DbValue::Integer(value) => Some(*value as f64),
            DbValue::Real(value) => Some(*value),
            _ => None,
        }
    }

    /// Truthiness as a relational engine reports it (`1`/`0` integers included).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DbValue::Bool(value) => Some(*value),
            DbValue::Integer(value) => Some(*value != 0),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DbValue]> {
        match self {
            DbValue::List(values) => Some(values),
            _ => None,
        }
    }
}

impl From<bool> for DbValue {
    fn from(value: bool) -> Self {
        DbValue::Bool(value)
    }
}

impl From<i32> for DbValue {
    fn from(value: i32) -> Self {
        DbValue::Integer(value as i64)
    }
}

impl From<i64> for DbValue {
    fn from(value: i64) -> Self {
        DbValue::Integer(value)
    }
}

impl From<u32> for DbValue {
    fn from(value: u32) -> Self {
        DbValue::Integer(value as i64)
    }
}

impl From<f64> for DbValue {
    fn from(value: f64) -> Self {
        DbValue::Real(value)
    }
}

impl From<String> for DbValue {
    fn from(value: String) -> Self {
        DbValue::Text(value)
    }
}

impl From<&str> for DbValue {
    fn from(value: &str) -> Self {
        DbValue::Text(value.to_string())
    }
}

impl From<&String> for DbValue {
    fn from(value: &String) -> Self {
        DbValue::Text(value.clone())
    }
}

impl From<Uuid> for DbValue {
    fn from(value: Uuid) -> Self {
        DbValue::Text(value.hyphenated().to_string())
    }
}

impl From<&Uuid> for DbValue {
    fn from(value: &Uuid) -> Self {
        DbValue::from(*value)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DbValue::Null)
    }
}

impl<T: Into<DbValue>> From<Vec<T>> for DbValue {
    fn from(values: Vec<T>) -> Self {
        DbValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// One row returned by the backing store, columns in select-list order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<DbValue>,
}

impl Row {
    pub fn new(values: Vec<DbValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at `index`, failing if the row is narrower than expected.
    pub fn get(&self, index: usize) -> DocumentStoreResult<&DbValue> {
        self.values.get(index).ok_or_else(|| {
            DocumentStoreError::Backend(format!(
                "Row has {} columns, column {} requested",
                self.values.len(),
                index
            ))
        })
    }

    /// Returns column `index` as text.
    pub fn text(&self, index: usize) -> DocumentStoreResult<&str> {
        let value = self.get(index)?;

        value.as_str().ok_or_else(|| {
            DocumentStoreError::Backend(format!(
                "Expected text in column {}, found {}",
                index,
                value.kind()
            ))
        })
    }

    /// Returns column `index` as an integer.
    pub fn integer(&self, index: usize) -> DocumentStoreResult<i64> {
        let value = self.get(index)?;

        value.as_i64().ok_or_else(|| {
            DocumentStoreError::Backend(format!(
                "Expected integer in column {}, found {}",
                index,
                value.kind()
            ))
        })
    }

    pub fn into_values(self) -> Vec<DbValue> {
        self.values
    }
}
