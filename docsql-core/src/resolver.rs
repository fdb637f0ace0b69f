//! Result resolvers: turning a row cursor into a query's declared result.
//!
//! A query definition names its result kind with one of the marker types
//! below. Each marker fixes the [`ResultShape`] the plan is translated for
//! and how rows are read back:
//!
//! | marker              | output                 | zero rows         |
//! |---------------------|------------------------|-------------------|
//! | [`Single`]          | `Arc<T>`               | `NotFound` error  |
//! | [`SingleOrDefault`] | `Option<Arc<T>>`       | `None`            |
//! | [`ToList`]          | [`QueryResults`]       | empty iterator    |
//! | [`Count`]           | `i64`                  | `0`               |
//! | [`ScalarValue`]     | `Option<f64>`          | `None`            |
//! | [`Exists`]          | `bool`                 | `false`           |

use std::{any::type_name, fmt, sync::Arc};

use tracing::trace;
use uuid::Uuid;

use crate::{
    backend::RowCursor,
    document::{Document, DocumentExt, resolve_id},
    error::{DocumentStoreError, DocumentStoreResult},
    identity::IdentityMap,
    plan::ResultShape,
    value::{DbValue, Row},
};

/// Maps document rows (`id, data, mt_version`) to tracked instances.
///
/// The id column is read first. When the session already tracks that id the
/// existing instance is returned and the body is not deserialized.
pub struct DocumentMapper<'s, T: Document> {
    identity: &'s mut IdentityMap,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<'s, T: Document> DocumentMapper<'s, T> {
    pub fn new(identity: &'s mut IdentityMap) -> Self {
        Self {
            identity,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn map_row(&mut self, row: Row) -> DocumentStoreResult<Arc<T>> {
        let id = resolve_id::<T>(row.get(0)?)?;

        if let Some(existing) = self.identity.get::<T>(&id) {
            trace!(document = type_name::<T>(), ?id, "identity map hit");
            return Ok(existing);
        }

        let document = Arc::new(T::from_body(row.text(1)?)?);
        self.identity
            .insert(id.clone(), Arc::clone(&document))?;

        let version = row
            .get(2)
            .ok()
            .and_then(DbValue::as_str)
            .and_then(|version| Uuid::parse_str(version).ok());
        if version.is_some() {
            self.identity.set_version::<T>(&id, version)?;
        }

        Ok(document)
    }
}

/// How a result marker reads rows for a document type `T`.
pub trait ResultResolver<T: Document>: 'static {
    /// The shape the definition's plan is translated for.
    const SHAPE: ResultShape;

    /// The value a query returns. May borrow the session for lazy results.
    type Output<'s>;

    /// Consumes `cursor` into the output. `query` names the definition type.
    fn resolve<'s>(
        query: &'static str,
        cursor: RowCursor,
        mapper: DocumentMapper<'s, T>,
    ) -> DocumentStoreResult<Self::Output<'s>>;
}

/// Exactly one document.
#[derive(Debug, Clone, Copy)]
pub struct Single;

/// At most one document.
#[derive(Debug, Clone, Copy)]
pub struct SingleOrDefault;

/// Every matching document, lazily.
#[derive(Debug, Clone, Copy)]
pub struct ToList;

/// A count aggregate.
#[derive(Debug, Clone, Copy)]
pub struct Count;

/// A numeric aggregate such as a sum or an average.
#[derive(Debug, Clone, Copy)]
pub struct ScalarValue;

/// Whether anything matches.
#[derive(Debug, Clone, Copy)]
pub struct Exists;

impl<T: Document> ResultResolver<T> for Single {
    const SHAPE: ResultShape = ResultShape::Single;
    type Output<'s> = Arc<T>;

    fn resolve<'s>(
        query: &'static str,
        mut cursor: RowCursor,
        mut mapper: DocumentMapper<'s, T>,
    ) -> DocumentStoreResult<Self::Output<'s>> {
        let first = match cursor.next() {
            Some(row) => row?,
            None => return Err(DocumentStoreError::NotFound(query)),
        };
        // nothing is tracked when the match is ambiguous
        if cursor.next().transpose()?.is_some() {
            return Err(DocumentStoreError::MultipleResults(query));
        }
        mapper.map_row(first)
    }
}

impl<T: Document> ResultResolver<T> for SingleOrDefault {
    const SHAPE: ResultShape = ResultShape::SingleOrDefault;
    type Output<'s> = Option<Arc<T>>;

    fn resolve<'s>(
        _query: &'static str,
        mut cursor: RowCursor,
        mut mapper: DocumentMapper<'s, T>,
    ) -> DocumentStoreResult<Self::Output<'s>> {
        cursor
            .next()
            .map(|row| mapper.map_row(row?))
            .transpose()
    }
}

impl<T: Document> ResultResolver<T> for ToList {
    const SHAPE: ResultShape = ResultShape::List;
    type Output<'s> = QueryResults<'s, T>;

    fn resolve<'s>(
        _query: &'static str,
        cursor: RowCursor,
        mapper: DocumentMapper<'s, T>,
    ) -> DocumentStoreResult<Self::Output<'s>> {
        Ok(QueryResults {
            cursor: Some(cursor),
            mapper,
        })
    }
}

impl<T: Document> ResultResolver<T> for Count {
    const SHAPE: ResultShape = ResultShape::Scalar;
    type Output<'s> = i64;

    fn resolve<'s>(
        _query: &'static str,
        mut cursor: RowCursor,
        _mapper: DocumentMapper<'s, T>,
    ) -> DocumentStoreResult<Self::Output<'s>> {
        match cursor.next() {
            Some(row) => row?.integer(0),
            None => Ok(0),
        }
    }
}

impl<T: Document> ResultResolver<T> for ScalarValue {
    const SHAPE: ResultShape = ResultShape::Scalar;
    type Output<'s> = Option<f64>;

    fn resolve<'s>(
        _query: &'static str,
        mut cursor: RowCursor,
        _mapper: DocumentMapper<'s, T>,
    ) -> DocumentStoreResult<Self::Output<'s>> {
        match cursor.next() {
            Some(row) => Ok(row?.get(0)?.as_f64()),
            None => Ok(None),
        }
    }
}

impl<T: Document> ResultResolver<T> for Exists {
    const SHAPE: ResultShape = ResultShape::Exists;
    type Output<'s> = bool;

    fn resolve<'s>(
        _query: &'static str,
        mut cursor: RowCursor,
        _mapper: DocumentMapper<'s, T>,
    ) -> DocumentStoreResult<Self::Output<'s>> {
        match cursor.next() {
            Some(row) => Ok(row?.get(0)?.as_bool().unwrap_or(false)),
            None => Ok(false),
        }
    }
}

/// Lazy, single-pass sequence of query results.
///
/// Holds the row cursor until it is exhausted, an error is returned, or the
/// sequence is dropped; after an error it yields nothing more.
pub struct QueryResults<'s, T: Document> {
    cursor: Option<RowCursor>,
    mapper: DocumentMapper<'s, T>,
}

impl<T: Document> Iterator for QueryResults<'_, T> {
    type Item = DocumentStoreResult<Arc<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.cursor.as_mut()?.next();

        let mapped = match row {
            Some(Ok(row)) => self.mapper.map_row(row),
            Some(Err(err)) => Err(err),
            None => {
                self.cursor = None;
                return None;
            }
        };

        if mapped.is_err() {
            self.cursor = None;
        }
        Some(mapped)
    }
}

impl<T: Document> fmt::Debug for QueryResults<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResults")
            .field("document", &type_name::<T>())
            .field("open", &self.cursor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{document::Identity, testing::Person};

    fn row(person: &Person) -> DocumentStoreResult<Row> {
        Ok(Row::new(vec![
            person.id.to_db(),
            DbValue::from(person.to_body()?),
            DbValue::from(Uuid::new_v4()),
        ]))
    }

    fn cursor(rows: Vec<DocumentStoreResult<Row>>) -> RowCursor {
        Box::new(rows.into_iter())
    }

    #[test]
    fn single_reports_not_found_and_single_or_default_none() {
        let mut identity = IdentityMap::new();

        let missing = <Single as ResultResolver<Person>>::resolve(
            "tests::ByName",
            cursor(vec![]),
            DocumentMapper::new(&mut identity),
        );
        assert!(matches!(missing, Err(DocumentStoreError::NotFound("tests::ByName"))));

        let absent = <SingleOrDefault as ResultResolver<Person>>::resolve(
            "tests::ByName",
            cursor(vec![]),
            DocumentMapper::new(&mut identity),
        )
        .unwrap();
        assert!(absent.is_none());
    }

    #[test]
    fn single_rejects_a_second_row_without_tracking() {
        let mut identity = IdentityMap::new();
        let first = Person::new("Jeremy", "jdm");
        let second = Person::new("Jeremy", "shadetreedev");

        let result = <Single as ResultResolver<Person>>::resolve(
            "tests::ByName",
            cursor(vec![row(&first), row(&second)]),
            DocumentMapper::new(&mut identity),
        );

        assert!(matches!(result, Err(DocumentStoreError::MultipleResults("tests::ByName"))));
        assert!(identity.version::<Person>(&first.id).is_none());
        assert!(identity.is_empty());
    }

    #[test]
    fn mapped_rows_are_tracked_and_reused() {
        let mut identity = IdentityMap::new();
        let person = Person::new("Jeremy", "jdm");
        let id = person.id;

        let first = <Single as ResultResolver<Person>>::resolve(
            "q",
            cursor(vec![row(&person)]),
            DocumentMapper::new(&mut identity),
        )
        .unwrap();
        let second = <Single as ResultResolver<Person>>::resolve(
            "q",
            cursor(vec![row(&person)]),
            DocumentMapper::new(&mut identity),
        )
        .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(identity.version::<Person>(&id).is_some());
    }

    #[test]
    fn list_results_stop_after_an_error() {
        let mut identity = IdentityMap::new();
        let rows = vec![
            row(&Person::new("Jeremy", "jdm")),
            Err(DocumentStoreError::Backend("connection reset".into())),
            row(&Person::new("Jeremy", "shadetreedev")),
        ];

        let mut results =
            <ToList as ResultResolver<Person>>::resolve("q", cursor(rows), DocumentMapper::new(&mut identity))
                .unwrap();

        assert!(results.next().unwrap().is_ok());
        assert!(results.next().unwrap().is_err());
        assert!(results.next().is_none());
    }

    #[test]
    fn scalars_read_the_first_column() {
        let mut identity = IdentityMap::new();

        let count = <Count as ResultResolver<Person>>::resolve(
            "q",
            cursor(vec![Ok(Row::new(vec![DbValue::Integer(2)]))]),
            DocumentMapper::new(&mut identity),
        )
        .unwrap();
        assert_eq!(count, 2);

        let mistyped = <Count as ResultResolver<Person>>::resolve(
            "q",
            cursor(vec![Ok(Row::new(vec![DbValue::from("two")]))]),
            DocumentMapper::new(&mut identity),
        );
        assert!(matches!(mistyped, Err(DocumentStoreError::Backend(_))));

        let sum = <ScalarValue as ResultResolver<Person>>::resolve(
            "q",
            cursor(vec![Ok(Row::new(vec![DbValue::Null]))]),
            DocumentMapper::new(&mut identity),
        )
        .unwrap();
        assert_eq!(sum, None);

        let exists = <Exists as ResultResolver<Person>>::resolve(
            "q",
            cursor(vec![Ok(Row::new(vec![DbValue::Integer(1)]))]),
            DocumentMapper::new(&mut identity),
        )
        .unwrap();
        assert!(exists);
    }
}
