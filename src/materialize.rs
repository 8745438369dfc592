//! turns raw remote rows into typed rows, using a row-builder descriptor.
//!
//! Columns the descriptor marks as primitive are unboxed through the typed accessor for their kind.
//! Other columns keep the remote value as-is, including NULL.
//! A raw row whose width differs from the descriptor means the remote schema has drifted since the
//! query was planned. That is reported as `ColumnArityMismatch` and never truncated or padded.
//! A value that cannot be unboxed into its column's primitive fails the whole row.
//! Rows are produced in exactly the order the row source yields them.

use std::sync::Arc;

use streaming_iterator::StreamingIterator;
use tracing::{trace, warn};

use crate::remote::{RawRow, RowSource};
use crate::row_builder::{Extraction, RowBuilderDescriptor};
use crate::sql_type::Primitive;
use crate::sql_value::SqlValue;

/// one materialized column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    /// a value extracted by reference. `SqlValue::Null()` marks a remote NULL.
    Object(SqlValue),
}

impl std::fmt::Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Datum::Bool(x) => x.fmt(f),
            Datum::Int32(x) => x.fmt(f),
            Datum::Int64(x) => x.fmt(f),
            Datum::Double(x) => x.fmt(f),
            Datum::Object(x) => x.fmt(f),
        }
    }
}

/// can hold a sequence of materialized values, one per column of the row type.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub items: Vec<Datum>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Row has {found} columns but the row builder expects {expected}.")]
    ColumnArityMismatch { expected: usize, found: usize },
    #[error("Casting error, column number {}, detail : {}", colnum, detail)]
    Casting {
        detail: crate::sql_value::Error,
        colnum: usize,
    },
}

fn extract(value: SqlValue, extraction: Extraction, colnum: usize) -> Result<Datum, Error> {
    let casting = |detail| Error::Casting { detail, colnum };
    Ok(match extraction {
        Extraction::Primitive(Primitive::Bool) => Datum::Bool(value.get_bool().map_err(casting)?),
        Extraction::Primitive(Primitive::Int32) => Datum::Int32(value.get_i32().map_err(casting)?),
        Extraction::Primitive(Primitive::Int64) => Datum::Int64(value.get_i64().map_err(casting)?),
        Extraction::Primitive(Primitive::Double) => {
            Datum::Double(value.get_f64().map_err(casting)?)
        }
        Extraction::Reference => Datum::Object(value),
    })
}

pub fn materialize(raw: RawRow, descriptor: &RowBuilderDescriptor) -> Result<Row, Error> {
    if raw.items.len() != descriptor.len() {
        warn!(
            expected = descriptor.len(),
            found = raw.items.len(),
            "raw row width does not match row builder"
        );
        return Err(Error::ColumnArityMismatch {
            expected: descriptor.len(),
            found: raw.items.len(),
        });
    }
    let mut items = Vec::with_capacity(descriptor.len());
    for (colnum, (value, extractor)) in raw
        .items
        .into_iter()
        .zip(descriptor.extractors.iter())
        .enumerate()
    {
        items.push(extract(value, extractor.extraction, colnum)?);
    }
    Ok(Row { items })
}

/// materializes a batch of rows in order, stopping at the first failure.
pub fn materialize_all<I>(rows: I, descriptor: &RowBuilderDescriptor) -> Result<Vec<Row>, Error>
where
    I: IntoIterator<Item = RawRow>,
{
    rows.into_iter().map(|r| materialize(r, descriptor)).collect()
}

/// iterates over the materialized rows of a remote row source.
///
/// The first error, remote or local, ends the iteration and is kept for `take_error`.
pub struct RowEnumerator {
    source: RowSource,
    descriptor: Arc<RowBuilderDescriptor>,
    item: Option<Row>,
    error: Option<crate::Error>,
    rows_seen: usize,
}

impl RowEnumerator {
    pub fn new(source: RowSource, descriptor: Arc<RowBuilderDescriptor>) -> RowEnumerator {
        RowEnumerator {
            source,
            descriptor,
            item: None,
            error: None,
            rows_seen: 0,
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.descriptor.column_names()
    }

    pub fn take_error(&mut self) -> Option<crate::Error> {
        self.error.take()
    }

    /// drains the enumerator, returning every row or the first error.
    pub fn collect_rows(mut self) -> Result<Vec<Row>, crate::Error> {
        let mut rows = vec![];
        while let Some(r) = self.next() {
            rows.push(r.clone());
        }
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(rows),
        }
    }
}

impl StreamingIterator for RowEnumerator {
    type Item = Row;

    #[inline]
    fn advance(&mut self) {
        self.item = None;
        if self.error.is_some() {
            return;
        }
        match self.source.next() {
            None => (),
            Some(Err(e)) => self.error = Some(crate::Error::Remote(e)),
            Some(Ok(raw)) => match materialize(raw, &self.descriptor) {
                Ok(row) => {
                    self.rows_seen += 1;
                    trace!(row = self.rows_seen, "materialized row");
                    self.item = Some(row);
                }
                Err(e) => self.error = Some(crate::Error::Materialize(e)),
            },
        }
    }

    #[inline]
    fn get(&self) -> Option<&Self::Item> {
        self.item.as_ref()
    }
}

#[cfg(test)]
fn make_source(rows: Vec<Result<RawRow, crate::remote::RemoteError>>) -> RowSource {
    Box::new(rows.into_iter())
}

#[cfg(test)]
fn make_descriptor() -> RowBuilderDescriptor {
    use crate::schema::{ColumnDef, RowType};
    use crate::sql_type::SqlType;
    RowBuilderDescriptor::from_row_type(&RowType::new(vec![
        ColumnDef::new("id", SqlType::Int64, false),
        ColumnDef::new("name", SqlType::Text, true),
    ]))
}

#[test]
fn test_materialize_primitive_and_reference() {
    let d = make_descriptor();
    let raw = RawRow::new(vec![SqlValue::Int(42), SqlValue::Text("abc".to_string())]);
    let row = materialize(raw, &d).unwrap();
    assert_eq!(
        row.items,
        vec![Datum::Int64(42), Datum::Object(SqlValue::Text("abc".to_string()))]
    );
}

#[test]
fn test_materialize_keeps_remote_null() {
    let d = make_descriptor();
    let raw = RawRow::new(vec![SqlValue::Int(1), SqlValue::Null()]);
    let row = materialize(raw, &d).unwrap();
    assert_eq!(row.items[1], Datum::Object(SqlValue::Null()));
}

#[test]
fn test_materialize_arity_mismatch() {
    let d = make_descriptor();
    let cases = vec![
        vec![SqlValue::Int(1), SqlValue::Text("a".to_string()), SqlValue::Int(3)],
        vec![SqlValue::Int(1)],
        vec![],
    ];
    for items in cases {
        let found = items.len();
        assert_eq!(
            materialize(RawRow::new(items), &d),
            Err(Error::ColumnArityMismatch { expected: 2, found })
        );
    }
}

#[test]
fn test_materialize_casting_error() {
    let d = make_descriptor();
    let raw = RawRow::new(vec![SqlValue::Text("forty-two".to_string()), SqlValue::Null()]);
    match materialize(raw, &d) {
        Err(Error::Casting { colnum, .. }) => assert_eq!(colnum, 0),
        other => panic!("expected casting error, got {other:?}"),
    }
}

#[test]
fn test_materialize_all_preserves_order() {
    let d = make_descriptor();
    for n in [0_i64, 1, 100] {
        let raws: Vec<RawRow> = (0..n)
            .map(|i| RawRow::new(vec![SqlValue::Int(i), SqlValue::Text(format!("r{i}"))]))
            .collect();
        let rows = materialize_all(raws, &d).unwrap();
        assert_eq!(rows.len(), n as usize);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.items[0], Datum::Int64(i as i64));
            assert_eq!(row.items[1], Datum::Object(SqlValue::Text(format!("r{i}"))));
        }
    }
}

#[test]
fn test_materialize_concurrently() {
    let d = Arc::new(make_descriptor());
    let handles: Vec<_> = (0..4_i64)
        .map(|batch| {
            let d = d.clone();
            std::thread::spawn(move || {
                let raws = (0..10).map(|i| {
                    RawRow::new(vec![SqlValue::Int(batch * 10 + i), SqlValue::Null()])
                });
                materialize_all(raws, &d).unwrap()
            })
        })
        .collect();
    for (batch, h) in handles.into_iter().enumerate() {
        let rows = h.join().unwrap();
        let ids: Vec<Datum> = rows.into_iter().map(|r| r.items[0].clone()).collect();
        let expected: Vec<Datum> = (0..10)
            .map(|i| Datum::Int64(batch as i64 * 10 + i))
            .collect();
        assert_eq!(ids, expected);
    }
}

#[test]
fn test_row_enumerator() {
    let d = Arc::new(make_descriptor());
    let source = make_source(vec![
        Ok(RawRow::new(vec![SqlValue::Int(1), SqlValue::Text("a".to_string())])),
        Ok(RawRow::new(vec![SqlValue::Int(2), SqlValue::Null()])),
    ]);
    let mut it = RowEnumerator::new(source, d);
    it.advance();
    assert_eq!(
        it.get(),
        Some(&Row {
            items: vec![Datum::Int64(1), Datum::Object(SqlValue::Text("a".to_string()))]
        })
    );
    it.advance();
    assert_eq!(it.get().map(|r| r.items[0].clone()), Some(Datum::Int64(2)));
    it.advance();
    assert_eq!(it.get(), None);
    assert!(it.take_error().is_none());
}

#[test]
fn test_row_enumerator_stops_at_first_error() {
    let d = Arc::new(make_descriptor());
    let source = make_source(vec![
        Ok(RawRow::new(vec![SqlValue::Int(1), SqlValue::Null()])),
        Ok(RawRow::new(vec![SqlValue::Int(2)])),
        Ok(RawRow::new(vec![SqlValue::Int(3), SqlValue::Null()])),
    ]);
    let res = RowEnumerator::new(source, d.clone()).collect_rows();
    assert!(matches!(
        res,
        Err(crate::Error::Materialize(Error::ColumnArityMismatch { expected: 2, found: 1 }))
    ));

    let source = make_source(vec![Err(crate::remote::RemoteError::from(anyhow::anyhow!(
        "timeout"
    )))]);
    let res = RowEnumerator::new(source, d).collect_rows();
    match res {
        Err(crate::Error::Remote(e)) => assert_eq!(e.to_string(), "timeout"),
        other => panic!("expected remote error, got {other:?}"),
    }
}
