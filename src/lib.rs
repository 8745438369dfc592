//! `pushdown` recognizes builtin query operators in expression trees and pushes plain table scans
//! down to a remote relational store.
//!
//! The pieces, leaf first:
//!   - `builtin`: the registry mapping call-site shapes to builtin operators.
//!   - `expr`: the immutable expression tree that chained operators build (`query` builds it).
//!   - `lower`: turns a scan tree into query text and a row builder.
//!   - `materialize`: turns raw remote rows into typed rows with that row builder.
//!
//! Execution itself belongs to an `ExecutionSurface`; `MemoryStore` is an in-memory one.

pub mod builtin;
pub mod expr;
pub mod formatting;
pub mod lower;
pub mod materialize;
pub mod memory_store;
pub mod parser;
pub mod query;
pub mod remote;
pub mod row_builder;
pub mod schema;
pub mod sql_type;
pub mod sql_value;
pub mod sql_writer;
pub mod table;

extern crate pest;
#[macro_use]
extern crate pest_derive;

pub use builtin::{resolve, BuiltinOp, CallSite, Capability, ParamKind};
pub use expr::{Expr, ExprRef, ExprType};
pub use lower::{lower, Lowerer, QueryText};
pub use materialize::{materialize, Datum, Row};
pub use query::{Plan, Query};
pub use row_builder::RowBuilderDescriptor;
pub use sql_type::SqlType;
pub use sql_value::SqlValue;
pub use table::RemoteTable;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Lowering(#[from] lower::Error),
    #[error(transparent)]
    Materialize(#[from] materialize::Error),
    #[error(transparent)]
    Remote(#[from] remote::RemoteError),
}

/// Plans a query and, if it can be pushed down, executes it and materializes every row.
/// Returns None when the query has to be evaluated locally instead.
pub fn run_query<X>(
    query: &Query,
    lowerer: &Lowerer,
    store: &X,
) -> Result<Option<(Vec<String>, Vec<Row>)>, Error>
where
    X: remote::ExecutionSurface + schema::SchemaInfo + ?Sized,
{
    match query.plan(lowerer, store)? {
        Plan::Local { .. } => Ok(None),
        Plan::Pushdown(lowered) => {
            let source = store.execute(&lowered.query)?;
            let enumerator = materialize::RowEnumerator::new(source, lowered.row_builder);
            let column_names = enumerator.column_names();
            Ok(Some((column_names, enumerator.collect_rows()?)))
        }
    }
}
