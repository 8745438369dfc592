use std::sync::Arc;

use streaming_iterator::StreamingIterator;

use pushdown::expr::{Expr, ExprType, Parameter};
use pushdown::lower::LoweredScan;
use pushdown::materialize::{self, Datum, RowEnumerator};
use pushdown::memory_store::MemoryStore;
use pushdown::remote::{ExecutionSurface, RawRow, RemoteError, RowSource};
use pushdown::schema::{ColumnDef, RowType, TableId};
use pushdown::sql_writer::Dialect;
use pushdown::{Lowerer, Plan, QueryText, RemoteTable, SqlType, SqlValue};

fn sales_row_type() -> RowType {
    RowType::new(vec![
        ColumnDef::new("id", SqlType::Int64, false),
        ColumnDef::new("region", SqlType::Text, true),
    ])
}

fn make_store(table: &str, n: i64) -> (MemoryStore, TableId) {
    let mut store = MemoryStore::new();
    let id = TableId::new(Some("foodmart"), table);
    store.create_table(id.clone(), sales_row_type()).unwrap();
    for i in 0..n {
        store
            .append_row(
                &id,
                RawRow::new(vec![SqlValue::Int(i), SqlValue::Text(format!("r{i}"))]),
            )
            .unwrap();
    }
    (store, id)
}

fn remote_table(table: &str) -> RemoteTable {
    RemoteTable::new(Some("foodmart"), table, sales_row_type())
}

fn pushdown(plan: Plan) -> LoweredScan {
    match plan {
        Plan::Pushdown(lowered) => lowered,
        Plan::Local { reason } => panic!("expected pushdown, got local: {reason}"),
    }
}

#[test]
fn test_scan_is_pushed_down_and_materialized() {
    let (store, _) = make_store("sales", 2);
    let (names, rows) = pushdown::run_query(&remote_table("sales").query(), &Lowerer::default(), &store)
        .unwrap()
        .unwrap();
    assert_eq!(names, vec!["id".to_string(), "region".to_string()]);
    assert_eq!(
        rows.iter().map(|r| r.items.clone()).collect::<Vec<_>>(),
        vec![
            vec![Datum::Int64(0), Datum::Object(SqlValue::Text("r0".to_string()))],
            vec![Datum::Int64(1), Datum::Object(SqlValue::Text("r1".to_string()))],
        ]
    );
    assert_eq!(
        store.executed_queries(),
        vec!["select * from foodmart.sales".to_string()]
    );
}

#[test]
fn test_composed_query_falls_back_to_local() {
    let (store, _) = make_store("sales", 2);
    let pred = Expr::lambda(
        vec![Parameter {
            name: "r".to_string(),
            ty: ExprType::Object,
        }],
        Expr::constant(SqlValue::Bool(true), SqlType::Bool),
    );
    let query = remote_table("sales").query().filter(pred);
    match query.plan(&Lowerer::default(), &store).unwrap() {
        Plan::Local { .. } => (),
        Plan::Pushdown(l) => panic!("unexpected pushdown of {}", l.query),
    }
    assert_eq!(
        pushdown::run_query(&query, &Lowerer::default(), &store).unwrap(),
        None
    );
    assert!(store.executed_queries().is_empty());
}

#[test]
fn test_escaped_table_names() {
    let cases = vec![
        (Dialect::ansi(), "sales fact", "select * from foodmart.\"sales fact\""),
        (Dialect::ansi(), "order", "select * from foodmart.\"order\""),
        (Dialect::mysql(), "sales fact", "select * from foodmart.`sales fact`"),
        (Dialect::postgres(), "Sales", "select * from foodmart.\"Sales\""),
    ];
    for (dialect, table, expected) in cases {
        let (store, _) = make_store(table, 3);
        let lowerer = Lowerer::new(dialect);
        let lowered = pushdown(remote_table(table).query().plan(&lowerer, &store).unwrap());
        assert_eq!(lowered.query.as_str(), expected);
        let (_, rows) = pushdown::run_query(&remote_table(table).query(), &lowerer, &store)
            .unwrap()
            .unwrap();
        assert_eq!(rows.len(), 3);
    }
}

#[test]
fn test_row_order_is_preserved() {
    let (store, _) = make_store("sales", 100);
    let mut e = remote_table("sales")
        .enumerate(&Lowerer::default(), &store)
        .unwrap();
    let mut expected = 0;
    while let Some(row) = e.next() {
        assert_eq!(row.items[0], Datum::Int64(expected));
        expected += 1;
    }
    assert_eq!(expected, 100);
    assert!(e.take_error().is_none());
}

#[test]
fn test_schema_drift_is_a_column_arity_mismatch() {
    let (mut store, id) = make_store("sales", 1);
    let lowerer = Lowerer::default();
    let table = remote_table("sales");
    let before = pushdown(table.query().plan(&lowerer, &store).unwrap());
    assert_eq!(before.row_builder.len(), 2);

    let mut widened = sales_row_type();
    widened.columns.push(ColumnDef::new("units", SqlType::Int32, false));
    store.alter_row_type(&id, widened).unwrap();

    // The store's version changed, so the row builder is rebuilt from the new row type,
    // while the stored rows still have two values.
    let after = pushdown(table.query().plan(&lowerer, &store).unwrap());
    assert_eq!(after.row_builder.len(), 3);
    assert!(!Arc::ptr_eq(&before.row_builder, &after.row_builder));

    let err = pushdown::run_query(&table.query(), &lowerer, &store).unwrap_err();
    assert!(matches!(
        err,
        pushdown::Error::Materialize(materialize::Error::ColumnArityMismatch {
            expected: 3,
            found: 2
        })
    ));
}

#[test]
fn test_unknown_table_is_a_lowering_error() {
    let (store, _) = make_store("sales", 1);
    let err = pushdown::run_query(&remote_table("returns").query(), &Lowerer::default(), &store)
        .unwrap_err();
    assert!(matches!(
        err,
        pushdown::Error::Lowering(pushdown::lower::Error::UnknownTable(_))
    ));
    assert!(store.executed_queries().is_empty());
}

struct FailingSurface {
    fail_after: usize,
}

impl ExecutionSurface for FailingSurface {
    fn execute(&self, query: &QueryText) -> Result<RowSource, RemoteError> {
        if self.fail_after == 0 {
            return Err(RemoteError::from(anyhow::anyhow!("cannot run {query}")));
        }
        let rows: Vec<Result<RawRow, RemoteError>> = (0..self.fail_after as i64)
            .map(|i| Ok(RawRow::new(vec![SqlValue::Int(i), SqlValue::Null()])))
            .chain(std::iter::once(Err(RemoteError::from(anyhow::anyhow!(
                "connection reset"
            )))))
            .collect();
        Ok(Box::new(rows.into_iter()))
    }
}

#[test]
fn test_remote_errors_are_passed_through() {
    let table = remote_table("sales");
    let lowerer = Lowerer::default();

    let err = match table.enumerate(&lowerer, &FailingSurface { fail_after: 0 }) {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    assert_eq!(err.to_string(), "cannot run select * from foodmart.sales");

    let mut e: RowEnumerator = table
        .enumerate(&lowerer, &FailingSurface { fail_after: 2 })
        .unwrap();
    assert_eq!(e.next().map(|r| r.items[1].clone()), Some(Datum::Object(SqlValue::Null())));
    assert!(e.next().is_some());
    assert!(e.next().is_none());
    assert!(matches!(e.take_error(), Some(pushdown::Error::Remote(_))));
}

#[test]
fn test_redeclared_nullable_column_keeps_remote_nulls() {
    let mut store = MemoryStore::new();
    let id = TableId::new(Some("foodmart"), "sales");
    let declared = |nullable| RowType::new(vec![ColumnDef::new("discount", SqlType::Int64, nullable)]);
    store.create_table(id.clone(), declared(true)).unwrap();
    store
        .append_row(&id, RawRow::new(vec![SqlValue::Null()]))
        .unwrap();

    // Both tables report the default schema version; only their declared columns differ.
    let lowerer = Lowerer::default();
    let not_null = RemoteTable::new(Some("foodmart"), "sales", declared(false));
    let nullable = RemoteTable::new(Some("foodmart"), "sales", declared(true));

    let rows = not_null.enumerate(&lowerer, &store).unwrap().collect_rows().unwrap();
    assert_eq!(rows[0].items, vec![Datum::Int64(0)]);

    let rows = nullable.enumerate(&lowerer, &store).unwrap().collect_rows().unwrap();
    assert_eq!(rows[0].items, vec![Datum::Object(SqlValue::Null())]);
}
