use std::str::FromStr;

use tracing::info;
use tracing_subscriber::EnvFilter;

use pushdown::memory_store::MemoryStore;
use pushdown::remote::RawRow;
use pushdown::schema::{ColumnDef, RowType, TableId};
use pushdown::sql_writer::Dialect;
use pushdown::{Lowerer, RemoteTable, SqlType, SqlValue};

fn demo_store() -> anyhow::Result<MemoryStore> {
    let mut store = MemoryStore::new();
    let sales = TableId::new(Some("foodmart"), "sales");
    store.create_table(
        sales.clone(),
        RowType::new(vec![
            ColumnDef::new("id", SqlType::Int64, false),
            ColumnDef::new("units", SqlType::Int32, false),
            ColumnDef::new("price", SqlType::Real, false),
            ColumnDef::new("region", SqlType::Text, true),
        ]),
    )?;
    for (id, units, price, region) in [
        (1, 3, 2.5, Some("north")),
        (2, 1, 10.0, Some("south")),
        (3, 7, 0.99, None),
    ] {
        store.append_row(
            &sales,
            RawRow::new(vec![
                SqlValue::Int(id),
                SqlValue::Int(units),
                SqlValue::Real(price),
                region.map_or(SqlValue::Null(), |r| SqlValue::Text(r.to_string())),
            ]),
        )?;
    }
    Ok(store)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    pushdown::builtin::init();

    let dialect = Dialect::from_str(&std::env::var("PUSHDOWN_DIALECT").unwrap_or_default())?;
    let table_name = std::env::args().nth(1).unwrap_or_else(|| "sales".to_string());

    let store = demo_store()?;
    let id = TableId::new(Some("foodmart"), &table_name);
    let row_type = store.get_table(&id)?.row_type.clone();
    let table = RemoteTable::new(Some("foodmart"), &table_name, row_type);
    let lowerer = Lowerer::new(dialect);

    info!(table = %table, "scanning");
    match pushdown::run_query(&table.query(), &lowerer, &store)? {
        Some((column_names, rows)) => pushdown::formatting::print_rows(&column_names, &rows),
        None => info!("query must be evaluated locally"),
    }
    for q in store.executed_queries() {
        info!(query = %q, "executed remotely");
    }
    Ok(())
}
