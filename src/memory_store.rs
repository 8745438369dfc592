//! provides an in-memory stand-in for a remote relational store.
//!
//! A `MemoryStore` answers schema lookups and executes scan query text against tables held in rust
//! native data structures. It parses the query text it is given, so it only sees what a real remote
//! store would see. Every executed query is recorded.
//!
//! The uses of MemoryStore are:
//!   - Tests of lowering and materialization without a network.
//!   - The demo binary.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::lower::QueryText;
use crate::remote::{ExecutionSurface, RawRow, RemoteError, RowSource};
use crate::schema::{RowType, SchemaInfo, TableId, TableMeta};

#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub table: TableId,
    pub row_type: RowType,
    pub rows: Vec<RawRow>,
}

impl TableMeta for MemoryTable {
    fn table_id(&self) -> TableId {
        self.table.clone()
    }

    fn row_type(&self) -> &RowType {
        &self.row_type
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Table {0} not found.")]
    TableNameNotFound(TableId),
    #[error("Table {0} already exists.")]
    TableExists(TableId),
    #[error("Row has {found} values but table {table} has {expected} columns.")]
    RowWidth {
        table: TableId,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<TableId, MemoryTable>,
    version: u64,
    executed: Mutex<Vec<QueryText>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&mut self, table: TableId, row_type: RowType) -> Result<(), Error> {
        if self.tables.contains_key(&table) {
            return Err(Error::TableExists(table));
        }
        self.tables.insert(
            table.clone(),
            MemoryTable {
                table,
                row_type,
                rows: vec![],
            },
        );
        self.version += 1;
        Ok(())
    }

    pub fn get_table(&self, table: &TableId) -> Result<&MemoryTable, Error> {
        self.tables
            .get(table)
            .ok_or_else(|| Error::TableNameNotFound(table.clone()))
    }

    /// appends a row after checking its width against the table's row type.
    pub fn append_row(&mut self, table: &TableId, row: RawRow) -> Result<(), Error> {
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::TableNameNotFound(table.clone()))?;
        if row.items.len() != t.row_type.len() {
            return Err(Error::RowWidth {
                table: table.clone(),
                expected: t.row_type.len(),
                found: row.items.len(),
            });
        }
        t.rows.push(row);
        Ok(())
    }

    /// replaces a table's row type while keeping its rows, as a schema change on the remote side would.
    pub fn alter_row_type(&mut self, table: &TableId, row_type: RowType) -> Result<(), Error> {
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::TableNameNotFound(table.clone()))?;
        t.row_type = row_type;
        self.version += 1;
        Ok(())
    }

    pub fn executed_queries(&self) -> Vec<String> {
        self.executed
            .lock()
            .iter()
            .map(|q| q.as_str().to_string())
            .collect()
    }
}

impl SchemaInfo for MemoryStore {
    fn row_type_of(&self, table: &TableId) -> Option<RowType> {
        self.tables.get(table).map(|t| t.row_type.clone())
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl ExecutionSurface for MemoryStore {
    fn execute(&self, query: &QueryText) -> Result<RowSource, RemoteError> {
        self.executed.lock().push(query.clone());
        let table = crate::parser::parse_scan_query(query.as_str()).map_err(RemoteError::new)?;
        let t = self.get_table(&table).map_err(RemoteError::new)?;
        debug!(table = %table, rows = t.rows.len(), "executing scan");
        Ok(Box::new(t.rows.clone().into_iter().map(Ok::<RawRow, RemoteError>)))
    }
}

#[cfg(test)]
fn make_store() -> (MemoryStore, TableId) {
    use crate::schema::ColumnDef;
    use crate::sql_type::SqlType;
    use crate::sql_value::SqlValue;
    let mut store = MemoryStore::new();
    let id = TableId::new(Some("foodmart"), "sales");
    store
        .create_table(
            id.clone(),
            RowType::new(vec![
                ColumnDef::new("id", SqlType::Int64, false),
                ColumnDef::new("region", SqlType::Text, true),
            ]),
        )
        .unwrap();
    for (i, r) in ["north", "south"].iter().enumerate() {
        store
            .append_row(
                &id,
                RawRow::new(vec![SqlValue::Int(i as i64), SqlValue::Text(r.to_string())]),
            )
            .unwrap();
    }
    (store, id)
}

#[test]
fn test_memory_store_tables() {
    use crate::sql_value::SqlValue;
    let (mut store, id) = make_store();
    assert_eq!(store.get_table(&id).unwrap().rows.len(), 2);
    assert_eq!(
        store.get_table(&id).unwrap().column_names(),
        vec!["id".to_string(), "region".to_string()]
    );
    assert_eq!(store.version(), 1);
    assert_eq!(
        store.create_table(id.clone(), RowType::default()),
        Err(Error::TableExists(id.clone()))
    );
    assert_eq!(
        store.append_row(&id, RawRow::new(vec![SqlValue::Int(9)])),
        Err(Error::RowWidth {
            table: id.clone(),
            expected: 2,
            found: 1
        })
    );
}

#[test]
fn test_memory_store_executes_scan_text() {
    let (store, _) = make_store();
    let rows: Vec<RawRow> = store
        .execute(&crate::lower::scan_query_text(
            &crate::sql_writer::Dialect::ansi(),
            &TableId::new(Some("foodmart"), "sales"),
        ))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(store.executed_queries(), vec!["select * from foodmart.sales".to_string()]);
}

#[test]
fn test_memory_store_rejects_unknown_tables() {
    let (store, _) = make_store();
    let q = crate::lower::scan_query_text(
        &crate::sql_writer::Dialect::ansi(),
        &TableId::new(Some("foodmart"), "nope"),
    );
    let err = match store.execute(&q) {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    assert_eq!(
        err.into_inner().downcast_ref::<Error>(),
        Some(&Error::TableNameNotFound(TableId::new(Some("foodmart"), "nope")))
    );
}
