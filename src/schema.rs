//! Traits and types that describe the structure of remote tables.
//!
//! The column metadata itself belongs to whoever owns the remote store; this crate only needs the
//! ordered list of column names, declared types and nullability.

use crate::sql_type::SqlType;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: &str, sql_type: SqlType, nullable: bool) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            sql_type,
            nullable,
        }
    }
}

/// the ordered columns of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RowType {
    pub columns: Vec<ColumnDef>,
}

impl RowType {
    pub fn new(columns: Vec<ColumnDef>) -> RowType {
        RowType { columns }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_types(&self) -> Vec<SqlType> {
        self.columns.iter().map(|c| c.sql_type).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// names a table, optionally within a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId {
    pub schema: Option<String>,
    pub table: String,
}

impl TableId {
    pub fn new(schema: Option<&str>, table: &str) -> TableId {
        TableId {
            schema: schema.map(String::from),
            table: table.to_string(),
        }
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(s) => write!(f, "{}.{}", s, self.table),
            None => self.table.fmt(f),
        }
    }
}

/// provides the row type of remote tables.
///
/// Answers must stay stable for the duration of one lowering call.
pub trait SchemaInfo {
    fn row_type_of(&self, table: &TableId) -> Option<RowType>;

    /// changes whenever any row type this provider reports changes.
    /// Derived artifacts such as row builders are cached per (table, version).
    fn version(&self) -> u64 {
        0
    }
}

/// Metadata common to anything that yields rows of a known type.
pub trait TableMeta {
    fn table_id(&self) -> TableId;
    fn row_type(&self) -> &RowType;

    fn column_names(&self) -> Vec<String> {
        self.row_type().column_names()
    }

    fn column_types(&self) -> Vec<SqlType> {
        self.row_type().column_types()
    }
}

#[test]
fn test_table_id_display() {
    assert_eq!(TableId::new(Some("foodmart"), "sales").to_string(), "foodmart.sales");
    assert_eq!(TableId::new(None, "sales").to_string(), "sales");
}

#[test]
fn test_row_type_columns() {
    let rt = RowType::new(vec![
        ColumnDef::new("id", SqlType::Int64, false),
        ColumnDef::new("name", SqlType::Text, true),
    ]);
    assert_eq!(rt.len(), 2);
    assert_eq!(rt.column_names(), vec!["id".to_string(), "name".to_string()]);
    assert_eq!(rt.column_types(), vec![SqlType::Int64, SqlType::Text]);
}
