//! represents a table that lives in a remote store.
//!
//! A `RemoteTable` is not read whole. It is the starting point of a query: its expression is a table
//! scan, operators are chained on top of it, and the result is lowered to query text that the remote
//! store executes. Enumerating the table itself is the simplest case, a plain scan.

use crate::expr::{ElementType, Expr, ExprRef, ExprType};
use crate::lower::Lowerer;
use crate::materialize::RowEnumerator;
use crate::query::Query;
use crate::remote::ExecutionSurface;
use crate::schema::{RowType, SchemaInfo, TableId, TableMeta};
use crate::builtin::BuiltinOp;

/// The name of the data-context parameter that scan expressions start from.
pub const ROOT_PARAMETER: &str = "root";

/// Something a query can start from: it knows its element type and can describe itself as an expression.
pub trait QuerySource: TableMeta {
    fn element_type(&self) -> ElementType;
    fn expression(&self) -> ExprRef;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTable {
    schema: Option<String>,
    table_name: String,
    row_type: RowType,
}

impl RemoteTable {
    pub fn new(schema: Option<&str>, table_name: &str, row_type: RowType) -> RemoteTable {
        RemoteTable {
            schema: schema.map(String::from),
            table_name: table_name.to_string(),
            row_type,
        }
    }

    /// starts a query over this table.
    pub fn query(&self) -> Query {
        Query::new(self.expression())
    }

    /// lowers a scan of this table, executes it, and returns an enumerator over the materialized rows.
    /// Nothing is executed until this is called.
    pub fn enumerate<X>(&self, lowerer: &Lowerer, surface: &X) -> Result<RowEnumerator, crate::Error>
    where
        X: ExecutionSurface + ?Sized,
    {
        let lowered = lowerer.lower(&self.expression(), self)?;
        let source = surface.execute(&lowered.query)?;
        Ok(RowEnumerator::new(source, lowered.row_builder))
    }
}

impl std::fmt::Display for RemoteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RemoteTable {{{}}}", self.table_name)
    }
}

impl TableMeta for RemoteTable {
    fn table_id(&self) -> TableId {
        TableId::new(self.schema.as_deref(), &self.table_name)
    }

    fn row_type(&self) -> &RowType {
        &self.row_type
    }
}

impl SchemaInfo for RemoteTable {
    fn row_type_of(&self, table: &TableId) -> Option<RowType> {
        if *table == self.table_id() {
            Some(self.row_type.clone())
        } else {
            None
        }
    }
}

impl QuerySource for RemoteTable {
    fn element_type(&self) -> ElementType {
        ElementType::ObjectArray
    }

    fn expression(&self) -> ExprRef {
        let root = Expr::parameter(ROOT_PARAMETER, ExprType::DataContext);
        let context = match &self.schema {
            Some(s) => Expr::invoke(BuiltinOp::GetSubSchema, vec![root, Expr::text(s)]),
            None => root,
        };
        Expr::invoke(
            BuiltinOp::DataContextGetTable,
            vec![
                context,
                Expr::text(&self.table_name),
                Expr::element_type(self.element_type()),
            ],
        )
    }
}

#[cfg(test)]
fn make_table() -> RemoteTable {
    use crate::schema::ColumnDef;
    use crate::sql_type::SqlType;
    RemoteTable::new(
        Some("foodmart"),
        "sales",
        RowType::new(vec![
            ColumnDef::new("id", SqlType::Int64, false),
            ColumnDef::new("region", SqlType::Text, true),
        ]),
    )
}

#[test]
fn test_remote_table_meta() {
    let t = make_table();
    assert_eq!(t.to_string(), "RemoteTable {sales}");
    assert_eq!(t.table_id(), TableId::new(Some("foodmart"), "sales"));
    assert_eq!(t.column_names(), vec!["id".to_string(), "region".to_string()]);
    assert_eq!(t.element_type(), ElementType::ObjectArray);
}

#[test]
fn test_remote_table_expression_lowers() {
    let t = make_table();
    let e = t.expression();
    assert_eq!(e.builtin(), Some(BuiltinOp::DataContextGetTable));
    assert_eq!(
        e.to_string(),
        "root.get_sub_schema(\"foodmart\").get_table(\"sales\", object[])"
    );
    let lowered = Lowerer::default().lower(&e, &t).unwrap();
    assert_eq!(lowered.query.as_str(), "select * from foodmart.sales");
    assert_eq!(lowered.row_builder.len(), 2);
}
