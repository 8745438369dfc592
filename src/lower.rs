//! `lower` translates an expression tree into query text for a remote store, plus the row builder
//! that will materialize the rows the query returns.
//!
//! Only a bare table scan is pushed down:
//!
//! ```text
//! root.get_sub_schema("foodmart").get_table("sales", object[])   ->   select * from foodmart.sales
//! ```
//!
//! Any other root (a filter, a projection, an opaque call) is `UnsupportedShape`. That is the common,
//! expected outcome for composed queries and tells the caller to evaluate locally instead.
//! Lowering is pure: it never executes anything, and on error it produces no text at all.
//!
//! Query text is a function of the table id and the dialect only, so the same scan always lowers to
//! byte-identical text.

use std::sync::Arc;

use tracing::debug;

use crate::builtin::BuiltinOp;
use crate::expr::{Callee, ElementType, Expr, Literal};
use crate::row_builder::{DescriptorCache, RowBuilderDescriptor, SchemaIdentity};
use crate::schema::{SchemaInfo, TableId};
use crate::sql_value::SqlValue;
use crate::sql_writer::{Dialect, SqlWriter};

/// generated query text, in the dialect of the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryText(String);

impl QueryText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for QueryText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Cannot push down {0}; only a bare table scan can be lowered.")]
    UnsupportedShape(String),
    #[error("Malformed table scan: {0}.")]
    MalformedScan(String),
    #[error("Table {0} is not known to the schema.")]
    UnknownTable(TableId),
}

/// The result of lowering a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredScan {
    pub table: TableId,
    pub query: QueryText,
    pub row_builder: Arc<RowBuilderDescriptor>,
}

fn describe(e: &Expr) -> String {
    match e {
        Expr::Call(c) => match &c.callee {
            Callee::Builtin(op) => format!("a call to builtin {op:?}"),
            Callee::Opaque(cs) => format!("an opaque call {cs}"),
        },
        Expr::Constant(_) => "a constant".to_string(),
        Expr::Parameter(p) => format!("parameter {}", p.name),
        Expr::Field(f) => format!("field {}", f.name),
        Expr::Lambda(_) => "a lambda".to_string(),
    }
}

fn text_constant(e: &Expr) -> Option<&str> {
    match e {
        Expr::Constant(c) => match &c.value {
            Literal::Value(SqlValue::Text(s)) => Some(s.as_str()),
            _ => None,
        },
        _ => None,
    }
}

/// counts the calls in a tree that no builtin resolves.
pub fn opaque_calls(tree: &Expr) -> usize {
    let mut n = 0;
    tree.visit(&mut |e| {
        if let Expr::Call(c) = e {
            if let Callee::Opaque(_) = c.callee {
                n += 1;
            }
        }
    });
    n
}

/// finds the table a scan tree reads.
pub fn scan_target(tree: &Expr) -> Result<TableId, Error> {
    let call = match tree {
        Expr::Call(c) if c.callee == Callee::Builtin(BuiltinOp::DataContextGetTable) => c,
        other => {
            return Err(Error::UnsupportedShape(match opaque_calls(other) {
                0 => describe(other),
                n => format!("{} with {n} opaque call(s)", describe(other)),
            }))
        }
    };
    let (receiver, name, element_type) = match &call.operands[..] {
        [r, n, t] => (r, n, t),
        ops => {
            return Err(Error::MalformedScan(format!(
                "expected 3 operands, found {}",
                ops.len()
            )))
        }
    };
    let table = text_constant(name)
        .ok_or_else(|| Error::MalformedScan(format!("table name is {}", describe(name))))?;
    match element_type.as_ref() {
        Expr::Constant(c) if c.value == Literal::ElementType(ElementType::ObjectArray) => (),
        other => {
            return Err(Error::MalformedScan(format!(
                "rows must be object arrays, found {other}"
            )))
        }
    }
    let schema = match receiver.as_ref() {
        Expr::Parameter(_) => None,
        Expr::Call(c) if c.callee == Callee::Builtin(BuiltinOp::GetSubSchema) => {
            match &c.operands[..] {
                [root, schema] if root.as_parameter().is_some() => Some(
                    text_constant(schema)
                        .ok_or_else(|| {
                            Error::MalformedScan(format!("schema name is {}", describe(schema)))
                        })?
                        .to_string(),
                ),
                _ => {
                    return Err(Error::MalformedScan(format!(
                        "unsupported schema lookup {receiver}"
                    )))
                }
            }
        }
        other => {
            return Err(Error::MalformedScan(format!(
                "tables must be looked up in a data context, not {}",
                describe(other)
            )))
        }
    };
    Ok(TableId {
        schema,
        table: table.to_string(),
    })
}

/// renders the scan of a whole table.
pub fn scan_query_text(dialect: &Dialect, table: &TableId) -> QueryText {
    let mut w = SqlWriter::new(dialect);
    w.keyword("select");
    w.literal("*");
    w.keyword("from");
    match &table.schema {
        Some(s) => w.identifier(&[s.as_str(), table.table.as_str()]),
        None => w.identifier(&[table.table.as_str()]),
    }
    QueryText(w.finish())
}

/// lowers a scan tree, in the default dialect, without caching.
pub fn lower<S>(tree: &Expr, schema: &S) -> Result<(QueryText, RowBuilderDescriptor), Error>
where
    S: SchemaInfo + ?Sized,
{
    let table = scan_target(tree)?;
    let row_type = schema
        .row_type_of(&table)
        .ok_or_else(|| Error::UnknownTable(table.clone()))?;
    let query = scan_query_text(&Dialect::default(), &table);
    debug!(table = %table, query = %query, "lowered table scan");
    Ok((query, RowBuilderDescriptor::from_row_type(&row_type)))
}

/// lowers trees for one remote store, caching row builders per schema identity.
#[derive(Debug, Default)]
pub struct Lowerer {
    dialect: Dialect,
    cache: DescriptorCache,
}

impl Lowerer {
    pub fn new(dialect: Dialect) -> Lowerer {
        Lowerer {
            dialect,
            cache: DescriptorCache::new(),
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn lower<S>(&self, tree: &Expr, schema: &S) -> Result<LoweredScan, Error>
    where
        S: SchemaInfo + ?Sized,
    {
        let table = scan_target(tree)?;
        let row_type = schema
            .row_type_of(&table)
            .ok_or_else(|| Error::UnknownTable(table.clone()))?;
        let id = SchemaIdentity::new(table.clone(), schema.version(), row_type);
        let row_builder = self.cache.get_or_build(&id);
        let query = scan_query_text(&self.dialect, &table);
        debug!(
            table = %table,
            dialect = self.dialect.name,
            query = %query,
            "lowered table scan"
        );
        Ok(LoweredScan {
            table,
            query,
            row_builder,
        })
    }
}

#[cfg(test)]
mod test_support {
    use super::*;
    use crate::expr::{ExprRef, ExprType};
    use crate::schema::{ColumnDef, RowType};
    use crate::sql_type::SqlType;
    use std::collections::HashMap;

    pub struct FixedSchema {
        pub tables: HashMap<TableId, RowType>,
    }

    impl SchemaInfo for FixedSchema {
        fn row_type_of(&self, table: &TableId) -> Option<RowType> {
            self.tables.get(table).cloned()
        }
    }

    pub fn schema() -> FixedSchema {
        let rt = RowType::new(vec![
            ColumnDef::new("id", SqlType::Int64, false),
            ColumnDef::new("name", SqlType::Text, true),
        ]);
        let mut tables = HashMap::new();
        tables.insert(TableId::new(Some("foodmart"), "sales"), rt.clone());
        tables.insert(TableId::new(Some("foodmart"), "sales fact"), rt.clone());
        tables.insert(TableId::new(Some("foodmart"), "order"), rt.clone());
        tables.insert(TableId::new(None, "bare"), rt);
        FixedSchema { tables }
    }

    pub fn scan(schema: Option<&str>, table: &str) -> ExprRef {
        let root = Expr::parameter("root", ExprType::DataContext);
        let receiver = match schema {
            Some(s) => Expr::invoke(BuiltinOp::GetSubSchema, vec![root, Expr::text(s)]),
            None => root,
        };
        Expr::invoke(
            BuiltinOp::DataContextGetTable,
            vec![
                receiver,
                Expr::text(table),
                Expr::element_type(ElementType::ObjectArray),
            ],
        )
    }
}

#[cfg(test)]
use crate::expr::ExprRef;

#[test]
fn test_lower_scan() {
    use test_support::*;
    struct Case {
        desc: String,
        input: ExprRef,
        expected: &'static str,
    }
    let cases = vec![
        Case {
            desc: "plain schema-qualified table".to_string(),
            input: scan(Some("foodmart"), "sales"),
            expected: "select * from foodmart.sales",
        },
        Case {
            desc: "table name with a space".to_string(),
            input: scan(Some("foodmart"), "sales fact"),
            expected: "select * from foodmart.\"sales fact\"",
        },
        Case {
            desc: "reserved word as table name".to_string(),
            input: scan(Some("foodmart"), "order"),
            expected: "select * from foodmart.\"order\"",
        },
        Case {
            desc: "table read straight off the root".to_string(),
            input: scan(None, "bare"),
            expected: "select * from bare",
        },
    ];
    for case in cases {
        println!("Running case: {}", case.desc);
        let (query, descriptor) = lower(&case.input, &schema()).unwrap();
        assert_eq!(query.as_str(), case.expected);
        assert_eq!(descriptor.len(), 2);
    }
}

#[test]
fn test_scan_text_quotes_reserved_table_names() {
    let ansi = Dialect::ansi();
    for word in ["check", "column", "constraint", "unique", "window"] {
        assert_eq!(
            scan_query_text(&ansi, &TableId::new(Some("s"), word)).as_str(),
            format!("select * from s.\"{word}\"")
        );
    }
}

#[test]
fn test_lower_is_deterministic() {
    use test_support::*;
    let tree = scan(Some("foodmart"), "sales fact");
    let a = lower(&tree, &schema()).unwrap();
    let b = lower(&tree, &schema()).unwrap();
    assert_eq!(a.0.as_str().as_bytes(), b.0.as_str().as_bytes());
    assert_eq!(a.1, b.1);
}

#[test]
fn test_lower_escaped_name_round_trips() {
    use test_support::*;
    for d in [Dialect::ansi(), Dialect::postgres(), Dialect::mysql()] {
        let lowerer = Lowerer::new(d);
        for table in ["sales fact", "order"] {
            let lowered = lowerer.lower(&scan(Some("foodmart"), table), &schema()).unwrap();
            let parsed = crate::parser::parse_scan_query(lowered.query.as_str()).unwrap();
            assert_eq!(parsed, TableId::new(Some("foodmart"), table));
        }
    }
}

#[test]
fn test_lower_unsupported_shape() {
    use crate::builtin::{CallSite, Capability, ParamKind};
    use crate::expr::{ExprType, Parameter};
    use test_support::*;
    let pred = Expr::lambda(
        vec![Parameter {
            name: "r".to_string(),
            ty: ExprType::Object,
        }],
        Expr::constant(SqlValue::Bool(true), crate::sql_type::SqlType::Bool),
    );
    let filtered = Expr::call(
        CallSite::new(Capability::ExtendedEnumerable, "where", &[ParamKind::Predicate(1)]),
        vec![scan(Some("foodmart"), "sales"), pred.clone()],
    );
    assert_eq!(opaque_calls(&filtered), 0);
    assert_eq!(
        lower(&filtered, &schema()),
        Err(Error::UnsupportedShape("a call to builtin Where".to_string()))
    );
    let opaque = Expr::call(
        CallSite::new(Capability::ExtendedEnumerable, "where", &[ParamKind::Predicate(3)]),
        vec![scan(Some("foodmart"), "sales"), pred],
    );
    assert_eq!(opaque_calls(&opaque), 1);
    assert_eq!(
        lower(&opaque, &schema()),
        Err(Error::UnsupportedShape(
            "an opaque call ExtendedEnumerable.where(Predicate3) with 1 opaque call(s)".to_string()
        ))
    );
    assert!(matches!(
        lower(&Expr::text("sales"), &schema()),
        Err(Error::UnsupportedShape(_))
    ));
}

#[test]
fn test_lower_malformed_and_unknown() {
    use test_support::*;
    let tree = scan(Some("foodmart"), "sales");
    let bad_name = tree
        .with_operand(1, Expr::constant(SqlValue::Int(3), crate::sql_type::SqlType::Int64))
        .unwrap();
    assert!(matches!(lower(&bad_name, &schema()), Err(Error::MalformedScan(_))));

    let bad_element = tree
        .with_operand(2, Expr::element_type(ElementType::Scalar(crate::sql_type::SqlType::Int64)))
        .unwrap();
    assert!(matches!(lower(&bad_element, &schema()), Err(Error::MalformedScan(_))));

    assert_eq!(
        lower(&scan(Some("foodmart"), "missing"), &schema()),
        Err(Error::UnknownTable(TableId::new(Some("foodmart"), "missing")))
    );
}

#[test]
fn test_lowerer_caches_row_builders() {
    use test_support::*;
    let lowerer = Lowerer::default();
    let a = lowerer.lower(&scan(Some("foodmart"), "sales"), &schema()).unwrap();
    let b = lowerer.lower(&scan(Some("foodmart"), "sales"), &schema()).unwrap();
    assert!(Arc::ptr_eq(&a.row_builder, &b.row_builder));
    assert_eq!(a.query, b.query);
}
