//! `query` chains builtin operators over a source expression.
//!
//! Every chained call is described as a call site and resolved through the builtin registry, so the
//! resulting tree records which nodes are builtins. A call whose shape is not a builtin (for example a
//! filter with a three-argument predicate) still builds, as an opaque call.
//!
//! Building is pure and cheap. Planning decides whether the tree can be pushed down to the remote
//! store; nothing executes until the caller acts on the plan.

use tracing::debug;

use crate::builtin::{CallSite, Capability, ParamKind};
use crate::expr::{Expr, ExprRef, ExprType};
use crate::lower::{self, LoweredScan, Lowerer};
use crate::schema::SchemaInfo;

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    expr: ExprRef,
}

/// What to do with a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// execute the generated text remotely and materialize with the row builder.
    Pushdown(LoweredScan),
    /// the tree cannot be pushed down; evaluate it in-process.
    Local { reason: String },
}

fn predicate_kind(e: &Expr) -> ParamKind {
    match e.ty() {
        ExprType::Function(n) => ParamKind::Predicate(n),
        _ => e.param_kind(),
    }
}

impl Query {
    pub fn new(expr: ExprRef) -> Query {
        Query { expr }
    }

    pub fn expression(&self) -> &ExprRef {
        &self.expr
    }

    fn chain(&self, name: &str, args: Vec<(ExprRef, ParamKind)>) -> Query {
        let kinds: Vec<ParamKind> = args.iter().map(|(_, k)| *k).collect();
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(self.expr.clone());
        operands.extend(args.into_iter().map(|(e, _)| e));
        let call_site = CallSite::new(Capability::ExtendedEnumerable, name, &kinds);
        Query {
            expr: Expr::call(call_site, operands),
        }
    }

    fn arg(e: ExprRef) -> (ExprRef, ParamKind) {
        let k = e.param_kind();
        (e, k)
    }

    pub fn filter(&self, predicate: ExprRef) -> Query {
        let k = predicate_kind(&predicate);
        self.chain("where", vec![(predicate, k)])
    }

    pub fn select(&self, selector: ExprRef) -> Query {
        self.chain("select", vec![Self::arg(selector)])
    }

    pub fn join(
        &self,
        inner: &Query,
        outer_key: ExprRef,
        inner_key: ExprRef,
        result: ExprRef,
    ) -> Query {
        self.chain(
            "join",
            vec![
                Self::arg(inner.expr.clone()),
                Self::arg(outer_key),
                Self::arg(inner_key),
                Self::arg(result),
            ],
        )
    }

    pub fn group_by(&self, key: ExprRef) -> Query {
        self.chain("group_by", vec![Self::arg(key)])
    }

    /// groups with an accumulator: `init` starts each group, `accumulate` folds an element into it,
    /// and `result` combines the key with the final accumulator.
    pub fn group_by_with(
        &self,
        key: ExprRef,
        init: ExprRef,
        accumulate: ExprRef,
        result: ExprRef,
    ) -> Query {
        self.chain(
            "group_by",
            vec![
                Self::arg(key),
                Self::arg(init),
                Self::arg(accumulate),
                Self::arg(result),
            ],
        )
    }

    pub fn aggregate(&self, seed: ExprRef, func: ExprRef, result: ExprRef) -> Query {
        self.chain(
            "aggregate",
            vec![
                (seed, ParamKind::Object),
                Self::arg(func),
                Self::arg(result),
            ],
        )
    }

    pub fn order_by(&self, key: ExprRef, comparator: ExprRef) -> Query {
        self.chain("order_by", vec![Self::arg(key), Self::arg(comparator)])
    }

    pub fn union(&self, other: &Query) -> Query {
        self.chain("union", vec![Self::arg(other.expr.clone())])
    }

    pub fn concat(&self, other: &Query) -> Query {
        self.chain("concat", vec![Self::arg(other.expr.clone())])
    }

    pub fn intersect(&self, other: &Query) -> Query {
        self.chain("intersect", vec![Self::arg(other.expr.clone())])
    }

    pub fn except(&self, other: &Query) -> Query {
        self.chain("except", vec![Self::arg(other.expr.clone())])
    }

    /// decides between pushdown and local evaluation.
    /// An unsupported shape is not an error: it becomes `Plan::Local`. Other lowering errors are returned.
    pub fn plan<S>(&self, lowerer: &Lowerer, schema: &S) -> Result<Plan, lower::Error>
    where
        S: SchemaInfo + ?Sized,
    {
        match lowerer.lower(&self.expr, schema) {
            Ok(lowered) => Ok(Plan::Pushdown(lowered)),
            Err(lower::Error::UnsupportedShape(reason)) => {
                debug!(%reason, query = %self.expr, "falling back to local evaluation");
                Ok(Plan::Local { reason })
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.expr.fmt(f)
    }
}

#[cfg(test)]
mod test_support {
    use crate::expr::{Expr, ExprRef, ExprType, Parameter};
    use crate::schema::{ColumnDef, RowType};
    use crate::sql_type::SqlType;
    use crate::table::RemoteTable;

    pub fn table(name: &str) -> RemoteTable {
        RemoteTable::new(
            Some("foodmart"),
            name,
            RowType::new(vec![
                ColumnDef::new("id", SqlType::Int64, false),
                ColumnDef::new("region", SqlType::Text, true),
            ]),
        )
    }

    pub fn lambda(params: &[&str], body: ExprRef) -> ExprRef {
        Expr::lambda(
            params
                .iter()
                .map(|p| Parameter {
                    name: p.to_string(),
                    ty: ExprType::Object,
                })
                .collect(),
            body,
        )
    }

    pub fn field(param: &str, name: &str, ty: SqlType) -> ExprRef {
        Expr::field(Expr::parameter(param, ExprType::Object), name, ty)
    }
}

#[test]
fn test_chained_operators_resolve_to_builtins() {
    use crate::builtin::BuiltinOp;
    use crate::expr::ElementType;
    use crate::sql_type::SqlType;
    use test_support::*;

    let sales = table("sales").query();
    let regions = table("region").query();
    let id = || lambda(&["r"], field("r", "id", SqlType::Int64));
    let cases: Vec<(Query, BuiltinOp)> = vec![
        (sales.filter(lambda(&["r"], field("r", "region", SqlType::Text))), BuiltinOp::Where),
        (
            sales.filter(lambda(&["r", "i"], field("r", "region", SqlType::Text))),
            BuiltinOp::Where2,
        ),
        (sales.select(id()), BuiltinOp::Select),
        (sales.select(lambda(&["r", "i"], field("i", "n", SqlType::Int64))), BuiltinOp::Select2),
        (
            sales.join(&regions, id(), id(), lambda(&["a", "b"], field("a", "id", SqlType::Int64))),
            BuiltinOp::Join,
        ),
        (sales.group_by(id()), BuiltinOp::GroupBy),
        (
            sales.group_by_with(
                id(),
                lambda(&[], Expr::constant(crate::sql_value::SqlValue::Int(0), SqlType::Int64)),
                lambda(&["acc", "r"], field("acc", "n", SqlType::Int64)),
                lambda(&["k", "acc"], field("acc", "n", SqlType::Int64)),
            ),
            BuiltinOp::GroupBy2,
        ),
        (
            sales.aggregate(
                Expr::constant(crate::sql_value::SqlValue::Int(0), SqlType::Int64),
                lambda(&["acc", "r"], field("acc", "n", SqlType::Int64)),
                lambda(&["acc"], field("acc", "n", SqlType::Int64)),
            ),
            BuiltinOp::Aggregate,
        ),
        (
            sales.order_by(id(), Expr::invoke(BuiltinOp::ReverseOrder, vec![])),
            BuiltinOp::OrderBy,
        ),
        (sales.union(&regions), BuiltinOp::Union),
        (sales.concat(&regions), BuiltinOp::Concat),
        (sales.intersect(&regions), BuiltinOp::Intersect),
        (sales.except(&regions), BuiltinOp::Except),
    ];
    for (q, expected) in cases {
        assert_eq!(q.expression().builtin(), Some(expected), "query {q}");
    }
    // The source subtree is shared by every query chained on it.
    let filtered = sales.filter(id());
    assert!(std::sync::Arc::ptr_eq(
        &filtered.expression().as_call().unwrap().operands[0],
        sales.expression()
    ));
    assert_eq!(
        sales.expression().as_call().unwrap().operands[2].to_string(),
        ElementType::ObjectArray.to_string()
    );
}

#[test]
fn test_unknown_shape_is_opaque() {
    use crate::sql_type::SqlType;
    use test_support::*;
    let q = table("sales")
        .query()
        .filter(lambda(&["a", "b", "c"], field("a", "region", SqlType::Text)));
    assert_eq!(q.expression().builtin(), None);
    assert_eq!(q.expression().ty(), ExprType::Object);
}

#[test]
fn test_plan() {
    use crate::sql_type::SqlType;
    use test_support::*;
    let t = table("sales");
    let lowerer = Lowerer::default();
    match t.query().plan(&lowerer, &t).unwrap() {
        Plan::Pushdown(l) => assert_eq!(l.query.as_str(), "select * from foodmart.sales"),
        other => panic!("expected pushdown, got {other:?}"),
    }
    let filtered = t
        .query()
        .filter(lambda(&["r"], field("r", "region", SqlType::Text)));
    assert!(matches!(
        filtered.plan(&lowerer, &t).unwrap(),
        Plan::Local { .. }
    ));
    let other = table("other");
    assert!(matches!(
        other.query().plan(&lowerer, &t),
        Err(lower::Error::UnknownTable(_))
    ));
}
