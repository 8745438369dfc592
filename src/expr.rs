//! `expr` defines the expression tree that chained query operators build.
//!
//! Nodes are immutable and shared through `Arc`, so a rewrite makes a new node and reuses every
//! subtree it did not touch. A tree for a scan of `foodmart.sales`, filtered by a lambda, renders as:
//!
//! ```text
//! root.get_sub_schema("foodmart").get_table("sales", object[]).where((r) -> r.region)
//! ```
//!
//! Calls whose shape is a builtin carry the resolved `BuiltinOp`. Any other call is kept as an opaque
//! call: the tree still records it, but nothing downstream will try to translate it.

use std::sync::Arc;

use enum_as_inner::EnumAsInner;

use crate::builtin::{self, BuiltinOp, CallSite, ParamKind};
use crate::sql_type::SqlType;
use crate::sql_value::SqlValue;

pub type ExprRef = Arc<Expr>;

/// The declared type of the value an expression produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprType {
    Queryable,
    Enumerable,
    Enumerator,
    DataContext,
    Comparator,
    /// a function of the given arity.
    Function(u8),
    List,
    ElementType,
    Scalar(SqlType),
    Object,
    Unit,
}

/// The type of the elements a sequence yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// a positional array of column values, one per column of the row type.
    ObjectArray,
    Scalar(SqlType),
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementType::ObjectArray => "object[]".fmt(f),
            ElementType::Scalar(t) => t.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Value(SqlValue),
    ElementType(ElementType),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Value(SqlValue::Text(s)) => write!(f, "{s:?}"),
            Literal::Value(v) => v.fmt(f),
            Literal::ElementType(t) => t.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Builtin(BuiltinOp),
    Opaque(CallSite),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: Callee,
    /// the receiver first (for instance calls), then the arguments in declared order.
    pub operands: Vec<ExprRef>,
    pub ty: ExprType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub value: Literal,
    pub ty: ExprType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub ty: ExprType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// None when the field is projected from the current row.
    pub target: Option<ExprRef>,
    pub name: String,
    pub ty: ExprType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<Parameter>,
    pub body: ExprRef,
}

#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum Expr {
    Call(Call),
    Constant(Constant),
    Parameter(Parameter),
    Field(Field),
    Lambda(Lambda),
}

impl Expr {
    /// invokes a builtin. The caller is responsible for passing well-typed operands.
    pub fn invoke(op: BuiltinOp, operands: Vec<ExprRef>) -> ExprRef {
        debug_assert_eq!(
            operands.len(),
            op.operand_count(),
            "wrong number of operands for {op}"
        );
        Arc::new(Expr::Call(Call {
            callee: Callee::Builtin(op),
            operands,
            ty: op.result_type(),
        }))
    }

    /// makes a call for an arbitrary call site, resolving it to a builtin when the shape is known.
    pub fn call(call_site: CallSite, operands: Vec<ExprRef>) -> ExprRef {
        match builtin::resolve(&call_site) {
            Some(op) => Expr::invoke(op, operands),
            None => Arc::new(Expr::Call(Call {
                callee: Callee::Opaque(call_site),
                operands,
                ty: ExprType::Object,
            })),
        }
    }

    pub fn constant(value: SqlValue, ty: SqlType) -> ExprRef {
        Arc::new(Expr::Constant(Constant {
            value: Literal::Value(value),
            ty: ExprType::Scalar(ty),
        }))
    }

    pub fn text(s: &str) -> ExprRef {
        Expr::constant(SqlValue::Text(s.to_string()), SqlType::Text)
    }

    pub fn element_type(t: ElementType) -> ExprRef {
        Arc::new(Expr::Constant(Constant {
            value: Literal::ElementType(t),
            ty: ExprType::ElementType,
        }))
    }

    pub fn parameter(name: &str, ty: ExprType) -> ExprRef {
        Arc::new(Expr::Parameter(Parameter {
            name: name.to_string(),
            ty,
        }))
    }

    pub fn field(target: ExprRef, name: &str, ty: SqlType) -> ExprRef {
        Arc::new(Expr::Field(Field {
            target: Some(target),
            name: name.to_string(),
            ty: ExprType::Scalar(ty),
        }))
    }

    /// a field of the current row, as used in a result projection.
    pub fn project_field(name: &str, ty: SqlType) -> ExprRef {
        Arc::new(Expr::Field(Field {
            target: None,
            name: name.to_string(),
            ty: ExprType::Scalar(ty),
        }))
    }

    pub fn lambda(params: Vec<Parameter>, body: ExprRef) -> ExprRef {
        Arc::new(Expr::Lambda(Lambda { params, body }))
    }

    pub fn ty(&self) -> ExprType {
        match self {
            Expr::Call(c) => c.ty,
            Expr::Constant(c) => c.ty,
            Expr::Parameter(p) => p.ty,
            Expr::Field(f) => f.ty,
            Expr::Lambda(l) => ExprType::Function(l.params.len() as u8),
        }
    }

    /// the builtin this node invokes, if it is a call to one.
    pub fn builtin(&self) -> Option<BuiltinOp> {
        match self {
            Expr::Call(Call {
                callee: Callee::Builtin(op),
                ..
            }) => Some(*op),
            _ => None,
        }
    }

    /// the parameter kind this node matches when passed as an argument.
    /// A lambda is passed as a function; callers that expect a predicate ask for one explicitly.
    pub fn param_kind(&self) -> ParamKind {
        match self.ty() {
            ExprType::Queryable | ExprType::Enumerable => ParamKind::Enumerable,
            ExprType::Comparator => ParamKind::Comparator,
            ExprType::Function(n) => ParamKind::Function(n),
            ExprType::ElementType => ParamKind::ElementType,
            ExprType::DataContext => ParamKind::DataContext,
            ExprType::Scalar(SqlType::Text) => ParamKind::Text,
            ExprType::Scalar(SqlType::Bool) => ParamKind::Bool,
            ExprType::Enumerator
            | ExprType::List
            | ExprType::Scalar(_)
            | ExprType::Object
            | ExprType::Unit => ParamKind::Object,
        }
    }

    fn children(&self) -> Vec<&ExprRef> {
        match self {
            Expr::Call(c) => c.operands.iter().collect(),
            Expr::Field(f) => f.target.iter().collect(),
            Expr::Lambda(l) => vec![&l.body],
            Expr::Constant(_) | Expr::Parameter(_) => vec![],
        }
    }

    /// walks the tree in pre-order.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// returns a new call with one operand replaced. The other operands are shared, not copied.
    /// Returns None if this node is not a call or the index is out of range.
    pub fn with_operand(&self, index: usize, operand: ExprRef) -> Option<ExprRef> {
        let call = self.as_call()?;
        if index >= call.operands.len() {
            return None;
        }
        let mut operands = call.operands.clone();
        operands[index] = operand;
        Some(Arc::new(Expr::Call(Call {
            callee: call.callee.clone(),
            operands,
            ty: call.ty,
        })))
    }
}

fn fmt_args(f: &mut std::fmt::Formatter<'_>, args: &[ExprRef]) -> std::fmt::Result {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{a}")?;
    }
    Ok(())
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Call(c) => {
                let (capability, name) = match &c.callee {
                    Callee::Builtin(op) => {
                        let sig = op.signature();
                        (sig.capability, sig.name.to_string())
                    }
                    Callee::Opaque(cs) => (cs.capability, cs.name.clone()),
                };
                let args = if capability.is_static() {
                    write!(f, "{capability}.{name}(")?;
                    &c.operands[..]
                } else {
                    match c.operands.split_first() {
                        Some((receiver, rest)) => {
                            write!(f, "{receiver}.{name}(")?;
                            rest
                        }
                        None => {
                            write!(f, "{name}(")?;
                            &c.operands[..]
                        }
                    }
                };
                fmt_args(f, args)?;
                ")".fmt(f)
            }
            Expr::Constant(c) => c.value.fmt(f),
            Expr::Parameter(p) => p.name.fmt(f),
            Expr::Field(fld) => match &fld.target {
                Some(t) => write!(f, "{t}.{}", fld.name),
                None => fld.name.fmt(f),
            },
            Expr::Lambda(l) => {
                use itertools::Itertools;
                write!(
                    f,
                    "({}) -> {}",
                    l.params.iter().map(|p| p.name.as_str()).join(", "),
                    l.body
                )
            }
        }
    }
}

#[cfg(test)]
fn make_scan(schema: &str, table: &str) -> ExprRef {
    let root = Expr::parameter("root", ExprType::DataContext);
    let sub = Expr::invoke(BuiltinOp::GetSubSchema, vec![root, Expr::text(schema)]);
    Expr::invoke(
        BuiltinOp::DataContextGetTable,
        vec![sub, Expr::text(table), Expr::element_type(ElementType::ObjectArray)],
    )
}

#[test]
fn test_declared_types() {
    let scan = make_scan("foodmart", "sales");
    assert_eq!(scan.ty(), ExprType::Queryable);
    assert_eq!(Expr::text("x").ty(), ExprType::Scalar(SqlType::Text));
    assert_eq!(
        Expr::project_field("units", SqlType::Int64).ty(),
        ExprType::Scalar(SqlType::Int64)
    );
    let r = Parameter {
        name: "r".to_string(),
        ty: ExprType::Object,
    };
    let lambda = Expr::lambda(vec![r], Expr::project_field("units", SqlType::Int64));
    assert_eq!(lambda.ty(), ExprType::Function(1));
    assert_eq!(lambda.param_kind(), ParamKind::Function(1));
}

#[test]
fn test_render() {
    let scan = make_scan("foodmart", "sales");
    assert_eq!(
        scan.to_string(),
        "root.get_sub_schema(\"foodmart\").get_table(\"sales\", object[])"
    );
    let r = Expr::parameter("r", ExprType::Object);
    let pred = Expr::lambda(
        vec![Parameter {
            name: "r".to_string(),
            ty: ExprType::Object,
        }],
        Expr::field(r, "region", SqlType::Text),
    );
    let call = Expr::call(
        CallSite::new(
            builtin::Capability::ExtendedEnumerable,
            "where",
            &[ParamKind::Predicate(1)],
        ),
        vec![scan, pred],
    );
    assert_eq!(call.builtin(), Some(BuiltinOp::Where));
    assert_eq!(
        call.to_string(),
        "root.get_sub_schema(\"foodmart\").get_table(\"sales\", object[]).where((r) -> r.region)"
    );
    let single = Expr::invoke(
        BuiltinOp::SingletonEnumerable,
        vec![Expr::constant(SqlValue::Int(1), SqlType::Int64)],
    );
    assert_eq!(single.to_string(), "Sequences.singleton(1)");
}

#[test]
fn test_opaque_call() {
    let scan = make_scan("foodmart", "sales");
    let cs = CallSite::new(
        builtin::Capability::ExtendedEnumerable,
        "shuffle",
        &[ParamKind::Object],
    );
    let call = Expr::call(cs.clone(), vec![scan, Expr::text("seed")]);
    assert_eq!(call.builtin(), None);
    assert_eq!(call.as_call().unwrap().callee, Callee::Opaque(cs));
    assert_eq!(call.ty(), ExprType::Object);
}

#[test]
fn test_visit_pre_order() {
    let scan = make_scan("s", "t");
    let mut seen = vec![];
    scan.visit(&mut |e| seen.push(e.to_string()));
    assert_eq!(
        seen,
        vec![
            "root.get_sub_schema(\"s\").get_table(\"t\", object[])",
            "root.get_sub_schema(\"s\")",
            "root",
            "\"s\"",
            "\"t\"",
            "object[]",
        ]
    );
}

#[test]
fn test_structural_equality_and_sharing() {
    assert_eq!(make_scan("s", "t"), make_scan("s", "t"));
    assert_ne!(make_scan("s", "t"), make_scan("s", "u"));

    let scan = make_scan("s", "t");
    let renamed = scan.with_operand(1, Expr::text("u")).unwrap();
    assert_eq!(renamed, make_scan("s", "u"));
    // The schema subtree is reused, not copied.
    assert!(Arc::ptr_eq(
        &scan.as_call().unwrap().operands[0],
        &renamed.as_call().unwrap().operands[0]
    ));
    assert_eq!(scan.with_operand(5, Expr::text("u")), None);
    assert_eq!(Expr::text("x").with_operand(0, Expr::text("u")), None);
}
