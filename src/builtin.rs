//! `builtin` defines the closed vocabulary of builtin operators and the registry that recognizes them.
//!
//! A call site is described by its shape: the capability of the receiver (or the static helper it
//! is called on), the operator name, and the kinds of its parameters. The registry maps each known
//! shape to exactly one `BuiltinOp`. Shapes that are not in the vocabulary are user code: they are
//! kept in the expression tree as opaque calls and evaluated in-process.
//!
//! ```text
//! (ExtendedEnumerable, "where", [Predicate(1)])  ->  Some(BuiltinOp::Where)
//! (ExtendedEnumerable, "where", [Predicate(3)])  ->  None
//! ```
//!
//! The process-wide registry is built once, on first use, from `BuiltinOp::ALL`. Two builtins that
//! declare the same shape are a programming error; building the registry panics rather than letting
//! one entry shadow the other.

use std::collections::HashMap;

use crate::expr::ExprType;
use crate::sql_type::SqlType;

/// The abstract role of the receiver of a call (or the helper a static call is made on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// a deferred query that can be translated.
    Queryable,
    /// a sequence that can be iterated.
    Enumerable,
    /// a sequence with the relational operators.
    ExtendedEnumerable,
    /// the root of the schema tree, from which sub-schemas and tables are looked up.
    DataContext,
    ReflectiveSchema,
    // Static helpers.
    Sequences,
    Functions,
    Primitives,
    Ordering,
    // Iteration and execution.
    Enumerator,
    Typed,
    Executable,
    Comparator,
    ModifiableTable,
}

impl Capability {
    /// whether calls on this capability have no receiver operand.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            Capability::Sequences | Capability::Functions | Capability::Primitives | Capability::Ordering
        )
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// The kind of one declared parameter of an operator. Function-like kinds carry their arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// an unevaluated expression (a lambda kept as a tree).
    Expression,
    Enumerable,
    Function(u8),
    Predicate(u8),
    Comparator,
    Object,
    Text,
    ElementType,
    Bool,
    ObjectArray,
    DataContext,
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Function(n) => write!(f, "Function{n}"),
            ParamKind::Predicate(n) => write!(f, "Predicate{n}"),
            x => std::fmt::Debug::fmt(x, f),
        }
    }
}

/// The static shape of a builtin operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub capability: Capability,
    pub name: &'static str,
    pub params: &'static [ParamKind],
}

/// The shape of a call as seen by the query-building layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub capability: Capability,
    pub name: String,
    pub params: Vec<ParamKind>,
}

impl CallSite {
    pub fn new(capability: Capability, name: &str, params: &[ParamKind]) -> CallSite {
        CallSite {
            capability,
            name: name.to_string(),
            params: params.to_vec(),
        }
    }
}

impl From<&Signature> for CallSite {
    fn from(s: &Signature) -> Self {
        CallSite::new(s.capability, s.name, s.params)
    }
}

impl std::fmt::Display for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use itertools::Itertools;
        write!(
            f,
            "{}.{}({})",
            self.capability,
            self.name,
            self.params.iter().join(", ")
        )
    }
}

fn sig(capability: Capability, name: &'static str, params: &'static [ParamKind]) -> Signature {
    Signature {
        capability,
        name,
        params,
    }
}

/// identifies one builtin operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinOp {
    QueryableSelect,
    AsQueryable,
    GetSubSchema,
    GetTarget,
    /// looks a table up in a data context. This is the table scan.
    DataContextGetTable,
    Join,
    Select,
    Select2,
    Where,
    Where2,
    GroupBy,
    GroupBy2,
    Aggregate,
    OrderBy,
    Union,
    Concat,
    Intersect,
    Except,
    SingletonEnumerable,
    NullsComparator,
    ArrayComparer,
    IdentitySelector,
    AsEnumerable,
    AsList,
    EnumeratorCurrent,
    EnumeratorMoveNext,
    EnumeratorReset,
    EnumerableEnumerator,
    TypedGetElementType,
    ExecutableExecute,
    ComparatorCompare,
    ReverseOrder,
    ModifiableTableGetModifiableCollection,
}

impl BuiltinOp {
    pub const ALL: [BuiltinOp; 33] = [
        BuiltinOp::QueryableSelect,
        BuiltinOp::AsQueryable,
        BuiltinOp::GetSubSchema,
        BuiltinOp::GetTarget,
        BuiltinOp::DataContextGetTable,
        BuiltinOp::Join,
        BuiltinOp::Select,
        BuiltinOp::Select2,
        BuiltinOp::Where,
        BuiltinOp::Where2,
        BuiltinOp::GroupBy,
        BuiltinOp::GroupBy2,
        BuiltinOp::Aggregate,
        BuiltinOp::OrderBy,
        BuiltinOp::Union,
        BuiltinOp::Concat,
        BuiltinOp::Intersect,
        BuiltinOp::Except,
        BuiltinOp::SingletonEnumerable,
        BuiltinOp::NullsComparator,
        BuiltinOp::ArrayComparer,
        BuiltinOp::IdentitySelector,
        BuiltinOp::AsEnumerable,
        BuiltinOp::AsList,
        BuiltinOp::EnumeratorCurrent,
        BuiltinOp::EnumeratorMoveNext,
        BuiltinOp::EnumeratorReset,
        BuiltinOp::EnumerableEnumerator,
        BuiltinOp::TypedGetElementType,
        BuiltinOp::ExecutableExecute,
        BuiltinOp::ComparatorCompare,
        BuiltinOp::ReverseOrder,
        BuiltinOp::ModifiableTableGetModifiableCollection,
    ];

    pub fn signature(&self) -> Signature {
        use BuiltinOp::*;
        use Capability as C;
        use ParamKind as P;
        match self {
            QueryableSelect => sig(C::Queryable, "select", &[P::Expression]),
            AsQueryable => sig(C::Enumerable, "as_queryable", &[]),
            GetSubSchema => sig(C::DataContext, "get_sub_schema", &[P::Text]),
            GetTarget => sig(C::ReflectiveSchema, "get_target", &[]),
            DataContextGetTable => sig(C::DataContext, "get_table", &[P::Text, P::ElementType]),
            Join => sig(
                C::ExtendedEnumerable,
                "join",
                &[P::Enumerable, P::Function(1), P::Function(1), P::Function(2)],
            ),
            Select => sig(C::ExtendedEnumerable, "select", &[P::Function(1)]),
            Select2 => sig(C::ExtendedEnumerable, "select", &[P::Function(2)]),
            Where => sig(C::ExtendedEnumerable, "where", &[P::Predicate(1)]),
            Where2 => sig(C::ExtendedEnumerable, "where", &[P::Predicate(2)]),
            GroupBy => sig(C::ExtendedEnumerable, "group_by", &[P::Function(1)]),
            GroupBy2 => sig(
                C::ExtendedEnumerable,
                "group_by",
                &[P::Function(1), P::Function(0), P::Function(2), P::Function(2)],
            ),
            Aggregate => sig(
                C::ExtendedEnumerable,
                "aggregate",
                &[P::Object, P::Function(2), P::Function(1)],
            ),
            OrderBy => sig(C::ExtendedEnumerable, "order_by", &[P::Function(1), P::Comparator]),
            Union => sig(C::ExtendedEnumerable, "union", &[P::Enumerable]),
            Concat => sig(C::ExtendedEnumerable, "concat", &[P::Enumerable]),
            Intersect => sig(C::ExtendedEnumerable, "intersect", &[P::Enumerable]),
            Except => sig(C::ExtendedEnumerable, "except", &[P::Enumerable]),
            SingletonEnumerable => sig(C::Sequences, "singleton", &[P::Object]),
            NullsComparator => sig(C::Functions, "nulls_comparator", &[P::Bool, P::Bool]),
            ArrayComparer => sig(C::Functions, "array_comparer", &[]),
            IdentitySelector => sig(C::Functions, "identity_selector", &[]),
            AsEnumerable => sig(C::Sequences, "as_enumerable", &[P::ObjectArray]),
            AsList => sig(C::Primitives, "as_list", &[P::Object]),
            EnumeratorCurrent => sig(C::Enumerator, "current", &[]),
            EnumeratorMoveNext => sig(C::Enumerator, "move_next", &[]),
            EnumeratorReset => sig(C::Enumerator, "reset", &[]),
            EnumerableEnumerator => sig(C::Enumerable, "enumerator", &[]),
            TypedGetElementType => sig(C::Typed, "element_type", &[]),
            ExecutableExecute => sig(C::Executable, "execute", &[P::DataContext]),
            ComparatorCompare => sig(C::Comparator, "compare", &[P::Object, P::Object]),
            ReverseOrder => sig(C::Ordering, "reverse_order", &[]),
            ModifiableTableGetModifiableCollection => {
                sig(C::ModifiableTable, "modifiable_collection", &[])
            }
        }
    }

    /// the declared type of the value an invocation of this operator produces.
    pub fn result_type(&self) -> ExprType {
        use BuiltinOp::*;
        match self {
            QueryableSelect | AsQueryable | DataContextGetTable => ExprType::Queryable,
            GetSubSchema => ExprType::DataContext,
            Join | Select | Select2 | Where | Where2 | GroupBy | GroupBy2 | OrderBy | Union
            | Concat | Intersect | Except | SingletonEnumerable | AsEnumerable => {
                ExprType::Enumerable
            }
            NullsComparator | ArrayComparer | ReverseOrder => ExprType::Comparator,
            IdentitySelector => ExprType::Function(1),
            AsList | ModifiableTableGetModifiableCollection => ExprType::List,
            EnumerableEnumerator => ExprType::Enumerator,
            EnumeratorMoveNext => ExprType::Scalar(SqlType::Bool),
            EnumeratorReset => ExprType::Unit,
            TypedGetElementType => ExprType::ElementType,
            ComparatorCompare => ExprType::Scalar(SqlType::Int32),
            GetTarget | Aggregate | EnumeratorCurrent | ExecutableExecute => ExprType::Object,
        }
    }

    /// the number of operands an invocation carries, counting the receiver of an instance call.
    pub fn operand_count(&self) -> usize {
        let sig = self.signature();
        sig.params.len() + if sig.capability.is_static() { 0 } else { 1 }
    }
}

impl std::fmt::Display for BuiltinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.signature().name.fmt(f)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Builtins {first:?} and {second:?} both declare the call site {call_site}.")]
pub struct RegistryCollision {
    pub call_site: String,
    pub first: BuiltinOp,
    pub second: BuiltinOp,
}

/// maps call-site shapes to builtin operators. Immutable once built.
#[derive(Debug)]
pub struct Registry {
    by_call_site: HashMap<CallSite, BuiltinOp>,
}

impl Registry {
    /// builds a registry from a declarative list, failing if two entries share a call-site shape.
    pub fn new<I>(entries: I) -> Result<Registry, RegistryCollision>
    where
        I: IntoIterator<Item = (BuiltinOp, Signature)>,
    {
        let mut by_call_site = HashMap::new();
        for (op, sig) in entries {
            let key = CallSite::from(&sig);
            if let Some(first) = by_call_site.get(&key) {
                return Err(RegistryCollision {
                    call_site: key.to_string(),
                    first: *first,
                    second: op,
                });
            }
            by_call_site.insert(key, op);
        }
        Ok(Registry { by_call_site })
    }

    pub fn resolve(&self, call_site: &CallSite) -> Option<BuiltinOp> {
        self.by_call_site.get(call_site).copied()
    }

    pub fn len(&self) -> usize {
        self.by_call_site.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_call_site.is_empty()
    }
}

lazy_static::lazy_static! {
    static ref REGISTRY: Registry = {
        match Registry::new(BuiltinOp::ALL.iter().map(|op| (*op, op.signature()))) {
            Ok(r) => r,
            Err(e) => panic!("Builtin operator registry is inconsistent: {e}"),
        }
    };
}

/// builds the process-wide registry now, so an inconsistent builtin table aborts startup
/// instead of the first lookup.
pub fn init() {
    lazy_static::initialize(&REGISTRY);
}

/// the process-wide registry of builtin operators.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// resolves a call site against the process-wide registry.
pub fn resolve(call_site: &CallSite) -> Option<BuiltinOp> {
    REGISTRY.resolve(call_site)
}

#[test]
fn test_init_builds_the_registry() {
    init();
    init();
    assert_eq!(registry().len(), BuiltinOp::ALL.len());
}

#[test]
fn test_resolve_every_builtin() {
    assert_eq!(registry().len(), BuiltinOp::ALL.len());
    for op in BuiltinOp::ALL {
        let cs = CallSite::from(&op.signature());
        assert_eq!(resolve(&cs), Some(op), "call site {cs}");
    }
}

#[test]
fn test_resolve_unknown_call_sites() {
    use Capability as C;
    use ParamKind as P;
    let cases = vec![
        CallSite::new(C::ExtendedEnumerable, "where", &[P::Predicate(3)]),
        CallSite::new(C::ExtendedEnumerable, "wherever", &[P::Predicate(1)]),
        CallSite::new(C::Queryable, "where", &[P::Predicate(1)]),
        CallSite::new(C::ExtendedEnumerable, "union", &[]),
        CallSite::new(C::DataContext, "get_table", &[P::Text]),
    ];
    for cs in cases {
        assert_eq!(resolve(&cs), None, "call site {cs}");
    }
}

#[test]
fn test_overloads_resolve_by_parameter_shape() {
    use Capability as C;
    use ParamKind as P;
    assert_eq!(
        resolve(&CallSite::new(C::ExtendedEnumerable, "select", &[P::Function(1)])),
        Some(BuiltinOp::Select)
    );
    assert_eq!(
        resolve(&CallSite::new(C::ExtendedEnumerable, "select", &[P::Function(2)])),
        Some(BuiltinOp::Select2)
    );
    assert_eq!(
        resolve(&CallSite::new(C::Queryable, "select", &[P::Expression])),
        Some(BuiltinOp::QueryableSelect)
    );
}

#[test]
fn test_registry_collision() {
    let sig = BuiltinOp::Union.signature();
    let res = Registry::new(vec![
        (BuiltinOp::Union, sig),
        (BuiltinOp::Concat, BuiltinOp::Concat.signature()),
        (BuiltinOp::Intersect, sig),
    ]);
    assert_eq!(
        res.unwrap_err(),
        RegistryCollision {
            call_site: "ExtendedEnumerable.union(Enumerable)".to_string(),
            first: BuiltinOp::Union,
            second: BuiltinOp::Intersect,
        }
    );
}

#[test]
fn test_registry_is_shared_across_threads() {
    let handles: Vec<_> = (0..4)
        .map(|_| {
            std::thread::spawn(|| {
                resolve(&CallSite::from(&BuiltinOp::OrderBy.signature()))
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), Some(BuiltinOp::OrderBy));
    }
}
