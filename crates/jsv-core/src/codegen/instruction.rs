//! Instruction types and storage for emitted validation procedures.
//!
//! A procedure is a flat pool of [`Op`]s. Structured instructions (`If`, `Block`) refer to
//! their children by [`OpRef`], so the whole procedure lives in one contiguous vector.

use super::names::Name;
use crate::compile::registry::RuleRef;
use crate::definition::JsonType;
use serde_json::Value;
use smol_str::SmolStr;
use std::fmt;

/// Reference to an instruction in the [`OpPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpRef(u32);

impl OpRef {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for OpRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpRef({})", self.0)
    }
}

/// A contiguous pool storing all instructions of a procedure.
#[derive(Debug, Clone, Default)]
pub struct OpPool {
    instructions: Vec<Op>,
}

impl OpPool {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            instructions: Vec::with_capacity(capacity),
        }
    }

    /// Allocates an instruction in the pool and returns its reference.
    pub fn alloc(&mut self, op: Op) -> OpRef {
        let id = self.instructions.len() as u32;
        self.instructions.push(op);
        OpRef::new(id)
    }

    /// Retrieves an instruction by its reference.
    ///
    /// # Panics
    ///
    /// Panics if the OpRef does not belong to this pool.
    #[inline(always)]
    pub fn get(&self, op_ref: OpRef) -> &Op {
        &self.instructions[op_ref.id() as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OpRef, &Op)> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(i, op)| (OpRef::new(i as u32), op))
    }
}

/// The schema document a schema reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopSchemaRef {
    /// The schema passed to `Validator::compile`.
    Root,
    /// A schema registered as a custom rule, e.g. a macro expansion.
    Rule(RuleRef),
}

impl fmt::Display for TopSchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopSchemaRef::Root => f.write_str("self.schema"),
            TopSchemaRef::Rule(rule) => write!(f, "{rule}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        })
    }
}

/// Side-effect free expressions evaluated against the bindings of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Undefined,
    Lit(Value),
    Var(Name),
    /// A value inside a schema document, addressed by JSON pointer.
    Schema { top: TopSchemaRef, pointer: String },
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    IsUndefined(Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    /// Property or index access; on data locations this yields the child location.
    Member(Box<Expr>, Box<Expr>),
    /// Reads the JSON value behind a data location.
    Deref(Box<Expr>),
    /// Length of a string in unicode scalar values.
    Length(Box<Expr>),
    HasType(Box<Expr>, Vec<JsonType>),
    IsErrorList(Box<Expr>),
}

impl Expr {
    pub fn var(name: &Name) -> Self {
        Expr::Var(name.clone())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Lit(value.into())
    }

    pub fn not(self) -> Self {
        match self {
            Expr::Not(inner) => *inner,
            Expr::Lit(Value::Bool(b)) => Expr::Lit(Value::Bool(!b)),
            other => Expr::Not(Box::new(other)),
        }
    }

    pub fn is_undefined(self) -> Self {
        Expr::IsUndefined(Box::new(self))
    }

    pub fn member(self, key: Expr) -> Self {
        Expr::Member(Box::new(self), Box::new(key))
    }

    pub fn deref(self) -> Self {
        Expr::Deref(Box::new(self))
    }

    pub fn equals(self, other: Expr) -> Self {
        Expr::Eq(Box::new(self), Box::new(other))
    }

    pub fn compare(self, op: CmpOp, other: Expr) -> Self {
        Expr::Compare(op, Box::new(self), Box::new(other))
    }

    pub fn length(self) -> Self {
        Expr::Length(Box::new(self))
    }

    pub fn has_type(self, types: Vec<JsonType>) -> Self {
        Expr::HasType(Box::new(self), types)
    }

    /// Returns `true` for the literal `false`, the condition of an always-skipped branch.
    pub fn is_false(&self) -> bool {
        matches!(self, Expr::Lit(Value::Bool(false)))
    }
}

impl From<&Name> for Expr {
    fn from(name: &Name) -> Self {
        Expr::var(name)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Undefined => f.write_str("undefined"),
            Expr::Lit(value) => write!(f, "{value}"),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::Schema { top, pointer } => write!(f, "{top}#{pointer}"),
            Expr::Not(inner) => write!(f, "!({inner})"),
            Expr::And(items) => write_joined(f, items, " && "),
            Expr::Or(items) => write_joined(f, items, " || "),
            Expr::IsUndefined(inner) => write!(f, "{inner} === undefined"),
            Expr::Eq(lhs, rhs) => write!(f, "{lhs} === {rhs}"),
            Expr::Compare(op, lhs, rhs) => write!(f, "{lhs} {op} {rhs}"),
            Expr::Member(base, key) => write!(f, "{base}[{key}]"),
            Expr::Deref(inner) => write!(f, "*{inner}"),
            Expr::Length(inner) => write!(f, "len({inner})"),
            Expr::HasType(inner, types) => {
                let types = types.iter().map(JsonType::as_str).collect::<Vec<_>>();
                write!(f, "typeof {inner} in [{}]", types.join(", "))
            }
            Expr::IsErrorList(inner) => write!(f, "Array.isArray({inner})"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

/// Invocation of an external rule registered in the custom rule registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCall {
    pub keyword: SmolStr,
    pub rule: RuleRef,
    /// Binding receiving the boolean outcome.
    pub valid: Name,
    /// Binding receiving the rule's own error list, if the keyword reports detailed errors.
    pub errors: Option<Name>,
    /// Awaited calls settle to a structured outcome instead of returning synchronously.
    pub awaited: bool,
    pub data: Name,
    pub parent_data: Name,
    pub parent_data_property: Expr,
    pub schema: Option<Expr>,
    pub parent_schema: Expr,
    pub pass_context: bool,
}

/// Parts of an error record only filled in verbose mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Verbose {
    pub schema: Expr,
    pub parent_schema: Expr,
}

/// Compile-time description of one error record.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorTemplate {
    pub keyword: SmolStr,
    pub schema_path: String,
    /// Data binding whose location becomes the record's instance path.
    pub data: Name,
    pub params: Vec<(SmolStr, Expr)>,
    pub message: Option<String>,
    pub verbose: Option<Verbose>,
}

/// Back-fills context onto records appended since `since`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorExtension {
    pub since: Name,
    pub keyword: SmolStr,
    pub schema_path: String,
    pub data: Name,
    pub verbose: Option<Verbose>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Declare {
        name: Name,
        init: Expr,
        mutable: bool,
    },
    Assign {
        name: Name,
        value: Expr,
    },
    If {
        cond: Expr,
        then_branch: Vec<OpRef>,
        else_branch: Vec<OpRef>,
    },
    Block(Vec<OpRef>),
    CallRule(RuleCall),
    /// Runs a keyword's own schema validator against a dynamic schema value.
    CheckSchema {
        keyword: SmolStr,
        rule: RuleRef,
        schema: Expr,
        valid: Name,
    },
    PushError(ErrorTemplate),
    /// Appends a rule's error list to `vErrors` and resyncs `errors`.
    ConcatErrors(Name),
    ExtendErrors(ErrorExtension),
    /// Truncates `vErrors` to the count held by the binding.
    ResetErrors(Name),
    Return(bool),
}

/// A finished, immutable validation procedure.
#[derive(Debug, Clone, Default)]
pub struct Procedure {
    pub(crate) pool: OpPool,
    pub(crate) body: Vec<OpRef>,
}

impl Procedure {
    pub fn pool(&self) -> &OpPool {
        &self.pool
    }

    pub fn body(&self) -> &[OpRef] {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(Expr::var(&Name::new("valid0")).not(), "!(valid0)")]
    #[case(Expr::var(&Name::new("valid0")).not().not(), "valid0")]
    #[case(Expr::lit(false).not(), "true")]
    #[case(Expr::var(&Name::new("schema0")).is_undefined(), "schema0 === undefined")]
    #[case(Expr::var(&Name::new("data")).member(Expr::lit("a")), "data[\"a\"]")]
    #[case(
        Expr::var(&Name::new("data")).deref().length().compare(CmpOp::Lt, Expr::lit(2)),
        "len(*data) < 2"
    )]
    fn test_expr_display(#[case] expr: Expr, #[case] expected: &str) {
        assert_eq!(expr.to_string(), expected);
    }

    #[test]
    fn test_pool_alloc() {
        let mut pool = OpPool::new();
        let first = pool.alloc(Op::Return(true));
        let second = pool.alloc(Op::Assign {
            name: Name::new("valid0"),
            value: Expr::lit(json!(true)),
        });

        assert_eq!(first.id(), 0);
        assert_eq!(second.id(), 1);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(first), &Op::Return(true));
    }

    #[test]
    fn test_is_false() {
        assert!(Expr::lit(false).is_false());
        assert!(!Expr::lit(true).is_false());
        assert!(!Expr::Undefined.is_false());
    }
}
