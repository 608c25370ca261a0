//! Intermediate node payloads.
//!
//! Each struct is immutable once wrapped in an [`Expr`]; partially built
//! composites live in the builders of [`crate::ir::builder`].

use super::Expr;
use crate::types::{BinaryOp, MemberRef, TypeRef, UnaryOp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Leaves
// ============================================================================

/// A literal that is rendered inline (null, recognizer constants, folds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constant {
    pub value: Value,
    pub ty: TypeRef,
}

/// Placeholder for a literal bound at execution time.
///
/// Two placeholders are equal when name and type match; values never take
/// part in equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub ty: TypeRef,
}

/// A generated row symbol (`a`, `b`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeRef,
}

/// Root entity (table) reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySource {
    pub entity: TypeRef,
}

/// Opaque literal text, e.g. `CURRENT_TIMESTAMP`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Special {
    pub text: String,
    pub ty: TypeRef,
}

// ============================================================================
// Bindings
// ============================================================================

/// Member access on a source node, keyed by member identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleBinding {
    pub source: Box<Expr>,
    pub member: MemberRef,
}

/// A binding published under an output name other than its own
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedBinding {
    pub name: String,
    pub binding: Box<Expr>,
}

/// A navigation chain `source.m1.m2...`; its type is the last member's type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnChain {
    pub source: Box<Expr>,
    pub members: Vec<MemberRef>,
}

// ============================================================================
// Composites
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binary {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unary {
    pub op: UnaryOp,
    pub operand: Box<Expr>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conditional {
    pub test: Box<Expr>,
    pub if_true: Box<Expr>,
    pub if_false: Box<Expr>,
    pub ty: TypeRef,
}

/// A scalar function call; `name` is the backend-neutral function name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCall {
    pub name: String,
    pub receiver: Option<Box<Expr>>,
    pub args: Vec<Expr>,
    pub ty: TypeRef,
}

/// Construction of a shape instance outside a top-level projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct New {
    pub ty: TypeRef,
    pub members: Vec<Expr>,
}

/// `value IN list`, where `list` is normally a query parameter holding an array
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InList {
    pub value: Box<Expr>,
    pub list: Box<Expr>,
}

// ============================================================================
// Relations
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionFlags {
    pub to_class: bool,
    pub anonymous: bool,
    pub distinct: bool,
}

/// A reshaping of rows. No bindings means "select everything".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    pub source: Box<Expr>,
    pub bindings: Vec<Expr>,
    /// Output row type
    pub row: TypeRef,
    pub flags: ProjectionFlags,
}

impl Projection {
    pub fn is_select_all(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Output names of the bindings, in order; unnamed bindings yield `None`
    pub fn output_names(&self) -> Vec<Option<&str>> {
        self.bindings.iter().map(Expr::output_name).collect()
    }

    /// Binding published under `name` (case-insensitive)
    pub fn binding_named(&self, name: &str) -> Option<&Expr> {
        self.bindings.iter().find(|binding| {
            binding
                .output_name()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub source: Box<Expr>,
    pub predicate: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub on: Box<Expr>,
    /// Pair row type
    pub row: TypeRef,
}

/// A source together with the row symbol that references it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedSource {
    pub source: Box<Expr>,
    pub alias: Parameter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBy {
    pub source: Box<Expr>,
    pub keys: Box<Expr>,
    /// Element selector output, produced after the keys are known
    pub values: Option<Box<Expr>>,
    /// Row symbol of the grouped elements
    pub element_row: Option<Parameter>,
    /// Grouping row type
    pub row: TypeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderByBinding {
    pub expr: Box<Expr>,
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub source: Box<Expr>,
    pub bindings: Vec<OrderByBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowsFetchLimit {
    pub source: Box<Expr>,
    pub fetch: u64,
}

// ============================================================================
// Mutations
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictBehavior {
    #[default]
    Fail,
    Ignore,
    Replace,
}

impl ConflictBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictBehavior::Fail => "fail",
            ConflictBehavior::Ignore => "ignore",
            ConflictBehavior::Replace => "replace",
        }
    }
}

/// One inserted row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Values {
    pub placeholders: Vec<QueryParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insert {
    pub target: TypeRef,
    pub behavior: ConflictBehavior,
    pub columns: Vec<String>,
    pub rows: Vec<Values>,
}

/// Column assignments of an update; each assignment is a `:=` Binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Set {
    pub target: Box<Expr>,
    pub assignments: Vec<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delete {
    pub target: TypeRef,
}

// ============================================================================
// Structural wrappers
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub inserts: Vec<Insert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parentheses {
    pub child: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rename {
    pub child: Box<Expr>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonAttribute {
    pub child: Box<Expr>,
    pub attribute: String,
    pub ty: TypeRef,
}
