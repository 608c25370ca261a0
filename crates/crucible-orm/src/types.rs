//! Type, member and operator vocabulary shared by host and intermediate trees.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Member name of the left element of a join pair row
pub const PAIR_LEFT: &str = "Left";
/// Member name of the right element of a join pair row
pub const PAIR_RIGHT: &str = "Right";
/// Member name of the key of a grouping row
pub const GROUPING_KEY: &str = "Key";

/// Scalar value types a column or expression can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Bool,
    Int,
    Long,
    Double,
    Decimal,
    String,
    DateTime,
    Uuid,
    Bytes,
    Json,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Bool => "Bool",
            ScalarType::Int => "Int",
            ScalarType::Long => "Long",
            ScalarType::Double => "Double",
            ScalarType::Decimal => "Decimal",
            ScalarType::String => "String",
            ScalarType::DateTime => "DateTime",
            ScalarType::Uuid => "Uuid",
            ScalarType::Bytes => "Bytes",
            ScalarType::Json => "Json",
        }
    }
}

/// The result type of a host or intermediate expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    Scalar(ScalarType),
    Nullable(Box<TypeRef>),
    /// A mapped entity (table row)
    Entity(String),
    /// A projected row shape; anonymous shapes have compiler-generated names
    Shape { name: String, anonymous: bool },
    /// A queryable sequence of rows
    Sequence(Box<TypeRef>),
    Grouping {
        key: Box<TypeRef>,
        element: Box<TypeRef>,
    },
    /// Row type of a join: `Left` and `Right` members
    Pair {
        left: Box<TypeRef>,
        right: Box<TypeRef>,
    },
    /// A host collection, used as the right side of IN
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn bool() -> Self {
        TypeRef::Scalar(ScalarType::Bool)
    }

    pub fn int() -> Self {
        TypeRef::Scalar(ScalarType::Int)
    }

    pub fn long() -> Self {
        TypeRef::Scalar(ScalarType::Long)
    }

    pub fn double() -> Self {
        TypeRef::Scalar(ScalarType::Double)
    }

    pub fn string() -> Self {
        TypeRef::Scalar(ScalarType::String)
    }

    pub fn datetime() -> Self {
        TypeRef::Scalar(ScalarType::DateTime)
    }

    pub fn json() -> Self {
        TypeRef::Scalar(ScalarType::Json)
    }

    pub fn entity(name: impl Into<String>) -> Self {
        TypeRef::Entity(name.into())
    }

    pub fn anonymous(name: impl Into<String>) -> Self {
        TypeRef::Shape {
            name: name.into(),
            anonymous: true,
        }
    }

    pub fn class(name: impl Into<String>) -> Self {
        TypeRef::Shape {
            name: name.into(),
            anonymous: false,
        }
    }

    pub fn nullable(inner: TypeRef) -> Self {
        match inner {
            TypeRef::Nullable(_) => inner,
            other => TypeRef::Nullable(Box::new(other)),
        }
    }

    pub fn sequence(element: TypeRef) -> Self {
        TypeRef::Sequence(Box::new(element))
    }

    pub fn list(element: TypeRef) -> Self {
        TypeRef::List(Box::new(element))
    }

    pub fn grouping(key: TypeRef, element: TypeRef) -> Self {
        TypeRef::Grouping {
            key: Box::new(key),
            element: Box::new(element),
        }
    }

    pub fn pair(left: TypeRef, right: TypeRef) -> Self {
        TypeRef::Pair {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Element type of a sequence, or the type itself
    pub fn element(&self) -> &TypeRef {
        match self {
            TypeRef::Sequence(inner) => inner,
            other => other,
        }
    }

    /// The type with one level of nullability removed
    pub fn non_nullable(&self) -> &TypeRef {
        match self {
            TypeRef::Nullable(inner) => inner,
            other => other,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, TypeRef::Shape { anonymous: true, .. })
    }

    pub fn is_json(&self) -> bool {
        matches!(self.non_nullable(), TypeRef::Scalar(ScalarType::Json))
    }

    /// True for types that describe whole rows rather than column values
    pub fn is_row(&self) -> bool {
        matches!(
            self.non_nullable(),
            TypeRef::Entity(_)
                | TypeRef::Shape { .. }
                | TypeRef::Grouping { .. }
                | TypeRef::Pair { .. }
        )
    }

    /// True when `self` and `other` differ only by nullability
    pub fn is_lifting_of(&self, other: &TypeRef) -> bool {
        self != other && self.non_nullable() == other.non_nullable()
    }

    /// Name used for member owners and diagnostics
    pub fn name(&self) -> String {
        match self {
            TypeRef::Scalar(s) => s.as_str().to_string(),
            TypeRef::Nullable(inner) => format!("{}?", inner.name()),
            TypeRef::Entity(name) => name.clone(),
            TypeRef::Shape { name, .. } => name.clone(),
            TypeRef::Sequence(inner) => format!("Sequence<{}>", inner.name()),
            TypeRef::Grouping { key, element } => {
                format!("Grouping<{}, {}>", key.name(), element.name())
            }
            TypeRef::Pair { left, right } => format!("Pair<{}, {}>", left.name(), right.name()),
            TypeRef::List(inner) => format!("List<{}>", inner.name()),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A field or property of a host type.
///
/// Identity is the (owner, name) pair compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub ty: TypeRef,
}

impl MemberRef {
    pub fn new(owner: &TypeRef, name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            owner: owner.name(),
            name: name.into(),
            ty,
        }
    }

    /// Owner-qualified name, e.g. `String.Length`
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }

    pub fn key(&self) -> MemberKey {
        MemberKey::new(&self.owner, &self.name)
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl PartialEq for MemberRef {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key() && self.ty == other.ty
    }
}

impl Eq for MemberRef {}

/// Case-folded member identity used for recognizer lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberKey {
    pub owner: String,
    pub name: String,
}

impl MemberKey {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_ascii_lowercase(),
            name: name.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// A host method (query operator, aggregate or scalar function).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
}

impl MethodRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn is(&self, owner: &str, name: &str) -> bool {
        self.owner.eq_ignore_ascii_case(owner) && self.name.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    AndAlso,
    OrElse,
    Coalesce,
    /// Column assignment inside an update's Set
    Assign,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::AndAlso => "and",
            BinaryOp::OrElse => "or",
            BinaryOp::Coalesce => "??",
            BinaryOp::Assign => ":=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }
}

/// Unary operators. `Convert` takes its target from the node's result type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
    Convert,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Negate => "-",
            UnaryOp::Convert => "convert",
        }
    }
}
