//! Host query expression trees.
//!
//! A host tree is what application code builds when it chains query
//! operators over a queryable source. It is the input of the translator.
//!
//! ```rust
//! use crucible_orm::host::{HostExpr, HostParam, Query};
//! use crucible_orm::types::TypeRef;
//! use serde_json::json;
//!
//! let user = TypeRef::entity("User");
//! let u = HostParam::new("u", user.clone());
//! let adults = Query::all(user).filter(u.lambda(
//!     u.expr().field("Age", TypeRef::int()).greater_than(HostExpr::constant(json!(18), TypeRef::int())),
//! ));
//! assert_eq!(adults.expr().children().len(), 2);
//! ```

use crate::types::{BinaryOp, MemberRef, MethodRef, TypeRef, UnaryOp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Owner name of the query operators
pub const QUERYABLE: &str = "Queryable";
/// Owner name of in-memory sequence methods (aggregates, Contains)
pub const ENUMERABLE: &str = "Enumerable";

/// A lambda-bound host variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostParam {
    pub name: String,
    pub ty: TypeRef,
}

impl HostParam {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Reference to this parameter inside a lambda body
    pub fn expr(&self) -> HostExpr {
        HostExpr::Parameter(self.clone())
    }

    /// Single-parameter lambda over this parameter
    pub fn lambda(&self, body: HostExpr) -> Lambda {
        Lambda::new(vec![self.clone()], body)
    }
}

/// A host lambda expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub params: Vec<HostParam>,
    pub body: Box<HostExpr>,
}

impl Lambda {
    pub fn new(params: Vec<HostParam>, body: HostExpr) -> Self {
        Self {
            params,
            body: Box::new(body),
        }
    }
}

/// A node of a host query expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostExpr {
    /// "All entities of type T"
    Source(TypeRef),
    Constant {
        value: Value,
        ty: TypeRef,
    },
    Parameter(HostParam),
    Lambda(Lambda),
    /// Member access; a missing receiver marks a static member
    Member {
        receiver: Option<Box<HostExpr>>,
        member: MemberRef,
    },
    Call {
        method: MethodRef,
        receiver: Option<Box<HostExpr>>,
        args: Vec<HostExpr>,
        ty: TypeRef,
    },
    Binary {
        op: BinaryOp,
        left: Box<HostExpr>,
        right: Box<HostExpr>,
        ty: TypeRef,
    },
    Unary {
        op: UnaryOp,
        operand: Box<HostExpr>,
        ty: TypeRef,
    },
    Conditional {
        test: Box<HostExpr>,
        if_true: Box<HostExpr>,
        if_false: Box<HostExpr>,
        ty: TypeRef,
    },
    /// Object construction; `members[i]` names `args[i]`
    New {
        ty: TypeRef,
        args: Vec<HostExpr>,
        members: Vec<String>,
    },
}

impl HostExpr {
    pub fn source(entity: TypeRef) -> Self {
        HostExpr::Source(entity)
    }

    pub fn constant(value: Value, ty: TypeRef) -> Self {
        HostExpr::Constant { value, ty }
    }

    pub fn null(ty: TypeRef) -> Self {
        HostExpr::Constant {
            value: Value::Null,
            ty: TypeRef::nullable(ty),
        }
    }

    /// Instance member access on `self`
    pub fn field(self, name: impl Into<String>, ty: TypeRef) -> Self {
        let member = MemberRef::new(&self.ty(), name, ty);
        HostExpr::Member {
            receiver: Some(Box::new(self)),
            member,
        }
    }

    /// Static member access, e.g. `String.Empty`
    pub fn static_member(owner: &TypeRef, name: impl Into<String>, ty: TypeRef) -> Self {
        HostExpr::Member {
            receiver: None,
            member: MemberRef::new(owner, name, ty),
        }
    }

    pub fn call(
        owner: impl Into<String>,
        name: impl Into<String>,
        receiver: Option<HostExpr>,
        args: Vec<HostExpr>,
        ty: TypeRef,
    ) -> Self {
        HostExpr::Call {
            method: MethodRef::new(owner, name),
            receiver: receiver.map(Box::new),
            args,
            ty,
        }
    }

    /// Binary node with the conventional result type for `op`
    pub fn binary(op: BinaryOp, left: HostExpr, right: HostExpr) -> Self {
        let ty = match op {
            op if op.is_comparison() => TypeRef::bool(),
            BinaryOp::AndAlso | BinaryOp::OrElse => TypeRef::bool(),
            BinaryOp::Coalesce => right.ty(),
            _ => left.ty(),
        };
        HostExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        }
    }

    pub fn unary(op: UnaryOp, operand: HostExpr, ty: TypeRef) -> Self {
        HostExpr::Unary {
            op,
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn logical_not(self) -> Self {
        HostExpr::unary(UnaryOp::Not, self, TypeRef::bool())
    }

    pub fn convert(self, ty: TypeRef) -> Self {
        HostExpr::unary(UnaryOp::Convert, self, ty)
    }

    pub fn conditional(test: HostExpr, if_true: HostExpr, if_false: HostExpr) -> Self {
        let ty = if_true.ty();
        HostExpr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            ty,
        }
    }

    /// Object construction from `(member, value)` pairs
    pub fn new_object(ty: TypeRef, members: Vec<(&str, HostExpr)>) -> Self {
        let (names, args): (Vec<_>, Vec<_>) = members
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .unzip();
        HostExpr::New {
            ty,
            args,
            members: names,
        }
    }

    pub fn equals(self, other: HostExpr) -> Self {
        HostExpr::binary(BinaryOp::Equal, self, other)
    }

    pub fn not_equals(self, other: HostExpr) -> Self {
        HostExpr::binary(BinaryOp::NotEqual, self, other)
    }

    pub fn greater_than(self, other: HostExpr) -> Self {
        HostExpr::binary(BinaryOp::GreaterThan, self, other)
    }

    pub fn less_than(self, other: HostExpr) -> Self {
        HostExpr::binary(BinaryOp::LessThan, self, other)
    }

    pub fn and(self, other: HostExpr) -> Self {
        HostExpr::binary(BinaryOp::AndAlso, self, other)
    }

    pub fn or(self, other: HostExpr) -> Self {
        HostExpr::binary(BinaryOp::OrElse, self, other)
    }

    pub fn plus(self, other: HostExpr) -> Self {
        HostExpr::binary(BinaryOp::Add, self, other)
    }

    /// The value type this host node evaluates to
    pub fn ty(&self) -> TypeRef {
        match self {
            HostExpr::Source(entity) => TypeRef::sequence(entity.clone()),
            HostExpr::Constant { ty, .. } => ty.clone(),
            HostExpr::Parameter(param) => param.ty.clone(),
            HostExpr::Lambda(lambda) => lambda.body.ty(),
            HostExpr::Member { member, .. } => member.ty.clone(),
            HostExpr::Call { ty, .. }
            | HostExpr::Binary { ty, .. }
            | HostExpr::Unary { ty, .. }
            | HostExpr::Conditional { ty, .. }
            | HostExpr::New { ty, .. } => ty.clone(),
        }
    }

    /// Children in their fixed path order
    pub fn children(&self) -> Vec<&HostExpr> {
        match self {
            HostExpr::Source(_) | HostExpr::Constant { .. } | HostExpr::Parameter(_) => Vec::new(),
            HostExpr::Lambda(lambda) => vec![lambda.body.as_ref()],
            HostExpr::Member { receiver, .. } => receiver.iter().map(|r| r.as_ref()).collect(),
            HostExpr::Call { receiver, args, .. } => receiver
                .iter()
                .map(|r| r.as_ref())
                .chain(args.iter())
                .collect(),
            HostExpr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            HostExpr::Unary { operand, .. } => vec![operand.as_ref()],
            HostExpr::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => vec![test.as_ref(), if_true.as_ref(), if_false.as_ref()],
            HostExpr::New { args, .. } => args.iter().collect(),
        }
    }

    /// The literal value of a constant node
    pub fn literal(&self) -> Option<&Value> {
        match self {
            HostExpr::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_lambda(&self) -> Option<&Lambda> {
        match self {
            HostExpr::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }

    /// Node at `path` below this one
    pub fn at(&self, path: &HostPath) -> Option<&HostExpr> {
        path.0
            .iter()
            .try_fold(self, |node, index| node.children().get(*index).copied())
    }

    /// Evaluate a literal-only sub-tree.
    ///
    /// Returns `None` as soon as a non-literal node or an undefined operation
    /// (division by zero, mismatched operand types) is met.
    pub fn evaluate(&self) -> Option<Value> {
        match self {
            HostExpr::Constant { value, .. } => Some(value.clone()),
            HostExpr::Binary {
                op, left, right, ..
            } => eval_binary(*op, left.evaluate()?, right.evaluate()?),
            HostExpr::Unary { op, operand, ty } => eval_unary(*op, operand.evaluate()?, ty),
            HostExpr::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => match test.evaluate()? {
                Value::Bool(true) => if_true.evaluate(),
                Value::Bool(false) => if_false.evaluate(),
                _ => None,
            },
            _ => None,
        }
    }

    /// Hash of the tree's shape.
    ///
    /// Literal values inside lambda bodies are elided when `elide_literals`
    /// is set, since those become query parameters. Literals passed straight
    /// to a query operator (a `Take` count) stay part of the shape, and so
    /// does the null-ness of every literal.
    pub fn shape_hash(&self, elide_literals: bool) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        self.write_shape(&mut hasher, elide_literals, false);
        *hasher.finalize().as_bytes()
    }

    fn write_shape(&self, h: &mut blake3::Hasher, elide: bool, operator_arg: bool) {
        let tag = |h: &mut blake3::Hasher, s: &str| {
            h.update(s.as_bytes());
            h.update(&[0]);
        };
        match self {
            HostExpr::Source(entity) => {
                tag(h, "source");
                tag(h, &entity.name());
            }
            HostExpr::Constant { value, ty } => {
                tag(h, "const");
                tag(h, &ty.name());
                if value.is_null() {
                    tag(h, "null");
                } else if !elide || operator_arg {
                    tag(h, &value.to_string());
                }
            }
            HostExpr::Parameter(param) => {
                tag(h, "param");
                tag(h, &param.name);
                tag(h, &param.ty.name());
            }
            HostExpr::Lambda(lambda) => {
                tag(h, "lambda");
                for param in &lambda.params {
                    tag(h, &param.name);
                    tag(h, &param.ty.name());
                }
                lambda.body.write_shape(h, elide, false);
            }
            HostExpr::Member { receiver, member } => {
                tag(h, "member");
                tag(h, &member.qualified());
                tag(h, &member.ty.name());
                if let Some(receiver) = receiver {
                    receiver.write_shape(h, elide, false);
                }
            }
            HostExpr::Call {
                method,
                receiver,
                args,
                ty,
            } => {
                tag(h, "call");
                tag(h, &method.to_string());
                tag(h, &ty.name());
                let is_operator = method.owner.eq_ignore_ascii_case(QUERYABLE);
                if let Some(receiver) = receiver {
                    receiver.write_shape(h, elide, false);
                }
                tag(h, &args.len().to_string());
                for arg in args {
                    arg.write_shape(h, elide, is_operator);
                }
            }
            HostExpr::Binary {
                op,
                left,
                right,
                ty,
            } => {
                tag(h, "binary");
                tag(h, op.symbol());
                tag(h, &ty.name());
                left.write_shape(h, elide, false);
                right.write_shape(h, elide, false);
            }
            HostExpr::Unary { op, operand, ty } => {
                tag(h, "unary");
                tag(h, op.as_str());
                tag(h, &ty.name());
                operand.write_shape(h, elide, false);
            }
            HostExpr::Conditional {
                test,
                if_true,
                if_false,
                ty,
            } => {
                tag(h, "conditional");
                tag(h, &ty.name());
                test.write_shape(h, elide, false);
                if_true.write_shape(h, elide, false);
                if_false.write_shape(h, elide, false);
            }
            HostExpr::New { ty, args, members } => {
                tag(h, "new");
                tag(h, &ty.name());
                for (arg, member) in args.iter().zip(members) {
                    tag(h, member);
                    arg.write_shape(h, elide, false);
                }
            }
        }
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Option<Value> {
    use serde_json::json;

    match op {
        BinaryOp::Equal => Some(Value::Bool(left == right)),
        BinaryOp::NotEqual => Some(Value::Bool(left != right)),
        BinaryOp::AndAlso => Some(Value::Bool(left.as_bool()? && right.as_bool()?)),
        BinaryOp::OrElse => Some(Value::Bool(left.as_bool()? || right.as_bool()?)),
        BinaryOp::Coalesce => Some(if left.is_null() { right } else { left }),
        BinaryOp::Add => match (&left, &right) {
            (Value::String(l), Value::String(r)) => Some(Value::String(format!("{l}{r}"))),
            _ => arithmetic(op, &left, &right),
        },
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            arithmetic(op, &left, &right)
        }
        BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual => {
            let ordering = match (&left, &right) {
                (Value::String(l), Value::String(r)) => l.cmp(r),
                (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
                _ => left.as_f64()?.partial_cmp(&right.as_f64()?)?,
            };
            let result = match op {
                BinaryOp::LessThan => ordering.is_lt(),
                BinaryOp::LessThanOrEqual => ordering.is_le(),
                BinaryOp::GreaterThan => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Some(json!(result))
        }
        BinaryOp::Assign => None,
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Option<Value> {
    if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
        let value = match op {
            BinaryOp::Add => l.checked_add(r)?,
            BinaryOp::Subtract => l.checked_sub(r)?,
            BinaryOp::Multiply => l.checked_mul(r)?,
            BinaryOp::Divide => l.checked_div(r)?,
            BinaryOp::Modulo => l.checked_rem(r)?,
            _ => return None,
        };
        return Some(Value::from(value));
    }
    let (l, r) = (left.as_f64()?, right.as_f64()?);
    let value = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Subtract => l - r,
        BinaryOp::Multiply => l * r,
        BinaryOp::Divide if r != 0.0 => l / r,
        _ => return None,
    };
    serde_json::Number::from_f64(value).map(Value::Number)
}

fn eval_unary(op: UnaryOp, operand: Value, ty: &TypeRef) -> Option<Value> {
    match op {
        UnaryOp::Not => Some(Value::Bool(!operand.as_bool()?)),
        UnaryOp::Negate => match operand.as_i64() {
            Some(v) => Some(Value::from(v.checked_neg()?)),
            None => serde_json::Number::from_f64(-operand.as_f64()?).map(Value::Number),
        },
        UnaryOp::Convert => {
            use crate::types::ScalarType;
            match (ty.non_nullable(), &operand) {
                (_, Value::Null) => Some(Value::Null),
                (TypeRef::Scalar(ScalarType::Double | ScalarType::Decimal), v) => {
                    serde_json::Number::from_f64(v.as_f64()?).map(Value::Number)
                }
                (TypeRef::Scalar(ScalarType::Int | ScalarType::Long), v) => {
                    v.as_i64().map(Value::from)
                }
                (TypeRef::Scalar(ScalarType::String), Value::String(s)) => {
                    Some(Value::String(s.clone()))
                }
                _ => None,
            }
        }
    }
}

/// Child-index path from a host root to one of its nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HostPath(Vec<usize>);

impl HostPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Path of the `index`-th child of the node at this path
    pub fn child(&self, index: usize) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

/// Fluent builder for host query trees.
#[derive(Debug, Clone)]
pub struct Query {
    expr: HostExpr,
    row: TypeRef,
}

impl Query {
    /// All rows of an entity
    pub fn all(entity: TypeRef) -> Self {
        Self {
            expr: HostExpr::Source(entity.clone()),
            row: entity,
        }
    }

    /// Row type of the sequence this query produces
    pub fn row(&self) -> &TypeRef {
        &self.row
    }

    pub fn expr(&self) -> &HostExpr {
        &self.expr
    }

    pub fn into_expr(self) -> HostExpr {
        self.expr
    }

    /// Apply any `Queryable` operator; `row` is the resulting row type
    pub fn operator(self, name: &str, mut args: Vec<HostExpr>, row: TypeRef) -> Self {
        args.insert(0, self.expr);
        Self {
            expr: HostExpr::call(QUERYABLE, name, None, args, TypeRef::sequence(row.clone())),
            row,
        }
    }

    fn same_row(self, name: &str, args: Vec<HostExpr>) -> Self {
        let row = self.row.clone();
        self.operator(name, args, row)
    }

    pub fn filter(self, predicate: Lambda) -> Self {
        self.same_row("Where", vec![HostExpr::Lambda(predicate)])
    }

    pub fn select(self, selector: Lambda) -> Self {
        let row = selector.body.ty();
        self.operator("Select", vec![HostExpr::Lambda(selector)], row)
    }

    pub fn order_by(self, key: Lambda) -> Self {
        self.same_row("OrderBy", vec![HostExpr::Lambda(key)])
    }

    pub fn order_by_descending(self, key: Lambda) -> Self {
        self.same_row("OrderByDescending", vec![HostExpr::Lambda(key)])
    }

    pub fn then_by(self, key: Lambda) -> Self {
        self.same_row("ThenBy", vec![HostExpr::Lambda(key)])
    }

    pub fn then_by_descending(self, key: Lambda) -> Self {
        self.same_row("ThenByDescending", vec![HostExpr::Lambda(key)])
    }

    pub fn take(self, count: u64) -> Self {
        self.same_row(
            "Take",
            vec![HostExpr::constant(Value::from(count), TypeRef::int())],
        )
    }

    pub fn first(self) -> Self {
        self.same_row("First", Vec::new())
    }

    pub fn distinct(self) -> Self {
        self.same_row("Distinct", Vec::new())
    }

    pub fn group_by(self, key: Lambda) -> Self {
        let row = TypeRef::grouping(key.body.ty(), self.row.clone());
        self.operator("GroupBy", vec![HostExpr::Lambda(key)], row)
    }

    pub fn group_by_with(self, key: Lambda, element: Lambda) -> Self {
        let row = TypeRef::grouping(key.body.ty(), element.body.ty());
        self.operator(
            "GroupBy",
            vec![HostExpr::Lambda(key), HostExpr::Lambda(element)],
            row,
        )
    }

    pub fn join(self, other: Query, on: Lambda) -> Self {
        self.join_as("Join", other, on)
    }

    pub fn left_join(self, other: Query, on: Lambda) -> Self {
        self.join_as("LeftJoin", other, on)
    }

    fn join_as(self, name: &str, other: Query, on: Lambda) -> Self {
        let row = TypeRef::pair(self.row.clone(), other.row.clone());
        self.operator(name, vec![other.expr, HostExpr::Lambda(on)], row)
    }

    pub fn insert(self, rows: Vec<HostExpr>) -> Self {
        self.same_row("Insert", rows)
    }

    pub fn insert_or_ignore(self, rows: Vec<HostExpr>) -> Self {
        self.same_row("InsertOrIgnore", rows)
    }

    pub fn insert_or_replace(self, rows: Vec<HostExpr>) -> Self {
        self.same_row("InsertOrReplace", rows)
    }

    pub fn update_set(self, setter: Lambda) -> Self {
        self.same_row("UpdateSet", vec![HostExpr::Lambda(setter)])
    }

    pub fn update_where(self, setter: Lambda, predicate: Lambda) -> Self {
        self.same_row(
            "UpdateWhere",
            vec![HostExpr::Lambda(setter), HostExpr::Lambda(predicate)],
        )
    }

    pub fn delete(self) -> Self {
        self.same_row("Delete", Vec::new())
    }

    pub fn delete_where(self, predicate: Lambda) -> Self {
        self.same_row("DeleteWhere", vec![HostExpr::Lambda(predicate)])
    }
}

impl From<Query> for HostExpr {
    fn from(query: Query) -> Self {
        query.expr
    }
}
