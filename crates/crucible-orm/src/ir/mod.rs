//! Intermediate expression tree.
//!
//! The backend-agnostic output of translation. A renderer walks an [`Expr`]
//! to produce SQL; nothing in this module knows about any SQL dialect.
//!
//! # Node families
//!
//! - Leaves: [`Constant`], [`QueryParameter`], [`Parameter`], [`QuerySource`], [`Special`]
//! - Bindings: [`SimpleBinding`], [`NamedBinding`], [`ColumnChain`]
//! - Composites: [`Binary`], [`Unary`], [`Conditional`], [`MethodCall`], [`New`], [`InList`]
//! - Relations: [`Projection`], [`Filter`], [`Join`], [`NamedSource`], [`GroupBy`],
//!   [`OrderBy`], [`OrderByBinding`], [`RowsFetchLimit`]
//! - Mutations: [`Insert`], [`Values`], [`Set`], [`Delete`]
//! - Structural: [`Batch`], [`Parentheses`], [`Rename`], [`JsonAttribute`]

pub mod builder;
mod display;
mod nodes;
mod restate;
mod structural;

pub use nodes::*;
pub use structural::StructuralHash;

use crate::types::{BinaryOp, MemberRef, TypeRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::iter::once;

/// An intermediate expression node.
///
/// Equality and hashing are structural (see [`Expr::structural_hash`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Constant(Constant),
    QueryParameter(QueryParameter),
    Parameter(Parameter),
    QuerySource(QuerySource),
    Special(Special),
    SimpleBinding(SimpleBinding),
    NamedBinding(NamedBinding),
    ColumnChain(ColumnChain),
    Binary(Binary),
    Unary(Unary),
    Conditional(Conditional),
    MethodCall(MethodCall),
    New(New),
    InList(InList),
    Projection(Projection),
    Filter(Filter),
    Join(Join),
    NamedSource(NamedSource),
    GroupBy(GroupBy),
    OrderBy(OrderBy),
    OrderByBinding(OrderByBinding),
    RowsFetchLimit(RowsFetchLimit),
    Insert(Insert),
    Values(Values),
    Set(Set),
    Delete(Delete),
    Batch(Batch),
    Parentheses(Parentheses),
    Rename(Rename),
    JsonAttribute(JsonAttribute),
}

/// Discriminant of [`Expr`], used in errors and the apply table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Constant,
    QueryParameter,
    Parameter,
    QuerySource,
    Special,
    SimpleBinding,
    NamedBinding,
    ColumnChain,
    Binary,
    Unary,
    Conditional,
    MethodCall,
    New,
    InList,
    Projection,
    Filter,
    Join,
    NamedSource,
    GroupBy,
    OrderBy,
    OrderByBinding,
    RowsFetchLimit,
    Insert,
    Values,
    Set,
    Delete,
    Batch,
    Parentheses,
    Rename,
    JsonAttribute,
}

impl NodeKind {
    /// Every node kind, in declaration order
    pub const ALL: [NodeKind; 30] = [
        NodeKind::Constant,
        NodeKind::QueryParameter,
        NodeKind::Parameter,
        NodeKind::QuerySource,
        NodeKind::Special,
        NodeKind::SimpleBinding,
        NodeKind::NamedBinding,
        NodeKind::ColumnChain,
        NodeKind::Binary,
        NodeKind::Unary,
        NodeKind::Conditional,
        NodeKind::MethodCall,
        NodeKind::New,
        NodeKind::InList,
        NodeKind::Projection,
        NodeKind::Filter,
        NodeKind::Join,
        NodeKind::NamedSource,
        NodeKind::GroupBy,
        NodeKind::OrderBy,
        NodeKind::OrderByBinding,
        NodeKind::RowsFetchLimit,
        NodeKind::Insert,
        NodeKind::Values,
        NodeKind::Set,
        NodeKind::Delete,
        NodeKind::Batch,
        NodeKind::Parentheses,
        NodeKind::Rename,
        NodeKind::JsonAttribute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Constant => "Constant",
            NodeKind::QueryParameter => "QueryParameter",
            NodeKind::Parameter => "Parameter",
            NodeKind::QuerySource => "QuerySource",
            NodeKind::Special => "Special",
            NodeKind::SimpleBinding => "SimpleBinding",
            NodeKind::NamedBinding => "NamedBinding",
            NodeKind::ColumnChain => "ColumnChain",
            NodeKind::Binary => "Binary",
            NodeKind::Unary => "Unary",
            NodeKind::Conditional => "Conditional",
            NodeKind::MethodCall => "MethodCall",
            NodeKind::New => "New",
            NodeKind::InList => "InList",
            NodeKind::Projection => "Projection",
            NodeKind::Filter => "Filter",
            NodeKind::Join => "Join",
            NodeKind::NamedSource => "NamedSource",
            NodeKind::GroupBy => "GroupBy",
            NodeKind::OrderBy => "OrderBy",
            NodeKind::OrderByBinding => "OrderByBinding",
            NodeKind::RowsFetchLimit => "RowsFetchLimit",
            NodeKind::Insert => "Insert",
            NodeKind::Values => "Values",
            NodeKind::Set => "Set",
            NodeKind::Delete => "Delete",
            NodeKind::Batch => "Batch",
            NodeKind::Parentheses => "Parentheses",
            NodeKind::Rename => "Rename",
            NodeKind::JsonAttribute => "JsonAttribute",
        }
    }

    /// Kinds that produce rows rather than values
    pub fn is_relation(&self) -> bool {
        matches!(
            self,
            NodeKind::QuerySource
                | NodeKind::Projection
                | NodeKind::Filter
                | NodeKind::Join
                | NodeKind::NamedSource
                | NodeKind::GroupBy
                | NodeKind::OrderBy
                | NodeKind::RowsFetchLimit
        )
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            NodeKind::Insert | NodeKind::Values | NodeKind::Set | NodeKind::Delete | NodeKind::Batch
        )
    }

    /// Kinds usable as a value inside predicates, bindings and arguments
    pub fn is_scalar(&self) -> bool {
        !self.is_relation() && !self.is_mutation() && *self != NodeKind::OrderByBinding
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn to_expr(&self) -> Expr {
        Expr::Parameter(self.clone())
    }
}

impl QueryParameter {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

fn map_box(expr: Box<Expr>, f: &mut dyn FnMut(Expr) -> Expr) -> Box<Expr> {
    Box::new(f(*expr))
}

impl Expr {
    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    pub fn constant(value: Value, ty: TypeRef) -> Self {
        Expr::Constant(Constant { value, ty })
    }

    pub fn null(ty: TypeRef) -> Self {
        Expr::constant(Value::Null, TypeRef::nullable(ty))
    }

    pub fn parameter(name: impl Into<String>, ty: TypeRef) -> Self {
        Expr::Parameter(Parameter::new(name, ty))
    }

    pub fn query_parameter(name: impl Into<String>, ty: TypeRef) -> Self {
        Expr::QueryParameter(QueryParameter::new(name, ty))
    }

    pub fn source(entity: TypeRef) -> Self {
        Expr::QuerySource(QuerySource { entity })
    }

    pub fn special(text: impl Into<String>, ty: TypeRef) -> Self {
        Expr::Special(Special {
            text: text.into(),
            ty,
        })
    }

    pub fn binding(source: Expr, member: MemberRef) -> Self {
        Expr::SimpleBinding(SimpleBinding {
            source: Box::new(source),
            member,
        })
    }

    pub fn named(name: impl Into<String>, binding: Expr) -> Self {
        Expr::NamedBinding(NamedBinding {
            name: name.into(),
            binding: Box::new(binding),
        })
    }

    /// Binary node with the conventional result type for `op`
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let ty = match op {
            op if op.is_comparison() => TypeRef::bool(),
            BinaryOp::AndAlso | BinaryOp::OrElse => TypeRef::bool(),
            BinaryOp::Coalesce => right.ty(),
            _ => left.ty(),
        };
        Expr::Binary(Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        })
    }

    pub fn parenthesize(child: Expr) -> Self {
        Expr::Parentheses(Parentheses {
            child: Box::new(child),
        })
    }

    pub fn rename(child: Expr, name: impl Into<String>) -> Self {
        Expr::Rename(Rename {
            child: Box::new(child),
            name: name.into(),
        })
    }

    pub fn named_source(source: Expr, alias: Parameter) -> Self {
        Expr::NamedSource(NamedSource {
            source: Box::new(source),
            alias,
        })
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn kind(&self) -> NodeKind {
        match self {
            Expr::Constant(_) => NodeKind::Constant,
            Expr::QueryParameter(_) => NodeKind::QueryParameter,
            Expr::Parameter(_) => NodeKind::Parameter,
            Expr::QuerySource(_) => NodeKind::QuerySource,
            Expr::Special(_) => NodeKind::Special,
            Expr::SimpleBinding(_) => NodeKind::SimpleBinding,
            Expr::NamedBinding(_) => NodeKind::NamedBinding,
            Expr::ColumnChain(_) => NodeKind::ColumnChain,
            Expr::Binary(_) => NodeKind::Binary,
            Expr::Unary(_) => NodeKind::Unary,
            Expr::Conditional(_) => NodeKind::Conditional,
            Expr::MethodCall(_) => NodeKind::MethodCall,
            Expr::New(_) => NodeKind::New,
            Expr::InList(_) => NodeKind::InList,
            Expr::Projection(_) => NodeKind::Projection,
            Expr::Filter(_) => NodeKind::Filter,
            Expr::Join(_) => NodeKind::Join,
            Expr::NamedSource(_) => NodeKind::NamedSource,
            Expr::GroupBy(_) => NodeKind::GroupBy,
            Expr::OrderBy(_) => NodeKind::OrderBy,
            Expr::OrderByBinding(_) => NodeKind::OrderByBinding,
            Expr::RowsFetchLimit(_) => NodeKind::RowsFetchLimit,
            Expr::Insert(_) => NodeKind::Insert,
            Expr::Values(_) => NodeKind::Values,
            Expr::Set(_) => NodeKind::Set,
            Expr::Delete(_) => NodeKind::Delete,
            Expr::Batch(_) => NodeKind::Batch,
            Expr::Parentheses(_) => NodeKind::Parentheses,
            Expr::Rename(_) => NodeKind::Rename,
            Expr::JsonAttribute(_) => NodeKind::JsonAttribute,
        }
    }

    /// The value type this node represents.
    ///
    /// Relations report a sequence of their row type; mutations report the
    /// affected-row count.
    pub fn ty(&self) -> TypeRef {
        match self {
            Expr::Constant(c) => c.ty.clone(),
            Expr::QueryParameter(p) => p.ty.clone(),
            Expr::Parameter(p) => p.ty.clone(),
            Expr::Special(s) => s.ty.clone(),
            Expr::SimpleBinding(b) => b.member.ty.clone(),
            Expr::NamedBinding(b) => b.binding.ty(),
            Expr::ColumnChain(c) => match c.members.last() {
                Some(member) => member.ty.clone(),
                None => c.source.ty(),
            },
            Expr::Binary(b) => b.ty.clone(),
            Expr::Unary(u) => u.ty.clone(),
            Expr::Conditional(c) => c.ty.clone(),
            Expr::MethodCall(m) => m.ty.clone(),
            Expr::New(n) => n.ty.clone(),
            Expr::InList(_) => TypeRef::bool(),
            Expr::QuerySource(_)
            | Expr::Projection(_)
            | Expr::Filter(_)
            | Expr::Join(_)
            | Expr::NamedSource(_)
            | Expr::GroupBy(_)
            | Expr::OrderBy(_)
            | Expr::RowsFetchLimit(_) => TypeRef::sequence(self.row_type()),
            Expr::OrderByBinding(b) => b.expr.ty(),
            Expr::Insert(_) | Expr::Values(_) | Expr::Set(_) | Expr::Delete(_) | Expr::Batch(_) => {
                TypeRef::long()
            }
            Expr::Parentheses(p) => p.child.ty(),
            Expr::Rename(r) => r.child.ty(),
            Expr::JsonAttribute(j) => j.ty.clone(),
        }
    }

    /// Type of one row produced (or targeted) by this node
    pub fn row_type(&self) -> TypeRef {
        match self {
            Expr::QuerySource(s) => s.entity.clone(),
            Expr::Projection(p) => p.row.clone(),
            Expr::Filter(f) => f.source.row_type(),
            Expr::OrderBy(o) => o.source.row_type(),
            Expr::RowsFetchLimit(l) => l.source.row_type(),
            Expr::NamedSource(n) => n.alias.ty.clone(),
            Expr::Join(j) => j.row.clone(),
            Expr::GroupBy(g) => g.row.clone(),
            Expr::Set(s) => s.target.row_type(),
            Expr::Delete(d) => d.target.clone(),
            Expr::Insert(i) => i.target.clone(),
            Expr::Batch(b) => match b.inserts.first() {
                Some(insert) => insert.target.clone(),
                None => TypeRef::long(),
            },
            other => other.ty().element().clone(),
        }
    }

    /// The row symbol this node is referenced by, if it has one.
    ///
    /// Select-all projections, filters, orderings and limits are transparent:
    /// their rows are the rows of their source.
    pub fn row_parameter(&self) -> Option<&Parameter> {
        match self {
            Expr::NamedSource(n) => Some(&n.alias),
            Expr::Projection(p) if p.is_select_all() => p.source.row_parameter(),
            Expr::Filter(f) => f.source.row_parameter(),
            Expr::OrderBy(o) => o.source.row_parameter(),
            Expr::RowsFetchLimit(l) => l.source.row_parameter(),
            Expr::Set(s) => s.target.row_parameter(),
            _ => None,
        }
    }

    /// Name a binding publishes in a projection's output
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Expr::SimpleBinding(b) => Some(&b.member.name),
            Expr::NamedBinding(b) => Some(&b.name),
            Expr::ColumnChain(c) => c.members.last().map(|m| m.name.as_str()),
            Expr::Rename(r) => Some(&r.name),
            Expr::JsonAttribute(j) => Some(&j.attribute),
            _ => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        self.kind().is_relation()
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Expr::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_projection(&self) -> Option<&Projection> {
        match self {
            Expr::Projection(p) => Some(p),
            _ => None,
        }
    }

    /// Direct children in their fixed order.
    ///
    /// Mutation rows hold their placeholders directly and report no children.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Constant(_)
            | Expr::QueryParameter(_)
            | Expr::Parameter(_)
            | Expr::QuerySource(_)
            | Expr::Special(_)
            | Expr::Insert(_)
            | Expr::Values(_)
            | Expr::Delete(_)
            | Expr::Batch(_) => Vec::new(),
            Expr::SimpleBinding(b) => vec![&*b.source],
            Expr::NamedBinding(b) => vec![&*b.binding],
            Expr::ColumnChain(c) => vec![&*c.source],
            Expr::Binary(b) => vec![&*b.left, &*b.right],
            Expr::Unary(u) => vec![&*u.operand],
            Expr::Conditional(c) => vec![&*c.test, &*c.if_true, &*c.if_false],
            Expr::MethodCall(m) => m
                .receiver
                .iter()
                .map(|r| &**r)
                .chain(m.args.iter())
                .collect(),
            Expr::New(n) => n.members.iter().collect(),
            Expr::InList(i) => vec![&*i.value, &*i.list],
            Expr::Projection(p) => once(&*p.source).chain(p.bindings.iter()).collect(),
            Expr::Filter(f) => vec![&*f.source, &*f.predicate],
            Expr::Join(j) => vec![&*j.left, &*j.right, &*j.on],
            Expr::NamedSource(n) => vec![&*n.source],
            Expr::GroupBy(g) => once(&*g.source)
                .chain(once(&*g.keys))
                .chain(g.values.iter().map(|v| &**v))
                .collect(),
            Expr::OrderBy(o) => once(&*o.source)
                .chain(o.bindings.iter().map(|b| &*b.expr))
                .collect(),
            Expr::OrderByBinding(b) => vec![&*b.expr],
            Expr::RowsFetchLimit(l) => vec![&*l.source],
            Expr::Set(s) => once(&*s.target).chain(s.assignments.iter()).collect(),
            Expr::Parentheses(p) => vec![&*p.child],
            Expr::Rename(r) => vec![&*r.child],
            Expr::JsonAttribute(j) => vec![&*j.child],
        }
    }

    /// Pre-order visit of this node and all descendants
    pub fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// True if any node in the tree satisfies `pred`
    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|child| child.any(pred))
    }

    // ------------------------------------------------------------------------
    // Rewriting
    // ------------------------------------------------------------------------

    /// Rebuild this node with each direct child replaced by `f(child)`
    pub fn map_children(self, f: &mut dyn FnMut(Expr) -> Expr) -> Expr {
        match self {
            Expr::Constant(_)
            | Expr::QueryParameter(_)
            | Expr::Parameter(_)
            | Expr::QuerySource(_)
            | Expr::Special(_)
            | Expr::Insert(_)
            | Expr::Values(_)
            | Expr::Delete(_)
            | Expr::Batch(_) => self,
            Expr::SimpleBinding(b) => Expr::SimpleBinding(SimpleBinding {
                source: map_box(b.source, f),
                member: b.member,
            }),
            Expr::NamedBinding(b) => Expr::NamedBinding(NamedBinding {
                name: b.name,
                binding: map_box(b.binding, f),
            }),
            Expr::ColumnChain(c) => Expr::ColumnChain(ColumnChain {
                source: map_box(c.source, f),
                members: c.members,
            }),
            Expr::Binary(b) => Expr::Binary(Binary {
                op: b.op,
                left: map_box(b.left, f),
                right: map_box(b.right, f),
                ty: b.ty,
            }),
            Expr::Unary(u) => Expr::Unary(Unary {
                op: u.op,
                operand: map_box(u.operand, f),
                ty: u.ty,
            }),
            Expr::Conditional(c) => Expr::Conditional(Conditional {
                test: map_box(c.test, f),
                if_true: map_box(c.if_true, f),
                if_false: map_box(c.if_false, f),
                ty: c.ty,
            }),
            Expr::MethodCall(m) => {
                let receiver = m.receiver.map(|r| map_box(r, &mut *f));
                Expr::MethodCall(MethodCall {
                    name: m.name,
                    receiver,
                    args: m.args.into_iter().map(&mut *f).collect(),
                    ty: m.ty,
                })
            }
            Expr::New(n) => Expr::New(New {
                ty: n.ty,
                members: n.members.into_iter().map(&mut *f).collect(),
            }),
            Expr::InList(i) => Expr::InList(InList {
                value: map_box(i.value, f),
                list: map_box(i.list, f),
            }),
            Expr::Projection(p) => {
                let source = map_box(p.source, f);
                Expr::Projection(Projection {
                    source,
                    bindings: p.bindings.into_iter().map(&mut *f).collect(),
                    row: p.row,
                    flags: p.flags,
                })
            }
            Expr::Filter(x) => Expr::Filter(Filter {
                source: map_box(x.source, f),
                predicate: map_box(x.predicate, f),
            }),
            Expr::Join(j) => Expr::Join(Join {
                kind: j.kind,
                left: map_box(j.left, f),
                right: map_box(j.right, f),
                on: map_box(j.on, f),
                row: j.row,
            }),
            Expr::NamedSource(n) => Expr::NamedSource(NamedSource {
                source: map_box(n.source, f),
                alias: n.alias,
            }),
            Expr::GroupBy(g) => {
                let source = map_box(g.source, f);
                let keys = map_box(g.keys, f);
                Expr::GroupBy(GroupBy {
                    source,
                    keys,
                    values: g.values.map(|v| map_box(v, &mut *f)),
                    element_row: g.element_row,
                    row: g.row,
                })
            }
            Expr::OrderBy(o) => {
                let source = map_box(o.source, f);
                let bindings = o
                    .bindings
                    .into_iter()
                    .map(|b| OrderByBinding {
                        expr: map_box(b.expr, &mut *f),
                        direction: b.direction,
                    })
                    .collect();
                Expr::OrderBy(OrderBy { source, bindings })
            }
            Expr::OrderByBinding(b) => Expr::OrderByBinding(OrderByBinding {
                expr: map_box(b.expr, f),
                direction: b.direction,
            }),
            Expr::RowsFetchLimit(l) => Expr::RowsFetchLimit(RowsFetchLimit {
                source: map_box(l.source, f),
                fetch: l.fetch,
            }),
            Expr::Set(s) => {
                let target = map_box(s.target, f);
                Expr::Set(Set {
                    target,
                    assignments: s.assignments.into_iter().map(&mut *f).collect(),
                })
            }
            Expr::Parentheses(p) => Expr::Parentheses(Parentheses {
                child: map_box(p.child, f),
            }),
            Expr::Rename(r) => Expr::Rename(Rename {
                child: map_box(r.child, f),
                name: r.name,
            }),
            Expr::JsonAttribute(j) => Expr::JsonAttribute(JsonAttribute {
                child: map_box(j.child, f),
                attribute: j.attribute,
                ty: j.ty,
            }),
        }
    }

    /// Top-down rewrite: where `f` returns a replacement, the replacement is
    /// taken as-is and its subtree is not visited again.
    pub fn replace_top_down(self, f: &mut dyn FnMut(&Expr) -> Option<Expr>) -> Expr {
        match f(&self) {
            Some(replacement) => replacement,
            None => self.map_children(&mut |child| child.replace_top_down(&mut *f)),
        }
    }

    /// Bottom-up rewrite: children first, then `f` on the rebuilt node
    pub fn rewrite_bottom_up(self, f: &mut dyn FnMut(Expr) -> Expr) -> Expr {
        let rebuilt = self.map_children(&mut |child| child.rewrite_bottom_up(&mut *f));
        f(rebuilt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> TypeRef {
        TypeRef::entity("User")
    }

    fn age(source: Expr) -> Expr {
        Expr::binding(source, MemberRef::new(&user(), "Age", TypeRef::int()))
    }

    #[test]
    fn test_node_kind_inventory_is_complete() {
        assert_eq!(NodeKind::ALL.len(), 30);
        assert!(NodeKind::Projection.is_relation());
        assert!(NodeKind::Set.is_mutation());
        assert!(NodeKind::SimpleBinding.is_scalar());
        assert!(!NodeKind::OrderByBinding.is_scalar());
    }

    #[test]
    fn test_binding_type_is_member_type() {
        let a = Expr::parameter("a", user());
        assert_eq!(age(a).ty(), TypeRef::int());
    }

    #[test]
    fn test_row_parameter_passes_through_select_all() {
        let a = Parameter::new("a", user());
        let named = Expr::named_source(Expr::source(user()), a.clone());
        let select_all = Expr::Projection(Projection {
            source: Box::new(named),
            bindings: Vec::new(),
            row: user(),
            flags: ProjectionFlags::default(),
        });
        assert_eq!(select_all.row_parameter(), Some(&a));
        assert_eq!(select_all.ty(), TypeRef::sequence(user()));
    }

    #[test]
    fn test_row_parameter_stops_at_reshaping_projection() {
        let a = Parameter::new("a", user());
        let projection = Expr::Projection(Projection {
            source: Box::new(Expr::named_source(Expr::source(user()), a.clone())),
            bindings: vec![age(a.to_expr())],
            row: TypeRef::anonymous("<>f__0"),
            flags: ProjectionFlags::default(),
        });
        assert_eq!(projection.row_parameter(), None);
        assert_eq!(projection.row_type(), TypeRef::anonymous("<>f__0"));
    }

    #[test]
    fn test_replace_top_down_does_not_revisit_replacement() {
        let expr = Expr::binary(
            BinaryOp::GreaterThan,
            age(Expr::parameter("a", user())),
            Expr::constant(json!(1), TypeRef::int()),
        );
        let mut calls = 0;
        let rewritten = expr.replace_top_down(&mut |node| {
            calls += 1;
            match node {
                Expr::SimpleBinding(_) => Some(age(Expr::parameter("b", user()))),
                _ => None,
            }
        });
        // root, left (replaced), right
        assert_eq!(calls, 3);
        assert_eq!(rewritten.to_string(), "(b.Age > 1)");
    }

    #[test]
    fn test_children_follow_slot_order() {
        let expr = Expr::binary(
            BinaryOp::Subtract,
            Expr::constant(json!(1), TypeRef::int()),
            Expr::constant(json!(2), TypeRef::int()),
        );
        let kinds: Vec<_> = expr.children().iter().map(|c| c.to_string()).collect();
        assert_eq!(kinds, vec!["1", "2"]);
    }
}
