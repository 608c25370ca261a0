//! Builders for composite nodes and the apply protocol.
//!
//! While the walker is inside a host node, the matching intermediate node is
//! open as a [`Builder`]. Closed children are attached with
//! [`Builder::apply`], which consumes the builder and returns it with one
//! more slot filled; [`Builder::finish`] yields the immutable node once every
//! required slot is present.
//!
//! Whether a parent takes a child at all is decided by [`accepts`], a single
//! match over (parent kind, child kind). Which slot the child fills then
//! depends on what the builder already holds; slots are write-once.

use super::{
    Batch, Binary, ColumnChain, Conditional, ConflictBehavior, Direction, Expr, Filter, GroupBy,
    Insert, JoinKind, JsonAttribute, MethodCall, New, NodeKind, OrderBy, OrderByBinding,
    Parameter, Projection, ProjectionFlags, QueryParameter, RowsFetchLimit, Set, Unary, Values,
};
use crate::error::{ProtocolError, TranslateError, TranslateResult};
use crate::transform::{restate_against, ExprRewrite, JoinBindingReplacement};
use crate::types::{BinaryOp, MemberRef, TypeRef, UnaryOp};

/// Whether a node of kind `parent` takes children of kind `child`.
pub fn accepts(parent: NodeKind, child: NodeKind) -> bool {
    use NodeKind as K;
    match parent {
        K::Binary
        | K::Unary
        | K::Conditional
        | K::MethodCall
        | K::New
        | K::InList
        | K::SimpleBinding
        | K::NamedBinding
        | K::OrderByBinding
        | K::Parentheses
        | K::Rename
        | K::JsonAttribute => child.is_scalar(),
        K::Projection | K::Join | K::GroupBy => child.is_relation() || child.is_scalar(),
        K::Filter => {
            child.is_relation() || child.is_scalar() || matches!(child, K::Set | K::Delete)
        }
        K::OrderBy => child.is_relation() || child == K::OrderByBinding,
        K::RowsFetchLimit => child.is_relation(),
        K::Set => matches!(child, K::QuerySource | K::NamedSource | K::Binary),
        K::Insert => child == K::Values,
        K::Values => child == K::QueryParameter,
        K::Batch => child == K::Insert,
        K::Constant
        | K::QueryParameter
        | K::Parameter
        | K::QuerySource
        | K::Special
        | K::ColumnChain
        | K::NamedSource
        | K::Delete => false,
    }
}

fn filled(parent: NodeKind, slot: &'static str) -> TranslateError {
    ProtocolError::SlotFilled { parent, slot }.into()
}

fn missing(kind: NodeKind, slot: &'static str) -> TranslateError {
    ProtocolError::MissingSlot { kind, slot }.into()
}

fn out_of_order(kind: NodeKind, slot: &'static str, requires: &'static str) -> TranslateError {
    ProtocolError::OutOfOrder {
        kind,
        slot,
        requires,
    }
    .into()
}

fn incompatible(parent: NodeKind, child: &Expr) -> TranslateError {
    ProtocolError::Incompatible {
        parent,
        child: child.kind(),
    }
    .into()
}

/// Wrap `source` so that it is referenced by `row`, unless it already is
fn aliased(source: Expr, row: Option<Parameter>) -> Expr {
    match row {
        Some(row)
            if !matches!(source, Expr::Join(_)) && source.row_parameter() != Some(&row) =>
        {
            Expr::named_source(source, row)
        }
        _ => source,
    }
}

/// AND-combine two predicates; OR operands keep their grouping
pub fn and_combine(left: Expr, right: Expr) -> Expr {
    let group = |e: Expr| {
        if matches!(&e, Expr::Binary(b) if b.op == BinaryOp::OrElse) {
            Expr::parenthesize(e)
        } else {
            e
        }
    };
    Expr::binary(BinaryOp::AndAlso, group(left), group(right))
}

// ============================================================================
// Scalar builders
// ============================================================================

#[derive(Debug, Clone)]
pub struct BinaryBuilder {
    op: BinaryOp,
    ty: Option<TypeRef>,
    left: Option<Expr>,
    right: Option<Expr>,
}

impl BinaryBuilder {
    /// `ty` overrides the conventional result type of `op`
    pub fn new(op: BinaryOp, ty: Option<TypeRef>) -> Self {
        Self {
            op,
            ty,
            left: None,
            right: None,
        }
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if self.left.is_none() {
            self.left = Some(child);
        } else if self.right.is_none() {
            self.right = Some(child);
        } else {
            return Err(filled(NodeKind::Binary, "right"));
        }
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let left = self.left.ok_or_else(|| missing(NodeKind::Binary, "left"))?;
        let right = self.right.ok_or_else(|| missing(NodeKind::Binary, "right"))?;
        Ok(match self.ty {
            Some(ty) => Expr::Binary(Binary {
                op: self.op,
                left: Box::new(left),
                right: Box::new(right),
                ty,
            }),
            None => Expr::binary(self.op, left, right),
        })
    }
}

#[derive(Debug, Clone)]
pub struct UnaryBuilder {
    op: UnaryOp,
    ty: TypeRef,
    operand: Option<Expr>,
}

impl UnaryBuilder {
    pub fn new(op: UnaryOp, ty: TypeRef) -> Self {
        Self {
            op,
            ty,
            operand: None,
        }
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if self.operand.is_some() {
            return Err(filled(NodeKind::Unary, "operand"));
        }
        self.operand = Some(child);
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let operand = self
            .operand
            .ok_or_else(|| missing(NodeKind::Unary, "operand"))?;
        Ok(Expr::Unary(Unary {
            op: self.op,
            operand: Box::new(operand),
            ty: self.ty,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct ConditionalBuilder {
    ty: TypeRef,
    test: Option<Expr>,
    if_true: Option<Expr>,
    if_false: Option<Expr>,
}

impl ConditionalBuilder {
    pub fn new(ty: TypeRef) -> Self {
        Self {
            ty,
            test: None,
            if_true: None,
            if_false: None,
        }
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if self.test.is_none() {
            self.test = Some(child);
        } else if self.if_true.is_none() {
            self.if_true = Some(child);
        } else if self.if_false.is_none() {
            self.if_false = Some(child);
        } else {
            return Err(filled(NodeKind::Conditional, "else"));
        }
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let kind = NodeKind::Conditional;
        Ok(Expr::Conditional(Conditional {
            test: Box::new(self.test.ok_or_else(|| missing(kind, "when"))?),
            if_true: Box::new(self.if_true.ok_or_else(|| missing(kind, "then"))?),
            if_false: Box::new(self.if_false.ok_or_else(|| missing(kind, "else"))?),
            ty: self.ty,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct MethodCallBuilder {
    name: String,
    ty: TypeRef,
    expects_receiver: bool,
    receiver: Option<Expr>,
    args: Vec<Expr>,
}

impl MethodCallBuilder {
    /// With `expects_receiver`, the first applied child is the receiver
    pub fn new(name: impl Into<String>, ty: TypeRef, expects_receiver: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            expects_receiver,
            receiver: None,
            args: Vec::new(),
        }
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if self.expects_receiver && self.receiver.is_none() {
            self.receiver = Some(child);
        } else {
            self.args.push(child);
        }
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        if self.expects_receiver && self.receiver.is_none() {
            return Err(missing(NodeKind::MethodCall, "receiver"));
        }
        Ok(Expr::MethodCall(MethodCall {
            name: self.name,
            receiver: self.receiver.map(Box::new),
            args: self.args,
            ty: self.ty,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct NewBuilder {
    ty: TypeRef,
    members: Vec<Expr>,
}

impl NewBuilder {
    pub fn new(ty: TypeRef) -> Self {
        Self {
            ty,
            members: Vec::new(),
        }
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        self.members.push(child);
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        Ok(Expr::New(New {
            ty: self.ty,
            members: self.members,
        }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InListBuilder {
    value: Option<Expr>,
    list: Option<Expr>,
}

impl InListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if self.value.is_none() {
            self.value = Some(child);
        } else if self.list.is_none() {
            self.list = Some(child);
        } else {
            return Err(filled(NodeKind::InList, "list"));
        }
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let value = self.value.ok_or_else(|| missing(NodeKind::InList, "value"))?;
        let list = self.list.ok_or_else(|| missing(NodeKind::InList, "list"))?;
        Ok(Expr::InList(super::InList {
            value: Box::new(value),
            list: Box::new(list),
        }))
    }
}

/// Member access; the receiver decides between a binding and a chain.
#[derive(Debug, Clone)]
pub struct BindingBuilder {
    member: MemberRef,
    receiver: Option<Expr>,
}

impl BindingBuilder {
    pub fn new(member: MemberRef) -> Self {
        Self {
            member,
            receiver: None,
        }
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if self.receiver.is_some() {
            return Err(filled(NodeKind::SimpleBinding, "source"));
        }
        self.receiver = Some(child);
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let receiver = self
            .receiver
            .ok_or_else(|| missing(NodeKind::SimpleBinding, "source"))?;
        member_of(receiver, self.member)
    }
}

/// Access `member` on an already translated receiver
pub fn member_of(receiver: Expr, member: MemberRef) -> TranslateResult<Expr> {
    match receiver {
        Expr::Parameter(_) | Expr::JsonAttribute(_) | Expr::Rename(_) => {
            Ok(Expr::binding(receiver, member))
        }
        Expr::SimpleBinding(b) => Ok(Expr::ColumnChain(ColumnChain {
            source: b.source,
            members: vec![b.member, member],
        })),
        Expr::ColumnChain(mut c) => {
            c.members.push(member);
            Ok(Expr::ColumnChain(c))
        }
        Expr::NamedBinding(b) => member_of(*b.binding, member),
        Expr::New(n) => {
            let found = n
                .members
                .into_iter()
                .find(|m| m.output_name().is_some_and(|name| member.is_named(name)));
            match found {
                Some(Expr::NamedBinding(b)) => Ok(*b.binding),
                Some(value) => Ok(value),
                None => Err(TranslateError::unsupported(member.qualified())),
            }
        }
        other => Err(TranslateError::unsupported(format!(
            "{} on {}",
            member.qualified(),
            other.kind()
        ))),
    }
}

/// Thin single-child wrappers.
#[derive(Debug, Clone)]
pub enum Wrap {
    Parentheses,
    Rename(String),
    Named(String),
    Json { attribute: String, ty: TypeRef },
}

#[derive(Debug, Clone)]
pub struct WrapperBuilder {
    wrap: Wrap,
    child: Option<Expr>,
}

impl WrapperBuilder {
    pub fn new(wrap: Wrap) -> Self {
        Self { wrap, child: None }
    }

    fn kind(&self) -> NodeKind {
        match self.wrap {
            Wrap::Parentheses => NodeKind::Parentheses,
            Wrap::Rename(_) => NodeKind::Rename,
            Wrap::Named(_) => NodeKind::NamedBinding,
            Wrap::Json { .. } => NodeKind::JsonAttribute,
        }
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if self.child.is_some() {
            return Err(filled(self.kind(), "child"));
        }
        self.child = Some(child);
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let kind = self.kind();
        let child = self.child.ok_or_else(|| missing(kind, "child"))?;
        Ok(match self.wrap {
            Wrap::Parentheses => Expr::parenthesize(child),
            Wrap::Rename(name) => Expr::rename(child, name),
            Wrap::Named(name) => Expr::named(name, child),
            Wrap::Json { attribute, ty } => Expr::JsonAttribute(JsonAttribute {
                child: Box::new(child),
                attribute,
                ty,
            }),
        })
    }
}

// ============================================================================
// Relation builders
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProjectionBuilder {
    source: Option<Expr>,
    bindings: Vec<Expr>,
    row: TypeRef,
    flags: ProjectionFlags,
    source_row: Option<Parameter>,
    strip_join_wrappers: bool,
    /// Marks the projection as distinct instead of reshaping
    distinct_only: bool,
}

impl ProjectionBuilder {
    pub fn new(row: TypeRef, flags: ProjectionFlags, strip_join_wrappers: bool) -> Self {
        Self {
            source: None,
            bindings: Vec::new(),
            row,
            flags,
            source_row: None,
            strip_join_wrappers,
            distinct_only: false,
        }
    }

    /// A projection that only makes its source distinct
    pub fn distinct(row: TypeRef) -> Self {
        let flags = ProjectionFlags {
            distinct: true,
            ..Default::default()
        };
        Self {
            distinct_only: true,
            ..Self::new(row, flags, false)
        }
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if child.is_relation() {
            if self.source.is_some() {
                return Err(filled(NodeKind::Projection, "source"));
            }
            self.source = Some(child);
            return Ok(self);
        }
        let Some(source) = &self.source else {
            return Err(out_of_order(NodeKind::Projection, "binding", "source"));
        };
        let binding = restate_against(
            source,
            self.source_row.as_ref(),
            self.strip_join_wrappers,
            child,
        );
        self.bindings.push(binding);
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let source = self
            .source
            .ok_or_else(|| missing(NodeKind::Projection, "source"))?;
        if self.distinct_only {
            return Ok(match source {
                Expr::Projection(mut projection) => {
                    projection.flags.distinct = true;
                    Expr::Projection(projection)
                }
                other => Expr::Projection(Projection {
                    row: other.row_type(),
                    source: Box::new(other),
                    bindings: Vec::new(),
                    flags: self.flags,
                }),
            });
        }
        Ok(Expr::Projection(Projection {
            source: Box::new(aliased(source, self.source_row)),
            bindings: self.bindings,
            row: self.row,
            flags: self.flags,
        }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    source: Option<Expr>,
    predicate: Option<Expr>,
    row: Option<Parameter>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while no source has been applied
    pub fn awaiting_source(&self) -> bool {
        self.source.is_none()
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if child.is_relation() || matches!(child, Expr::Set(_) | Expr::Delete(_)) {
            if self.source.is_some() {
                return Err(filled(NodeKind::Filter, "source"));
            }
            self.source = Some(child);
            return Ok(self);
        }
        let Some(source) = &self.source else {
            return Err(out_of_order(NodeKind::Filter, "predicate", "source"));
        };
        let combined = match self.predicate.take() {
            None => child,
            Some(existing) => and_combine(existing, child),
        };
        self.predicate = Some(restate_against(
            source,
            self.row.as_ref(),
            false,
            combined,
        ));
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let source = self.source.ok_or_else(|| missing(NodeKind::Filter, "source"))?;
        let predicate = self
            .predicate
            .ok_or_else(|| missing(NodeKind::Filter, "predicate"))?;
        Ok(Expr::Filter(Filter {
            source: Box::new(aliased(source, self.row)),
            predicate: Box::new(predicate),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct JoinBuilder {
    kind: JoinKind,
    left: Option<Expr>,
    right: Option<Expr>,
    on: Option<Expr>,
    /// Symbols the on-lambda binds to, left then right
    side_rows: Option<(Parameter, Parameter)>,
}

impl JoinBuilder {
    pub fn new(kind: JoinKind) -> Self {
        Self {
            kind,
            left: None,
            right: None,
            on: None,
            side_rows: None,
        }
    }

    pub fn sides_ready(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }

    /// Make both sides addressable and return the symbols bound to them.
    ///
    /// A side without a row symbol gets `mint(row type)` and is wrapped in a
    /// named source; a nested join keeps its shape and the minted pair symbol
    /// is restated through the nested sides when the predicate arrives.
    pub fn bind_sides(
        &mut self,
        mint: &mut dyn FnMut(TypeRef) -> Parameter,
    ) -> TranslateResult<(Parameter, Parameter)> {
        if let Some(rows) = &self.side_rows {
            return Ok(rows.clone());
        }
        let mut bind = |slot: &mut Option<Expr>, name: &'static str| -> TranslateResult<Parameter> {
            let side = slot.take().ok_or_else(|| missing(NodeKind::Join, name))?;
            let (side, row) = match side.row_parameter().cloned() {
                Some(row) => (side, row),
                None if matches!(side, Expr::Join(_)) => {
                    let row = mint(side.row_type());
                    (side, row)
                }
                None => {
                    let row = mint(side.row_type());
                    (Expr::named_source(side, row.clone()), row)
                }
            };
            *slot = Some(side);
            Ok(row)
        };
        let left = bind(&mut self.left, "left")?;
        let right = bind(&mut self.right, "right")?;
        self.side_rows = Some((left.clone(), right.clone()));
        Ok((left, right))
    }

    fn restate_on(&self, mut on: Expr) -> Expr {
        let (Some((left_row, right_row)), Some(left), Some(right)) =
            (&self.side_rows, &self.left, &self.right)
        else {
            return on;
        };
        for (side, row) in [(left, left_row), (right, right_row)] {
            if matches!(side, Expr::Join(_)) {
                if let Some(replacement) = JoinBindingReplacement::for_join(side, row, false) {
                    on = replacement.rewrite(on);
                }
            }
        }
        on
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if child.is_relation() {
            if self.left.is_none() {
                self.left = Some(child);
            } else if self.right.is_none() {
                self.right = Some(child);
            } else {
                return Err(filled(NodeKind::Join, "right"));
            }
            return Ok(self);
        }
        if !self.sides_ready() {
            return Err(out_of_order(NodeKind::Join, "on", "right"));
        }
        if self.on.is_some() {
            return Err(filled(NodeKind::Join, "on"));
        }
        self.on = Some(self.restate_on(child));
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let left = self.left.ok_or_else(|| missing(NodeKind::Join, "left"))?;
        let right = self.right.ok_or_else(|| missing(NodeKind::Join, "right"))?;
        let on = self.on.ok_or_else(|| missing(NodeKind::Join, "on"))?;
        Ok(Expr::Join(super::Join {
            kind: self.kind,
            row: TypeRef::pair(left.row_type(), right.row_type()),
            left: Box::new(left),
            right: Box::new(right),
            on: Box::new(on),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct GroupByBuilder {
    source: Option<Expr>,
    keys: Option<Expr>,
    values: Option<Expr>,
    row: TypeRef,
    source_row: Option<Parameter>,
}

impl GroupByBuilder {
    pub fn new(row: TypeRef) -> Self {
        Self {
            source: None,
            keys: None,
            values: None,
            row,
            source_row: None,
        }
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if child.is_relation() {
            if self.source.is_some() {
                return Err(filled(NodeKind::GroupBy, "source"));
            }
            self.source = Some(child);
            return Ok(self);
        }
        let Some(source) = &self.source else {
            return Err(out_of_order(NodeKind::GroupBy, "keys", "source"));
        };
        let child = restate_against(source, self.source_row.as_ref(), false, child);
        if self.keys.is_none() {
            self.keys = Some(child);
        } else if self.values.is_none() {
            self.values = Some(child);
        } else {
            return Err(filled(NodeKind::GroupBy, "values"));
        }
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let source = self.source.ok_or_else(|| missing(NodeKind::GroupBy, "source"))?;
        let keys = self.keys.ok_or_else(|| missing(NodeKind::GroupBy, "keys"))?;
        let source = aliased(source, self.source_row);
        Ok(Expr::GroupBy(GroupBy {
            element_row: source.row_parameter().cloned(),
            source: Box::new(source),
            keys: Box::new(keys),
            values: self.values.map(Box::new),
            row: self.row,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct OrderByBuilder {
    source: Option<Expr>,
    bindings: Vec<OrderByBinding>,
    row: Option<Parameter>,
    /// Opened by a `ThenBy*` whose leading ordering has not been walked yet
    awaiting_head: bool,
}

impl OrderByBuilder {
    pub fn new(awaiting_head: bool) -> Self {
        Self {
            source: None,
            bindings: Vec::new(),
            row: None,
            awaiting_head,
        }
    }

    pub fn awaiting_head(&self) -> bool {
        self.awaiting_head
    }

    /// The leading ordering is now being walked into this scope
    pub fn take_head(&mut self) {
        self.awaiting_head = false;
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        match child {
            Expr::OrderByBinding(binding) => {
                let Some(source) = &self.source else {
                    return Err(out_of_order(NodeKind::OrderBy, "binding", "source"));
                };
                let expr = restate_against(source, self.row.as_ref(), false, *binding.expr);
                self.bindings.push(OrderByBinding {
                    expr: Box::new(expr),
                    direction: binding.direction,
                });
            }
            relation => {
                if self.source.is_some() {
                    return Err(filled(NodeKind::OrderBy, "source"));
                }
                self.source = Some(relation);
            }
        }
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let source = self.source.ok_or_else(|| missing(NodeKind::OrderBy, "source"))?;
        if self.bindings.is_empty() {
            return Err(missing(NodeKind::OrderBy, "bindings"));
        }
        Ok(Expr::OrderBy(OrderBy {
            source: Box::new(aliased(source, self.row)),
            bindings: self.bindings,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct OrderKeyBuilder {
    direction: Direction,
    expr: Option<Expr>,
}

impl OrderKeyBuilder {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            expr: None,
        }
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if self.expr.is_some() {
            return Err(filled(NodeKind::OrderByBinding, "key"));
        }
        self.expr = Some(child);
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let expr = self
            .expr
            .ok_or_else(|| missing(NodeKind::OrderByBinding, "key"))?;
        Ok(Expr::OrderByBinding(OrderByBinding {
            expr: Box::new(expr),
            direction: self.direction,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct LimitBuilder {
    fetch: u64,
    source: Option<Expr>,
}

impl LimitBuilder {
    pub fn new(fetch: u64) -> Self {
        Self {
            fetch,
            source: None,
        }
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        if self.source.is_some() {
            return Err(filled(NodeKind::RowsFetchLimit, "source"));
        }
        self.source = Some(child);
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let source = self
            .source
            .ok_or_else(|| missing(NodeKind::RowsFetchLimit, "source"))?;
        Ok(Expr::RowsFetchLimit(RowsFetchLimit {
            source: Box::new(source),
            fetch: self.fetch,
        }))
    }
}

// ============================================================================
// Mutation builders
// ============================================================================

#[derive(Debug, Clone)]
pub struct InsertBuilder {
    target: TypeRef,
    behavior: ConflictBehavior,
    columns: Vec<String>,
    rows: Vec<Values>,
}

impl InsertBuilder {
    pub fn new(target: TypeRef, behavior: ConflictBehavior, columns: Vec<String>) -> Self {
        Self {
            target,
            behavior,
            columns,
            rows: Vec::new(),
        }
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        match child {
            Expr::Values(values) => {
                self.rows.push(values);
                Ok(self)
            }
            other => Err(incompatible(NodeKind::Insert, &other)),
        }
    }

    fn finish_insert(self) -> TranslateResult<Insert> {
        if self.rows.is_empty() {
            return Err(missing(NodeKind::Insert, "rows"));
        }
        Ok(Insert {
            target: self.target,
            behavior: self.behavior,
            columns: self.columns,
            rows: self.rows,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValuesBuilder {
    placeholders: Vec<QueryParameter>,
}

impl ValuesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        match child {
            Expr::QueryParameter(param) => {
                self.placeholders.push(param);
                Ok(self)
            }
            other => Err(incompatible(NodeKind::Values, &other)),
        }
    }
}

fn is_assignment(expr: &Expr) -> bool {
    matches!(expr, Expr::Binary(b) if b.op == BinaryOp::Assign)
}

#[derive(Debug, Clone, Default)]
pub struct SetBuilder {
    target: Option<Expr>,
    assignments: Vec<Expr>,
    row: Option<Parameter>,
}

impl SetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn awaiting_target(&self) -> bool {
        self.target.is_none()
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        match child {
            Expr::QuerySource(_) | Expr::NamedSource(_) => {
                if self.target.is_some() {
                    return Err(filled(NodeKind::Set, "target"));
                }
                self.target = Some(child);
            }
            Expr::Binary(_) if is_assignment(&child) => {
                if self.target.is_none() {
                    return Err(out_of_order(NodeKind::Set, "assignment", "target"));
                }
                self.assignments.push(child);
            }
            other => return Err(incompatible(NodeKind::Set, &other)),
        }
        Ok(self)
    }

    fn finish(self) -> TranslateResult<Expr> {
        let target = self.target.ok_or_else(|| missing(NodeKind::Set, "target"))?;
        if self.assignments.is_empty() {
            return Err(missing(NodeKind::Set, "assignments"));
        }
        Ok(Expr::Set(Set {
            target: Box::new(aliased(target, self.row)),
            assignments: self.assignments,
        }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchBuilder {
    inserts: Vec<Insert>,
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(mut self, child: Expr) -> TranslateResult<Self> {
        match child {
            Expr::Insert(insert) => {
                self.inserts.push(insert);
                Ok(self)
            }
            other => Err(incompatible(NodeKind::Batch, &other)),
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// An open composite node.
#[derive(Debug, Clone)]
pub enum Builder {
    Binary(BinaryBuilder),
    Unary(UnaryBuilder),
    Conditional(ConditionalBuilder),
    MethodCall(MethodCallBuilder),
    New(NewBuilder),
    InList(InListBuilder),
    Binding(BindingBuilder),
    Wrapper(WrapperBuilder),
    Projection(ProjectionBuilder),
    Filter(FilterBuilder),
    Join(JoinBuilder),
    GroupBy(GroupByBuilder),
    OrderBy(OrderByBuilder),
    OrderKey(OrderKeyBuilder),
    Limit(LimitBuilder),
    Insert(InsertBuilder),
    Values(ValuesBuilder),
    Set(SetBuilder),
    Batch(BatchBuilder),
}

impl Builder {
    /// Kind of the node this builder produces
    pub fn kind(&self) -> NodeKind {
        match self {
            Builder::Binary(_) => NodeKind::Binary,
            Builder::Unary(_) => NodeKind::Unary,
            Builder::Conditional(_) => NodeKind::Conditional,
            Builder::MethodCall(_) => NodeKind::MethodCall,
            Builder::New(_) => NodeKind::New,
            Builder::InList(_) => NodeKind::InList,
            Builder::Binding(_) => NodeKind::SimpleBinding,
            Builder::Wrapper(w) => w.kind(),
            Builder::Projection(_) => NodeKind::Projection,
            Builder::Filter(_) => NodeKind::Filter,
            Builder::Join(_) => NodeKind::Join,
            Builder::GroupBy(_) => NodeKind::GroupBy,
            Builder::OrderBy(_) => NodeKind::OrderBy,
            Builder::OrderKey(_) => NodeKind::OrderByBinding,
            Builder::Limit(_) => NodeKind::RowsFetchLimit,
            Builder::Insert(_) => NodeKind::Insert,
            Builder::Values(_) => NodeKind::Values,
            Builder::Set(_) => NodeKind::Set,
            Builder::Batch(_) => NodeKind::Batch,
        }
    }

    /// Attach a closed child, consuming the builder.
    ///
    /// Fails with [`ProtocolError::Incompatible`] when the kinds do not
    /// match and with a slot error when the target slot is taken or a
    /// preceding slot is still empty.
    pub fn apply(self, child: Expr) -> TranslateResult<Builder> {
        let parent = self.kind();
        if !accepts(parent, child.kind()) {
            return Err(incompatible(parent, &child));
        }
        Ok(match self {
            Builder::Binary(b) => Builder::Binary(b.apply(child)?),
            Builder::Unary(b) => Builder::Unary(b.apply(child)?),
            Builder::Conditional(b) => Builder::Conditional(b.apply(child)?),
            Builder::MethodCall(b) => Builder::MethodCall(b.apply(child)?),
            Builder::New(b) => Builder::New(b.apply(child)?),
            Builder::InList(b) => Builder::InList(b.apply(child)?),
            Builder::Binding(b) => Builder::Binding(b.apply(child)?),
            Builder::Wrapper(b) => Builder::Wrapper(b.apply(child)?),
            Builder::Projection(b) => Builder::Projection(b.apply(child)?),
            Builder::Filter(b) => Builder::Filter(b.apply(child)?),
            Builder::Join(b) => Builder::Join(b.apply(child)?),
            Builder::GroupBy(b) => Builder::GroupBy(b.apply(child)?),
            Builder::OrderBy(b) => Builder::OrderBy(b.apply(child)?),
            Builder::OrderKey(b) => Builder::OrderKey(b.apply(child)?),
            Builder::Limit(b) => Builder::Limit(b.apply(child)?),
            Builder::Insert(b) => Builder::Insert(b.apply(child)?),
            Builder::Values(b) => Builder::Values(b.apply(child)?),
            Builder::Set(b) => Builder::Set(b.apply(child)?),
            Builder::Batch(b) => Builder::Batch(b.apply(child)?),
        })
    }

    /// Produce the immutable node
    pub fn finish(self) -> TranslateResult<Expr> {
        match self {
            Builder::Binary(b) => b.finish(),
            Builder::Unary(b) => b.finish(),
            Builder::Conditional(b) => b.finish(),
            Builder::MethodCall(b) => b.finish(),
            Builder::New(b) => b.finish(),
            Builder::InList(b) => b.finish(),
            Builder::Binding(b) => b.finish(),
            Builder::Wrapper(b) => b.finish(),
            Builder::Projection(b) => b.finish(),
            Builder::Filter(b) => b.finish(),
            Builder::Join(b) => b.finish(),
            Builder::GroupBy(b) => b.finish(),
            Builder::OrderBy(b) => b.finish(),
            Builder::OrderKey(b) => b.finish(),
            Builder::Limit(b) => b.finish(),
            Builder::Insert(b) => b.finish_insert().map(Expr::Insert),
            Builder::Values(b) => Ok(Expr::Values(Values {
                placeholders: b.placeholders,
            })),
            Builder::Set(b) => b.finish(),
            Builder::Batch(b) => {
                if b.inserts.is_empty() {
                    return Err(missing(NodeKind::Batch, "inserts"));
                }
                Ok(Expr::Batch(Batch { inserts: b.inserts }))
            }
        }
    }

    /// The relation this builder reads rows from, once applied
    pub fn source(&self) -> Option<&Expr> {
        match self {
            Builder::Projection(b) => b.source.as_ref(),
            Builder::Filter(b) => b.source.as_ref(),
            Builder::GroupBy(b) => b.source.as_ref(),
            Builder::OrderBy(b) => b.source.as_ref(),
            Builder::Limit(b) => b.source.as_ref(),
            Builder::Set(b) => b.target.as_ref(),
            _ => None,
        }
    }

    /// True while a relation builder still waits for the rows it reads
    pub fn awaiting_source(&self) -> bool {
        match self {
            Builder::Projection(b) => b.source.is_none(),
            Builder::Filter(b) => b.awaiting_source(),
            Builder::Join(b) => !b.sides_ready(),
            Builder::GroupBy(b) => b.source.is_none(),
            Builder::OrderBy(b) => b.source.is_none(),
            Builder::Limit(b) => b.source.is_none(),
            Builder::Set(b) => b.awaiting_target(),
            _ => false,
        }
    }

    /// Row symbols expressions inside this scope may reference
    pub fn visible_rows(&self) -> Vec<&Parameter> {
        let own = match self {
            Builder::Projection(b) => b.source_row.as_ref(),
            Builder::Filter(b) => b.row.as_ref(),
            Builder::GroupBy(b) => b.source_row.as_ref(),
            Builder::OrderBy(b) => b.row.as_ref(),
            Builder::Set(b) => b.row.as_ref(),
            Builder::Join(b) => {
                return match &b.side_rows {
                    Some((left, right)) => vec![left, right],
                    None => Vec::new(),
                }
            }
            _ => None,
        };
        own.or_else(|| self.source().and_then(Expr::row_parameter))
            .into_iter()
            .collect()
    }

    /// Attach a freshly minted row symbol for this scope's source.
    ///
    /// Returns false when this scope cannot own a row symbol.
    pub fn set_row(&mut self, row: Parameter) -> bool {
        let slot = match self {
            Builder::Projection(b) if !b.distinct_only => &mut b.source_row,
            Builder::Filter(b) => &mut b.row,
            Builder::GroupBy(b) => &mut b.source_row,
            Builder::OrderBy(b) => &mut b.row,
            Builder::Set(b) => &mut b.row,
            _ => return false,
        };
        *slot = Some(row);
        true
    }
}
