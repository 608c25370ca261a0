//! Host tree walker.
//!
//! A closed-world visitor: every host node kind and every recognized
//! operator has exactly one rule, and anything else is an unsupported shape.
//! Lambda parameters are resolved through an explicit lexical [`Env`]
//! threaded through the recursion; intermediate nodes are built on the
//! [`TranslationContext`] scope stack.

use crate::config::TranslatorConfig;
use crate::context::TranslationContext;
use crate::error::{TranslateError, TranslateResult};
use crate::host::{HostExpr, HostParam, HostPath, Lambda, ENUMERABLE, QUERYABLE};
use crate::ir::builder::{
    BatchBuilder, BinaryBuilder, BindingBuilder, Builder, ConditionalBuilder, FilterBuilder,
    GroupByBuilder, InListBuilder, InsertBuilder, JoinBuilder, LimitBuilder, MethodCallBuilder,
    NewBuilder, OrderByBuilder, OrderKeyBuilder, ProjectionBuilder, SetBuilder, UnaryBuilder,
    ValuesBuilder, Wrap, WrapperBuilder,
};
use crate::ir::{
    ConflictBehavior, Delete, Direction, Expr, GroupBy, JoinKind, Parameter, ProjectionFlags,
};
use crate::params::{path_extractor, ParameterMap};
use crate::recognize::{Recognition, RecognizerRegistry};
use crate::types::{BinaryOp, MemberKey, MemberRef, MethodRef, TypeRef, UnaryOp, GROUPING_KEY};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

/// Host scalar methods with a direct function equivalent
static SCALAR_FUNCTIONS: Lazy<HashMap<MemberKey, &'static str>> = Lazy::new(|| {
    [
        ("String", "StartsWith", "starts_with"),
        ("String", "EndsWith", "ends_with"),
        ("String", "Contains", "contains"),
        ("String", "ToUpper", "upper"),
        ("String", "ToLower", "lower"),
        ("String", "Trim", "trim"),
        ("String", "Substring", "substring"),
        ("String", "Replace", "replace"),
        ("Math", "Abs", "abs"),
        ("Math", "Round", "round"),
        ("Math", "Floor", "floor"),
        ("Math", "Ceiling", "ceiling"),
    ]
    .into_iter()
    .map(|(owner, name, function)| (MemberKey::new(owner, name), function))
    .collect()
});

fn signature(method: &MethodRef, receiver: Option<&HostExpr>, args: &[HostExpr]) -> String {
    let types: Vec<String> = receiver
        .into_iter()
        .chain(args)
        .map(|arg| arg.ty().name())
        .collect();
    format!("{method}({})", types.join(", "))
}

fn is_ordering(node: &HostExpr) -> bool {
    matches!(
        node,
        HostExpr::Call { method, receiver: None, .. }
            if ["OrderBy", "OrderByDescending", "ThenBy", "ThenByDescending"]
                .iter()
                .any(|name| method.is(QUERYABLE, name))
    )
}

/// The grouping a relation's rows come from, looking through row-preserving wrappers
fn grouping_of(expr: &Expr) -> Option<&GroupBy> {
    match expr {
        Expr::GroupBy(group) => Some(group),
        Expr::Filter(filter) => grouping_of(&filter.source),
        Expr::OrderBy(order) => grouping_of(&order.source),
        Expr::RowsFetchLimit(limit) => grouping_of(&limit.source),
        Expr::NamedSource(named) => grouping_of(&named.source),
        _ => None,
    }
}

// ============================================================================
// Lexical environment
// ============================================================================

/// What a host lambda parameter stands for.
#[derive(Debug, Clone)]
enum Bound {
    /// A row of the enclosing relation
    Row(Parameter),
    /// An already translated value (a grouping's element selector)
    Value(Expr),
    /// A group: `Key` resolves to the keys, aggregates range over the elements
    Grouping { keys: Expr, element: Box<Bound> },
}

/// Lambda parameter bindings, innermost first.
struct Env<'p> {
    parent: Option<&'p Env<'p>>,
    bindings: Vec<(String, Bound)>,
}

impl Env<'static> {
    fn root() -> Self {
        Env {
            parent: None,
            bindings: Vec::new(),
        }
    }
}

impl<'p> Env<'p> {
    fn extend(&'p self, bindings: Vec<(String, Bound)>) -> Env<'p> {
        Env {
            parent: Some(self),
            bindings,
        }
    }

    fn bind(&'p self, param: &HostParam, bound: Bound) -> Env<'p> {
        self.extend(vec![(param.name.clone(), bound)])
    }

    fn lookup(&self, name: &str) -> Option<&Bound> {
        self.bindings
            .iter()
            .rev()
            .find(|(bound_name, _)| bound_name == name)
            .map(|(_, bound)| bound)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
    }

    /// True outside every lambda
    fn is_root(&self) -> bool {
        self.parent.is_none() && self.bindings.is_empty()
    }
}

// ============================================================================
// Operator arguments
// ============================================================================

/// A `Queryable` operator call being translated.
struct Operator<'h> {
    method: &'h MethodRef,
    args: &'h [HostExpr],
    path: &'h HostPath,
}

impl<'h> Operator<'h> {
    fn unsupported(&self) -> TranslateError {
        TranslateError::unsupported(signature(self.method, None, self.args))
    }

    fn arity(&self, counts: &[usize]) -> TranslateResult<()> {
        if counts.contains(&self.args.len()) {
            Ok(())
        } else {
            Err(self.unsupported())
        }
    }

    fn arg(&self, index: usize) -> TranslateResult<&'h HostExpr> {
        self.args.get(index).ok_or_else(|| self.unsupported())
    }

    fn lambda(&self, index: usize, params: usize) -> TranslateResult<&'h Lambda> {
        self.arg(index)?
            .as_lambda()
            .filter(|lambda| lambda.params.len() == params)
            .ok_or_else(|| self.unsupported())
    }

    /// The single parameter and body of a one-parameter lambda argument
    fn unary_lambda(&self, index: usize) -> TranslateResult<(&'h HostParam, &'h HostExpr)> {
        let lambda = self.lambda(index, 1)?;
        match lambda.params.as_slice() {
            [param] => Ok((param, lambda.body.as_ref())),
            _ => Err(self.unsupported()),
        }
    }

    /// The target entity of a mutation operator
    fn target(&self) -> TranslateResult<&'h TypeRef> {
        match self.arg(0)? {
            HostExpr::Source(entity) => Ok(entity),
            _ => Err(self.unsupported()),
        }
    }

    fn path(&self, index: usize) -> HostPath {
        self.path.child(index)
    }
}

// ============================================================================
// Walker
// ============================================================================

pub(crate) struct Walker<'t> {
    ctx: TranslationContext<'t>,
    recognizers: &'t RecognizerRegistry,
}

impl<'t> Walker<'t> {
    pub fn new(config: &'t TranslatorConfig, recognizers: &'t RecognizerRegistry) -> Self {
        Self {
            ctx: TranslationContext::new(config),
            recognizers,
        }
    }

    /// Translate a query rooted at a queryable source or operator
    pub fn translate(mut self, host: &HostExpr) -> TranslateResult<(Expr, ParameterMap)> {
        match host {
            HostExpr::Source(_) => {}
            HostExpr::Call {
                method,
                receiver: None,
                ..
            } if method.owner.eq_ignore_ascii_case(QUERYABLE) => {}
            other => {
                return Err(TranslateError::unsupported(format!(
                    "query rooted at a {} value",
                    other.ty()
                )))
            }
        }
        self.walk(host, &HostPath::root(), &Env::root())?;
        self.ctx.finish()
    }

    fn walk(&mut self, node: &HostExpr, path: &HostPath, env: &Env<'_>) -> TranslateResult<()> {
        if self.parameterizes(node) {
            let placeholder = self.placeholder(node, path);
            return self.ctx.emit(placeholder);
        }
        match node {
            HostExpr::Source(entity) => self.source(entity, env),
            HostExpr::Constant { value, ty } => {
                if value.is_null() || !self.ctx.config().parameterize_constants {
                    self.ctx.emit(Expr::constant(value.clone(), ty.clone()))
                } else {
                    let placeholder = self.placeholder(node, path);
                    self.ctx.emit(placeholder)
                }
            }
            HostExpr::Parameter(param) => self.parameter(param, env),
            HostExpr::Lambda(_) => Err(TranslateError::unsupported(
                "lambda outside an operator argument",
            )),
            HostExpr::Member { receiver, member } => {
                self.member(receiver.as_deref(), member, path, env)
            }
            HostExpr::Call {
                method,
                receiver,
                args,
                ty,
            } => self.call(method, receiver.as_deref(), args, ty, path, env),
            HostExpr::Binary {
                op,
                left,
                right,
                ty,
            } => {
                self.ctx
                    .open(Builder::Binary(BinaryBuilder::new(*op, Some(ty.clone()))));
                self.walk(left, &path.child(0), env)?;
                self.walk(right, &path.child(1), env)?;
                self.ctx.close()
            }
            HostExpr::Unary {
                op: UnaryOp::Convert,
                operand,
                ty,
            } if ty.is_lifting_of(&operand.ty()) => self.walk(operand, &path.child(0), env),
            HostExpr::Unary { op, operand, ty } => {
                self.ctx
                    .open(Builder::Unary(UnaryBuilder::new(*op, ty.clone())));
                self.walk(operand, &path.child(0), env)?;
                self.ctx.close()
            }
            HostExpr::Conditional {
                test,
                if_true,
                if_false,
                ty,
            } => {
                self.ctx
                    .open(Builder::Conditional(ConditionalBuilder::new(ty.clone())));
                self.walk(test, &path.child(0), env)?;
                self.walk(if_true, &path.child(1), env)?;
                self.walk(if_false, &path.child(2), env)?;
                self.ctx.close()
            }
            HostExpr::New { ty, args, members } => {
                self.ctx.open(Builder::New(NewBuilder::new(ty.clone())));
                self.members(args, members, path, env)?;
                self.ctx.close()
            }
        }
    }

    /// Literal-only operator sub-trees become a single query parameter
    fn parameterizes(&self, node: &HostExpr) -> bool {
        self.ctx.config().parameterize_constants
            && matches!(
                node,
                HostExpr::Binary { .. } | HostExpr::Unary { .. } | HostExpr::Conditional { .. }
            )
            && node.evaluate().is_some_and(|value| !value.is_null())
    }

    fn placeholder(&mut self, node: &HostExpr, path: &HostPath) -> Expr {
        self.ctx
            .query_parameter(node.ty(), Some(path_extractor(path.clone())))
    }

    /// Translate `node` on its own and return the finished node
    fn detached(&mut self, node: &HostExpr, path: &HostPath, env: &Env<'_>) -> TranslateResult<Expr> {
        let outer = self.ctx.suspend();
        let result = self
            .walk(node, path, env)
            .and_then(|()| self.ctx.take_root());
        self.ctx.resume(outer);
        result
    }

    /// Apply constructor arguments to the open scope, naming them by member
    fn members(
        &mut self,
        args: &[HostExpr],
        names: &[String],
        path: &HostPath,
        env: &Env<'_>,
    ) -> TranslateResult<()> {
        if args.len() != names.len() {
            return Err(TranslateError::unsupported(format!(
                "constructor with {} arguments for {} members",
                args.len(),
                names.len()
            )));
        }
        for (index, (arg, name)) in args.iter().zip(names).enumerate() {
            let value = self.detached(arg, &path.child(index), env)?;
            let value = if value.output_name() == Some(name.as_str()) {
                value
            } else {
                Expr::named(name.clone(), value)
            };
            self.ctx.emit(value)?;
        }
        Ok(())
    }

    fn source(&mut self, entity: &TypeRef, env: &Env<'_>) -> TranslateResult<()> {
        if !env.is_root() {
            return Err(TranslateError::unsupported(format!(
                "query over {entity} inside a lambda"
            )));
        }
        let table = Expr::source(entity.clone());
        // Nested directly only under a projection or as a mutation target
        let nests = matches!(
            self.ctx.top(),
            Some(top @ (Builder::Projection(_) | Builder::Set(_))) if top.awaiting_source()
        );
        if nests {
            return self.ctx.emit(table);
        }
        // Anywhere else an un-projected source selects everything
        let strip = self.ctx.config().strip_join_wrappers;
        self.ctx.open(Builder::Projection(ProjectionBuilder::new(
            entity.clone(),
            ProjectionFlags::default(),
            strip,
        )));
        self.ctx.emit(table)?;
        self.ctx.close()
    }

    fn parameter(&mut self, param: &HostParam, env: &Env<'_>) -> TranslateResult<()> {
        let expr = match env.lookup(&param.name) {
            Some(Bound::Row(row)) => row.to_expr(),
            Some(Bound::Value(value)) => value.clone(),
            Some(Bound::Grouping { .. }) => {
                return Err(TranslateError::unsupported(format!(
                    "grouping '{}' used as a value",
                    param.name
                )))
            }
            None => {
                return Err(TranslateError::UnboundParameter {
                    name: param.name.clone(),
                })
            }
        };
        self.ctx.emit(expr)
    }

    fn member(
        &mut self,
        receiver: Option<&HostExpr>,
        member: &MemberRef,
        path: &HostPath,
        env: &Env<'_>,
    ) -> TranslateResult<()> {
        if let Some(HostExpr::Parameter(param)) = receiver {
            if let Some(Bound::Grouping { keys, .. }) = env.lookup(&param.name) {
                if member.is_named(GROUPING_KEY) {
                    return self.ctx.emit(keys.clone());
                }
                return Err(TranslateError::unsupported(member.qualified()));
            }
        }

        if let Some(recognition) = self.recognizers.recognize(member, receiver.is_some())? {
            return match recognition {
                Recognition::Call { function, ty } => {
                    self.ctx.open(Builder::MethodCall(MethodCallBuilder::new(
                        function,
                        ty,
                        receiver.is_some(),
                    )));
                    if let Some(receiver) = receiver {
                        self.walk(receiver, &path.child(0), env)?;
                    }
                    self.ctx.close()
                }
                Recognition::Constant { value, ty } => self.ctx.emit(Expr::constant(value, ty)),
                Recognition::Special { text, ty } => self.ctx.emit(Expr::special(text, ty)),
            };
        }

        let Some(receiver) = receiver else {
            return Err(TranslateError::unsupported(member.qualified()));
        };
        let builder = if receiver.ty().is_json() {
            Builder::Wrapper(WrapperBuilder::new(Wrap::Json {
                attribute: member.name.clone(),
                ty: member.ty.clone(),
            }))
        } else {
            Builder::Binding(BindingBuilder::new(member.clone()))
        };
        self.ctx.open(builder);
        self.walk(receiver, &path.child(0), env)?;
        self.ctx.close()
    }

    fn call(
        &mut self,
        method: &MethodRef,
        receiver: Option<&HostExpr>,
        args: &[HostExpr],
        ty: &TypeRef,
        path: &HostPath,
        env: &Env<'_>,
    ) -> TranslateResult<()> {
        if method.owner.eq_ignore_ascii_case(QUERYABLE) && receiver.is_none() {
            if !env.is_root() {
                return Err(TranslateError::unsupported(signature(method, None, args)));
            }
            let op = Operator { method, args, path };
            return self.operator(&op, ty.element().clone(), env);
        }
        if method.owner.eq_ignore_ascii_case(ENUMERABLE) {
            return self.sequence_method(method, receiver, args, ty, path, env);
        }

        let key = MemberKey::new(&method.owner, &method.name);
        let Some(function) = SCALAR_FUNCTIONS.get(&key).copied() else {
            return Err(TranslateError::unsupported(signature(method, receiver, args)));
        };
        self.ctx.open(Builder::MethodCall(MethodCallBuilder::new(
            function,
            ty.clone(),
            receiver.is_some(),
        )));
        let operands = receiver.into_iter().chain(args);
        for (index, operand) in operands.enumerate() {
            self.walk(operand, &path.child(index), env)?;
        }
        self.ctx.close()
    }

    // ------------------------------------------------------------------------
    // Lambdas
    // ------------------------------------------------------------------------

    /// What a lambda parameter of type `ty` over the top scope's rows binds to
    fn row_binding(&mut self, ty: &TypeRef) -> TranslateResult<Bound> {
        if !matches!(ty.non_nullable(), TypeRef::Grouping { .. }) {
            return Ok(Bound::Row(self.ctx.resolve_row(ty)));
        }
        let group = self
            .ctx
            .top()
            .and_then(Builder::source)
            .and_then(grouping_of)
            .ok_or_else(|| TranslateError::unsupported(format!("{ty} over an ungrouped source")))?;
        let element = match (&group.values, &group.element_row) {
            (Some(values), _) => Bound::Value(values.as_ref().clone()),
            (None, Some(row)) => Bound::Row(row.clone()),
            (None, None) => {
                return Err(TranslateError::unsupported(format!(
                    "{ty} without addressable elements"
                )))
            }
        };
        Ok(Bound::Grouping {
            keys: group.keys.as_ref().clone(),
            element: Box::new(element),
        })
    }

    /// Bind a one-parameter lambda argument to the top scope's rows and walk its body.
    ///
    /// With `wrap`, that builder is opened around the body once the
    /// parameter is bound.
    fn row_lambda(
        &mut self,
        op: &Operator<'_>,
        index: usize,
        env: &Env<'_>,
        wrap: Option<Builder>,
    ) -> TranslateResult<()> {
        let (param, body) = op.unary_lambda(index)?;
        let bound = self.row_binding(&param.ty)?;
        let inner = env.bind(param, bound);
        let wrapped = wrap.is_some();
        if let Some(builder) = wrap {
            self.ctx.open(builder);
        }
        self.walk(body, &op.path(index).child(0), &inner)?;
        if wrapped {
            self.ctx.close()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queryable operators
    // ------------------------------------------------------------------------

    fn operator(&mut self, op: &Operator<'_>, row: TypeRef, env: &Env<'_>) -> TranslateResult<()> {
        tracing::trace!(operator = %op.method, "walk operator");
        match op.method.name.to_ascii_lowercase().as_str() {
            "select" => self.select(op, row, env),
            "where" => self.filter(op, env),
            "orderby" => self.order_by(op, Direction::Ascending, false, env),
            "orderbydescending" => self.order_by(op, Direction::Descending, false, env),
            "thenby" => self.order_by(op, Direction::Ascending, true, env),
            "thenbydescending" => self.order_by(op, Direction::Descending, true, env),
            "take" => self.take(op, env),
            "first" | "firstordefault" => self.first(op, env),
            "distinct" => self.distinct(op, row, env),
            "join" => self.join(op, JoinKind::Inner, env),
            "leftjoin" => self.join(op, JoinKind::Left, env),
            "groupby" => self.group_by(op, row, env),
            "insert" => self.insert(op, ConflictBehavior::Fail),
            "insertorignore" => self.insert(op, ConflictBehavior::Ignore),
            "insertorreplace" => self.insert(op, ConflictBehavior::Replace),
            "updateset" => {
                op.arity(&[2])?;
                self.set(op, env)
            }
            "updatewhere" => {
                op.arity(&[3])?;
                self.ctx.open(Builder::Filter(FilterBuilder::new()));
                self.set(op, env)?;
                self.row_lambda(op, 2, env, None)?;
                self.ctx.close()
            }
            "delete" => {
                op.arity(&[1])?;
                let target = op.target()?.clone();
                self.ctx.emit(Expr::Delete(Delete { target }))
            }
            "deletewhere" => {
                op.arity(&[2])?;
                let target = op.target()?.clone();
                self.ctx.open(Builder::Filter(FilterBuilder::new()));
                self.ctx.emit(Expr::Delete(Delete { target }))?;
                self.row_lambda(op, 1, env, None)?;
                self.ctx.close()
            }
            _ => Err(op.unsupported()),
        }
    }

    fn select(&mut self, op: &Operator<'_>, row: TypeRef, env: &Env<'_>) -> TranslateResult<()> {
        op.arity(&[2])?;
        let (param, body) = op.unary_lambda(1)?;
        let flags = match body {
            HostExpr::New { ty, .. } => ProjectionFlags {
                to_class: !ty.is_anonymous(),
                anonymous: ty.is_anonymous(),
                distinct: false,
            },
            _ => ProjectionFlags::default(),
        };
        let strip = self.ctx.config().strip_join_wrappers;
        self.ctx
            .open(Builder::Projection(ProjectionBuilder::new(row, flags, strip)));
        self.walk(op.arg(0)?, &op.path(0), env)?;

        let identity = matches!(body, HostExpr::Parameter(p) if p.name == param.name);
        if !identity {
            let bound = self.row_binding(&param.ty)?;
            let inner = env.bind(param, bound);
            let body_path = op.path(1).child(0);
            match body {
                HostExpr::New { args, members, .. } => {
                    self.members(args, members, &body_path, &inner)?
                }
                other => self.walk(other, &body_path, &inner)?,
            }
        }
        self.ctx.close()
    }

    fn filter(&mut self, op: &Operator<'_>, env: &Env<'_>) -> TranslateResult<()> {
        op.arity(&[2])?;
        // Chained filters collapse into one AND-combined predicate
        let opened = self.ctx.open_unless(
            |top| matches!(top, Builder::Filter(filter) if filter.awaiting_source()),
            || Builder::Filter(FilterBuilder::new()),
        );
        self.walk(op.arg(0)?, &op.path(0), env)?;
        self.row_lambda(op, 1, env, None)?;
        if opened {
            self.ctx.close()?;
        }
        Ok(())
    }

    fn order_by(
        &mut self,
        op: &Operator<'_>,
        direction: Direction,
        then: bool,
        env: &Env<'_>,
    ) -> TranslateResult<()> {
        op.arity(&[2])?;
        let opened = if then {
            if !is_ordering(op.arg(0)?) {
                return Err(op.unsupported());
            }
            self.ctx.open_unless(
                |top| matches!(top, Builder::OrderBy(order) if order.awaiting_head()),
                || Builder::OrderBy(OrderByBuilder::new(true)),
            )
        } else {
            self.ctx.open_unless(
                |top| match top {
                    Builder::OrderBy(order) if order.awaiting_head() => {
                        order.take_head();
                        true
                    }
                    _ => false,
                },
                || Builder::OrderBy(OrderByBuilder::new(false)),
            )
        };
        self.walk(op.arg(0)?, &op.path(0), env)?;
        let key = Builder::OrderKey(OrderKeyBuilder::new(direction));
        self.row_lambda(op, 1, env, Some(key))?;
        if opened {
            self.ctx.close()?;
        }
        Ok(())
    }

    fn take(&mut self, op: &Operator<'_>, env: &Env<'_>) -> TranslateResult<()> {
        op.arity(&[2])?;
        let fetch = op
            .arg(1)?
            .literal()
            .and_then(Value::as_u64)
            .ok_or_else(|| op.unsupported())?;
        self.ctx.open(Builder::Limit(LimitBuilder::new(fetch)));
        self.walk(op.arg(0)?, &op.path(0), env)?;
        self.ctx.close()
    }

    fn first(&mut self, op: &Operator<'_>, env: &Env<'_>) -> TranslateResult<()> {
        op.arity(&[1, 2])?;
        self.ctx.open(Builder::Limit(LimitBuilder::new(1)));
        if op.args.len() == 2 {
            self.ctx.open(Builder::Filter(FilterBuilder::new()));
            self.walk(op.arg(0)?, &op.path(0), env)?;
            self.row_lambda(op, 1, env, None)?;
            self.ctx.close()?;
        } else {
            self.walk(op.arg(0)?, &op.path(0), env)?;
        }
        self.ctx.close()
    }

    fn distinct(&mut self, op: &Operator<'_>, row: TypeRef, env: &Env<'_>) -> TranslateResult<()> {
        op.arity(&[1])?;
        self.ctx
            .open(Builder::Projection(ProjectionBuilder::distinct(row)));
        self.walk(op.arg(0)?, &op.path(0), env)?;
        self.ctx.close()
    }

    fn join(&mut self, op: &Operator<'_>, kind: JoinKind, env: &Env<'_>) -> TranslateResult<()> {
        op.arity(&[3])?;
        let on = op.lambda(2, 2)?;
        let [left_param, right_param] = on.params.as_slice() else {
            return Err(op.unsupported());
        };
        self.ctx.open(Builder::Join(JoinBuilder::new(kind)));
        self.walk(op.arg(0)?, &op.path(0), env)?;
        self.walk(op.arg(1)?, &op.path(1), env)?;

        // Positional binding keeps the two sides of a self-join apart
        let (left, right) = self.ctx.join_side_rows()?;
        let inner = env.extend(vec![
            (left_param.name.clone(), Bound::Row(left)),
            (right_param.name.clone(), Bound::Row(right)),
        ]);
        self.walk(&on.body, &op.path(2).child(0), &inner)?;
        self.ctx.close()
    }

    fn group_by(&mut self, op: &Operator<'_>, row: TypeRef, env: &Env<'_>) -> TranslateResult<()> {
        op.arity(&[2, 3])?;
        self.ctx.open(Builder::GroupBy(GroupByBuilder::new(row)));
        self.walk(op.arg(0)?, &op.path(0), env)?;
        self.row_lambda(op, 1, env, None)?;
        if op.args.len() == 3 {
            // Element selector, once the keys are in place
            self.row_lambda(op, 2, env, None)?;
        }
        self.ctx.close()
    }

    fn insert(&mut self, op: &Operator<'_>, behavior: ConflictBehavior) -> TranslateResult<()> {
        let target = op.target()?;
        let Some(HostExpr::New {
            members: columns, ..
        }) = op.args.get(1)
        else {
            return Err(op.unsupported());
        };
        let rows = op.args[1..]
            .iter()
            .map(|row| match row {
                HostExpr::New { args, members, .. } if members == columns => Ok(args.as_slice()),
                _ => Err(op.unsupported()),
            })
            .collect::<TranslateResult<Vec<_>>>()?;

        let chunk = self.ctx.config().insert_chunk(rows.len());
        let batched = rows.len() > chunk;
        if batched {
            self.ctx.open(Builder::Batch(BatchBuilder::new()));
        }
        for (chunk_index, chunk_rows) in rows.chunks(chunk).enumerate() {
            self.ctx.open(Builder::Insert(InsertBuilder::new(
                target.clone(),
                behavior,
                columns.clone(),
            )));
            for (offset, args) in chunk_rows.iter().enumerate() {
                let row_path = op.path(1 + chunk_index * chunk + offset);
                self.ctx.open(Builder::Values(ValuesBuilder::new()));
                for (column, (arg, name)) in args.iter().zip(columns).enumerate() {
                    if arg.evaluate().is_none() {
                        return Err(TranslateError::unsupported(format!(
                            "non-literal value for {target}.{name}"
                        )));
                    }
                    let placeholder = self.placeholder(arg, &row_path.child(column));
                    self.ctx.emit(placeholder)?;
                }
                self.ctx.close()?;
            }
            self.ctx.close()?;
        }
        if batched {
            self.ctx.close()?;
        }
        Ok(())
    }

    /// `UpdateSet(Source(T), x => new T { A = .. })`
    fn set(&mut self, op: &Operator<'_>, env: &Env<'_>) -> TranslateResult<()> {
        let target = op.target()?;
        let (param, body) = op.unary_lambda(1)?;
        let HostExpr::New { args, members, .. } = body else {
            return Err(op.unsupported());
        };
        if args.len() != members.len() {
            return Err(op.unsupported());
        }

        self.ctx.open(Builder::Set(SetBuilder::new()));
        self.walk(op.arg(0)?, &op.path(0), env)?;
        let row = self.ctx.resolve_row(target);
        let inner = env.bind(param, Bound::Row(row.clone()));
        let body_path = op.path(1).child(0);
        for (index, (value, column)) in args.iter().zip(members).enumerate() {
            self.ctx
                .open(Builder::Binary(BinaryBuilder::new(BinaryOp::Assign, None)));
            let column = MemberRef::new(target, column.clone(), value.ty());
            self.ctx.emit(Expr::binding(row.to_expr(), column))?;
            self.walk(value, &body_path.child(index), &inner)?;
            self.ctx.close()?;
        }
        self.ctx.close()
    }

    // ------------------------------------------------------------------------
    // Enumerable methods inside lambda bodies
    // ------------------------------------------------------------------------

    fn sequence_method(
        &mut self,
        method: &MethodRef,
        receiver: Option<&HostExpr>,
        args: &[HostExpr],
        ty: &TypeRef,
        path: &HostPath,
        env: &Env<'_>,
    ) -> TranslateResult<()> {
        let unsupported = || TranslateError::unsupported(signature(method, receiver, args));
        let operands: Vec<&HostExpr> = receiver.into_iter().chain(args).collect();
        let name = method.name.to_ascii_lowercase();

        if name == "contains" {
            let [list, value] = operands.as_slice() else {
                return Err(unsupported());
            };
            self.ctx.open(Builder::InList(InListBuilder::new()));
            self.walk(value, &path.child(1), env)?;
            self.walk(list, &path.child(0), env)?;
            return self.ctx.close();
        }

        let function = match name.as_str() {
            "count" | "longcount" => "count",
            "sum" => "sum",
            "min" => "min",
            "max" => "max",
            "average" => "avg",
            _ => return Err(unsupported()),
        };
        let (group, selector) = match operands.as_slice() {
            [group] => (*group, None),
            [group, selector] if function != "count" => (*group, Some(*selector)),
            _ => return Err(unsupported()),
        };
        let HostExpr::Parameter(group) = group else {
            return Err(unsupported());
        };
        let Some(Bound::Grouping { element, .. }) = env.lookup(&group.name) else {
            return Err(unsupported());
        };
        let element = element.as_ref().clone();
        let argument = match (selector, element) {
            (Some(selector), element) => {
                let lambda = selector.as_lambda().ok_or_else(unsupported)?;
                let [param] = lambda.params.as_slice() else {
                    return Err(unsupported());
                };
                Some((lambda, param, element))
            }
            (None, _) if function == "count" => None,
            // Aggregate over the grouping's element selector
            (None, Bound::Value(value)) => {
                self.ctx.open(Builder::MethodCall(MethodCallBuilder::new(
                    function,
                    ty.clone(),
                    false,
                )));
                self.ctx.emit(value)?;
                return self.ctx.close();
            }
            (None, _) => return Err(unsupported()),
        };

        self.ctx.open(Builder::MethodCall(MethodCallBuilder::new(
            function,
            ty.clone(),
            false,
        )));
        if let Some((lambda, param, element)) = argument {
            let inner = env.bind(param, element);
            self.walk(&lambda.body, &path.child(1).child(0), &inner)?;
        }
        self.ctx.close()
    }
}
