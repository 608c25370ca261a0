//! Restating intermediate nodes as host expressions.
//!
//! Scalar nodes have a host equivalent; this is what constant folding
//! evaluates. Relation, mutation and binding-chain nodes exist only in the
//! intermediate algebra and refuse.

use super::Expr;
use crate::error::{TranslateError, TranslateResult};
use crate::host::{HostExpr, HostParam, ENUMERABLE};
use crate::types::{MemberRef, MethodRef, TypeRef};

/// Method owner used for restated scalar function calls
pub const FUNCTION_OWNER: &str = "Sql";

impl Expr {
    /// Restate this node as an equivalent host expression.
    ///
    /// Query parameters restate as host parameters of the same name, since
    /// their values are not part of the tree.
    pub fn to_host(&self) -> TranslateResult<HostExpr> {
        let restated = match self {
            Expr::Constant(c) => HostExpr::constant(c.value.clone(), c.ty.clone()),
            Expr::QueryParameter(p) => HostParam::new(format!("@{}", p.name), p.ty.clone()).expr(),
            Expr::Parameter(p) => HostParam::new(p.name.clone(), p.ty.clone()).expr(),
            Expr::SimpleBinding(b) => HostExpr::Member {
                receiver: Some(Box::new(b.source.to_host()?)),
                member: b.member.clone(),
            },
            Expr::NamedBinding(b) => b.binding.to_host()?,
            Expr::Binary(b) => HostExpr::Binary {
                op: b.op,
                left: Box::new(b.left.to_host()?),
                right: Box::new(b.right.to_host()?),
                ty: b.ty.clone(),
            },
            Expr::Unary(u) => HostExpr::unary(u.op, u.operand.to_host()?, u.ty.clone()),
            Expr::Conditional(c) => HostExpr::Conditional {
                test: Box::new(c.test.to_host()?),
                if_true: Box::new(c.if_true.to_host()?),
                if_false: Box::new(c.if_false.to_host()?),
                ty: c.ty.clone(),
            },
            Expr::MethodCall(m) => HostExpr::Call {
                method: MethodRef::new(FUNCTION_OWNER, m.name.clone()),
                receiver: match &m.receiver {
                    Some(receiver) => Some(Box::new(receiver.to_host()?)),
                    None => None,
                },
                args: m
                    .args
                    .iter()
                    .map(Expr::to_host)
                    .collect::<TranslateResult<_>>()?,
                ty: m.ty.clone(),
            },
            Expr::New(n) => {
                let mut args = Vec::with_capacity(n.members.len());
                let mut names = Vec::with_capacity(n.members.len());
                for (i, member) in n.members.iter().enumerate() {
                    names.push(
                        member
                            .output_name()
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("Item{}", i + 1)),
                    );
                    args.push(member.to_host()?);
                }
                HostExpr::New {
                    ty: n.ty.clone(),
                    args,
                    members: names,
                }
            }
            Expr::InList(i) => HostExpr::call(
                ENUMERABLE,
                "Contains",
                None,
                vec![i.list.to_host()?, i.value.to_host()?],
                TypeRef::bool(),
            ),
            Expr::Parentheses(p) => p.child.to_host()?,
            Expr::Rename(r) => r.child.to_host()?,
            Expr::JsonAttribute(j) => HostExpr::Member {
                receiver: Some(Box::new(j.child.to_host()?)),
                member: MemberRef {
                    owner: TypeRef::json().name(),
                    name: j.attribute.clone(),
                    ty: j.ty.clone(),
                },
            },
            Expr::QuerySource(_)
            | Expr::Special(_)
            | Expr::ColumnChain(_)
            | Expr::Projection(_)
            | Expr::Filter(_)
            | Expr::Join(_)
            | Expr::NamedSource(_)
            | Expr::GroupBy(_)
            | Expr::OrderBy(_)
            | Expr::OrderByBinding(_)
            | Expr::RowsFetchLimit(_)
            | Expr::Insert(_)
            | Expr::Values(_)
            | Expr::Set(_)
            | Expr::Delete(_)
            | Expr::Batch(_) => {
                return Err(TranslateError::NotRepresentable { kind: self.kind() })
            }
        };
        Ok(restated)
    }
}
