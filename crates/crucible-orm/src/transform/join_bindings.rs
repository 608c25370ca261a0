//! Join-binding replacement.
//!
//! A row of a join is a pair with `Left` and `Right` members. Expressions
//! over such a pair (`p.Left.Name`) are restated against the joined sources
//! directly (`a.Name`).

use super::ExprRewrite;
use crate::ir::{ColumnChain, Expr, Parameter};
use crate::types::{MemberRef, PAIR_LEFT, PAIR_RIGHT};

/// How one side of a join is referenced.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinSide {
    /// A source with its own row symbol
    Row(Parameter),
    /// A nested join
    Pair {
        left: Box<JoinSide>,
        right: Box<JoinSide>,
    },
}

impl JoinSide {
    /// Side layout of a join source, or `None` if some side has no row symbol
    pub fn of(source: &Expr) -> Option<JoinSide> {
        match source {
            Expr::Join(join) => Some(JoinSide::Pair {
                left: Box::new(Self::of(&join.left)?),
                right: Box::new(Self::of(&join.right)?),
            }),
            other => other.row_parameter().cloned().map(JoinSide::Row),
        }
    }
}

/// Replaces references through a pair symbol with references to the sides.
///
/// A whole side (`p.Left`) becomes the side's row symbol when it is a
/// top-level binding and `strip` is set, and `rename(a, Left)` otherwise.
pub struct JoinBindingReplacement {
    pair: Parameter,
    sides: JoinSide,
    strip: bool,
}

impl JoinBindingReplacement {
    pub fn new(pair: Parameter, sides: JoinSide, strip: bool) -> Self {
        Self { pair, sides, strip }
    }

    /// Replacement for rows of `join` referenced as `pair`
    pub fn for_join(join: &Expr, pair: &Parameter, strip: bool) -> Option<Self> {
        match JoinSide::of(join)? {
            sides @ JoinSide::Pair { .. } => Some(Self::new(pair.clone(), sides, strip)),
            JoinSide::Row(_) => None,
        }
    }

    fn path<'e>(&self, node: &'e Expr) -> Option<&'e [MemberRef]> {
        let (source, members) = match node {
            Expr::SimpleBinding(b) => (b.source.as_ref(), std::slice::from_ref(&b.member)),
            Expr::ColumnChain(c) => (c.source.as_ref(), c.members.as_slice()),
            _ => return None,
        };
        match source {
            Expr::Parameter(p) if p.name == self.pair.name && p.ty == self.pair.ty => Some(members),
            _ => None,
        }
    }

    fn replace(&self, node: &Expr, top_level: bool) -> Option<Expr> {
        let path = self.path(node)?;
        let mut side = &self.sides;
        let mut consumed = 0;
        while let (JoinSide::Pair { left, right }, Some(member)) = (side, path.get(consumed)) {
            side = if member.is_named(PAIR_LEFT) {
                &**left
            } else if member.is_named(PAIR_RIGHT) {
                &**right
            } else {
                return None;
            };
            consumed += 1;
        }
        if consumed == 0 {
            return None;
        }

        let JoinSide::Row(row) = side else {
            return None;
        };
        let rest = &path[consumed..];
        Some(match rest {
            [] if top_level && self.strip => row.to_expr(),
            [] => Expr::rename(row.to_expr(), path[consumed - 1].name.clone()),
            [member] => Expr::binding(row.to_expr(), member.clone()),
            members => Expr::ColumnChain(ColumnChain {
                source: Box::new(row.to_expr()),
                members: members.to_vec(),
            }),
        })
    }
}

impl ExprRewrite for JoinBindingReplacement {
    fn name(&self) -> &'static str {
        "join_binding_replacement"
    }

    fn rewrite(&self, expr: Expr) -> Expr {
        if let Some(replaced) = self.replace(&expr, true) {
            return replaced;
        }
        expr.replace_top_down(&mut |node| self.replace(node, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BinaryOp, TypeRef};

    fn order() -> TypeRef {
        TypeRef::entity("Order")
    }

    fn customer() -> TypeRef {
        TypeRef::entity("Customer")
    }

    fn pair() -> Parameter {
        Parameter::new("c", TypeRef::pair(order(), customer()))
    }

    fn sides() -> JoinSide {
        JoinSide::Pair {
            left: Box::new(JoinSide::Row(Parameter::new("a", order()))),
            right: Box::new(JoinSide::Row(Parameter::new("b", customer()))),
        }
    }

    fn via_pair(side: &str, side_ty: TypeRef, member: &str) -> Expr {
        let pair_ty = pair().ty;
        Expr::ColumnChain(ColumnChain {
            source: Box::new(pair().to_expr()),
            members: vec![
                MemberRef::new(&pair_ty, side, side_ty.clone()),
                MemberRef::new(&side_ty, member, TypeRef::int()),
            ],
        })
    }

    fn whole(side: &str, side_ty: TypeRef) -> Expr {
        let pair_ty = pair().ty;
        Expr::binding(pair().to_expr(), MemberRef::new(&pair_ty, side, side_ty))
    }

    #[test]
    fn test_member_through_pair_targets_side() {
        let replacement = JoinBindingReplacement::new(pair(), sides(), true);
        let predicate = Expr::binary(
            BinaryOp::GreaterThan,
            via_pair("Left", order(), "Total"),
            via_pair("Right", customer(), "Limit"),
        );
        assert_eq!(
            replacement.rewrite(predicate).to_string(),
            "(a.Total > b.Limit)"
        );
    }

    #[test]
    fn test_whole_side_strip_only_at_top_level() {
        let stripping = JoinBindingReplacement::new(pair(), sides(), true);
        assert_eq!(stripping.rewrite(whole("Left", order())).to_string(), "a");

        let keeping = JoinBindingReplacement::new(pair(), sides(), false);
        assert_eq!(
            keeping.rewrite(whole("Right", customer())).to_string(),
            "rename(b, Right)"
        );
    }

    #[test]
    fn test_replacement_is_idempotent() {
        let replacement = JoinBindingReplacement::new(pair(), sides(), false);
        let once = replacement.rewrite(via_pair("Left", order(), "Total"));
        let twice = replacement.rewrite(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_nested_join_side_is_followed() {
        let inner_ty = TypeRef::pair(order(), customer());
        let outer = Parameter::new("e", TypeRef::pair(inner_ty.clone(), TypeRef::entity("Region")));
        let sides = JoinSide::Pair {
            left: Box::new(sides()),
            right: Box::new(JoinSide::Row(Parameter::new("d", TypeRef::entity("Region")))),
        };
        let replacement = JoinBindingReplacement::new(outer.clone(), sides, true);
        let expr = Expr::ColumnChain(ColumnChain {
            source: Box::new(outer.to_expr()),
            members: vec![
                MemberRef::new(&outer.ty, "Left", inner_ty.clone()),
                MemberRef::new(&inner_ty, "Right", customer()),
                MemberRef::new(&customer(), "Name", TypeRef::string()),
            ],
        });
        assert_eq!(replacement.rewrite(expr).to_string(), "b.Name");
    }
}
