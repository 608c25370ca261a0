//! Compaction: restating expressions against a projection's output.

use super::ExprRewrite;
use crate::ir::{Expr, Parameter, Projection};
use crate::types::MemberRef;

/// Restates an expression in terms of a projection's own output bindings.
///
/// Two cases are rewritten, both to `row.<OutputName>`:
///
/// - a sub-expression structurally equal to the value of one of the
///   projection's bindings (an expression written against the pre-projection
///   rows)
/// - a member access on a parameter of the projection's row type whose member
///   matches an output name case-insensitively (normalizes the symbol and the
///   spelling of the name)
pub struct Compaction<'a> {
    projection: &'a Projection,
    row: &'a Parameter,
}

impl<'a> Compaction<'a> {
    pub fn new(projection: &'a Projection, row: &'a Parameter) -> Self {
        Self { projection, row }
    }

    fn output(&self, binding: &Expr, name: &str) -> Expr {
        Expr::binding(
            self.row.to_expr(),
            MemberRef::new(&self.row.ty, name, binding.ty()),
        )
    }

    fn restate(&self, node: &Expr) -> Option<Expr> {
        if let Expr::SimpleBinding(access) = node {
            if let Expr::Parameter(param) = access.source.as_ref() {
                if param.ty == self.row.ty {
                    let binding = self.projection.binding_named(&access.member.name)?;
                    let name = binding.output_name()?;
                    return Some(self.output(binding, name));
                }
            }
        }

        // Literals and placeholders carry no reference to the old rows
        if !node.any(&|e| matches!(e, Expr::Parameter(_))) {
            return None;
        }
        self.projection.bindings.iter().find_map(|binding| {
            let name = binding.output_name()?;
            let value = match binding {
                Expr::NamedBinding(named) => named.binding.as_ref(),
                other => other,
            };
            (value == node).then(|| self.output(binding, name))
        })
    }
}

impl ExprRewrite for Compaction<'_> {
    fn name(&self) -> &'static str {
        "compaction"
    }

    fn rewrite(&self, expr: Expr) -> Expr {
        expr.replace_top_down(&mut |node| self.restate(node))
    }
}
