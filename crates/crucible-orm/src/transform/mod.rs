//! Post-composition rewrites.
//!
//! Rewrites restate expressions after a filter, ordering, grouping or
//! projection is attached to a source whose row shape differs from the one
//! the expression was written against. Every rewrite is idempotent.

mod compaction;
mod fold;
mod join_bindings;

pub use compaction::Compaction;
pub use fold::ConstantFolding;
pub use join_bindings::{JoinBindingReplacement, JoinSide};

use crate::ir::{Expr, Parameter};

/// A pure tree-to-tree rewrite.
pub trait ExprRewrite {
    /// Name used in trace output
    fn name(&self) -> &'static str;

    /// Rewrite `expr`. Rewriting an already rewritten tree returns it unchanged.
    fn rewrite(&self, expr: Expr) -> Expr;
}

/// Restate `expr`, written against rows of `source` referenced as `row`.
///
/// Projections with bindings go through [`Compaction`], joins through
/// [`JoinBindingReplacement`]. Anything else already exposes its rows
/// directly and is returned untouched.
pub(crate) fn restate_against(
    source: &Expr,
    row: Option<&Parameter>,
    strip_join_wrappers: bool,
    expr: Expr,
) -> Expr {
    let Some(row) = row else {
        return expr;
    };
    match source {
        Expr::Projection(projection) if !projection.is_select_all() => {
            apply(&Compaction::new(projection, row), expr)
        }
        Expr::Join(_) => match JoinBindingReplacement::for_join(source, row, strip_join_wrappers) {
            Some(replacement) => apply(&replacement, expr),
            None => expr,
        },
        _ => expr,
    }
}

fn apply(rewrite: &dyn ExprRewrite, expr: Expr) -> Expr {
    let rewritten = rewrite.rewrite(expr);
    tracing::trace!(rewrite = rewrite.name(), result = %rewritten, "rewrote expression");
    rewritten
}
