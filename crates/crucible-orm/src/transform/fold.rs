//! Constant folding through host restatement.

use super::ExprRewrite;
use crate::ir::Expr;

/// Folds operator nodes whose operands are all constants into one constant.
///
/// The node is restated as a host expression and evaluated there, so the
/// folding rules are exactly the host evaluation rules. Nodes whose
/// evaluation is undefined (division by zero, mixed types) are kept.
pub struct ConstantFolding;

impl ConstantFolding {
    /// Fold a single node whose children are already folded
    pub fn fold_node(node: Expr) -> Expr {
        let foldable = matches!(
            node,
            Expr::Binary(_) | Expr::Unary(_) | Expr::Conditional(_)
        ) && node
            .children()
            .iter()
            .all(|child| matches!(child, Expr::Constant(_)));
        if !foldable {
            return node;
        }
        match node.to_host().ok().and_then(|host| host.evaluate()) {
            Some(value) => Expr::constant(value, node.ty()),
            None => node,
        }
    }
}

impl ExprRewrite for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant_folding"
    }

    fn rewrite(&self, expr: Expr) -> Expr {
        expr.rewrite_bottom_up(&mut Self::fold_node)
    }
}
