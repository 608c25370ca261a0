use super::{QueryRenderer, RenderedQuery};
use crate::error::RenderError;
use crate::ir::Expr;
use crate::params::ParameterMap;

const NAME: &str = "outline";

/// Renders the one-line outline of a query tree.
///
/// Useful in logs and tests. Only whole queries are rendered: the root must
/// be a relation or a mutation, and every placeholder in the tree must be
/// listed in the parameter map.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineRenderer;

impl OutlineRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl QueryRenderer for OutlineRenderer {
    fn name(&self) -> &str {
        NAME
    }

    fn render(&self, root: &Expr, parameters: &ParameterMap) -> Result<RenderedQuery, RenderError> {
        let kind = root.kind();
        if !kind.is_relation() && !kind.is_mutation() {
            return Err(RenderError::UnsupportedNode {
                renderer: NAME,
                kind,
            });
        }

        let mut unknown = Vec::new();
        root.visit(&mut |node| {
            if let Expr::QueryParameter(param) = node {
                if parameters.get(&param.name).is_none() {
                    unknown.push(param.name.clone());
                }
            }
        });
        if !unknown.is_empty() {
            return Err(RenderError::UnsupportedCombination {
                message: format!("placeholders without parameters: {}", unknown.join(", ")),
            });
        }

        Ok(RenderedQuery {
            text: root.to_string(),
            parameters: parameters.names().into_iter().map(str::to_string).collect(),
        })
    }
}
