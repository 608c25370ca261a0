//! Renderer contract for intermediate trees.
//!
//! Renderers turn a translated [`Expr`] and its [`ParameterMap`] into target
//! query text. SQL dialects live outside this crate; the outline renderer
//! here exists for diagnostics.

mod outline;

pub use outline::OutlineRenderer;

use crate::error::RenderError;
use crate::ir::Expr;
use crate::params::ParameterMap;

/// Output from rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    /// The generated query text
    pub text: String,
    /// Parameter names in binding order
    pub parameters: Vec<String>,
}

/// Trait for rendering intermediate trees to a target query language.
pub trait QueryRenderer: Send + Sync {
    /// Unique name for this renderer
    fn name(&self) -> &str;

    /// Render the tree to query text with its parameter order.
    ///
    /// Must fail explicitly for node kinds or combinations it cannot render.
    fn render(&self, root: &Expr, parameters: &ParameterMap) -> Result<RenderedQuery, RenderError>;
}
