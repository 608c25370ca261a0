//! Query translation core for Crucible's object-relational layer.
//!
//! Converts a host query expression tree (operators chained over a queryable
//! source) into a backend-agnostic intermediate tree plus a table of query
//! parameters. Rendering that tree to SQL is a downstream concern behind the
//! [`QueryRenderer`] trait.
//!
//! ## Architecture
//!
//! ```text
//! HostExpr ──► Walker ──► scope stack (Builder apply/finish) ──► Expr + ParameterMap
//!                │                                       │
//!                └─ recognizers, lexical env             └─ restating rewrites
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use crucible_orm::host::{HostExpr, HostParam, Query};
//! use crucible_orm::types::TypeRef;
//! use crucible_orm::Translator;
//! use serde_json::json;
//!
//! let user = TypeRef::entity("User");
//! let u = HostParam::new("u", user.clone());
//! let host = Query::all(user)
//!     .filter(u.lambda(
//!         u.expr()
//!             .field("Age", TypeRef::int())
//!             .greater_than(HostExpr::constant(json!(18), TypeRef::int())),
//!     ))
//!     .into_expr();
//!
//! let translation = Translator::default().translate(&host)?;
//! assert_eq!(
//!     translation.root.to_string(),
//!     "filter(named(project(table(User)), a), (a.Age > @p0))"
//! );
//! assert_eq!(translation.bind(&host)?, vec![("p0".to_string(), json!(18))]);
//! # Ok::<(), crucible_orm::TranslateError>(())
//! ```

pub mod cache;
pub mod config;
mod context;
pub mod error;
pub mod host;
pub mod ir;
pub mod params;
pub mod recognize;
pub mod render;
pub mod transform;
pub mod translator;
pub mod types;
mod walker;

// Re-export main types
pub use cache::{CacheKey, CacheStats, MemoryCache, TranslationCache};
pub use config::TranslatorConfig;
pub use error::{ConfigError, ProtocolError, RenderError, TranslateError, TranslateResult};
pub use host::{HostExpr, HostParam, HostPath, Query};
pub use ir::{Expr, NodeKind, StructuralHash};
pub use params::ParameterMap;
pub use recognize::{MemberRecognizer, Recognition, RecognizerRegistry};
pub use render::{OutlineRenderer, QueryRenderer, RenderedQuery};
pub use translator::{translate, Translation, Translator};
pub use types::TypeRef;
