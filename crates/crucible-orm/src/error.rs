//! Error types for query translation.
//!
//! Failures are local to one translation call and never carry a partial tree.

use crate::ir::NodeKind;
use thiserror::Error;

/// Errors raised while translating a host query tree.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranslateError {
    /// The walker met an operator, method or member it does not know
    #[error("unsupported query shape: {signature}")]
    UnsupportedShape { signature: String },

    /// The scope protocol was violated (a walker bug, never retried)
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// More than one recognizer claimed the same member
    #[error("member {member} is claimed by more than one recognizer: {}", recognizers.join(", "))]
    AmbiguousRecognition {
        member: String,
        recognizers: Vec<String>,
    },

    /// A relation-only node was asked to restate itself as a host expression
    #[error("{kind} cannot be represented as a host expression")]
    NotRepresentable { kind: NodeKind },

    /// A lambda body referenced a host parameter that is not in scope
    #[error("host parameter '{name}' is not bound in this scope")]
    UnboundParameter { name: String },

    /// An extractor could not recover the literal for a query parameter
    #[error("could not extract a value for query parameter '{name}'")]
    ParameterExtraction { name: String },
}

impl TranslateError {
    /// Shorthand for an unsupported-shape error
    pub fn unsupported(signature: impl Into<String>) -> Self {
        Self::UnsupportedShape {
            signature: signature.into(),
        }
    }
}

/// Violations of the open/close/apply protocol.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A write-once slot was applied a second time
    #[error("{parent} slot '{slot}' is already filled")]
    SlotFilled { parent: NodeKind, slot: &'static str },

    /// The parent does not accept children of this kind
    #[error("cannot apply {child} to {parent}")]
    Incompatible { parent: NodeKind, child: NodeKind },

    /// A node was closed before a required slot was supplied
    #[error("{kind} closed without its '{slot}' slot")]
    MissingSlot { kind: NodeKind, slot: &'static str },

    /// A slot was filled before the slot that must precede it
    #[error("{kind} slot '{slot}' applied before '{requires}'")]
    OutOfOrder {
        kind: NodeKind,
        slot: &'static str,
        requires: &'static str,
    },

    /// `close()` on an empty scope stack, or a translation that left scopes open
    #[error("unbalanced scope stack: {0}")]
    UnbalancedScope(String),
}

/// Errors produced by renderer implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// The renderer has no rendering for this node kind
    #[error("renderer '{renderer}' does not support {kind}")]
    UnsupportedNode {
        renderer: &'static str,
        kind: NodeKind,
    },

    /// The node combination is valid but cannot be rendered
    #[error("unsupported combination: {message}")]
    UnsupportedCombination { message: String },
}

/// Errors loading translator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid translator config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid translator config: {0}")]
    Invalid(String),
}

/// Result alias for translation
pub type TranslateResult<T> = Result<T, TranslateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_names_both_kinds() {
        let err = TranslateError::from(ProtocolError::Incompatible {
            parent: NodeKind::Binary,
            child: NodeKind::Projection,
        });
        assert_eq!(err.to_string(), "cannot apply Projection to Binary");
    }

    #[test]
    fn test_ambiguous_lists_recognizers() {
        let err = TranslateError::AmbiguousRecognition {
            member: "String.Length".to_string(),
            recognizers: vec!["strings".to_string(), "custom".to_string()],
        };
        assert!(err.to_string().contains("strings, custom"));
    }
}
