//! Special-member recognizers.
//!
//! Some host library members have no structural equivalent in the
//! intermediate tree (`String.Length`, `DateTime.Now`). Recognizers claim
//! such members and say what stands in for them. The walker consults the
//! registry before falling back to a plain member binding.

mod datetime;
mod strings;

pub use datetime::DateTimeMembers;
pub use strings::StringMembers;

use crate::error::{TranslateError, TranslateResult};
use crate::types::{MemberKey, MemberRef, TypeRef};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a claimed member translates to.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    /// A function call; the member's receiver, if any, is the call receiver
    Call { function: String, ty: TypeRef },
    /// A literal constant
    Constant { value: Value, ty: TypeRef },
    /// Opaque text for the renderer
    Special { text: String, ty: TypeRef },
}

/// Trait for member recognizers.
///
/// Follows the same shape as the syntax registry:
/// - `declared_members()` for registration-time conflict checks
/// - `priority()` for ordering
/// - `recognize()` for the per-call decision
pub trait MemberRecognizer: Send + Sync {
    /// Unique name for this recognizer
    fn name(&self) -> &'static str;

    /// Members this recognizer may claim.
    ///
    /// Two recognizers declaring the same member cannot be registered
    /// together. Recognizers that decide per call return an empty list and
    /// are checked at translation time instead.
    fn declared_members(&self) -> Vec<MemberKey>;

    /// Claim `member`, or return `None`.
    ///
    /// `has_receiver` is false for static members.
    fn recognize(&self, member: &MemberRef, has_receiver: bool) -> Option<Recognition>;

    /// Priority (higher = consulted first). Default: 50
    fn priority(&self) -> u8 {
        50
    }
}

/// Registry of member recognizers (sorted by priority descending).
#[derive(Clone, Default)]
pub struct RecognizerRegistry {
    recognizers: Vec<Arc<dyn MemberRecognizer>>,
    declared: BTreeMap<MemberKey, &'static str>,
}

impl RecognizerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in string and date/time recognizers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for recognizer in [
            Arc::new(StringMembers) as Arc<dyn MemberRecognizer>,
            Arc::new(DateTimeMembers),
        ] {
            // Built-ins declare disjoint members
            if let Err(err) = registry.register(recognizer) {
                tracing::warn!(%err, "skipping built-in recognizer");
            }
        }
        registry
    }

    /// Register a recognizer (re-sorts by priority).
    ///
    /// Fails if it declares a member another recognizer already declares.
    pub fn register(&mut self, recognizer: Arc<dyn MemberRecognizer>) -> TranslateResult<()> {
        let members = recognizer.declared_members();
        for key in &members {
            if let Some(existing) = self.declared.get(key) {
                return Err(TranslateError::AmbiguousRecognition {
                    member: key.to_string(),
                    recognizers: vec![existing.to_string(), recognizer.name().to_string()],
                });
            }
        }
        for key in members {
            self.declared.insert(key, recognizer.name());
        }
        self.recognizers.push(recognizer);
        self.recognizers
            .sort_by_key(|r| std::cmp::Reverse(r.priority()));
        Ok(())
    }

    /// Ask every recognizer about `member`.
    ///
    /// More than one claim is an [`TranslateError::AmbiguousRecognition`].
    pub fn recognize(
        &self,
        member: &MemberRef,
        has_receiver: bool,
    ) -> TranslateResult<Option<Recognition>> {
        let mut claims = self
            .recognizers
            .iter()
            .filter_map(|r| r.recognize(member, has_receiver).map(|rec| (r.name(), rec)));
        let Some((name, recognition)) = claims.next() else {
            return Ok(None);
        };
        let others: Vec<&str> = claims.map(|(name, _)| name).collect();
        if !others.is_empty() {
            let mut recognizers = vec![name.to_string()];
            recognizers.extend(others.into_iter().map(str::to_string));
            return Err(TranslateError::AmbiguousRecognition {
                member: member.qualified(),
                recognizers,
            });
        }
        tracing::trace!(recognizer = name, member = %member.qualified(), "member recognized");
        Ok(Some(recognition))
    }

    /// Get list of registered recognizer names
    pub fn recognizer_names(&self) -> Vec<&'static str> {
        self.recognizers.iter().map(|r| r.name()).collect()
    }
}

/// Builder for ergonomic registry construction
#[derive(Default)]
pub struct RecognizerRegistryBuilder {
    recognizers: Vec<Arc<dyn MemberRecognizer>>,
}

impl RecognizerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recognizer to the registry
    pub fn with_recognizer(mut self, recognizer: impl MemberRecognizer + 'static) -> Self {
        self.recognizers.push(Arc::new(recognizer));
        self
    }

    /// Build the registry, rejecting overlapping declarations
    pub fn build(self) -> TranslateResult<RecognizerRegistry> {
        let mut registry = RecognizerRegistry::new();
        for recognizer in self.recognizers {
            registry.register(recognizer)?;
        }
        Ok(registry)
    }
}
