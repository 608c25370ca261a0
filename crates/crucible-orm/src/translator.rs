//! Translation entry points.
//!
//! A [`Translator`] holds configuration and recognizers and is shared across
//! threads; every call to [`Translator::translate`] runs with its own scope
//! stack and counters.

use crate::cache::{CacheKey, TranslationCache};
use crate::config::TranslatorConfig;
use crate::error::{ConfigError, TranslateResult};
use crate::host::HostExpr;
use crate::ir::{Expr, StructuralHash};
use crate::params::ParameterMap;
use crate::recognize::RecognizerRegistry;
use crate::walker::Walker;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// A translated query: the intermediate tree and its parameter table.
#[derive(Debug, Clone)]
pub struct Translation {
    pub root: Expr,
    pub parameters: ParameterMap,
}

impl Translation {
    pub fn new(root: Expr, parameters: ParameterMap) -> Self {
        Self { root, parameters }
    }

    /// Values for every extractable parameter, recovered from `host`.
    ///
    /// `host` may be any tree with the shape this translation was made from,
    /// which is how a cached translation is reused with new literal values.
    pub fn bind(&self, host: &HostExpr) -> TranslateResult<Vec<(String, Value)>> {
        self.parameters.bind(host)
    }

    pub fn structural_hash(&self) -> StructuralHash {
        self.root.structural_hash()
    }
}

/// Host query tree to intermediate tree translator
#[derive(Clone)]
pub struct Translator {
    config: TranslatorConfig,
    recognizers: RecognizerRegistry,
}

impl Translator {
    /// Translator with the built-in recognizers.
    ///
    /// Fails if `config` does not validate.
    pub fn new(config: TranslatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            recognizers: RecognizerRegistry::with_defaults(),
        })
    }

    /// Replace the recognizer registry
    pub fn with_recognizers(mut self, recognizers: RecognizerRegistry) -> Self {
        self.recognizers = recognizers;
        self
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translate one host query tree.
    ///
    /// Fails without a partial tree when the host tree contains a shape the
    /// walker does not know.
    pub fn translate(&self, host: &HostExpr) -> TranslateResult<Translation> {
        debug!(root = %host.ty(), "translating query");
        let (root, parameters) = Walker::new(&self.config, &self.recognizers).translate(host)?;
        let translation = Translation::new(root, parameters);
        debug!(
            kind = %translation.root.kind(),
            parameters = translation.parameters.len(),
            structure = %translation.structural_hash(),
            "translated query"
        );
        Ok(translation)
    }

    /// Translate through `cache`.
    ///
    /// The cache key pairs `key` with the host tree's shape, so trees that
    /// differ only in literal values share one entry. The shape is mixed
    /// with this translator's settings and recognizers, so differently
    /// configured translators can share a cache. Bind values with
    /// [`Translation::bind`] against the current host tree.
    pub fn translate_cached(
        &self,
        cache: &dyn TranslationCache,
        key: &str,
        host: &HostExpr,
    ) -> TranslateResult<Arc<Translation>> {
        let cache_key = CacheKey::new(key, self.cache_structure(host));
        if let Some(hit) = cache.get(&cache_key) {
            return Ok(hit);
        }
        let translation = Arc::new(self.translate(host)?);
        cache.insert(cache_key, Arc::clone(&translation));
        Ok(translation)
    }

    fn cache_structure(&self, host: &HostExpr) -> StructuralHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&host.shape_hash(self.config.parameterize_constants));
        hasher.update(&self.config.fingerprint());
        for name in self.recognizers.recognizer_names() {
            hasher.update(&(name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
        }
        hasher.finalize().into()
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self {
            config: TranslatorConfig::default(),
            recognizers: RecognizerRegistry::with_defaults(),
        }
    }
}

/// Translate with the default configuration
pub fn translate(host: &HostExpr) -> TranslateResult<Translation> {
    Translator::default().translate(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::host::{HostParam, Query};
    use crate::types::TypeRef;
    use serde_json::json;
    use tracing_test::traced_test;

    fn adults(min_age: i64) -> HostExpr {
        let u = HostParam::new("u", TypeRef::entity("User"));
        Query::all(TypeRef::entity("User"))
            .filter(u.lambda(
                u.expr()
                    .field("Age", TypeRef::int())
                    .greater_than(HostExpr::constant(json!(min_age), TypeRef::int())),
            ))
            .into_expr()
    }

    #[test]
    fn test_translate_is_deterministic() {
        let translator = Translator::default();
        let first = translator.translate(&adults(18)).unwrap();
        let second = translator.translate(&adults(18)).unwrap();
        assert_eq!(first.root, second.root);
        assert_eq!(first.root.to_string(), second.root.to_string());
    }

    #[test]
    fn test_literal_values_do_not_change_structure() {
        let translator = Translator::default();
        let first = translator.translate(&adults(18)).unwrap();
        let second = translator.translate(&adults(65)).unwrap();
        assert_eq!(first.structural_hash(), second.structural_hash());
    }

    #[test]
    fn test_cached_translation_rebinds_new_values() {
        let translator = Translator::default();
        let cache = MemoryCache::new();

        let first = translator
            .translate_cached(&cache, "adults", &adults(18))
            .unwrap();
        let second = translator
            .translate_cached(&cache, "adults", &adults(65))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(
            second.bind(&adults(65)).unwrap(),
            vec![("p0".to_string(), json!(65))]
        );
    }

    #[test]
    fn test_differently_configured_translators_share_a_cache() {
        let cache = MemoryCache::new();
        let prefixed = Translator::new(TranslatorConfig {
            parameter_prefix: "arg".to_string(),
            ..Default::default()
        })
        .unwrap();
        let plain = Translator::default();

        let first = prefixed.translate_cached(&cache, "q", &adults(18)).unwrap();
        let second = plain.translate_cached(&cache, "q", &adults(18)).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 2);
        assert_eq!(second.root, plain.translate(&adults(18)).unwrap().root);
        assert_eq!(second.parameters.names(), vec!["p0"]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TranslatorConfig {
            parameter_prefix: String::new(),
            ..Default::default()
        };
        assert!(matches!(Translator::new(config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_free_function_uses_defaults() {
        let translation = translate(&Query::all(TypeRef::entity("User")).into_expr()).unwrap();
        assert!(translation.parameters.is_empty());
        assert_eq!(translation.root.to_string(), "project(table(User))");
    }

    #[test]
    #[traced_test]
    fn test_translation_is_logged() {
        Translator::default().translate(&adults(18)).unwrap();
        assert!(logs_contain("translated query"));
        assert!(logs_contain("parameters=1"));
    }
}
