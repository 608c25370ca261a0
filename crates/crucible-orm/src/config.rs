//! Translator configuration
//!
//! Loaded from TOML; every key is optional and unknown keys are rejected.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Translator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslatorConfig {
    /// Rows per Insert before a bulk insert is split into a Batch (0 = unlimited)
    pub max_rows_per_insert: usize,
    /// Fold operator nodes whose operands are all constants
    pub fold_constants: bool,
    /// Turn literals into query parameters instead of inline constants
    pub parameterize_constants: bool,
    /// Prefix of generated query parameter names
    pub parameter_prefix: String,
    /// Replace a whole joined side in a projection with its row symbol
    pub strip_join_wrappers: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            max_rows_per_insert: 500,
            fold_constants: true,
            parameterize_constants: true,
            parameter_prefix: "p".to_string(),
            strip_join_wrappers: true,
        }
    }
}

impl TranslatorConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.parameter_prefix;
        let valid = prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(ConfigError::Invalid(format!(
                "parameter_prefix '{prefix}' must be an identifier"
            )));
        }
        Ok(())
    }

    /// Digest of every setting that shapes a translation
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.max_rows_per_insert as u64).to_le_bytes());
        hasher.update(&[
            u8::from(self.fold_constants),
            u8::from(self.parameterize_constants),
            u8::from(self.strip_join_wrappers),
        ]);
        hasher.update(self.parameter_prefix.as_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Chunk size for insert rows
    pub(crate) fn insert_chunk(&self, rows: usize) -> usize {
        match self.max_rows_per_insert {
            0 => rows.max(1),
            n => n,
        }
    }
}
