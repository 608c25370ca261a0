//! Query parameter side table.
//!
//! Translation replaces literals with named placeholders and records, for
//! each name, how to recover the literal from a host tree of the same shape.
//! A cached translation is reused for a new host tree by re-running the
//! extractors against it.

use crate::error::{TranslateError, TranslateResult};
use crate::host::{HostExpr, HostPath};
use crate::types::TypeRef;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Recovers a placeholder's value from a host tree
pub type Extractor = Arc<dyn Fn(&HostExpr) -> Option<Value> + Send + Sync>;

/// Extractor that evaluates the literal sub-tree at `path`
pub fn path_extractor(path: HostPath) -> Extractor {
    Arc::new(move |host: &HostExpr| host.at(&path).and_then(HostExpr::evaluate))
}

/// One generated placeholder
#[derive(Clone)]
pub struct ParameterEntry {
    pub name: String,
    pub ty: TypeRef,
    extractor: Option<Extractor>,
}

impl ParameterEntry {
    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    /// Value for this placeholder in `host`
    pub fn extract(&self, host: &HostExpr) -> Option<Value> {
        self.extractor.as_ref().and_then(|extract| extract(host))
    }
}

impl fmt::Debug for ParameterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterEntry")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("extractor", &self.extractor.is_some())
            .finish()
    }
}

/// Generated placeholder names in creation order.
#[derive(Debug, Clone, Default)]
pub struct ParameterMap {
    entries: Vec<ParameterEntry>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: TypeRef, extractor: Option<Extractor>) {
        self.entries.push(ParameterEntry {
            name: name.into(),
            ty,
            extractor,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    /// Extract every placeholder value from `host`, in order.
    ///
    /// Entries without an extractor are supplied by the caller and skipped.
    pub fn bind(&self, host: &HostExpr) -> TranslateResult<Vec<(String, Value)>> {
        self.entries
            .iter()
            .filter(|entry| entry.has_extractor())
            .map(|entry| {
                entry
                    .extract(host)
                    .map(|value| (entry.name.clone(), value))
                    .ok_or_else(|| TranslateError::ParameterExtraction {
                        name: entry.name.clone(),
                    })
            })
            .collect()
    }
}
