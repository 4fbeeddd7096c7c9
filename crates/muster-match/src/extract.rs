use crate::taxonomy::CapabilityRegistry;
use std::collections::HashSet;

/// Strategy for deriving required capability names from a task description.
///
/// The router uses this when a submitted task names no capabilities
/// explicitly. Implementations must be pure and deterministic.
pub trait CapabilityExtractor: Send + Sync {
    /// Return the de-duplicated capability names implied by `description`.
    fn extract(&self, description: &str, registry: &CapabilityRegistry) -> Vec<String>;
}

/// Case-insensitive substring scan over the registry's keyword index.
///
/// Substring containment, not word boundaries: "reactive" hits the keyword
/// "react". Keywords are walked in index order, so output order is stable
/// for a given registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordExtractor;

impl CapabilityExtractor for KeywordExtractor {
    fn extract(&self, description: &str, registry: &CapabilityRegistry) -> Vec<String> {
        let haystack = description.to_lowercase();
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for (keyword, names) in registry.indexed_keywords() {
            if !haystack.contains(keyword) {
                continue;
            }
            for name in names {
                if seen.insert(name.clone()) {
                    found.push(name.clone());
                }
            }
        }
        found
    }
}
