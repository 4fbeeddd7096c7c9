use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// How demanding a capability is to exercise. Drives its weight in the
/// capability component of the match score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityComplexity {
    /// Routine work.
    Simple,
    /// Typical skilled work. The default for unregistered capabilities.
    #[default]
    Moderate,
    /// Specialist work.
    Complex,
}

impl CapabilityComplexity {
    /// Weight used when averaging matched capabilities.
    pub fn weight(&self) -> u32 {
        match self {
            CapabilityComplexity::Simple => 1,
            CapabilityComplexity::Moderate => 2,
            CapabilityComplexity::Complex => 3,
        }
    }
}

/// One named capability in the taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    /// Canonical name, e.g. `"frontend"`. Also indexed as a keyword.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Keywords whose presence in a task description implies this capability.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Weight class for scoring.
    #[serde(default)]
    pub complexity: CapabilityComplexity,
    /// Capabilities close enough that holding one counts as holding this one.
    #[serde(default)]
    pub related_capabilities: Vec<String>,
}

impl Capability {
    /// Creates a capability with no keywords or relations.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        complexity: CapabilityComplexity,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            keywords: Vec::new(),
            complexity,
            related_capabilities: Vec::new(),
        }
    }

    /// Attach extraction keywords.
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Attach related capability names.
    pub fn with_related(mut self, related: Vec<String>) -> Self {
        self.related_capabilities = related;
        self
    }
}

/// The capability taxonomy plus a keyword index for extraction.
///
/// The index maps lowercased keyword -> capability names, kept in a `BTreeMap`
/// so extraction walks keywords in a deterministic order. The capability name
/// itself is always indexed alongside its declared keywords.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Capability>,
    /// keyword -> names of capabilities that keyword implies
    keyword_index: BTreeMap<String, BTreeSet<String>>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. Re-registering a name replaces the previous
    /// entry and drops its old keywords from the index.
    pub fn register(&mut self, capability: Capability) {
        if let Some(old) = self.capabilities.remove(&capability.name) {
            self.drop_keywords(&old);
        }
        for keyword in capability.keywords.iter().chain(std::iter::once(&capability.name)) {
            self.keyword_index
                .entry(keyword.to_lowercase())
                .or_default()
                .insert(capability.name.clone());
        }
        self.capabilities.insert(capability.name.clone(), capability);
    }

    fn drop_keywords(&mut self, capability: &Capability) {
        for keyword in capability.keywords.iter().chain(std::iter::once(&capability.name)) {
            let keyword = keyword.to_lowercase();
            if let Some(names) = self.keyword_index.get_mut(&keyword) {
                names.remove(&capability.name);
                if names.is_empty() {
                    self.keyword_index.remove(&keyword);
                }
            }
        }
    }

    /// Look up a capability by name.
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.capabilities.get(name)
    }

    /// Whether a capability is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Scoring weight for a capability name. Unregistered names weigh as
    /// [`CapabilityComplexity::Moderate`].
    pub fn weight_of(&self, name: &str) -> u32 {
        self.capabilities
            .get(name)
            .map_or(CapabilityComplexity::default().weight(), |c| {
                c.complexity.weight()
            })
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// All registered capability names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.capabilities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Iterate the keyword index in keyword order.
    pub fn indexed_keywords(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.keyword_index.iter().map(|(k, v)| (k.as_str(), v))
    }
}
