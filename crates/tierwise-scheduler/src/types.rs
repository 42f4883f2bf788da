use serde_json::Value;
use std::collections::BTreeMap;

/// A node's planned tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Node name
    pub node_name: String,
    /// Tier the node is assigned to
    pub tier: String,
    /// Whether the node already carries this tier label
    pub already_labeled: bool,
}

/// An item of a batch operation that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Node or object name
    pub name: String,
    /// Reason for failure
    pub reason: String,
}

impl ItemFailure {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of a classification pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationReport {
    /// Tier name -> number of nodes successfully labeled with it
    pub counts: BTreeMap<String, usize>,
    /// Nodes whose label patch failed
    pub failures: Vec<ItemFailure>,
}

impl ClassificationReport {
    /// Nodes counted for a tier (0 if none)
    pub fn count(&self, tier: &str) -> usize {
        self.counts.get(tier).copied().unwrap_or(0)
    }
}

/// Planned registry mutations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryDiff {
    /// Live nodes missing from the registry, with their capacity payload
    pub to_create: Vec<(String, Value)>,
    /// Registered nodes that are gone or no longer eligible
    pub to_delete: Vec<String>,
}

impl RegistryDiff {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

/// Outcome of a registry sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySync {
    /// Registry objects created
    pub created: Vec<String>,
    /// Registry objects deleted
    pub deleted: Vec<String>,
    /// Creates or deletes that failed
    pub failures: Vec<ItemFailure>,
}
