use crate::error::{Result, TierwiseError};
use crate::resources::ResourceQuantities;
use k8s_openapi::api::core::v1::Node;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Identifies a custom resource collection on the cluster API
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomResourceRef {
    /// API group (e.g., "workflow.io", "argoproj.io")
    pub group: String,
    /// API version (e.g., "v1", "v1alpha1")
    pub version: String,
    /// Lowercase plural resource name (e.g., "workflowworkers")
    pub plural: String,
    /// Namespace (None for cluster-scoped resources)
    pub namespace: Option<String>,
}

impl CustomResourceRef {
    /// Create a cluster-scoped reference
    pub fn cluster_scoped(
        group: impl Into<String>,
        version: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            plural: plural.into(),
            namespace: None,
        }
    }

    /// Create a namespaced reference
    pub fn namespaced(
        group: impl Into<String>,
        version: impl Into<String>,
        namespace: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            plural: plural.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Get the apiVersion string (group/version)
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }

    /// Get the API path for the collection (without name)
    pub fn collection_path(&self) -> String {
        match &self.namespace {
            Some(ns) => format!(
                "/apis/{}/{}/namespaces/{}/{}",
                self.group, self.version, ns, self.plural
            ),
            None => format!("/apis/{}/{}/{}", self.group, self.version, self.plural),
        }
    }
}

impl fmt::Display for CustomResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}.{}/{} in {}", self.plural, self.group, self.version, ns),
            None => write!(f, "{}.{}/{}", self.plural, self.group, self.version),
        }
    }
}

/// A worker size class: the CPU/memory thresholds a node must meet to carry
/// the tier label, and the capacity a workflow can count on when pinned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub name: String,
    pub resources: ResourceQuantities,
}

impl Tier {
    pub fn new(name: impl Into<String>, resources: ResourceQuantities) -> Self {
        Self {
            name: name.into(),
            resources,
        }
    }

    /// Build a tier from a `workflowworkers` custom object
    /// (`metadata.name` plus `spec.cpu` / `spec.memory`).
    pub fn from_custom_object(object: &Value) -> Result<Self> {
        let name = object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                TierwiseError::invalid_resource(
                    "worker tier has no metadata.name",
                    "Give every workflowworkers object a name",
                )
            })?;

        let spec = object.get("spec").ok_or_else(|| {
            TierwiseError::invalid_resource(
                format!("worker tier '{}' has no spec", name),
                "Set spec.cpu and spec.memory on the tier",
            )
        })?;

        let cpu = spec.get("cpu").ok_or_else(|| {
            TierwiseError::invalid_resource(
                format!("worker tier '{}' has no spec.cpu", name),
                "Set spec.cpu to a number of cores",
            )
        })?;
        let memory = spec.get("memory").ok_or_else(|| {
            TierwiseError::invalid_resource(
                format!("worker tier '{}' has no spec.memory", name),
                "Set spec.memory to a quantity such as '16Gi'",
            )
        })?;

        let cpu_millicores = ResourceQuantities::cpu_from_value(cpu)
            .map_err(|e| TierwiseError::invalid_quantity(format!("{}.spec.cpu", name), e))?;
        let memory_bytes = ResourceQuantities::memory_from_value(memory)
            .map_err(|e| TierwiseError::invalid_quantity(format!("{}.spec.memory", name), e))?;

        Ok(Self::new(
            name,
            ResourceQuantities::new(cpu_millicores, memory_bytes),
        ))
    }

    /// Ascending `(cpu, memory)` order, ties broken by name
    pub fn cmp_by_size(&self, other: &Tier) -> Ordering {
        self.resources
            .cmp(&other.resources)
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// Sort tiers smallest first
pub fn sort_tiers_ascending(tiers: &mut [Tier]) {
    tiers.sort_by(Tier::cmp_by_size);
}

/// Sort tiers largest first
pub fn sort_tiers_descending(tiers: &mut [Tier]) {
    tiers.sort_by(|a, b| b.cmp_by_size(a));
}

/// Name of a node, or "unknown"
pub fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or("unknown")
}

/// A node is schedulable unless `spec.unschedulable` is set
pub fn is_schedulable(node: &Node) -> bool {
    !node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false)
}

/// Parsed `status.capacity` of a node
pub fn node_capacity(node: &Node) -> Result<ResourceQuantities> {
    let capacity = node
        .status
        .as_ref()
        .and_then(|s| s.capacity.as_ref())
        .cloned()
        .unwrap_or_default();

    ResourceQuantities::from_k8s_resource_map(&capacity).map_err(|e| {
        TierwiseError::invalid_quantity(format!("{}.status.capacity", node_name(node)), e)
    })
}
