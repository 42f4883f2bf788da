//! Label keys, naming conventions and custom resource coordinates shared by
//! the reconciler, the decision engine and the metrics publisher.

use crate::types::CustomResourceRef;
use regex::Regex;

/// Label carrying the tier a node belongs to, or the tier a workflow is pinned to
pub const TIER_LABEL: &str = "workflow.nebulouscloud.eu/workersize";

/// Label the workflow controller sets with the workflow phase
pub const WORKFLOW_PHASE_LABEL: &str = "workflows.argoproj.io/phase";

/// Label identifying the workflow a pod belongs to; used for pod affinity
pub const WORKFLOW_IDENTITY_LABEL: &str = "workflow";

/// Topology key for colocating a workflow's pods on one host
pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Default pattern a node label key must match for the node to be a worker
pub const DEFAULT_WORKER_LABEL_PATTERN: &str = r"nebulouscloud\.eu/?.+worker?.+";

/// Default pattern a node name must match to be kept in the node registry
pub const DEFAULT_REGISTRY_NAME_PATTERN: &str = r".+-ip-.+";

/// Cluster-scoped tier definitions
pub fn worker_tiers() -> CustomResourceRef {
    CustomResourceRef::cluster_scoped("workflow.io", "v1", "workflowworkers")
}

/// Cluster-scoped node registry
pub fn workflow_nodes() -> CustomResourceRef {
    CustomResourceRef::cluster_scoped("workflow.io", "v1", "workflownodes")
}

/// Kind of the node registry objects
pub const WORKFLOW_NODE_KIND: &str = "WorkflowNodes";

/// Workflow objects managed by the workflow engine
pub fn workflows() -> CustomResourceRef {
    CustomResourceRef::namespaced("argoproj.io", "v1alpha1", "argo", "workflows")
}

/// Build a prefix-anchored regex, matching the way node labels and names are
/// tested against naming conventions (a match must start at the first byte).
pub fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})", pattern))
}

/// True if any label key matches the pattern
pub fn any_key_matches<'a, I>(keys: I, pattern: &Regex) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    keys.into_iter().any(|k| pattern.is_match(k))
}

/// Render `key=value` pairs as a label selector
pub fn label_selector(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
