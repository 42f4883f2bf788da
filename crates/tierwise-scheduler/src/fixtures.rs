//! Builders shared by the unit tests of this crate.

use k8s_openapi::api::core::v1::{Node, NodeSpec, NodeStatus};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tierwise_core::{ResourceQuantities, Tier};

pub const GIB: u64 = 1024 * 1024 * 1024;

pub const WORKER_LABEL: &str = "nebulouscloud.eu/workflow-worker";

pub fn tier(name: &str, cores: u64, memory_gib: u64) -> Tier {
    Tier::new(name, ResourceQuantities::new(cores * 1000, memory_gib * GIB))
}

/// small (2 cores, 4Gi) and large (8 cores, 16Gi)
pub fn small_and_large() -> Vec<Tier> {
    vec![tier("small", 2, 4), tier("large", 8, 16)]
}

pub fn tier_object(name: &str, cpu: u64, memory: &str) -> Value {
    json!({
        "apiVersion": "workflow.io/v1",
        "kind": "WorkflowWorkers",
        "metadata": {"name": name},
        "spec": {"cpu": cpu, "memory": memory}
    })
}

pub fn node(name: &str, cpu: &str, memory: &str, worker: bool, schedulable: bool) -> Node {
    let mut node = Node::default();
    node.metadata.name = Some(name.to_string());

    let mut labels = BTreeMap::from([("kubernetes.io/hostname".to_string(), name.to_string())]);
    if worker {
        labels.insert(WORKER_LABEL.to_string(), "true".to_string());
    }
    node.metadata.labels = Some(labels);

    node.spec = Some(NodeSpec {
        unschedulable: Some(!schedulable),
        ..Default::default()
    });
    node.status = Some(NodeStatus {
        capacity: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ])),
        ..Default::default()
    });
    node
}

pub fn worker_node(name: &str, cpu: &str, memory: &str) -> Node {
    node(name, cpu, memory, true, true)
}

pub fn worker_pattern() -> regex::Regex {
    tierwise_core::labels::anchored(tierwise_core::labels::DEFAULT_WORKER_LABEL_PATTERN).unwrap()
}

pub fn registry_pattern() -> regex::Regex {
    tierwise_core::labels::anchored(tierwise_core::labels::DEFAULT_REGISTRY_NAME_PATTERN).unwrap()
}
