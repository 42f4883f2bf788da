use crate::types::{ItemFailure, RegistryDiff, RegistrySync};
use k8s_openapi::api::core::v1::Node;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use tierwise_cluster::ClusterApi;
use tierwise_core::labels::{workflow_nodes, WORKFLOW_NODE_KIND};
use tierwise_core::{is_schedulable, node_name};
use tracing::{debug, info, warn};

/// Registry payload for a node: its raw capacity map
fn capacity_spec(node: &Node) -> Value {
    let mut spec = Map::new();
    if let Some(capacity) = node.status.as_ref().and_then(|s| s.capacity.as_ref()) {
        for (key, quantity) in capacity {
            spec.insert(key.clone(), Value::String(quantity.0.clone()));
        }
    }
    Value::Object(spec)
}

/// Build the `WorkflowNodes` object registering a node
pub fn registry_object(name: &str, capacity: Value) -> Value {
    json!({
        "apiVersion": workflow_nodes().api_version(),
        "kind": WORKFLOW_NODE_KIND,
        "metadata": {"name": name},
        "spec": capacity,
    })
}

/// Compare live nodes against registered names.
///
/// Only schedulable nodes whose name matches `name_pattern` count as live.
pub fn registry_diff(live_nodes: &[Node], registered: &[String], name_pattern: &Regex) -> RegistryDiff {
    let live: Vec<&Node> = live_nodes
        .iter()
        .filter(|n| is_schedulable(n) && name_pattern.is_match(node_name(n)))
        .collect();
    let live_names: BTreeSet<&str> = live.iter().map(|n| node_name(n)).collect();
    let registered_names: BTreeSet<&str> = registered.iter().map(String::as_str).collect();

    let to_create = live
        .iter()
        .filter(|n| !registered_names.contains(node_name(n)))
        .map(|n| (node_name(n).to_string(), capacity_spec(n)))
        .collect();

    let to_delete = registered_names
        .iter()
        .filter(|name| !live_names.contains(*name))
        .map(|name| name.to_string())
        .collect();

    RegistryDiff {
        to_create,
        to_delete,
    }
}

/// Make the registry match the set of live nodes.
///
/// Listing failures skip the cycle; create and delete failures are recorded
/// per node and the rest of the diff is still applied.
pub async fn sync_registry(
    cluster: &dyn ClusterApi,
    live_nodes: &[Node],
    name_pattern: &Regex,
) -> RegistrySync {
    let resource = workflow_nodes();
    let mut sync = RegistrySync::default();

    let registered: Vec<String> = match cluster.list_custom_objects(&resource, None).await {
        Ok(objects) => objects
            .iter()
            .filter_map(|o| o.pointer("/metadata/name").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
        Err(e) => {
            warn!("Failed to list registered nodes, skipping registry sync: {}", e);
            sync.failures.push(ItemFailure::new(resource.to_string(), e.to_string()));
            return sync;
        }
    };

    let diff = registry_diff(live_nodes, &registered, name_pattern);
    if diff.is_empty() {
        debug!("Node registry up to date ({} nodes)", registered.len());
        return sync;
    }

    for name in diff.to_delete {
        match cluster.delete_custom_object(&resource, &name).await {
            Ok(()) => {
                info!("Removed node {} from registry", name);
                sync.deleted.push(name);
            }
            Err(e) => {
                warn!("Failed to remove node {} from registry: {}", name, e);
                sync.failures.push(ItemFailure::new(name, e.to_string()));
            }
        }
    }

    for (name, capacity) in diff.to_create {
        match cluster
            .create_custom_object(&resource, &registry_object(&name, capacity))
            .await
        {
            Ok(_) => {
                info!("Registered node {}", name);
                sync.created.push(name);
            }
            Err(e) => {
                warn!("Failed to register node {}: {}", name, e);
                sync.failures.push(ItemFailure::new(name, e.to_string()));
            }
        }
    }

    sync
}
