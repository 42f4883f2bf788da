use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use serde_json::Value;
use std::collections::BTreeMap;
use tierwise_core::CustomResourceRef;

/// Trait for cluster API implementations
///
/// This is the whole surface the scheduler needs from the orchestration
/// platform: reading nodes, patching their labels, and CRUD on custom
/// resources. `KubeClient` talks to a real API server; `MockCluster` keeps
/// everything in memory for tests.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    // --- Nodes ---

    /// List all nodes
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// Merge the given labels into a node's metadata.labels
    async fn patch_node_labels(&self, name: &str, labels: &BTreeMap<String, String>)
        -> Result<()>;

    // --- Custom resources ---

    /// List custom objects, optionally filtered by a label selector
    async fn list_custom_objects(
        &self,
        resource: &CustomResourceRef,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>>;

    /// Create a custom object and return what the server stored
    async fn create_custom_object(
        &self,
        resource: &CustomResourceRef,
        object: &Value,
    ) -> Result<Value>;

    /// Delete a custom object by name. Deleting a missing object succeeds.
    async fn delete_custom_object(&self, resource: &CustomResourceRef, name: &str) -> Result<()>;
}
