use crate::error::{ClusterError, Result};
use crate::traits::ClusterApi;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tierwise_core::CustomResourceRef;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory cluster for tests
///
/// Holds nodes and custom objects keyed by collection path. Label patches
/// are applied to the stored nodes and recorded so tests can count them.
/// Individual nodes can be made to reject patches, and the whole API can be
/// switched off to simulate an unreachable server.
#[derive(Clone, Default)]
pub struct MockCluster {
    nodes: Arc<RwLock<BTreeMap<String, Node>>>,
    objects: Arc<RwLock<HashMap<String, Vec<Value>>>>,
    patches: Arc<RwLock<Vec<(String, BTreeMap<String, String>)>>>,
    failing_nodes: Arc<RwLock<BTreeSet<String>>>,
    unavailable: Arc<RwLock<bool>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.write().await.insert(name, node);
    }

    pub async fn node(&self, name: &str) -> Option<Node> {
        self.nodes.read().await.get(name).cloned()
    }

    pub async fn add_object(&self, resource: &CustomResourceRef, object: Value) {
        self.objects
            .write()
            .await
            .entry(resource.collection_path())
            .or_default()
            .push(object);
    }

    pub async fn objects(&self, resource: &CustomResourceRef) -> Vec<Value> {
        self.objects
            .read()
            .await
            .get(&resource.collection_path())
            .cloned()
            .unwrap_or_default()
    }

    /// Every label patch applied so far, in order
    pub async fn patches(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.patches.read().await.clone()
    }

    /// Make label patches for this node fail
    pub async fn fail_patches_for(&self, name: &str) {
        self.failing_nodes.write().await.insert(name.to_string());
    }

    /// Make every call fail as if the API server were down
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    async fn check_available(&self, operation: &str) -> Result<()> {
        if *self.unavailable.read().await {
            return Err(ClusterError::request_failed(operation, "mock cluster unavailable"));
        }
        Ok(())
    }
}

fn object_name(object: &Value) -> Option<&str> {
    object.pointer("/metadata/name").and_then(Value::as_str)
}

fn matches_selector(object: &Value, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| {
            let (key, value) = term.split_once('=').unwrap_or((term, ""));
            object
                .pointer("/metadata/labels")
                .and_then(|labels| labels.get(key))
                .and_then(Value::as_str)
                == Some(value)
        })
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.check_available("list nodes").await?;
        Ok(self.nodes.read().await.values().cloned().collect())
    }

    async fn patch_node_labels(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.check_available("patch node").await?;
        if self.failing_nodes.read().await.contains(name) {
            return Err(ClusterError::api_status(
                format!("patch node {}", name),
                500,
                "injected failure",
            ));
        }

        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(name)
            .ok_or_else(|| ClusterError::api_status(format!("patch node {}", name), 404, "not found"))?;
        node.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.clone());

        self.patches
            .write()
            .await
            .push((name.to_string(), labels.clone()));
        debug!("Mock: node {} patched with {:?}", name, labels);
        Ok(())
    }

    async fn list_custom_objects(
        &self,
        resource: &CustomResourceRef,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>> {
        self.check_available("list custom objects").await?;
        let objects = self.objects(resource).await;
        Ok(match label_selector {
            Some(selector) => objects
                .into_iter()
                .filter(|o| matches_selector(o, selector))
                .collect(),
            None => objects,
        })
    }

    async fn create_custom_object(
        &self,
        resource: &CustomResourceRef,
        object: &Value,
    ) -> Result<Value> {
        self.check_available("create custom object").await?;
        let name = object_name(object).unwrap_or_default().to_string();

        let mut objects = self.objects.write().await;
        let collection = objects.entry(resource.collection_path()).or_default();
        if collection.iter().any(|o| object_name(o) == Some(name.as_str())) {
            return Err(ClusterError::api_status(
                format!("create {}", resource),
                409,
                format!("{} already exists", name),
            ));
        }
        collection.push(object.clone());
        debug!("Mock: {} {} created", resource, name);
        Ok(object.clone())
    }

    async fn delete_custom_object(&self, resource: &CustomResourceRef, name: &str) -> Result<()> {
        self.check_available("delete custom object").await?;
        if let Some(collection) = self
            .objects
            .write()
            .await
            .get_mut(&resource.collection_path())
        {
            collection.retain(|o| object_name(o) != Some(name));
        }
        debug!("Mock: {} {} deleted", resource, name);
        Ok(())
    }
}
