use crate::config::discover_config;
use crate::error::{ClusterError, Result};
use crate::traits::ClusterApi;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::client::Client;
use kube::config::Config;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tierwise_core::CustomResourceRef;
use tracing::{debug, info};

/// Client for the Kubernetes API server
///
/// One instance (and so one connection pool) is built at startup and shared
/// by the periodic reconciler and the request path.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        let cluster_url = config.cluster_url.clone();
        let client = Client::try_from(config).map_err(|e| {
            ClusterError::invalid_config(
                format!("failed to build cluster client: {}", e),
                "Check the TLS and user settings of the cluster configuration",
            )
        })?;
        info!("Using cluster API at {}", cluster_url);
        Ok(Self { client })
    }

    /// In-cluster service account first, then kubeconfig
    pub async fn discover(kubeconfig: Option<&Path>) -> Result<Self> {
        Self::new(discover_config(kubeconfig).await?)
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    fn dynamic(&self, resource: &CustomResourceRef) -> Api<DynamicObject> {
        let api_resource = api_resource(resource);
        match &resource.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &api_resource),
            None => Api::all_with(self.client.clone(), &api_resource),
        }
    }
}

/// Dynamic type info for a custom resource collection. The kind is not
/// needed to address the collection, objects carry their own.
fn api_resource(resource: &CustomResourceRef) -> ApiResource {
    ApiResource {
        group: resource.group.clone(),
        version: resource.version.clone(),
        api_version: resource.api_version(),
        kind: String::new(),
        plural: resource.plural.clone(),
    }
}

fn cluster_error(operation: impl Into<String>, err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(status) => ClusterError::api_status(operation, status.code, status.message),
        kube::Error::SerdeError(e) => ClusterError::decode_failed(operation, e.to_string()),
        other => ClusterError::request_failed(operation, other.to_string()),
    }
}

fn to_value(operation: &str, object: &DynamicObject) -> Result<Value> {
    serde_json::to_value(object).map_err(|e| ClusterError::decode_failed(operation, e.to_string()))
}

#[async_trait]
impl ClusterApi for KubeClient {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        debug!("Listing nodes");
        let list = self
            .nodes()
            .list(&ListParams::default())
            .await
            .map_err(|e| cluster_error("list nodes", e))?;
        Ok(list.items)
    }

    async fn patch_node_labels(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        debug!("Patching labels of node {}", name);
        let patch = json!({ "metadata": { "labels": labels } });
        self.nodes()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| cluster_error(format!("patch node {}", name), e))?;
        Ok(())
    }

    async fn list_custom_objects(
        &self,
        resource: &CustomResourceRef,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>> {
        debug!("Listing {} (labelSelector: {:?})", resource, label_selector);
        let operation = format!("list {}", resource);

        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }

        let list = self
            .dynamic(resource)
            .list(&params)
            .await
            .map_err(|e| cluster_error(operation.as_str(), e))?;

        list.items.iter().map(|o| to_value(&operation, o)).collect()
    }

    async fn create_custom_object(
        &self,
        resource: &CustomResourceRef,
        object: &Value,
    ) -> Result<Value> {
        debug!("Creating {}", resource);
        let operation = format!("create {}", resource);

        let object: DynamicObject = serde_json::from_value(object.clone())
            .map_err(|e| ClusterError::decode_failed(operation.as_str(), e.to_string()))?;
        let created = self
            .dynamic(resource)
            .create(&PostParams::default(), &object)
            .await
            .map_err(|e| cluster_error(operation.as_str(), e))?;

        to_value(&operation, &created)
    }

    async fn delete_custom_object(&self, resource: &CustomResourceRef, name: &str) -> Result<()> {
        debug!("Deleting {} {}", resource, name);
        match self
            .dynamic(resource)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(status)) if status.code == 404 => {
                debug!("{} {} already gone", resource, name);
                Ok(())
            }
            Err(e) => Err(cluster_error(format!("delete {} {}", resource, name), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::from_kubeconfig;
    use axum::extract::{Path as UrlPath, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{delete, get, patch, post};
    use axum::{Json, Router};
    use kube::config::Kubeconfig;
    use std::collections::HashMap;
    use tierwise_core::labels::{workflow_nodes, workflows};
    use tokio::net::TcpListener;

    async fn spawn_api(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Client configured through a kubeconfig with a bearer token user
    async fn client_for(server: String) -> KubeClient {
        let kubeconfig = Kubeconfig::from_yaml(&format!(
            r#"
apiVersion: v1
kind: Config
current-context: test
contexts:
  - name: test
    context:
      cluster: test
      user: test
clusters:
  - name: test
    cluster:
      server: {server}
users:
  - name: test
    user:
      token: t0ken
"#
        ))
        .unwrap();
        KubeClient::new(from_kubeconfig(kubeconfig).await.unwrap()).unwrap()
    }

    fn list_of(kind: &str, items: Vec<Value>) -> Json<Value> {
        Json(json!({
            "apiVersion": "v1",
            "kind": kind,
            "metadata": {"resourceVersion": "1"},
            "items": items,
        }))
    }

    fn failure(code: StatusCode, reason: &str) -> (StatusCode, Json<Value>) {
        (
            code,
            Json(json!({
                "apiVersion": "v1",
                "kind": "Status",
                "status": "Failure",
                "message": format!("{} by test server", reason),
                "reason": reason,
                "code": code.as_u16(),
            })),
        )
    }

    #[tokio::test]
    async fn test_list_nodes_sends_bearer_token() {
        let router = Router::new().route(
            "/api/v1/nodes",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let name = if auth == "Bearer t0ken" { "authorized" } else { "anonymous" };
                list_of("NodeList", vec![json!({"metadata": {"name": name}})])
            }),
        );
        let client = client_for(spawn_api(router).await).await;

        let nodes = client.list_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].metadata.name.as_deref(), Some("authorized"));
    }

    #[tokio::test]
    async fn test_patch_node_labels_sends_merge_patch() {
        let router = Router::new().route(
            "/api/v1/nodes/{name}",
            patch(|UrlPath(name): UrlPath<String>, headers: HeaderMap, body: String| async move {
                let content_type = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if content_type != "application/merge-patch+json" {
                    return failure(StatusCode::UNSUPPORTED_MEDIA_TYPE, "UnsupportedMediaType");
                }
                let patch: Value = serde_json::from_str(&body).unwrap();
                (
                    StatusCode::OK,
                    Json(json!({
                        "apiVersion": "v1",
                        "kind": "Node",
                        "metadata": {"name": name, "labels": patch["metadata"]["labels"]},
                    })),
                )
            }),
        );
        let client = client_for(spawn_api(router).await).await;

        let labels = BTreeMap::from([("tier".to_string(), "large".to_string())]);
        client.patch_node_labels("pool-ip-1", &labels).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_custom_objects_passes_label_selector() {
        let router = Router::new().route(
            "/apis/argoproj.io/v1alpha1/namespaces/argo/workflows",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                let selector = q.get("labelSelector").cloned().unwrap_or_default();
                list_of("WorkflowList", vec![json!({"metadata": {"name": selector}})])
            }),
        );
        let client = client_for(spawn_api(router).await).await;

        let items = client
            .list_custom_objects(&workflows(), Some("a=b,c=d"))
            .await
            .unwrap();
        assert_eq!(items[0]["metadata"]["name"], "a=b,c=d");
    }

    #[tokio::test]
    async fn test_create_custom_object_returns_stored_object() {
        let router = Router::new().route(
            "/apis/workflow.io/v1/workflownodes",
            post(|Json(mut object): Json<Value>| async move {
                object["metadata"]["uid"] = json!("0000-1111");
                (StatusCode::CREATED, Json(object))
            }),
        );
        let client = client_for(spawn_api(router).await).await;

        let object = json!({
            "apiVersion": "workflow.io/v1",
            "kind": "WorkflowNodes",
            "metadata": {"name": "pool-ip-1"},
            "spec": {"cpu": "4"},
        });
        let created = client
            .create_custom_object(&workflow_nodes(), &object)
            .await
            .unwrap();
        assert_eq!(created["metadata"]["name"], "pool-ip-1");
        assert_eq!(created["metadata"]["uid"], "0000-1111");
        assert_eq!(created["spec"]["cpu"], "4");
        assert_eq!(created["kind"], "WorkflowNodes");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let router = Router::new().route(
            "/api/v1/nodes",
            get(|| async { failure(StatusCode::FORBIDDEN, "Forbidden") }),
        );
        let client = client_for(spawn_api(router).await).await;

        let err = client.list_nodes().await.unwrap_err();
        assert!(matches!(err, ClusterError::ApiStatus { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_object_succeeds() {
        let router = Router::new().route(
            "/apis/workflow.io/v1/workflownodes/{name}",
            delete(|UrlPath(_name): UrlPath<String>| async {
                failure(StatusCode::NOT_FOUND, "NotFound")
            }),
        );
        let client = client_for(spawn_api(router).await).await;

        client.delete_custom_object(&workflow_nodes(), "gone").await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let client = client_for("http://127.0.0.1:1".to_string()).await;
        let err = client.list_nodes().await.unwrap_err();
        assert!(matches!(err, ClusterError::RequestFailed { .. }));
    }
}
