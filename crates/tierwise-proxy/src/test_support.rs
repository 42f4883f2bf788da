//! Throwaway backend and scheduler used by the proxy tests.

use crate::state::{AppState, BackendTarget};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tierwise_cluster::MockCluster;
use tierwise_core::labels::worker_tiers;
use tierwise_scheduler::{SchedulerConfig, TierScheduler};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::Notify;

pub use tierwise_core::labels::TIER_LABEL;

pub const SUBMISSION_PATH: &str = "/api/v1/workflows/argo";

/// Lets a test hold a backend request open
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

pub struct Backend {
    pub addr: SocketAddr,
    pub gate: Arc<Gate>,
}

/// Answers 201 with the received body, and the Host header it saw
async fn echo(headers: HeaderMap, body: Bytes) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::CREATED)
        .header("x-backend", "echo");
    if let Some(host) = headers.get(header::HOST) {
        builder = builder.header("x-seen-host", host.clone());
    }
    builder.body(Body::from(body)).unwrap()
}

async fn slow(State(gate): State<Arc<Gate>>) -> &'static str {
    gate.entered.notify_one();
    gate.release.notified().await;
    "done"
}

pub async fn spawn_backend() -> Backend {
    let gate = Arc::new(Gate::default());
    let app = Router::new()
        .route("/slow", post(slow))
        .fallback(echo)
        .with_state(gate.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    Backend { addr, gate }
}

/// Backend that reads the request, then closes the socket without answering
pub async fn spawn_hangup_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            drop(stream);
        }
    });
    addr
}

pub fn state_for(backend: &Backend, scheduler: Option<Arc<TierScheduler>>) -> AppState {
    state_with_timeout(backend.addr, scheduler, Duration::from_secs(5))
}

pub fn state_with_timeout(
    addr: SocketAddr,
    scheduler: Option<Arc<TierScheduler>>,
    timeout: Duration,
) -> AppState {
    let target = BackendTarget::new("http://127.0.0.1", addr.port()).unwrap();
    AppState::new(scheduler, target, SUBMISSION_PATH, timeout).unwrap()
}

/// Scheduler over tiers small (2, 4Gi) and large (8, 16Gi)
pub async fn scheduler_with_tiers() -> TierScheduler {
    let cluster = MockCluster::new();
    for (name, cpu, memory) in [("small", 2, "4Gi"), ("large", 8, "16Gi")] {
        cluster
            .add_object(
                &worker_tiers(),
                json!({"metadata": {"name": name}, "spec": {"cpu": cpu, "memory": memory}}),
            )
            .await;
    }
    TierScheduler::new(Arc::new(cluster), SchedulerConfig::default()).unwrap()
}

pub fn submission(cpu: u64, memory: &str) -> Value {
    json!({
        "namespace": "argo",
        "workflow": {
            "metadata": {"generateName": "wf-", "labels": {"workflow": "wf-1"}},
            "spec": {"templates": [{
                "name": "main",
                "script": {"image": "python", "resources": {"requests": {"cpu": cpu, "memory": memory}}}
            }]}
        }
    })
}
