use crate::error::ProxyError;
use crate::handlers;
use crate::state::AppState;
use axum::error_handling::HandleErrorLayer;
use axum::{BoxError, Router};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::load_shed::error::Overloaded;
use tower::{ServiceBuilder, ServiceExt};
use tracing::{debug, info, warn};

/// Proxy server configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address to listen on
    pub listen_addr: SocketAddr,
    /// Requests processed at once before new ones are shed with 503
    pub max_concurrent_requests: usize,
    /// How long in-flight connections may take to finish on shutdown
    pub shutdown_grace: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_concurrent_requests: 256,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

async fn handle_overload(err: BoxError) -> ProxyError {
    if err.is::<Overloaded>() {
        ProxyError::Overloaded
    } else {
        ProxyError::Internal(err.to_string())
    }
}

/// Build the proxy router: every path goes to the proxy handler behind a
/// shared concurrency limit
pub fn build_router(state: AppState, max_concurrent_requests: usize) -> Router {
    Router::new()
        .fallback(handlers::proxy)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_overload))
                .load_shed()
                .layer(GlobalConcurrencyLimitLayer::new(max_concurrent_requests)),
        )
        .with_state(state)
}

/// Intercepting proxy in front of the workflow server
pub struct ProxyServer {
    listener: TcpListener,
    router: Router,
    config: ProxyConfig,
}

impl ProxyServer {
    /// Bind the listening socket
    pub async fn bind(config: ProxyConfig, state: AppState) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let router = build_router(state, config.max_concurrent_requests);
        Ok(Self {
            listener,
            router,
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve connections until the token is cancelled, then let in-flight
    /// connections finish within the grace period
    pub async fn run(self, token: CancellationToken) -> std::io::Result<()> {
        info!("Starting proxy on {}", self.local_addr()?);
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Proxy shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    tracker.spawn(serve_connection(stream, peer, self.router.clone(), token.clone()));
                }
            }
        }

        tracker.close();
        if tokio::time::timeout(self.config.shutdown_grace, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = tracker.len(),
                "Connections still open after {:?}, abandoning them",
                self.config.shutdown_grace
            );
        }
        Ok(())
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    router: Router,
    token: CancellationToken,
) {
    let service = service_fn(move |req: Request<Incoming>| router.clone().oneshot(req));
    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let cancelled = token.cancelled();
    tokio::pin!(cancelled);
    let mut draining = false;

    let result = loop {
        tokio::select! {
            result = conn.as_mut() => break result,
            _ = &mut cancelled, if !draining => {
                debug!(%peer, "Draining connection");
                conn.as_mut().graceful_shutdown();
                draining = true;
            }
        }
    };

    if let Err(e) = result {
        warn!(%peer, "Connection closed with error: {}", e);
    }
}
