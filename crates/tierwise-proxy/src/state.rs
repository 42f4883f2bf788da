use crate::error::{ProxyError, Result};
use std::sync::Arc;
use std::time::Duration;
use tierwise_scheduler::TierScheduler;

/// Where requests are forwarded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    /// Scheme, host and port, without a trailing slash
    pub base_url: String,
    /// Value for the Host header of forwarded requests
    pub authority: String,
}

impl BackendTarget {
    /// Build a target from a server URL such as `http://argo-server` and a port
    pub fn new(server: &str, port: u16) -> Result<Self> {
        let server = server.trim().trim_end_matches('/');
        let host = server
            .strip_prefix("http://")
            .or_else(|| server.strip_prefix("https://"))
            .ok_or_else(|| ProxyError::InvalidTarget {
                target: server.to_string(),
                reason: "missing http:// or https:// scheme".to_string(),
            })?;

        if host.is_empty() || host.contains('/') {
            return Err(ProxyError::InvalidTarget {
                target: server.to_string(),
                reason: "expected a bare host without path".to_string(),
            });
        }

        let authority = format!("{}:{}", host, port);
        Ok(Self {
            base_url: format!("{}:{}", server, port),
            authority,
        })
    }

    /// Absolute backend URL for a request path (with query)
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }
}

/// Shared proxy state
#[derive(Clone)]
pub struct AppState {
    /// Scheduler placing submitted workflows; `None` forwards them untouched
    pub scheduler: Option<Arc<TierScheduler>>,

    /// Client reused for every backend request
    pub client: reqwest::Client,

    pub backend: BackendTarget,

    /// Path whose JSON POSTs are workflow submissions
    pub submission_path: String,
}

impl AppState {
    pub fn new(
        scheduler: Option<Arc<TierScheduler>>,
        backend: BackendTarget,
        submission_path: impl Into<String>,
        backend_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(backend_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            scheduler,
            client,
            backend,
            submission_path: submission_path.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_target() {
        let target = BackendTarget::new("http://0.0.0.0", 2746).unwrap();
        assert_eq!(target.base_url, "http://0.0.0.0:2746");
        assert_eq!(target.authority, "0.0.0.0:2746");
        assert_eq!(
            target.url_for("/api/v1/workflows/argo?x=1"),
            "http://0.0.0.0:2746/api/v1/workflows/argo?x=1"
        );

        let target = BackendTarget::new("https://argo-server/", 443).unwrap();
        assert_eq!(target.base_url, "https://argo-server:443");
    }

    #[test]
    fn test_backend_target_rejects_garbage() {
        assert!(BackendTarget::new("argo-server", 2746).is_err());
        assert!(BackendTarget::new("http://argo/api", 2746).is_err());
        assert!(BackendTarget::new("http://", 2746).is_err());
    }
}
