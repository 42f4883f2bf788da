//! Tierwise Proxy - intercepting proxy in front of the workflow server
//!
//! This crate provides:
//! - Per-connection HTTP/1 serving of an axum router with load shedding
//! - Inline scheduling of workflow submissions
//! - Verbatim relay of backend responses
//! - The Prometheus scrape endpoint

pub mod error;
pub mod handlers;
pub mod metrics_server;
pub mod server;
pub mod state;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use error::{ProxyError, Result};
pub use metrics_server::MetricsServer;
pub use server::{build_router, ProxyConfig, ProxyServer};
pub use state::{AppState, BackendTarget};
