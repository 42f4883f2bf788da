//! Tierwise Cluster - access to the orchestration platform
//!
//! This crate provides:
//! - The `ClusterApi` trait the scheduler is written against
//! - `KubeClient`, backed by the kube client
//! - Credential discovery (in-cluster service account, then kubeconfig)
//! - `MockCluster` for tests

// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod api_client;
pub mod config;
pub mod error;
pub mod mock;
pub mod traits;

// Re-export primary types
pub use api_client::KubeClient;
pub use config::{discover_config, from_kubeconfig_file};
pub use error::{ClusterError, Result};
pub use mock::MockCluster;
pub use traits::ClusterApi;
