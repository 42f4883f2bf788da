//! Tierwise Core - Fundamental types for size-aware workflow placement
//!
//! This crate provides:
//! - Resource quantity parsing (CPU and memory)
//! - Worker tier definitions and their ordering
//! - Label keys and custom resource coordinates
//! - Error types with miette diagnostics

pub mod error;
pub mod labels;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use error::{QuantityError, Result, TierwiseError};
pub use resources::ResourceQuantities;
pub use types::{
    is_schedulable, node_capacity, node_name, sort_tiers_ascending, sort_tiers_descending,
    CustomResourceRef, Tier,
};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::Node;
