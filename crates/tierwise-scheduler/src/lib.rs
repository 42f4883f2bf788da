//! Tierwise Scheduler - size-aware workflow placement
//!
//! This crate provides:
//! - Tier catalog access with last-known fallback
//! - Node classification into worker tiers
//! - Workflow placement on the smallest sufficient tier
//! - Node registry reconciliation
//! - Per-tier gauges and their publication loop

pub mod catalog;
pub mod classify;
pub mod decision;
pub mod error;
pub mod gauges;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod fixtures;

// Re-export commonly used types
pub use error::{Result, SchedulerError};
pub use gauges::GaugeRegistry;
pub use scheduler::{SchedulerConfig, TierScheduler};
pub use types::{Assignment, ClassificationReport, ItemFailure, RegistryDiff, RegistrySync};
