// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// Metrics cannot be defined because the tier catalog is empty
    #[error("No workflow workers defined.")]
    #[diagnostic(
        code(scheduler::no_tiers_defined),
        help("Create at least one workflowworkers.workflow.io object; publishing is retried every cycle")
    )]
    NoTiersDefined,

    /// Computing or applying a placement for a workflow failed
    #[error("Scheduling failed: {message}")]
    #[diagnostic(
        code(scheduler::scheduling_failed),
        help("{suggestion}")
    )]
    SchedulingFailed {
        message: String,
        suggestion: String,
    },

    /// Invalid scheduler configuration
    #[error("Invalid scheduler configuration: {message}")]
    #[diagnostic(
        code(scheduler::invalid_config),
        help("Check the worker label and registry name patterns")
    )]
    InvalidConfig {
        message: String,
    },

    /// Cluster API error
    #[error("Cluster error: {0}")]
    #[diagnostic(
        code(scheduler::cluster_error),
        help("Check connectivity and permissions against the cluster API")
    )]
    ClusterError(#[from] tierwise_cluster::ClusterError),
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create a SchedulingFailed error
    pub fn scheduling_failed(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::SchedulingFailed {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
