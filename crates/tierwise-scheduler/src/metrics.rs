use crate::classify::classify_nodes;
use crate::error::Result;
use crate::gauges::GaugeRegistry;
use crate::types::ClassificationReport;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tierwise_cluster::ClusterApi;
use tierwise_core::labels::{label_selector, workflows, TIER_LABEL, WORKFLOW_PHASE_LABEL};
use tierwise_core::Tier;
use tracing::{debug, info, warn};

/// What a per-tier gauge counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricCategory {
    /// Nodes classified into the tier
    Nodes,
    PendingWorkflows,
    /// Running workflows with at least one step still waiting for a pod
    PodsPendingWorkflows,
    RunningWorkflows,
    SucceededWorkflows,
    ErrorWorkflows,
    FailedWorkflows,
}

impl MetricCategory {
    pub const ALL: [MetricCategory; 7] = [
        MetricCategory::Nodes,
        MetricCategory::PendingWorkflows,
        MetricCategory::PodsPendingWorkflows,
        MetricCategory::RunningWorkflows,
        MetricCategory::SucceededWorkflows,
        MetricCategory::ErrorWorkflows,
        MetricCategory::FailedWorkflows,
    ];

    /// Gauge name for a tier. Dashes are not valid in metric names.
    pub fn gauge_name(&self, tier: &str) -> String {
        let name = match self {
            MetricCategory::Nodes => format!("{}_count", tier),
            MetricCategory::PendingWorkflows => format!("workflow_pending_{}_count", tier),
            MetricCategory::PodsPendingWorkflows => format!("workflow_pods_pending_{}_count", tier),
            MetricCategory::RunningWorkflows => format!("workflow_running_{}_count", tier),
            MetricCategory::SucceededWorkflows => format!("workflow_succeed_{}_count", tier),
            MetricCategory::ErrorWorkflows => format!("error_finished_{}_count", tier),
            MetricCategory::FailedWorkflows => format!("failed_finished_{}_count", tier),
        };
        name.replace('-', "_")
    }

    pub fn help(&self, tier: &str) -> String {
        match self {
            MetricCategory::Nodes => format!("Number of {} nodes", tier),
            MetricCategory::PendingWorkflows => format!("Number of pending workflows for {}", tier),
            MetricCategory::PodsPendingWorkflows => {
                format!("Number of workflows with pending pods for {}", tier)
            }
            MetricCategory::RunningWorkflows => format!("Number of running workflows for {}", tier),
            MetricCategory::SucceededWorkflows => {
                format!("Number of succeeded workflows for {}", tier)
            }
            MetricCategory::ErrorWorkflows => format!("Number of error workflows for {}", tier),
            MetricCategory::FailedWorkflows => format!("Number of failed workflows for {}", tier),
        }
    }

    /// Workflow phase label value counted by this category, if it is a
    /// plain phase count
    pub fn phase(&self) -> Option<&'static str> {
        match self {
            MetricCategory::PendingWorkflows => Some("Pending"),
            MetricCategory::RunningWorkflows => Some("Running"),
            MetricCategory::SucceededWorkflows => Some("Succeeded"),
            MetricCategory::ErrorWorkflows => Some("Error"),
            MetricCategory::FailedWorkflows => Some("Failed"),
            MetricCategory::Nodes | MetricCategory::PodsPendingWorkflows => None,
        }
    }
}

/// True if a workflow has a DAG or Pod step in the Pending phase
pub fn has_pending_pods(workflow: &Value) -> bool {
    let Some(nodes) = workflow.pointer("/status/nodes").and_then(Value::as_object) else {
        return false;
    };
    nodes.values().any(|node| {
        matches!(node.get("type").and_then(Value::as_str), Some("DAG") | Some("Pod"))
            && node.get("phase").and_then(Value::as_str) == Some("Pending")
    })
}

/// Publishes per-tier node and workflow counts into a [`GaugeRegistry`]
pub struct MetricsPublisher {
    cluster: Arc<dyn ClusterApi>,
    gauges: Arc<GaugeRegistry>,
    defined: RwLock<BTreeSet<String>>,
}

impl MetricsPublisher {
    pub fn new(cluster: Arc<dyn ClusterApi>, gauges: Arc<GaugeRegistry>) -> Self {
        Self {
            cluster,
            gauges,
            defined: RwLock::new(BTreeSet::new()),
        }
    }

    /// Tiers that currently have gauges
    pub fn defined_tiers(&self) -> Vec<String> {
        self.defined.read().iter().cloned().collect()
    }

    pub fn is_defined(&self) -> bool {
        !self.defined.read().is_empty()
    }

    /// Create gauges for new tiers and retire those of vanished tiers
    pub fn define_publishers(&self, tiers: &[Tier]) {
        let current: BTreeSet<String> = tiers.iter().map(|t| t.name.clone()).collect();
        let mut defined = self.defined.write();

        for stale in defined.difference(&current) {
            for category in MetricCategory::ALL {
                self.gauges.unregister(&category.gauge_name(stale));
            }
            info!("Retired metrics of removed worker tier {}", stale);
        }

        for tier in current.difference(&defined) {
            for category in MetricCategory::ALL {
                self.gauges
                    .register(&category.gauge_name(tier), &category.help(tier));
            }
            debug!("Defined metrics for worker tier {}", tier);
        }

        *defined = current;
    }

    async fn count_workflows(&self, tier: &str, phase: &str) -> Option<Vec<Value>> {
        let selector = label_selector(&[(TIER_LABEL, tier), (WORKFLOW_PHASE_LABEL, phase)]);
        match self
            .cluster
            .list_custom_objects(&workflows(), Some(&selector))
            .await
        {
            Ok(items) => Some(items),
            Err(e) => {
                warn!("Error fetching {} workflows for {}: {}", phase, tier, e);
                None
            }
        }
    }

    /// Reclassify nodes and refresh every defined gauge.
    ///
    /// Gauges whose workflow listing fails keep their previous value.
    pub async fn publish(&self, tiers: &[Tier], worker_pattern: &Regex) -> Result<ClassificationReport> {
        let nodes = self.cluster.list_nodes().await?;
        let report = classify_nodes(self.cluster.as_ref(), &nodes, tiers, worker_pattern).await;

        for tier in self.defined_tiers() {
            self.gauges.set(
                &MetricCategory::Nodes.gauge_name(&tier),
                report.count(&tier) as i64,
            );

            for category in MetricCategory::ALL {
                let Some(phase) = category.phase() else {
                    continue;
                };
                if let Some(items) = self.count_workflows(&tier, phase).await {
                    self.gauges.set(&category.gauge_name(&tier), items.len() as i64);
                }
            }

            if let Some(running) = self.count_workflows(&tier, "Running").await {
                let waiting = running.iter().filter(|wf| has_pending_pods(wf)).count();
                self.gauges.set(
                    &MetricCategory::PodsPendingWorkflows.gauge_name(&tier),
                    waiting as i64,
                );
            }
        }

        debug!(tiers = self.defined.read().len(), "Published metrics");
        Ok(report)
    }
}
