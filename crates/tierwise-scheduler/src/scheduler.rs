use crate::catalog::TierCatalog;
use crate::classify::classify_nodes;
use crate::decision::schedule_workflow;
use crate::error::{Result, SchedulerError};
use crate::gauges::GaugeRegistry;
use crate::metrics::MetricsPublisher;
use crate::registry;
use crate::types::{ClassificationReport, RegistrySync};
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tierwise_cluster::ClusterApi;
use tierwise_core::labels::{anchored, DEFAULT_REGISTRY_NAME_PATTERN, DEFAULT_WORKER_LABEL_PATTERN};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Configuration for the tier scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between registry sync and metric publication
    pub publish_interval: Duration,
    /// Regex matched against node label keys to find worker nodes
    pub worker_label_pattern: String,
    /// Regex matched against node names to find registry nodes
    pub registry_name_pattern: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            publish_interval: Duration::from_secs(5),
            worker_label_pattern: DEFAULT_WORKER_LABEL_PATTERN.to_string(),
            registry_name_pattern: DEFAULT_REGISTRY_NAME_PATTERN.to_string(),
        }
    }
}

/// Size-aware workflow scheduler
///
/// Shared between the proxy, which asks it to place submitted workflows,
/// and the periodic task that keeps node labels, the node registry and the
/// gauges up to date.
pub struct TierScheduler {
    cluster: Arc<dyn ClusterApi>,
    catalog: TierCatalog,
    publisher: MetricsPublisher,
    gauges: Arc<GaugeRegistry>,
    worker_pattern: Regex,
    registry_pattern: Regex,
    config: SchedulerConfig,
}

impl TierScheduler {
    pub fn new(cluster: Arc<dyn ClusterApi>, config: SchedulerConfig) -> Result<Self> {
        let worker_pattern = anchored(&config.worker_label_pattern).map_err(|e| {
            SchedulerError::invalid_config(format!("worker label pattern: {}", e))
        })?;
        let registry_pattern = anchored(&config.registry_name_pattern).map_err(|e| {
            SchedulerError::invalid_config(format!("registry name pattern: {}", e))
        })?;
        let gauges = Arc::new(GaugeRegistry::new());

        Ok(Self {
            catalog: TierCatalog::new(cluster.clone()),
            publisher: MetricsPublisher::new(cluster.clone(), gauges.clone()),
            cluster,
            gauges,
            worker_pattern,
            registry_pattern,
            config,
        })
    }

    /// Gauges backing the metrics endpoint
    pub fn gauges(&self) -> Arc<GaugeRegistry> {
        self.gauges.clone()
    }

    /// Place a submitted workflow. Never fails; on any problem the body is
    /// returned unchanged.
    pub async fn schedule(&self, body: Value) -> Value {
        let tiers = self.catalog.list_tiers().await;
        if tiers.is_empty() {
            debug!("No worker tiers known, submitting workflow unscheduled");
            return body;
        }
        schedule_workflow(body, &tiers)
    }

    /// Label worker nodes with their tier
    pub async fn classify(&self) -> Result<ClassificationReport> {
        let tiers = self.catalog.list_tiers().await;
        let nodes = self.cluster.list_nodes().await?;
        Ok(classify_nodes(self.cluster.as_ref(), &nodes, &tiers, &self.worker_pattern).await)
    }

    /// Bring the node registry in line with the live nodes
    pub async fn sync_registry(&self) -> Result<RegistrySync> {
        let nodes = self.cluster.list_nodes().await?;
        Ok(registry::sync_registry(self.cluster.as_ref(), &nodes, &self.registry_pattern).await)
    }

    /// Define gauges from the catalog and publish them.
    ///
    /// Fails with [`SchedulerError::NoTiersDefined`] while the catalog is
    /// empty; the next call tries again.
    pub async fn check_and_publish(&self) -> Result<ClassificationReport> {
        let tiers = self.catalog.list_tiers().await;
        self.publisher.define_publishers(&tiers);
        if !self.publisher.is_defined() {
            return Err(SchedulerError::NoTiersDefined);
        }
        self.publisher.publish(&tiers, &self.worker_pattern).await
    }

    async fn tick(&self) {
        match self.sync_registry().await {
            Ok(sync) => {
                for failure in &sync.failures {
                    warn!("Registry sync failed for {}: {}", failure.name, failure.reason);
                }
            }
            Err(e) => error!("Registry sync failed: {}", e),
        }

        match self.check_and_publish().await {
            Ok(report) => debug!(tiers = ?report.counts, "Node classification complete"),
            Err(e @ SchedulerError::NoTiersDefined) => warn!("{}", e),
            Err(e) => error!("Metric publication failed: {}", e),
        }
    }

    /// Run the periodic registry sync and metric publication loop
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        info!(
            "Starting tier scheduler (interval: {:?})",
            self.config.publish_interval
        );

        let mut interval = tokio::time::interval(self.config.publish_interval);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Tier scheduler shutting down");
                    return Ok(());
                }
                _ = interval.tick() => self.tick().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use serde_json::json;
    use tierwise_cluster::MockCluster;
    use tierwise_core::labels::{worker_tiers, workflow_nodes, TIER_LABEL};

    fn scheduler(cluster: &MockCluster) -> TierScheduler {
        TierScheduler::new(Arc::new(cluster.clone()), SchedulerConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let config = SchedulerConfig {
            worker_label_pattern: "(".to_string(),
            ..Default::default()
        };
        let result = TierScheduler::new(Arc::new(MockCluster::new()), config);
        assert!(matches!(result, Err(SchedulerError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_no_tiers_then_success() {
        let cluster = MockCluster::new();
        cluster.add_node(worker_node("pool-ip-1", "16", "32Gi")).await;
        let scheduler = scheduler(&cluster);

        let err = scheduler.check_and_publish().await.unwrap_err();
        assert!(matches!(err, SchedulerError::NoTiersDefined));
        assert_eq!(err.to_string(), "No workflow workers defined.");

        cluster.add_object(&worker_tiers(), tier_object("large", 8, "16Gi")).await;
        let report = scheduler.check_and_publish().await.unwrap();
        assert_eq!(report.count("large"), 1);
        assert_eq!(scheduler.gauges().get("large_count"), Some(1));
    }

    #[tokio::test]
    async fn test_schedule_uses_catalog() {
        let cluster = MockCluster::new();
        cluster.add_object(&worker_tiers(), tier_object("small", 2, "4Gi")).await;
        cluster.add_object(&worker_tiers(), tier_object("large", 8, "16Gi")).await;
        let scheduler = scheduler(&cluster);

        let body = json!({"workflow": {
            "metadata": {"labels": {"workflow": "wf"}},
            "spec": {"templates": [{
                "name": "main",
                "script": {"resources": {"limits": {"cpu": 4, "memory": "8Gi"}}}
            }]}
        }});
        let out = scheduler.schedule(body).await;
        assert_eq!(out["workflow"]["metadata"]["labels"][TIER_LABEL], "large");
    }

    #[tokio::test]
    async fn test_schedule_without_cluster_is_passthrough() {
        let cluster = MockCluster::new();
        cluster.set_unavailable(true).await;
        let scheduler = scheduler(&cluster);

        let body = json!({"workflow": {"spec": {"templates": []}}});
        assert_eq!(scheduler.schedule(body.clone()).await, body);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let cluster = MockCluster::new();
        cluster.add_object(&worker_tiers(), tier_object("large", 8, "16Gi")).await;
        cluster.add_node(worker_node("pool-ip-1", "16", "32Gi")).await;
        let scheduler = Arc::new(scheduler(&cluster));

        let token = CancellationToken::new();
        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            let token = token.clone();
            async move { scheduler.run(token).await }
        });

        // The first tick fires immediately
        let mut registered = Vec::new();
        for _ in 0..50 {
            registered = cluster.objects(&workflow_nodes()).await;
            if !registered.is_empty() && scheduler.gauges().get("large_count") == Some(1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registered.len(), 1);
        assert_eq!(scheduler.gauges().get("large_count"), Some(1));

        token.cancel();
        handle.await.unwrap().unwrap();
    }
}
