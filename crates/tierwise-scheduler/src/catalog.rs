use parking_lot::RwLock;
use std::sync::Arc;
use tierwise_cluster::ClusterApi;
use tierwise_core::{labels, Tier};
use tracing::{debug, warn};

/// Reads worker tier definitions from the cluster
///
/// The last successful listing is kept so that a transient API failure
/// degrades to the previously known catalog instead of an empty one.
pub struct TierCatalog {
    cluster: Arc<dyn ClusterApi>,
    last_known: RwLock<Vec<Tier>>,
}

impl TierCatalog {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self {
            cluster,
            last_known: RwLock::new(Vec::new()),
        }
    }

    /// List all valid tiers. Invalid definitions are logged and skipped.
    pub async fn list_tiers(&self) -> Vec<Tier> {
        let items = match self
            .cluster
            .list_custom_objects(&labels::worker_tiers(), None)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                let cached = self.last_known.read().clone();
                warn!(
                    error = %e,
                    cached = cached.len(),
                    "Error fetching worker tiers, using last known catalog"
                );
                return cached;
            }
        };

        let mut tiers = Vec::with_capacity(items.len());
        for item in &items {
            match Tier::from_custom_object(item) {
                Ok(tier) => tiers.push(tier),
                Err(e) => warn!("Skipping invalid worker tier: {}", e),
            }
        }

        debug!("Found {} worker tiers", tiers.len());
        *self.last_known.write() = tiers.clone();
        tiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tierwise_cluster::MockCluster;

    #[tokio::test]
    async fn test_list_tiers_skips_invalid() {
        let cluster = MockCluster::new();
        let res = labels::worker_tiers();
        cluster
            .add_object(&res, json!({"metadata": {"name": "small"}, "spec": {"cpu": 2, "memory": "4Gi"}}))
            .await;
        cluster
            .add_object(&res, json!({"metadata": {"name": "broken"}, "spec": {"cpu": 2, "memory": "10XB"}}))
            .await;

        let catalog = TierCatalog::new(Arc::new(cluster));
        let tiers = catalog.list_tiers().await;
        assert_eq!(tiers.len(), 1);
        assert_eq!(tiers[0].name, "small");
    }

    #[tokio::test]
    async fn test_list_tiers_falls_back_to_last_known() {
        let cluster = MockCluster::new();
        cluster
            .add_object(
                &labels::worker_tiers(),
                json!({"metadata": {"name": "small"}, "spec": {"cpu": 2, "memory": "4Gi"}}),
            )
            .await;

        let catalog = TierCatalog::new(Arc::new(cluster.clone()));
        assert_eq!(catalog.list_tiers().await.len(), 1);

        cluster.set_unavailable(true).await;
        assert_eq!(catalog.list_tiers().await.len(), 1);
    }

    #[tokio::test]
    async fn test_list_tiers_unavailable_without_cache_is_empty() {
        let cluster = MockCluster::new();
        cluster.set_unavailable(true).await;

        let catalog = TierCatalog::new(Arc::new(cluster));
        assert!(catalog.list_tiers().await.is_empty());
    }
}
