use crate::types::{Assignment, ClassificationReport, ItemFailure};
use k8s_openapi::api::core::v1::Node;
use regex::Regex;
use std::collections::BTreeMap;
use tierwise_cluster::ClusterApi;
use tierwise_core::labels::{any_key_matches, TIER_LABEL};
use tierwise_core::{
    is_schedulable, node_capacity, node_name, sort_tiers_descending, ResourceQuantities, Tier,
};
use tracing::{debug, info, warn};

/// True for schedulable nodes carrying a worker label
pub fn is_worker(node: &Node, worker_pattern: &Regex) -> bool {
    let has_worker_label = node
        .metadata
        .labels
        .as_ref()
        .map(|labels| any_key_matches(labels.keys(), worker_pattern))
        .unwrap_or(false);

    has_worker_label && is_schedulable(node)
}

/// Decide which tier each eligible node belongs to.
///
/// Nodes are visited largest first and each gets the largest tier whose
/// thresholds it meets. Nodes meeting no tier are left out.
pub fn plan_classification(
    nodes: &[Node],
    tiers: &[Tier],
    worker_pattern: &Regex,
) -> Vec<Assignment> {
    let mut candidates: Vec<(ResourceQuantities, &Node)> = Vec::new();
    for node in nodes.iter().filter(|n| is_worker(n, worker_pattern)) {
        match node_capacity(node) {
            Ok(capacity) => candidates.push((capacity, node)),
            Err(e) => warn!("Skipping node {}: {}", node_name(node), e),
        }
    }
    candidates.sort_by(|(a, na), (b, nb)| b.cmp(a).then_with(|| node_name(na).cmp(node_name(nb))));

    let mut tiers = tiers.to_vec();
    sort_tiers_descending(&mut tiers);

    let mut assignments = Vec::new();
    for (capacity, node) in candidates {
        let name = node_name(node);
        match tiers.iter().find(|t| capacity.dominates(&t.resources)) {
            Some(tier) => {
                let already_labeled = node
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(TIER_LABEL))
                    .map(|current| current == &tier.name)
                    .unwrap_or(false);

                assignments.push(Assignment {
                    node_name: name.to_string(),
                    tier: tier.name.clone(),
                    already_labeled,
                });
            }
            None => debug!("Node {} satisfies no worker tier", name),
        }
    }

    assignments
}

/// Label every eligible node with its tier and count nodes per tier.
///
/// Patch failures are recorded per node and never abort the pass. Nodes that
/// already carry the right label are counted without another patch.
pub async fn classify_nodes(
    cluster: &dyn ClusterApi,
    nodes: &[Node],
    tiers: &[Tier],
    worker_pattern: &Regex,
) -> ClassificationReport {
    let mut report = ClassificationReport::default();

    for assignment in plan_classification(nodes, tiers, worker_pattern) {
        if !assignment.already_labeled {
            let labels = BTreeMap::from([(TIER_LABEL.to_string(), assignment.tier.clone())]);
            if let Err(e) = cluster
                .patch_node_labels(&assignment.node_name, &labels)
                .await
            {
                warn!(
                    "Failed to label node {} as {}: {}",
                    assignment.node_name, assignment.tier, e
                );
                report
                    .failures
                    .push(ItemFailure::new(&assignment.node_name, e.to_string()));
                continue;
            }
            info!("Labeled node {} as {}", assignment.node_name, assignment.tier);
        }

        *report.counts.entry(assignment.tier).or_insert(0) += 1;
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use tierwise_cluster::MockCluster;

    #[test]
    fn test_largest_satisfied_tier_wins() {
        let nodes = vec![worker_node("pool-ip-1", "16", "32Gi")];
        let plan = plan_classification(&nodes, &small_and_large(), &worker_pattern());

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].tier, "large");
    }

    #[test]
    fn test_memory_must_also_fit() {
        // 16 cores but only 8Gi: fails large on memory, falls to small
        let nodes = vec![worker_node("pool-ip-1", "16", "8Gi")];
        let plan = plan_classification(&nodes, &small_and_large(), &worker_pattern());
        assert_eq!(plan[0].tier, "small");
    }

    #[test]
    fn test_ineligible_nodes_are_skipped() {
        let nodes = vec![
            node("plain", "16", "32Gi", false, true),
            node("cordoned", "16", "32Gi", true, false),
            worker_node("tiny", "1", "1Gi"),
            worker_node("garbled", "16", "lots"),
        ];
        let plan = plan_classification(&nodes, &small_and_large(), &worker_pattern());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_is_ordered_largest_first() {
        let nodes = vec![
            worker_node("a", "2", "4Gi"),
            worker_node("b", "8", "16Gi"),
            worker_node("c", "8", "64Gi"),
        ];
        let plan = plan_classification(&nodes, &small_and_large(), &worker_pattern());
        let order: Vec<_> = plan.iter().map(|a| a.node_name.as_str()).collect();
        assert_eq!(order, ["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_classify_patches_once_and_counts() {
        let cluster = MockCluster::new();
        let nodes = vec![
            worker_node("big", "16", "32Gi"),
            worker_node("mid", "4", "8Gi"),
            worker_node("tiny", "1", "1Gi"),
        ];
        for n in &nodes {
            cluster.add_node(n.clone()).await;
        }

        let report = classify_nodes(&cluster, &nodes, &small_and_large(), &worker_pattern()).await;

        assert_eq!(report.count("large"), 1);
        assert_eq!(report.count("small"), 1);
        assert!(report.failures.is_empty());

        let patches = cluster.patches().await;
        assert_eq!(patches.len(), 2);
        let big_patches: Vec<_> = patches.iter().filter(|(n, _)| n == "big").collect();
        assert_eq!(big_patches.len(), 1);
        assert_eq!(big_patches[0].1.get(TIER_LABEL).map(String::as_str), Some("large"));
        assert!(cluster.node("tiny").await.unwrap().metadata.labels.unwrap().get(TIER_LABEL).is_none());
    }

    #[tokio::test]
    async fn test_classify_is_idempotent() {
        let cluster = MockCluster::new();
        for n in [worker_node("big", "16", "32Gi"), worker_node("mid", "4", "8Gi")] {
            cluster.add_node(n).await;
        }
        let tiers = small_and_large();

        let nodes = cluster.list_nodes().await.unwrap();
        let first = classify_nodes(&cluster, &nodes, &tiers, &worker_pattern()).await;

        let nodes = cluster.list_nodes().await.unwrap();
        let second = classify_nodes(&cluster, &nodes, &tiers, &worker_pattern()).await;

        assert_eq!(first, second);
        assert_eq!(cluster.patches().await.len(), 2);
        for name in ["big", "mid"] {
            let labels = cluster.node(name).await.unwrap().metadata.labels.unwrap();
            assert_eq!(labels.keys().filter(|k| *k == TIER_LABEL).count(), 1);
        }
    }

    #[tokio::test]
    async fn test_reclassification_overwrites_label() {
        let cluster = MockCluster::new();
        let mut big = worker_node("big", "16", "32Gi");
        big.metadata
            .labels
            .as_mut()
            .unwrap()
            .insert(TIER_LABEL.to_string(), "small".to_string());
        cluster.add_node(big.clone()).await;

        let report = classify_nodes(&cluster, &[big], &small_and_large(), &worker_pattern()).await;
        assert_eq!(report.count("large"), 1);

        let labels = cluster.node("big").await.unwrap().metadata.labels.unwrap();
        assert_eq!(labels.get(TIER_LABEL).map(String::as_str), Some("large"));
    }

    #[tokio::test]
    async fn test_patch_failure_does_not_abort_pass() {
        let cluster = MockCluster::new();
        let nodes = vec![worker_node("a", "16", "32Gi"), worker_node("b", "8", "16Gi")];
        for n in &nodes {
            cluster.add_node(n.clone()).await;
        }
        cluster.fail_patches_for("a").await;

        let report = classify_nodes(&cluster, &nodes, &small_and_large(), &worker_pattern()).await;

        assert_eq!(report.count("large"), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "a");
    }
}
