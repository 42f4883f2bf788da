//! Workflow placement: pick the smallest tier that covers a workflow's
//! peak resource ask and pin every template to it.

use crate::error::{Result, SchedulerError};
use serde_json::{json, Map, Value};
use tierwise_core::labels::{HOSTNAME_TOPOLOGY_KEY, TIER_LABEL, WORKFLOW_IDENTITY_LABEL};
use tierwise_core::{sort_tiers_ascending, ResourceQuantities, Tier};
use tracing::{debug, error, info};

/// Template keys whose `resources` block is inspected
const RESOURCE_HOLDERS: [&str; 2] = ["script", "container"];

/// The workflow inside a submission body.
///
/// Submissions wrap the manifest as `{"namespace": ..., "workflow": {...}}`;
/// a bare manifest is used as is.
fn workflow_of(body: &Value) -> &Value {
    match body.get("workflow") {
        Some(wf) if wf.is_object() => wf,
        _ => body,
    }
}

fn workflow_of_mut(body: &mut Value) -> &mut Value {
    if body.get("workflow").map(Value::is_object).unwrap_or(false) {
        &mut body["workflow"]
    } else {
        body
    }
}

fn templates(workflow: &Value) -> Result<&Vec<Value>> {
    workflow
        .pointer("/spec/templates")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            SchedulerError::scheduling_failed(
                "workflow has no spec.templates list",
                "Submit a workflow manifest with spec.templates",
            )
        })
}

/// Every `{cpu, memory}` entry under a template's script or container resources
pub fn collect_resource_entries(body: &Value) -> Result<Vec<ResourceQuantities>> {
    let mut entries = Vec::new();

    for (index, template) in templates(workflow_of(body))?.iter().enumerate() {
        for holder in RESOURCE_HOLDERS {
            let Some(resources) = template
                .get(holder)
                .and_then(|h| h.get("resources"))
                .and_then(Value::as_object)
            else {
                continue;
            };

            for (kind, entry) in resources {
                let quantities = ResourceQuantities::from_value_map(entry).map_err(|e| {
                    SchedulerError::scheduling_failed(
                        format!("templates[{}].{}.resources.{}: {}", index, holder, kind, e),
                        "Fix the resource quantities of the template",
                    )
                })?;
                entries.push(quantities);
            }
        }
    }

    Ok(entries)
}

/// The single largest entry under `(cpu, memory)` order
pub fn peak_ask(entries: &[ResourceQuantities]) -> Option<ResourceQuantities> {
    entries.iter().max().copied()
}

/// The smallest tier covering the ask on both dimensions
pub fn select_tier(ask: &ResourceQuantities, tiers: &[Tier]) -> Option<Tier> {
    let mut tiers = tiers.to_vec();
    sort_tiers_ascending(&mut tiers);
    tiers.into_iter().find(|t| t.resources.dominates(ask))
}

fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> Result<&'a mut Map<String, Value>> {
    map.entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| {
            SchedulerError::scheduling_failed(
                format!("'{}' is not an object", key),
                "Remove or fix the malformed field in the manifest",
            )
        })
}

/// Label the workflow with the tier and pin every template to it
pub fn apply_placement(body: &mut Value, tier: &Tier) -> Result<()> {
    let workflow = workflow_of_mut(body).as_object_mut().ok_or_else(|| {
        SchedulerError::scheduling_failed("workflow is not an object", "Submit a JSON object")
    })?;

    let labels = object_entry(object_entry(workflow, "metadata")?, "labels")?;
    labels.insert(TIER_LABEL.to_string(), Value::String(tier.name.clone()));
    let identity = labels.get(WORKFLOW_IDENTITY_LABEL).cloned();

    let templates = workflow
        .get_mut("spec")
        .and_then(|s| s.get_mut("templates"))
        .and_then(Value::as_array_mut)
        .ok_or_else(|| {
            SchedulerError::scheduling_failed(
                "workflow has no spec.templates list",
                "Submit a workflow manifest with spec.templates",
            )
        })?;

    for template in templates {
        let template = template.as_object_mut().ok_or_else(|| {
            SchedulerError::scheduling_failed("template is not an object", "Fix spec.templates")
        })?;

        match &identity {
            Some(identity) => {
                let affinity = object_entry(template, "affinity")?;
                affinity.insert(
                    "podAffinity".to_string(),
                    json!({
                        "requiredDuringSchedulingIgnoredDuringExecution": [{
                            "labelSelector": {
                                "matchLabels": { WORKFLOW_IDENTITY_LABEL: identity }
                            },
                            "topologyKey": HOSTNAME_TOPOLOGY_KEY,
                        }]
                    }),
                );
            }
            None => info!(
                "Workflow has no '{}' label, skipping pod affinity",
                WORKFLOW_IDENTITY_LABEL
            ),
        }

        object_entry(template, "nodeSelector")?
            .insert(TIER_LABEL.to_string(), Value::String(tier.name.clone()));
    }

    Ok(())
}

/// Place a workflow, mutating `body` in place.
///
/// Returns the chosen tier, or `None` when there is nothing to size or no
/// tier is large enough. On error `body` may be partially modified; use
/// [`schedule_workflow`] for the fail-open behavior.
pub fn try_schedule(body: &mut Value, tiers: &[Tier]) -> Result<Option<Tier>> {
    let entries = collect_resource_entries(body)?;
    let Some(ask) = peak_ask(&entries) else {
        debug!("Workflow declares no resources, leaving it unscheduled");
        return Ok(None);
    };

    let Some(tier) = select_tier(&ask, tiers) else {
        info!(
            cpu_millicores = ask.cpu_millicores,
            memory_bytes = ask.memory_bytes,
            "No worker tier is large enough for workflow"
        );
        return Ok(None);
    };

    apply_placement(body, &tier)?;
    info!(
        tier = %tier.name,
        cpu_millicores = ask.cpu_millicores,
        memory_bytes = ask.memory_bytes,
        "Workflow scheduled to worker tier"
    );
    Ok(Some(tier))
}

/// Place a workflow, returning the original body untouched on any error
pub fn schedule_workflow(body: Value, tiers: &[Tier]) -> Value {
    let mut candidate = body.clone();
    match try_schedule(&mut candidate, tiers) {
        Ok(Some(_)) => candidate,
        Ok(None) => body,
        Err(e) => {
            error!("Failed to schedule workflow, submitting it unchanged: {}", e);
            body
        }
    }
}
