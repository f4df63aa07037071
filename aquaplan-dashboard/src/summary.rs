//! Roll-up metrics carried on every snapshot.

use crate::aggregator::{SourceUtilization, ZoneUtilization};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityGroup {
    pub priority: i32,
    pub zone_count: usize,
    pub demand: f64,
    pub allocated: f64,
    pub satisfaction_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub total_capacity: f64,
    pub total_demand: f64,
    pub total_allocated: f64,
    pub total_cost: f64,
    pub satisfaction_rate: f64,
    pub resource_utilization: f64,
    pub cost_efficiency: f64,
    /// Ascending priority.
    pub by_priority: Vec<PriorityGroup>,
}

// ratio protégé : 0 si le dénominateur est nul ou négatif
fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

fn satisfaction(allocated: f64, demand: f64) -> f64 {
    (ratio(allocated, demand) * 100.0).min(100.0)
}

pub fn summarize(sources: &[SourceUtilization], zones: &[ZoneUtilization]) -> SnapshotSummary {
    let total_capacity: f64 = sources.iter().map(|s| s.capacity).sum();
    let total_demand: f64 = zones.iter().map(|z| z.demand).sum();
    let total_allocated: f64 = zones.iter().map(|z| z.filled_amount).sum();
    let total_cost: f64 = zones.iter().map(|z| z.total_cost).sum();

    let mut groups: BTreeMap<i32, PriorityGroup> = BTreeMap::new();
    for zone in zones {
        let group = groups.entry(zone.priority).or_insert_with(|| PriorityGroup {
            priority: zone.priority,
            ..Default::default()
        });
        group.zone_count += 1;
        group.demand += zone.demand;
        group.allocated += zone.filled_amount;
    }
    let by_priority = groups
        .into_values()
        .map(|mut g| {
            g.satisfaction_rate = satisfaction(g.allocated, g.demand);
            g
        })
        .collect();

    SnapshotSummary {
        total_capacity,
        total_demand,
        total_allocated,
        total_cost,
        satisfaction_rate: satisfaction(total_allocated, total_demand),
        resource_utilization: ratio(total_allocated, total_capacity) * 100.0,
        cost_efficiency: ratio(total_allocated, total_cost),
        by_priority,
    }
}
