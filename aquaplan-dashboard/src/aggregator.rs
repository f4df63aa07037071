//! Utilization Aggregator
//!
//! Pure computation of a [`UtilizationSnapshot`] from the topology, the
//! resolved connection endpoints and the latest allocation result. No I/O,
//! no mutation of inputs; every output list follows topology order so two
//! computations over the same inputs serialize identically.
//!
//! Sources: `remaining = capacity - allocated`, fill = remaining / capacity
//! clamped to [0, 100]. Zones: fill = filled / demand, *not* clamped.

use crate::error::DashboardError;
use crate::models::{
    AllocationResult, ConnectionEndpoints, ConnectionId, ConnectionRecord, Source, SourceId, Zone,
    ZoneAllocation, ZoneId,
};
use crate::resolution::ResolvedLinks;
use crate::summary::{summarize, SnapshotSummary};
use crate::topology::TopologyStore;
use serde::{Deserialize, Serialize};

/// How much of an allocation is charged to a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMode {
    /// Every source feeding a zone is charged the zone's *total* allocation.
    #[default]
    ZoneTotal,
    /// A source is charged only what its own connections carried.
    PerConnection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUtilization {
    pub source_id: SourceId,
    pub capacity: f64,
    pub allocated: f64,
    pub remaining_capacity: f64,
    pub fill_percentage: f64,
}

/// One resolved connection feeding a zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCost {
    pub connection_id: ConnectionId,
    pub source_id: SourceId,
    pub cost_per_unit: f64,
    /// Amount routed through this connection by the last allocation, if any.
    pub allocated: Option<f64>,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneUtilization {
    pub zone_id: ZoneId,
    pub demand: f64,
    pub priority: i32,
    pub filled_amount: f64,
    /// `None` when demand is zero or negative.
    pub fill_percentage: Option<f64>,
    pub total_cost: f64,
    pub per_connection_breakdown: Vec<ConnectionCost>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotIssue {
    DegenerateZoneDemand { zone_id: ZoneId, demand: f64 },
    DegenerateSourceCapacity { source_id: SourceId, capacity: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilizationSnapshot {
    pub sources: Vec<SourceUtilization>,
    pub zones: Vec<ZoneUtilization>,
    /// Connections with no resolved endpoints, in topology order.
    pub unresolved_connections: Vec<ConnectionId>,
    pub issues: Vec<SnapshotIssue>,
    pub summary: SnapshotSummary,
}

impl UtilizationSnapshot {
    pub fn source(&self, source_id: SourceId) -> Option<&SourceUtilization> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }

    pub fn zone(&self, zone_id: ZoneId) -> Option<&ZoneUtilization> {
        self.zones.iter().find(|z| z.zone_id == zone_id)
    }
}

/// A connection joined with its resolved endpoints.
#[derive(Debug, Clone, Copy)]
struct ResolvedConnection<'a> {
    record: &'a ConnectionRecord,
    endpoints: &'a ConnectionEndpoints,
}

pub fn compute_snapshot(
    topology: &TopologyStore,
    links: Option<&ResolvedLinks>,
    allocation: Option<&AllocationResult>,
    mode: AttributionMode,
) -> UtilizationSnapshot {
    let mut resolved = Vec::with_capacity(topology.connections().len());
    let mut unresolved = Vec::new();
    for record in topology.connections() {
        match links.and_then(|l| l.get(record.id)) {
            Some(endpoints) => resolved.push(ResolvedConnection { record, endpoints }),
            None => unresolved.push(record.id),
        }
    }

    let mut issues = Vec::new();

    let sources: Vec<SourceUtilization> = topology
        .sources()
        .iter()
        .map(|source| {
            let usage = source_utilization(source, &resolved, allocation, mode);
            if source.capacity <= 0.0 {
                issues.push(SnapshotIssue::DegenerateSourceCapacity {
                    source_id: source.id,
                    capacity: source.capacity,
                });
            }
            usage
        })
        .collect();

    let zones: Vec<ZoneUtilization> = topology
        .zones()
        .iter()
        .map(|zone| {
            let (usage, degenerate) = zone_utilization(zone, &resolved, allocation);
            if let Some(DashboardError::DegenerateZoneDemand { zone_id, demand }) = degenerate {
                issues.push(SnapshotIssue::DegenerateZoneDemand { zone_id, demand });
            }
            usage
        })
        .collect();

    let summary = summarize(&sources, &zones);

    UtilizationSnapshot {
        sources,
        zones,
        unresolved_connections: unresolved,
        issues,
        summary,
    }
}

fn source_utilization(
    source: &Source,
    resolved: &[ResolvedConnection<'_>],
    allocation: Option<&AllocationResult>,
    mode: AttributionMode,
) -> SourceUtilization {
    let allocated: f64 = resolved
        .iter()
        .filter(|c| c.endpoints.source_id == source.id)
        .filter_map(|c| {
            let entry = allocation?.for_zone(c.endpoints.zone_id)?;
            match mode {
                AttributionMode::ZoneTotal => Some(entry.amount),
                AttributionMode::PerConnection => Some(routed_through(entry, c.record.id)),
            }
        })
        .sum();

    let remaining_capacity = source.capacity - allocated;
    let fill_percentage = if source.capacity > 0.0 {
        ((remaining_capacity / source.capacity) * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    SourceUtilization {
        source_id: source.id,
        capacity: source.capacity,
        allocated,
        remaining_capacity,
        fill_percentage,
    }
}

fn routed_through(entry: &ZoneAllocation, connection_id: ConnectionId) -> f64 {
    connection_amount(entry, connection_id).unwrap_or(0.0)
}

/// Filled amount for a zone: allocation entry, else server fallback, else 0.
pub fn zone_filled_amount(zone: &Zone, entry: Option<&ZoneAllocation>) -> f64 {
    match entry {
        Some(entry) => entry.amount,
        None => zone.filled_capacity.unwrap_or(0.0),
    }
}

/// Unclamped `filled / demand * 100`; degenerate demand is an error.
pub fn zone_fill_percentage(zone: &Zone, filled: f64) -> Result<f64, DashboardError> {
    if zone.demand <= 0.0 || !zone.demand.is_finite() {
        return Err(DashboardError::DegenerateZoneDemand {
            zone_id: zone.id,
            demand: zone.demand,
        });
    }
    Ok(filled / zone.demand * 100.0)
}

/// Total cost of a zone's allocation entry. Connection allocations whose
/// connection is not among `zone_connections` contribute nothing.
fn zone_total_cost(entry: Option<&ZoneAllocation>, zone_connections: &[ResolvedConnection<'_>]) -> f64 {
    let Some(entry) = entry else { return 0.0 };
    entry
        .connection_allocations
        .iter()
        .filter_map(|ca| {
            zone_connections
                .iter()
                .find(|c| c.record.id == ca.connection_id)
                .map(|c| ca.amount * c.record.cost_per_unit)
        })
        .sum()
}

/// Sum of every entry for `connection_id`; `None` when it has none.
fn connection_amount(entry: &ZoneAllocation, connection_id: ConnectionId) -> Option<f64> {
    entry
        .connection_allocations
        .iter()
        .filter(|ca| ca.connection_id == connection_id)
        .map(|ca| ca.amount)
        .reduce(|a, b| a + b)
}

fn zone_utilization(
    zone: &Zone,
    resolved: &[ResolvedConnection<'_>],
    allocation: Option<&AllocationResult>,
) -> (ZoneUtilization, Option<DashboardError>) {
    let entry = allocation.and_then(|a| a.for_zone(zone.id));
    let filled_amount = zone_filled_amount(zone, entry);
    let (fill_percentage, degenerate) = match zone_fill_percentage(zone, filled_amount) {
        Ok(pct) => (Some(pct), None),
        Err(e) => (None, Some(e)),
    };

    let zone_connections: Vec<ResolvedConnection<'_>> = resolved
        .iter()
        .filter(|c| c.endpoints.zone_id == zone.id)
        .copied()
        .collect();

    let total_cost = zone_total_cost(entry, &zone_connections);

    let per_connection_breakdown = zone_connections
        .iter()
        .map(|c| {
            let allocated = entry.and_then(|e| connection_amount(e, c.record.id));
            ConnectionCost {
                connection_id: c.record.id,
                source_id: c.endpoints.source_id,
                cost_per_unit: c.record.cost_per_unit,
                allocated,
                cost: allocated.unwrap_or(0.0) * c.record.cost_per_unit,
            }
        })
        .collect();

    (
        ZoneUtilization {
            zone_id: zone.id,
            demand: zone.demand,
            priority: zone.priority,
            filled_amount,
            fill_percentage,
            total_cost,
            per_connection_breakdown,
        },
        degenerate,
    )
}
