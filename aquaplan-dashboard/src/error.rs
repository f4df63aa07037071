use crate::client::ApiError;
use crate::models::{ConnectionId, ZoneId};

/// Erreurs remontées par le moteur du tableau de bord
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// One connection's endpoint could not be dereferenced; the batch goes on.
    #[error("endpoint resolution failed for connection {connection_id}: {source}")]
    EndpointResolution {
        connection_id: ConnectionId,
        #[source]
        source: ApiError,
    },
    #[error("allocation trigger failed: {0}")]
    AllocationTrigger(#[source] ApiError),
    /// Topology could not be (re)fetched; the last known topology stays in place.
    #[error("topology refresh failed: {0}")]
    TopologyRefresh(#[source] ApiError),
    #[error("zone {zone_id} has degenerate demand {demand}")]
    DegenerateZoneDemand { zone_id: ZoneId, demand: f64 },
    #[error("creation rejected: {0}")]
    Create(#[source] ApiError),
    #[error("configuration error: {0}")]
    Config(String),
}

impl DashboardError {
    /// Libellé court utilisé dans les logs et l'API de statut
    pub fn kind(&self) -> &'static str {
        match self {
            DashboardError::EndpointResolution { .. } => "endpoint_resolution",
            DashboardError::AllocationTrigger(_) => "allocation_trigger",
            DashboardError::TopologyRefresh(_) => "topology_refresh",
            DashboardError::DegenerateZoneDemand { .. } => "degenerate_zone_demand",
            DashboardError::Create(_) => "create",
            DashboardError::Config(_) => "config",
        }
    }
}
