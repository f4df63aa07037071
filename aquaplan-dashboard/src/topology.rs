//! Topology Store
//!
//! Holds the last snapshot of sources, zones and connections fetched from the
//! resource server. No derived data lives here; the store only knows whether
//! the connection set changed, so the resolution cache can be rebuilt.

use crate::client::{ApiError, ResourceApi};
use crate::hal::{ConnectionResource, SourceResource, ZoneResource};
use crate::models::{ConnectionRecord, Source, Zone};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyStore {
    sources: Vec<Source>,
    zones: Vec<Zone>,
    connections: Vec<ConnectionRecord>,
    #[serde(skip)]
    connections_loaded: bool,
}

/// Result of one concurrent fetch of the three collections.
#[derive(Debug, Clone, Default)]
pub struct TopologyFetch {
    pub sources: Vec<Source>,
    pub zones: Vec<Zone>,
    pub connections: Vec<ConnectionRecord>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn connections(&self) -> &[ConnectionRecord] {
        &self.connections
    }

    pub fn replace_sources(&mut self, sources: Vec<Source>) {
        self.sources = sources;
    }

    pub fn replace_zones(&mut self, zones: Vec<Zone>) {
        self.zones = zones;
    }

    /// Replace the connection list; returns true when the set differs from
    /// the previous one (or none was loaded yet).
    pub fn replace_connections(&mut self, connections: Vec<ConnectionRecord>) -> bool {
        let changed = !self.connections_loaded || self.connections != connections;
        self.connections = connections;
        self.connections_loaded = true;
        changed
    }

    /// Commit a full fetch; returns whether the connection set changed.
    pub fn apply(&mut self, fetch: TopologyFetch) -> bool {
        self.replace_sources(fetch.sources);
        self.replace_zones(fetch.zones);
        self.replace_connections(fetch.connections)
    }
}

// ============ CONVERSION HAL -> DOMAINE ============

pub fn source_from_resource(res: &SourceResource) -> Option<Source> {
    let Some(id) = res.links.self_link.id() else {
        warn!("skipping source without id: {}", res.links.self_link.href);
        return None;
    };
    Some(Source { id, capacity: res.capacity })
}

pub fn zone_from_resource(res: &ZoneResource) -> Option<Zone> {
    let Some(id) = res.links.self_link.id() else {
        warn!("skipping zone without id: {}", res.links.self_link.href);
        return None;
    };
    Some(Zone {
        id,
        demand: res.demand,
        priority: res.priority,
        filled_capacity: res.filled_capacity,
    })
}

pub fn connection_from_resource(res: &ConnectionResource) -> Option<ConnectionRecord> {
    let Some(id) = res.links.self_link.id() else {
        warn!("skipping connection without id: {}", res.links.self_link.href);
        return None;
    };
    let (Some(source), Some(zone)) = (res.links.get("source"), res.links.get("zone")) else {
        warn!("connection {} has no source/zone links", id);
        return None;
    };
    Some(ConnectionRecord {
        id,
        cost_per_unit: res.cost_per_unit,
        source_href: source.href.clone(),
        zone_href: zone.href.clone(),
    })
}

fn convert_sources(resources: Vec<SourceResource>) -> Vec<Source> {
    resources.iter().filter_map(source_from_resource).collect()
}

fn convert_zones(resources: Vec<ZoneResource>) -> Vec<Zone> {
    resources.iter().filter_map(zone_from_resource).collect()
}

fn convert_connections(resources: Vec<ConnectionResource>) -> Vec<ConnectionRecord> {
    resources.iter().filter_map(connection_from_resource).collect()
}

/// Fetch the three collections concurrently; fails as a unit.
pub async fn fetch_topology<A: ResourceApi>(api: &A) -> Result<TopologyFetch, ApiError> {
    let (sources, zones, connections) =
        tokio::try_join!(api.list_sources(), api.list_zones(), api.list_connections())?;
    let fetch = TopologyFetch {
        sources: convert_sources(sources),
        zones: convert_zones(zones),
        connections: convert_connections(connections),
    };
    debug!(
        "fetched topology: {} sources, {} zones, {} connections",
        fetch.sources.len(),
        fetch.zones.len(),
        fetch.connections.len()
    );
    Ok(fetch)
}

/// Post-allocation refresh of the collections allocation may have mutated.
pub async fn fetch_sources_and_zones<A: ResourceApi>(
    api: &A,
) -> Result<(Vec<Source>, Vec<Zone>), ApiError> {
    let (sources, zones) = tokio::try_join!(api.list_sources(), api.list_zones())?;
    Ok((convert_sources(sources), convert_zones(zones)))
}

pub async fn fetch_connections<A: ResourceApi>(api: &A) -> Result<Vec<ConnectionRecord>, ApiError> {
    Ok(convert_connections(api.list_connections().await?))
}

pub async fn fetch_sources<A: ResourceApi>(api: &A) -> Result<Vec<Source>, ApiError> {
    Ok(convert_sources(api.list_sources().await?))
}

pub async fn fetch_zones<A: ResourceApi>(api: &A) -> Result<Vec<Zone>, ApiError> {
    Ok(convert_zones(api.list_zones().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::Links;

    fn conn(id: i64) -> ConnectionRecord {
        ConnectionRecord {
            id,
            cost_per_unit: 1.0,
            source_href: format!("http://x/api/connections/{id}/source"),
            zone_href: format!("http://x/api/connections/{id}/zone"),
        }
    }

    #[test]
    fn test_first_load_counts_as_change() {
        let mut store = TopologyStore::new();
        assert!(store.replace_connections(vec![]));
        assert!(!store.replace_connections(vec![]));
    }

    #[test]
    fn test_connection_change_detection() {
        let mut store = TopologyStore::new();
        assert!(store.replace_connections(vec![conn(1), conn(2)]));
        assert!(!store.replace_connections(vec![conn(1), conn(2)]));
        assert!(store.replace_connections(vec![conn(1), conn(2), conn(3)]));

        let mut repriced = conn(3);
        repriced.cost_per_unit = 4.0;
        assert!(store.replace_connections(vec![conn(1), conn(2), repriced]));
    }

    #[test]
    fn test_resource_conversion() {
        let zone = ZoneResource {
            demand: 100.0,
            priority: 2,
            filled_capacity: Some(10.0),
            links: Links::new("http://x/api/zones/4"),
        };
        let converted = zone_from_resource(&zone).unwrap();
        assert_eq!(converted.id, 4);
        assert_eq!(converted.filled_capacity, Some(10.0));

        let no_id = SourceResource { capacity: 5.0, links: Links::new("http://x/api/sources/abc") };
        assert!(source_from_resource(&no_id).is_none());

        let no_links = ConnectionResource { cost_per_unit: 1.0, links: Links::new("http://x/api/connections/2") };
        assert!(connection_from_resource(&no_links).is_none());

        let full = ConnectionResource {
            cost_per_unit: 1.0,
            links: Links::new("http://x/api/connections/2")
                .with("source", "http://x/api/connections/2/source")
                .with("zone", "http://x/api/connections/2/zone"),
        };
        assert_eq!(connection_from_resource(&full).unwrap().id, 2);
    }
}
