use serde::{Deserialize, Serialize};

pub type SourceId = i64;
pub type ZoneId = i64;
pub type ConnectionId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: SourceId,
    pub capacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: ZoneId,
    pub demand: f64,
    pub priority: i32,
    /// Server-side fallback, only used when no allocation entry exists.
    pub filled_capacity: Option<f64>,
}

/// Connexion telle que reçue : les extrémités ne sont connues que par leurs liens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub cost_per_unit: f64,
    pub source_href: String,
    pub zone_href: String,
}

/// Resolved `{sourceId, zoneId}` pair of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEndpoints {
    pub connection_id: ConnectionId,
    pub source_id: SourceId,
    pub zone_id: ZoneId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAllocation {
    pub connection_id: ConnectionId,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneAllocation {
    pub zone_id: ZoneId,
    pub amount: f64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub connection_allocations: Vec<ConnectionAllocation>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ConnectionAllocation>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<ConnectionAllocation>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `GET /allocate-water`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResponse {
    #[serde(default)]
    pub allocations: Vec<ZoneAllocation>,
}

/// Result of one allocation run; replaced wholesale by the next run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationResult {
    entries: Vec<ZoneAllocation>,
}

impl AllocationResult {
    pub fn new(entries: Vec<ZoneAllocation>) -> Self {
        Self { entries }
    }

    /// First entry for the zone, mirroring a linear `find`.
    pub fn for_zone(&self, zone_id: ZoneId) -> Option<&ZoneAllocation> {
        self.entries.iter().find(|a| a.zone_id == zone_id)
    }

    pub fn entries(&self) -> &[ZoneAllocation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<AllocationResponse> for AllocationResult {
    fn from(response: AllocationResponse) -> Self {
        Self::new(response.allocations)
    }
}

// ============ CORPS DE CRÉATION (formulaires opérateur) ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSource {
    pub capacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewZone {
    pub demand: f64,
    pub priority: i32,
}

/// `source`/`zone` are resource locators, not raw ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConnection {
    pub source: String,
    pub zone: String,
    pub cost_per_unit: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_payload_parse() {
        let json = r#"{ "allocations": [
            { "zoneId": 1, "amount": 40.0, "connectionAllocations": [ { "connectionId": 5, "amount": 40.0 } ] },
            { "zoneId": 2, "amount": 0.0, "connectionAllocations": null },
            { "zoneId": 3, "amount": 7.5 }
        ] }"#;
        let response: AllocationResponse = serde_json::from_str(json).unwrap();
        let result = AllocationResult::from(response);
        assert_eq!(result.len(), 3);
        assert_eq!(result.for_zone(1).unwrap().connection_allocations[0].connection_id, 5);
        assert!(result.for_zone(2).unwrap().connection_allocations.is_empty());
        assert!(result.for_zone(3).unwrap().connection_allocations.is_empty());
        assert!(result.for_zone(4).is_none());
    }

    #[test]
    fn test_for_zone_returns_first_match() {
        let result = AllocationResult::new(vec![
            ZoneAllocation { zone_id: 1, amount: 10.0, connection_allocations: vec![] },
            ZoneAllocation { zone_id: 1, amount: 99.0, connection_allocations: vec![] },
        ]);
        assert_eq!(result.for_zone(1).map(|a| a.amount), Some(10.0));
    }

    #[test]
    fn test_new_connection_body_is_camel_case() {
        let body = NewConnection {
            source: "http://x/api/sources/1".into(),
            zone: "http://x/api/zones/2".into(),
            cost_per_unit: 1.5,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["costPerUnit"], 1.5);
        assert_eq!(json["zone"], "http://x/api/zones/2");
    }
}
