/*!
Constructeurs de données de test

- `AllocationBuilder` : réponses d'allocation zone par zone
- `Scenario` : topologies types chargées dans un `MockResourceApi`
*/

use crate::mock_api::MockResourceApi;
use aquaplan_dashboard::models::{ConnectionAllocation, ZoneAllocation};

/// Construction d'une réponse `/allocate-water`
#[derive(Debug, Default, Clone)]
pub struct AllocationBuilder {
    entries: Vec<ZoneAllocation>,
}

impl AllocationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an entry for `zone_id` with a total `amount`.
    pub fn zone(mut self, zone_id: i64, amount: f64) -> Self {
        self.entries.push(ZoneAllocation {
            zone_id,
            amount,
            connection_allocations: Vec::new(),
        });
        self
    }

    /// Add a per-connection share to the last zone entry.
    pub fn via(mut self, connection_id: i64, amount: f64) -> Self {
        if let Some(entry) = self.entries.last_mut() {
            entry.connection_allocations.push(ConnectionAllocation {
                connection_id,
                amount,
            });
        }
        self
    }

    pub fn build(self) -> Vec<ZoneAllocation> {
        self.entries
    }
}

/// Topologies de référence
pub struct Scenario;

impl Scenario {
    /// Source 1 (capacity 50) feeds zone 7 (demand 100) through connection 3.
    pub fn single_feed() -> MockResourceApi {
        let api = MockResourceApi::new();
        api.add_source(1, 50.0)
            .add_zone(7, 100.0, 1)
            .add_connection(3, 1, 7, 1.0)
            .set_allocation(AllocationBuilder::new().zone(7, 20.0).via(3, 20.0).build());
        api
    }

    /// Sources 1 and 2 both feed zone 7; zone 8 is fed by source 2 only.
    pub fn shared_zone() -> MockResourceApi {
        let api = MockResourceApi::new();
        api.add_source(1, 100.0)
            .add_source(2, 100.0)
            .add_zone(7, 100.0, 1)
            .add_zone(8, 40.0, 2)
            .add_connection(3, 1, 7, 2.0)
            .add_connection(4, 2, 7, 1.0)
            .add_connection(5, 2, 8, 0.5)
            .set_allocation(
                AllocationBuilder::new()
                    .zone(7, 60.0)
                    .via(3, 40.0)
                    .via(4, 20.0)
                    .zone(8, 30.0)
                    .via(5, 30.0)
                    .build(),
            );
        api
    }

    /// Two connections, ids 1 and 2, used by resolution tests.
    pub fn two_connections() -> MockResourceApi {
        let api = MockResourceApi::new();
        api.add_source(10, 100.0)
            .add_source(11, 100.0)
            .add_zone(20, 50.0, 1)
            .add_zone(21, 50.0, 1)
            .add_connection(1, 10, 20, 1.0)
            .add_connection(2, 11, 21, 1.0);
        api
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_builder() {
        let entries = AllocationBuilder::new()
            .zone(1, 10.0)
            .via(5, 4.0)
            .via(6, 6.0)
            .zone(2, 0.0)
            .build();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].connection_allocations.len(), 2);
        assert!(entries[1].connection_allocations.is_empty());
    }

    #[test]
    fn test_via_without_zone_is_ignored() {
        assert!(AllocationBuilder::new().via(1, 1.0).build().is_empty());
    }

    #[test]
    fn test_scenarios() {
        let api = Scenario::shared_zone();
        assert_eq!(api.sources().len(), 2);
        assert_eq!(api.connections().len(), 3);
        assert_eq!(Scenario::two_connections().connections().len(), 2);
    }
}
