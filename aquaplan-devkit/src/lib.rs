/*!
# Aquaplan DevKit - Mocks et utilitaires de développement

Bibliothèque facilitant le développement et les tests du tableau de bord:
- Mock du serveur de ressources HAL (en mémoire, échecs injectables)
- Serveur HAL de développement sur un vrai port
- Constructeurs de topologies et d'allocations
- Harness de test avec assertions sur les snapshots
*/

pub mod fixtures;
pub mod mock_api;
pub mod stub_server;
pub mod test_utils;

pub use fixtures::{AllocationBuilder, Scenario};
pub use mock_api::MockResourceApi;
pub use stub_server::StubServer;
pub use test_utils::TestHarness;
