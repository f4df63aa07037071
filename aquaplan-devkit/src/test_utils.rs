/*!
Test Harness pour le tableau de bord

Facilite l'écriture de tests avec:
- un `Dashboard` branché sur un `MockResourceApi`
- des assertions sur le snapshot courant
- l'attente d'un nouveau snapshot avec timeout
*/

use crate::mock_api::MockResourceApi;
use anyhow::Result;
use aquaplan_dashboard::aggregator::{AttributionMode, SourceUtilization, UtilizationSnapshot, ZoneUtilization};
use aquaplan_dashboard::dashboard::Dashboard;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

const EPSILON: f64 = 1e-9;

/// Init des logs pour les tests; sans effet si déjà fait
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Harness de test complet
pub struct TestHarness {
    pub api: MockResourceApi,
    pub dashboard: Dashboard<MockResourceApi>,
}

impl TestHarness {
    pub fn new(api: MockResourceApi) -> Self {
        Self::with_mode(api, AttributionMode::default())
    }

    pub fn with_mode(api: MockResourceApi, mode: AttributionMode) -> Self {
        init_test_logging();
        let dashboard = Dashboard::new(api.clone(), mode);
        Self { api, dashboard }
    }

    /// Initial topology load + resolution.
    pub async fn load(&self) -> Result<Arc<UtilizationSnapshot>> {
        self.dashboard.refresh_topology().await?;
        self.snapshot()
    }

    pub fn snapshot(&self) -> Result<Arc<UtilizationSnapshot>> {
        self.dashboard
            .snapshot()
            .ok_or_else(|| anyhow::anyhow!("no snapshot computed yet"))
    }

    /// Attend le prochain snapshot publié
    pub async fn wait_for_snapshot(&self, timeout_ms: u64) -> Result<Arc<UtilizationSnapshot>> {
        let mut rx = self.dashboard.subscribe();
        timeout(Duration::from_millis(timeout_ms), rx.changed()).await??;
        let latest = rx.borrow_and_update().clone();
        latest.ok_or_else(|| anyhow::anyhow!("snapshot channel holds no snapshot"))
    }

    pub fn source(&self, source_id: i64) -> Result<SourceUtilization> {
        self.snapshot()?
            .source(source_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("source {source_id} missing from snapshot"))
    }

    pub fn zone(&self, zone_id: i64) -> Result<ZoneUtilization> {
        self.snapshot()?
            .zone(zone_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("zone {zone_id} missing from snapshot"))
    }

    /// Assert remaining capacity and fill percentage of a source
    pub fn assert_source(&self, source_id: i64, remaining: f64, fill: f64) -> Result<()> {
        let source = self.source(source_id)?;
        if !close(source.remaining_capacity, remaining) || !close(source.fill_percentage, fill) {
            anyhow::bail!(
                "source {source_id}: expected remaining {remaining} / fill {fill}, got {} / {}",
                source.remaining_capacity,
                source.fill_percentage
            );
        }
        info!("source {source_id}: remaining {remaining}, fill {fill}");
        Ok(())
    }

    /// Assert filled amount and fill percentage of a zone
    pub fn assert_zone(&self, zone_id: i64, filled: f64, fill: Option<f64>) -> Result<()> {
        let zone = self.zone(zone_id)?;
        let fill_ok = match (zone.fill_percentage, fill) {
            (Some(a), Some(b)) => close(a, b),
            (None, None) => true,
            _ => false,
        };
        if !close(zone.filled_amount, filled) || !fill_ok {
            anyhow::bail!(
                "zone {zone_id}: expected filled {filled} / fill {fill:?}, got {} / {:?}",
                zone.filled_amount,
                zone.fill_percentage
            );
        }
        Ok(())
    }

    pub fn assert_zone_cost(&self, zone_id: i64, cost: f64) -> Result<()> {
        let zone = self.zone(zone_id)?;
        if !close(zone.total_cost, cost) {
            anyhow::bail!("zone {zone_id}: expected cost {cost}, got {}", zone.total_cost);
        }
        Ok(())
    }

    pub fn assert_unresolved(&self, expected: &[i64]) -> Result<()> {
        let snapshot = self.snapshot()?;
        if snapshot.unresolved_connections != expected {
            anyhow::bail!(
                "expected unresolved {expected:?}, got {:?}",
                snapshot.unresolved_connections
            );
        }
        Ok(())
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Scenario;

    #[tokio::test]
    async fn test_harness_single_feed() {
        let harness = TestHarness::new(Scenario::single_feed());
        harness.load().await.unwrap();
        harness.assert_source(1, 50.0, 100.0).unwrap();
        harness.assert_zone(7, 0.0, Some(0.0)).unwrap();

        harness.dashboard.trigger_allocation().await.unwrap();
        harness.assert_source(1, 30.0, 60.0).unwrap();
        harness.assert_zone(7, 20.0, Some(20.0)).unwrap();
        harness.assert_zone_cost(7, 20.0).unwrap();
        assert!(harness.assert_zone_cost(7, 1.0).is_err());
    }

    #[tokio::test]
    async fn test_snapshot_before_load_is_an_error() {
        let harness = TestHarness::new(MockResourceApi::new());
        assert!(harness.snapshot().is_err());
    }
}
