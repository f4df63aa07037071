use aquaplan_dashboard::error::DashboardError;
use aquaplan_dashboard::resolution::{LinkResolutionCache, PublishStatus};
use aquaplan_dashboard::topology::fetch_connections;
use aquaplan_devkit::{Scenario, TestHarness};
use std::time::Duration;

#[tokio::test]
async fn test_failed_connection_is_excluded_from_batch() {
    let api = Scenario::two_connections();
    api.fail_connection_lookup(2);

    let mut cache = LinkResolutionCache::new();
    let connections = fetch_connections(&api).await.unwrap();
    let batch = cache.begin(&connections);
    let outcome = batch.run(&api).await;

    assert_eq!(outcome.errors().len(), 1);
    assert!(matches!(
        outcome.errors()[0],
        DashboardError::EndpointResolution { connection_id: 2, .. }
    ));

    let status = cache.publish(outcome);
    assert_eq!(status, PublishStatus::Published { generation: 1, resolved: 1 });

    let links = cache.ready().unwrap();
    let first = links.get(1).unwrap();
    assert_eq!((first.source_id, first.zone_id), (10, 20));
    assert!(links.get(2).is_none());
    assert_eq!(links.failures[0].connection_id, 2);
}

#[tokio::test]
async fn test_unresolved_connection_does_not_block_snapshot() {
    let api = Scenario::two_connections();
    api.fail_connection_lookup(2);
    let harness = TestHarness::new(api);

    harness.load().await.unwrap();
    harness.assert_unresolved(&[2]).unwrap();

    let status = harness.dashboard.status();
    assert!(status.resolution_ready);
    assert_eq!(status.resolution_failures, 1);

    let topology = harness.dashboard.topology();
    assert_eq!(topology.endpoints.len(), 1);
    assert_eq!(topology.endpoints[0].connection_id, 1);
}

#[tokio::test]
async fn test_empty_connection_set_publishes_immediately() {
    let api = aquaplan_devkit::MockResourceApi::new();
    api.add_source(1, 10.0).add_zone(2, 5.0, 1);
    let harness = TestHarness::new(api.clone());

    let snapshot = harness.load().await.unwrap();
    assert!(snapshot.unresolved_connections.is_empty());
    assert!(harness.dashboard.status().resolution_ready);
    assert_eq!(api.count_requests("GET http"), 0);
}

#[tokio::test]
async fn test_superseded_batch_cannot_overwrite_newer_mapping() {
    let api = Scenario::two_connections();
    let harness = TestHarness::new(api.clone());
    harness.load().await.unwrap();
    let before = harness.snapshot().unwrap();

    // batch pour [1, 2], retenu en vol
    api.pause_next_lookups(4);
    let stale = {
        let dashboard = harness.dashboard.clone();
        tokio::spawn(async move { dashboard.resolve_connections().await })
    };
    api.wait_for_waiting(4, Duration::from_secs(2)).await.unwrap();

    // pending batch: snapshot kept, not ready
    assert!(!harness.dashboard.status().resolution_ready);
    assert_eq!(harness.snapshot().unwrap(), before);

    api.add_connection(3, 10, 21, 2.0);
    harness.dashboard.refresh_topology().await.unwrap();
    assert!(harness.dashboard.status().resolution_ready);
    harness.assert_unresolved(&[]).unwrap();

    api.release();
    let report = stale.await.unwrap();
    assert_eq!(report.status, PublishStatus::Superseded { batch: 2, current: 3 });

    let topology = harness.dashboard.topology();
    let ids: Vec<i64> = topology.endpoints.iter().map(|e| e.connection_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(harness.dashboard.status().resolution_generation, 3);
    harness.assert_unresolved(&[]).unwrap();
}

#[tokio::test]
async fn test_unchanged_connections_are_not_resolved_again() {
    let api = Scenario::two_connections();
    let harness = TestHarness::new(api.clone());
    harness.load().await.unwrap();
    let lookups = api.count_requests("GET http");
    assert_eq!(lookups, 4);

    api.set_source_capacity(10, 40.0);
    harness.dashboard.refresh_topology().await.unwrap();
    assert_eq!(api.count_requests("GET http"), lookups);
    harness.assert_source(10, 40.0, 100.0).unwrap();
}

#[tokio::test]
async fn test_failed_connection_is_retried_on_refresh() {
    let api = Scenario::two_connections();
    api.fail_connection_lookup(2);
    let harness = TestHarness::new(api.clone());
    harness.load().await.unwrap();
    harness.assert_unresolved(&[2]).unwrap();

    // le backend répond de nouveau, la connexion n'a pas changé
    api.clear_failures();
    harness.dashboard.refresh_topology().await.unwrap();
    harness.assert_unresolved(&[]).unwrap();
    assert_eq!(harness.dashboard.status().resolution_failures, 0);

    let lookups = api.count_requests("GET http");
    harness.dashboard.refresh_topology().await.unwrap();
    assert_eq!(api.count_requests("GET http"), lookups);
}

#[tokio::test]
async fn test_dropped_resolution_caller_does_not_wedge_the_cache() {
    let api = Scenario::single_feed();
    let harness = TestHarness::new(api.clone());
    harness.load().await.unwrap();

    api.pause_next_lookups(2);
    let caller = {
        let dashboard = harness.dashboard.clone();
        tokio::spawn(async move { dashboard.resolve_connections().await })
    };
    api.wait_for_waiting(2, Duration::from_secs(2)).await.unwrap();
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());
    api.release();

    harness.dashboard.refresh_topology().await.unwrap();
    assert!(harness.dashboard.status().resolution_ready);

    let before = harness.snapshot().unwrap();
    harness.dashboard.trigger_allocation().await.unwrap();
    assert_ne!(harness.snapshot().unwrap(), before);
    harness.assert_source(1, 30.0, 60.0).unwrap();
}
