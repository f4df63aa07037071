use aquaplan_dashboard::client::{ApiError, HttpResourceClient, ResourceApi, ResourceKind};
use aquaplan_dashboard::config::ApiConf;
use aquaplan_dashboard::models::NewZone;
use aquaplan_dashboard::{AttributionMode, Dashboard};
use aquaplan_devkit::test_utils::init_test_logging;
use aquaplan_devkit::{MockResourceApi, Scenario, StubServer};

fn client_for(stub: &StubServer) -> HttpResourceClient {
    HttpResourceClient::new(&ApiConf {
        base_url: stub.base_url(),
        request_timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn test_reads_hal_collections() {
    init_test_logging();
    let stub = StubServer::start(Scenario::single_feed()).await.unwrap();
    let client = client_for(&stub);
    let base = stub.base_url();

    let sources = client.list_sources().await.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].links.self_link.id(), Some(1));
    assert_eq!(sources[0].capacity, 50.0);

    let connections = client.list_connections().await.unwrap();
    let source_link = connections[0].links.get("source").unwrap();
    assert_eq!(source_link.href, format!("{base}/api/connections/3/source"));

    let linked = client.fetch_linked(&source_link.href).await.unwrap();
    assert_eq!(linked.links.self_link.href, format!("{base}/api/sources/1"));
}

#[tokio::test]
async fn test_empty_collection() {
    let stub = StubServer::start(MockResourceApi::new()).await.unwrap();
    let client = client_for(&stub);
    assert!(client.list_zones().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_errors_are_classified() {
    let stub = StubServer::start(Scenario::single_feed()).await.unwrap();
    let client = client_for(&stub);
    let base = stub.base_url();

    let err = client
        .fetch_linked(&format!("{base}/api/connections/99/zone"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 404, .. }));

    stub.api.fail_allocation("solver crashed");
    let err = client.allocate().await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 503, .. }));

    let offline = HttpResourceClient::new(&ApiConf {
        base_url: "http://127.0.0.1:1".into(),
        request_timeout_secs: 2,
    })
    .unwrap();
    let err = offline.list_sources().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }));
}

#[tokio::test]
async fn test_creation_and_allocation() {
    let stub = StubServer::start(Scenario::single_feed()).await.unwrap();
    let client = client_for(&stub);

    client
        .create_zone(&NewZone { demand: 5.0, priority: 2 })
        .await
        .unwrap();
    assert_eq!(client.list_zones().await.unwrap().len(), 2);
    assert_eq!(stub.api.count_requests("POST /api/zones"), 1);

    assert_eq!(
        client.resource_href(ResourceKind::Zone, 7),
        format!("{}/api/zones/7", stub.base_url())
    );

    let response = client.allocate().await.unwrap();
    assert_eq!(response.allocations.len(), 1);
    assert_eq!(response.allocations[0].connection_allocations[0].connection_id, 3);
}

#[tokio::test]
async fn test_dashboard_over_http() {
    let stub = StubServer::start(Scenario::shared_zone()).await.unwrap();
    let dashboard = Dashboard::new(client_for(&stub), AttributionMode::ZoneTotal);

    dashboard.refresh_topology().await.unwrap();
    dashboard.trigger_allocation().await.unwrap();
    dashboard.create_connection(1, 8, 4.0).await.unwrap();

    let snapshot = dashboard.snapshot().unwrap();
    // source 1 now also feeds zone 8
    assert_eq!(snapshot.source(1).unwrap().allocated, 90.0);
    assert_eq!(snapshot.zone(7).unwrap().total_cost, 100.0);
    assert!(snapshot.unresolved_connections.is_empty());
}
