/*!
Mock du serveur de ressources pour développement sans backend

Implémente `ResourceApi` en mémoire avec:
- des hrefs au format HAL réel (`<base>/api/connections/5/source`...)
- un journal des requêtes pour les assertions de tests
- l'injection d'échecs (par href, par collection, sur l'allocation)
- une porte de pause pour tenir des lookups ou une allocation en vol
*/

use aquaplan_dashboard::client::{ApiError, ResourceApi, ResourceKind};
use aquaplan_dashboard::hal::{
    extract_id, ConnectionResource, LinkedResource, Links, SourceResource, ZoneResource,
};
use aquaplan_dashboard::models::{
    AllocationResponse, NewConnection, NewSource, NewZone, ZoneAllocation,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://mock.local";

#[derive(Debug, Clone, PartialEq)]
pub struct MockSource {
    pub capacity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockZone {
    pub demand: f64,
    pub priority: i32,
    pub filled_capacity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockConnection {
    pub source_id: i64,
    pub zone_id: i64,
    pub cost_per_unit: f64,
}

#[derive(Debug)]
struct MockData {
    base_url: String,
    sources: BTreeMap<i64, MockSource>,
    zones: BTreeMap<i64, MockZone>,
    connections: BTreeMap<i64, MockConnection>,
    next_id: i64,
    failing_hrefs: BTreeSet<String>,
    failing_collections: BTreeSet<&'static str>,
    allocation: Result<Vec<ZoneAllocation>, String>,
    requests: Vec<String>,
    paused_lookups: usize,
    pause_allocation: bool,
}

/// Porte partagée : les appels retenus attendent `open == true`
#[derive(Debug)]
struct PauseGate {
    open: watch::Sender<bool>,
    waiting: AtomicUsize,
}

impl PauseGate {
    async fn pass(&self) {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock du serveur de ressources HAL
#[derive(Clone, Debug)]
pub struct MockResourceApi {
    data: Arc<Mutex<MockData>>,
    gate: Arc<PauseGate>,
}

impl MockResourceApi {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let (open, _rx) = watch::channel(true);
        Self {
            data: Arc::new(Mutex::new(MockData {
                base_url: base_url.trim_end_matches('/').to_string(),
                sources: BTreeMap::new(),
                zones: BTreeMap::new(),
                connections: BTreeMap::new(),
                next_id: 1,
                failing_hrefs: BTreeSet::new(),
                failing_collections: BTreeSet::new(),
                allocation: Ok(Vec::new()),
                requests: Vec::new(),
                paused_lookups: 0,
                pause_allocation: false,
            })),
            gate: Arc::new(PauseGate {
                open,
                waiting: AtomicUsize::new(0),
            }),
        }
    }

    pub fn base_url(&self) -> String {
        self.data.lock().base_url.clone()
    }

    /// Re-point every href at another base (used by the stub server once bound).
    pub fn set_base_url(&self, base_url: &str) {
        self.data.lock().base_url = base_url.trim_end_matches('/').to_string();
    }

    // ============ DONNÉES ============

    pub fn add_source(&self, id: i64, capacity: f64) -> &Self {
        let mut data = self.data.lock();
        data.sources.insert(id, MockSource { capacity });
        data.next_id = data.next_id.max(id + 1);
        self
    }

    pub fn add_zone(&self, id: i64, demand: f64, priority: i32) -> &Self {
        let mut data = self.data.lock();
        data.zones.insert(
            id,
            MockZone {
                demand,
                priority,
                filled_capacity: None,
            },
        );
        data.next_id = data.next_id.max(id + 1);
        self
    }

    pub fn set_zone_filled_capacity(&self, id: i64, filled: Option<f64>) -> &Self {
        if let Some(zone) = self.data.lock().zones.get_mut(&id) {
            zone.filled_capacity = filled;
        }
        self
    }

    pub fn set_source_capacity(&self, id: i64, capacity: f64) -> &Self {
        if let Some(source) = self.data.lock().sources.get_mut(&id) {
            source.capacity = capacity;
        }
        self
    }

    pub fn add_connection(&self, id: i64, source_id: i64, zone_id: i64, cost_per_unit: f64) -> &Self {
        let mut data = self.data.lock();
        data.connections.insert(
            id,
            MockConnection {
                source_id,
                zone_id,
                cost_per_unit,
            },
        );
        data.next_id = data.next_id.max(id + 1);
        self
    }

    pub fn remove_connection(&self, id: i64) -> &Self {
        self.data.lock().connections.remove(&id);
        self
    }

    pub fn connections(&self) -> BTreeMap<i64, MockConnection> {
        self.data.lock().connections.clone()
    }

    pub fn sources(&self) -> BTreeMap<i64, MockSource> {
        self.data.lock().sources.clone()
    }

    pub fn zones(&self) -> BTreeMap<i64, MockZone> {
        self.data.lock().zones.clone()
    }

    pub fn set_allocation(&self, allocations: Vec<ZoneAllocation>) -> &Self {
        self.data.lock().allocation = Ok(allocations);
        self
    }

    // ============ INJECTION D'ÉCHECS ============

    pub fn fail_allocation(&self, reason: &str) -> &Self {
        self.data.lock().allocation = Err(reason.to_string());
        self
    }

    /// Every GET of `href` answers 404.
    pub fn fail_href(&self, href: &str) -> &Self {
        self.data.lock().failing_hrefs.insert(href.to_string());
        self
    }

    /// Both association links of the connection fail.
    pub fn fail_connection_lookup(&self, connection_id: i64) -> &Self {
        let base = self.base_url();
        self.fail_href(&format!("{base}/api/connections/{connection_id}/source"));
        self.fail_href(&format!("{base}/api/connections/{connection_id}/zone"))
    }

    pub fn fail_collection(&self, kind: ResourceKind) -> &Self {
        self.data.lock().failing_collections.insert(kind.collection());
        self
    }

    pub fn clear_failures(&self) -> &Self {
        let mut data = self.data.lock();
        data.failing_hrefs.clear();
        data.failing_collections.clear();
        self
    }

    // ============ PAUSE ============

    /// Hold the next `count` association lookups until [`Self::release`].
    pub fn pause_next_lookups(&self, count: usize) -> &Self {
        self.data.lock().paused_lookups = count;
        self.gate.open.send_replace(false);
        self
    }

    /// Hold the next allocation call until [`Self::release`].
    pub fn pause_next_allocation(&self) -> &Self {
        self.data.lock().pause_allocation = true;
        self.gate.open.send_replace(false);
        self
    }

    pub fn release(&self) {
        self.gate.open.send_replace(true);
    }

    /// Calls currently held at the gate.
    pub fn waiting(&self) -> usize {
        self.gate.waiting.load(Ordering::SeqCst)
    }

    /// Wait until `count` calls are held, or fail after `timeout`.
    pub async fn wait_for_waiting(&self, count: usize, timeout: Duration) -> anyhow::Result<()> {
        let start = std::time::Instant::now();
        while self.waiting() < count {
            if start.elapsed() > timeout {
                anyhow::bail!("expected {count} held calls, got {}", self.waiting());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(())
    }

    // ============ JOURNAL ============

    /// Requests seen so far, as `"<METHOD> <url>"`.
    pub fn requests(&self) -> Vec<String> {
        self.data.lock().requests.clone()
    }

    pub fn count_requests(&self, prefix: &str) -> usize {
        self.data
            .lock()
            .requests
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    pub fn allocation_calls(&self) -> usize {
        self.count_requests("GET /allocate-water")
    }

    pub fn clear_requests(&self) {
        self.data.lock().requests.clear();
    }

    // ============ INTERNE ============

    fn record(&self, request: String) {
        debug!("[mock] {}", request);
        self.data.lock().requests.push(request);
    }

    fn check_collection(&self, kind: ResourceKind) -> Result<String, ApiError> {
        let data = self.data.lock();
        let url = format!("{}/api/{}", data.base_url, kind.collection());
        if data.failing_collections.contains(kind.collection()) {
            return Err(ApiError::Unavailable(url));
        }
        Ok(url)
    }

    fn href(base: &str, kind: ResourceKind, id: i64) -> String {
        format!("{base}/api/{}/{id}", kind.collection())
    }

    fn allocate_id(data: &mut MockData) -> i64 {
        let id = data.next_id;
        data.next_id += 1;
        id
    }
}

impl Default for MockResourceApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceApi for MockResourceApi {
    async fn list_sources(&self) -> Result<Vec<SourceResource>, ApiError> {
        self.record("GET /api/sources".into());
        self.check_collection(ResourceKind::Source)?;
        let data = self.data.lock();
        Ok(data
            .sources
            .iter()
            .map(|(&id, s)| SourceResource {
                capacity: s.capacity,
                links: Links::new(Self::href(&data.base_url, ResourceKind::Source, id)),
            })
            .collect())
    }

    async fn list_zones(&self) -> Result<Vec<ZoneResource>, ApiError> {
        self.record("GET /api/zones".into());
        self.check_collection(ResourceKind::Zone)?;
        let data = self.data.lock();
        Ok(data
            .zones
            .iter()
            .map(|(&id, z)| ZoneResource {
                demand: z.demand,
                priority: z.priority,
                filled_capacity: z.filled_capacity,
                links: Links::new(Self::href(&data.base_url, ResourceKind::Zone, id)),
            })
            .collect())
    }

    async fn list_connections(&self) -> Result<Vec<ConnectionResource>, ApiError> {
        self.record("GET /api/connections".into());
        self.check_collection(ResourceKind::Connection)?;
        let data = self.data.lock();
        Ok(data
            .connections
            .iter()
            .map(|(&id, c)| {
                let own = Self::href(&data.base_url, ResourceKind::Connection, id);
                ConnectionResource {
                    cost_per_unit: c.cost_per_unit,
                    links: Links::new(own.clone())
                        .with("connection", own.clone())
                        .with("source", format!("{own}/source"))
                        .with("zone", format!("{own}/zone")),
                }
            })
            .collect())
    }

    async fn fetch_linked(&self, href: &str) -> Result<LinkedResource, ApiError> {
        self.record(format!("GET {href}"));

        let held = {
            let mut data = self.data.lock();
            if data.paused_lookups > 0 {
                data.paused_lookups -= 1;
                true
            } else {
                false
            }
        };
        if held {
            self.gate.pass().await;
        }

        let data = self.data.lock();
        let not_found = || ApiError::Status {
            url: href.to_string(),
            status: 404,
        };
        if data.failing_hrefs.contains(href) {
            return Err(not_found());
        }

        let prefix = format!("{}/api/connections/", data.base_url);
        let rest = href.strip_prefix(&prefix).ok_or_else(not_found)?;
        let (id, rel) = rest.split_once('/').ok_or_else(not_found)?;
        let id: i64 = id.parse().map_err(|_| not_found())?;
        let conn = data.connections.get(&id).ok_or_else(not_found)?;
        let target = match rel {
            "source" => Self::href(&data.base_url, ResourceKind::Source, conn.source_id),
            "zone" => Self::href(&data.base_url, ResourceKind::Zone, conn.zone_id),
            _ => return Err(not_found()),
        };
        Ok(LinkedResource {
            links: Links::new(target),
        })
    }

    async fn create_source(&self, body: &NewSource) -> Result<(), ApiError> {
        self.record("POST /api/sources".into());
        let url = self.check_collection(ResourceKind::Source)?;
        let mut data = self.data.lock();
        if !body.capacity.is_finite() {
            return Err(ApiError::Status { url, status: 400 });
        }
        let id = Self::allocate_id(&mut data);
        data.sources.insert(id, MockSource { capacity: body.capacity });
        Ok(())
    }

    async fn create_zone(&self, body: &NewZone) -> Result<(), ApiError> {
        self.record("POST /api/zones".into());
        let url = self.check_collection(ResourceKind::Zone)?;
        let mut data = self.data.lock();
        if !body.demand.is_finite() {
            return Err(ApiError::Status { url, status: 400 });
        }
        let id = Self::allocate_id(&mut data);
        data.zones.insert(
            id,
            MockZone {
                demand: body.demand,
                priority: body.priority,
                filled_capacity: None,
            },
        );
        Ok(())
    }

    async fn create_connection(&self, body: &NewConnection) -> Result<(), ApiError> {
        self.record("POST /api/connections".into());
        let url = self.check_collection(ResourceKind::Connection)?;
        let mut data = self.data.lock();
        let endpoints = extract_id(&body.source).zip(extract_id(&body.zone));
        let Some((source_id, zone_id)) = endpoints
            .filter(|(s, z)| data.sources.contains_key(s) && data.zones.contains_key(z))
        else {
            return Err(ApiError::Status { url, status: 400 });
        };
        let id = Self::allocate_id(&mut data);
        data.connections.insert(
            id,
            MockConnection {
                source_id,
                zone_id,
                cost_per_unit: body.cost_per_unit,
            },
        );
        Ok(())
    }

    async fn allocate(&self) -> Result<AllocationResponse, ApiError> {
        self.record("GET /allocate-water".into());

        let held = std::mem::take(&mut self.data.lock().pause_allocation);
        if held {
            self.gate.pass().await;
        }

        match &self.data.lock().allocation {
            Ok(allocations) => Ok(AllocationResponse {
                allocations: allocations.clone(),
            }),
            Err(reason) => Err(ApiError::Unavailable(reason.clone())),
        }
    }

    fn resource_href(&self, kind: ResourceKind, id: i64) -> String {
        Self::href(&self.base_url(), kind, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_links_dereference_to_endpoints() {
        let api = MockResourceApi::new();
        api.add_source(1, 50.0).add_zone(2, 10.0, 1).add_connection(3, 1, 2, 1.5);

        let conns = api.list_connections().await.unwrap();
        assert_eq!(conns.len(), 1);
        let source_href = &conns[0].links.get("source").unwrap().href;
        assert_eq!(source_href, "http://mock.local/api/connections/3/source");

        let source = api.fetch_linked(source_href).await.unwrap();
        assert_eq!(source.links.self_link.id(), Some(1));
        let zone = api
            .fetch_linked("http://mock.local/api/connections/3/zone")
            .await
            .unwrap();
        assert_eq!(zone.links.self_link.id(), Some(2));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let api = MockResourceApi::new();
        api.add_source(1, 50.0).add_zone(2, 10.0, 1).add_connection(3, 1, 2, 1.5);
        api.fail_connection_lookup(3).fail_collection(ResourceKind::Zone);

        let err = api
            .fetch_linked("http://mock.local/api/connections/3/zone")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 404, .. }));
        assert!(api.list_zones().await.is_err());

        api.clear_failures();
        assert!(api.list_zones().await.is_ok());
    }

    #[tokio::test]
    async fn test_create_connection_from_locators() {
        let api = MockResourceApi::new();
        api.add_source(1, 50.0).add_zone(2, 10.0, 1);
        let body = NewConnection {
            source: api.resource_href(ResourceKind::Source, 1),
            zone: api.resource_href(ResourceKind::Zone, 2),
            cost_per_unit: 0.5,
        };
        api.create_connection(&body).await.unwrap();
        let conns = api.connections();
        let (_, conn) = conns.iter().next().unwrap();
        assert_eq!((conn.source_id, conn.zone_id), (1, 2));

        let dangling = NewConnection {
            source: api.resource_href(ResourceKind::Source, 99),
            ..body
        };
        assert!(api.create_connection(&dangling).await.is_err());
        assert_eq!(api.count_requests("POST /api/connections"), 2);
    }

    #[tokio::test]
    async fn test_paused_lookups_wait_for_release() {
        let api = MockResourceApi::new();
        api.add_source(1, 50.0).add_zone(2, 10.0, 1).add_connection(3, 1, 2, 1.5);
        api.pause_next_lookups(1);

        let held = {
            let api = api.clone();
            tokio::spawn(async move {
                api.fetch_linked("http://mock.local/api/connections/3/source").await
            })
        };
        api.wait_for_waiting(1, Duration::from_secs(2)).await.unwrap();

        // les appels suivants ne sont pas retenus
        assert!(api
            .fetch_linked("http://mock.local/api/connections/3/zone")
            .await
            .is_ok());

        api.release();
        let resolved = held.await.unwrap().unwrap();
        assert_eq!(resolved.links.self_link.id(), Some(1));
        assert_eq!(api.waiting(), 0);
    }
}
