//! Dashboard engine
//!
//! Owns the only mutable state (topology, allocation result, resolution
//! cache) and the last valid snapshot. Every mutation happens inside a short
//! critical section; remote calls are made with no lock held, and a snapshot
//! is only recomputed against a resolution mapping that matches the current
//! connection set.

use crate::aggregator::{compute_snapshot, AttributionMode, UtilizationSnapshot};
use crate::client::{ResourceApi, ResourceKind};
use crate::error::DashboardError;
use crate::models::{
    ConnectionEndpoints, ConnectionRecord, NewConnection, NewSource, NewZone, Source, SourceId,
    Zone, ZoneId,
};
use crate::resolution::{PublishStatus, ResolutionBatch, ResolutionFailure};
use crate::state::{new_state, DashboardState, Shared};
use crate::topology::{fetch_connections, fetch_sources, fetch_topology, fetch_zones};
use crate::workflow::{run_allocation, AllocationWorkflow, TriggerOutcome, WorkflowError, WorkflowState};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type SnapshotReceiver = watch::Receiver<Option<Arc<UtilizationSnapshot>>>;

pub struct Dashboard<A: ResourceApi> {
    api: Arc<A>,
    state: Shared<DashboardState>,
    workflow: AllocationWorkflow,
    attribution: AttributionMode,
    snapshots: Arc<watch::Sender<Option<Arc<UtilizationSnapshot>>>>,
}

impl<A: ResourceApi> Clone for Dashboard<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            state: self.state.clone(),
            workflow: self.workflow.clone(),
            attribution: self.attribution,
            snapshots: self.snapshots.clone(),
        }
    }
}

/// Result of one resolution batch as seen by the caller.
#[derive(Debug)]
pub struct ResolutionReport {
    pub status: PublishStatus,
    /// Per-connection failures; the connections are excluded, not fatal.
    pub errors: Vec<DashboardError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatus {
    pub allocating: bool,
    pub workflow_state: WorkflowState,
    pub last_error: Option<WorkflowError>,
    /// Last failed topology refresh (HTTP or poller); cleared by a success.
    pub last_refresh_error: Option<WorkflowError>,
    pub allocation_runs: u64,
    pub resolution_generation: u64,
    pub resolution_ready: bool,
    pub resolution_failures: usize,
    pub has_snapshot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyView {
    pub sources: Vec<Source>,
    pub zones: Vec<Zone>,
    pub connections: Vec<ConnectionRecord>,
    /// Published endpoints, possibly from a batch that is being replaced.
    pub endpoints: Vec<ConnectionEndpoints>,
    pub failures: Vec<ResolutionFailure>,
}

impl<A: ResourceApi> Dashboard<A> {
    pub fn new(api: A, attribution: AttributionMode) -> Self {
        Self::with_shared_api(Arc::new(api), attribution)
    }

    pub fn with_shared_api(api: Arc<A>, attribution: AttributionMode) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            api,
            state: new_state(DashboardState::default()),
            workflow: AllocationWorkflow::new(),
            attribution,
            snapshots: Arc::new(tx),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn attribution(&self) -> AttributionMode {
        self.attribution
    }

    // ============ LECTURE ============

    /// Last valid snapshot; `None` until the first recompute.
    pub fn snapshot(&self) -> Option<Arc<UtilizationSnapshot>> {
        self.snapshots.borrow().clone()
    }

    /// Notified on every recompute.
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.snapshots.subscribe()
    }

    pub fn is_allocating(&self) -> bool {
        self.workflow.is_allocating()
    }

    pub fn status(&self) -> DashboardStatus {
        let (generation, ready, failures, refresh_error) = {
            let st = self.state.lock();
            (
                st.links.generation(),
                st.links.is_ready(),
                st.links.ready().map(|l| l.failures.len()).unwrap_or(0),
                st.last_refresh_error.clone(),
            )
        };
        DashboardStatus {
            allocating: self.workflow.is_allocating(),
            workflow_state: self.workflow.state(),
            last_error: self.workflow.last_error(),
            last_refresh_error: refresh_error,
            allocation_runs: self.workflow.runs(),
            resolution_generation: generation,
            resolution_ready: ready,
            resolution_failures: failures,
            has_snapshot: self.snapshots.borrow().is_some(),
        }
    }

    pub fn topology(&self) -> TopologyView {
        let st = self.state.lock();
        let published = st.links.last_published();
        TopologyView {
            sources: st.topology.sources().to_vec(),
            zones: st.topology.zones().to_vec(),
            connections: st.topology.connections().to_vec(),
            endpoints: published
                .map(|l| l.endpoints.values().copied().collect())
                .unwrap_or_default(),
            failures: published.map(|l| l.failures.clone()).unwrap_or_default(),
        }
    }

    // ============ RECALCUL ============

    /// Recompute and broadcast the snapshot if the resolution mapping is
    /// current; otherwise the previous snapshot stays in place.
    pub fn recompute(&self) -> Option<Arc<UtilizationSnapshot>> {
        let snapshot = {
            let st = self.state.lock();
            let Some(links) = st.links.ready() else {
                debug!("resolution pending, keeping previous snapshot");
                return None;
            };
            compute_snapshot(&st.topology, Some(links), st.allocation.as_ref(), self.attribution)
        };
        let snapshot = Arc::new(snapshot);
        self.snapshots.send_replace(Some(snapshot.clone()));
        Some(snapshot)
    }

    // ============ TOPOLOGIE ============

    /// Fetch every collection, commit as one unit, then recompute.
    ///
    /// A new batch is started when the connection set changed, when no
    /// mapping is ready for the current generation (a batch was lost before
    /// publishing), or when the last mapping excluded failed connections.
    pub async fn refresh_topology(&self) -> Result<(), DashboardError> {
        let fetch = match fetch_topology(self.api.as_ref()).await {
            Ok(fetch) => fetch,
            Err(e) => {
                let err = DashboardError::TopologyRefresh(e);
                warn!("{err}");
                self.state.lock().last_refresh_error = Some(WorkflowError::from(&err));
                return Err(err);
            }
        };

        let batch = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            st.last_refresh_error = None;
            let changed = st.topology.apply(fetch);
            if changed || st.links.needs_resolution() {
                Some(st.links.begin(st.topology.connections()))
            } else {
                None
            }
        };

        match batch {
            Some(batch) => {
                self.run_batch(batch).await;
            }
            None => {
                self.recompute();
            }
        }
        Ok(())
    }

    /// Start a fresh batch for the current connection set, superseding any
    /// batch in flight.
    pub async fn resolve_connections(&self) -> ResolutionReport {
        let batch = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            st.links.begin(st.topology.connections())
        };
        self.run_batch(batch).await
    }

    /// The batch runs in its own task: a caller dropped mid-flight (client
    /// gone, poller aborted) cannot leave a started generation unpublished.
    async fn run_batch(&self, batch: ResolutionBatch) -> ResolutionReport {
        let generation = batch.generation();
        let dashboard = self.clone();
        let task = tokio::spawn(async move { dashboard.publish_batch(batch).await });
        match task.await {
            Ok(report) => report,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                warn!("resolution batch {generation} abandoned: {e}");
                ResolutionReport {
                    status: PublishStatus::Abandoned { batch: generation },
                    errors: Vec::new(),
                }
            }
        }
    }

    async fn publish_batch(&self, batch: ResolutionBatch) -> ResolutionReport {
        let mut outcome = batch.run(self.api.as_ref()).await;
        let errors = outcome.take_errors();
        let status = self.state.lock().links.publish(outcome);
        match status {
            PublishStatus::Published { generation, resolved } => {
                info!("resolution batch {generation} published ({resolved} connections)");
                self.recompute();
            }
            PublishStatus::Superseded { batch, current } => {
                debug!("batch {batch} superseded by {current}");
            }
            PublishStatus::Abandoned { .. } => {}
        }
        ResolutionReport { status, errors }
    }

    // ============ ALLOCATION ============

    /// Run the remote allocation unless one is already in flight.
    ///
    /// The new result and the refreshed sources/zones are committed together
    /// and followed by a single recompute. A failed refresh still commits the
    /// result and is returned as [`DashboardError::TopologyRefresh`].
    pub async fn trigger_allocation(&self) -> Result<TriggerOutcome, DashboardError> {
        let Some(_allocating) = self.workflow.try_begin() else {
            return Ok(TriggerOutcome::AlreadyAllocating);
        };

        let run = match run_allocation(self.api.as_ref()).await {
            Ok(run) => run,
            Err(e) => {
                warn!("{e}");
                self.workflow.record_error(&e);
                return Err(e);
            }
        };

        let zones = run.result.len();
        let refresh_error = {
            let mut st = self.state.lock();
            st.allocation = Some(run.result);
            match run.refresh {
                Ok((sources, refreshed_zones)) => {
                    st.topology.replace_sources(sources);
                    st.topology.replace_zones(refreshed_zones);
                    None
                }
                Err(e) => Some(DashboardError::TopologyRefresh(e)),
            }
        };
        self.workflow.record_committed(refresh_error.as_ref());
        self.recompute();

        match refresh_error {
            Some(err) => {
                warn!("allocation applied on stale topology: {err}");
                Err(err)
            }
            None => {
                info!("allocation committed for {zones} zones");
                Ok(TriggerOutcome::Completed { zones })
            }
        }
    }

    // ============ FORMULAIRES ============

    pub async fn create_source(&self, capacity: f64) -> Result<(), DashboardError> {
        self.api
            .create_source(&NewSource { capacity })
            .await
            .map_err(DashboardError::Create)?;
        let sources = fetch_sources(self.api.as_ref())
            .await
            .map_err(DashboardError::TopologyRefresh)?;
        self.state.lock().topology.replace_sources(sources);
        self.recompute();
        Ok(())
    }

    pub async fn create_zone(&self, demand: f64, priority: i32) -> Result<(), DashboardError> {
        self.api
            .create_zone(&NewZone { demand, priority })
            .await
            .map_err(DashboardError::Create)?;
        let zones = fetch_zones(self.api.as_ref())
            .await
            .map_err(DashboardError::TopologyRefresh)?;
        self.state.lock().topology.replace_zones(zones);
        self.recompute();
        Ok(())
    }

    pub async fn create_connection(
        &self,
        source_id: SourceId,
        zone_id: ZoneId,
        cost_per_unit: f64,
    ) -> Result<(), DashboardError> {
        let body = NewConnection {
            source: self.api.resource_href(ResourceKind::Source, source_id),
            zone: self.api.resource_href(ResourceKind::Zone, zone_id),
            cost_per_unit,
        };
        self.api
            .create_connection(&body)
            .await
            .map_err(DashboardError::Create)?;
        let connections = fetch_connections(self.api.as_ref())
            .await
            .map_err(DashboardError::TopologyRefresh)?;

        let batch = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let changed = st.topology.replace_connections(connections);
            if changed || st.links.needs_resolution() {
                Some(st.links.begin(st.topology.connections()))
            } else {
                None
            }
        };
        if let Some(batch) = batch {
            self.run_batch(batch).await;
        }
        Ok(())
    }

    // ============ POLLING ============

    /// Refresh the topology every `interval` until the task is aborted.
    pub fn spawn_poller(&self, interval: Duration) -> JoinHandle<()> {
        let dashboard = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // le premier tick est immédiat: l'appelant a déjà fait le chargement initial
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // l'erreur est déjà journalisée et visible dans status()
                if dashboard.refresh_topology().await.is_err() {
                    warn!("periodic refresh failed, keeping last snapshot");
                }
            }
        })
    }
}
