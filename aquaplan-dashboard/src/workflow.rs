//! Allocation Workflow Controller
//!
//! Idle -> Allocating -> Idle. At most one allocation is in flight: the
//! [`AllocatingGuard`] returned by [`AllocationWorkflow::try_begin`] holds the
//! Allocating state and puts the controller back to Idle when dropped, on
//! success, on error, or if the triggering future is cancelled.

use crate::client::{ApiError, ResourceApi};
use crate::error::DashboardError;
use crate::models::{AllocationResult, Source, Zone};
use crate::state::{new_state, Shared};
use crate::topology::fetch_sources_and_zones;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Allocating,
}

/// Dernière erreur du workflow, telle qu'exposée à l'UI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowError {
    pub kind: String,
    pub message: String,
}

impl From<&DashboardError> for WorkflowError {
    fn from(e: &DashboardError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug)]
struct WorkflowInner {
    state: WorkflowState,
    last_error: Option<WorkflowError>,
    runs: u64,
}

#[derive(Clone, Debug)]
pub struct AllocationWorkflow {
    inner: Shared<WorkflowInner>,
}

/// Held for the whole Allocating phase.
#[derive(Debug)]
pub struct AllocatingGuard {
    inner: Shared<WorkflowInner>,
}

impl Drop for AllocatingGuard {
    fn drop(&mut self) {
        self.inner.lock().state = WorkflowState::Idle;
    }
}

/// Outcome of a successful allocation call, before it is committed.
#[derive(Debug)]
pub struct AllocationRun {
    pub result: AllocationResult,
    /// Post-allocation refresh of sources and zones; may fail independently.
    pub refresh: Result<(Vec<Source>, Vec<Zone>), ApiError>,
}

/// What a trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Completed { zones: usize },
    AlreadyAllocating,
}

impl Default for AllocationWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocationWorkflow {
    pub fn new() -> Self {
        Self {
            inner: new_state(WorkflowInner {
                state: WorkflowState::Idle,
                last_error: None,
                runs: 0,
            }),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.inner.lock().state
    }

    pub fn is_allocating(&self) -> bool {
        self.state() == WorkflowState::Allocating
    }

    /// Idle -> Allocating; `None` if an allocation is already in flight.
    pub fn try_begin(&self) -> Option<AllocatingGuard> {
        let mut inner = self.inner.lock();
        if inner.state == WorkflowState::Allocating {
            debug!("allocation already in flight, trigger ignored");
            return None;
        }
        inner.state = WorkflowState::Allocating;
        Some(AllocatingGuard {
            inner: self.inner.clone(),
        })
    }

    pub fn last_error(&self) -> Option<WorkflowError> {
        self.inner.lock().last_error.clone()
    }

    /// Number of allocation results committed so far.
    pub fn runs(&self) -> u64 {
        self.inner.lock().runs
    }

    pub fn record_error(&self, err: &DashboardError) {
        self.inner.lock().last_error = Some(err.into());
    }

    /// An allocation result was committed; `refresh_error` is set when the
    /// topology that goes with it could not be refetched.
    pub fn record_committed(&self, refresh_error: Option<&DashboardError>) {
        let mut inner = self.inner.lock();
        inner.runs += 1;
        inner.last_error = refresh_error.map(WorkflowError::from);
    }
}

/// Call the remote optimisation, then refetch the collections it may have
/// mutated. Strictly sequential: the refresh starts once the result is in.
pub async fn run_allocation<A: ResourceApi>(api: &A) -> Result<AllocationRun, DashboardError> {
    let response = api.allocate().await.map_err(DashboardError::AllocationTrigger)?;
    let result = AllocationResult::from(response);
    info!("allocation returned {} zone entries", result.len());

    let refresh = fetch_sources_and_zones(api).await;
    Ok(AllocationRun { result, refresh })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_trigger_is_refused() {
        let wf = AllocationWorkflow::new();
        let guard = wf.try_begin().unwrap();
        assert!(wf.is_allocating());
        assert!(wf.try_begin().is_none());
        drop(guard);
        assert_eq!(wf.state(), WorkflowState::Idle);
        assert!(wf.try_begin().is_some());
    }

    #[test]
    fn test_error_bookkeeping() {
        let wf = AllocationWorkflow::new();
        let err = DashboardError::AllocationTrigger(ApiError::Unavailable("down".into()));
        wf.record_error(&err);
        let last = wf.last_error().unwrap();
        assert_eq!(last.kind, "allocation_trigger");
        assert_eq!(wf.runs(), 0);

        wf.record_committed(None);
        assert_eq!(wf.runs(), 1);
        assert!(wf.last_error().is_none());
    }
}
