use crate::models::AllocationResult;
use crate::resolution::LinkResolutionCache;
use crate::topology::TopologyStore;
use crate::workflow::WorkflowError;
use parking_lot::Mutex;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Seul état mutable du tableau de bord; tout le reste en dérive
#[derive(Debug, Default)]
pub struct DashboardState {
    pub topology: TopologyStore,
    pub allocation: Option<AllocationResult>,
    pub links: LinkResolutionCache,
    pub last_refresh_error: Option<WorkflowError>,
}
