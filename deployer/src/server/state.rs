//! Server state

use std::sync::Arc;

use crate::store::DeploymentStore;
use crate::workers::queue::DeployQueue;

/// Server state shared across handlers
pub struct ServerState {
    pub queue: Arc<DeployQueue>,
    pub store: Arc<dyn DeploymentStore>,
}

impl ServerState {
    pub fn new(queue: Arc<DeployQueue>) -> Self {
        let store = queue.store().clone();
        Self { queue, store }
    }
}
