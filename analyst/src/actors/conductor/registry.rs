use std::sync::Arc;

use crate::actors::conductor::workers::SharedWorkerAgent;

/// Workers available to a run, in configured order.
///
/// The registry order is the team order the supervisor sees.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: Vec<SharedWorkerAgent>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a worker. A worker whose id is already registered replaces the
    /// earlier entry in place.
    pub fn register(mut self, worker: SharedWorkerAgent) -> Self {
        if let Some(slot) = self.workers.iter_mut().find(|w| w.id() == worker.id()) {
            *slot = worker;
        } else {
            self.workers.push(worker);
        }
        self
    }

    pub fn get(&self, worker_id: &str) -> Option<SharedWorkerAgent> {
        self.workers
            .iter()
            .find(|w| w.id() == worker_id)
            .map(Arc::clone)
    }

    pub fn team_members(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.id().to_string()).collect()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("team_members", &self.team_members())
            .finish()
    }
}
