use ractor::{Actor, ActorRef};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::actors::conductor::{ConductorActor, ConductorArguments, ConductorMsg, Orchestrator};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    orchestrator: Arc<Orchestrator>,
    max_retained_runs: usize,
    conductor_actor: Mutex<Option<ActorRef<ConductorMsg>>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, max_retained_runs: usize) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                orchestrator,
                max_retained_runs,
                conductor_actor: Mutex::new(None),
            }),
        }
    }

    /// Returns the conductor, spawning it on first use or after it stopped.
    pub async fn ensure_conductor(&self) -> Result<ActorRef<ConductorMsg>, String> {
        let mut guard = self.inner.conductor_actor.lock().await;
        if let Some(conductor) = guard.as_ref() {
            if conductor.get_status() == ractor::ActorStatus::Running {
                return Ok(conductor.clone());
            }
            tracing::warn!(
                actor_id = %conductor.get_id(),
                "Conductor actor is no longer running; respawning"
            );
        }

        let (conductor, _) = Actor::spawn(
            Some(format!("conductor:{}", ulid::Ulid::new())),
            ConductorActor,
            ConductorArguments {
                orchestrator: self.inner.orchestrator.clone(),
                max_retained_runs: self.inner.max_retained_runs,
            },
        )
        .await
        .map_err(|e| e.to_string())?;

        *guard = Some(conductor.clone());
        Ok(conductor)
    }
}
