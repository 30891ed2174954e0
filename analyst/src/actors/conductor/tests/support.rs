use async_trait::async_trait;
use ractor::{Actor, ActorRef};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::actors::agent_harness::HarnessError;
use crate::actors::conductor::registry::WorkerRegistry;
use crate::actors::conductor::runtime::{Orchestrator, RunPolicy};
use crate::actors::conductor::state::{ConversationState, Message, RouteTarget, RoutingDecision};
use crate::actors::conductor::supervisor::SupervisorPolicy;
use crate::actors::conductor::workers::{effective_messages, WorkerAgent, WorkerError};
use crate::actors::conductor::{ConductorActor, ConductorArguments, ConductorError, ConductorMsg};

pub(crate) fn route(worker: &str) -> RoutingDecision {
    RoutingDecision {
        next: RouteTarget::Worker(worker.to_string()),
        reasoning: format!("{worker} should act"),
        information_needed: Vec::new(),
    }
}

pub(crate) fn route_needing(worker: &str, needs: &[&str]) -> RoutingDecision {
    RoutingDecision {
        information_needed: needs.iter().map(|s| s.to_string()).collect(),
        ..route(worker)
    }
}

/// Supervisor that replays a script, then repeats `fallback` forever.
pub(crate) struct ScriptedSupervisor {
    script: Mutex<VecDeque<Result<RoutingDecision, ConductorError>>>,
    fallback: Option<RoutingDecision>,
    calls: Mutex<u32>,
}

impl ScriptedSupervisor {
    pub fn new(script: Vec<RoutingDecision>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(Ok).collect()),
            fallback: None,
            calls: Mutex::new(0),
        }
    }

    pub fn always(decision: RoutingDecision) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(decision),
            calls: Mutex::new(0),
        }
    }

    pub fn failing(err: ConductorError) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Err(err)])),
            fallback: None,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SupervisorPolicy for ScriptedSupervisor {
    async fn decide(&self, _state: &ConversationState) -> Result<RoutingDecision, ConductorError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        Ok(self
            .fallback
            .clone()
            .unwrap_or_else(|| RoutingDecision::finish("script exhausted")))
    }
}

/// Worker answering with a fixed text and recording what it was shown.
pub(crate) struct RecordingWorker {
    id: String,
    answer: String,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl RecordingWorker {
    pub fn new(id: &str, answer: &str) -> Self {
        Self {
            id: id.to_string(),
            answer: answer.to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn invocations(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerAgent for RecordingWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn act(&self, state: &ConversationState) -> Result<Message, WorkerError> {
        self.seen.lock().unwrap().push(effective_messages(state));
        Ok(Message::from_worker(&self.id, &self.answer))
    }
}

pub(crate) struct FailingWorker {
    id: String,
}

impl FailingWorker {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

#[async_trait]
impl WorkerAgent for FailingWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn act(&self, _state: &ConversationState) -> Result<Message, WorkerError> {
        Err(WorkerError::Harness(HarnessError::Decision(
            "backend down".to_string(),
        )))
    }
}

/// Worker whose step panics, standing in for a buggy collaborator.
pub(crate) struct PanickingWorker {
    id: String,
}

impl PanickingWorker {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

#[async_trait]
impl WorkerAgent for PanickingWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn act(&self, _state: &ConversationState) -> Result<Message, WorkerError> {
        panic!("{} collaborator exploded", self.id);
    }
}

/// Worker that answers only after `delay`.
pub(crate) struct SlowWorker {
    id: String,
    delay: Duration,
}

impl SlowWorker {
    pub fn new(id: &str, delay: Duration) -> Self {
        Self {
            id: id.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl WorkerAgent for SlowWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn act(&self, _state: &ConversationState) -> Result<Message, WorkerError> {
        tokio::time::sleep(self.delay).await;
        Ok(Message::from_worker(&self.id, "late answer"))
    }
}

pub(crate) fn orchestrator(
    supervisor: Arc<ScriptedSupervisor>,
    workers: Vec<Arc<dyn WorkerAgent>>,
    policy: RunPolicy,
) -> Orchestrator {
    let registry = workers
        .into_iter()
        .fold(WorkerRegistry::new(), |registry, worker| registry.register(worker));
    Orchestrator::new(supervisor, registry, policy)
}

pub(crate) async fn setup_test_conductor(
    orchestrator: Orchestrator,
    max_retained_runs: usize,
) -> ActorRef<ConductorMsg> {
    let args = ConductorArguments {
        orchestrator: Arc::new(orchestrator),
        max_retained_runs,
    };
    let (conductor_ref, _conductor_handle) =
        Actor::spawn(None, ConductorActor, args).await.unwrap();
    conductor_ref
}
