//! ConductorActor - owns the run registry and starts orchestrator runs
//!
//! The actor never executes a run itself. Each accepted query gets a ULID,
//! a RUNNING record, and a spawned task driving the `Orchestrator`; the task
//! reports back with `ConductorMsg::RunFinished`. Callers of `ExecuteQuery`
//! are parked until that message arrives.

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use shared_types::{AnalysisRunResponse, AnalysisRunSummary};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::actors::conductor::protocol::{ConductorError, ConductorMsg};
use crate::actors::conductor::runtime::Orchestrator;

pub const DEFAULT_MAX_RETAINED_RUNS: usize = 200;

pub(crate) type RunReply = RpcReplyPort<Result<AnalysisRunResponse, ConductorError>>;

/// ConductorActor - run registry actor
#[derive(Debug, Default)]
pub struct ConductorActor;

/// Arguments for spawning ConductorActor
#[derive(Clone)]
pub struct ConductorArguments {
    pub orchestrator: Arc<Orchestrator>,
    /// Upper bound on stored run records; running records are never evicted
    pub max_retained_runs: usize,
}

impl ConductorArguments {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            max_retained_runs: DEFAULT_MAX_RETAINED_RUNS,
        }
    }
}

/// Internal state for ConductorActor
pub struct ConductorState {
    pub(crate) orchestrator: Arc<Orchestrator>,
    runs: HashMap<String, AnalysisRunResponse>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
    /// `ExecuteQuery` callers waiting for a terminal record
    pub(crate) waiters: HashMap<String, Vec<RunReply>>,
    max_retained_runs: usize,
}

impl ConductorState {
    pub fn new(orchestrator: Arc<Orchestrator>, max_retained_runs: usize) -> Self {
        Self {
            orchestrator,
            runs: HashMap::new(),
            order: VecDeque::new(),
            waiters: HashMap::new(),
            max_retained_runs: max_retained_runs.max(1),
        }
    }

    pub fn get_run(&self, run_id: &str) -> Option<&AnalysisRunResponse> {
        self.runs.get(run_id)
    }

    pub fn list_runs(&self) -> Vec<AnalysisRunSummary> {
        self.order
            .iter()
            .rev()
            .filter_map(|run_id| self.runs.get(run_id))
            .map(AnalysisRunSummary::from)
            .collect()
    }

    pub(crate) fn insert_run(&mut self, run: AnalysisRunResponse) {
        if self.runs.insert(run.run_id.clone(), run.clone()).is_none() {
            self.order.push_back(run.run_id);
        }
        self.evict_overflow();
    }

    /// Replaces a stored record. Returns false when the run is unknown.
    pub(crate) fn update_run(&mut self, run: AnalysisRunResponse) -> bool {
        match self.runs.get_mut(&run.run_id) {
            Some(slot) => {
                *slot = run;
                self.evict_overflow();
                true
            }
            None => false,
        }
    }

    fn evict_overflow(&mut self) {
        while self.runs.len() > self.max_retained_runs {
            let Some(position) = self.order.iter().position(|run_id| {
                self.runs
                    .get(run_id)
                    .is_some_and(|run| run.status.is_terminal())
            }) else {
                break;
            };
            if let Some(run_id) = self.order.remove(position) {
                self.runs.remove(&run_id);
                tracing::debug!(run_id = %run_id, "Evicted retained run");
            }
        }
    }
}

#[async_trait]
impl Actor for ConductorActor {
    type Msg = ConductorMsg;
    type State = ConductorState;
    type Arguments = ConductorArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            team = ?args.orchestrator.team_members(),
            max_turns = args.orchestrator.policy().max_turns,
            "ConductorActor starting"
        );

        Ok(ConductorState::new(args.orchestrator, args.max_retained_runs))
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ConductorMsg::ExecuteQuery { query, reply } => {
                match self.handle_start_run(myself, state, query) {
                    Ok(record) => state
                        .waiters
                        .entry(record.run_id)
                        .or_default()
                        .push(reply),
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            ConductorMsg::SubmitQuery { query, reply } => {
                let result = self.handle_start_run(myself, state, query);
                let _ = reply.send(result);
            }
            ConductorMsg::GetRun { run_id, reply } => {
                let _ = reply.send(state.get_run(&run_id).cloned());
            }
            ConductorMsg::ListRuns { reply } => {
                let _ = reply.send(state.list_runs());
            }
            ConductorMsg::RunFinished { run_id, response } => {
                self.handle_run_finished(state, run_id, response);
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for (run_id, waiters) in state.waiters.drain() {
            for reply in waiters {
                let _ = reply.send(Err(ConductorError::ActorUnavailable(format!(
                    "conductor stopped before run {run_id} finished"
                ))));
            }
        }
        tracing::info!(actor_id = %myself.get_id(), "ConductorActor stopped");
        Ok(())
    }
}
