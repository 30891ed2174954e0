//! Orchestrator turn loop
//!
//! One run is a strictly sequential alternation of supervisor decisions and
//! worker steps over a single `ConversationState`:
//!
//! ```text
//! RUNNING --decide--> FINISH ------------------------> FINISHED
//!    ^                  |
//!    |                  +--> Worker(id) --act--> append one message
//!    +------------------------------------------------+
//!
//! unroutable decision / fatal worker / turn ceiling / timeout -> FAILED
//! ```
//!
//! The actor-facing halves (starting a run task, folding its outcome back
//! into the run registry) live in `start_run` and `finalize`.

mod finalize;
mod start_run;

use chrono::{DateTime, Utc};
use shared_types::{AnalysisRunResponse, AnalysisRunStatus};
use std::time::Duration;

use crate::actors::conductor::protocol::ConductorError;
use crate::actors::conductor::registry::WorkerRegistry;
use crate::actors::conductor::state::{ConversationState, RouteTarget};
use crate::actors::conductor::supervisor::SharedSupervisorPolicy;
use crate::actors::conductor::workers::{degraded_message, WorkerFailurePolicy};

pub const DEFAULT_MAX_TURNS: u32 = 12;
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(180);

/// Bounds applied to every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPolicy {
    /// Supervisor decisions allowed before the run fails
    pub max_turns: u32,
    /// Wall-clock budget for one full run
    pub run_timeout: Duration,
    pub worker_failure: WorkerFailurePolicy,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            worker_failure: WorkerFailurePolicy::default(),
        }
    }
}

/// Terminal result of one run, including the state it ended with.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: ConversationState,
    pub status: AnalysisRunStatus,
    pub error: Option<ConductorError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn is_finished(&self) -> bool {
        self.status == AnalysisRunStatus::Finished
    }

    pub fn turns(&self) -> usize {
        self.state.decisions().len()
    }

    pub fn to_response(&self, run_id: &str) -> AnalysisRunResponse {
        self.state.to_response(
            run_id,
            self.status,
            self.error.clone().map(Into::into),
            self.started_at,
            Some(self.finished_at),
        )
    }
}

/// Drives the supervisor/worker loop. Shared by every concurrent run.
pub struct Orchestrator {
    supervisor: SharedSupervisorPolicy,
    workers: WorkerRegistry,
    policy: RunPolicy,
}

impl Orchestrator {
    pub fn new(supervisor: SharedSupervisorPolicy, workers: WorkerRegistry, policy: RunPolicy) -> Self {
        Self {
            supervisor,
            workers,
            policy,
        }
    }

    pub fn policy(&self) -> &RunPolicy {
        &self.policy
    }

    pub fn team_members(&self) -> Vec<String> {
        self.workers.team_members()
    }

    /// Runs the loop until FINISH or a fatal error. `state` keeps everything
    /// appended so far when an error is returned.
    pub async fn run(
        &self,
        run_id: &str,
        state: &mut ConversationState,
    ) -> Result<(), ConductorError> {
        for turn in 1..=self.policy.max_turns {
            let decision = self.supervisor.decide(state).await?;
            state.record_decision(turn, &decision);

            tracing::info!(
                run_id = %run_id,
                turn,
                next = %decision.next,
                reasoning = %decision.reasoning,
                information_needed = decision.information_needed.len(),
                "Supervisor decision"
            );

            let worker = match &decision.next {
                RouteTarget::Finish => None,
                RouteTarget::Worker(worker_id) => {
                    let registered = self.workers.get(worker_id);
                    match registered {
                        Some(worker) if state.is_member(worker_id) => Some(worker),
                        _ => {
                            tracing::warn!(
                                run_id = %run_id,
                                turn,
                                next = %worker_id,
                                team = ?state.team_members(),
                                "Supervisor routed outside the team"
                            );
                            return Err(ConductorError::RoutingSchema(format!(
                                "'{worker_id}' is not a member of {:?}",
                                state.team_members()
                            )));
                        }
                    }
                }
            };
            state.set_next(decision.next.clone());

            let Some(worker) = worker else {
                tracing::info!(run_id = %run_id, turn, "Run finished");
                return Ok(());
            };

            match worker.act(state).await {
                Ok(message) => state.append(message),
                Err(err) => match self.policy.worker_failure {
                    WorkerFailurePolicy::Degrade => {
                        tracing::warn!(
                            run_id = %run_id,
                            turn,
                            worker = %worker.id(),
                            error = %err,
                            "Worker step failed; continuing with degraded message"
                        );
                        state.append(degraded_message(worker.id(), &err));
                    }
                    WorkerFailurePolicy::Fatal => {
                        tracing::error!(
                            run_id = %run_id,
                            turn,
                            worker = %worker.id(),
                            error = %err,
                            "Worker step failed"
                        );
                        return Err(ConductorError::WorkerFailed {
                            worker: worker.id().to_string(),
                            message: err.to_string(),
                        });
                    }
                },
            }
        }

        tracing::warn!(
            run_id = %run_id,
            max_turns = self.policy.max_turns,
            messages = state.messages().len(),
            "Turn ceiling reached without FINISH"
        );
        Err(ConductorError::RunBoundExceeded {
            max_turns: self.policy.max_turns,
        })
    }

    /// Seeds a fresh state for `query` and runs it under the run timeout.
    pub async fn run_query(&self, run_id: &str, query: &str) -> RunOutcome {
        let started_at = Utc::now();
        let mut state = ConversationState::new(query, self.team_members());

        let timed =
            tokio::time::timeout(self.policy.run_timeout, self.run(run_id, &mut state)).await;
        let result = match timed {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = self.policy.run_timeout.as_millis() as u64;
                tracing::warn!(
                    run_id = %run_id,
                    timeout_ms,
                    messages = state.messages().len(),
                    "Run timed out"
                );
                Err(ConductorError::RunTimeout { timeout_ms })
            }
        };

        let (status, error) = match result {
            Ok(()) => (AnalysisRunStatus::Finished, None),
            Err(err) => (AnalysisRunStatus::Failed, Some(err)),
        };
        RunOutcome {
            state,
            status,
            error,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
