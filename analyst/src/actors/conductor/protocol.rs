//! ConductorActor internal message protocol
//!
//! Defines the messages that can be sent to the ConductorActor and
//! the error types used throughout the conductor system.

use ractor::RpcReplyPort;
use shared_types::{AnalysisRunResponse, AnalysisRunSummary};

/// Messages handled by ConductorActor
#[derive(Debug)]
pub enum ConductorMsg {
    /// Start a run and reply once it reaches FINISHED or FAILED
    ExecuteQuery {
        query: String,
        reply: RpcReplyPort<Result<AnalysisRunResponse, ConductorError>>,
    },
    /// Start a run in the background and reply with its RUNNING record
    SubmitQuery {
        query: String,
        reply: RpcReplyPort<Result<AnalysisRunResponse, ConductorError>>,
    },
    /// Get the current record of a run
    GetRun {
        run_id: String,
        reply: RpcReplyPort<Option<AnalysisRunResponse>>,
    },
    /// Summaries of every retained run, newest first
    ListRuns {
        reply: RpcReplyPort<Vec<AnalysisRunSummary>>,
    },
    /// Sent by a run task when its orchestrator loop ends
    RunFinished {
        run_id: String,
        response: AnalysisRunResponse,
    },
}

/// Errors that can occur in the conductor
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConductorError {
    /// Invalid request parameters
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Supervisor output did not match the routing schema or named an unknown worker
    #[error("routing schema violation: {0}")]
    RoutingSchema(String),
    /// The supervisor never chose FINISH within the turn ceiling
    #[error("run exceeded {max_turns} supervisor turns without finishing")]
    RunBoundExceeded { max_turns: u32 },
    /// The run did not finish within its time budget
    #[error("run timed out after {timeout_ms}ms")]
    RunTimeout { timeout_ms: u64 },
    /// Worker failed to complete its step
    #[error("worker {worker} failed: {message}")]
    WorkerFailed { worker: String, message: String },
    /// Model call failed on the supervisor path
    #[error("model gateway error: {0}")]
    ModelGateway(String),
    /// The run task panicked or was cancelled before reporting
    #[error("run aborted: {0}")]
    RunAborted(String),
    /// The conductor actor could not be reached
    #[error("actor unavailable: {0}")]
    ActorUnavailable(String),
}

impl ConductorError {
    pub fn code(&self) -> &'static str {
        match self {
            ConductorError::InvalidRequest(_) => "INVALID_REQUEST",
            ConductorError::RoutingSchema(_) => "ROUTING_SCHEMA_ERROR",
            ConductorError::RunBoundExceeded { .. } => "RUN_BOUND_EXCEEDED",
            ConductorError::RunTimeout { .. } => "RUN_TIMEOUT",
            ConductorError::WorkerFailed { .. } => "WORKER_FAILED",
            ConductorError::ModelGateway(_) => "MODEL_GATEWAY_ERROR",
            ConductorError::RunAborted(_) => "RUN_ABORTED",
            ConductorError::ActorUnavailable(_) => "ACTOR_UNAVAILABLE",
        }
    }
}

impl From<ConductorError> for shared_types::AnalysisError {
    fn from(err: ConductorError) -> Self {
        shared_types::AnalysisError {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_cross_into_shared_types() {
        let cases = [
            (ConductorError::InvalidRequest("x".into()), "INVALID_REQUEST"),
            (ConductorError::RoutingSchema("x".into()), "ROUTING_SCHEMA_ERROR"),
            (ConductorError::RunBoundExceeded { max_turns: 3 }, "RUN_BOUND_EXCEEDED"),
            (ConductorError::RunTimeout { timeout_ms: 10 }, "RUN_TIMEOUT"),
            (
                ConductorError::WorkerFailed {
                    worker: "Search".into(),
                    message: "x".into(),
                },
                "WORKER_FAILED",
            ),
            (ConductorError::ModelGateway("x".into()), "MODEL_GATEWAY_ERROR"),
            (ConductorError::RunAborted("x".into()), "RUN_ABORTED"),
            (ConductorError::ActorUnavailable("x".into()), "ACTOR_UNAVAILABLE"),
        ];
        for (err, code) in cases {
            let shared: shared_types::AnalysisError = err.clone().into();
            assert_eq!(shared.code, code);
            assert_eq!(shared.message, err.to_string());
        }
    }

    #[test]
    fn test_bound_message_names_ceiling() {
        let err = ConductorError::RunBoundExceeded { max_turns: 12 };
        assert_eq!(
            err.to_string(),
            "run exceeded 12 supervisor turns without finishing"
        );
    }
}
