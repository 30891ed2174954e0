use chrono::Utc;
use ractor::ActorRef;
use shared_types::{AnalysisRunResponse, AnalysisRunStatus};

use crate::actors::conductor::actor::{ConductorActor, ConductorState};
use crate::actors::conductor::protocol::{ConductorError, ConductorMsg};

impl ConductorActor {
    /// Registers a RUNNING record and spawns the orchestrator task for it.
    pub(crate) fn handle_start_run(
        &self,
        myself: ActorRef<ConductorMsg>,
        state: &mut ConductorState,
        query: String,
    ) -> Result<AnalysisRunResponse, ConductorError> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return Err(ConductorError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }

        let run_id = ulid::Ulid::new().to_string();
        tracing::info!(run_id = %run_id, query = %query, "Starting analysis run");

        let record = AnalysisRunResponse::running(&run_id, &query);
        state.insert_run(record.clone());

        let orchestrator = state.orchestrator.clone();
        let placeholder = record.clone();
        tokio::spawn(async move {
            let run = {
                let run_id = run_id.clone();
                tokio::spawn(async move {
                    orchestrator
                        .run_query(&run_id, &query)
                        .await
                        .to_response(&run_id)
                })
            };
            let response = match run.await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(run_id = %run_id, error = %e, "Analysis run task aborted");
                    aborted_response(placeholder, e.to_string())
                }
            };
            if let Err(e) = myself.send_message(ConductorMsg::RunFinished {
                run_id: run_id.clone(),
                response,
            }) {
                tracing::warn!(
                    run_id = %run_id,
                    error = %e,
                    "Conductor gone before run result could be delivered"
                );
            }
        });

        Ok(record)
    }
}

/// Terminal record for a run whose task panicked or was cancelled. History
/// appended inside the task is lost with it.
fn aborted_response(mut record: AnalysisRunResponse, reason: String) -> AnalysisRunResponse {
    record.status = AnalysisRunStatus::Failed;
    record.error = Some(ConductorError::RunAborted(reason).into());
    record.finished_at = Some(Utc::now());
    record
}
