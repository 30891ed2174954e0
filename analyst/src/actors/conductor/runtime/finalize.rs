use shared_types::AnalysisRunResponse;

use crate::actors::conductor::actor::{ConductorActor, ConductorState};

impl ConductorActor {
    /// Stores the terminal record and releases every waiting `ExecuteQuery`.
    pub(crate) fn handle_run_finished(
        &self,
        state: &mut ConductorState,
        run_id: String,
        mut response: AnalysisRunResponse,
    ) {
        if let Some(existing) = state.get_run(&run_id) {
            response.started_at = existing.started_at;
        }

        match &response.error {
            Some(error) => tracing::warn!(
                run_id = %run_id,
                status = ?response.status,
                code = %error.code,
                error = %error.message,
                messages = response.messages.len(),
                "Analysis run failed"
            ),
            None => tracing::info!(
                run_id = %run_id,
                status = ?response.status,
                messages = response.messages.len(),
                decisions = response.decisions.len(),
                "Analysis run finished"
            ),
        }

        let waiters = state.waiters.remove(&run_id).unwrap_or_default();
        if !state.update_run(response.clone()) {
            tracing::warn!(run_id = %run_id, "Finished run was not registered");
        }
        for reply in waiters {
            let _ = reply.send(Ok(response.clone()));
        }
    }
}
