//! Shared types between the analysis service and its clients
//!
//! These types are used by both:
//! - The `analyst` service (native Rust, axum handlers)
//! - The browser frontend (TypeScript, generated through ts-rs)
//!
//! Serializable with serde for JSON over HTTP

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Requests
// ============================================================================

/// Synchronous analysis request (`POST /api/analyze`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct AnalysisRequest {
    pub query: String,
}

/// Fire-and-poll request used by the web frontend (`POST /api/send-request`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct SendRequest {
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct SendRequestResponse {
    pub status: String,
    pub run_id: String,
}

// ============================================================================
// Run results
// ============================================================================

/// Lifecycle of a single analysis run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub enum AnalysisRunStatus {
    Running,
    Finished,
    Failed,
}

impl AnalysisRunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub enum MessageRole {
    User,
    Worker,
}

/// One entry of the turn history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct AnalysisMessage {
    pub role: MessageRole,
    pub content: String,
    pub author: Option<String>,
}

/// One supervisor decision, kept for the reasoning trail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct DecisionTrace {
    pub turn: u32,
    /// Worker id or `FINISH`
    pub next: String,
    pub reasoning: String,
    pub information_needed: Vec<String>,
}

/// Machine-readable run error
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct AnalysisError {
    pub code: String,
    pub message: String,
}

/// Full view of a run: history, latest supervisor fields, trail and outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct AnalysisRunResponse {
    pub run_id: String,
    pub status: AnalysisRunStatus,
    pub query: String,
    pub messages: Vec<AnalysisMessage>,
    pub reasoning: String,
    pub information_needed: Vec<String>,
    pub decisions: Vec<DecisionTrace>,
    pub error: Option<AnalysisError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AnalysisRunResponse {
    /// Placeholder for a run that has been accepted but not yet finished.
    pub fn running(run_id: impl Into<String>, query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            run_id: run_id.into(),
            status: AnalysisRunStatus::Running,
            messages: vec![AnalysisMessage {
                role: MessageRole::User,
                content: query.clone(),
                author: None,
            }],
            query,
            reasoning: String::new(),
            information_needed: Vec::new(),
            decisions: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Final answer, taken from the last worker-authored message.
    pub fn final_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Worker)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct AnalysisRunSummary {
    pub run_id: String,
    pub status: AnalysisRunStatus,
    pub query: String,
    pub message_count: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&AnalysisRunResponse> for AnalysisRunSummary {
    fn from(run: &AnalysisRunResponse) -> Self {
        Self {
            run_id: run.run_id.clone(),
            status: run.status,
            query: run.query.clone(),
            message_count: run.messages.len() as u32,
            started_at: run.started_at,
            finished_at: run.finished_at,
        }
    }
}

// ============================================================================
// Constants
// ============================================================================

/// Terminal routing sentinel used by the supervisor
pub const ROUTE_FINISH: &str = "FINISH";

pub const WORKER_SEARCH: &str = "Search";
pub const WORKER_DOC_ANALYST: &str = "DocAnalyst";

// ============================================================================
// Tests
// ============================================================================
