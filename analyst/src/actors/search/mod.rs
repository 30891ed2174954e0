//! Search worker - web search collaborator and the port that exposes it to the
//! agent harness as the `web_search` tool.

mod providers;

pub use providers::TavilySearch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::actors::agent_harness::{ExecutionContext, HarnessError, ToolExecution, WorkerPort};
use crate::actors::collaborator::CollaboratorError;
use crate::actors::model_config::CALLSITE_SEARCH;
use crate::actors::model_gateway::{ToolCall, ToolSpec};

pub const SEARCH_TOOL_NAME: &str = "web_search";

const SEARCH_SYSTEM_PROMPT: &str = "You are a research assistant who searches for up-to-date \
financial information on the web.\n\
When responding:\n\
1. Always cite sources by URL.\n\
2. Focus on recent market data and analyst reports.\n\
3. If filing data is mentioned, compare it with current market views and highlight discrepancies.\n\n\
Format your response as:\n\
1. Market Data: [your findings]\n\
2. Analyst Views: [key opinions]\n\
3. Relevance to Filing Data: [if applicable]";

pub type SharedSearchCollaborator = Arc<dyn SearchCollaborator>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchCitation {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub published_at: Option<String>,
}

/// External web search: query in, rendered result text out.
#[async_trait]
pub trait SearchCollaborator: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, CollaboratorError>;
}

/// Binds a search collaborator to the agent harness.
pub struct SearchPort {
    search: SharedSearchCollaborator,
    team_members: Vec<String>,
}

impl SearchPort {
    pub fn new(search: SharedSearchCollaborator, team_members: Vec<String>) -> Self {
        Self {
            search,
            team_members,
        }
    }
}

#[async_trait]
impl WorkerPort for SearchPort {
    fn get_model_role(&self) -> &str {
        CALLSITE_SEARCH
    }

    fn get_system_context(&self, _ctx: &ExecutionContext) -> String {
        worker_system_context(SEARCH_SYSTEM_PROMPT, &self.team_members)
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![ToolSpec {
            name: SEARCH_TOOL_NAME.to_string(),
            description: "Search the web for real-time market data, news and analyst views."
                .to_string(),
            parameters: query_parameters_schema("Search query"),
        }]
    }

    async fn execute_tool_call(
        &self,
        _ctx: &ExecutionContext,
        tool_call: &ToolCall,
    ) -> Result<ToolExecution, HarnessError> {
        let started = Instant::now();
        if tool_call.name() != SEARCH_TOOL_NAME {
            return Err(HarnessError::ToolExecution(format!(
                "unknown tool: {}",
                tool_call.name()
            )));
        }
        let query = query_argument(tool_call)?;
        Ok(match self.search.search(&query).await {
            Ok(output) => ToolExecution::succeeded(SEARCH_TOOL_NAME, output, started),
            Err(e) => ToolExecution::failed(SEARCH_TOOL_NAME, e.to_string(), started),
        })
    }
}

/// Worker system prompt plus the shared collaboration footer.
pub(crate) fn worker_system_context(prompt: &str, team_members: &[String]) -> String {
    format!(
        "{prompt}\nWork autonomously according to your specialty, using the tools available to you. \
         Do not ask for clarification. Your other team members will collaborate with you with \
         their own specialties. You are one of the following team members: {}.",
        team_members.join(", ")
    )
}

pub(crate) fn query_parameters_schema(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": description
            }
        },
        "required": ["query"]
    })
}

/// Extracts the `query` argument from a tool call.
pub(crate) fn query_argument(tool_call: &ToolCall) -> Result<String, HarnessError> {
    let args = tool_call
        .parse_arguments()
        .map_err(|e| HarnessError::ToolExecution(format!("invalid arguments: {e}")))?;
    args.get("query")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| HarnessError::ToolExecution("missing query argument".to_string()))
}
