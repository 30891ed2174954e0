//! Supervisor policy: picks the next worker or FINISH.
//!
//! The LLM supervisor is forced to answer through a single `route` function
//! call whose schema enumerates `FINISH` plus the team members. Anything that
//! does not fit that schema is a routing error, never a silent default.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::actors::conductor::protocol::ConductorError;
use crate::actors::conductor::state::{ConversationState, RouteTarget, RoutingDecision};
use crate::actors::conductor::workers::to_chat_messages;
use crate::actors::model_config::CALLSITE_SUPERVISOR;
use crate::actors::model_gateway::{
    ChatMessage, CompletionRequest, CompletionResponse, SharedModelGateway, ToolChoice, ToolSpec,
};
use shared_types::ROUTE_FINISH;

pub type SharedSupervisorPolicy = Arc<dyn SupervisorPolicy>;

pub const ROUTE_TOOL_NAME: &str = "route";

const SUPERVISOR_SYSTEM_PROMPT: &str = "You are a supervisor managing a conversation between \
the following workers: {team_members}.\n\
Think step by step:\n\
1. What specific financial information is needed to fully answer the query?\n\
2. Which worker is best suited to find each piece of information?\n\
3. Have we gathered all necessary information to FINISH?\n\n\
Search: current market context, recent developments, analyst opinions, competitor analysis.\n\
DocAnalyst: historical financial data and official numbers from the company's SEC filing, \
risk factors, regulatory information.\n\n\
When a worker asks for additional context, route to the worker that can provide it. \
Only FINISH when the gathered information answers the original query comprehensively.";

const SUPERVISOR_ROUTE_INSTRUCTION: &str = "Given the conversation above, who should act next? \
Consider what information we have so far, what is still missing, and which worker can best \
provide it. Select one of: {options}";

#[async_trait]
pub trait SupervisorPolicy: Send + Sync {
    async fn decide(&self, state: &ConversationState) -> Result<RoutingDecision, ConductorError>;
}

/// Supervisor backed by the model gateway.
pub struct LlmSupervisor {
    gateway: SharedModelGateway,
}

impl LlmSupervisor {
    pub fn new(gateway: SharedModelGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl SupervisorPolicy for LlmSupervisor {
    async fn decide(&self, state: &ConversationState) -> Result<RoutingDecision, ConductorError> {
        if state.team_members().is_empty() {
            return Ok(RoutingDecision::finish("No workers are available."));
        }

        let options = route_options(state.team_members());
        let request = CompletionRequest::new(CALLSITE_SUPERVISOR, build_messages(state, &options))
            .with_tools(
                vec![route_tool(&options)],
                ToolChoice::Function(ROUTE_TOOL_NAME.to_string()),
            );

        let response = self
            .gateway
            .complete(request)
            .await
            .map_err(|e| ConductorError::ModelGateway(e.to_string()))?;
        parse_route_response(&response, &options)
    }
}

/// `FINISH` followed by the team in configured order.
pub fn route_options(team_members: &[String]) -> Vec<String> {
    std::iter::once(ROUTE_FINISH.to_string())
        .chain(team_members.iter().cloned())
        .collect()
}

pub fn route_tool(options: &[String]) -> ToolSpec {
    ToolSpec {
        name: ROUTE_TOOL_NAME.to_string(),
        description: "Select the next role based on query analysis.".to_string(),
        parameters: serde_json::json!({
            "title": "routeSchema",
            "type": "object",
            "properties": {
                "next": {
                    "title": "Next",
                    "enum": options,
                },
                "reasoning": {
                    "title": "Reasoning",
                    "type": "string",
                    "description": "Explanation for why this agent should act next"
                },
                "information_needed": {
                    "title": "Information Needed",
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of specific information needed from this agent"
                }
            },
            "required": ["next", "reasoning", "information_needed"],
        }),
    }
}

fn build_messages(state: &ConversationState, options: &[String]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(state.messages().len() + 2);
    messages.push(ChatMessage::system(
        SUPERVISOR_SYSTEM_PROMPT.replace("{team_members}", &state.team_members().join(", ")),
    ));
    messages.extend(to_chat_messages(state.messages()));
    messages.push(ChatMessage::system(
        SUPERVISOR_ROUTE_INSTRUCTION.replace("{options}", &format!("{options:?}")),
    ));
    messages
}

/// Parses the first `route` call into a decision.
pub fn parse_route_response(
    response: &CompletionResponse,
    options: &[String],
) -> Result<RoutingDecision, ConductorError> {
    let call = response
        .tool_calls
        .iter()
        .find(|call| call.name() == ROUTE_TOOL_NAME)
        .ok_or_else(|| {
            ConductorError::RoutingSchema("supervisor did not call the route function".to_string())
        })?;
    let args = call
        .parse_arguments()
        .map_err(|e| ConductorError::RoutingSchema(format!("route arguments are not JSON: {e}")))?;
    parse_route_arguments(&args, options)
}

pub fn parse_route_arguments(
    args: &Value,
    options: &[String],
) -> Result<RoutingDecision, ConductorError> {
    let next = args
        .get("next")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ConductorError::RoutingSchema("route is missing 'next'".to_string()))?;
    if !options.iter().any(|option| option == next) {
        return Err(ConductorError::RoutingSchema(format!(
            "'{next}' is not one of {options:?}"
        )));
    }

    let reasoning = args
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let information_needed = match args.get("information_needed") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(ToString::to_string).ok_or_else(|| {
                    ConductorError::RoutingSchema(
                        "information_needed must contain only strings".to_string(),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(ConductorError::RoutingSchema(
                "information_needed must be an array".to_string(),
            ))
        }
    };

    Ok(RoutingDecision {
        next: RouteTarget::parse(next),
        reasoning,
        information_needed,
    })
}
