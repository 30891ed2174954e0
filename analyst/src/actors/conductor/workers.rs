//! Worker agents the supervisor can route to.
//!
//! A worker reads the conversation and returns exactly one worker-authored
//! message. `HarnessWorker` binds a `WorkerPort` (tools + prompt) to the agent
//! harness so every worker runs the same bounded tool loop.

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;

use crate::actors::agent_harness::{AgentHarness, HarnessError, WorkerPort};
use crate::actors::conductor::state::{ConversationState, Message, Role};
use crate::actors::model_gateway::ChatMessage;

pub type SharedWorkerAgent = Arc<dyn WorkerAgent>;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("conversation has no messages")]
    EmptyConversation,
    #[error(transparent)]
    Harness(#[from] HarnessError),
}

#[async_trait]
pub trait WorkerAgent: Send + Sync {
    /// Stable id, also the routing name the supervisor uses
    fn id(&self) -> &str;

    async fn act(&self, state: &ConversationState) -> Result<Message, WorkerError>;
}

/// What the orchestrator does when a worker step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkerFailurePolicy {
    /// Record the failure as the worker's message and keep routing
    #[default]
    Degrade,
    /// Fail the run
    Fatal,
}

impl FromStr for WorkerFailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "degrade" => Ok(Self::Degrade),
            "fatal" => Ok(Self::Fatal),
            other => Err(format!(
                "unknown worker failure policy '{other}' (expected 'degrade' or 'fatal')"
            )),
        }
    }
}

/// Text appended in place of a worker answer under `Degrade`.
pub fn degraded_message(worker_id: &str, error: &WorkerError) -> Message {
    Message::from_worker(
        worker_id,
        format!("{worker_id} could not complete its step: {error}"),
    )
}

/// The conversation as a worker sees it. When the supervisor asked for
/// specific information, the latest user message is rewritten to carry that
/// list ahead of the query. The stored state is left untouched.
pub fn effective_messages(state: &ConversationState) -> Vec<Message> {
    let mut messages = state.messages().to_vec();
    let needed = state.information_needed();
    if needed.is_empty() {
        return messages;
    }

    if let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == Role::User) {
        let items = needed
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n");
        last_user.content = format!(
            "Information needed:\n{items}\n\nQuery: {}",
            last_user.content
        );
    }
    messages
}

pub(crate) fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|message| match (&message.role, &message.author) {
            (Role::Worker, Some(author)) => {
                ChatMessage::user(message.content.clone()).with_name(author.clone())
            }
            _ => ChatMessage::user(message.content.clone()),
        })
        .collect()
}

/// A worker driven by the agent harness.
pub struct HarnessWorker<W: WorkerPort> {
    id: String,
    harness: AgentHarness<W>,
}

impl<W: WorkerPort> HarnessWorker<W> {
    pub fn new(id: impl Into<String>, harness: AgentHarness<W>) -> Self {
        Self {
            id: id.into(),
            harness,
        }
    }
}

#[async_trait]
impl<W: WorkerPort + 'static> WorkerAgent for HarnessWorker<W> {
    fn id(&self) -> &str {
        &self.id
    }

    async fn act(&self, state: &ConversationState) -> Result<Message, WorkerError> {
        if state.messages().is_empty() {
            return Err(WorkerError::EmptyConversation);
        }

        let conversation = to_chat_messages(&effective_messages(state));
        let result = self.harness.run(&self.id, conversation).await?;

        tracing::info!(
            worker = %self.id,
            steps = result.steps_taken,
            tools_executed = result.tool_executions.len(),
            forced_final = result.forced_final,
            model = result.model_used.as_deref().unwrap_or("unknown"),
            "Worker step completed"
        );
        Ok(Message::from_worker(&self.id, result.summary))
    }
}
