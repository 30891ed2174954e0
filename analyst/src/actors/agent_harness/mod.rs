//! Agent Harness - shared tool-calling loop for worker agents
//!
//! Every worker runs the same bounded loop:
//! DECIDE (model call with the worker's tools) -> EXECUTE (tool calls) -> loop or return
//!
//! Tool results, including failures, are fed back to the model as tool
//! messages. When the step budget runs out while the model still wants tools,
//! one last completion with tool choice `none` forces a text answer.
//!
//! ## Usage
//!
//! Implement [`WorkerPort`] for the worker kind, then run the loop through
//! [`AgentHarness::run`].
//!
//! ```rust,ignore
//! let harness = AgentHarness::new(SearchPort::new(search), gateway);
//! let result = harness.run("Search", conversation).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::actors::model_gateway::{
    ChatMessage, CompletionRequest, GatewayError, SharedModelGateway, ToolCall, ToolChoice,
    ToolSpec,
};

/// Configuration for the agent harness
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Budget for a single tool execution (milliseconds)
    pub timeout_budget_ms: u64,
    /// Maximum number of tool-calling rounds before the answer is forced
    pub max_steps: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout_budget_ms: 30_000,
            max_steps: 4,
        }
    }
}

/// Context passed to the port during execution
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Unique identifier for this execution loop
    pub loop_id: String,
    /// Worker identifier, e.g. `Search`
    pub worker_id: String,
    /// Current step number (1-indexed)
    pub step_number: usize,
    pub max_steps: usize,
}

/// Result of a single tool execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolExecution {
    pub tool_name: String,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl ToolExecution {
    pub fn succeeded(tool_name: &str, output: String, started: Instant) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            success: true,
            output,
            error: None,
            execution_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn failed(tool_name: &str, error: String, started: Instant) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            success: false,
            output: String::new(),
            error: Some(error),
            execution_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Text handed back to the model for this execution.
    fn model_feedback(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!(
                "Tool {} failed: {}",
                self.tool_name,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// Final result from agent execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResult {
    pub summary: String,
    pub model_used: Option<String>,
    pub steps_taken: usize,
    pub tool_executions: Vec<ToolExecution>,
    /// True when the step budget ran out and the answer was forced.
    pub forced_final: bool,
}

/// Error types for the harness
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum HarnessError {
    #[error("Decision failed: {0}")]
    Decision(String),
    #[error("Model returned an empty answer")]
    EmptyAnswer,
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl From<GatewayError> for HarnessError {
    fn from(e: GatewayError) -> Self {
        HarnessError::Decision(e.to_string())
    }
}

// ============================================================================
// WorkerPort Trait
// ============================================================================

/// Worker-specific half of the loop: prompt, tools and tool execution.
#[async_trait]
pub trait WorkerPort: Send + Sync {
    /// Model call site for this worker (e.g. "search", "doc_analyst")
    fn get_model_role(&self) -> &str;

    /// System prompt placed ahead of the conversation.
    fn get_system_context(&self, ctx: &ExecutionContext) -> String;

    /// Tools the model may call.
    fn tools(&self) -> Vec<ToolSpec>;

    /// Execute a tool call. Failures are reported back to the model, so an
    /// `Err` here never aborts the loop.
    async fn execute_tool_call(
        &self,
        ctx: &ExecutionContext,
        tool_call: &ToolCall,
    ) -> Result<ToolExecution, HarnessError>;
}

// ============================================================================
// AgentHarness
// ============================================================================

pub struct AgentHarness<W: WorkerPort> {
    worker_port: W,
    gateway: SharedModelGateway,
    config: HarnessConfig,
}

impl<W: WorkerPort> AgentHarness<W> {
    pub fn new(worker_port: W, gateway: SharedModelGateway) -> Self {
        Self::with_config(worker_port, gateway, HarnessConfig::default())
    }

    pub fn with_config(worker_port: W, gateway: SharedModelGateway, config: HarnessConfig) -> Self {
        Self {
            worker_port,
            gateway,
            config,
        }
    }

    pub fn port(&self) -> &W {
        &self.worker_port
    }

    /// Run the loop over `conversation` and return the model's final answer.
    pub async fn run(
        &self,
        worker_id: &str,
        conversation: Vec<ChatMessage>,
    ) -> Result<AgentResult, HarnessError> {
        let loop_id = ulid::Ulid::new().to_string();
        let role = self.worker_port.get_model_role().to_string();
        let tools = self.worker_port.tools();

        let mut ctx = ExecutionContext {
            loop_id: loop_id.clone(),
            worker_id: worker_id.to_string(),
            step_number: 0,
            max_steps: self.config.max_steps,
        };

        info!(
            loop_id = %loop_id,
            worker_id = %worker_id,
            role = %role,
            max_steps = self.config.max_steps,
            "Starting agentic loop"
        );

        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(ChatMessage::system(
            self.worker_port.get_system_context(&ctx),
        ));
        messages.extend(conversation);

        let mut tool_executions: Vec<ToolExecution> = Vec::new();
        let mut model_used = None;

        while ctx.step_number < self.config.max_steps {
            ctx.step_number += 1;

            let request = CompletionRequest::new(role.clone(), messages.clone())
                .with_tools(tools.clone(), ToolChoice::Auto);
            let response = self.gateway.complete(request).await?;
            model_used = Some(response.model.clone());

            if response.tool_calls.is_empty() {
                let summary = non_empty_answer(response.content)?;
                info!(
                    loop_id = %loop_id,
                    worker_id = %worker_id,
                    steps = ctx.step_number,
                    tools_executed = tool_executions.len(),
                    "Agentic loop completed"
                );
                return Ok(AgentResult {
                    summary,
                    model_used,
                    steps_taken: ctx.step_number,
                    tool_executions,
                    forced_final: false,
                });
            }

            messages.push(ChatMessage::assistant_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            for tool_call in &response.tool_calls {
                let execution = self.execute_tool(&ctx, tool_call).await;
                messages.push(ChatMessage::tool_result(
                    tool_call.id.clone(),
                    execution.model_feedback(),
                ));
                tool_executions.push(execution);
            }
        }

        debug!(
            loop_id = %loop_id,
            worker_id = %worker_id,
            "Step budget exhausted; forcing final answer"
        );
        let request =
            CompletionRequest::new(role, messages).with_tools(tools, ToolChoice::None);
        let response = self.gateway.complete(request).await?;
        let summary = non_empty_answer(response.content)?;

        Ok(AgentResult {
            summary,
            model_used: Some(response.model),
            steps_taken: ctx.step_number,
            tool_executions,
            forced_final: true,
        })
    }

    async fn execute_tool(&self, ctx: &ExecutionContext, tool_call: &ToolCall) -> ToolExecution {
        let started = Instant::now();
        let budget = Duration::from_millis(self.config.timeout_budget_ms);
        let result = tokio::time::timeout(
            budget,
            self.worker_port.execute_tool_call(ctx, tool_call),
        )
        .await
        .unwrap_or(Err(HarnessError::Timeout(self.config.timeout_budget_ms)));

        match result {
            Ok(execution) => {
                if !execution.success {
                    warn!(
                        worker_id = %ctx.worker_id,
                        tool = %execution.tool_name,
                        error = execution.error.as_deref().unwrap_or_default(),
                        "Tool reported failure"
                    );
                }
                execution
            }
            Err(e) => {
                warn!(
                    worker_id = %ctx.worker_id,
                    tool = %tool_call.name(),
                    error = %e,
                    "Tool execution failed"
                );
                ToolExecution::failed(tool_call.name(), e.to_string(), started)
            }
        }
    }
}

fn non_empty_answer(content: Option<String>) -> Result<String, HarnessError> {
    content
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(HarnessError::EmptyAnswer)
}

// ============================================================================
// Tests
// ============================================================================
