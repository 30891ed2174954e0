//! Model gateway: chat completions with tool calling.
//!
//! The supervisor, the worker harness and the RAG chain all talk to the model
//! through [`ModelGateway`], so tests can swap in scripted gateways and the
//! binary can point at any OpenAI-compatible endpoint listed in the catalog.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::model_config::{ModelConfig, ModelConfigError, ModelRegistry};

pub type SharedModelGateway = Arc<dyn ModelGateway>;

const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("model resolution failed: {0}")]
    ModelResolution(String),
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model response parse failed: {0}")]
    Parse(String),
}

impl From<ModelConfigError> for GatewayError {
    fn from(err: ModelConfigError) -> Self {
        Self::ModelResolution(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(ChatRole::User, content)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content,
            name: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as returned by the model.
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_call_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn default_tool_call_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: default_tool_call_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Parses the argument string. Empty arguments parse as `{}`.
    pub fn parse_arguments(&self) -> Result<Value, serde_json::Error> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object.
    pub parameters: Value,
}

impl ToolSpec {
    fn to_openai_json(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Function(String),
}

impl ToolChoice {
    fn to_openai_json(&self) -> Value {
        match self {
            Self::Auto => Value::String("auto".to_string()),
            Self::None => Value::String("none".to_string()),
            Self::Function(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Which call site is asking; selects the model through the catalog.
    pub callsite: String,
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoice,
}

impl CompletionRequest {
    pub fn new(callsite: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            callsite: callsite.into(),
            model: None,
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>, tool_choice: ToolChoice) -> Self {
        self.tools = tools;
        self.tool_choice = tool_choice;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub model: String,
    pub finish_reason: Option<String>,
}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn complete(&self, request: CompletionRequest)
        -> Result<CompletionResponse, GatewayError>;
}

/// Gateway for any endpoint that speaks the OpenAI chat-completions protocol.
#[derive(Debug, Clone)]
pub struct OpenAiGenericGateway {
    registry: ModelRegistry,
    http: reqwest::Client,
}

impl OpenAiGenericGateway {
    pub fn new(registry: ModelRegistry) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_GATEWAY_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Request(format!("http client build failed: {e}")))?;
        Ok(Self { registry, http })
    }
}

#[async_trait]
impl ModelGateway for OpenAiGenericGateway {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, GatewayError> {
        let resolved = self
            .registry
            .resolve_for_callsite(&request.callsite, request.model.as_deref())?;
        let config = resolved.config;
        let api_key = config.api_key()?;
        let body = build_request_body(&config, &request);

        tracing::debug!(
            callsite = %request.callsite,
            model = %config.id,
            source = resolved.source.as_str(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat completion"
        );

        let mut builder = self
            .http
            .post(config.chat_completions_url())
            .bearer_auth(api_key)
            .json(&body);
        for (name, value) in &config.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                callsite = %request.callsite,
                model = %config.id,
                status = status.as_u16(),
                "Chat completion failed"
            );
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;
        parse_completion_response(&payload, &config.model)
    }
}

pub(crate) fn build_request_body(config: &ModelConfig, request: &CompletionRequest) -> Value {
    let mut body = serde_json::json!({
        "model": config.model,
        "messages": request.messages,
    });

    if let Some(temperature) = config.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }

    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(ToolSpec::to_openai_json)
                .collect(),
        );
        body["tool_choice"] = request.tool_choice.to_openai_json();
    }

    body
}

pub(crate) fn parse_completion_response(
    payload: &Value,
    fallback_model: &str,
) -> Result<CompletionResponse, GatewayError> {
    let choice = payload
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|choices| choices.first())
        .ok_or_else(|| GatewayError::Parse("missing choices array".to_string()))?;
    let message = choice
        .get("message")
        .ok_or_else(|| GatewayError::Parse("choice has no message".to_string()))?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .map(ToString::to_string);
    let tool_calls = match message.get("tool_calls") {
        Some(Value::Array(calls)) => calls
            .iter()
            .map(|call| serde_json::from_value::<ToolCall>(call.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GatewayError::Parse(format!("invalid tool call: {e}")))?,
        _ => Vec::new(),
    };

    Ok(CompletionResponse {
        content,
        tool_calls,
        model: payload
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or(fallback_model)
            .to_string(),
        finish_reason: choice
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .map(ToString::to_string),
    })
}
