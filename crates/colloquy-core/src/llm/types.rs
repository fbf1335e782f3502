//! Provider-neutral request and response types.

use crate::agent::ModelTier;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use strum::Display;

/// Role of a message sent to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    /// Result of a tool call fed back to the model.
    Function,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// One message of a model prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool name for [`ChatRole::Function`] messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool call made by an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<ToolCall>,
}

impl ChatMessage {
    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            function_call: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    /// An assistant turn that only requests a tool call.
    pub fn tool_request(call: ToolCall) -> Self {
        Self {
            function_call: Some(call),
            ..Self::new(ChatRole::Assistant, "")
        }
    }

    /// The output of tool `name`.
    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(ChatRole::Function, content)
        }
    }
}

/// A tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the parameters object.
    #[serde(default, alias = "inputSchema", alias = "parameters")]
    pub input_schema: Value,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Input of a single provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}

/// Output of a single provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    /// Usage from response metadata, when the provider sends it.
    pub usage: Option<TokenUsage>,
    pub tool_call: Option<ToolCall>,
}

/// Where the token counts of an invocation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UsageSource {
    /// Response metadata of the provider.
    Provider,
    /// The provider's token counting endpoint.
    Estimate,
}

/// Descriptive data about an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationMeta {
    pub model: String,
    pub tier: ModelTier,
    pub usage_source: UsageSource,
    /// Number of tool calls executed before the final answer.
    #[serde(default)]
    pub tool_calls: u32,
}

/// Metered result of a gateway invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub latency: Duration,
    pub cost: f64,
    pub meta: InvocationMeta,
}

impl InvocationResult {
    /// `meta` as a compact JSON string for message rows.
    pub fn meta_json(&self) -> String {
        serde_json::to_string(&self.meta).unwrap_or_default()
    }
}
