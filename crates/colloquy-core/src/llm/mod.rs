//! Model provider surface.

pub mod client;
pub mod types;

pub use client::{ChatClient, ModelInvoker};
pub use types::{
    ChatMessage, ChatRole, Completion, CompletionRequest, InvocationMeta, InvocationResult,
    TokenUsage, ToolCall, ToolSpec, UsageSource,
};
