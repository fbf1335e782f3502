//! Provider and gateway contracts.

use super::types::{ChatMessage, Completion, CompletionRequest, InvocationResult, ToolSpec};
use crate::agent::AgentConfig;
use crate::error::Result;
use async_trait::async_trait;

/// A live handle to a remote model, bound to one configuration.
///
/// Model id, temperature, token ceiling and timeout are fixed when the
/// handle is created; callers only pass messages.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Performs one remote completion.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Counts tokens of each text with the provider's tokenizer.
    ///
    /// # Errors
    ///
    /// Providers without a counting capability return
    /// [`ColloquyError::Metering`](crate::ColloquyError::Metering).
    async fn count_tokens(&self, texts: &[String]) -> Result<Vec<u32>>;
}

/// Uniform invocation contract over every provider.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Invokes the model described by `agent` and meters the call.
    async fn invoke(&self, agent: &AgentConfig, messages: &[ChatMessage])
    -> Result<InvocationResult>;

    /// Like [`invoke`](Self::invoke), with tools discovered from the named
    /// endpoints offered to the model.
    async fn invoke_with_tools(
        &self,
        agent: &AgentConfig,
        messages: &[ChatMessage],
        endpoints: &[String],
    ) -> Result<InvocationResult>;

    /// Tools available from the named endpoints, paired with the endpoint.
    async fn list_tools(&self, endpoints: &[String]) -> Result<Vec<(String, ToolSpec)>>;
}
