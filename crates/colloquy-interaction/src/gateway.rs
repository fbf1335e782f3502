//! Model invocation gateway.
//!
//! Composes the client cache, the token meter and the tool registry behind
//! the [`ModelInvoker`] contract.

use crate::client_cache::ClientCache;
use crate::client_factory::ClientFactory;
use crate::client_spec::ClientSpec;
use crate::meter::{TokenMeter, count_best_effort};
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use colloquy_core::agent::{AgentConfig, ModelTier, ProviderKind};
use colloquy_core::config::ClientDefaults;
use colloquy_core::llm::{
    ChatClient, ChatMessage, Completion, CompletionRequest, InvocationMeta, InvocationResult,
    ModelInvoker, ToolSpec, UsageSource,
};
use colloquy_core::{ColloquyError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tool calls executed per invocation before the gateway gives up.
pub const MAX_TOOL_ROUNDS: u32 = 5;

/// Token counts of one provider call.
#[derive(Debug, Clone, Copy)]
struct RoundUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    source: UsageSource,
}

pub struct ModelGateway {
    factory: Arc<dyn ClientFactory>,
    cache: ClientCache,
    meter: TokenMeter,
    defaults: ClientDefaults,
    tools: ToolRegistry,
}

impl ModelGateway {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        meter: TokenMeter,
        defaults: ClientDefaults,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            factory,
            cache: ClientCache::new(),
            meter,
            defaults,
            tools,
        }
    }

    pub fn meter(&self) -> &TokenMeter {
        &self.meter
    }

    pub fn defaults(&self) -> &ClientDefaults {
        &self.defaults
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// Returns the cached client for a model, creating it on first use.
    ///
    /// Omitted parameters take the load-time defaults, so equal arguments
    /// always resolve to the same handle.
    ///
    /// # Errors
    ///
    /// Unknown models fail with a configuration error before any client is
    /// built.
    pub async fn get_client(
        &self,
        provider: ProviderKind,
        model: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<Arc<dyn ChatClient>> {
        self.meter.tier(provider, model)?;
        let spec = ClientSpec::new(
            provider,
            model,
            temperature.unwrap_or(self.defaults.temperature),
            self.defaults.streaming,
            max_tokens.unwrap_or(self.defaults.max_tokens),
            timeout.unwrap_or_else(|| self.defaults.timeout()),
        );
        self.cache.get_or_create(&spec, self.factory.as_ref()).await
    }

    async fn client_for(
        &self,
        agent: &AgentConfig,
    ) -> Result<(ClientSpec, ModelTier, Arc<dyn ChatClient>)> {
        let tier = self.meter.tier(agent.provider(), agent.model())?;
        let spec = ClientSpec::for_agent(agent, &self.defaults);
        let client = self.cache.get_or_create(&spec, self.factory.as_ref()).await?;
        Ok((spec, tier, client))
    }

    /// One provider call bounded by the client's configured timeout.
    async fn call(
        &self,
        client: &dyn ChatClient,
        spec: &ClientSpec,
        request: CompletionRequest,
    ) -> Result<Completion> {
        match tokio::time::timeout(spec.timeout(), client.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    "[Gateway] {} call to {} timed out after {}s",
                    spec.provider(),
                    spec.model(),
                    spec.timeout().as_secs_f64()
                );
                Err(ColloquyError::Timeout(spec.timeout()))
            }
        }
    }

    /// Usage of one call: provider metadata when present, else the
    /// provider's token counter, else zero.
    async fn usage(
        &self,
        client: &dyn ChatClient,
        model: &str,
        messages: &[ChatMessage],
        completion: &Completion,
    ) -> RoundUsage {
        if let Some(usage) = completion.usage {
            return RoundUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                source: UsageSource::Provider,
            };
        }

        let input = messages.iter().map(|m| m.content.clone()).collect();
        let prompt_tokens = count_best_effort(client, input, model).await;
        let completion_tokens =
            count_best_effort(client, vec![completion.content.clone()], model).await;
        RoundUsage {
            prompt_tokens,
            completion_tokens,
            source: UsageSource::Estimate,
        }
    }

    fn finish(
        &self,
        spec: &ClientSpec,
        tier: ModelTier,
        content: String,
        rounds: &[RoundUsage],
        latency: Duration,
        tool_calls: u32,
    ) -> InvocationResult {
        let prompt_tokens = rounds
            .iter()
            .fold(0u32, |acc, r| acc.saturating_add(r.prompt_tokens));
        let completion_tokens = rounds
            .iter()
            .fold(0u32, |acc, r| acc.saturating_add(r.completion_tokens));
        let usage_source = if rounds.iter().all(|r| r.source == UsageSource::Provider) {
            UsageSource::Provider
        } else {
            UsageSource::Estimate
        };
        let cost = self.meter.cost(
            spec.provider(),
            tier,
            prompt_tokens.saturating_add(completion_tokens),
        );

        tracing::info!(
            "[Gateway] {} {}: prompt={} completion={} ({}) cost={:.6} latency={:.2}s",
            spec.provider(),
            spec.model(),
            prompt_tokens,
            completion_tokens,
            usage_source,
            cost,
            latency.as_secs_f64()
        );

        InvocationResult {
            content,
            prompt_tokens,
            completion_tokens,
            latency,
            cost,
            meta: InvocationMeta {
                model: spec.model().to_string(),
                tier,
                usage_source,
                tool_calls,
            },
        }
    }

    /// Runs a tool the model asked for. Failures become the tool's output
    /// so the model can react to them.
    async fn run_tool(
        &self,
        tools: &[(String, ToolSpec)],
        name: &str,
        params: serde_json::Value,
    ) -> String {
        let Some((endpoint, _)) = tools.iter().find(|(_, tool)| tool.name == name) else {
            tracing::warn!("[Gateway] Model requested unknown tool '{}'", name);
            return format!("Error: unknown tool '{name}'");
        };

        let provider = match self.tools.get(endpoint) {
            Ok(provider) => provider,
            Err(e) => return format!("Error: {e}"),
        };
        match provider.execute(name, params).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("[Gateway] Tool '{}' on {} failed: {}", name, endpoint, e);
                format!("Error: {e}")
            }
        }
    }
}

#[async_trait]
impl ModelInvoker for ModelGateway {
    async fn invoke(
        &self,
        agent: &AgentConfig,
        messages: &[ChatMessage],
    ) -> Result<InvocationResult> {
        let (spec, tier, client) = self.client_for(agent).await?;
        tracing::debug!(
            "[Gateway] Invoking {} ({} messages)",
            agent.id(),
            messages.len()
        );

        let started = Instant::now();
        let completion = self
            .call(
                client.as_ref(),
                &spec,
                CompletionRequest::new(messages.to_vec()),
            )
            .await?;
        let latency = started.elapsed();

        let usage = self
            .usage(client.as_ref(), spec.model(), messages, &completion)
            .await;
        Ok(self.finish(&spec, tier, completion.content, &[usage], latency, 0))
    }

    async fn invoke_with_tools(
        &self,
        agent: &AgentConfig,
        messages: &[ChatMessage],
        endpoints: &[String],
    ) -> Result<InvocationResult> {
        let (spec, tier, client) = self.client_for(agent).await?;
        let tools = self.tools.discover(endpoints).await?;
        let specs: Vec<ToolSpec> = tools.iter().map(|(_, tool)| tool.clone()).collect();
        tracing::debug!(
            "[Gateway] Invoking {} with {} tool(s) from {:?}",
            agent.id(),
            specs.len(),
            endpoints
        );

        let mut conversation = messages.to_vec();
        let mut rounds = Vec::new();
        let mut tool_calls = 0u32;
        let mut latency = Duration::ZERO;

        loop {
            let started = Instant::now();
            let completion = self
                .call(
                    client.as_ref(),
                    &spec,
                    CompletionRequest::new(conversation.clone()).with_tools(specs.clone()),
                )
                .await?;
            latency += started.elapsed();
            rounds.push(
                self.usage(client.as_ref(), spec.model(), &conversation, &completion)
                    .await,
            );

            let Some(call) = completion.tool_call else {
                return Ok(self.finish(
                    &spec,
                    tier,
                    completion.content,
                    &rounds,
                    latency,
                    tool_calls,
                ));
            };

            if tool_calls >= MAX_TOOL_ROUNDS {
                return Err(ColloquyError::tool(format!(
                    "model kept requesting tools after {MAX_TOOL_ROUNDS} calls"
                )));
            }
            tool_calls += 1;

            tracing::info!("[Gateway] Tool call {}: {}", tool_calls, call.name);
            let output = self
                .run_tool(&tools, &call.name, call.arguments.clone())
                .await;
            conversation.push(ChatMessage::tool_request(call.clone()));
            conversation.push(ChatMessage::function_result(call.name, output));
        }
    }

    async fn list_tools(&self, endpoints: &[String]) -> Result<Vec<(String, ToolSpec)>> {
        self.tools.discover(endpoints).await
    }
}
