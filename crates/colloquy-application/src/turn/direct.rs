//! Direct turns: the whole stored history goes to the model.

use super::{TurnProcessor, TurnRequest, TurnServices, replay, system_message};
use async_trait::async_trait;
use colloquy_core::Result;
use colloquy_core::agent::AgentConfig;
use colloquy_core::chat::{Chat, Message, NewMessage};
use colloquy_core::llm::{ChatMessage, InvocationResult};

/// Runs one direct turn.
///
/// 1. Persists the user message. A storage failure here fails the turn.
/// 2. Prompts with the system message, the replayed history and the new
///    message.
/// 3. Invokes the session's agent (the main agent by default), with tools from `tool_endpoints` if given.
/// 4. Persists the reply with its metering data.
///
/// A failed invocation leaves the user message stored and no reply.
pub(crate) async fn run_direct_turn(
    services: &TurnServices,
    chat: &Chat,
    request: &TurnRequest,
    tool_endpoints: Option<&[String]>,
) -> Result<Vec<Message>> {
    let history = services.messages.list_by_chat(&chat.id).await?;

    let user = services
        .messages
        .append(NewMessage::user(
            &chat.id,
            &request.session_id,
            &request.user_name,
            &request.text,
        ))
        .await
        .inspect_err(|e| tracing::error!("[Turn] Failed to persist user message: {}", e))?;

    let agent = services.agent_for(request);
    let system_prompt = services.system_prompt_for(chat, agent);
    let mut prompt = Vec::with_capacity(history.len() + 2);
    prompt.push(system_message(
        system_prompt,
        request.format_instruction.as_deref(),
    ));
    prompt.extend(replay(&history));
    prompt.push(ChatMessage::user(&request.text));

    let agent = agent.with_system_prompt(system_prompt);
    let result = match tool_endpoints {
        Some(endpoints) => {
            services
                .invoker
                .invoke_with_tools(&agent, &prompt, endpoints)
                .await
        }
        None => services.invoker.invoke(&agent, &prompt).await,
    }
    .inspect_err(|e| tracing::error!("[Turn] Invocation failed in chat {}: {}", chat.id, e))?;

    let reply = services
        .messages
        .append(reply_message(chat, request, &agent, &result, result.meta_json()))
        .await?;

    tracing::info!(
        "[Turn] Chat {}: direct turn done ({} stored before)",
        chat.id,
        history.len()
    );
    Ok(vec![user, reply])
}

/// An AI message for an invocation result.
pub(crate) fn reply_message(
    chat: &Chat,
    request: &TurnRequest,
    agent: &AgentConfig,
    result: &InvocationResult,
    meta: String,
) -> NewMessage {
    NewMessage::ai(
        &chat.id,
        &request.session_id,
        agent.id(),
        agent.name(),
        &result.content,
    )
    .with_metering(
        result.prompt_tokens,
        result.completion_tokens,
        result.latency.as_secs_f64(),
        result.cost,
    )
    .with_meta(meta)
}

/// Direct turns that never compact.
pub struct DirectTurnProcessor {
    services: TurnServices,
}

impl DirectTurnProcessor {
    pub fn new(services: TurnServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl TurnProcessor for DirectTurnProcessor {
    async fn process(&self, chat: &Chat, request: &TurnRequest) -> Result<Vec<Message>> {
        run_direct_turn(&self.services, chat, request, None).await
    }
}
