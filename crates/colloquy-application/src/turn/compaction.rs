//! Compaction-aware turns.
//!
//! Below the threshold a turn is a plain direct turn. At or above it the
//! history is summarized, the chat's system prompt is regenerated from the
//! summary, and the whole history is replaced by exactly three messages:
//! the summary, the user message and the reply.

use super::direct::{reply_message, run_direct_turn};
use super::{TurnProcessor, TurnRequest, TurnServices, system_message};
use async_trait::async_trait;
use colloquy_core::Result;
use colloquy_core::chat::{
    Chat, Message, MessageRole, NewMessage, SUMMARY_TAG, render_transcript,
};
use colloquy_core::config::CompactionCount;
use colloquy_core::llm::ChatMessage;

/// Display name of summary messages.
pub const SUMMARIZER_NAME: &str = "Summarizer";

/// First line of every summary message body.
pub const SUMMARY_HEADER: &str = "SUMMARY OF PREVIOUS DIALOGUE:";

const SUMMARY_FOOTER: &str = "----------";

/// Where a chat is in the compaction cycle. Re-derived every turn from the
/// stored message count; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionPhase {
    Accumulating,
    Compacting,
}

pub struct CompactionEngine {
    services: TurnServices,
    threshold: usize,
    count: CompactionCount,
}

impl CompactionEngine {
    /// An engine that compacts once a chat holds `threshold` messages.
    pub fn new(services: TurnServices, threshold: usize) -> Self {
        Self {
            services,
            threshold,
            count: CompactionCount::Messages,
        }
    }

    pub fn with_count(mut self, count: CompactionCount) -> Self {
        self.count = count;
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Size of the chat as compared against the threshold.
    pub async fn measure(&self, chat_id: &str) -> Result<usize> {
        match self.count {
            CompactionCount::Messages => self.services.messages.count_by_chat(chat_id).await,
            CompactionCount::Turns => {
                let history = self.services.messages.list_by_chat(chat_id).await?;
                let user_messages = history
                    .iter()
                    .filter(|m| m.role() == MessageRole::User)
                    .count();
                Ok(user_messages + 1)
            }
        }
    }

    pub fn phase_for(&self, size: usize) -> CompactionPhase {
        if size < self.threshold {
            CompactionPhase::Accumulating
        } else {
            CompactionPhase::Compacting
        }
    }

    async fn compact(&self, chat: &Chat, request: &TurnRequest) -> Result<Vec<Message>> {
        let services = &self.services;
        let history = services.messages.list_by_chat(&chat.id).await?;
        tracing::info!(
            "[Compaction] Chat {}: compacting {} messages",
            chat.id,
            history.len()
        );

        // Summary of the whole transcript.
        let transcript = render_transcript(&history);
        let summarizer = &services.agents.summarizer;
        let summary = services
            .invoker
            .invoke(summarizer, &[ChatMessage::user(summary_instruction(&transcript))])
            .await?;
        let summary_body = format!(
            "{SUMMARY_HEADER}\n{}\n{SUMMARY_FOOTER}",
            summary.content.trim()
        );
        let summary_message = NewMessage::ai(
            &chat.id,
            &request.session_id,
            summarizer.id(),
            SUMMARIZER_NAME,
            &summary_body,
        )
        .with_metering(
            summary.prompt_tokens,
            summary.completion_tokens,
            summary.latency.as_secs_f64(),
            summary.cost,
        )
        .with_meta(format!("{SUMMARY_TAG} {}", summary.meta_json()));

        // Replacement system prompt.
        let main = services.agent_for(request);
        let old_prompt = services.system_prompt_for(chat, main);
        let engineered = services
            .invoker
            .invoke(
                &services.agents.prompt_engineer,
                &[ChatMessage::user(prompt_engineer_instruction(
                    old_prompt,
                    &summary.content,
                ))],
            )
            .await?;
        let new_prompt = match engineered.content.trim() {
            "" => {
                tracing::warn!(
                    "[Compaction] Chat {}: prompt engineer returned nothing, keeping the old prompt",
                    chat.id
                );
                old_prompt.to_string()
            }
            prompt => prompt.to_string(),
        };
        tracing::debug!("[Compaction] Chat {}: new system prompt\n{}", chat.id, new_prompt);

        // The turn itself, on the compacted context.
        let prompt = vec![
            system_message(&new_prompt, request.format_instruction.as_deref()),
            ChatMessage::assistant(&summary_body),
            ChatMessage::user(&request.text),
        ];
        let agent = main.with_system_prompt(&new_prompt);
        let result = services.invoker.invoke(&agent, &prompt).await?;

        let user = NewMessage::user(
            &chat.id,
            &request.session_id,
            &request.user_name,
            &request.text,
        );
        let meta = format!("{}\nNew prompt:\n{}", result.meta_json(), new_prompt);
        let reply = reply_message(chat, request, &agent, &result, meta);

        let stored = services
            .messages
            .replace_history(
                &chat.id,
                vec![summary_message, user, reply],
                Some(&new_prompt),
            )
            .await
            .inspect_err(|e| {
                tracing::error!("[Compaction] Chat {}: history replacement failed: {}", chat.id, e)
            })?;

        tracing::info!(
            "[Compaction] Chat {}: {} messages replaced by {}",
            chat.id,
            history.len(),
            stored.len()
        );
        Ok(stored)
    }
}

#[async_trait]
impl TurnProcessor for CompactionEngine {
    async fn process(&self, chat: &Chat, request: &TurnRequest) -> Result<Vec<Message>> {
        let size = self.measure(&chat.id).await?;
        match self.phase_for(size) {
            CompactionPhase::Accumulating => {
                run_direct_turn(&self.services, chat, request, None).await
            }
            CompactionPhase::Compacting => self.compact(chat, request).await,
        }
    }
}

fn summary_instruction(transcript: &str) -> String {
    format!(
        "Summarize the following messages briefly and precisely.\n\
         Output only the key points, without introductions, explanations or extra information.\n\n\
         {transcript}\n\n\
         OUTPUT: only the summary, no preamble."
    )
}

fn prompt_engineer_instruction(old_prompt: &str, summary: &str) -> String {
    format!(
        "You are a prompt optimization engine for AI agents. Based on the summary of the \
         previous conversation:\n\n\
         - Analyze the key points of the summary.\n\
         - Find gaps, redundancies or places in the original prompt that need clarification.\n\
         - Improve the wording of the prompt to make the agent more relevant and effective.\n\
         - Adjust tone, style and structure to match the summary.\n\
         - Simplify or extend sections of the prompt where needed.\n\n\
         OLD PROMPT:\n\n{old_prompt}\n\n\
         SUMMARY:\n\n{summary}\n\n\
         OUTPUT: ONLY THE PROMPT, no preamble."
    )
}
