//! Persisted chat messages.

use chrono::Local;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Marker placed in `meta` of compaction summaries.
pub const SUMMARY_TAG: &str = "[SUMMARY]";

/// Timestamp layout used for message rows.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current local time in [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum MessageRole {
    System,
    User,
    Ai,
}

/// A message as stored. `id` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    #[serde(flatten)]
    pub data: NewMessage,
}

impl Message {
    pub fn chat_id(&self) -> &str {
        &self.data.chat_id
    }

    pub fn role(&self) -> MessageRole {
        self.data.role
    }

    pub fn body(&self) -> &str {
        &self.data.body
    }

    pub fn is_summary(&self) -> bool {
        self.data.is_summary()
    }
}

/// A message that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub chat_id: String,
    pub session_id: String,
    pub role: MessageRole,
    /// Agent that produced the message; `None` for user and system rows.
    pub agent_id: Option<String>,
    pub name: String,
    pub timestamp: String,
    pub body: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Request latency in seconds.
    pub request_time: f64,
    pub price: f64,
    pub meta: String,
}

impl NewMessage {
    /// A user message stamped with the current time and no metering data.
    pub fn user(
        chat_id: impl Into<String>,
        session_id: impl Into<String>,
        name: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            session_id: session_id.into(),
            role: MessageRole::User,
            agent_id: None,
            name: name.into(),
            timestamp: now_timestamp(),
            body: body.into(),
            prompt_tokens: 0,
            completion_tokens: 0,
            request_time: 0.0,
            price: 0.0,
            meta: String::new(),
        }
    }

    /// An AI message stamped with the current time. Metering fields are
    /// filled in with [`NewMessage::with_metering`].
    pub fn ai(
        chat_id: impl Into<String>,
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        name: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            role: MessageRole::Ai,
            agent_id: Some(agent_id.into()),
            ..Self::user(chat_id, session_id, name, body)
        }
    }

    pub fn with_metering(
        mut self,
        prompt_tokens: u32,
        completion_tokens: u32,
        request_time: f64,
        price: f64,
    ) -> Self {
        self.prompt_tokens = prompt_tokens;
        self.completion_tokens = completion_tokens;
        self.request_time = request_time;
        self.price = price;
        self
    }

    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = meta.into();
        self
    }

    /// True for summaries written by compaction, whose meta starts with
    /// [`SUMMARY_TAG`].
    pub fn is_summary(&self) -> bool {
        self.role == MessageRole::Ai && self.meta.starts_with(SUMMARY_TAG)
    }

    /// Attaches the store-assigned id.
    pub fn into_message(self, id: i64) -> Message {
        Message { id, data: self }
    }

    /// `[timestamp] name (role): body`
    pub fn transcript_line(&self) -> String {
        format!(
            "[{}] {} ({}): {}",
            self.timestamp, self.name, self.role, self.body
        )
    }
}

/// Renders messages as a chronological transcript, one blank line apart.
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| m.data.transcript_line())
        .collect::<Vec<_>>()
        .join("\n\n")
}
