//! Chat metadata.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Id of the chat seeded on first start.
pub const DEFAULT_CHAT_ID: &str = "default";
/// Name of the chat seeded on first start.
pub const DEFAULT_CHAT_NAME: &str = "General";

/// How turns in a chat are processed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatKind {
    /// Direct turns until the history crosses the compaction threshold.
    #[default]
    Standard,
    /// Direct turns only; history grows without bound.
    Direct,
    /// Direct turns with tools from the configured endpoints.
    Tools,
}

/// A conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub name: String,
    /// Override system prompt; `None` falls back to the configured default.
    pub system_prompt: Option<String>,
    pub kind: ChatKind,
    pub created_at: String,
}

impl Chat {
    /// Creates a chat stamped with the current time.
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ChatKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            system_prompt: None,
            kind,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// The override prompt when set and non-blank, else `default_prompt`.
    pub fn effective_system_prompt<'a>(&'a self, default_prompt: &'a str) -> &'a str {
        match self.system_prompt.as_deref() {
            Some(prompt) if !prompt.trim().is_empty() => prompt,
            _ => default_prompt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_effective_prompt_falls_back() {
        let chat = Chat::new("c1", "Chat", ChatKind::Standard);
        assert_eq!(chat.effective_system_prompt("default"), "default");

        let chat = chat.with_system_prompt("   ");
        assert_eq!(chat.effective_system_prompt("default"), "default");

        let chat = chat.with_system_prompt("custom");
        assert_eq!(chat.effective_system_prompt("default"), "custom");
    }

    #[test]
    fn test_chat_kind_round_trips_through_strings() {
        for kind in [ChatKind::Standard, ChatKind::Direct, ChatKind::Tools] {
            assert_eq!(ChatKind::from_str(&kind.to_string()).unwrap(), kind);
        }
        assert!(ChatKind::from_str("group").is_err());
    }
}
