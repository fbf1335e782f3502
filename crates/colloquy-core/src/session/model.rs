//! Durable per-session records.

use crate::error::{ColloquyError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Maximum number of history entries kept per session.
pub const MAX_HISTORY: usize = 100;

/// Tag stored alongside a session's custom system prompt.
pub const SYSTEM_PROMPT_TAG: &str = "system_prompt";

/// Longest accepted session id.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Checks that `session_id` is usable as a file name.
///
/// Ids must be non-empty and contain only ASCII alphanumerics, `-` and `_`.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
        return Err(ColloquyError::validation(format!(
            "session id must be 1..={MAX_SESSION_ID_LEN} characters"
        )));
    }
    if !session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ColloquyError::validation(format!(
            "session id '{session_id}' contains invalid characters"
        )));
    }
    Ok(())
}

/// Requested shape of model replies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
pub enum ResponseFormat {
    #[serde(rename = "[JSON]")]
    #[strum(to_string = "[JSON]", serialize = "json")]
    Json,
    #[serde(rename = "[XML]")]
    #[strum(to_string = "[XML]", serialize = "xml")]
    Xml,
    #[default]
    #[serde(rename = "[DEFAULT]")]
    #[strum(to_string = "[DEFAULT]", serialize = "default")]
    Default,
}

impl ResponseFormat {
    /// Instruction appended to the system prompt, if the format needs one.
    pub fn instruction(&self) -> Option<&'static str> {
        match self {
            Self::Json => Some(
                "Respond only in [JSON]: output ONLY valid JSON with no text outside the structure.\n\
                 IMPORTANT: if field names differ from the example, use exactly the example's names!",
            ),
            Self::Xml => Some(
                "Respond only in [XML]: output ONLY XML with a correct hierarchy.\n\
                 IMPORTANT: if field names differ from the example, use exactly the example's names!",
            ),
            Self::Default => None,
        }
    }
}

/// Salted password hash. Both fields stay `None` until the first login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordBlock {
    pub hash: Option<String>,
    pub salt: Option<String>,
}

impl PasswordBlock {
    pub fn is_set(&self) -> bool {
        self.hash.is_some() && self.salt.is_some()
    }
}

/// A session-level system prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPromptBlock {
    pub prompt: String,
    pub tag: Option<String>,
}

/// One entry of the per-session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    pub agent_key: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tag: Option<String>,
}

/// The durable record for one session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: String,
    #[serde(default)]
    pub password: PasswordBlock,
    #[serde(default)]
    pub system_prompt: SystemPromptBlock,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_chat: Option<String>,
    /// Key of the agent chosen for this session's turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_key: Option<String>,
}

impl SessionRecord {
    /// A fresh record with no credentials, stamped with the current time.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: Utc::now().to_rfc3339(),
            password: PasswordBlock::default(),
            system_prompt: SystemPromptBlock::default(),
            history: Vec::new(),
            response_format: ResponseFormat::Default,
            selected_chat: None,
            agent_key: None,
        }
    }

    /// Appends a history entry.
    ///
    /// Returns `false` without changing anything when the entry carries a
    /// prompt tag equal to the last entry's tag. History is trimmed to the
    /// newest [`MAX_HISTORY`] entries.
    pub fn push_history(&mut self, entry: HistoryEntry) -> bool {
        if let (Some(tag), Some(last)) = (entry.prompt_tag.as_deref(), self.history.last()) {
            if last.prompt_tag.as_deref() == Some(tag) {
                return false;
            }
        }
        self.history.push(entry);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(content: &str, tag: Option<&str>) -> HistoryEntry {
        HistoryEntry {
            role: "user".to_string(),
            content: content.to_string(),
            agent_key: "main".to_string(),
            time: "10:00".to_string(),
            prompt_tag: tag.map(str::to_string),
        }
    }

    #[test]
    fn test_session_id_validation() {
        assert!(validate_session_id("abc-DEF_123").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("../etc/passwd").is_err());
        assert!(validate_session_id("a b").is_err());
        assert!(validate_session_id(&"x".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_history_is_capped() {
        let mut record = SessionRecord::new("s1");
        for i in 0..(MAX_HISTORY + 5) {
            assert!(record.push_history(entry(&i.to_string(), None)));
        }
        assert_eq!(record.history.len(), MAX_HISTORY);
        assert_eq!(record.history[0].content, "5");
    }

    #[test]
    fn test_duplicate_tag_is_skipped() {
        let mut record = SessionRecord::new("s1");
        assert!(record.push_history(entry("a", Some("[USER_PROMPT]"))));
        assert!(!record.push_history(entry("b", Some("[USER_PROMPT]"))));
        assert!(record.push_history(entry("c", None)));
        assert!(record.push_history(entry("d", Some("[USER_PROMPT]"))));
        assert_eq!(record.history.len(), 3);
    }

    #[test]
    fn test_minimal_record_deserializes() {
        let json = r#"{
            "session_id": "abc",
            "created_at": "2024-01-01T00:00:00+00:00",
            "password": {"hash": null, "salt": null}
        }"#;
        let record: SessionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.session_id, "abc");
        assert!(!record.password.is_set());
        assert_eq!(record.response_format, ResponseFormat::Default);
        assert!(record.history.is_empty());
        assert!(record.agent_key.is_none());
    }

    #[test]
    fn test_response_format_wire_names() {
        assert_eq!(
            serde_json::to_string(&ResponseFormat::Json).unwrap(),
            "\"[JSON]\""
        );
        assert_eq!("xml".parse::<ResponseFormat>().unwrap(), ResponseFormat::Xml);
        assert!(ResponseFormat::Default.instruction().is_none());
        assert!(ResponseFormat::Json.instruction().unwrap().contains("[JSON]"));
    }
}
