//! Error types for Colloquy.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A shared error type for the entire Colloquy backend.
///
/// Variants follow the failure taxonomy of the turn pipeline: storage
/// failures surface as "service unavailable", metering failures are
/// recoverable, provider failures and timeouts are fatal to the turn, and
/// configuration errors are raised before any network call is made.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ColloquyError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Persistence failure (SQLite, session files)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error (unknown model, malformed agent, bad config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote model invocation failed
    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    /// Remote model invocation exceeded its deadline
    #[error("Provider call timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Token counting failed
    #[error("Metering error: {0}")]
    Metering(String),

    /// Tool discovery or execution failed
    #[error("Tool error: {0}")]
    Tool(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ColloquyError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a Provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a Metering error
    pub fn metering(message: impl Into<String>) -> Self {
        Self::Metering(message.into())
    }

    /// Creates a Tool error
    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a storage error
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is a provider timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a remote invocation failure (including timeouts)
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Timeout(_))
    }

    /// Check if the caller should see this as "service unavailable".
    ///
    /// Storage and file system failures mean a user message or a reply
    /// could not be persisted.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io { .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ColloquyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ColloquyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ColloquyError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, ColloquyError>`.
pub type Result<T> = std::result::Result<T, ColloquyError>;
