//! Unified path management for Colloquy files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/colloquy/          # Config directory
//! ├── config.toml              # Application configuration
//! └── secret.json              # Provider credentials
//!
//! ~/.local/share/colloquy/     # Data directory
//! ├── colloquy.db              # Chats and messages (SQLite)
//! ├── sessions/                # One JSON record per session id
//! └── logs/                    # Daily log files
//! ```
//!
//! `COLLOQUY_CONFIG_DIR` and `COLLOQUY_DATA_DIR` override the two roots.

use colloquy_core::{ColloquyError, Result};
use std::path::PathBuf;

const APP_DIR: &str = "colloquy";

pub const CONFIG_DIR_ENV: &str = "COLLOQUY_CONFIG_DIR";
pub const DATA_DIR_ENV: &str = "COLLOQUY_DATA_DIR";

/// Resolved locations of every file the backend reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColloquyPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl ColloquyPaths {
    /// Resolves the roots from the environment, falling back to platform
    /// directories.
    ///
    /// # Errors
    ///
    /// Returns a config error when no override is set and the platform
    /// directory cannot be determined.
    pub fn resolve() -> Result<Self> {
        let config_dir = match env_dir(CONFIG_DIR_ENV) {
            Some(dir) => dir,
            None => dirs::config_dir()
                .map(|d| d.join(APP_DIR))
                .ok_or_else(|| ColloquyError::config("cannot determine config directory"))?,
        };
        let data_dir = match env_dir(DATA_DIR_ENV) {
            Some(dir) => dir,
            None => dirs::data_dir()
                .map(|d| d.join(APP_DIR))
                .ok_or_else(|| ColloquyError::config("cannot determine data directory"))?,
        };
        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Paths rooted at explicit directories (tests, embedded use).
    pub fn with_roots(config_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// # Security Note
    ///
    /// This file holds provider credentials in plain text and should be
    /// readable by the owner only.
    pub fn secret_file(&self) -> PathBuf {
        self.config_dir.join("secret.json")
    }

    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join("colloquy.db")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn env_dir(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_roots() {
        let paths = ColloquyPaths::with_roots("/cfg", "/data");
        assert_eq!(paths.config_file(), PathBuf::from("/cfg/config.toml"));
        assert_eq!(paths.secret_file(), PathBuf::from("/cfg/secret.json"));
        assert_eq!(paths.database_file(), PathBuf::from("/data/colloquy.db"));
        assert_eq!(paths.sessions_dir(), PathBuf::from("/data/sessions"));
        assert_eq!(paths.logs_dir(), PathBuf::from("/data/logs"));
    }
}
