//! Secret configuration storage.
//!
//! Credentials come from `secret.json` first and from the environment
//! second.

use colloquy_core::Result;
use colloquy_core::config::{GigaChatSecret, SecretConfig};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const GIGACHAT_TOKEN_ENV: &str = "GIGACHAT_TOKEN";
pub const GIGACHAT_SCOPE_ENV: &str = "GIGACHAT_SCOPE";

/// Read-only storage for `secret.json`.
///
/// # Security Note
///
/// The file is plain JSON and should have owner-only permissions.
pub struct SecretStorage {
    path: PathBuf,
}

impl SecretStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the secret file.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(SecretConfig))`: Successfully loaded and parsed
    /// - `Ok(None)`: File doesn't exist
    /// - `Err(_)`: Unreadable or invalid JSON
    pub fn load(&self) -> Result<Option<SecretConfig>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// GigaChat credentials from the file, else from the process environment.
    pub fn gigachat(&self) -> Result<Option<GigaChatSecret>> {
        self.gigachat_with_env(|key| std::env::var(key).ok())
    }

    pub fn gigachat_with_env<F>(&self, env: F) -> Result<Option<GigaChatSecret>>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = self.load()?.and_then(|config| config.gigachat) {
            if !secret.credentials.trim().is_empty() {
                return Ok(Some(secret));
            }
        }

        Ok(env(GIGACHAT_TOKEN_ENV)
            .filter(|token| !token.trim().is_empty())
            .map(|credentials| GigaChatSecret {
                credentials,
                scope: env(GIGACHAT_SCOPE_ENV).filter(|s| !s.trim().is_empty()),
            }))
    }
}
