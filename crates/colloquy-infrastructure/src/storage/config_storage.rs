//! Loading of `config.toml`.

use colloquy_core::Result;
use colloquy_core::config::AppConfig;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const GIGACHAT_BASE_URL_ENV: &str = "GIGACHAT_BASE_URL";
pub const GIGACHAT_OAUTH_URL_ENV: &str = "GIGACHAT_OAUTH_URL";
pub const OLLAMA_BASE_URL_ENV: &str = "OLLAMA_BASE_URL";

/// Read-only access to the application config file.
///
/// Responsibilities:
/// - Parse TOML into [`AppConfig`] (a missing or empty file means defaults)
/// - Apply environment overrides for provider URLs
/// - Reject invalid agent sections before anything else starts
pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the file, applies process environment overrides and validates.
    pub fn load(&self) -> Result<AppConfig> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load) with an explicit environment lookup.
    pub fn load_with_env<F>(&self, env: F) -> Result<AppConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match fs::read_to_string(&self.path) {
            Ok(content) if !content.trim().is_empty() => toml::from_str(&content)?,
            Ok(_) => AppConfig::default(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(
                    "[Config] {} not found, using defaults",
                    self.path.display()
                );
                AppConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        apply_env_overrides(&mut config, env);
        config.resolve_agents()?;

        Ok(config)
    }
}

fn apply_env_overrides<F>(config: &mut AppConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = non_empty(GIGACHAT_BASE_URL_ENV) {
        config.providers.gigachat.base_url = url;
    }
    if let Some(url) = non_empty(GIGACHAT_OAUTH_URL_ENV) {
        config.providers.gigachat.oauth_url = url;
    }
    if let Some(url) = non_empty(OLLAMA_BASE_URL_ENV) {
        config.providers.ollama.base_url = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(temp_dir.path().join("config.toml"));
        assert_eq!(storage.load_with_env(no_env).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_file_values_and_env_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [compaction]
            threshold = 6

            [providers.ollama]
            base_url = "http://from-file:11434"
            "#,
        )
        .unwrap();

        let storage = ConfigStorage::new(path);
        let config = storage
            .load_with_env(|key| match key {
                OLLAMA_BASE_URL_ENV => Some("http://from-env:11434".to_string()),
                GIGACHAT_BASE_URL_ENV => Some("  ".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.compaction.threshold, 6);
        assert_eq!(config.providers.ollama.base_url, "http://from-env:11434");
        assert_eq!(
            config.providers.gigachat.base_url,
            colloquy_core::config::DEFAULT_GIGACHAT_BASE_URL
        );
    }

    #[test]
    fn test_invalid_agent_fails_at_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [agents.summarizer]
            id = "summarizer"
            provider = "gigachat"
            model = "GigaChat-2-Max"
            temperature = 3.5
            "#,
        )
        .unwrap();

        let err = ConfigStorage::new(path).load_with_env(no_env).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_malformed_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[compaction\nthreshold = ").unwrap();

        assert!(ConfigStorage::new(path).load_with_env(no_env).is_err());
    }
}
