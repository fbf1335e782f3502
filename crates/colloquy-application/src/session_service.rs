//! Session use cases: credentials, preferences and per-session history.

use colloquy_core::session::{
    HistoryEntry, ResponseFormat, SYSTEM_PROMPT_TAG, SessionRecord, SessionRepository,
    SystemPromptBlock, validate_session_id,
};
use colloquy_core::{ColloquyError, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};

/// Number of random bytes in a password salt.
pub const SALT_BYTES: usize = 16;

/// Orchestrates reads and writes of [`SessionRecord`]s.
///
/// Every read-modify-write runs behind one process-wide async mutex, so two
/// writers never interleave, and goes through [`SessionRepository::update`],
/// which also locks the record against other processes. Reads go straight
/// to the repository, which only ever exposes complete records.
pub struct SessionService {
    repository: Arc<dyn SessionRepository>,
    write_lock: Mutex<()>,
}

impl SessionService {
    pub fn new(repository: Arc<dyn SessionRepository>) -> Self {
        Self {
            repository,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the record for `session_id`, creating and persisting a fresh
    /// one on first contact.
    pub async fn get_or_create(&self, session_id: &str) -> Result<SessionRecord> {
        validate_session_id(session_id)?;
        if let Some(record) = self.repository.load(session_id).await? {
            return Ok(record);
        }

        let _guard = self.write_lock.lock().await;
        // Another writer may have created it while we waited.
        if let Some(record) = self.repository.load(session_id).await? {
            return Ok(record);
        }
        let record = self.repository.update(session_id, Box::new(|_| {})).await?;
        tracing::info!("[SessionService] Created session {}", session_id);
        Ok(record)
    }

    /// Loads without creating.
    pub async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        validate_session_id(session_id)?;
        self.repository.load(session_id).await
    }

    /// Locked read-modify-write of one record.
    async fn update<R, F>(&self, session_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut SessionRecord) -> R + Send + 'static,
        R: Send + 'static,
    {
        validate_session_id(session_id)?;
        let _guard = self.write_lock.lock().await;
        self.apply(session_id, f).await
    }

    /// Runs `f` through the repository. The caller holds `write_lock`.
    async fn apply<R, F>(&self, session_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut SessionRecord) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.repository
            .update(
                session_id,
                Box::new(move |record| {
                    let _ = tx.send(f(record));
                }),
            )
            .await?;
        rx.await.map_err(|_| {
            ColloquyError::internal(format!("update of session {session_id} returned no result"))
        })
    }

    /// Sets a new password and returns its salt.
    ///
    /// The salt is 16 random bytes, hex encoded; the stored hash is
    /// `sha256(password || salt)`.
    pub async fn set_password(&self, session_id: &str, password: &str) -> Result<String> {
        let salt = generate_salt();
        let hash = hash_password(password, &salt);
        let returned = salt.clone();
        self.update(session_id, move |record| {
            record.password.hash = Some(hash);
            record.password.salt = Some(salt);
        })
        .await?;
        tracing::info!("[SessionService] Password set for {}", session_id);
        Ok(returned)
    }

    /// True iff the record's salt equals `salt` exactly.
    ///
    /// The salt acts as a bearer credential held by the client.
    pub async fn verify_session(&self, session_id: &str, salt: &str) -> Result<bool> {
        Ok(self
            .find(session_id)
            .await?
            .and_then(|record| record.password.salt)
            .is_some_and(|stored| stored == salt))
    }

    /// Logs in with a password.
    ///
    /// The first login sets the password. Later logins re-hash with the
    /// stored salt.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(salt))`: password accepted (or just set)
    /// - `Ok(None)`: wrong password
    pub async fn login(&self, session_id: &str, password: &str) -> Result<Option<String>> {
        validate_session_id(session_id)?;
        let _guard = self.write_lock.lock().await;
        let record = self.repository.load(session_id).await?;

        if let Some((Some(hash), Some(salt))) =
            record.map(|record| (record.password.hash, record.password.salt))
        {
            if hash_password(password, &salt) == hash {
                return Ok(Some(salt));
            }
            tracing::warn!("[SessionService] Rejected login for {}", session_id);
            return Ok(None);
        }

        let salt = generate_salt();
        let hash = hash_password(password, &salt);
        let stored = salt.clone();
        self.apply(session_id, move |record| {
            record.password.hash = Some(hash);
            record.password.salt = Some(stored);
        })
        .await?;
        tracing::info!("[SessionService] First login for {}", session_id);
        Ok(Some(salt))
    }

    pub async fn set_system_prompt(&self, session_id: &str, prompt: &str) -> Result<()> {
        let block = SystemPromptBlock {
            prompt: prompt.to_string(),
            tag: Some(SYSTEM_PROMPT_TAG.to_string()),
        };
        self.update(session_id, move |record| record.system_prompt = block)
            .await
    }

    /// The session's system prompt, if one was set.
    pub async fn get_system_prompt(&self, session_id: &str) -> Result<Option<SystemPromptBlock>> {
        Ok(self
            .find(session_id)
            .await?
            .map(|record| record.system_prompt)
            .filter(|block| !block.prompt.is_empty()))
    }

    pub async fn set_response_format(
        &self,
        session_id: &str,
        format: ResponseFormat,
    ) -> Result<()> {
        self.update(session_id, move |record| record.response_format = format)
            .await
    }

    /// The preferred reply format; unknown sessions get the default.
    pub async fn get_response_format(&self, session_id: &str) -> Result<ResponseFormat> {
        Ok(self
            .find(session_id)
            .await?
            .map(|record| record.response_format)
            .unwrap_or_default())
    }

    pub async fn set_selected_chat(&self, session_id: &str, chat_id: &str) -> Result<()> {
        let chat_id = chat_id.to_string();
        self.update(session_id, move |record| record.selected_chat = Some(chat_id))
            .await
    }

    pub async fn get_selected_chat(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self
            .find(session_id)
            .await?
            .and_then(|record| record.selected_chat))
    }

    /// Remembers the agent chosen for this session's turns.
    pub async fn set_agent_key(&self, session_id: &str, agent_key: &str) -> Result<()> {
        let agent_key = agent_key.to_string();
        self.update(session_id, move |record| record.agent_key = Some(agent_key))
            .await
    }

    pub async fn get_agent_key(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self
            .find(session_id)
            .await?
            .and_then(|record| record.agent_key))
    }

    /// Appends to the session history.
    ///
    /// Returns `false` if the entry was skipped as a duplicate.
    pub async fn add_to_history(&self, session_id: &str, entry: HistoryEntry) -> Result<bool> {
        self.update(session_id, move |record| record.push_history(entry))
            .await
    }

    pub async fn get_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .find(session_id)
            .await?
            .map(|record| record.history)
            .unwrap_or_default())
    }

    pub async fn clear_history(&self, session_id: &str) -> Result<()> {
        self.update(session_id, |record| record.history.clear())
            .await
    }

    /// Deletes the session record. Returns whether it existed.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        validate_session_id(session_id)?;
        let _guard = self.write_lock.lock().await;
        let existed = self.repository.delete(session_id).await?;
        if existed {
            tracing::info!("[SessionService] Deleted session {}", session_id);
        }
        Ok(existed)
    }
}

fn generate_salt() -> String {
    let bytes: [u8; SALT_BYTES] = rand::random();
    hex::encode(bytes)
}

fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_infrastructure::FileSessionRepository;
    use tempfile::TempDir;

    async fn service() -> (TempDir, Arc<SessionService>) {
        let dir = TempDir::new().unwrap();
        let repository = FileSessionRepository::new(dir.path()).await.unwrap();
        (dir, Arc::new(SessionService::new(Arc::new(repository))))
    }

    fn entry(content: &str, tag: Option<&str>) -> HistoryEntry {
        HistoryEntry {
            role: "user".to_string(),
            content: content.to_string(),
            agent_key: "main".to_string(),
            time: "12:00:00".to_string(),
            prompt_tag: tag.map(str::to_string),
        }
    }

    #[test]
    fn test_hash_is_sha256_of_password_and_salt() {
        // sha256("abc")
        assert_eq!(
            hash_password("a", "bc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(generate_salt().len(), SALT_BYTES * 2);
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (_dir, service) = service().await;
        let first = service.get_or_create("s1").await.unwrap();
        let second = service.get_or_create("s1").await.unwrap();
        assert_eq!(first, second);
        assert!(!first.password.is_set());
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_keeps_one_record() {
        let (_dir, service) = service().await;
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.get_or_create("racy").await.unwrap() })
            })
            .collect();

        let mut created = Vec::new();
        for handle in handles {
            created.push(handle.await.unwrap().created_at);
        }
        created.dedup();
        assert_eq!(created.len(), 1);
    }

    #[tokio::test]
    async fn test_login_flow() {
        let (_dir, service) = service().await;
        let salt = service.login("s1", "abc123").await.unwrap().unwrap();
        assert_eq!(salt.len(), 32);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(service.login("s1", "abc123").await.unwrap(), Some(salt.clone()));
        assert_eq!(service.login("s1", "wrong").await.unwrap(), None);

        assert!(service.verify_session("s1", &salt).await.unwrap());
        assert!(!service.verify_session("s1", "deadbeef").await.unwrap());
        assert!(!service.verify_session("unknown", &salt).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_password_replaces_salt() {
        let (_dir, service) = service().await;
        let first = service.set_password("s1", "one").await.unwrap();
        let second = service.set_password("s1", "two").await.unwrap();
        assert_ne!(first, second);
        assert!(!service.verify_session("s1", &first).await.unwrap());
        assert_eq!(service.login("s1", "two").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_preferences() {
        let (_dir, service) = service().await;
        assert_eq!(
            service.get_response_format("s1").await.unwrap(),
            ResponseFormat::Default
        );
        assert!(service.get_system_prompt("s1").await.unwrap().is_none());

        service.set_response_format("s1", ResponseFormat::Xml).await.unwrap();
        service.set_system_prompt("s1", "Be brief").await.unwrap();
        service.set_selected_chat("s1", "default").await.unwrap();
        assert!(service.get_agent_key("s1").await.unwrap().is_none());
        service.set_agent_key("s1", "tech_spec").await.unwrap();

        assert_eq!(
            service.get_response_format("s1").await.unwrap(),
            ResponseFormat::Xml
        );
        let prompt = service.get_system_prompt("s1").await.unwrap().unwrap();
        assert_eq!(prompt.prompt, "Be brief");
        assert_eq!(prompt.tag.as_deref(), Some(SYSTEM_PROMPT_TAG));
        assert_eq!(
            service.get_selected_chat("s1").await.unwrap().as_deref(),
            Some("default")
        );
        assert_eq!(
            service.get_agent_key("s1").await.unwrap().as_deref(),
            Some("tech_spec")
        );
        // Preferences survive a password change.
        service.set_password("s1", "pw").await.unwrap();
        assert_eq!(
            service.find("s1").await.unwrap().unwrap().agent_key.as_deref(),
            Some("tech_spec")
        );
    }

    #[tokio::test]
    async fn test_writes_take_the_record_lock() {
        let (dir, service) = service().await;
        service.set_selected_chat("s1", "default").await.unwrap();
        assert!(dir.path().join("s1.json").exists());
        assert!(dir.path().join("s1.lock").exists());
    }

    #[tokio::test]
    async fn test_history() {
        let (_dir, service) = service().await;
        assert!(service.add_to_history("s1", entry("a", Some("[Q]"))).await.unwrap());
        assert!(!service.add_to_history("s1", entry("b", Some("[Q]"))).await.unwrap());
        assert!(service.add_to_history("s1", entry("c", None)).await.unwrap());
        assert_eq!(service.get_history("s1").await.unwrap().len(), 2);

        service.clear_history("s1").await.unwrap();
        assert!(service.get_history("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_invalid_ids() {
        let (_dir, service) = service().await;
        service.get_or_create("s1").await.unwrap();
        assert!(service.delete_session("s1").await.unwrap());
        assert!(!service.delete_session("s1").await.unwrap());

        assert!(service.get_or_create("../escape").await.is_err());
        assert!(service.login("", "pw").await.is_err());
    }
}
