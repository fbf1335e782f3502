//! File-backed [`SessionRepository`].
//!
//! One pretty-printed JSON file per session id under the sessions
//! directory. Updates hold an exclusive `<session_id>.lock` file lock and
//! replace the file atomically; blocking file work runs on tokio's
//! blocking pool.

use crate::storage::AtomicJsonFile;
use async_trait::async_trait;
use colloquy_core::session::{
    SessionMutation, SessionRecord, SessionRepository, validate_session_id,
};
use colloquy_core::{ColloquyError, Result};
use std::path::{Path, PathBuf};
use tokio::task;

/// Directory of `<session_id>.json` files and their lock files.
///
/// ```text
/// sessions/
/// ├── 3f9c0d2e.json
/// ├── 3f9c0d2e.lock
/// └── a81b44f0.json
/// ```
pub struct FileSessionRepository {
    dir: PathBuf,
}

impl FileSessionRepository {
    /// Creates the repository, creating `dir` if needed.
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, session_id: &str) -> Result<AtomicJsonFile<SessionRecord>> {
        validate_session_id(session_id)?;
        Ok(AtomicJsonFile::new(
            self.dir.join(format!("{session_id}.json")),
        ))
    }
}

fn join_error(e: task::JoinError) -> ColloquyError {
    ColloquyError::io(format!("Failed to spawn blocking task: {}", e))
}

#[async_trait]
impl SessionRepository for FileSessionRepository {
    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let file = self.file_for(session_id)?;
        task::spawn_blocking(move || file.load())
            .await
            .map_err(join_error)?
    }

    async fn update(&self, session_id: &str, mutation: SessionMutation) -> Result<SessionRecord> {
        let file = self.file_for(session_id)?;
        let fresh = SessionRecord::new(session_id);
        task::spawn_blocking(move || {
            file.update(fresh, |record| {
                mutation(record);
                Ok(record.clone())
            })
        })
        .await
        .map_err(join_error)?
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let file = self.file_for(session_id)?;
        let existed = task::spawn_blocking(move || file.remove())
            .await
            .map_err(join_error)??;
        if existed {
            tracing::info!("[SessionStore] Deleted session file for {}", session_id);
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::session::HistoryEntry;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_update_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path().join("sessions"))
            .await
            .unwrap();

        let record = repo
            .update(
                "s-1",
                Box::new(|record| record.password.salt = Some("00ff".to_string())),
            )
            .await
            .unwrap();

        assert_eq!(record.password.salt.as_deref(), Some("00ff"));
        assert_eq!(repo.load("s-1").await.unwrap(), Some(record));
        assert!(temp_dir.path().join("sessions/s-1.json").exists());
    }

    #[tokio::test]
    async fn test_missing_session_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path()).await.unwrap();
        assert!(repo.load("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path()).await.unwrap();
        let err = repo.load("../escape").await.unwrap_err();
        assert!(matches!(err, ColloquyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path()).await.unwrap();
        repo.update("gone", Box::new(|_| {})).await.unwrap();

        assert!(repo.delete("gone").await.unwrap());
        assert!(!repo.delete("gone").await.unwrap());
        assert!(repo.load("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_existing_fields() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path()).await.unwrap();
        let created = repo.update("s1", Box::new(|_| {})).await.unwrap();

        let updated = repo
            .update(
                "s1",
                Box::new(|record| record.selected_chat = Some("default".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.selected_chat.as_deref(), Some("default"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_updates_from_separate_handles_are_not_lost() {
        let temp_dir = TempDir::new().unwrap();
        // Two handles on one directory share nothing but the lock file.
        let first = Arc::new(FileSessionRepository::new(temp_dir.path()).await.unwrap());
        let second = Arc::new(FileSessionRepository::new(temp_dir.path()).await.unwrap());

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let repo = if i % 2 == 0 { first.clone() } else { second.clone() };
                tokio::spawn(async move {
                    repo.update(
                        "shared",
                        Box::new(move |record| {
                            record.history.push(HistoryEntry {
                                role: "user".to_string(),
                                content: format!("m{i}"),
                                agent_key: "main".to_string(),
                                time: "12:00:00".to_string(),
                                prompt_tag: None,
                            })
                        }),
                    )
                    .await
                    .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let record = first.load("shared").await.unwrap().unwrap();
        assert_eq!(record.history.len(), 20);
        assert!(temp_dir.path().join("shared.lock").exists());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path()).await.unwrap();
        std::fs::write(temp_dir.path().join("bad.json"), "{\"session_id\":").unwrap();
        assert!(repo.load("bad").await.is_err());
    }
}
