//! SQLite-backed chat and message store.
//!
//! A single connection guarded by a mutex; every statement runs on tokio's
//! blocking pool. The database runs in WAL mode so readers in other
//! processes never see a half-applied history replacement.

use async_trait::async_trait;
use colloquy_core::chat::{
    Chat, ChatKind, ChatRepository, Message, MessageRepository, MessageRole, NewMessage,
};
use colloquy_core::config::ChatSeed;
use colloquy_core::{ColloquyError, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, Transaction, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chats (
    chat_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    system_prompt TEXT,
    kind TEXT NOT NULL DEFAULT 'standard',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    agent_id TEXT,
    chat_id TEXT NOT NULL,
    message_type TEXT NOT NULL,
    name TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    message TEXT NOT NULL,
    prompt_tokens INTEGER NOT NULL DEFAULT 0,
    completion_tokens INTEGER NOT NULL DEFAULT 0,
    request_time REAL NOT NULL DEFAULT 0,
    price REAL NOT NULL DEFAULT 0,
    meta TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, id);
";

const MESSAGE_COLUMNS: &str = "id, chat_id, session_id, message_type, agent_id, name, timestamp, \
     message, prompt_tokens, completion_tokens, request_time, price, meta";

const CHAT_COLUMNS: &str = "chat_id, name, system_prompt, kind, created_at";

/// Maps rusqlite failures into the storage error kind.
trait SqlResultExt<T> {
    fn storage(self) -> Result<T>;
}

impl<T> SqlResultExt<T> for rusqlite::Result<T> {
    fn storage(self) -> Result<T> {
        self.map_err(|e| ColloquyError::storage(e.to_string()))
    }
}

/// Chats and messages in one SQLite database.
#[derive(Clone)]
pub struct SqliteConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    /// Opens (or creates) the database file and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).storage()?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .storage()?;
        tracing::debug!("[MessageStore] journal_mode={}", mode);
        tracing::info!("[MessageStore] Opened {}", path.display());
        Self::init(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().storage()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON").storage()?;
        conn.execute_batch(SCHEMA).storage()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Inserts `seeds` when the store has no chats yet.
    ///
    /// Returns the number of chats created.
    pub async fn seed_chats(&self, seeds: &[ChatSeed]) -> Result<usize> {
        let seeds = seeds.to_vec();
        self.run(move |conn| {
            let existing: i64 = conn
                .query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))
                .storage()?;
            if existing > 0 {
                return Ok(0);
            }

            let tx = conn.transaction().storage()?;
            for seed in &seeds {
                let mut chat = Chat::new(&seed.id, &seed.name, seed.kind);
                chat.system_prompt = seed.system_prompt.clone();
                insert_chat(&tx, &chat)?;
            }
            tx.commit().storage()?;

            tracing::info!("[MessageStore] Seeded {} chat(s)", seeds.len());
            Ok(seeds.len())
        })
        .await
    }

    async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| ColloquyError::storage("database connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| ColloquyError::storage(format!("Failed to spawn blocking task: {}", e)))?
    }
}

fn insert_message(conn: &Connection, message: NewMessage) -> Result<Message> {
    conn.execute(
        "INSERT INTO messages
         (chat_id, session_id, message_type, agent_id, name, timestamp, message,
          prompt_tokens, completion_tokens, request_time, price, meta)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            message.chat_id,
            message.session_id,
            message.role.to_string(),
            message.agent_id,
            message.name,
            message.timestamp,
            message.body,
            message.prompt_tokens,
            message.completion_tokens,
            message.request_time,
            message.price,
            message.meta,
        ],
    )
    .storage()?;
    Ok(message.into_message(conn.last_insert_rowid()))
}

fn insert_chat(conn: &Connection, chat: &Chat) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO chats (chat_id, name, system_prompt, kind, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            chat.id,
            chat.name,
            chat.system_prompt,
            chat.kind.to_string(),
            chat.created_at,
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            Err(ColloquyError::validation(format!(
                "chat '{}' already exists",
                chat.id
            )))
        }
        Err(e) => Err(ColloquyError::storage(e.to_string())),
    }
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    let data = NewMessage {
        chat_id: row.get(1)?,
        session_id: row.get(2)?,
        role: parse_column::<MessageRole>(row, 3)?,
        agent_id: row.get(4)?,
        name: row.get(5)?,
        timestamp: row.get(6)?,
        body: row.get(7)?,
        prompt_tokens: row.get(8)?,
        completion_tokens: row.get(9)?,
        request_time: row.get(10)?,
        price: row.get(11)?,
        meta: row.get(12)?,
    };
    Ok(data.into_message(id))
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        name: row.get(1)?,
        system_prompt: row.get(2)?,
        kind: parse_column::<ChatKind>(row, 3)?,
        created_at: row.get(4)?,
    })
}

fn update_prompt(tx: &Transaction<'_>, chat_id: &str, prompt: Option<&str>) -> Result<()> {
    let updated = tx
        .execute(
            "UPDATE chats SET system_prompt = ?2 WHERE chat_id = ?1",
            params![chat_id, prompt],
        )
        .storage()?;
    if updated == 0 {
        return Err(ColloquyError::not_found("chat", chat_id));
    }
    Ok(())
}

#[async_trait]
impl MessageRepository for SqliteConversationStore {
    async fn append(&self, message: NewMessage) -> Result<Message> {
        self.run(move |conn| insert_message(conn, message)).await
    }

    async fn list_by_chat(&self, chat_id: &str) -> Result<Vec<Message>> {
        let chat_id = chat_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = ?1 ORDER BY id"
                ))
                .storage()?;
            let rows = stmt
                .query_map(params![chat_id], message_from_row)
                .storage()?;
            rows.collect::<rusqlite::Result<Vec<_>>>().storage()
        })
        .await
    }

    async fn count_by_chat(&self, chat_id: &str) -> Result<usize> {
        let chat_id = chat_id.to_string();
        self.run(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
                    params![chat_id],
                    |row| row.get(0),
                )
                .storage()?;
            Ok(count as usize)
        })
        .await
    }

    async fn clear_chat(&self, chat_id: &str) -> Result<usize> {
        let chat_id = chat_id.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])
                .storage()
        })
        .await
    }

    async fn replace_history(
        &self,
        chat_id: &str,
        messages: Vec<NewMessage>,
        system_prompt: Option<&str>,
    ) -> Result<Vec<Message>> {
        let chat_id = chat_id.to_string();
        let system_prompt = system_prompt.map(str::to_string);
        self.run(move |conn| {
            let tx = conn.transaction().storage()?;

            let removed = tx
                .execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])
                .storage()?;

            let mut inserted = Vec::with_capacity(messages.len());
            for message in messages {
                if message.chat_id != chat_id {
                    return Err(ColloquyError::validation(format!(
                        "message for chat '{}' in history of '{}'",
                        message.chat_id, chat_id
                    )));
                }
                inserted.push(insert_message(&tx, message)?);
            }

            if let Some(prompt) = system_prompt.as_deref() {
                update_prompt(&tx, &chat_id, Some(prompt))?;
            }

            tx.commit().storage()?;
            tracing::debug!(
                "[MessageStore] Replaced {} message(s) of chat {} with {}",
                removed,
                chat_id,
                inserted.len()
            );
            Ok(inserted)
        })
        .await
    }
}

#[async_trait]
impl ChatRepository for SqliteConversationStore {
    async fn create(&self, chat: &Chat) -> Result<()> {
        let chat = chat.clone();
        self.run(move |conn| insert_chat(conn, &chat)).await
    }

    async fn find(&self, chat_id: &str) -> Result<Option<Chat>> {
        let chat_id = chat_id.to_string();
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE chat_id = ?1"),
                params![chat_id],
                chat_from_row,
            )
            .optional()
            .storage()
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Chat>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {CHAT_COLUMNS} FROM chats ORDER BY created_at, rowid"
                ))
                .storage()?;
            let rows = stmt.query_map([], chat_from_row).storage()?;
            rows.collect::<rusqlite::Result<Vec<_>>>().storage()
        })
        .await
    }

    async fn rename(&self, chat_id: &str, name: &str) -> Result<()> {
        let chat_id = chat_id.to_string();
        let name = name.to_string();
        self.run(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE chats SET name = ?2 WHERE chat_id = ?1",
                    params![chat_id, name],
                )
                .storage()?;
            if updated == 0 {
                return Err(ColloquyError::not_found("chat", chat_id));
            }
            Ok(())
        })
        .await
    }

    async fn update_system_prompt(&self, chat_id: &str, prompt: Option<&str>) -> Result<()> {
        let chat_id = chat_id.to_string();
        let prompt = prompt.map(str::to_string);
        self.run(move |conn| {
            let tx = conn.transaction().storage()?;
            update_prompt(&tx, &chat_id, prompt.as_deref())?;
            tx.commit().storage()
        })
        .await
    }

    async fn delete(&self, chat_id: &str) -> Result<bool> {
        let chat_id = chat_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction().storage()?;
            tx.execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])
                .storage()?;
            let deleted = tx
                .execute("DELETE FROM chats WHERE chat_id = ?1", params![chat_id])
                .storage()?;
            tx.commit().storage()?;
            Ok(deleted > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::chat::{DEFAULT_CHAT_ID, SUMMARY_TAG};
    use colloquy_core::config::AppConfig;
    use tempfile::TempDir;

    async fn store_with_chat(chat_id: &str) -> SqliteConversationStore {
        let store = SqliteConversationStore::open_in_memory().unwrap();
        store
            .create(&Chat::new(chat_id, "Test", ChatKind::Standard))
            .await
            .unwrap();
        store
    }

    fn user(chat_id: &str, body: &str) -> NewMessage {
        NewMessage::user(chat_id, "s1", "alice", body)
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let store = store_with_chat("c1").await;
        let first = store.append(user("c1", "one")).await.unwrap();
        let second = store.append(user("c1", "two")).await.unwrap();
        assert!(second.id > first.id);

        let listed = store.list_by_chat("c1").await.unwrap();
        assert_eq!(listed, vec![first, second]);
        assert_eq!(store.count_by_chat("c1").await.unwrap(), 2);
        assert_eq!(store.count_by_chat("other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_metering_columns_round_trip() {
        let store = store_with_chat("c1").await;
        let reply = NewMessage::ai("c1", "s1", "main", "Assistant", "hi")
            .with_metering(120, 30, 1.25, 0.0315)
            .with_meta("{\"model\":\"GigaChat-2\"}");
        let stored = store.append(reply.clone()).await.unwrap();

        let loaded = store.list_by_chat("c1").await.unwrap();
        assert_eq!(loaded[0].data, reply);
        assert_eq!(loaded[0].id, stored.id);
        assert_eq!(loaded[0].role(), MessageRole::Ai);
    }

    #[tokio::test]
    async fn test_replace_history_is_all_or_nothing() {
        let store = store_with_chat("c1").await;
        for i in 0..4 {
            store.append(user("c1", &i.to_string())).await.unwrap();
        }

        let summary = NewMessage::ai("c1", "s1", "summarizer", "Summarizer", "sum")
            .with_meta(SUMMARY_TAG);
        let replaced = store
            .replace_history(
                "c1",
                vec![summary, user("c1", "q"), user("c1", "a")],
                Some("new prompt"),
            )
            .await
            .unwrap();
        assert_eq!(replaced.len(), 3);
        assert!(replaced[0].is_summary());

        let listed = store.list_by_chat("c1").await.unwrap();
        assert_eq!(listed, replaced);
        let chat = store.find("c1").await.unwrap().unwrap();
        assert_eq!(chat.system_prompt.as_deref(), Some("new prompt"));
    }

    #[tokio::test]
    async fn test_failed_replace_rolls_back() {
        let store = SqliteConversationStore::open_in_memory().unwrap();
        // Messages for a chat row that does not exist: the prompt update fails
        // after the delete and the inserts have already run.
        store.append(user("ghost", "keep me")).await.unwrap();

        let err = store
            .replace_history("ghost", vec![user("ghost", "new")], Some("prompt"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let listed = store.list_by_chat("ghost").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].body(), "keep me");
    }

    #[tokio::test]
    async fn test_replace_rejects_foreign_messages() {
        let store = store_with_chat("c1").await;
        store.append(user("c1", "keep")).await.unwrap();

        let result = store
            .replace_history("c1", vec![user("c2", "wrong chat")], None)
            .await;
        assert!(result.is_err());
        assert_eq!(store.count_by_chat("c1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_chat() {
        let store = store_with_chat("c1").await;
        store.append(user("c1", "a")).await.unwrap();
        store.append(user("c1", "b")).await.unwrap();
        assert_eq!(store.clear_chat("c1").await.unwrap(), 2);
        assert_eq!(store.count_by_chat("c1").await.unwrap(), 0);
        assert!(store.find("c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_chat_crud() {
        let store = store_with_chat("c1").await;

        let duplicate = store
            .create(&Chat::new("c1", "Again", ChatKind::Direct))
            .await
            .unwrap_err();
        assert!(matches!(duplicate, ColloquyError::Validation(_)));

        store.rename("c1", "Renamed").await.unwrap();
        store.update_system_prompt("c1", Some("be brief")).await.unwrap();
        let chat = store.find("c1").await.unwrap().unwrap();
        assert_eq!(chat.name, "Renamed");
        assert_eq!(chat.system_prompt.as_deref(), Some("be brief"));

        store.update_system_prompt("c1", None).await.unwrap();
        assert!(store.find("c1").await.unwrap().unwrap().system_prompt.is_none());

        assert!(store.rename("missing", "x").await.unwrap_err().is_not_found());

        store.append(user("c1", "bye")).await.unwrap();
        assert!(store.delete("c1").await.unwrap());
        assert!(!store.delete("c1").await.unwrap());
        assert_eq!(store.count_by_chat("c1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seed_only_into_empty_store() {
        let store = SqliteConversationStore::open_in_memory().unwrap();
        let seeds = AppConfig::default().chats;

        assert_eq!(store.seed_chats(&seeds).await.unwrap(), 1);
        assert_eq!(store.seed_chats(&seeds).await.unwrap(), 0);

        let chats = store.list().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, DEFAULT_CHAT_ID);
        assert_eq!(chats[0].kind, ChatKind::Standard);
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db/colloquy.db");
        {
            let store = SqliteConversationStore::open(&path).unwrap();
            store
                .create(&Chat::new("c1", "Test", ChatKind::Tools))
                .await
                .unwrap();
            store.append(user("c1", "persisted")).await.unwrap();
        }

        let reopened = SqliteConversationStore::open(&path).unwrap();
        assert_eq!(reopened.count_by_chat("c1").await.unwrap(), 1);
        assert_eq!(
            reopened.find("c1").await.unwrap().unwrap().kind,
            ChatKind::Tools
        );
    }
}
