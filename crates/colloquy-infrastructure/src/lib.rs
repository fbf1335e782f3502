//! Storage and configuration adapters for Colloquy.

pub mod file_session_repository;
pub mod paths;
pub mod sqlite_store;
pub mod storage;

pub use file_session_repository::FileSessionRepository;
pub use paths::ColloquyPaths;
pub use sqlite_store::SqliteConversationStore;
pub use storage::{AtomicJsonFile, ConfigStorage, SecretStorage};
