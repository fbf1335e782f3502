//! Application layer for Colloquy.
//!
//! Use cases that coordinate the domain types, the stores and the model
//! gateway: sessions, turn processing with history compaction, and chat
//! administration. [`AppContext`] wires them together.

pub mod chat_locks;
pub mod context;
pub mod conversation_service;
pub mod session_service;
pub mod turn;

pub use chat_locks::ChatLocks;
pub use context::AppContext;
pub use conversation_service::ConversationService;
pub use session_service::SessionService;
pub use turn::{ProcessorRegistry, TurnProcessor, TurnRequest};
