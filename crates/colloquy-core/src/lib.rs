//! Domain types and contracts for the Colloquy conversational backend.

pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod session;

pub use error::{ColloquyError, Result};
