//! Session repository trait.

use super::model::SessionRecord;
use crate::error::Result;
use async_trait::async_trait;

/// A change applied to one record by [`SessionRepository::update`].
pub type SessionMutation = Box<dyn FnOnce(&mut SessionRecord) + Send>;

/// Durable storage for [`SessionRecord`]s, one record per session id.
///
/// Implementations must never expose a partially written record: a save
/// either replaces the previous record entirely or leaves it untouched.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Loads a record.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(SessionRecord))`: Record found
    /// - `Ok(None)`: No record stored for this id
    /// - `Err(_)`: The record exists but could not be read
    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Read-modify-write of one record.
    ///
    /// A missing record starts as [`SessionRecord::new`]. The load, the
    /// mutation and the write happen under an exclusive lock on the record,
    /// so concurrent updates (from this process or another) never lose a
    /// write.
    ///
    /// # Returns
    ///
    /// The record as written.
    async fn update(&self, session_id: &str, mutation: SessionMutation) -> Result<SessionRecord>;

    /// Deletes a record. Returns whether one existed.
    async fn delete(&self, session_id: &str) -> Result<bool>;
}
