//! Per-chat turn serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Keyed map of async mutexes, one per chat id.
///
/// Turns on the same chat run one at a time; turns on different chats run
/// in parallel. An entry lives only while some task holds or waits for it,
/// so ids of unknown or deleted chats do not accumulate.
#[derive(Default)]
pub struct ChatLocks {
    locks: Mutex<LockMap>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `chat_id`. Released when the guard drops.
    pub async fn acquire(&self, chat_id: &str) -> ChatGuard<'_> {
        let lock = Arc::clone(self.map().entry(chat_id.to_string()).or_default());
        let guard = lock.lock_owned().await;
        ChatGuard {
            locks: self,
            chat_id: chat_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of chats currently locked or awaited.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map().len()
    }

    // The map is only touched in short, non-async sections.
    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, chat_id: &str) {
        let mut map = self.map();
        // Waiters clone the entry under the map lock, so a count of one
        // means nobody else holds or awaits this chat.
        if map
            .get(chat_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(chat_id);
        }
    }
}

/// Exclusive access to one chat.
pub struct ChatGuard<'a> {
    locks: &'a ChatLocks,
    chat_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ChatGuard<'_> {
    fn drop(&mut self) {
        // Drop our handle first so it does not count as a holder.
        self.guard.take();
        self.locks.release(&self.chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_chat_is_exclusive() {
        let locks = Arc::new(ChatLocks::new());
        let guard = locks.acquire("a").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_other_chats_are_independent() {
        let locks = ChatLocks::new();
        let a = locks.acquire("a").await;
        let b = locks.acquire("b").await;
        assert_eq!(locks.len(), 2);

        drop(b);
        assert_eq!(locks.len(), 1);
        drop(a);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_entry_survives_while_a_waiter_is_queued() {
        let locks = Arc::new(ChatLocks::new());
        let guard = locks.acquire("a").await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("a").await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        // The waiter still holds the entry.
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }
}
