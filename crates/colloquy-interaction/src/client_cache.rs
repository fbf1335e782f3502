use crate::client_factory::ClientFactory;
use crate::client_spec::ClientSpec;
use colloquy_core::Result;
use colloquy_core::llm::ChatClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

type Slot = Arc<OnceCell<Arc<dyn ChatClient>>>;

/// Process-wide cache of live client handles keyed by [`ClientSpec`].
///
/// Each key owns a [`OnceCell`]: concurrent cold starts for the same key
/// wait on one construction instead of racing. A failed construction leaves
/// the slot empty so the next caller retries. Handles live until the cache
/// is dropped.
pub struct ClientCache {
    slots: RwLock<HashMap<ClientSpec, Slot>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the handle for `spec`, creating it with `factory` on first use.
    pub async fn get_or_create(
        &self,
        spec: &ClientSpec,
        factory: &dyn ClientFactory,
    ) -> Result<Arc<dyn ChatClient>> {
        let slot = self.slot(spec).await;
        let client = slot.get_or_try_init(|| factory.create(spec)).await?;
        Ok(Arc::clone(client))
    }

    /// Number of live handles.
    pub async fn len(&self) -> usize {
        let slots = self.slots.read().await;
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn slot(&self, spec: &ClientSpec) -> Slot {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(spec) {
                return Arc::clone(slot);
            }
        }

        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(spec.clone()).or_default())
    }
}

impl Default for ClientCache {
    fn default() -> Self {
        Self::new()
    }
}
