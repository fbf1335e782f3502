//! Agent configuration and the model catalog.

pub mod builder;
pub mod config;
pub mod model;

pub use builder::{AgentBuilder, DEFAULT_TEMPERATURE, MAX_TEMPERATURE, MIN_TEMPERATURE};
pub use config::AgentConfig;
pub use model::{
    GIGACHAT_MAX, GIGACHAT_PRO, GIGACHAT_STANDARD, ModelCatalog, ModelEntry, ModelTier,
    ProviderKind,
};
