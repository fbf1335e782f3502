//! Provider I/O for Colloquy.
//!
//! HTTP clients for the model back-ends, the client cache and factory, the
//! token meter, tool providers and the [`ModelGateway`] that ties them
//! together.

pub mod client_cache;
pub mod client_factory;
pub mod client_spec;
pub mod gateway;
pub mod gigachat_client;
pub mod http;
pub mod meter;
pub mod ollama_client;
pub mod tools;

pub use client_cache::ClientCache;
pub use client_factory::{ClientFactory, ProviderClientFactory};
pub use client_spec::ClientSpec;
pub use gateway::{MAX_TOOL_ROUNDS, ModelGateway};
pub use meter::TokenMeter;
pub use tools::{HttpToolProvider, ToolProvider, ToolRegistry, extract_params};
