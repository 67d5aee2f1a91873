//! Core dispatch fabric: types, provider adapters, router, fallback, events.

pub mod collaborators;
pub mod events;
pub mod fallback;
pub mod providers;
pub mod router;
pub mod types;

pub use fallback::FallbackProvider;
pub use providers::Provider;
pub use router::{ProviderRouter, RoutingResult};
pub use types::{CompletionRequest, CompletionResponse, Message, StreamChunk};
