//! Unified provider interface and the three concrete wire adapters.
//!
//! # Design
//!
//! 1. **Request uniformity** — every adapter accepts the same
//!    [`CompletionRequest`] and returns the same [`CompletionResponse`] or
//!    [`StreamChunk`] stream.
//! 2. **Provider-agnostic callers** — the router and fallback layer never
//!    branch on provider identity; they only see `dyn Provider`.
//! 3. **Async first** — all network operations return futures.

pub mod anthropic;
pub mod google;
pub mod openai_compat;
pub mod sse;

use crate::config::ProviderConfig;
use crate::core::types::{CompletionRequest, CompletionResponse, ModelSelector, StreamChunk};
use crate::utils::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;

/// Uniform contract every wire adapter implements.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier matching the owning [`ProviderConfig::id`].
    fn id(&self) -> &str;

    /// Cheap readiness check — an API key is present, nothing more.
    fn is_ready(&self) -> bool;

    /// Non-streaming completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Streaming completion. The returned stream's first chunk carries
    /// `routing_info`; subsequent chunks leave it `None`.
    async fn stream(&self, request: CompletionRequest) -> Result<BoxStream<'static, Result<StreamChunk>>>;

    /// Heuristic token count for a request, used for pre-flight context
    /// checks and cost estimation.
    fn count_tokens(&self, request: &CompletionRequest) -> u32 {
        crate::core::types::estimate_tokens(&request.messages)
    }

    /// Model ids this adapter's owning config currently declares.
    fn model_ids(&self) -> Vec<String>;

    /// Best-effort cancellation of any in-flight request on this adapter.
    /// Adapters that can abort an upstream call override this; the
    /// default is a no-op.
    async fn cancel(&self) {}
}

/// Shared cancellation signal a wire adapter wires through its in-flight
/// upstream calls: `cancel()` wakes every call currently inside `guard`,
/// which then bails out with a non-retryable error instead of completing.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<Notify>);

impl CancelSignal {
    pub fn new() -> Self {
        Self(Arc::new(Notify::new()))
    }

    pub fn cancel(&self) {
        self.0.notify_waiters();
    }

    pub async fn guard<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            res = fut => res,
            _ = self.0.notified() => Err(crate::utils::GatewayError::validation("request cancelled")),
        }
    }
}

/// Build a concrete adapter for a configured provider.
///
/// The router owns a cache of these by provider id rather than
/// re-constructing a client per request.
pub fn build_adapter(config: ProviderConfig) -> Result<Arc<dyn Provider>> {
    use crate::config::ProviderType;
    match config.provider_type {
        ProviderType::Anthropic => Ok(Arc::new(anthropic::AnthropicProvider::new(config)?)),
        ProviderType::Google => Ok(Arc::new(google::GoogleProvider::new(config)?)),
        ProviderType::Openai | ProviderType::OpenaiCompatible => {
            Ok(Arc::new(openai_compat::OpenAiCompatibleProvider::new(config)?))
        }
    }
}

pub(crate) fn resolve_model(selector: &ModelSelector, default_model: Option<&str>) -> Result<String> {
    if !selector.model.is_empty() {
        return Ok(selector.model.clone());
    }
    default_model
        .map(|m| m.to_string())
        .ok_or_else(|| crate::utils::GatewayError::validation("no model specified and provider has no default model"))
}
