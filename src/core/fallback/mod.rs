//! Fallback wrapper + circuit breaker: composes a primary adapter and an
//! ordered list of fallbacks behind the same [`Provider`] contract,
//! advancing forward on retryable failure and never retrying a stream
//! once it has yielded data.

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

use crate::core::providers::Provider;
use crate::core::types::{CompletionRequest, CompletionResponse, StreamChunk};
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::error::{GatewayError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;

/// Fires once per provider switch: `(failed_id, error, next_id)`.
pub type FallbackHook = Arc<dyn Fn(&str, &GatewayError, &str) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct FallbackConfig {
    pub enable_fallback: bool,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { enable_fallback: true, circuit_breaker: CircuitBreakerConfig::default() }
    }
}

pub struct FallbackProvider {
    primary: Arc<dyn Provider>,
    fallbacks: Vec<Arc<dyn Provider>>,
    config: FallbackConfig,
    clock: Arc<dyn Clock>,
    circuits: Arc<DashMap<String, CircuitBreaker>>,
    on_fallback: Option<FallbackHook>,
}

impl FallbackProvider {
    pub fn new(primary: Arc<dyn Provider>, fallbacks: Vec<Arc<dyn Provider>>, config: FallbackConfig) -> Self {
        Self {
            primary,
            fallbacks,
            config,
            clock: Arc::new(SystemClock),
            circuits: Arc::new(DashMap::new()),
            on_fallback: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_on_fallback(mut self, hook: FallbackHook) -> Self {
        self.on_fallback = Some(hook);
        self
    }

    fn ready_providers(&self) -> Vec<Arc<dyn Provider>> {
        std::iter::once(&self.primary)
            .chain(self.fallbacks.iter())
            .filter(|p| p.is_ready())
            .cloned()
            .collect()
    }

    fn breaker_allows(&self, provider_id: &str) -> bool {
        let entry = self
            .circuits
            .entry(provider_id.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.config.circuit_breaker, self.clock.clone()));
        entry.allow_request()
    }

    fn record_success(&self, provider_id: &str) {
        if let Some(entry) = self.circuits.get(provider_id) {
            entry.record_success();
        }
    }

    fn record_failure(&self, provider_id: &str) {
        if let Some(entry) = self.circuits.get(provider_id) {
            entry.record_failure();
        }
    }

    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let providers = self.ready_providers();
        if providers.is_empty() {
            return Err(GatewayError::validation("No providers are configured or ready"));
        }
        if !self.config.enable_fallback {
            return self.primary.complete(request).await;
        }

        let mut last_err: Option<GatewayError> = None;
        for (i, provider) in providers.iter().enumerate() {
            if !self.breaker_allows(provider.id()) {
                continue;
            }
            match provider.complete(request.clone()).await {
                Ok(response) => {
                    self.record_success(provider.id());
                    return Ok(response);
                }
                Err(e) => {
                    if e.trips_circuit() {
                        self.record_failure(provider.id());
                    }
                    let retryable = e.is_retryable();
                    let has_next = providers.get(i + 1).is_some();
                    if has_next && retryable {
                        if let Some(hook) = &self.on_fallback {
                            hook(provider.id(), &e, providers[i + 1].id());
                        }
                        last_err = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| GatewayError::validation("No providers are configured or ready")))
    }

    pub async fn stream(&self, request: CompletionRequest) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let providers = self.ready_providers();
        if providers.is_empty() {
            return Err(GatewayError::validation("No providers are configured or ready"));
        }
        if !self.config.enable_fallback {
            return self.primary.stream(request).await;
        }

        let circuits = self.circuits.clone();
        let clock = self.clock.clone();
        let cb_config = self.config.circuit_breaker;
        let on_fallback = self.on_fallback.clone();

        let combined = async_stream::stream! {
            for (i, provider) in providers.iter().enumerate() {
                let allowed = {
                    let entry = circuits
                        .entry(provider.id().to_string())
                        .or_insert_with(|| CircuitBreaker::new(cb_config, clock.clone()));
                    entry.allow_request()
                };
                if !allowed {
                    continue;
                }

                let mut provider_stream = match provider.stream(request.clone()).await {
                    Ok(s) => s,
                    Err(e) => {
                        if e.trips_circuit() {
                            if let Some(entry) = circuits.get(provider.id()) { entry.record_failure(); }
                        }
                        let retryable = e.is_retryable();
                        if i + 1 < providers.len() && retryable {
                            if let Some(hook) = &on_fallback { hook(provider.id(), &e, providers[i + 1].id()); }
                            continue;
                        }
                        yield Err(e);
                        return;
                    }
                };

                let mut yielded_any = false;
                let mut broke_mid_stream = false;
                while let Some(item) = provider_stream.next().await {
                    match item {
                        Ok(chunk) => {
                            yielded_any = true;
                            yield Ok(chunk);
                        }
                        Err(e) => {
                            if e.trips_circuit() {
                                if let Some(entry) = circuits.get(provider.id()) { entry.record_failure(); }
                            }
                            if yielded_any {
                                yield Err(GatewayError::internal(format!(
                                    "Stream interrupted after partial data: {e}"
                                )));
                                return;
                            }
                            let retryable = e.is_retryable();
                            if i + 1 < providers.len() && retryable {
                                if let Some(hook) = &on_fallback { hook(provider.id(), &e, providers[i + 1].id()); }
                                broke_mid_stream = true;
                                break;
                            }
                            yield Err(e);
                            return;
                        }
                    }
                }

                if broke_mid_stream {
                    continue;
                }
                if yielded_any {
                    if let Some(entry) = circuits.get(provider.id()) { entry.record_success(); }
                    return;
                }
            }

            yield Err(GatewayError::internal("All providers failed or were unavailable"));
        };

        Ok(Box::pin(combined))
    }

    pub fn is_ready(&self) -> bool {
        self.primary.is_ready() || self.fallbacks.iter().any(|p| p.is_ready())
    }

    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .ready_providers()
            .iter()
            .flat_map(|p| p.model_ids())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Forwards cancellation to the primary and every fallback adapter.
    pub async fn cancel(&self) {
        self.primary.cancel().await;
        for fallback in &self.fallbacks {
            fallback.cancel().await;
        }
    }
}

#[async_trait]
impl Provider for FallbackProvider {
    fn id(&self) -> &str {
        self.primary.id()
    }

    fn is_ready(&self) -> bool {
        FallbackProvider::is_ready(self)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        FallbackProvider::complete(self, request).await
    }

    async fn stream(&self, request: CompletionRequest) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        FallbackProvider::stream(self, request).await
    }

    fn count_tokens(&self, request: &CompletionRequest) -> u32 {
        self.primary.count_tokens(request)
    }

    fn model_ids(&self) -> Vec<String> {
        FallbackProvider::model_ids(self)
    }

    async fn cancel(&self) {
        FallbackProvider::cancel(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CompletionResponse, FinishReason, Message, Usage};
    use crate::utils::clock::TestClock;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        provider_id: &'static str,
        ready: bool,
        responses: std::sync::Mutex<Vec<Result<CompletionResponse>>>,
        calls: AtomicUsize,
        cancels: AtomicUsize,
    }

    impl StubProvider {
        fn new(provider_id: &'static str, responses: Vec<Result<CompletionResponse>>) -> Self {
            Self {
                provider_id,
                ready: true,
                responses: std::sync::Mutex::new(responses),
                calls: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn id(&self) -> &str {
            self.provider_id
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(GatewayError::internal("stub exhausted"));
            }
            responses.remove(0)
        }

        async fn stream(&self, _request: CompletionRequest) -> Result<BoxStream<'static, Result<StreamChunk>>> {
            Ok(Box::pin(stream::empty()))
        }

        fn model_ids(&self) -> Vec<String> {
            vec!["stub-model".into()]
        }

        async fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn response(content: &str) -> CompletionResponse {
        CompletionResponse {
            id: "r1".into(),
            content: content.into(),
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
            model: "stub-model".into(),
            created: 0,
            thinking: None,
            thinking_blocks: vec![],
            routing_info: None,
        }
    }

    #[tokio::test]
    async fn falls_back_to_next_provider_on_retryable_error() {
        let primary = Arc::new(StubProvider::new(
            "openai",
            vec![Err(GatewayError::internal("rate limit 429"))],
        ));
        let fallback = Arc::new(StubProvider::new("anthropic", vec![Ok(response("from anthropic"))]));
        let wrapper = FallbackProvider::new(primary, vec![fallback], FallbackConfig::default());

        let result = wrapper
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(result.content, "from anthropic");
    }

    #[tokio::test]
    async fn non_retryable_error_stops_without_trying_fallback() {
        let primary = Arc::new(StubProvider::new(
            "openai",
            vec![Err(GatewayError::validation("bad request"))],
        ));
        let fallback = Arc::new(StubProvider::new("anthropic", vec![Ok(response("should not run"))]));
        let wrapper = FallbackProvider::new(primary, vec![fallback], FallbackConfig::default());

        let err = wrapper
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_and_skips_primary() {
        let primary = Arc::new(StubProvider::new(
            "openai",
            vec![
                Err(GatewayError::internal("boom")),
                Err(GatewayError::internal("boom")),
                Err(GatewayError::internal("boom")),
            ],
        ));
        let fallback = Arc::new(StubProvider::new(
            "anthropic",
            vec![
                Err(GatewayError::internal("boom")),
                Err(GatewayError::internal("boom")),
                Err(GatewayError::internal("boom")),
                Ok(response("finally")),
            ],
        ));
        let clock = Arc::new(TestClock::new());
        let config = FallbackConfig {
            enable_fallback: true,
            circuit_breaker: CircuitBreakerConfig { failure_threshold: 3, cooldown: std::time::Duration::from_secs(60) },
        };
        let wrapper = FallbackProvider::new(primary.clone(), vec![fallback], config).with_clock(clock);

        for _ in 0..3 {
            let _ = wrapper.complete(CompletionRequest::new(vec![Message::user("hi")])).await;
        }
        assert_eq!(primary.calls.load(Ordering::SeqCst), 3);

        // 4th call: primary's circuit should now be open and skipped entirely.
        let _ = wrapper.complete(CompletionRequest::new(vec![Message::user("hi")])).await;
        assert_eq!(primary.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancel_forwards_to_primary_and_every_fallback() {
        let primary = Arc::new(StubProvider::new("openai", vec![]));
        let fallback = Arc::new(StubProvider::new("anthropic", vec![]));
        let wrapper = FallbackProvider::new(primary.clone(), vec![fallback.clone()], FallbackConfig::default());

        wrapper.cancel().await;

        assert_eq!(primary.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.cancels.load(Ordering::SeqCst), 1);
    }
}
