//! Provider router: turns a [`SelectionCriteria`] + [`Strategy`] into a
//! concrete provider adapter, dispatches completions/streams through it,
//! and stamps the result with [`RoutingInfo`].
//!
//! Adapter instances are expensive to build (they own an HTTP client) so
//! the router caches one per provider id.

pub mod strategy;

pub use strategy::Strategy;

use crate::config::registry::{Candidate, ProviderRegistry, SelectionCriteria};
use crate::core::types::Capability;
use crate::core::providers::{build_adapter, Provider};
use crate::core::types::{CompletionRequest, CompletionResponse, RoutingInfo, StreamChunk};
use crate::utils::error::{GatewayError, Result};
use dashmap::DashMap;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Outcome of a provider-selection pass: which provider, which model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingResult {
    pub provider_id: String,
    pub model_id: String,
}

/// Router-wide requirements merged into every incoming [`SelectionCriteria`].
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    pub required_capabilities: Vec<Capability>,
    /// Upper bound on candidates tried by [`ProviderRouter::complete_with_fallback`].
    pub max_retries: usize,
}

impl RouterConfig {
    fn max_retries_or_default(&self) -> usize {
        if self.max_retries == 0 {
            3
        } else {
            self.max_retries
        }
    }
}

pub struct ProviderRouter {
    registry: Arc<ProviderRegistry>,
    config: RouterConfig,
    adapters: DashMap<String, Arc<dyn Provider>>,
}

impl ProviderRouter {
    pub fn new(registry: Arc<ProviderRegistry>, config: RouterConfig) -> Self {
        Self { registry, config, adapters: DashMap::new() }
    }

    fn merged_criteria(&self, mut criteria: SelectionCriteria) -> SelectionCriteria {
        for cap in &self.config.required_capabilities {
            if !criteria.required_capabilities.contains(cap) {
                criteria.required_capabilities.push(*cap);
            }
        }
        criteria
    }

    fn best_candidate(&self, criteria: &SelectionCriteria, strategy: Strategy) -> Result<Candidate> {
        strategy
            .apply(&self.registry, criteria)
            .ok_or_else(|| GatewayError::validation("no provider satisfies the selection criteria"))
    }

    /// Adapter for `provider_id`, built and cached on first use.
    fn adapter_for(&self, provider_id: &str) -> Result<Arc<dyn Provider>> {
        if let Some(existing) = self.adapters.get(provider_id) {
            return Ok(existing.clone());
        }
        let config = self
            .registry
            .get(provider_id)
            .ok_or_else(|| GatewayError::validation(format!("unknown provider id: {provider_id}")))?;
        let adapter = build_adapter(config)?;
        self.adapters.insert(provider_id.to_string(), adapter.clone());
        Ok(adapter)
    }

    pub fn select_provider(&self, criteria: SelectionCriteria, strategy: Strategy) -> Result<RoutingResult> {
        let criteria = self.merged_criteria(criteria);
        let candidate = self.best_candidate(&criteria, strategy)?;
        Ok(RoutingResult { provider_id: candidate.provider_id, model_id: candidate.model.id })
    }

    /// Fill in the selected model id when the caller left it blank;
    /// otherwise the caller's explicit choice is preserved.
    fn request_for(&self, mut request: CompletionRequest, model_id: &str) -> CompletionRequest {
        if request.model.model.is_empty() {
            request.model.model = model_id.to_string();
        }
        request
    }

    pub async fn complete(
        &self,
        request: CompletionRequest,
        criteria: SelectionCriteria,
        strategy: Strategy,
    ) -> Result<CompletionResponse> {
        let routing = self.select_provider(criteria, strategy)?;
        let adapter = self.adapter_for(&routing.provider_id)?;
        let request = self.request_for(request, &routing.model_id);
        let mut response = adapter.complete(request).await?;
        response.routing_info = Some(RoutingInfo {
            provider_id: routing.provider_id,
            model_id: routing.model_id,
        });
        Ok(response)
    }

    /// Lazy stream whose first chunk only carries `routing_info`.
    pub async fn stream(
        &self,
        request: CompletionRequest,
        criteria: SelectionCriteria,
        strategy: Strategy,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let routing = self.select_provider(criteria, strategy)?;
        let adapter = self.adapter_for(&routing.provider_id)?;
        let request = self.request_for(request, &routing.model_id);
        let inner = adapter.stream(request).await?;

        let stamped = async_stream::stream! {
            let mut first = true;
            futures_util::pin_mut!(inner);
            while let Some(item) = inner.next().await {
                match item {
                    Ok(mut chunk) => {
                        if first {
                            chunk.routing_info = Some(RoutingInfo {
                                provider_id: routing.provider_id.clone(),
                                model_id: routing.model_id.clone(),
                            });
                            first = false;
                        }
                        yield Ok(chunk);
                    }
                    Err(e) => yield Err(e),
                }
            }
        };
        Ok(Box::pin(stamped))
    }

    /// Tries up to `maxRetries` candidates from `findModels(criteria)`,
    /// advancing forward only on a retryable error.
    pub async fn complete_with_fallback(
        &self,
        request: CompletionRequest,
        criteria: SelectionCriteria,
    ) -> Result<CompletionResponse> {
        let criteria = self.merged_criteria(criteria);
        let candidates = self.registry.find_models(&criteria);
        if candidates.is_empty() {
            return Err(GatewayError::validation("no provider satisfies the selection criteria"));
        }

        let max_retries = self.config.max_retries_or_default();
        let mut last_err: Option<GatewayError> = None;
        let mut attempts = 0usize;

        for candidate in candidates.into_iter().take(max_retries) {
            attempts += 1;
            let adapter = match self.adapter_for(&candidate.provider_id) {
                Ok(a) => a,
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };
            if !adapter.is_ready() {
                last_err = Some(GatewayError::validation(format!("{} is not ready", candidate.provider_id)));
                continue;
            }
            let attempt_request = self.request_for(request.clone(), &candidate.model.id);
            match adapter.complete(attempt_request).await {
                Ok(mut response) => {
                    response.routing_info = Some(RoutingInfo {
                        provider_id: candidate.provider_id,
                        model_id: candidate.model.id,
                    });
                    return Ok(response);
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    last_err = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let last_err = last_err.unwrap_or_else(|| GatewayError::internal("no candidate attempted"));
        Err(GatewayError::internal(format!(
            "All providers failed after {attempts} attempts: {last_err}"
        )))
    }

    /// `(inputTokens/1e6)·inputPrice + (outputTokens/1e6)·outputPrice` for
    /// the model `selectProvider` would currently pick.
    pub fn estimate_cost(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        criteria: SelectionCriteria,
        strategy: Strategy,
    ) -> Result<f64> {
        let criteria = self.merged_criteria(criteria);
        let candidate = self.best_candidate(&criteria, strategy)?;
        let input_cost = (input_tokens as f64 / 1_000_000.0) * candidate.model.input_price;
        let output_cost = (output_tokens as f64 / 1_000_000.0) * candidate.model.output_price;
        Ok(input_cost + output_cost)
    }

    /// Drops every cached adapter instance; the next dispatch rebuilds it.
    pub fn clear_cache(&self) {
        self.adapters.clear();
    }

    /// Best-effort cancellation of every cached adapter's in-flight
    /// request. Coarse-grained: the cache is keyed by provider id, not by
    /// caller, so this aborts in-flight work for all callers currently
    /// using a given provider.
    pub async fn cancel_all(&self) {
        for entry in self.adapters.iter() {
            entry.value().cancel().await;
        }
    }
}

/// Process-wide default router, built lazily over an empty registry that
/// callers populate via [`ProviderRegistry::load_dir`] / `upsert`.
pub static DEFAULT_ROUTER: Lazy<ProviderRouter> =
    Lazy::new(|| ProviderRouter::new(Arc::new(ProviderRegistry::new()), RouterConfig::default()));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::provider_config::{FeatureMatrix, ModelConfig, ProviderConfig, ProviderType};
    use crate::core::types::{CompletionRequest, Message};

    fn registry_with_one_provider() -> Arc<ProviderRegistry> {
        let registry = Arc::new(ProviderRegistry::new());
        registry.upsert_raw(ProviderConfig {
            id: "openai".into(),
            name: "OpenAI".into(),
            provider_type: ProviderType::OpenaiCompatible,
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            api_key: Some("sk-test".into()),
            features: FeatureMatrix::default(),
            models: vec![ModelConfig {
                id: "test-model".into(),
                display_name: "test-model".into(),
                context_window: 128_000,
                max_output_tokens: 4_096,
                input_price: 1.0,
                output_price: 2.0,
                capabilities: vec![Capability::Chat],
                default: true,
                release_date: None,
                aliases: vec![],
                deprecated: false,
            }],
        });
        registry
    }

    #[test]
    fn select_provider_returns_only_configured_candidate() {
        let router = ProviderRouter::new(registry_with_one_provider(), RouterConfig::default());
        let result = router
            .select_provider(SelectionCriteria::default(), Strategy::Balanced)
            .unwrap();
        assert_eq!(result.provider_id, "openai");
        assert_eq!(result.model_id, "test-model");
    }

    #[test]
    fn estimate_cost_matches_documented_example() {
        let router = ProviderRouter::new(registry_with_one_provider(), RouterConfig::default());
        let cost = router
            .estimate_cost(1_000_000, 500_000, SelectionCriteria::default(), Strategy::Balanced)
            .unwrap();
        assert_eq!(cost, 2.0);
    }

    #[test]
    fn select_provider_fails_when_no_candidate_satisfies_criteria() {
        let router = ProviderRouter::new(registry_with_one_provider(), RouterConfig::default());
        let criteria = SelectionCriteria {
            required_capabilities: vec![Capability::Vision],
            ..Default::default()
        };
        assert!(router.select_provider(criteria, Strategy::Balanced).is_err());
    }

    #[tokio::test]
    async fn complete_fills_in_blank_model_id_and_stamps_routing_info() {
        let router = ProviderRouter::new(registry_with_one_provider(), RouterConfig::default());
        let request = CompletionRequest::new(vec![Message::user("hi")]);
        assert!(request.model.model.is_empty());
        let filled = router.request_for(request, "test-model");
        assert_eq!(filled.model.model, "test-model");
    }

    #[test]
    fn clear_cache_empties_adapter_map() {
        let router = ProviderRouter::new(registry_with_one_provider(), RouterConfig::default());
        router.adapter_for("openai").unwrap();
        assert_eq!(router.adapters.len(), 1);
        router.clear_cache();
        assert_eq!(router.adapters.len(), 0);
    }

    #[tokio::test]
    async fn cancel_all_reaches_every_cached_adapter() {
        let router = ProviderRouter::new(registry_with_one_provider(), RouterConfig::default());
        router.adapter_for("openai").unwrap();
        router.cancel_all().await;
    }
}
