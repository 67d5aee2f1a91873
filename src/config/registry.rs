//! Provider config registry: loads provider files, resolves keys, and
//! scores models against a [`SelectionCriteria`].

use super::canonical::lookup as canonical_lookup;
use super::provider_config::{ModelConfig, ProviderConfig};
use crate::core::types::Capability;
use crate::utils::error::{GatewayError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Task-type hint used to bias the balanced-strategy scoring formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Code,
    Reasoning,
    Analysis,
    Creative,
    Chat,
}

/// Criteria a request's model selection must satisfy.
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    pub required_capabilities: Vec<Capability>,
    pub preferred_providers: Vec<String>,
    pub excluded_providers: Vec<String>,
    pub max_input_price: Option<f64>,
    pub max_output_price: Option<f64>,
    pub min_context_window: Option<u32>,
    pub task_type: Option<TaskType>,
}

/// A candidate (provider, model) pair that survived filtering.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider_id: String,
    pub model: ModelConfig,
    pub score: i64,
}

/// In-memory, read-mostly snapshot of all configured providers.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, ProviderConfig>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` file in `dir` as a [`ProviderConfig`], apply
    /// canonical overrides, resolve API keys from the environment, and
    /// replace the current snapshot atomically. Malformed files are
    /// skipped (logged), not fatal.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let mut loaded = HashMap::new();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| GatewayError::internal(format!("reading config dir {dir:?}: {e}")))?;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("skipping unreadable directory entry: {e}");
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<ProviderConfig>(&content) {
                    Ok(mut cfg) => {
                        self.apply_canonical_and_env(&mut cfg);
                        cfg.normalize_defaults();
                        loaded.insert(cfg.id.clone(), cfg);
                    }
                    Err(e) => warn!("skipping malformed provider config {path:?}: {e}"),
                },
                Err(e) => warn!("skipping unreadable provider config {path:?}: {e}"),
            }
        }

        info!("loaded {} provider config(s) from {:?}", loaded.len(), dir);
        let count = loaded.len();
        *self.providers.write() = loaded;
        Ok(count)
    }

    /// Insert or replace a single provider config directly (used by
    /// tests, and by hot reload of an individual file).
    pub fn upsert(&self, mut cfg: ProviderConfig) {
        self.apply_canonical_and_env(&mut cfg);
        cfg.normalize_defaults();
        self.providers.write().insert(cfg.id.clone(), cfg);
    }

    /// Insert a config exactly as given, skipping canonical-override and
    /// environment-key resolution. Used by tests that want to control
    /// `api_key`/`provider_type` directly without touching process
    /// environment variables.
    #[cfg(test)]
    pub fn upsert_raw(&self, mut cfg: ProviderConfig) {
        cfg.normalize_defaults();
        self.providers.write().insert(cfg.id.clone(), cfg);
    }

    /// Drop every loaded provider. Used by tests to guarantee isolation
    /// between cases that each load their own fixture directory.
    pub fn clear_cache(&self) {
        self.providers.write().clear();
    }

    fn apply_canonical_and_env(&self, cfg: &mut ProviderConfig) {
        if let Some(canon) = canonical_lookup(&cfg.id) {
            cfg.provider_type = canon.provider_type;
            cfg.base_url = canon.base_url.to_string();
            cfg.api_key_env = canon.api_key_env.to_string();
        }
        cfg.api_key = std::env::var(&cfg.api_key_env).ok().filter(|v| !v.is_empty());
    }

    /// All providers with a resolved API key.
    pub fn list_configured(&self) -> Vec<ProviderConfig> {
        self.providers
            .read()
            .values()
            .filter(|p| p.is_configured())
            .cloned()
            .collect()
    }

    /// Look up a provider by id, configured or not.
    pub fn get(&self, id: &str) -> Option<ProviderConfig> {
        self.providers.read().get(id).cloned()
    }

    /// Every (provider, model) pair surviving capability/price/context
    /// filters and exclusion, scored and sorted by descending score (ties
    /// keep insertion/provider order).
    pub fn find_models(&self, criteria: &SelectionCriteria) -> Vec<Candidate> {
        let providers = self.list_configured();
        let mut candidates = Vec::new();

        for provider in &providers {
            if criteria
                .excluded_providers
                .iter()
                .any(|e| e == &provider.id)
            {
                continue;
            }
            for model in &provider.models {
                if model.deprecated {
                    continue;
                }
                if !criteria
                    .required_capabilities
                    .iter()
                    .all(|c| model.has_capability(*c))
                {
                    continue;
                }
                if let Some(cap) = criteria.max_input_price {
                    if model.input_price > cap {
                        continue;
                    }
                }
                if let Some(cap) = criteria.max_output_price {
                    if model.output_price > cap {
                        continue;
                    }
                }
                if let Some(min_ctx) = criteria.min_context_window {
                    if model.context_window < min_ctx {
                        continue;
                    }
                }
                let score = score_model(model, provider, criteria);
                candidates.push(Candidate {
                    provider_id: provider.id.clone(),
                    model: model.clone(),
                    score,
                });
            }
        }

        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates
    }

    /// `selectBestModel`: the highest-scoring candidate under `criteria`.
    pub fn select_best_model(&self, criteria: &SelectionCriteria) -> Option<Candidate> {
        self.find_models(criteria).into_iter().next()
    }

    /// Cheapest strategy: capability-filtered, sorted by
    /// `inputPrice + outputPrice` ascending.
    pub fn cheapest(&self, criteria: &SelectionCriteria) -> Option<Candidate> {
        let mut candidates = self.find_models(criteria);
        candidates.sort_by(|a, b| {
            let pa = a.model.input_price + a.model.output_price;
            let pb = b.model.input_price + b.model.output_price;
            pa.partial_cmp(&pb).unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.into_iter().next()
    }

    /// Fastest strategy: `selectBestModel` with a hardcoded preference
    /// order favoring LPU/burst backends.
    pub fn fastest(&self, criteria: &SelectionCriteria) -> Option<Candidate> {
        let mut c = criteria.clone();
        c.preferred_providers = vec![
            "groq".to_string(),
            "fireworks-ai".to_string(),
            "togetherai".to_string(),
            "deepseek".to_string(),
        ];
        self.select_best_model(&c)
    }

    /// Smartest strategy: first try with `reasoning` required against a
    /// high-quality preference order; on miss, retry without `reasoning`.
    pub fn smartest(&self, criteria: &SelectionCriteria) -> Option<Candidate> {
        let mut with_reasoning = criteria.clone();
        if !with_reasoning
            .required_capabilities
            .contains(&Capability::Reasoning)
        {
            with_reasoning.required_capabilities.push(Capability::Reasoning);
        }
        with_reasoning.preferred_providers = vec![
            "anthropic".to_string(),
            "openai".to_string(),
            "deepseek".to_string(),
        ];
        if let Some(found) = self.select_best_model(&with_reasoning) {
            return Some(found);
        }

        let mut fallback = criteria.clone();
        fallback.preferred_providers = vec![
            "anthropic".to_string(),
            "openai".to_string(),
            "google".to_string(),
        ];
        self.select_best_model(&fallback)
    }

    /// Balanced strategy: plain `selectBestModel`.
    pub fn balanced(&self, criteria: &SelectionCriteria) -> Option<Candidate> {
        self.select_best_model(criteria)
    }

    /// The provider's resolved default model id.
    pub fn provider_default_model(&self, provider_id: &str) -> Option<String> {
        self.get(provider_id)
            .and_then(|p| p.default_model_id().map(|s| s.to_string()))
    }
}

/// Scoring formula: weighs capability match, price, and context window
/// against the requested [`SelectionCriteria`].
fn score_model(model: &ModelConfig, provider: &ProviderConfig, criteria: &SelectionCriteria) -> i64 {
    let mut score: i64 = 0;

    // +10 per required capability met.
    score += 10 * criteria
        .required_capabilities
        .iter()
        .filter(|c| model.has_capability(**c))
        .count() as i64;

    // +20*(preference-rank), first entry highest.
    if let Some(pos) = criteria
        .preferred_providers
        .iter()
        .position(|p| p == &provider.id)
    {
        let rank = (criteria.preferred_providers.len() - pos) as i64;
        score += 20 * rank;
    }

    // Task-type bonus.
    if let Some(task) = criteria.task_type {
        score += match task {
            TaskType::Code => {
                if model.has_capability(Capability::Code) {
                    15
                } else {
                    0
                }
            }
            TaskType::Reasoning => {
                if model.has_capability(Capability::Reasoning) {
                    20
                } else {
                    0
                }
            }
            TaskType::Analysis => {
                if model.has_capability(Capability::Vision) {
                    10
                } else if model.has_capability(Capability::Reasoning) {
                    15
                } else {
                    5
                }
            }
            TaskType::Creative => {
                if model.context_window > 100_000 {
                    10
                } else {
                    5
                }
            }
            TaskType::Chat => {
                if model.has_capability(Capability::Chat) {
                    5
                } else {
                    0
                }
            }
        };
    }

    // +5 if the model is the provider default.
    if model.default {
        score += 5;
    }

    // Price efficiency, floored at 0.
    let avg_price = model.avg_price();
    score += (20.0 - avg_price).max(0.0) as i64;

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::provider_config::{FeatureMatrix, ProviderType};

    fn provider(id: &str, models: Vec<ModelConfig>) -> ProviderConfig {
        let mut cfg = ProviderConfig {
            id: id.into(),
            name: id.into(),
            provider_type: ProviderType::OpenaiCompatible,
            base_url: "https://x".into(),
            api_key_env: format!("{}_KEY", id.to_uppercase()),
            api_key: Some("present".into()),
            features: FeatureMatrix::default(),
            models,
        };
        cfg.normalize_defaults();
        cfg
    }

    fn model(id: &str, caps: Vec<Capability>, input: f64, output: f64, default: bool) -> ModelConfig {
        ModelConfig {
            id: id.into(),
            display_name: id.into(),
            context_window: 32_000,
            max_output_tokens: 4_096,
            input_price: input,
            output_price: output,
            capabilities: caps,
            default,
            release_date: None,
            aliases: vec![],
            deprecated: false,
        }
    }

    #[test]
    fn empty_capability_set_excludes_nothing_on_capability_grounds() {
        let registry = ProviderRegistry::new();
        registry.upsert_raw(provider(
            "testprov",
            vec![model("gpt", vec![], 1.0, 2.0, true)],
        ));
        let criteria = SelectionCriteria::default();
        let candidates = registry.find_models(&criteria);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn price_efficiency_floors_at_zero() {
        let registry = ProviderRegistry::new();
        registry.upsert_raw(provider(
            "openai",
            vec![model("expensive", vec![Capability::Chat], 50.0, 50.0, true)],
        ));
        let candidates = registry.find_models(&SelectionCriteria::default());
        // avg_price = 50, 20 - 50 = -30 -> floored to 0, plus 5 (default)
        assert_eq!(candidates[0].score, 5);
    }

    #[test]
    fn tie_break_keeps_earlier_declared_order() {
        let registry = ProviderRegistry::new();
        registry.upsert_raw(provider(
            "openai",
            vec![
                model("a", vec![Capability::Chat], 1.0, 1.0, false),
                model("b", vec![Capability::Chat], 1.0, 1.0, false),
            ],
        ));
        let candidates = registry.find_models(&SelectionCriteria::default());
        assert_eq!(candidates[0].score, candidates[1].score);
        assert_eq!(candidates[0].model.id, "a");
    }

    #[test]
    fn cheapest_sorts_by_combined_price() {
        let registry = ProviderRegistry::new();
        registry.upsert_raw(provider(
            "openai",
            vec![
                model("pricey", vec![Capability::Chat], 10.0, 10.0, false),
                model("cheap", vec![Capability::Chat], 0.5, 0.5, false),
            ],
        ));
        let best = registry.cheapest(&SelectionCriteria::default()).unwrap();
        assert_eq!(best.model.id, "cheap");
    }

    #[test]
    fn default_model_resolution_prefers_marked_default() {
        let registry = ProviderRegistry::new();
        registry.upsert_raw(provider(
            "openai",
            vec![
                model("a", vec![], 1.0, 1.0, false),
                model("b", vec![], 1.0, 1.0, true),
            ],
        ));
        assert_eq!(
            registry.provider_default_model("openai"),
            Some("b".to_string())
        );
    }
}
