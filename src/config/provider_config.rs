//! `ProviderConfig` / `ModelConfig`: the on-disk shape of a provider entry.

use crate::core::types::Capability;
use serde::{Deserialize, Serialize};

/// The wire family a provider belongs to. Determines which adapter the
/// router's factory constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    Openai,
    Anthropic,
    Google,
    OpenaiCompatible,
}

/// Feature matrix describing what a provider's wire protocol supports,
/// independent of any one model's capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureMatrix {
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub tool_use: bool,
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub json_mode: bool,
    #[serde(default)]
    pub system_message: bool,
}

/// A single model entry under a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub display_name: String,
    pub context_window: u32,
    pub max_output_tokens: u32,
    pub input_price: f64,
    pub output_price: f64,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
}

impl ModelConfig {
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    pub fn avg_price(&self) -> f64 {
        (self.input_price + self.output_price) / 2.0
    }
}

/// A provider entry: identity, wire config, and its model catalog.
///
/// Invariant: exactly one model may carry `default = true`. If more than
/// one is marked on load, only the first in sort order by `id` retains it
/// — see [`ProviderConfig::normalize_defaults`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    pub base_url: String,
    pub api_key_env: String,
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub features: FeatureMatrix,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl ProviderConfig {
    /// Enforce the single-default invariant: if more than one model is
    /// marked `default`, keep the first in `id` sort order and clear the
    /// rest.
    pub fn normalize_defaults(&mut self) {
        let mut ids_with_default: Vec<&str> = self
            .models
            .iter()
            .filter(|m| m.default)
            .map(|m| m.id.as_str())
            .collect();
        if ids_with_default.len() <= 1 {
            return;
        }
        ids_with_default.sort_unstable();
        let keep = ids_with_default[0].to_string();
        for model in &mut self.models {
            if model.default && model.id != keep {
                model.default = false;
            }
        }
    }

    /// Resolve the provider's default model id: the model with
    /// `default = true`, or the first declared model if none is marked.
    pub fn default_model_id(&self) -> Option<&str> {
        self.models
            .iter()
            .find(|m| m.default)
            .or_else(|| self.models.first())
            .map(|m| m.id.as_str())
    }

    /// A provider is "configured" (ready to be listed/used) iff its API
    /// key has been resolved from the environment.
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, default: bool) -> ModelConfig {
        ModelConfig {
            id: id.to_string(),
            display_name: id.to_string(),
            context_window: 8_000,
            max_output_tokens: 1_000,
            input_price: 1.0,
            output_price: 2.0,
            capabilities: vec![Capability::Chat],
            default,
            release_date: None,
            aliases: vec![],
            deprecated: false,
        }
    }

    #[test]
    fn normalize_defaults_keeps_first_in_sort_order() {
        let mut cfg = ProviderConfig {
            id: "p".into(),
            name: "P".into(),
            provider_type: ProviderType::OpenaiCompatible,
            base_url: "https://x".into(),
            api_key_env: "X_KEY".into(),
            api_key: None,
            features: FeatureMatrix::default(),
            models: vec![model("zeta", true), model("alpha", true)],
        };
        cfg.normalize_defaults();
        let defaults: Vec<&str> = cfg
            .models
            .iter()
            .filter(|m| m.default)
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(defaults, vec!["alpha"]);
    }

    #[test]
    fn default_model_falls_back_to_first_declared() {
        let cfg = ProviderConfig {
            id: "p".into(),
            name: "P".into(),
            provider_type: ProviderType::OpenaiCompatible,
            base_url: "https://x".into(),
            api_key_env: "X_KEY".into(),
            api_key: None,
            features: FeatureMatrix::default(),
            models: vec![model("first", false), model("second", false)],
        };
        assert_eq!(cfg.default_model_id(), Some("first"));
    }
}
