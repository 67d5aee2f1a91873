//! Canonical provider override table.
//!
//! These entries always win over both sync data and on-disk config, so a
//! misconfigured sync can never point a known provider at the wrong wire
//! format. This is a table, not code, deliberately — the same discipline
//! the legacy event-forwarding table follows.

use super::provider_config::ProviderType;

/// One canonical entry: `(id, type, base_url, api_key_env)`.
pub struct CanonicalEntry {
    pub id: &'static str,
    pub provider_type: ProviderType,
    pub base_url: &'static str,
    pub api_key_env: &'static str,
}

macro_rules! compat_entry {
    ($id:literal, $base_url:literal, $env:literal) => {
        CanonicalEntry {
            id: $id,
            provider_type: ProviderType::OpenaiCompatible,
            base_url: $base_url,
            api_key_env: $env,
        }
    };
}

/// The full canonical table, keyed by provider id.
pub const CANONICAL_PROVIDERS: &[CanonicalEntry] = &[
    CanonicalEntry {
        id: "openai",
        provider_type: ProviderType::Openai,
        base_url: "https://api.openai.com/v1",
        api_key_env: "OPENAI_API_KEY",
    },
    CanonicalEntry {
        id: "anthropic",
        provider_type: ProviderType::Anthropic,
        base_url: "https://api.anthropic.com/v1",
        api_key_env: "ANTHROPIC_API_KEY",
    },
    CanonicalEntry {
        id: "google",
        provider_type: ProviderType::Google,
        base_url: "https://generativelanguage.googleapis.com/v1beta",
        api_key_env: "GOOGLE_GENERATIVE_AI_API_KEY",
    },
    compat_entry!("groq", "https://api.groq.com/openai/v1", "GROQ_API_KEY"),
    compat_entry!("mistral", "https://api.mistral.ai/v1", "MISTRAL_API_KEY"),
    compat_entry!("cohere", "https://api.cohere.ai/compatibility/v1", "COHERE_API_KEY"),
    compat_entry!(
        "openrouter",
        "https://openrouter.ai/api/v1",
        "OPENROUTER_API_KEY"
    ),
    compat_entry!(
        "togetherai",
        "https://api.together.xyz/v1",
        "TOGETHER_API_KEY"
    ),
    compat_entry!(
        "fireworks-ai",
        "https://api.fireworks.ai/inference/v1",
        "FIREWORKS_API_KEY"
    ),
    compat_entry!(
        "perplexity",
        "https://api.perplexity.ai",
        "PERPLEXITY_API_KEY"
    ),
    compat_entry!(
        "deepinfra",
        "https://api.deepinfra.com/v1/openai",
        "DEEPINFRA_API_KEY"
    ),
    compat_entry!("xai", "https://api.x.ai/v1", "XAI_API_KEY"),
    compat_entry!(
        "moonshotai",
        "https://api.moonshot.cn/v1",
        "MOONSHOT_API_KEY"
    ),
    compat_entry!(
        "alibaba",
        "https://dashscope.aliyuncs.com/compatible-mode/v1",
        "DASHSCOPE_API_KEY"
    ),
    compat_entry!(
        "nvidia",
        "https://integrate.api.nvidia.com/v1",
        "NVIDIA_API_KEY"
    ),
    compat_entry!("vultr", "https://api.vultrinference.com/v1", "VULTR_API_KEY"),
    compat_entry!(
        "github-models",
        "https://models.inference.ai.azure.com",
        "GITHUB_TOKEN"
    ),
    compat_entry!(
        "huggingface",
        "https://api-inference.huggingface.co/v1",
        "HUGGINGFACE_API_KEY"
    ),
];

/// Look up a canonical entry by provider id.
pub fn lookup(provider_id: &str) -> Option<&'static CanonicalEntry> {
    CANONICAL_PROVIDERS.iter().find(|e| e.id == provider_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_entries_present() {
        for id in ["openai", "anthropic", "google", "groq"] {
            assert!(lookup(id).is_some(), "missing canonical entry for {id}");
        }
    }

    #[test]
    fn openai_entry_matches_spec() {
        let e = lookup("openai").unwrap();
        assert_eq!(e.provider_type, ProviderType::Openai);
        assert_eq!(e.base_url, "https://api.openai.com/v1");
        assert_eq!(e.api_key_env, "OPENAI_API_KEY");
    }
}
