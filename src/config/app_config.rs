//! Process-level settings for the `gateway` binary: bind address, WS
//! endpoint, auth, and CORS.

use clap::Parser;
use serde::{Deserialize, Serialize};

/// CLI flags, each overridable by an environment variable of the same name.
#[derive(Debug, Clone, Parser)]
#[command(name = "gateway", about = "Multi-provider AI gateway")]
pub struct CliArgs {
    /// Host to bind the HTTP/WS server to.
    #[arg(long, env = "GATEWAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP/WS server to.
    #[arg(long, env = "GATEWAY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory of `ProviderConfig` JSON files.
    #[arg(long, env = "GATEWAY_PROVIDERS_DIR", default_value = "config/providers")]
    pub providers_dir: String,

    /// WebSocket upgrade path.
    #[arg(long, env = "GATEWAY_WS_PATH", default_value = "/ws")]
    pub ws_path: String,
}

/// CORS allow-list. Empty `allowed_origins` means no origin check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsSettings {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// WebSocket session-layer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_rate_limit_capacity")]
    pub rate_limit_capacity: u32,
    #[serde(default = "default_rate_limit_refill_per_min")]
    pub rate_limit_refill_per_min: u32,
    /// Opaque UI-session tokens, validated against a session store. Left
    /// empty for deployments with no UI-session login.
    #[serde(default)]
    pub ui_session_tokens: Vec<String>,
    /// Static API-key allow-list for WS auth.
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub cors: CorsSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            session_timeout_secs: default_session_timeout_secs(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            rate_limit_capacity: default_rate_limit_capacity(),
            rate_limit_refill_per_min: default_rate_limit_refill_per_min(),
            ui_session_tokens: Vec::new(),
            api_keys: Vec::new(),
            cors: CorsSettings::default(),
        }
    }
}

fn default_max_connections() -> usize {
    10_000
}
fn default_session_timeout_secs() -> u64 {
    15 * 60
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_rate_limit_capacity() -> u32 {
    20
}
fn default_rate_limit_refill_per_min() -> u32 {
    60
}

impl SessionSettings {
    /// `min(sessionTimeout/3, 60s)`.
    pub fn sweeper_interval_secs(&self) -> u64 {
        (self.session_timeout_secs / 3).min(60).max(1)
    }

    /// No auth at all configured means every upgrade passes.
    pub fn auth_configured(&self) -> bool {
        !self.ui_session_tokens.is_empty() || !self.api_keys.is_empty()
    }
}
