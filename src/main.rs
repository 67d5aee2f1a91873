//! `gateway` binary entry point: parses CLI/env config, loads provider
//! configuration, and runs the HTTP + WebSocket server.

use clap::Parser;
use litellm_rs::config::app_config::CliArgs;
use litellm_rs::config::registry::ProviderRegistry;
use litellm_rs::config::SessionSettings;
use litellm_rs::server::AppState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let args = CliArgs::parse();

    let registry = Arc::new(ProviderRegistry::new());
    match registry.load_dir(&args.providers_dir) {
        Ok(count) => tracing::info!("loaded {count} provider configs from {}", args.providers_dir),
        Err(err) => tracing::warn!("failed to load provider configs from {}: {err}", args.providers_dir),
    }

    let session_settings = SessionSettings::default();
    let state = AppState::new(registry, session_settings);

    litellm_rs::server::run_server(state, &args.host, args.port).await
}
