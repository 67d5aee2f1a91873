//! Shared, `Arc`-wrapped process state handed to every route and session.

use crate::config::app_config::SessionSettings;
use crate::config::registry::ProviderRegistry;
use crate::core::collaborators::{AgentRuntime, ChannelService, DemoAgentRuntime};
use crate::core::events::EventBus;
use crate::core::router::{ProviderRouter, RouterConfig};
use crate::server::bridge::EventBridge;
use crate::server::session::SessionManager;
use crate::utils::clock::{Clock, SystemClock};
use std::sync::Arc;

/// A `ChannelService` with no plugins registered, for deployments that
/// haven't wired one up. Every call fails cleanly rather than panicking.
pub struct NoChannelService;

#[async_trait::async_trait]
impl ChannelService for NoChannelService {
    async fn connect(&self, plugin_id: &str) -> crate::utils::Result<()> {
        Err(crate::utils::GatewayError::validation(format!("no channel plugin named '{plugin_id}' is configured")))
    }

    async fn disconnect(&self, _plugin_id: &str) -> crate::utils::Result<()> {
        Ok(())
    }

    fn list_channels(&self) -> Vec<String> {
        Vec::new()
    }

    async fn send(&self, plugin_id: &str, _platform_chat_id: &str, _text: &str, _reply_to_id: Option<&str>) -> crate::utils::Result<String> {
        Err(crate::utils::GatewayError::validation(format!("no channel plugin named '{plugin_id}' is configured")))
    }

    fn get_channel_status(&self, _plugin_id: &str) -> Option<String> {
        None
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub router: Arc<ProviderRouter>,
    pub event_bus: Arc<EventBus>,
    pub sessions: Arc<SessionManager>,
    pub bridge: Arc<EventBridge>,
    pub agent_runtime: Arc<dyn AgentRuntime>,
    pub channel_service: Arc<dyn ChannelService>,
}

impl AppState {
    pub fn new(registry: Arc<ProviderRegistry>, session_settings: SessionSettings) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let router = Arc::new(ProviderRouter::new(registry.clone(), RouterConfig::default()));
        let event_bus = Arc::new(EventBus::new());
        let sessions = SessionManager::new(session_settings, clock);
        let bridge = EventBridge::new(event_bus.clone(), sessions.clone());

        Self {
            registry,
            router,
            event_bus,
            sessions,
            bridge,
            agent_runtime: Arc::new(DemoAgentRuntime),
            channel_service: Arc::new(NoChannelService),
        }
    }
}
