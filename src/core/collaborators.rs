//! Collaborator interfaces: contracts the core assumes but does not
//! implement. Production wiring plugs in a real agent runtime / channel
//! service / log sink; this crate ships only the demo-mode agent runtime
//! the session layer's "no key configured" path needs to behave correctly.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

/// Outcome of a single agent turn.
#[derive(Debug, Clone)]
pub struct AgentChatResult {
    pub content: String,
    pub usage: Option<Value>,
}

/// Per-chunk callback for a streamed agent turn.
pub type OnChunk = Box<dyn FnMut(&str) + Send>;

/// `getOrCreateDefaultAgent()` — out-of-scope in the core, but the demo
/// fallback needs something to hand callers when no provider is configured.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn chat(&self, content: &str, on_chunk: Option<OnChunk>) -> crate::utils::Result<AgentChatResult>;
    fn is_demo_mode(&self) -> bool;
}

/// Synthesizes a response chunked word-by-word with ~50ms per chunk, so the
/// session event sequence is indistinguishable from a real provider stream.
pub struct DemoAgentRuntime;

#[async_trait]
impl AgentRuntime for DemoAgentRuntime {
    async fn chat(&self, content: &str, mut on_chunk: Option<OnChunk>) -> crate::utils::Result<AgentChatResult> {
        let reply = format!("(demo mode) you said: {content}");
        let mut emitted = String::new();
        for word in reply.split_inclusive(' ') {
            if let Some(cb) = on_chunk.as_mut() {
                cb(word);
            }
            emitted.push_str(word);
            sleep(Duration::from_millis(50)).await;
        }
        Ok(AgentChatResult { content: emitted, usage: None })
    }

    fn is_demo_mode(&self) -> bool {
        true
    }
}

/// `getChannelService()` — external chat-platform bridge (Discord, Slack,
/// …). Out of scope for this core; callers inject their own implementation.
#[async_trait]
pub trait ChannelService: Send + Sync {
    async fn connect(&self, plugin_id: &str) -> crate::utils::Result<()>;
    async fn disconnect(&self, plugin_id: &str) -> crate::utils::Result<()>;
    fn list_channels(&self) -> Vec<String>;
    async fn send(&self, plugin_id: &str, platform_chat_id: &str, text: &str, reply_to_id: Option<&str>) -> crate::utils::Result<String>;
    fn get_channel_status(&self, plugin_id: &str) -> Option<String>;
}

/// `getLog(name)` — out-of-scope structured logger handle. The crate's own
/// ambient logging goes through `tracing` directly; this trait exists only
/// so collaborator code outside the core can be handed a log sink without
/// depending on `tracing` itself.
pub trait LogSink: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn debug(&self, message: &str);
}

/// `LogSink` backed directly by `tracing`, named via a target string.
pub struct TracingLogSink {
    name: &'static str,
}

impl TracingLogSink {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl LogSink for TracingLogSink {
    fn info(&self, message: &str) {
        tracing::info!(target: "collaborator", name = self.name, "{message}");
    }
    fn warn(&self, message: &str) {
        tracing::warn!(target: "collaborator", name = self.name, "{message}");
    }
    fn error(&self, message: &str) {
        tracing::error!(target: "collaborator", name = self.name, "{message}");
    }
    fn debug(&self, message: &str) {
        tracing::debug!(target: "collaborator", name = self.name, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_agent_runtime_echoes_prefixed_content_word_by_word() {
        use std::sync::{Arc, Mutex};

        let runtime = DemoAgentRuntime;
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let chunks2 = chunks.clone();
        let result = runtime
            .chat("hi", Some(Box::new(move |w: &str| chunks2.lock().unwrap().push(w.to_string()))))
            .await
            .unwrap();
        assert!(result.content.contains("you said: hi"));
        assert!(chunks.lock().unwrap().len() > 1);
        assert!(runtime.is_demo_mode());
    }
}
