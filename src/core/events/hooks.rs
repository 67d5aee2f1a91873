//! Hook sub-bus: request/response interception chains where each tap is
//! awaited in registration order. Hook names live in their own namespace
//! (`client:*`), distinct from bus event types (`category.action`).

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Tap = Arc<dyn Fn(Value) -> BoxFuture<'static, Value> + Send + Sync>;

#[derive(Default)]
struct HookState {
    taps: std::collections::HashMap<String, Vec<(u64, Tap)>>,
    next_id: AtomicU64,
}

/// A registry of named, awaited interception chains.
#[derive(Default, Clone)]
pub struct HookBus {
    state: Arc<RwLock<HookState>>,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tap under `name`. Each registered tap for a name is
    /// awaited, in registration order, by [`HookBus::call_any`].
    pub fn tap_any(&self, name: impl Into<String>, tap: Tap) {
        let name = name.into();
        let id = self.state.read().next_id.fetch_add(1, Ordering::SeqCst);
        self.state.write().taps.entry(name).or_default().push((id, tap));
    }

    /// Run every tap registered under `name` in order, threading the
    /// (possibly transformed) value through the chain, and return the
    /// final value.
    pub async fn call_any(&self, name: &str, mut data: Value) -> Value {
        let taps: Vec<Tap> = self
            .state
            .read()
            .taps
            .get(name)
            .map(|list| list.iter().map(|(_, tap)| tap.clone()).collect())
            .unwrap_or_default();
        for tap in taps {
            data = tap(data).await;
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn taps_run_in_registration_order() {
        let bus = HookBus::new();
        bus.tap_any(
            "client:before",
            Arc::new(|v: Value| Box::pin(async move { serde_json::json!({ "n": v["n"].as_i64().unwrap_or(0) + 1 }) })),
        );
        bus.tap_any(
            "client:before",
            Arc::new(|v: Value| Box::pin(async move { serde_json::json!({ "n": v["n"].as_i64().unwrap_or(0) * 10 }) })),
        );

        let result = bus.call_any("client:before", serde_json::json!({ "n": 1 })).await;
        assert_eq!(result["n"], 20);
    }
}
