//! Process-scoped pub/sub event bus plus a hook sub-bus for awaited
//! request/response interception chains. A multi-mode (`exact` / `glob` /
//! `firehose`) untyped bus, since callers need dynamic event names, not
//! one fixed payload type.

pub mod hooks;
mod pattern;

pub use hooks::HookBus;
pub use pattern::glob_match;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A single bus event. `category` is the first dot-segment of `event_type`.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub category: String,
    pub timestamp: i64,
    pub source: String,
    pub data: Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, data: Value) -> Self {
        let event_type = event_type.into();
        let category = event_type.split('.').next().unwrap_or_default().to_string();
        Self { event_type, category, timestamp: Utc::now().timestamp_millis(), source: source.into(), data }
    }
}

type TypeHandler = Arc<dyn Fn(&Value) + Send + Sync>;
type AnyHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;
/// Like `AnyHandler`, but receives the full `Event` (source, timestamp
/// included) — used where a subscriber must forward those fields verbatim,
/// e.g. the WebSocket event bridge's `event:message` frames.
type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Returned by every subscribe call. Calling it more than once is a no-op.
pub struct Unsubscribe {
    called: AtomicBool,
    remove: Box<dyn Fn() + Send + Sync>,
}

impl Unsubscribe {
    pub fn call(&self) {
        if !self.called.swap(true, Ordering::SeqCst) {
            (self.remove)();
        }
    }
}

struct PatternSub {
    id: u64,
    pattern: String,
    handler: AnyHandler,
}

struct PatternEventSub {
    id: u64,
    pattern: String,
    handler: EventHandler,
}

#[derive(Default)]
struct BusState {
    exact: HashMap<String, Vec<(u64, TypeHandler)>>,
    patterns: Vec<PatternSub>,
    pattern_events: Vec<PatternEventSub>,
    firehose: Vec<(u64, String, AnyHandler)>,
    next_id: AtomicU64,
}

/// Process-scoped pub/sub fabric. Always shared behind an `Arc` so
/// subscription handles can own a removal closure without borrowing `self`.
#[derive(Default, Clone)]
pub struct EventBus {
    state: Arc<RwLock<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.state.read().next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Exact type match; handler receives the unwrapped `data`.
    pub fn on(&self, event_type: impl Into<String>, handler: TypeHandler) -> Unsubscribe {
        let event_type = event_type.into();
        let id = self.next_id();
        self.state.write().exact.entry(event_type.clone()).or_default().push((id, handler));

        let state = self.state.clone();
        Unsubscribe {
            called: AtomicBool::new(false),
            remove: Box::new(move || {
                if let Some(list) = state.write().exact.get_mut(&event_type) {
                    list.retain(|(existing_id, _)| *existing_id != id);
                }
            }),
        }
    }

    /// Dot-segmented glob subscription; `*` matches exactly one segment.
    /// Caller is expected to have already validated length/depth (see the
    /// event bridge) — the bus itself only matches.
    pub fn on_pattern(&self, pattern: impl Into<String>, handler: AnyHandler) -> Unsubscribe {
        let pattern = pattern.into();
        let id = self.next_id();
        self.state.write().patterns.push(PatternSub { id, pattern, handler });

        let state = self.state.clone();
        Unsubscribe {
            called: AtomicBool::new(false),
            remove: Box::new(move || {
                state.write().patterns.retain(|sub| sub.id != id);
            }),
        }
    }

    /// Firehose filtered by a plain string prefix (`""` matches everything
    /// — this is what `onAll` delegates to).
    pub fn on_any(&self, prefix: impl Into<String>, handler: AnyHandler) -> Unsubscribe {
        let prefix = prefix.into();
        let id = self.next_id();
        self.state.write().firehose.push((id, prefix, handler));

        let state = self.state.clone();
        Unsubscribe {
            called: AtomicBool::new(false),
            remove: Box::new(move || {
                state.write().firehose.retain(|(existing_id, _, _)| *existing_id != id);
            }),
        }
    }

    pub fn on_all(&self, handler: AnyHandler) -> Unsubscribe {
        self.on_any("", handler)
    }

    /// Glob subscription that forwards the full `Event` (source and
    /// timestamp included), rather than just `(type, data)`.
    pub fn on_pattern_event(&self, pattern: impl Into<String>, handler: EventHandler) -> Unsubscribe {
        let pattern = pattern.into();
        let id = self.next_id();
        self.state.write().pattern_events.push(PatternEventSub { id, pattern, handler });

        let state = self.state.clone();
        Unsubscribe {
            called: AtomicBool::new(false),
            remove: Box::new(move || {
                state.write().pattern_events.retain(|sub| sub.id != id);
            }),
        }
    }

    /// Dispatches to every matching subscriber. Handler panics propagate to
    /// the caller of `emit` — no silent swallow.
    pub fn emit(&self, event: Event) {
        let state = self.state.read();
        if let Some(handlers) = state.exact.get(&event.event_type) {
            for (_, handler) in handlers {
                handler(&event.data);
            }
        }
        for sub in &state.patterns {
            if glob_match(&sub.pattern, &event.event_type) {
                (sub.handler)(&event.event_type, &event.data);
            }
        }
        for sub in &state.pattern_events {
            if glob_match(&sub.pattern, &event.event_type) {
                (sub.handler)(&event);
            }
        }
        for (_, prefix, handler) in &state.firehose {
            if prefix.is_empty() || event.event_type.starts_with(prefix.as_str()) {
                handler(&event.event_type, &event.data);
            }
        }
    }
}
