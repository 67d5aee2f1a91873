//! Wires `core::events::EventBus` to `server::session::SessionManager`:
//! outbound pattern subscriptions forward bus events to a subscribing
//! session as `event:message` frames, inbound `event:publish` frames
//! accept a restricted namespace back onto the bus, and a fixed table of
//! legacy bus patterns is rebroadcast under old colon-separated session
//! event names.

use crate::core::events::{Event, EventBus};
use crate::server::session::{Session, SessionManager};
use serde_json::{json, Value};
use std::sync::Arc;

const MAX_SUBSCRIPTIONS_PER_SESSION: usize = 50;
const MAX_PATTERN_LENGTH: usize = 100;
const MAX_PATTERN_SEGMENTS: usize = 6;

/// Bus-pattern -> session-event-name forwarding table. When the session
/// name ends in `:`, the matched event type's last dot-segment is appended
/// (`channel.user.blocked` -> `channel:user:blocked`); otherwise the
/// session name is used verbatim regardless of which pattern branch fired.
/// A table, not code.
const LEGACY_FORWARDS: &[(&str, &str)] = &[
    ("pulse.*", "pulse:activity"),
    ("gateway.data.changed", "data:changed"),
    ("channel.user.*", "channel:user:"),
];

fn last_segment(event_type: &str) -> &str {
    event_type.rsplit('.').next().unwrap_or(event_type)
}

fn validate_pattern(pattern: &str) -> Result<(), String> {
    if pattern.is_empty() {
        return Err("pattern must not be empty".to_string());
    }
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(format!("pattern exceeds {MAX_PATTERN_LENGTH} characters"));
    }
    if pattern.split('.').count() > MAX_PATTERN_SEGMENTS {
        return Err(format!("pattern exceeds {MAX_PATTERN_SEGMENTS} segments"));
    }
    if !pattern.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '*')) {
        return Err("pattern contains characters outside [A-Za-z0-9_-.*]".to_string());
    }
    Ok(())
}

/// `type` must begin with `external.` or `client.` and must not be one of
/// the block-listed system lifecycle events.
fn validate_publish_type(event_type: &str) -> Result<(), String> {
    const BLOCKED: &[&str] = &["system.shutdown", "system.startup"];
    if BLOCKED.contains(&event_type) {
        return Err(format!("{event_type} is not publishable from a client"));
    }
    if event_type.starts_with("external.") || event_type.starts_with("client.") {
        return Ok(());
    }
    Err("type must start with 'external.' or 'client.'".to_string())
}

pub struct EventBridge {
    bus: Arc<EventBus>,
    sessions: Arc<SessionManager>,
    /// Keeps the legacy-forward subscriptions alive for the process lifetime.
    _legacy: Vec<crate::core::events::Unsubscribe>,
}

impl EventBridge {
    pub fn new(bus: Arc<EventBus>, sessions: Arc<SessionManager>) -> Arc<Self> {
        let mut legacy = Vec::new();
        for (pattern, template) in LEGACY_FORWARDS {
            let sessions = sessions.clone();
            let template = *template;
            let sub = bus.on_pattern_event(
                *pattern,
                Arc::new(move |event: &Event| {
                    let out_type =
                        if template.ends_with(':') { format!("{template}{}", last_segment(&event.event_type)) } else { template.to_string() };
                    let sessions = sessions.clone();
                    let payload = event.data.clone();
                    tokio::spawn(async move {
                        sessions.broadcast(&out_type, payload).await;
                    });
                }),
            );
            legacy.push(sub);
        }
        Arc::new(Self { bus, sessions, _legacy: legacy })
    }

    /// `event:subscribe{pattern}` — validate, cap, (re)create an `onPattern`
    /// subscription forwarding matches as `event:message`, reply
    /// `event:subscribed`.
    pub async fn subscribe(&self, session: Arc<Session>, pattern: String) {
        if let Err(err) = validate_pattern(&pattern) {
            session.send_frame("event:subscribed", json!({"pattern": pattern, "success": false, "error": err})).await;
            return;
        }

        let already_present = session.event_subscriptions.contains_key(&pattern);
        if !already_present && session.event_subscriptions.len() >= MAX_SUBSCRIPTIONS_PER_SESSION {
            session
                .send_frame(
                    "event:subscribed",
                    json!({"pattern": pattern, "success": false, "error": "subscription limit reached"}),
                )
                .await;
            return;
        }

        if let Some((_, old)) = session.event_subscriptions.remove(&pattern) {
            old.call();
        }

        let session_for_handler = session.clone();
        let unsub = self.bus.on_pattern_event(
            pattern.clone(),
            Arc::new(move |event: &Event| {
                let session = session_for_handler.clone();
                let frame = json!({
                    "type": event.event_type,
                    "source": event.source,
                    "data": event.data,
                    "timestamp": event.timestamp,
                });
                tokio::spawn(async move {
                    session.send_frame("event:message", frame).await;
                });
            }),
        );
        session.event_subscriptions.insert(pattern.clone(), unsub);
        session.send_frame("event:subscribed", json!({"pattern": pattern, "success": true})).await;
    }

    /// `event:unsubscribe{pattern}` — idempotent.
    pub fn unsubscribe(&self, session: &Session, pattern: &str) {
        if let Some((_, unsub)) = session.event_subscriptions.remove(pattern) {
            unsub.call();
        }
    }

    /// `event:publish{type, data}` — accept into the restricted client
    /// namespace, or reply `event:publish:error`.
    pub async fn publish(&self, session: &Session, event_type: String, data: Value) {
        if let Err(err) = validate_publish_type(&event_type) {
            session.send_frame("event:publish:error", json!({"error": err})).await;
            return;
        }
        let source = format!("ws:{}", session.id);
        self.bus.emit(Event::new(event_type, source, data));
        session.send_frame("event:publish:ack", Value::Null).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_or_oversized_or_deep_patterns() {
        assert!(validate_pattern("").is_err());
        assert!(validate_pattern(&"a".repeat(101)).is_err());
        assert!(validate_pattern("a.b.c.d.e.f.g").is_err());
        assert!(validate_pattern("a.b.*").is_ok());
    }

    #[test]
    fn rejects_patterns_with_disallowed_characters() {
        assert!(validate_pattern("a.b/c").is_err());
        assert!(validate_pattern("a.b c").is_err());
    }

    #[test]
    fn publish_type_must_be_in_client_namespace_and_not_blocked() {
        assert!(validate_publish_type("external.thing").is_ok());
        assert!(validate_publish_type("client.action").is_ok());
        assert!(validate_publish_type("system.shutdown").is_err());
        assert!(validate_publish_type("internal.secret").is_err());
    }

    #[test]
    fn legacy_forward_appends_last_segment_only_for_colon_suffixed_templates() {
        assert_eq!(last_segment("channel.user.blocked"), "blocked");
        assert_eq!(last_segment("gateway.data.changed"), "changed");
    }
}
