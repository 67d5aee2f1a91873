//! Session table and lifecycle timers.

use crate::config::app_config::SessionSettings;
use crate::core::events::Unsubscribe;
use crate::server::session::ServerFrame;
use crate::utils::clock::Clock;
use crate::utils::rate_limiter::TokenBucket;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;

/// A single live WebSocket connection.
///
/// The socket handle is serialized behind an async mutex: the dispatch
/// loop, the heartbeat timer, and any broadcast fan-out may all want to
/// write to the same socket concurrently, and the session owns it
/// exclusively.
pub struct Session {
    pub id: String,
    ws: AsyncMutex<actix_ws::Session>,
    pub rate_limiter: TokenBucket,
    last_activity: Mutex<Instant>,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
    /// Channel ids this session is subscribed to, for `broadcastToChannel`.
    pub channels: DashMap<String, ()>,
    /// Live `event:subscribe` pattern subscriptions, released on drop.
    pub event_subscriptions: DashMap<String, Unsubscribe>,
}

impl Session {
    pub fn new(id: String, ws: actix_ws::Session, rate_limiter: TokenBucket, clock: Arc<dyn Clock>) -> Arc<Self> {
        let now = clock.now();
        Arc::new(Self {
            id,
            ws: AsyncMutex::new(ws),
            rate_limiter,
            last_activity: Mutex::new(now),
            clock,
            closed: AtomicBool::new(false),
            channels: DashMap::new(),
            event_subscriptions: DashMap::new(),
        })
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = self.clock.now();
    }

    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.clock.now().saturating_duration_since(*self.last_activity.lock()) >= timeout
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn send_frame(&self, event_type: &str, payload: Value) -> bool {
        if self.is_closed() {
            return false;
        }
        let frame = ServerFrame::new(event_type, payload);
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(_) => return false,
        };
        let mut ws = self.ws.lock().await;
        ws.text(text).await.is_ok()
    }

    pub async fn ping(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut ws = self.ws.lock().await;
        ws.ping(b"").await.is_ok()
    }

    pub async fn pong(&self, payload: Vec<u8>) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut ws = self.ws.lock().await;
        ws.pong(&payload).await.is_ok()
    }

    pub async fn close(&self, code: actix_ws::CloseCode, description: Option<String>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for unsub in self.event_subscriptions.iter() {
            unsub.value().call();
        }
        self.event_subscriptions.clear();
        let mut ws = self.ws.lock().await;
        let _ = ws.close(Some(actix_ws::CloseReason { code, description })).await;
    }
}

/// The process-wide session table plus its heartbeat and sweeper timers.
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self { sessions: DashMap::new(), settings, clock })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_at_capacity(&self) -> bool {
        self.sessions.len() >= self.settings.max_connections
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, v)| v)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|r| r.value().clone())
    }

    fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|r| r.value().clone()).collect()
    }

    /// Serializes `payload` once and writes it to every open session.
    pub async fn broadcast(&self, event_type: &str, payload: Value) {
        for session in self.snapshot() {
            session.send_frame(event_type, payload.clone()).await;
        }
    }

    /// Same as `broadcast`, limited to sessions subscribed to `channel_id`.
    pub async fn broadcast_to_channel(&self, channel_id: &str, event_type: &str, payload: Value) {
        let targets: Vec<Arc<Session>> =
            self.sessions.iter().filter(|r| r.value().channels.contains_key(channel_id)).map(|r| r.value().clone()).collect();
        for session in targets {
            session.send_frame(event_type, payload.clone()).await;
        }
    }

    /// Removes and closes every session whose last activity exceeds the
    /// configured timeout.
    pub async fn sweep_idle(&self) {
        let timeout = Duration::from_secs(self.settings.session_timeout_secs);
        let stale: Vec<String> = self.sessions.iter().filter(|r| r.value().is_idle(timeout)).map(|r| r.key().clone()).collect();
        for id in stale {
            if let Some(session) = self.remove(&id) {
                session.close(actix_ws::CloseCode::Normal, Some("session idle timeout".to_string())).await;
            }
        }
    }

    async fn heartbeat_all(&self) {
        for session in self.snapshot() {
            session.ping().await;
        }
    }

    /// Spawns the heartbeat timer. Like the spec requires, this does not
    /// keep the process alive on its own: it's just a `tokio::spawn`ed
    /// loop tied to the manager's lifetime via the passed-in `Arc`.
    pub fn spawn_heartbeat(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let interval = Duration::from_secs(self.settings.heartbeat_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.heartbeat_all().await;
            }
        })
    }

    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let interval = Duration::from_secs(self.settings.sweeper_interval_secs());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.sweep_idle().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::TestClock;

    fn settings() -> SessionSettings {
        SessionSettings { session_timeout_secs: 30, ..Default::default() }
    }

    #[test]
    fn capacity_check_counts_inserted_sessions() {
        let manager = SessionManager::new(SessionSettings { max_connections: 1, ..settings() }, Arc::new(TestClock::new()));
        assert!(!manager.is_at_capacity());
    }

    #[test]
    fn sweeper_interval_is_derived_from_session_timeout() {
        let manager = SessionManager::new(settings(), Arc::new(TestClock::new()));
        assert_eq!(manager.settings().sweeper_interval_secs(), 10);
    }
}
