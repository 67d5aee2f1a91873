//! Routes a parsed `ClientFrame` to its handler. Each branch is a thin
//! adapter onto a collaborator (`AgentRuntime`, `ChannelService`) or the
//! event bridge.

use crate::core::collaborators::OnChunk;
use crate::server::session::{is_allowed_event_type, ClientFrame, Session};
use crate::server::state::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Entry point called once per inbound WebSocket text frame.
pub async fn handle_frame(session: &Arc<Session>, state: &AppState, raw: &str) {
    session.touch();

    if !session.rate_limiter.try_consume() {
        session.send_frame("connection:error", json!({"code": "RATE_LIMITED"})).await;
        return;
    }

    let frame: ClientFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(err) => {
            session.send_frame("connection:error", json!({"code": "PARSE_ERROR", "message": err.to_string()})).await;
            return;
        }
    };

    if !is_allowed_event_type(&frame.event_type) {
        session
            .send_frame("connection:error", json!({"code": "UNKNOWN_EVENT_TYPE", "message": frame.event_type}))
            .await;
        return;
    }

    if let Err(err) = route(session, state, &frame).await {
        session.send_frame("connection:error", json!({"code": "HANDLER_ERROR", "message": err})).await;
    }
}

async fn route(session: &Arc<Session>, state: &AppState, frame: &ClientFrame) -> Result<(), String> {
    match frame.event_type.as_str() {
        "chat:send" | "chat:retry" => handle_chat_send(session, state, &frame.payload).await,
        "chat:stop" => {
            state.router.cancel_all().await;
            session.send_frame("chat:stopped", Value::Null).await;
            Ok(())
        }
        "channel:connect" => handle_channel_connect(session, state, &frame.payload).await,
        "channel:disconnect" => handle_channel_disconnect(session, state, &frame.payload).await,
        "channel:subscribe" => {
            if let Some(channel_id) = frame.payload.get("channelId").and_then(Value::as_str) {
                session.channels.insert(channel_id.to_string(), ());
            }
            Ok(())
        }
        "channel:unsubscribe" => {
            if let Some(channel_id) = frame.payload.get("channelId").and_then(Value::as_str) {
                session.channels.remove(channel_id);
            }
            Ok(())
        }
        "channel:send" => handle_channel_send(session, state, &frame.payload).await,
        "channel:list" => {
            session.send_frame("channel:list", json!({"channels": state.channel_service.list_channels()})).await;
            Ok(())
        }
        "agent:configure" | "agent:stop" | "tool:cancel" => {
            session.send_frame("ack", json!({"type": frame.event_type})).await;
            Ok(())
        }
        "session:ping" => {
            session.send_frame("session:pong", Value::Null).await;
            Ok(())
        }
        "session:pong" => Ok(()),
        t if t.starts_with("coding-agent:") => {
            session.send_frame("ack", json!({"type": t})).await;
            Ok(())
        }
        t if t.starts_with("workspace:") => {
            session.send_frame("ack", json!({"type": t})).await;
            Ok(())
        }
        "event:subscribe" => {
            let pattern = frame.payload.get("pattern").and_then(Value::as_str).unwrap_or_default().to_string();
            state.bridge.subscribe(session.clone(), pattern).await;
            Ok(())
        }
        "event:unsubscribe" => {
            let pattern = frame.payload.get("pattern").and_then(Value::as_str).unwrap_or_default();
            state.bridge.unsubscribe(session, pattern);
            Ok(())
        }
        "event:publish" => {
            let event_type = frame.payload.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
            let data = frame.payload.get("data").cloned().unwrap_or(Value::Null);
            state.bridge.publish(session, event_type, data).await;
            Ok(())
        }
        other => Err(format!("no handler registered for {other}")),
    }
}

async fn handle_chat_send(session: &Arc<Session>, state: &AppState, payload: &Value) -> Result<(), String> {
    let content = payload.get("content").and_then(Value::as_str).unwrap_or_default().to_string();
    let message_id = Uuid::new_v4().to_string();

    session.send_frame("chat:stream:start", json!({"messageId": message_id})).await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let on_chunk: OnChunk = Box::new(move |chunk: &str| {
        let _ = tx.send(chunk.to_string());
    });

    let drain_session = session.clone();
    let drain_message_id = message_id.clone();
    let drain_task = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            drain_session.send_frame("chat:stream:chunk", json!({"messageId": drain_message_id, "content": chunk})).await;
        }
    });

    let result = state.agent_runtime.chat(&content, Some(on_chunk)).await;
    let _ = drain_task.await;

    match result {
        Ok(chat_result) => {
            session.send_frame("chat:stream:end", json!({"messageId": message_id, "fullContent": chat_result.content})).await;
            session
                .send_frame(
                    "chat:message",
                    json!({"message": {"id": message_id, "role": "assistant", "content": chat_result.content, "usage": chat_result.usage}}),
                )
                .await;
            Ok(())
        }
        Err(err) => {
            session.send_frame("chat:error", json!({"error": err.to_string()})).await;
            Ok(())
        }
    }
}

async fn handle_channel_connect(session: &Arc<Session>, state: &AppState, payload: &Value) -> Result<(), String> {
    let plugin_id = payload.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
    match state.channel_service.connect(&plugin_id).await {
        Ok(()) => {
            session.channels.insert(plugin_id.clone(), ());
            session.send_frame("channel:connected", json!({"channel": plugin_id})).await;
        }
        Err(err) => {
            session.send_frame("channel:status", json!({"channelId": plugin_id, "status": "error", "error": err.to_string()})).await;
        }
    }
    Ok(())
}

async fn handle_channel_disconnect(session: &Arc<Session>, state: &AppState, payload: &Value) -> Result<(), String> {
    let plugin_id = payload.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
    match state.channel_service.disconnect(&plugin_id).await {
        Ok(()) => {
            session.send_frame("channel:status", json!({"channelId": plugin_id, "status": "disconnected"})).await;
        }
        Err(err) => {
            session.send_frame("channel:status", json!({"channelId": plugin_id, "status": "error", "error": err.to_string()})).await;
        }
    }
    Ok(())
}

async fn handle_channel_send(session: &Arc<Session>, state: &AppState, payload: &Value) -> Result<(), String> {
    let plugin_id = payload.get("pluginId").and_then(Value::as_str).unwrap_or_default();
    let platform_chat_id = payload.get("platformChatId").and_then(Value::as_str).unwrap_or_default();
    let text = payload.get("text").and_then(Value::as_str).unwrap_or_default();
    let reply_to_id = payload.get("replyToId").and_then(Value::as_str);

    match state.channel_service.send(plugin_id, platform_chat_id, text, reply_to_id).await {
        Ok(message_id) => {
            session.send_frame("channel:sent", json!({"pluginId": plugin_id, "messageId": message_id})).await;
        }
        Err(err) => {
            session.send_frame("channel:status", json!({"channelId": plugin_id, "status": "error", "error": err.to_string()})).await;
        }
    }
    Ok(())
}
