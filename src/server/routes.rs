//! HTTP and WebSocket-upgrade routes.

use crate::config::registry::SelectionCriteria;
use crate::core::router::Strategy;
use crate::core::types::CompletionRequest;
use crate::server::session::dispatch::handle_frame;
use crate::server::session::{auth, Session};
use crate::server::state::AppState;
use crate::utils::error::GatewayError;
use crate::utils::rate_limiter::TokenBucket;
use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/healthz", web::get().to(health_check))
        .route("/v1/chat/completions", web::post().to(chat_completions))
        .route("/ws", web::get().to(ws_upgrade));
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

fn sse_event(data: &str) -> web::Bytes {
    web::Bytes::from(format!("data: {data}\n\n"))
}

#[derive(serde::Deserialize)]
struct StreamQuery {
    #[serde(default)]
    stream: bool,
}

/// `POST /v1/chat/completions`: routes through the default strategy,
/// non-streaming JSON or SSE depending on `?stream=true`.
async fn chat_completions(
    state: web::Data<AppState>,
    query: web::Query<StreamQuery>,
    request: web::Json<CompletionRequest>,
) -> actix_web::Result<HttpResponse> {
    let request = request.into_inner();
    let criteria = SelectionCriteria::default();

    if query.stream {
        let router = state.router.clone();
        match router.stream(request, criteria, Strategy::default()).await {
            Ok(mut chunks) => {
                let sse_stream = async_stream::stream! {
                    while let Some(item) = chunks.next().await {
                        match item {
                            Ok(chunk) => {
                                if let Ok(json) = serde_json::to_string(&chunk) {
                                    yield Ok::<_, GatewayError>(sse_event(&json));
                                }
                                if chunk.done {
                                    yield Ok::<_, GatewayError>(sse_event("[DONE]"));
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!("stream error: {err}");
                                yield Ok::<_, GatewayError>(sse_event(&format!("{{\"error\":\"{err}\"}}")));
                                break;
                            }
                        }
                    }
                };
                Ok(HttpResponse::Ok()
                    .insert_header((CONTENT_TYPE, "text/event-stream"))
                    .insert_header((CACHE_CONTROL, "no-cache"))
                    .insert_header(("Connection", "keep-alive"))
                    .streaming(sse_stream))
            }
            Err(err) => Ok(gateway_error_response(err)),
        }
    } else {
        match state.router.complete(request, criteria, Strategy::default()).await {
            Ok(response) => Ok(HttpResponse::Ok().json(response)),
            Err(err) => Ok(gateway_error_response(err)),
        }
    }
}

fn gateway_error_response(err: GatewayError) -> HttpResponse {
    let body = serde_json::json!({"error": err.to_string()});
    match err {
        GatewayError::Validation(_) => HttpResponse::BadRequest().json(body),
        GatewayError::Timeout(_) => HttpResponse::GatewayTimeout().json(body),
        GatewayError::Internal(_) => HttpResponse::InternalServerError().json(body),
    }
}

/// `GET /ws`: socket upgrade, auth, origin/capacity checks, then hands the
/// connection to the session dispatch loop.
async fn ws_upgrade(req: HttpRequest, body: web::Payload, state: web::Data<AppState>) -> actix_web::Result<HttpResponse> {
    let settings = state.sessions.settings().clone();

    let token = auth::extract_token(&req);
    if !auth::authenticate(token.as_deref(), &settings) {
        let (response, mut session, _stream) = actix_ws::handle(&req, body)?;
        actix_web::rt::spawn(async move {
            let _ = session.close(Some(actix_ws::CloseReason { code: actix_ws::CloseCode::Policy, description: Some("unauthorized".into()) })).await;
        });
        return Ok(response);
    }

    if !settings.cors.allowed_origins.is_empty() {
        let origin_ok = req
            .headers()
            .get(actix_web::http::header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(|origin| settings.cors.allowed_origins.iter().any(|allowed| allowed == origin))
            .unwrap_or(false);
        if !origin_ok {
            let (response, mut session, _stream) = actix_ws::handle(&req, body)?;
            actix_web::rt::spawn(async move {
                let _ = session
                    .close(Some(actix_ws::CloseReason { code: actix_ws::CloseCode::Policy, description: Some("origin not allowed".into()) }))
                    .await;
            });
            return Ok(response);
        }
    }

    if state.sessions.is_at_capacity() {
        let (response, mut session, _stream) = actix_ws::handle(&req, body)?;
        actix_web::rt::spawn(async move {
            let _ = session.close(Some(actix_ws::CloseReason { code: actix_ws::CloseCode::Again, description: Some("at capacity".into()) })).await;
        });
        return Ok(response);
    }

    let (response, ws_session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let clock: Arc<dyn crate::utils::clock::Clock> = Arc::new(crate::utils::clock::SystemClock);
    let rate_limiter = TokenBucket::new(settings.rate_limit_capacity, settings.rate_limit_refill_per_min, clock.clone());
    let session_id = Uuid::new_v4().to_string();
    let session = Session::new(session_id.clone(), ws_session, rate_limiter, clock);

    state.sessions.insert(session.clone());
    session.send_frame("connection:ready", serde_json::json!({"sessionId": session_id})).await;
    info!("session {session_id} connected");

    let state = state.get_ref().clone();
    actix_web::rt::spawn(async move {
        while let Some(Ok(msg)) = msg_stream.next().await {
            match msg {
                actix_ws::Message::Text(text) => handle_frame(&session, &state, &text).await,
                actix_ws::Message::Ping(bytes) => {
                    session.pong(bytes.to_vec()).await;
                }
                actix_ws::Message::Close(_) => break,
                _ => {}
            }
        }
        state.sessions.remove(&session.id);
        session.close(actix_ws::CloseCode::Normal, None).await;
    });

    Ok(response)
}
