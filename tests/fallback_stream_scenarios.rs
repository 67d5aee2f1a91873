//! End-to-end scenarios for the fallback provider's streaming behavior:
//! no retry is attempted once a provider has yielded any chunk, and a
//! circuit that opened on the primary allows it again once the cooldown
//! elapses and the trial succeeds.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{stream, StreamExt};
use litellm_rs::core::fallback::{CircuitBreakerConfig, FallbackConfig, FallbackProvider};
use litellm_rs::core::providers::Provider;
use litellm_rs::core::types::{CompletionRequest, CompletionResponse, FinishReason, Message, StreamChunk, Usage};
use litellm_rs::utils::clock::TestClock;
use litellm_rs::utils::error::{GatewayError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct ScriptedProvider {
    id: &'static str,
    stream_chunks: Vec<Result<StreamChunk>>,
    complete_results: Mutex<Vec<Result<CompletionResponse>>>,
    complete_calls: AtomicUsize,
}

impl ScriptedProvider {
    fn streaming(id: &'static str, chunks: Vec<Result<StreamChunk>>) -> Self {
        Self { id, stream_chunks: chunks, complete_results: Mutex::new(vec![]), complete_calls: AtomicUsize::new(0) }
    }

    fn completing(id: &'static str, results: Vec<Result<CompletionResponse>>) -> Self {
        Self { id, stream_chunks: vec![], complete_results: Mutex::new(results), complete_calls: AtomicUsize::new(0) }
    }
}

fn ok_response() -> CompletionResponse {
    CompletionResponse {
        id: "r".into(),
        content: "ok".into(),
        tool_calls: vec![],
        finish_reason: FinishReason::Stop,
        usage: Usage::default(),
        model: "stub-model".into(),
        created: 0,
        thinking: None,
        thinking_blocks: vec![],
        routing_info: None,
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let mut results = self.complete_results.lock().unwrap();
        if results.is_empty() {
            return Ok(ok_response());
        }
        results.remove(0)
    }

    async fn stream(&self, _request: CompletionRequest) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let items: Vec<Result<StreamChunk>> = self.stream_chunks.clone();
        Ok(Box::pin(stream::iter(items)))
    }

    fn model_ids(&self) -> Vec<String> {
        vec!["stub-model".into()]
    }
}

#[tokio::test]
async fn no_retry_after_partial_data_is_yielded() {
    let primary = Arc::new(ScriptedProvider::streaming(
        "primary",
        vec![Ok(StreamChunk::content_delta("1", "partial")), Err(GatewayError::internal("boom mid-stream"))],
    ));
    let fallback = Arc::new(ScriptedProvider::streaming("fallback", vec![Ok(StreamChunk::content_delta("2", "should-not-appear"))]));

    let wrapper = FallbackProvider::new(primary, vec![fallback], FallbackConfig::default());
    let mut out = wrapper.stream(CompletionRequest::new(vec![Message::user("hi")])).await.unwrap();

    let mut seen_text = Vec::new();
    let mut saw_terminal_error = false;
    while let Some(item) = out.next().await {
        match item {
            Ok(chunk) => {
                if let Some(delta) = chunk.delta.and_then(|d| d.content) {
                    seen_text.push(delta);
                }
            }
            Err(err) => {
                assert!(err.to_string().contains("Stream interrupted after partial data"));
                saw_terminal_error = true;
            }
        }
    }

    assert_eq!(seen_text, vec!["partial".to_string()]);
    assert!(saw_terminal_error);
    assert!(!seen_text.iter().any(|t| t == "should-not-appear"));
}

#[tokio::test]
async fn circuit_reopens_primary_after_cooldown_and_closes_on_success() {
    let primary = Arc::new(ScriptedProvider::completing(
        "primary",
        vec![
            Err(GatewayError::internal("boom")),
            Err(GatewayError::internal("boom")),
            Err(GatewayError::internal("boom")),
            Ok(ok_response()),
            Ok(ok_response()),
        ],
    ));
    let fallback = Arc::new(ScriptedProvider::completing(
        "fallback",
        vec![Ok(ok_response()), Ok(ok_response()), Ok(ok_response())],
    ));
    let clock = Arc::new(TestClock::new());

    let config = FallbackConfig {
        enable_fallback: true,
        circuit_breaker: CircuitBreakerConfig { failure_threshold: 3, cooldown: Duration::from_millis(60_000) },
    };
    let wrapper = FallbackProvider::new(primary.clone(), vec![fallback], config).with_clock(clock.clone());

    // Three consecutive primary failures open its circuit (fallback picks
    // up each retry, so these all still succeed end-to-end).
    for _ in 0..3 {
        let result = wrapper.complete(CompletionRequest::new(vec![Message::user("hi")])).await;
        assert!(result.is_ok());
    }
    assert_eq!(primary.complete_calls.load(Ordering::SeqCst), 3);

    // Circuit open: primary must be skipped entirely on the next call.
    let _ = wrapper.complete(CompletionRequest::new(vec![Message::user("hi")])).await;
    assert_eq!(primary.complete_calls.load(Ordering::SeqCst), 3);

    // Cooldown elapses: primary gets one half-open trial, which succeeds
    // (the 4th scripted response), closing the circuit.
    clock.advance(Duration::from_millis(60_000));
    let result = wrapper.complete(CompletionRequest::new(vec![Message::user("hi")])).await;
    assert!(result.is_ok());
    assert_eq!(primary.complete_calls.load(Ordering::SeqCst), 4);

    // Circuit closed again: primary is tried directly, no fallback needed.
    let result = wrapper.complete(CompletionRequest::new(vec![Message::user("hi")])).await;
    assert!(result.is_ok());
    assert_eq!(primary.complete_calls.load(Ordering::SeqCst), 5);
}
