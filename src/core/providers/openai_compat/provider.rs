//! Adapter for OpenAI and every OpenAI-wire-compatible backend (Groq,
//! Mistral, Cohere, OpenRouter, Together AI, Fireworks, Perplexity,
//! DeepInfra, xAI, Moonshot, Alibaba, Nvidia, Vultr, GitHub Models,
//! HuggingFace). One wire format, many base URLs.

use super::streaming::OpenAiCompatTransformer;
use crate::config::ProviderConfig;
use crate::core::providers::sse::SseStream;
use crate::core::providers::{resolve_model, CancelSignal, Provider};
use crate::core::types::{
    CompletionRequest, CompletionResponse, Content, ContentPart, FinishReason, ImageSource,
    Message, Role, StreamChunk, ToolCall, ToolChoice, ToolDefinition, Usage,
};
use crate::utils::{GatewayError, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug)]
pub struct OpenAiCompatibleProvider {
    config: ProviderConfig,
    client: Client,
    cancel: CancelSignal,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build http client: {e}")))?;
        Ok(Self { config, client, cancel: CancelSignal::new() })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn api_key(&self) -> Result<&str> {
        self.config.api_key.as_deref().ok_or_else(|| {
            GatewayError::validation(format!(
                "provider '{}' is not configured: api key not set",
                self.config.id
            ))
        })
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> Result<Value> {
        let model = resolve_model(&request.model, self.config.default_model_id())?;
        let messages: Vec<Value> = request.messages.iter().map(message_to_json).collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });

        if let Some(max_tokens) = request.params.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.params.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.params.top_p {
            body["top_p"] = json!(top_p);
        }
        if !request.params.stop.is_empty() {
            body["stop"] = json!(request.params.stop);
        }
        if let Some(tools) = &request.tools {
            body["tools"] = json!(tools.iter().map(tool_to_json).collect::<Vec<_>>());
        }
        if let Some(choice) = &request.tool_choice {
            body["tool_choice"] = tool_choice_to_json(choice);
        }

        Ok(body)
    }
}

fn message_to_json(message: &Message) -> Value {
    let mut obj = json!({
        "role": role_str(message.role),
        "content": content_to_json(&message.content),
    });
    if !message.tool_calls.is_empty() {
        obj["tool_calls"] = json!(message
            .tool_calls
            .iter()
            .map(|tc| json!({
                "id": tc.id,
                "type": "function",
                "function": { "name": tc.name, "arguments": tc.arguments },
            }))
            .collect::<Vec<_>>());
    }
    if let Some(id) = &message.tool_call_id {
        obj["tool_call_id"] = json!(id);
    }
    obj
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn content_to_json(content: &Content) -> Value {
    match content {
        Content::Text(s) => json!(s),
        Content::Parts(parts) if parts.is_empty() => json!(""),
        Content::Parts(parts) => json!(parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                ContentPart::Image(ImageSource::Url { url }) => {
                    json!({ "type": "image_url", "image_url": { "url": url } })
                }
                ContentPart::Image(ImageSource::Base64 { data, media_type }) => {
                    json!({
                        "type": "image_url",
                        "image_url": { "url": format!("data:{media_type};base64,{data}") },
                    })
                }
            })
            .collect::<Vec<_>>()),
    }
}

fn tool_to_json(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

fn tool_choice_to_json(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Named { name } => json!({ "type": "function", "function": { "name": name } }),
    }
}

pub(super) fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn is_ready(&self) -> bool {
        self.config.is_configured()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_body(&request, false)?;
        tracing::debug!(
            provider = %self.config.id,
            model = %body["model"],
            message_count = request.messages.len(),
            "dispatching non-streaming completion"
        );

        let api_key = self.api_key()?.to_string();
        let response = self
            .cancel
            .guard(async { self.client.post(self.endpoint()).bearer_auth(api_key).json(&body).send().await.map_err(GatewayError::from) })
            .await?;

        if !response.status().is_success() {
            return Err(map_error_response(&self.config.id, response.status().as_u16(), response.text().await.unwrap_or_default()));
        }

        let payload: Value = response.json().await?;
        parse_completion(&payload)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let body = self.build_body(&request, true)?;
        tracing::debug!(
            provider = %self.config.id,
            model = %body["model"],
            message_count = request.messages.len(),
            "dispatching streaming completion"
        );

        let api_key = self.api_key()?.to_string();
        let response = self
            .cancel
            .guard(async {
                self.client
                    .post(self.endpoint())
                    .bearer_auth(api_key)
                    .header("Accept", "text/event-stream")
                    .json(&body)
                    .send()
                    .await
                    .map_err(GatewayError::from)
            })
            .await?;

        if !response.status().is_success() {
            return Err(map_error_response(&self.config.id, response.status().as_u16(), response.text().await.unwrap_or_default()));
        }

        let transformer = OpenAiCompatTransformer::default();
        let stream = SseStream::new(response.bytes_stream(), transformer);
        Ok(Box::pin(stream))
    }

    fn model_ids(&self) -> Vec<String> {
        self.config.models.iter().map(|m| m.id.clone()).collect()
    }

    async fn cancel(&self) {
        self.cancel.cancel();
    }
}

fn map_error_response(provider: &str, status: u16, body: String) -> GatewayError {
    match status {
        400 | 404 | 422 => GatewayError::validation(format!("{provider}: {body}")),
        401 | 403 => GatewayError::validation(format!("{provider}: invalid api key ({body})")),
        408 | 429 | 502 | 503 | 504 => GatewayError::timeout(format!("{provider}: {body}")),
        _ => GatewayError::internal(format!("{provider}: http {status}: {body}")),
    }
}

fn parse_completion(payload: &Value) -> Result<CompletionResponse> {
    let id = payload
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let model = payload
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let created = payload.get("created").and_then(Value::as_i64).unwrap_or(0);

    let choice = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| GatewayError::internal("response had no choices"))?;

    let message = choice.get("message").ok_or_else(|| GatewayError::internal("choice had no message"))?;
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    Some(ToolCall {
                        id: c.get("id")?.as_str()?.to_string(),
                        name: c.get("function")?.get("name")?.as_str()?.to_string(),
                        arguments: c
                            .get("function")?
                            .get("arguments")
                            .and_then(Value::as_str)
                            .unwrap_or("{}")
                            .to_string(),
                        metadata: Default::default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(parse_finish_reason)
        .unwrap_or(FinishReason::Stop);

    let usage = payload
        .get("usage")
        .map(|u| Usage {
            prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            completion_tokens: u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            cached_tokens: u
                .get("prompt_tokens_details")
                .and_then(|d| d.get("cached_tokens"))
                .and_then(Value::as_u64)
                .map(|v| v as u32),
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        id,
        content,
        tool_calls,
        finish_reason,
        usage,
        model,
        created,
        thinking: None,
        thinking_blocks: Vec::new(),
        routing_info: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;
    use std::collections::HashMap;

    #[test]
    fn empty_parts_content_serializes_to_empty_string() {
        let content = Content::Parts(vec![]);
        assert_eq!(content_to_json(&content), json!(""));
    }

    #[test]
    fn tool_call_message_round_trips_id_and_name() {
        let message = Message {
            role: Role::Assistant,
            content: Content::Text(String::new()),
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: "lookup".into(),
                arguments: "{}".into(),
                metadata: HashMap::new(),
            }],
            tool_call_id: None,
            metadata: HashMap::new(),
        };
        let json = message_to_json(&message);
        assert_eq!(json["tool_calls"][0]["function"]["name"], "lookup");
    }

    #[test]
    fn parse_finish_reason_maps_known_values() {
        assert_eq!(parse_finish_reason("length"), FinishReason::Length);
        assert_eq!(parse_finish_reason("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(parse_finish_reason("stop"), FinishReason::Stop);
        assert_eq!(parse_finish_reason("anything_else"), FinishReason::Stop);
    }

    #[test]
    fn parse_completion_extracts_content_and_usage() {
        let payload = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "created": 100,
            "choices": [{
                "message": { "content": "hi there" },
                "finish_reason": "stop",
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12 },
        });
        let response = parse_completion(&payload).unwrap();
        assert_eq!(response.content, "hi there");
        assert_eq!(response.usage.total_tokens, 12);
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }
}
