//! Anthropic Messages API adapter: system-prompt cache-control splitting,
//! tool-name sanitization, thinking-block pass-through, named-event SSE.

use super::sanitize::{desanitize, sanitize};
use super::streaming::AnthropicTransformer;
use crate::config::ProviderConfig;
use crate::core::providers::sse::SseStream;
use crate::core::providers::{resolve_model, CancelSignal, Provider};
use crate::core::types::{
    CompletionRequest, CompletionResponse, Content, ContentPart, FinishReason, ImageSource,
    Message, Role, StreamChunk, ThinkingBlock, ThinkingConfig, ToolCall, ToolChoice,
    ToolDefinition, Usage,
};
use crate::utils::{GatewayError, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROMPT_CACHING_BETA: &str = "prompt-caching-2024-07-31";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// System-prompt split markers, checked in order; the earliest match wins.
const CONTEXT_MARKERS: &[&str] = &["## Current Context", "## Code Execution", "## File Operations"];

/// Metadata key under which accumulated thinking / redacted-thinking
/// content blocks are stashed on the assistant `Message` so a later
/// request in the same conversation can re-emit them verbatim.
pub const THINKING_BLOCKS_KEY: &str = "anthropic_thinking_blocks";

#[derive(Debug)]
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: Client,
    cancel: CancelSignal,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build http client: {e}")))?;
        Ok(Self { config, client, cancel: CancelSignal::new() })
    }

    fn endpoint(&self) -> String {
        format!("{}/messages", self.config.base_url.trim_end_matches('/'))
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

        let (system, conversation) = split_system_message(&request.messages);
        let messages: Vec<Value> = conversation.iter().map(message_to_json).collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": request.params.max_tokens.unwrap_or(4096),
            "stream": stream,
        });

        if let Some(system) = system {
            body["system"] = system;
        }
        if !request.params.stop.is_empty() {
            body["stop_sequences"] = json!(request.params.stop);
        }

        // Thinking forces temperature off and tool_choice to auto.
        let thinking_enabled = request.thinking.is_some();
        if !thinking_enabled {
            if let Some(top_p) = request.params.top_p {
                body["top_p"] = json!(top_p);
            }
            if let Some(temperature) = request.params.temperature {
                body["temperature"] = json!(temperature);
            }
        }
        if let Some(thinking) = &request.thinking {
            body["thinking"] = match thinking {
                ThinkingConfig::Adaptive => json!({ "type": "adaptive" }),
                ThinkingConfig::Budget { budget_tokens } => {
                    json!({ "type": "enabled", "budget_tokens": budget_tokens })
                }
            };
        }

        if let Some(tools) = &request.tools {
            body["tools"] = json!(tools.iter().map(tool_to_json).collect::<Vec<_>>());
        }
        if let Some(choice) = &request.tool_choice {
            if thinking_enabled {
                body["tool_choice"] = json!({ "type": "auto" });
            } else if let Some(mapped) = tool_choice_to_json(choice) {
                body["tool_choice"] = mapped;
            }
        }

        Ok(body)
    }
}

/// Split the leading system message (if any) out of the conversation and
/// produce Anthropic's `system` block array with the cache-control split.
fn split_system_message(messages: &[Message]) -> (Option<Value>, Vec<&Message>) {
    let mut system_text = None;
    let mut rest = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role == Role::System && system_text.is_none() {
            if let Content::Text(text) = &message.content {
                system_text = Some(text.clone());
                continue;
            }
        }
        rest.push(message);
    }

    let system = system_text.map(|text| {
        let earliest = CONTEXT_MARKERS
            .iter()
            .filter_map(|marker| text.find(marker))
            .min();

        match earliest {
            Some(0) => json!([{ "type": "text", "text": text }]),
            Some(pos) => {
                let prefix = text[..pos].trim_end();
                let suffix = &text[pos..];
                json!([
                    { "type": "text", "text": prefix, "cache_control": { "type": "ephemeral" } },
                    { "type": "text", "text": suffix },
                ])
            }
            None => json!([{ "type": "text", "text": text, "cache_control": { "type": "ephemeral" } }]),
        }
    });

    (system, rest)
}

fn message_to_json(message: &Message) -> Value {
    let role = match message.role {
        Role::User | Role::System => "user",
        Role::Assistant => "assistant",
        Role::Tool => "user",
    };

    let mut blocks: Vec<Value> = Vec::new();

    if let Some(Value::Array(preserved)) = message.metadata.get(THINKING_BLOCKS_KEY) {
        blocks.extend(preserved.iter().cloned());
    }

    if message.role == Role::Tool {
        if let Some(tool_call_id) = &message.tool_call_id {
            blocks.push(json!({
                "type": "tool_result",
                "tool_use_id": tool_call_id,
                "content": content_to_text(&message.content),
            }));
        }
    } else {
        match &message.content {
            Content::Text(text) if text.is_empty() && message.tool_calls.is_empty() => {}
            Content::Text(text) => blocks.push(json!({ "type": "text", "text": text })),
            Content::Parts(parts) => blocks.extend(parts.iter().map(content_part_to_json)),
        }
        for call in &message.tool_calls {
            blocks.push(json!({
                "type": "tool_use",
                "id": call.id,
                "name": sanitize(&call.name),
                "input": serde_json::from_str::<Value>(&call.arguments).unwrap_or(Value::Null),
            }));
        }
    }

    json!({ "role": role, "content": blocks })
}

fn content_to_text(content: &Content) -> String {
    match content {
        Content::Text(s) => s.clone(),
        Content::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.clone()),
                ContentPart::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join(""),
    }
}

fn content_part_to_json(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "type": "text", "text": text }),
        ContentPart::Image(ImageSource::Base64 { data, media_type }) => json!({
            "type": "image",
            "source": { "type": "base64", "media_type": media_type, "data": data },
        }),
        ContentPart::Image(ImageSource::Url { url }) => json!({
            "type": "image",
            "source": { "type": "url", "url": url },
        }),
    }
}

fn tool_to_json(tool: &ToolDefinition) -> Value {
    json!({
        "name": sanitize(&tool.name),
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

fn tool_choice_to_json(choice: &ToolChoice) -> Option<Value> {
    match choice {
        ToolChoice::Auto => Some(json!({ "type": "auto" })),
        ToolChoice::Required => Some(json!({ "type": "any" })),
        ToolChoice::None => None,
        ToolChoice::Named { name } => Some(json!({ "type": "tool", "name": sanitize(name) })),
    }
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

fn parse_completion(payload: &Value) -> Result<CompletionResponse> {
    let id = payload.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    let model = payload.get("model").and_then(Value::as_str).unwrap_or_default().to_string();

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    let mut thinking_text = String::new();
    let mut thinking_blocks = Vec::new();

    for block in payload.get("content").and_then(Value::as_array).into_iter().flatten() {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                content.push_str(block.get("text").and_then(Value::as_str).unwrap_or(""));
            }
            Some("tool_use") => {
                let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                tool_calls.push(ToolCall {
                    id: block.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    name: desanitize(name),
                    arguments: block.get("input").map(|v| v.to_string()).unwrap_or_else(|| "{}".to_string()),
                    metadata: Default::default(),
                });
            }
            Some("thinking") => {
                thinking_text.push_str(block.get("thinking").and_then(Value::as_str).unwrap_or(""));
                thinking_blocks.push(ThinkingBlock { data: block.clone(), redacted: false });
            }
            Some("redacted_thinking") => {
                thinking_blocks.push(ThinkingBlock { data: block.clone(), redacted: true });
            }
            _ => {}
        }
    }

    let finish_reason = payload
        .get("stop_reason")
        .and_then(Value::as_str)
        .map(map_finish_reason)
        .unwrap_or(FinishReason::Stop);

    let usage = payload.get("usage").map(|u| {
        let input = u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
        let output = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
        Usage {
            prompt_tokens: input,
            completion_tokens: output,
            total_tokens: input + output,
            cached_tokens: u.get("cache_read_input_tokens").and_then(Value::as_u64).map(|v| v as u32),
        }
    }).unwrap_or_default();

    Ok(CompletionResponse {
        id,
        content,
        tool_calls,
        finish_reason,
        usage,
        model,
        created: 0,
        thinking: if thinking_text.is_empty() { None } else { Some(thinking_text) },
        thinking_blocks,
        routing_info: None,
    })
}

fn map_error_response(provider: &str, status: u16, body: String) -> GatewayError {
    match status {
        400 | 404 | 422 => GatewayError::validation(format!("{provider}: {body}")),
        401 | 403 => GatewayError::validation(format!("{provider}: invalid api key ({body})")),
        408 | 429 | 529 | 502 | 503 | 504 => GatewayError::timeout(format!("{provider}: {body}")),
        _ => GatewayError::internal(format!("{provider}: http {status}: {body}")),
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
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
            .guard(async {
                self.client
                    .post(self.endpoint())
                    .header("x-api-key", api_key.clone())
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .header("anthropic-beta", PROMPT_CACHING_BETA)
                    .json(&body)
                    .send()
                    .await
                    .map_err(GatewayError::from)
            })
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
                    .header("x-api-key", api_key.clone())
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .header("anthropic-beta", PROMPT_CACHING_BETA)
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

        let transformer = AnthropicTransformer::default();
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn system_split_caches_prefix_before_marker() {
        let messages = vec![Message::system(
            "You are a helper.\n\n## Current Context\nToday is Tuesday.",
        )];
        let (system, rest) = split_system_message(&messages);
        assert!(rest.is_empty());
        let system = system.unwrap();
        assert_eq!(system[0]["text"], "You are a helper.");
        assert_eq!(system[0]["cache_control"]["type"], "ephemeral");
        assert_eq!(system[1]["text"], "## Current Context\nToday is Tuesday.");
        assert!(system[1].get("cache_control").is_none());
    }

    #[test]
    fn system_with_no_marker_caches_whole_block() {
        let messages = vec![Message::system("You are a plain helper with no markers.")];
        let (system, _) = split_system_message(&messages);
        let system = system.unwrap();
        assert_eq!(system.as_array().unwrap().len(), 1);
        assert_eq!(system[0]["cache_control"]["type"], "ephemeral");
    }

    #[test]
    fn thinking_enabled_omits_temperature_and_forces_auto_tool_choice() {
        let mut request = CompletionRequest::new(vec![Message::user("hi")]);
        request.params.temperature = Some(0.9);
        request.thinking = Some(ThinkingConfig::Adaptive);
        request.tool_choice = Some(ToolChoice::Required);

        let config = ProviderConfig {
            id: "anthropic".into(),
            name: "Anthropic".into(),
            provider_type: crate::config::ProviderType::Anthropic,
            base_url: "https://api.anthropic.com/v1".into(),
            api_key_env: "ANTHROPIC_API_KEY".into(),
            api_key: Some("k".into()),
            features: Default::default(),
            models: vec![],
        };
        request.model.model = "claude-3-5-sonnet".into();
        let provider = AnthropicProvider::new(config).unwrap();
        let body = provider.build_body(&request, false).unwrap();

        assert!(body.get("temperature").is_none());
        assert_eq!(body["tool_choice"]["type"], "auto");
    }

    #[test]
    fn tool_use_block_desanitizes_name() {
        let payload = json!({
            "id": "msg_1",
            "model": "claude-3-5-sonnet",
            "content": [{ "type": "tool_use", "id": "call_1", "name": "fs__read", "input": {} }],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 5, "output_tokens": 3 },
        });
        let response = parse_completion(&payload).unwrap();
        assert_eq!(response.tool_calls[0].name, "fs.read");
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn preserved_thinking_blocks_are_prepended_on_reemission() {
        let mut metadata = HashMap::new();
        metadata.insert(
            THINKING_BLOCKS_KEY.to_string(),
            json!([{ "type": "redacted_thinking", "data": "opaque" }]),
        );
        let message = Message {
            role: Role::Assistant,
            content: Content::Text("ok".into()),
            tool_calls: vec![],
            tool_call_id: None,
            metadata,
        };
        let json = message_to_json(&message);
        assert_eq!(json["content"][0]["type"], "redacted_thinking");
        assert_eq!(json["content"][1]["text"], "ok");
    }
}
