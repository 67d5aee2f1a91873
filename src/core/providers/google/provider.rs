//! Google (Gemini) `generateContent` / `streamGenerateContent` adapter.
//!
//! The URL embeds both the model id and the operation; the API key travels
//! as a query parameter rather than a header.

use super::streaming::GoogleTransformer;
use crate::config::ProviderConfig;
use crate::core::providers::sse::SseStream;
use crate::core::providers::{resolve_model, CancelSignal, Provider};
use crate::core::types::{
    CompletionRequest, CompletionResponse, Content, ContentPart, FinishReason, ImageSource,
    Message, Role, StreamChunk, ToolCall, ToolDefinition, Usage,
};
use crate::utils::{GatewayError, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Metadata key a `ToolCall` carries its Gemini thought-signature under.
pub const THOUGHT_SIGNATURE_KEY: &str = "thought_signature";

#[derive(Debug)]
pub struct GoogleProvider {
    config: ProviderConfig,
    client: Client,
    cancel: CancelSignal,
}

impl GoogleProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build http client: {e}")))?;
        Ok(Self { config, client, cancel: CancelSignal::new() })
    }

    fn api_key(&self) -> Result<&str> {
        self.config.api_key.as_deref().ok_or_else(|| {
            GatewayError::validation(format!(
                "provider '{}' is not configured: api key not set",
                self.config.id
            ))
        })
    }

    fn url(&self, model: &str, operation: &str, stream: bool) -> Result<String> {
        let base = self.config.base_url.trim_end_matches('/');
        let key = self.api_key()?;
        let alt = if stream { "&alt=sse" } else { "" };
        Ok(format!("{base}/models/{model}:{operation}?key={key}{alt}"))
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let call_index = index_tool_calls(&request.messages);
        let system = system_instruction(&request.messages);
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| message_to_content(m, &call_index))
            .collect();

        let mut body = json!({ "contents": contents });
        if let Some(system) = system {
            body["systemInstruction"] = system;
        }

        let mut generation_config = json!({});
        if let Some(max_tokens) = request.params.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.params.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.params.top_p {
            generation_config["topP"] = json!(top_p);
        }
        if !request.params.stop.is_empty() {
            generation_config["stopSequences"] = json!(request.params.stop);
        }
        if generation_config.as_object().is_some_and(|o| !o.is_empty()) {
            body["generationConfig"] = generation_config;
        }

        if let Some(tools) = &request.tools {
            body["tools"] = json!([{ "functionDeclarations": tools.iter().map(tool_to_json).collect::<Vec<_>>() }]);
        }

        body
    }
}

/// `(call_id -> (name, thought_signature))`, scanned across the whole
/// conversation so a later `functionResponse` can re-attach the signature
/// that arrived on the originating `functionCall`.
fn index_tool_calls(messages: &[Message]) -> HashMap<String, (String, Option<String>)> {
    let mut map = HashMap::new();
    for message in messages {
        for call in &message.tool_calls {
            let signature = call
                .metadata
                .get(THOUGHT_SIGNATURE_KEY)
                .and_then(Value::as_str)
                .map(str::to_string);
            map.insert(call.id.clone(), (call.name.clone(), signature));
        }
    }
    map
}

fn system_instruction(messages: &[Message]) -> Option<Value> {
    messages.iter().find(|m| m.role == Role::System).map(|m| {
        json!({ "parts": [{ "text": content_to_text(&m.content) }] })
    })
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

fn message_to_content(message: &Message, call_index: &HashMap<String, (String, Option<String>)>) -> Value {
    let role = match message.role {
        Role::Assistant => "model",
        _ => "user",
    };

    let mut parts: Vec<Value> = Vec::new();

    if message.role == Role::Tool {
        if let Some(call_id) = &message.tool_call_id {
            let (name, signature) = call_index
                .get(call_id)
                .cloned()
                .unwrap_or_else(|| (call_id.clone(), None));
            let mut part = json!({
                "functionResponse": {
                    "name": name,
                    "response": { "content": content_to_text(&message.content) },
                },
            });
            if let Some(signature) = signature {
                part["thoughtSignature"] = json!(signature);
            }
            parts.push(part);
        }
        return json!({ "role": role, "parts": parts });
    }

    match &message.content {
        Content::Parts(p) => parts.extend(p.iter().map(content_part_to_json)),
        Content::Text(text) if !text.is_empty() => parts.push(json!({ "text": text })),
        Content::Text(_) => {}
    }
    for call in &message.tool_calls {
        let mut part = json!({
            "functionCall": {
                "name": call.name,
                "args": serde_json::from_str::<Value>(&call.arguments).unwrap_or(Value::Null),
            },
        });
        if let Some(signature) = call.metadata.get(THOUGHT_SIGNATURE_KEY) {
            part["thoughtSignature"] = signature.clone();
        }
        parts.push(part);
    }

    json!({ "role": role, "parts": parts })
}

fn content_part_to_json(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "text": text }),
        ContentPart::Image(ImageSource::Base64 { data, media_type }) => {
            json!({ "inlineData": { "mimeType": media_type, "data": data } })
        }
        ContentPart::Image(ImageSource::Url { url }) => json!({ "text": format!("[image: {url}]") }),
    }
}

fn tool_to_json(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

pub(super) fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" => FinishReason::ContentFilter,
        "FUNCTION_CALL" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

fn parse_completion(payload: &Value, model: &str) -> Result<CompletionResponse> {
    let candidate = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| GatewayError::internal("response had no candidates"))?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for part in candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if part.get("thought").and_then(Value::as_bool) == Some(true) {
            continue;
        }
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            content.push_str(text);
        } else if let Some(call) = part.get("functionCall") {
            let mut metadata = HashMap::new();
            if let Some(sig) = part.get("thoughtSignature") {
                metadata.insert(THOUGHT_SIGNATURE_KEY.to_string(), sig.clone());
            }
            tool_calls.push(ToolCall {
                id: call.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                name: call.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                arguments: call.get("args").map(|v| v.to_string()).unwrap_or_else(|| "{}".to_string()),
                metadata,
            });
        }
    }

    let finish_reason = candidate
        .get("finishReason")
        .and_then(Value::as_str)
        .map(map_finish_reason)
        .unwrap_or(FinishReason::Stop);

    let usage = payload.get("usageMetadata").map(|u| Usage {
        prompt_tokens: u.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
        completion_tokens: u.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
        total_tokens: u.get("totalTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
        cached_tokens: u.get("cachedContentTokenCount").and_then(Value::as_u64).map(|v| v as u32),
    }).unwrap_or_default();

    Ok(CompletionResponse {
        id: String::new(),
        content,
        tool_calls,
        finish_reason,
        usage,
        model: model.to_string(),
        created: 0,
        thinking: None,
        thinking_blocks: Vec::new(),
        routing_info: None,
    })
}

fn map_error_response(provider: &str, status: u16, body: String) -> GatewayError {
    match status {
        400 | 404 => GatewayError::validation(format!("{provider}: {body}")),
        401 | 403 => GatewayError::validation(format!("{provider}: invalid api key ({body})")),
        408 | 429 | 503 | 504 => GatewayError::timeout(format!("{provider}: {body}")),
        _ => GatewayError::internal(format!("{provider}: http {status}: {body}")),
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn is_ready(&self) -> bool {
        self.config.is_configured()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = resolve_model(&request.model, self.config.default_model_id())?;
        let body = self.build_body(&request);
        tracing::debug!(provider = %self.config.id, %model, message_count = request.messages.len(), "dispatching non-streaming completion");

        let url = self.url(&model, "generateContent", false)?;
        let response = self.cancel.guard(async { self.client.post(url).json(&body).send().await.map_err(GatewayError::from) }).await?;

        if !response.status().is_success() {
            return Err(map_error_response(&self.config.id, response.status().as_u16(), response.text().await.unwrap_or_default()));
        }

        let payload: Value = response.json().await?;
        parse_completion(&payload, &model)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let model = resolve_model(&request.model, self.config.default_model_id())?;
        let body = self.build_body(&request);
        tracing::debug!(provider = %self.config.id, %model, message_count = request.messages.len(), "dispatching streaming completion");

        let url = self.url(&model, "streamGenerateContent", true)?;
        let response = self.cancel.guard(async { self.client.post(url).json(&body).send().await.map_err(GatewayError::from) }).await?;

        if !response.status().is_success() {
            return Err(map_error_response(&self.config.id, response.status().as_u16(), response.text().await.unwrap_or_default()));
        }

        let transformer = GoogleTransformer::new(model);
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

    #[test]
    fn finish_reason_maps_safety_family_to_content_filter() {
        assert_eq!(map_finish_reason("SAFETY"), FinishReason::ContentFilter);
        assert_eq!(map_finish_reason("RECITATION"), FinishReason::ContentFilter);
        assert_eq!(map_finish_reason("BLOCKLIST"), FinishReason::ContentFilter);
        assert_eq!(map_finish_reason("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(map_finish_reason("FUNCTION_CALL"), FinishReason::ToolCalls);
        assert_eq!(map_finish_reason("STOP"), FinishReason::Stop);
    }

    #[test]
    fn parse_completion_skips_thought_parts_from_visible_content() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "hidden", "thought": true },
                    { "text": "visible" },
                ]},
                "finishReason": "STOP",
            }],
        });
        let response = parse_completion(&payload, "gemini-1.5-pro").unwrap();
        assert_eq!(response.content, "visible");
    }

    #[test]
    fn function_call_thought_signature_lands_in_tool_call_metadata() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [
                    { "functionCall": { "name": "lookup", "args": {} }, "thoughtSignature": "sig-1" },
                ]},
                "finishReason": "FUNCTION_CALL",
            }],
        });
        let response = parse_completion(&payload, "gemini-1.5-pro").unwrap();
        assert_eq!(
            response.tool_calls[0].metadata.get(THOUGHT_SIGNATURE_KEY).unwrap(),
            "sig-1"
        );
    }

    #[test]
    fn url_images_become_text_placeholders() {
        let part = ContentPart::Image(ImageSource::Url { url: "https://x/y.png".into() });
        assert_eq!(content_part_to_json(&part), json!({ "text": "[image: https://x/y.png]" }));
    }
}
