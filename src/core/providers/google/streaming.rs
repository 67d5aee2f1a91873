//! SSE transform step for Gemini's `streamGenerateContent?alt=sse`: bare
//! `data: {json}` chunks shaped like the non-streaming response body.

use super::provider::{map_finish_reason, THOUGHT_SIGNATURE_KEY};
use crate::core::providers::sse::SseTransformer;
use crate::core::types::{StreamChunk, StreamDelta, ToolCallDelta, Usage};
use crate::utils::Result;
use serde_json::Value;

pub struct GoogleTransformer {
    model: String,
}

impl GoogleTransformer {
    pub fn new(model: String) -> Self {
        Self { model }
    }
}

impl SseTransformer for GoogleTransformer {
    fn provider_name(&self) -> &'static str {
        "google"
    }

    fn transform(&mut self, _event_type: Option<&str>, data: &str) -> Result<Vec<StreamChunk>> {
        let payload: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "provider.stream", provider = "google", error = %e, "dropping malformed stream chunk");
                return Ok(Vec::new());
            }
        };

        let Some(candidate) = payload.get("candidates").and_then(Value::as_array).and_then(|c| c.first()) else {
            return Ok(Vec::new());
        };

        let mut chunks = Vec::new();

        for (index, part) in candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .enumerate()
        {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                let is_thinking = part.get("thought").and_then(Value::as_bool) == Some(true);
                chunks.push(StreamChunk {
                    id: self.model.clone(),
                    delta: Some(StreamDelta { content: Some(text.to_string()), tool_call: None }),
                    metadata: if is_thinking { Some(serde_json::json!({ "type": "thinking" })) } else { None },
                    done: false,
                    finish_reason: None,
                    usage: None,
                    routing_info: None,
                });
            } else if let Some(call) = part.get("functionCall") {
                let name = call.get("name").and_then(Value::as_str).map(str::to_string);
                let metadata = part.get("thoughtSignature").map(|sig| {
                    let mut map = serde_json::Map::new();
                    map.insert(THOUGHT_SIGNATURE_KEY.to_string(), sig.clone());
                    Value::Object(map)
                });
                chunks.push(StreamChunk {
                    id: self.model.clone(),
                    delta: Some(StreamDelta {
                        content: None,
                        tool_call: Some(ToolCallDelta {
                            index,
                            id: name.clone(),
                            name,
                            arguments_fragment: call.get("args").map(|v| v.to_string()),
                        }),
                    }),
                    metadata,
                    done: false,
                    finish_reason: None,
                    usage: None,
                    routing_info: None,
                });
            }
        }

        if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
            let usage = payload.get("usageMetadata").map(|u| Usage {
                prompt_tokens: u.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
                completion_tokens: u.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
                total_tokens: u.get("totalTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
                cached_tokens: None,
            }).unwrap_or_default();
            chunks.push(StreamChunk::terminal(self.model.clone(), map_finish_reason(reason), usage));
        }

        Ok(chunks)
    }
}
