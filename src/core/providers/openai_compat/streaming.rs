//! SSE transform step for the OpenAI-compatible wire format: bare
//! `data: {json}` lines, terminated by `data: [DONE]`.

use super::provider::parse_finish_reason;
use crate::core::providers::sse::SseTransformer;
use crate::core::types::{StreamChunk, StreamDelta, ToolCallDelta, Usage};
use crate::utils::Result;
use serde_json::Value;

#[derive(Default)]
pub struct OpenAiCompatTransformer {
    stream_id: Option<String>,
}

impl SseTransformer for OpenAiCompatTransformer {
    fn provider_name(&self) -> &'static str {
        "openai-compatible"
    }

    fn transform(&mut self, _event_type: Option<&str>, data: &str) -> Result<Vec<StreamChunk>> {
        let payload: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "provider.stream", provider = "openai-compatible", error = %e, "dropping malformed stream chunk");
                return Ok(Vec::new());
            }
        };

        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.stream_id.clone())
            .unwrap_or_default();
        self.stream_id = Some(id.clone());

        let Some(choice) = payload.get("choices").and_then(Value::as_array).and_then(|c| c.first()) else {
            return Ok(Vec::new());
        };
        let delta_obj = choice.get("delta");

        let content = delta_obj
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let tool_call = delta_obj
            .and_then(|d| d.get("tool_calls"))
            .and_then(Value::as_array)
            .and_then(|calls| calls.first())
            .map(|call| ToolCallDelta {
                index: call.get("index").and_then(Value::as_u64).unwrap_or(0) as usize,
                id: call.get("id").and_then(Value::as_str).map(str::to_string),
                name: call
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                arguments_fragment: call
                    .get("function")
                    .and_then(|f| f.get("arguments"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });

        let finish_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(parse_finish_reason);

        let usage = payload.get("usage").map(|u| Usage {
            prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            completion_tokens: u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            cached_tokens: None,
        });

        if let Some(reason) = finish_reason {
            return Ok(vec![StreamChunk::terminal(id, reason, usage.unwrap_or_default())]);
        }

        if content.is_none() && tool_call.is_none() {
            return Ok(Vec::new());
        }

        Ok(vec![StreamChunk {
            id,
            delta: Some(StreamDelta { content, tool_call }),
            metadata: None,
            done: false,
            finish_reason: None,
            usage: None,
            routing_info: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_delta_yields_content_chunk() {
        let mut t = OpenAiCompatTransformer::default();
        let chunks = t
            .transform(
                None,
                r#"{"id":"c1","choices":[{"delta":{"content":"hi"},"index":0}]}"#,
            )
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].delta.as_ref().unwrap().content.as_deref(), Some("hi"));
    }

    #[test]
    fn finish_reason_yields_terminal_chunk() {
        let mut t = OpenAiCompatTransformer::default();
        let chunks = t
            .transform(
                None,
                r#"{"id":"c1","choices":[{"delta":{},"finish_reason":"stop","index":0}]}"#,
            )
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].done);
    }

    #[test]
    fn empty_delta_yields_no_chunk() {
        let mut t = OpenAiCompatTransformer::default();
        let chunks = t
            .transform(None, r#"{"id":"c1","choices":[{"delta":{},"index":0}]}"#)
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn malformed_json_payload_is_dropped_not_errored() {
        let mut t = OpenAiCompatTransformer::default();
        let chunks = t.transform(None, "{not json").unwrap();
        assert!(chunks.is_empty());
    }
}
