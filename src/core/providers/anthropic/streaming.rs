//! SSE transform step for Anthropic's named-event streaming protocol.
//!
//! Text and thinking deltas are forwarded chunk-by-chunk. Tool-call
//! argument fragments arrive piecewise as `input_json_delta` and are
//! accumulated per content-block index, then yielded as a single complete
//! tool-call delta when the block closes.

use super::sanitize::desanitize;
use crate::core::providers::sse::SseTransformer;
use crate::core::types::{FinishReason, StreamChunk, StreamDelta, ToolCallDelta, Usage};
use crate::utils::{GatewayError, Result};
use serde_json::Value;
use std::collections::HashMap;

enum BlockKind {
    Text,
    ToolUse { id: String, name: String, json_buffer: String },
    Thinking { text: String, signature: Option<String>, redacted: bool },
}

#[derive(Default)]
pub struct AnthropicTransformer {
    message_id: String,
    blocks: HashMap<usize, BlockKind>,
    stop_reason: Option<String>,
    usage: Usage,
    /// Closed thinking/redacted-thinking blocks, signature included, ready
    /// to land on the terminal chunk the way `thinking_blocks` lands on a
    /// non-streaming [`crate::core::types::CompletionResponse`].
    thinking_blocks: Vec<Value>,
}

impl SseTransformer for AnthropicTransformer {
    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn transform(&mut self, event_type: Option<&str>, data: &str) -> Result<Vec<StreamChunk>> {
        let event_type = event_type.unwrap_or_default();
        let payload: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "provider.stream", provider = "anthropic", error = %e, "dropping malformed stream chunk");
                return Ok(Vec::new());
            }
        };

        match event_type {
            "message_start" => {
                if let Some(id) = payload.get("message").and_then(|m| m.get("id")).and_then(Value::as_str) {
                    self.message_id = id.to_string();
                }
                Ok(Vec::new())
            }
            "content_block_start" => {
                let index = payload.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                if let Some(block) = payload.get("content_block") {
                    let kind = match block.get("type").and_then(Value::as_str) {
                        Some("tool_use") => BlockKind::ToolUse {
                            id: block.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                            name: block.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                            json_buffer: String::new(),
                        },
                        Some("thinking") => BlockKind::Thinking { text: String::new(), signature: None, redacted: false },
                        Some("redacted_thinking") => BlockKind::Thinking {
                            text: String::new(),
                            signature: block.get("data").and_then(Value::as_str).map(str::to_string),
                            redacted: true,
                        },
                        _ => BlockKind::Text,
                    };
                    self.blocks.insert(index, kind);
                }
                Ok(Vec::new())
            }
            "content_block_delta" => self.handle_delta(&payload),
            "content_block_stop" => {
                let index = payload.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                match self.blocks.remove(&index) {
                    Some(BlockKind::ToolUse { id, name, json_buffer }) => {
                        Ok(vec![StreamChunk {
                            id: self.message_id.clone(),
                            delta: Some(StreamDelta {
                                content: None,
                                tool_call: Some(ToolCallDelta {
                                    index,
                                    id: Some(id),
                                    name: Some(desanitize(&name)),
                                    arguments_fragment: Some(if json_buffer.is_empty() {
                                        "{}".to_string()
                                    } else {
                                        json_buffer
                                    }),
                                }),
                            }),
                            metadata: None,
                            done: false,
                            finish_reason: None,
                            usage: None,
                            routing_info: None,
                        }])
                    }
                    Some(BlockKind::Thinking { text, signature, redacted }) => {
                        let mut data = serde_json::json!({
                            "type": if redacted { "redacted_thinking" } else { "thinking" },
                            "thinking": text,
                        });
                        if let Some(sig) = signature {
                            data["signature"] = Value::String(sig);
                        }
                        self.thinking_blocks.push(data);
                        Ok(Vec::new())
                    }
                    _ => Ok(Vec::new()),
                }
            }
            "message_delta" => {
                if let Some(reason) = payload.get("delta").and_then(|d| d.get("stop_reason")).and_then(Value::as_str) {
                    self.stop_reason = Some(reason.to_string());
                }
                if let Some(usage) = payload.get("usage") {
                    let input = usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
                    let output = usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
                    self.usage = Usage {
                        prompt_tokens: input,
                        completion_tokens: output,
                        total_tokens: input + output,
                        cached_tokens: usage.get("cache_read_input_tokens").and_then(Value::as_u64).map(|v| v as u32),
                    };
                }
                Ok(Vec::new())
            }
            "message_stop" => {
                let finish_reason = match self.stop_reason.as_deref() {
                    Some("max_tokens") => FinishReason::Length,
                    Some("tool_use") => FinishReason::ToolCalls,
                    _ => FinishReason::Stop,
                };
                let mut chunk = StreamChunk::terminal(self.message_id.clone(), finish_reason, self.usage.clone());
                if !self.thinking_blocks.is_empty() {
                    chunk.metadata = Some(serde_json::json!({ "thinking_blocks": self.thinking_blocks }));
                }
                Ok(vec![chunk])
            }
            "error" => {
                let message = payload
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("anthropic stream error");
                Err(GatewayError::internal(message))
            }
            _ => Ok(Vec::new()),
        }
    }
}

impl AnthropicTransformer {
    fn handle_delta(&mut self, payload: &Value) -> Result<Vec<StreamChunk>> {
        let index = payload.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
        let Some(delta) = payload.get("delta") else { return Ok(Vec::new()) };
        let delta_type = delta.get("type").and_then(Value::as_str).unwrap_or_default();

        match delta_type {
            "text_delta" => {
                let text = delta.get("text").and_then(Value::as_str).unwrap_or("");
                Ok(vec![StreamChunk::content_delta(self.message_id.clone(), text)])
            }
            "input_json_delta" => {
                if let Some(BlockKind::ToolUse { json_buffer, .. }) = self.blocks.get_mut(&index) {
                    json_buffer.push_str(delta.get("partial_json").and_then(Value::as_str).unwrap_or(""));
                }
                Ok(Vec::new())
            }
            "thinking_delta" => {
                let text = delta.get("thinking").and_then(Value::as_str).unwrap_or("");
                if let Some(BlockKind::Thinking { text: buffer, .. }) = self.blocks.get_mut(&index) {
                    buffer.push_str(text);
                }
                Ok(vec![StreamChunk {
                    id: self.message_id.clone(),
                    delta: Some(StreamDelta { content: Some(text.to_string()), tool_call: None }),
                    metadata: Some(serde_json::json!({ "type": "thinking" })),
                    done: false,
                    finish_reason: None,
                    usage: None,
                    routing_info: None,
                }])
            }
            "signature_delta" => {
                if let Some(BlockKind::Thinking { signature, .. }) = self.blocks.get_mut(&index) {
                    *signature = delta.get("signature").and_then(Value::as_str).map(str::to_string);
                }
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_forwards_immediately() {
        let mut t = AnthropicTransformer::default();
        let chunks = t
            .transform(Some("content_block_delta"), r#"{"index":0,"delta":{"type":"text_delta","text":"hi"}}"#)
            .unwrap();
        assert_eq!(chunks[0].delta.as_ref().unwrap().content.as_deref(), Some("hi"));
    }

    #[test]
    fn tool_call_arguments_accumulate_and_emit_once_at_block_stop() {
        let mut t = AnthropicTransformer::default();
        t.transform(
            Some("content_block_start"),
            r#"{"index":0,"content_block":{"type":"tool_use","id":"call_1","name":"fs__read"}}"#,
        )
        .unwrap();
        let mid = t
            .transform(Some("content_block_delta"), r#"{"index":0,"delta":{"type":"input_json_delta","partial_json":"{\"path\""}}"#)
            .unwrap();
        assert!(mid.is_empty());
        let mid2 = t
            .transform(Some("content_block_delta"), r#"{"index":0,"delta":{"type":"input_json_delta","partial_json":":\"a\"}"}}"#)
            .unwrap();
        assert!(mid2.is_empty());
        let stop = t.transform(Some("content_block_stop"), r#"{"index":0}"#).unwrap();
        assert_eq!(stop.len(), 1);
        let tool_call = stop[0].delta.as_ref().unwrap().tool_call.as_ref().unwrap();
        assert_eq!(tool_call.name.as_deref(), Some("fs.read"));
        assert_eq!(tool_call.arguments_fragment.as_deref(), Some(r#"{"path":"a"}"#));
    }

    #[test]
    fn message_stop_emits_terminal_chunk_with_mapped_finish_reason() {
        let mut t = AnthropicTransformer::default();
        t.transform(Some("message_delta"), r#"{"delta":{"stop_reason":"tool_use"},"usage":{"input_tokens":5,"output_tokens":2}}"#).unwrap();
        let chunks = t.transform(Some("message_stop"), "{}").unwrap();
        assert!(chunks[0].done);
        assert_eq!(chunks[0].finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(chunks[0].usage.as_ref().unwrap().total_tokens, 7);
    }

    #[test]
    fn thinking_signature_survives_to_terminal_chunk() {
        let mut t = AnthropicTransformer::default();
        t.transform(Some("content_block_start"), r#"{"index":0,"content_block":{"type":"thinking"}}"#).unwrap();
        t.transform(Some("content_block_delta"), r#"{"index":0,"delta":{"type":"thinking_delta","thinking":"let me check"}}"#).unwrap();
        t.transform(Some("content_block_delta"), r#"{"index":0,"delta":{"type":"signature_delta","signature":"sig-xyz"}}"#).unwrap();
        t.transform(Some("content_block_stop"), r#"{"index":0}"#).unwrap();
        let chunks = t.transform(Some("message_stop"), "{}").unwrap();
        let blocks = chunks[0].metadata.as_ref().unwrap().get("thinking_blocks").unwrap();
        assert_eq!(blocks[0]["thinking"], "let me check");
        assert_eq!(blocks[0]["signature"], "sig-xyz");
    }

    #[test]
    fn malformed_json_payload_is_dropped_not_errored() {
        let mut t = AnthropicTransformer::default();
        let chunks = t.transform(Some("content_block_delta"), "{not json").unwrap();
        assert!(chunks.is_empty());
    }
}
