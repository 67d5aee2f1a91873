//! Wire-level data model shared by every provider adapter: messages,
//! completion requests/responses, streaming chunks, capabilities.
//!
//! Provider-specific opaque blobs (Anthropic thinking blocks, Google
//! thought-signatures) are carried in `metadata` maps that the core copies
//! verbatim without inspecting. See [`Message::metadata`] and
//! [`ToolCall::metadata`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A declared feature of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    Vision,
    Audio,
    FunctionCalling,
    JsonMode,
    Reasoning,
    Streaming,
    ImageGeneration,
    Code,
}

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single part of a multi-part message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image(ImageSource),
}

/// Either an inline base64 image or a URL reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSource {
    Base64 { data: String, media_type: String },
    Url { url: String },
}

/// Message content: either a plain string, or an ordered list of typed
/// parts (text / image).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Total character count across all text-bearing parts, used by the
    /// heuristic token counter.
    pub fn text_char_count(&self) -> usize {
        match self {
            Content::Text(s) => s.chars().count(),
            Content::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.chars().count(),
                    ContentPart::Image(_) => 0,
                })
                .sum(),
        }
    }
}

/// A tool (function) call emitted by the assistant, or echoed back as part
/// of a tool result message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments (providers stream this piecewise; the
    /// adapter concatenates fragments before the call completes).
    pub arguments: String,
    /// Provider-specific opaque metadata (e.g. Google `thoughtSignature`)
    /// that must be re-attached verbatim on the next request.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

/// Definition of a callable tool, passed in a [`CompletionRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Value,
}

/// Tool-choice policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Named { name: String },
}

/// A single conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on `tool` role messages: which call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Opaque per-message metadata (Anthropic thinking blocks, including
    /// redacted ones, Google thought-signatures, ...). The core treats
    /// this as pass-through and must re-emit it on the next request.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            metadata: HashMap::new(),
        }
    }
}

/// Adaptive or budgeted thinking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThinkingConfig {
    Adaptive,
    Budget { budget_tokens: u32 },
}

/// Generation parameters common across providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

/// A model selector: caller may leave `model` empty and let the router
/// fill it in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSelector {
    #[serde(default)]
    pub model: String,
}

/// A chat/completion request, provider-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub model: ModelSelector,
    #[serde(default)]
    pub params: GenerationParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: ModelSelector::default(),
            params: GenerationParams::default(),
            tools: None,
            tool_choice: None,
            thinking: None,
        }
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
}

/// Token usage for a completed (or terminal-chunk) request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u32>,
}

/// A preserved reasoning/thinking block, echoed back verbatim on the next
/// turn for providers that require continuity (Anthropic signature blocks,
/// redacted thinking blocks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingBlock {
    /// Opaque, provider-specific payload.
    pub data: Value,
    pub redacted: bool,
}

/// A non-streaming completion result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub model: String,
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thinking_blocks: Vec<ThinkingBlock>,
    /// Present only when produced via the router; carries the
    /// (provider, model) pair actually used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_info: Option<RoutingInfo>,
}

/// Which (provider, model) pair served a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingInfo {
    pub provider_id: String,
    pub model_id: String,
}

/// An incremental delta of content or tool-call arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallDelta>,
}

/// Partial tool-call data arriving piecewise on a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments_fragment: Option<String>,
}

/// A single element of a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<StreamDelta>,
    /// e.g. `{"type": "thinking"}` for a thinking-content delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Present only on the first chunk of a router-produced stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_info: Option<RoutingInfo>,
}

impl StreamChunk {
    pub fn content_delta(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            delta: Some(StreamDelta {
                content: Some(text.into()),
                tool_call: None,
            }),
            metadata: None,
            done: false,
            finish_reason: None,
            usage: None,
            routing_info: None,
        }
    }

    pub fn terminal(id: impl Into<String>, finish_reason: FinishReason, usage: Usage) -> Self {
        Self {
            id: id.into(),
            delta: None,
            metadata: None,
            done: true,
            finish_reason: Some(finish_reason),
            usage: Some(usage),
            routing_info: None,
        }
    }

    pub fn error(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            delta: None,
            metadata: None,
            done: true,
            finish_reason: Some(FinishReason::Error),
            usage: None,
            routing_info: None,
        }
    }
}

/// Heuristic token counter shared by every adapter: roughly 4 characters
/// per token, counting only text-bearing content.
pub fn estimate_tokens(messages: &[Message]) -> u32 {
    let total_chars: usize = messages.iter().map(|m| m.content.text_char_count()).sum();
    total_chars.div_ceil(4) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_is_ceiling_of_chars_over_four() {
        let messages = vec![Message::user("abcdefgh")]; // 8 chars -> 2 tokens
        assert_eq!(estimate_tokens(&messages), 2);

        let messages = vec![Message::user("abcdefghi")]; // 9 chars -> ceil(9/4) = 3
        assert_eq!(estimate_tokens(&messages), 3);
    }

    #[test]
    fn token_estimate_ignores_images() {
        let messages = vec![Message {
            role: Role::User,
            content: Content::Parts(vec![
                ContentPart::Text {
                    text: "abcd".into(),
                },
                ContentPart::Image(ImageSource::Url {
                    url: "https://example.com/x.png".into(),
                }),
            ]),
            tool_calls: vec![],
            tool_call_id: None,
            metadata: HashMap::new(),
        }];
        assert_eq!(estimate_tokens(&messages), 1);
    }
}
