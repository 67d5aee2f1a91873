//! Line-oriented SSE framing shared by all three adapters.
//!
//! Each adapter supplies an [`SseTransformer`] that turns one `data:` payload
//! (or, for Anthropic, a named-event + payload pair) into zero or more
//! [`StreamChunk`]s. The framing itself — buffering partial lines across
//! network reads, recognizing the blank-line event terminator — is shared.

use crate::core::types::StreamChunk;
use crate::utils::{GatewayError, Result};
use bytes::Bytes;
use futures_util::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// One field parsed off an SSE line.
#[derive(Debug, Clone, Default)]
struct SseEvent {
    event_type: Option<String>,
    data: String,
}

impl SseEvent {
    fn from_line(line: &str) -> Option<Self> {
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        let (field, value) = line.split_once(':')?;
        let value = value.trim_start();
        match field {
            "data" => Some(SseEvent {
                event_type: None,
                data: value.to_string(),
            }),
            "event" => Some(SseEvent {
                event_type: Some(value.to_string()),
                data: String::new(),
            }),
            _ => None,
        }
    }
}

/// Provider-specific transformation from a decoded SSE event to gateway
/// stream chunks.
pub trait SseTransformer: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Whether `data` marks the end of the stream (e.g. OpenAI's `[DONE]`).
    fn is_end_marker(&self, _event_type: Option<&str>, data: &str) -> bool {
        data.trim() == "[DONE]"
    }

    /// Transform one decoded event into zero or more chunks. `event_type` is
    /// `Some` for providers that use named SSE events (Anthropic); `None`
    /// for bare `data:` framing (OpenAI-compatible, Google).
    fn transform(&mut self, event_type: Option<&str>, data: &str) -> Result<Vec<StreamChunk>>;
}

/// Incremental SSE line decoder. Owns a partial-line buffer so callers can
/// feed arbitrarily chunked network reads.
pub struct SseDecoder<T: SseTransformer> {
    transformer: T,
    buffer: String,
    current: Option<SseEvent>,
}

impl<T: SseTransformer> SseDecoder<T> {
    pub fn new(transformer: T) -> Self {
        Self {
            transformer,
            buffer: String::new(),
            current: None,
        }
    }

    pub fn process_bytes(&mut self, bytes: &[u8]) -> Result<Vec<StreamChunk>> {
        let text = String::from_utf8_lossy(bytes);
        self.buffer.push_str(&text);

        let mut out = Vec::new();
        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Ok(out);
        };

        let complete = self.buffer[..=last_newline].to_string();
        self.buffer = self.buffer[last_newline + 1..].to_string();

        for line in complete.lines() {
            out.extend(self.process_line(line)?);
        }
        Ok(out)
    }

    fn process_line(&mut self, line: &str) -> Result<Vec<StreamChunk>> {
        if line.is_empty() {
            if let Some(event) = self.current.take() {
                return self.process_event(event);
            }
            return Ok(Vec::new());
        }

        let Some(event) = SseEvent::from_line(line) else {
            return Ok(Vec::new());
        };

        match &mut self.current {
            Some(current) => {
                if !event.data.is_empty() {
                    if !current.data.is_empty() {
                        current.data.push('\n');
                    }
                    current.data.push_str(&event.data);
                }
                if event.event_type.is_some() {
                    current.event_type = event.event_type;
                }
            }
            None => self.current = Some(event),
        }
        Ok(Vec::new())
    }

    fn process_event(&mut self, event: SseEvent) -> Result<Vec<StreamChunk>> {
        if event.data.is_empty() {
            return Ok(Vec::new());
        }
        if self
            .transformer
            .is_end_marker(event.event_type.as_deref(), &event.data)
        {
            return Ok(Vec::new());
        }
        self.transformer
            .transform(event.event_type.as_deref(), &event.data)
    }
}

/// Adapts a `reqwest` byte stream plus an [`SseTransformer`] into a
/// `Stream<Item = Result<StreamChunk>>`.
pub struct SseStream<S, T>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin,
    T: SseTransformer + Unpin,
{
    inner: S,
    decoder: SseDecoder<T>,
    buffered: VecDeque<StreamChunk>,
    finished: bool,
}

impl<S, T> SseStream<S, T>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin,
    T: SseTransformer + Unpin,
{
    pub fn new(inner: S, transformer: T) -> Self {
        Self {
            inner,
            decoder: SseDecoder::new(transformer),
            buffered: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S, T> Stream for SseStream<S, T>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin,
    T: SseTransformer + Unpin,
{
    type Item = Result<StreamChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(chunk) = this.buffered.pop_front() {
            return Poll::Ready(Some(Ok(chunk)));
        }
        if this.finished {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => match this.decoder.process_bytes(&bytes) {
                Ok(chunks) => {
                    this.buffered.extend(chunks);
                    match this.buffered.pop_front() {
                        Some(chunk) => Poll::Ready(Some(Ok(chunk))),
                        None => {
                            cx.waker().wake_by_ref();
                            Poll::Pending
                        }
                    }
                }
                Err(e) => {
                    this.finished = true;
                    Poll::Ready(Some(Err(e)))
                }
            },
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                Poll::Ready(Some(Err(GatewayError::from(e))))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FinishReason;

    struct EchoTransformer;
    impl SseTransformer for EchoTransformer {
        fn provider_name(&self) -> &'static str {
            "echo"
        }
        fn transform(&mut self, _event_type: Option<&str>, data: &str) -> Result<Vec<StreamChunk>> {
            Ok(vec![StreamChunk::content_delta("x", data)])
        }
    }

    #[test]
    fn buffers_partial_lines_across_reads() {
        let mut decoder = SseDecoder::new(EchoTransformer);
        let r1 = decoder.process_bytes(b"data: hel").unwrap();
        assert!(r1.is_empty());
        let r2 = decoder.process_bytes(b"lo\n\n").unwrap();
        assert_eq!(r2.len(), 1);
        assert_eq!(r2[0].delta.content.as_deref(), Some("hello"));
    }

    #[test]
    fn end_marker_yields_no_chunk() {
        struct DoneTransformer;
        impl SseTransformer for DoneTransformer {
            fn provider_name(&self) -> &'static str {
                "done"
            }
            fn transform(
                &mut self,
                _event_type: Option<&str>,
                _data: &str,
            ) -> Result<Vec<StreamChunk>> {
                Ok(vec![StreamChunk::terminal(
                    "x",
                    FinishReason::Stop,
                    crate::core::types::Usage::default(),
                )])
            }
        }
        let mut decoder = SseDecoder::new(DoneTransformer);
        let chunks = decoder.process_bytes(b"data: [DONE]\n\n").unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn merges_multiple_data_lines_into_one_event() {
        let mut decoder = SseDecoder::new(EchoTransformer);
        let chunks = decoder
            .process_bytes(b"data: line1\ndata: line2\n\n")
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].delta.content.as_deref(), Some("line1\nline2"));
    }

    #[test]
    fn transformer_dropping_a_malformed_fragment_does_not_end_the_decode() {
        struct DropsMalformed;
        impl SseTransformer for DropsMalformed {
            fn provider_name(&self) -> &'static str {
                "drops-malformed"
            }
            fn transform(&mut self, _event_type: Option<&str>, data: &str) -> Result<Vec<StreamChunk>> {
                match serde_json::from_str::<serde_json::Value>(data) {
                    Ok(_) => Ok(vec![StreamChunk::content_delta("x", data)]),
                    Err(_) => Ok(Vec::new()),
                }
            }
        }
        let mut decoder = SseDecoder::new(DropsMalformed);
        let first = decoder.process_bytes(b"data: {not json\n\n").unwrap();
        assert!(first.is_empty());
        let second = decoder.process_bytes(b"data: \"ok\"\n\n").unwrap();
        assert_eq!(second.len(), 1);
    }
}
