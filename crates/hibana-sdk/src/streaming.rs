//! Streaming support for the Hibana SDK.
//!
//! The gateway streams chat completions as server-sent events. Each `data:`
//! payload is one OpenAI-style chunk; the sequence ends with a chunk carrying
//! a finish reason, the `[DONE]` sentinel, or the connection closing.

use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::response::{FinishReason, Usage};
use crate::transport::BodyStream;
use crate::wire::ChunkBody;

const DONE_SENTINEL: &str = "[DONE]";

/// One incremental piece of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamChunk {
    /// Text appended by this chunk.
    pub delta_text: Option<String>,
    /// Set on the terminal chunk.
    pub finish_reason: Option<FinishReason>,
    /// Token usage, only ever present on the terminal chunk.
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// Text of this chunk, or `""`.
    pub fn text(&self) -> &str {
        self.delta_text.as_deref().unwrap_or("")
    }

    /// Check if this is the final chunk.
    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// Whether the chunk carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.delta_text.is_none() && self.finish_reason.is_none() && self.usage.is_none()
    }
}

/// Incremental server-sent events decoder.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence or a
/// `\r\n` pair. Only `data` fields are kept; comments and other fields are
/// dropped.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    /// Feed bytes and return the data payloads of every completed event.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw[..newline]);
            self.process_line(line.strip_suffix('\r').unwrap_or(&line), &mut events);
        }
        events
    }

    /// Flush at end of input, dispatching an event left unterminated.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest);
            self.process_line(line.trim_end_matches('\r'), &mut events);
        }
        self.process_line("", &mut events);
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            if let Some(data) = self.data.take() {
                events.push(data);
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            }
        }
    }
}

/// Decode a response body into completion chunks.
///
/// With `read_timeout`, a body that delivers nothing for that long ends the
/// stream with a transport error.
fn decode_chunks(
    mut body: BodyStream,
    read_timeout: Option<Duration>,
) -> impl Stream<Item = Result<StreamChunk>> + Send {
    async_stream::stream! {
        let mut decoder = SseDecoder::default();
        let mut eof = false;

        while !eof {
            let next = match read_timeout {
                Some(limit) => match tokio::time::timeout(limit, body.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        debug!(timeout = ?limit, "Stream stalled");
                        yield Err(Error::timeout(limit));
                        return;
                    }
                },
                None => body.next().await,
            };

            let payloads = match next {
                Some(Ok(bytes)) => decoder.push(&bytes),
                Some(Err(error)) => {
                    yield Err(error);
                    return;
                }
                None => {
                    eof = true;
                    decoder.finish()
                }
            };

            for payload in payloads {
                if payload.trim() == DONE_SENTINEL {
                    return;
                }

                if let Some(error) = Error::from_stream_event(&payload) {
                    yield Err(error);
                    return;
                }

                let chunk = match serde_json::from_str::<ChunkBody>(&payload) {
                    Ok(body) => body.into_chunk(),
                    Err(e) => {
                        debug!(error = %e, "Skipping malformed stream fragment");
                        continue;
                    }
                };

                if chunk.is_empty() {
                    continue;
                }

                let is_final = chunk.is_final();
                yield Ok(chunk);
                if is_final {
                    return;
                }
            }
        }
    }
}

/// A stream of chat completion chunks.
///
/// The connection is released as soon as the stream ends, fails, or is
/// dropped.
pub struct ChatStream {
    inner: Option<Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>>,
    request_id: Option<String>,
}

impl ChatStream {
    /// Wrap an SSE response body with no bound on how long a read may take.
    pub fn new(body: BodyStream) -> Self {
        Self {
            inner: Some(Box::pin(decode_chunks(body, None))),
            request_id: None,
        }
    }

    /// Wrap an SSE response body, failing if any read waits longer than `timeout`.
    ///
    /// Errors raised by the stream carry `request_id`.
    pub fn with_timeout(body: BodyStream, timeout: Duration, request_id: Option<String>) -> Self {
        Self {
            inner: Some(Box::pin(decode_chunks(body, Some(timeout)))),
            request_id,
        }
    }

    /// Check if the stream is done.
    pub fn is_done(&self) -> bool {
        self.inner.is_none()
    }

    /// Collect all text from the stream.
    pub async fn collect_text(self) -> Result<String> {
        self.collect_result().await.map(|result| result.text)
    }

    /// Consume the stream, folding every chunk into a [`StreamResult`].
    pub async fn collect_result(mut self) -> Result<StreamResult> {
        let mut result = StreamResult::default();
        while let Some(chunk) = self.next().await {
            result.add_chunk(chunk?);
        }
        Ok(result)
    }
}

impl Stream for ChatStream {
    type Item = Result<StreamChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if chunk.is_final() {
                    this.inner = None;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(error))) => {
                this.inner = None;
                let error = match this.request_id.take() {
                    Some(id) => error.with_request_id(id),
                    None => error,
                };
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                this.inner = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatStream")
            .field("done", &self.is_done())
            .finish()
    }
}

/// Collected result from a streaming response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamResult {
    /// Full accumulated text.
    pub text: String,
    /// Finish reason.
    pub finish_reason: Option<FinishReason>,
    /// Token usage (if available).
    pub usage: Option<Usage>,
    /// Number of chunks received.
    pub chunk_count: usize,
}

impl StreamResult {
    /// Add a chunk to the result.
    pub fn add_chunk(&mut self, chunk: StreamChunk) {
        self.chunk_count += 1;
        if let Some(text) = chunk.delta_text {
            self.text.push_str(&text);
        }
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn body_from(parts: &[&'static str]) -> BodyStream {
        let parts: Vec<Result<Bytes>> = parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part.as_bytes())))
            .collect();
        Box::pin(futures::stream::iter(parts))
    }

    fn delta(text: &str) -> String {
        format!(r#"data: {{"choices": [{{"index": 0, "delta": {{"content": "{text}"}}, "finish_reason": null}}]}}"#)
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert!(decoder.push(b": 1}\r").is_empty());
        assert_eq!(decoder.push(b"\n\r\n"), vec![r#"{"a": 1}"#.to_string()]);
    }

    #[test]
    fn test_decoder_handles_split_utf8() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: سلام\n\n".as_bytes();
        let (head, tail) = bytes.split_at(7);
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["سلام".to_string()]);
    }

    #[test]
    fn test_decoder_fields_and_comments() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\nevent: message\nid: 7\ndata:first\ndata: second\n\n");
        assert_eq!(events, vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn test_decoder_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec!["[DONE]".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_concatenates_deltas() {
        let first = format!("{}\n\n", delta("Hello"));
        let second = format!("{}\n\n", delta(", world"));
        let body = vec![
            Ok(Bytes::from(first)),
            Ok(Bytes::from(second)),
            Ok(Bytes::from_static(
                br#"data: {"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}], "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}}"#,
            )),
            Ok(Bytes::from_static(b"\n\ndata: [DONE]\n\n")),
        ];
        let stream = ChatStream::new(Box::pin(futures::stream::iter(body)));

        let result = stream.collect_result().await.unwrap();
        assert_eq!(result.text, "Hello, world");
        assert_eq!(result.finish_reason, Some(FinishReason::Stop));
        assert_eq!(result.usage.map(|u| u.total_tokens), Some(8));
        assert_eq!(result.chunk_count, 3);
    }

    #[tokio::test]
    async fn test_stream_skips_malformed_and_empty_fragments() {
        let stream = ChatStream::new(body_from(&[
            "data: {not json}\n\n",
            "data: {\"choices\": [{\"index\": 0, \"delta\": {\"role\": \"assistant\"}}]}\n\n",
            "data: {\"choices\": [{\"index\": 0, \"delta\": {\"content\": \"ok\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]));

        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().text(), "ok");
    }

    #[tokio::test]
    async fn test_stream_stops_at_final_chunk() {
        let mut stream = ChatStream::new(body_from(&[
            "data: {\"choices\": [{\"index\": 0, \"delta\": {\"content\": \"a\"}, \"finish_reason\": \"length\"}]}\n\n",
            "data: {\"choices\": [{\"index\": 0, \"delta\": {\"content\": \"ignored\"}}]}\n\n",
        ]));

        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.finish_reason, Some(FinishReason::Length));
        assert!(stream.is_done());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_surfaces_error_event() {
        let stream = ChatStream::new(body_from(&[
            "data: {\"choices\": [{\"index\": 0, \"delta\": {\"content\": \"a\"}}]}\n\n",
            "data: {\"error\": {\"message\": \"provider failed\", \"type\": \"server_error\"}}\n\n",
        ]));

        let err = stream.collect_text().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Server);
        assert_eq!(err.message(), "provider failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_body_times_out() {
        let first: Result<Bytes> = Ok(Bytes::from(format!("{}\n\n", delta("Hel"))));
        let body = futures::stream::once(async move { first }).chain(futures::stream::pending());
        let mut stream = ChatStream::with_timeout(Box::pin(body), Duration::from_secs(5), Some("req-9".into()));

        assert_eq!(stream.next().await.unwrap().unwrap().text(), "Hel");
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Transport);
        assert_eq!(err.request_id(), Some("req-9"));
        assert!(stream.is_done());
    }

    #[tokio::test]
    async fn test_stream_ends_when_body_closes() {
        let stream = ChatStream::new(body_from(&[
            "data: {\"choices\": [{\"index\": 0, \"delta\": {\"content\": \"partial\"}}]}",
        ]));
        let result = stream.collect_result().await.unwrap();
        assert_eq!(result.text, "partial");
        assert!(result.finish_reason.is_none());
    }
}
