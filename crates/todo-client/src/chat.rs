//! Streaming chat against `POST /ai`
//!
//! The reply is a server-sent event stream: one JSON chunk per `data:`
//! field, terminated by `data: [DONE]`.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use todo_common::chat::{ChatRequestBody, UiMessage, UiStreamChunk, STREAM_DONE};
use tracing::debug;

use crate::{ApiClient, ClientError, Result};

/// Reply chunks in arrival order
pub type ChatStream = BoxStream<'static, Result<UiStreamChunk>>;

/// Split a byte stream into SSE event payloads.
///
/// Lines are buffered across chunk boundaries; `data:` lines of one event
/// are joined with `\n` and the event is emitted at the blank line that ends
/// it. Comments and other fields are skipped.
pub fn sse_events<S, E>(bytes: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send,
{
    async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer: Vec<u8> = Vec::new();
        let mut data: Vec<String> = Vec::new();

        loop {
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=pos).collect();
                let line = match String::from_utf8(raw) {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(ClientError::Stream(format!("Invalid UTF-8 in stream: {e}")));
                        return;
                    }
                };
                let line = line.trim_end_matches(['\n', '\r']);

                if line.is_empty() {
                    if !data.is_empty() {
                        yield Ok(data.join("\n"));
                        data.clear();
                    }
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
                }
            }

            match bytes.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    yield Err(ClientError::Stream(e.to_string()));
                    return;
                }
                None => break,
            }
        }

        // Unterminated last event
        if let Ok(rest) = String::from_utf8(buffer) {
            if let Some(value) = rest.trim_end_matches('\r').strip_prefix("data:") {
                data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        if !data.is_empty() {
            yield Ok(data.join("\n"));
        }
    }
}

/// Decode event payloads into chunks, stopping at `[DONE]`.
/// Chunk types this client does not know are skipped.
pub fn chunks<S>(events: S) -> impl Stream<Item = Result<UiStreamChunk>>
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    async_stream::stream! {
        let mut events = Box::pin(events);
        while let Some(payload) = events.next().await {
            let payload = match payload {
                Ok(payload) => payload,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            if payload == STREAM_DONE {
                break;
            }
            match serde_json::from_str::<UiStreamChunk>(&payload) {
                Ok(chunk) => yield Ok(chunk),
                Err(e) => debug!("[Chat] Skipping frame: {} ({})", payload, e),
            }
        }
    }
}

/// The reply text, or the stream's error frame as `ClientError::Chat`
pub async fn collect_text(mut stream: ChatStream) -> Result<String> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            UiStreamChunk::TextDelta { delta, .. } => text.push_str(&delta),
            UiStreamChunk::Error { error_text } => return Err(ClientError::Chat(error_text)),
            _ => {}
        }
    }
    Ok(text)
}

impl ApiClient {
    /// Send the conversation so far and stream the assistant's reply
    pub async fn chat(&self, messages: Vec<UiMessage>) -> Result<ChatStream> {
        let body = ChatRequestBody { messages };
        let response = self
            .authorized(self.http.post(self.endpoint("ai")?))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::UnexpectedResponse {
                status: status.as_u16(),
                body: response.text().await?,
            });
        }

        debug!("[Chat] Reply stream open");
        Ok(chunks(sse_events(response.bytes_stream())).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::convert::Infallible;

    fn byte_chunks(parts: &[&str]) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> {
        let parts: Vec<_> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        futures::stream::iter(parts)
    }

    async fn events(parts: &[&str]) -> Vec<String> {
        sse_events(byte_chunks(parts)).try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn events_survive_chunk_boundaries() {
        let got = events(&["data: {\"a\"", ":1}\n\n: keep-alive\n\nda", "ta: [DONE]\n\n"]).await;
        assert_eq!(got, vec![r#"{"a":1}"#.to_string(), "[DONE]".to_string()]);
    }

    #[tokio::test]
    async fn multi_line_data_and_crlf() {
        let got = events(&["data: one\r\ndata:two\r\n\r\n", "data: tail"]).await;
        assert_eq!(got, vec!["one\ntwo".to_string(), "tail".to_string()]);
    }

    #[tokio::test]
    async fn chunks_stop_at_done_and_collect() {
        let stream = chunks(sse_events(byte_chunks(&[
            "data: {\"type\":\"start\",\"messageId\":\"msg-1\"}\n\n",
            "data: {\"type\":\"text-start\",\"id\":\"0\"}\n\n",
            "data: {\"type\":\"text-delta\",\"id\":\"0\",\"delta\":\"Hi\"}\n\n",
            "data: {\"type\":\"reasoning-delta\",\"id\":\"r\",\"delta\":\"?\"}\n\n",
            "data: {\"type\":\"text-delta\",\"id\":\"0\",\"delta\":\" there\"}\n\n",
            "data: {\"type\":\"text-end\",\"id\":\"0\"}\n\n",
            "data: {\"type\":\"finish\"}\n\n",
            "data: [DONE]\n\n",
            "data: {\"type\":\"text-delta\",\"id\":\"0\",\"delta\":\"late\"}\n\n",
        ])))
        .boxed();

        assert_eq!(collect_text(stream).await.unwrap(), "Hi there");
    }

    #[tokio::test]
    async fn error_frame_fails_collection() {
        let stream = chunks(sse_events(byte_chunks(&[
            "data: {\"type\":\"start\"}\n\n",
            "data: {\"type\":\"error\",\"errorText\":\"An error occurred.\"}\n\n",
            "data: [DONE]\n\n",
        ])))
        .boxed();

        let err = collect_text(stream).await.unwrap_err();
        assert!(matches!(err, ClientError::Chat(ref text) if text == "An error occurred."));
    }
}
