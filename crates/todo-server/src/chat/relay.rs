use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{Stream, StreamExt};
use todo_common::chat::{
    ChatRequestBody, UiStreamChunk, STREAM_DONE, UI_STREAM_HEADER, UI_STREAM_VERSION,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{to_model_messages, ChatModel};
use crate::config::AppState;

/// Shown to the caller in place of upstream error details
const UPSTREAM_ERROR_TEXT: &str = "An error occurred.";

fn frame(chunk: &UiStreamChunk) -> Event {
    Event::default().data(serde_json::to_string(chunk).unwrap_or_default())
}

/// Frames for one reply: start, the text block, finish, then `[DONE]`.
///
/// The model stream is polled only as the caller reads, so dropping the
/// response drops the upstream request too.
pub fn reply_frames(
    model: Arc<dyn ChatModel>,
    body: ChatRequestBody,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let messages = to_model_messages(&body.messages);
        let message_id = format!("msg-{}", Uuid::new_v4().simple());
        let text_id = "0".to_string();

        info!("[Chat] Relaying {} messages to {}", messages.len(), model.model_name());
        yield Ok(frame(&UiStreamChunk::Start { message_id: Some(message_id) }));

        match model.stream_text(messages).await {
            Ok(mut deltas) => {
                let mut text_open = false;
                let mut failed = false;

                while let Some(delta) = deltas.next().await {
                    match delta {
                        Ok(delta) => {
                            if delta.is_empty() {
                                continue;
                            }
                            if !text_open {
                                text_open = true;
                                yield Ok(frame(&UiStreamChunk::TextStart { id: text_id.clone() }));
                            }
                            yield Ok(frame(&UiStreamChunk::TextDelta { id: text_id.clone(), delta }));
                        }
                        Err(e) => {
                            warn!("[Chat] Model stream failed: {}", e);
                            failed = true;
                            break;
                        }
                    }
                }

                if text_open {
                    yield Ok(frame(&UiStreamChunk::TextEnd { id: text_id.clone() }));
                }
                if failed {
                    yield Ok(frame(&UiStreamChunk::Error { error_text: UPSTREAM_ERROR_TEXT.to_string() }));
                } else {
                    yield Ok(frame(&UiStreamChunk::Finish));
                }
            }
            Err(e) => {
                warn!("[Chat] Failed to open model stream: {}", e);
                yield Ok(frame(&UiStreamChunk::Error { error_text: UPSTREAM_ERROR_TEXT.to_string() }));
            }
        }

        debug!("[Chat] Reply complete");
        yield Ok(Event::default().data(STREAM_DONE));
    }
}

/// POST /ai
pub async fn relay_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequestBody>,
) -> Response {
    let stream = reply_frames(state.chat.clone(), body);

    (
        [(UI_STREAM_HEADER, UI_STREAM_VERSION)],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
        .into_response()
}
