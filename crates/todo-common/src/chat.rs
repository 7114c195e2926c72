//! Chat messages as the browser keeps them, and the chunk format streamed
//! back by `POST /ai`.

use serde::{Deserialize, Serialize};

/// Header advertising the UI-message stream format on `/ai` responses
pub const UI_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";
pub const UI_STREAM_VERSION: &str = "v1";

/// Payload of the final SSE frame
pub const STREAM_DONE: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiRole {
    System,
    User,
    Assistant,
}

/// A part of a UI message. Only text reaches the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiPart {
    Text { text: String },
    Reasoning { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: String,
    pub role: UiRole,
    #[serde(default)]
    pub parts: Vec<UiPart>,
}

impl UiMessage {
    pub fn text(id: impl Into<String>, role: UiRole, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            parts: vec![UiPart::Text { text: text.into() }],
        }
    }

    /// Concatenation of the text parts, `None` when there are none
    pub fn joined_text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| match part {
                UiPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }
}

/// Body of `POST /ai`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub messages: Vec<UiMessage>,
}

/// One `data:` frame of the `/ai` stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum UiStreamChunk {
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    Error {
        error_text: String,
    },
    Finish,
}
