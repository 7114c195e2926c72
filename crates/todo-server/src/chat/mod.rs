//! Chat relay to a hosted generative model
//!
//! `POST /ai` takes the browser's message history, converts it into model
//! messages and streams the model's text back as it arrives. The model sits
//! behind [`ChatModel`] so the relay does not care who produces the text.

pub mod relay;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use genai::chat::{ChatMessage, ChatRequest, ChatStreamEvent};
use genai::resolver::{AuthData, AuthResolver};
use genai::{Client as GenAIClient, ModelIden};
use todo_common::chat::{UiMessage, UiRole};
use tracing::info;

pub use relay::relay_chat;

/// Text deltas in arrival order
pub type TextStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    System,
    User,
    Assistant,
}

/// A message in the shape the model API expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMessage {
    pub role: ModelRole,
    pub content: String,
}

/// One message per UI message with its text parts joined.
/// Messages without any text part are dropped.
pub fn to_model_messages(messages: &[UiMessage]) -> Vec<ModelMessage> {
    messages
        .iter()
        .filter_map(|message| {
            let content = message.joined_text()?;
            let role = match message.role {
                UiRole::System => ModelRole::System,
                UiRole::User => ModelRole::User,
                UiRole::Assistant => ModelRole::Assistant,
            };
            Some(ModelMessage { role, content })
        })
        .collect()
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Open a streaming completion for `messages`
    async fn stream_text(&self, messages: Vec<ModelMessage>) -> Result<TextStream>;

    fn model_name(&self) -> &str;
}

/// Gemini through genai's streaming chat API
pub struct GeminiChatModel {
    client: GenAIClient,
    model: String,
}

impl GeminiChatModel {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        let api_key = api_key.to_string();
        let auth_resolver = AuthResolver::from_resolver_fn(
            move |_model_iden: ModelIden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                Ok(Some(AuthData::from_single(api_key.clone())))
            },
        );
        let client = GenAIClient::builder()
            .with_auth_resolver(auth_resolver)
            .build();
        let model = model.into();

        info!("[Chat] Using model: {}", model);
        Self { client, model }
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn stream_text(&self, messages: Vec<ModelMessage>) -> Result<TextStream> {
        let chat_messages: Vec<ChatMessage> = messages
            .into_iter()
            .map(|message| match message.role {
                ModelRole::System => ChatMessage::system(message.content),
                ModelRole::User => ChatMessage::user(message.content),
                ModelRole::Assistant => ChatMessage::assistant(message.content),
            })
            .collect();

        let response = self
            .client
            .exec_chat_stream(&self.model, ChatRequest::new(chat_messages), None)
            .await
            .map_err(|e| anyhow::anyhow!("GenAI error: {}", e))?;

        let deltas = response.stream.filter_map(|event| async move {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => Some(Ok(chunk.content)),
                Ok(_) => None,
                Err(e) => Some(Err(anyhow::anyhow!("GenAI stream error: {}", e))),
            }
        });

        Ok(deltas.boxed())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
