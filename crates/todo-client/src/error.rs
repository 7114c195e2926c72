//! Error types for the todo client.

use thiserror::Error;
use todo_common::rpc::ErrorCode;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error body of an `/api/auth` endpoint
    #[error("{code}: {message}")]
    Auth {
        status: u16,
        code: String,
        message: String,
    },

    /// Error envelope of an RPC call
    #[error("{code}: {message}")]
    Rpc { code: ErrorCode, message: String },

    /// The chat relay ended the reply with an error frame
    #[error("Chat failed: {0}")]
    Chat(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}

impl ClientError {
    /// Worth retrying: transport failures and server-side errors.
    /// Anything the caller got wrong is not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.is_body()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            ClientError::Auth { status, .. } | ClientError::UnexpectedResponse { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            ClientError::Rpc { code, .. } => *code == ErrorCode::InternalServerError,
            ClientError::Chat(_) | ClientError::Stream(_) => true,
            ClientError::Url(_) | ClientError::Json(_) => false,
        }
    }

    /// The server wants a session for this call
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        match self {
            ClientError::Rpc { code, .. } => *code == ErrorCode::Unauthorized,
            ClientError::Auth { status, .. } => *status == 401,
            _ => false,
        }
    }
}
