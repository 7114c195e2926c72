use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use todo_common::auth::{codes, AuthErrorBody};
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Auth Errors
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("User already exists. Use another email.")]
    UserAlreadyExists,
    #[error("Invalid email")]
    InvalidEmail,
    #[error("Password too short")]
    PasswordTooShort,
    #[error("Password too long")]
    PasswordTooLong,
    #[error("Name is required")]
    NameRequired,
    #[error("Invalid origin")]
    InvalidOrigin,
    #[error("Authentication required")]
    Unauthorized,

    // Model Errors
    #[error("Todo text must not be empty")]
    TodoTextEmpty,
    #[error("Todo {id} not found")]
    TodoNotFound { id: i64 },

    // Generic
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidCredentials | Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::UserAlreadyExists => StatusCode::UNPROCESSABLE_ENTITY,
            Error::InvalidEmail
            | Error::PasswordTooShort
            | Error::PasswordTooLong
            | Error::NameRequired
            | Error::TodoTextEmpty
            | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::InvalidOrigin => StatusCode::FORBIDDEN,
            Error::TodoNotFound { .. } | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Database(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidCredentials => codes::INVALID_EMAIL_OR_PASSWORD,
            Error::UserAlreadyExists => codes::USER_ALREADY_EXISTS,
            Error::InvalidEmail => codes::INVALID_EMAIL,
            Error::PasswordTooShort => codes::PASSWORD_TOO_SHORT,
            Error::PasswordTooLong => codes::PASSWORD_TOO_LONG,
            Error::NameRequired => codes::NAME_REQUIRED,
            Error::InvalidOrigin => codes::INVALID_ORIGIN,
            Error::Unauthorized => codes::UNAUTHORIZED,
            Error::TodoNotFound { .. } | Error::NotFound(_) => codes::NOT_FOUND,
            Error::TodoTextEmpty | Error::BadRequest(_) => codes::BAD_REQUEST,
            Error::Database(_) | Error::Internal(_) => codes::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Internal(_))
    }

    /// Message safe to show a caller; internal details stay in the logs
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if self.is_internal() {
            error!("{}", self);
        }

        let body = Json(AuthErrorBody {
            code: self.code().to_string(),
            message: self.public_message(),
        });

        (self.status(), body).into_response()
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for Error {
    fn from(err: bcrypt::BcryptError) -> Self {
        Error::Internal(format!("password hashing failed: {err}"))
    }
}

impl From<chrono::ParseError> for Error {
    fn from(err: chrono::ParseError) -> Self {
        Error::Internal(format!("stored timestamp is malformed: {err}"))
    }
}
