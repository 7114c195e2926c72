//! RPC envelopes for the `/trpc` transport
//!
//! A call answers with `{"result":{"data":...}}` or with
//! `{"error":{"message","code","data":{"code","httpStatus","path"}}}`.
//! Batched calls answer with an array of those, in request order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::UserInfo;

/// Procedure paths served by the app router
pub mod paths {
    pub const HEALTH_CHECK: &str = "healthCheck";
    pub const PRIVATE_DATA: &str = "privateData";
    pub const TODO_GET_ALL: &str = "todo.getAll";
    pub const TODO_CREATE: &str = "todo.create";
    pub const TODO_TOGGLE: &str = "todo.toggle";
    pub const TODO_DELETE: &str = "todo.delete";
}

/// Error codes, with their JSON-RPC number and HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ParseError,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotSupported,
    InternalServerError,
}

impl ErrorCode {
    pub fn json_rpc_code(self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::BadRequest => -32600,
            ErrorCode::Unauthorized => -32001,
            ErrorCode::Forbidden => -32003,
            ErrorCode::NotFound => -32004,
            ErrorCode::MethodNotSupported => -32005,
            ErrorCode::InternalServerError => -32603,
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::ParseError | ErrorCode::BadRequest => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::MethodNotSupported => 405,
            ErrorCode::InternalServerError => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResultData {
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcErrorData {
    pub code: ErrorCode,
    pub http_status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorShape {
    pub message: String,
    pub code: i32,
    pub data: RpcErrorData,
}

/// One response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Success { result: RpcResultData },
    Failure { error: RpcErrorShape },
}

impl RpcResponse {
    pub fn success(data: Value) -> Self {
        RpcResponse::Success {
            result: RpcResultData { data },
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>, path: Option<String>) -> Self {
        RpcResponse::Failure {
            error: RpcErrorShape {
                message: message.into(),
                code: code.json_rpc_code(),
                data: RpcErrorData {
                    code,
                    http_status: code.http_status(),
                    path,
                },
            },
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            RpcResponse::Success { .. } => 200,
            RpcResponse::Failure { error } => error.data.http_status,
        }
    }
}

/// Output of `healthCheck`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

/// Output of `privateData`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateData {
    pub message: String,
    pub user: UserInfo,
}
