//! Shared wire types for the todo server and its typed client
//!
//! Layout:
//! ```text
//! todo   - Todo rows and procedure inputs
//! auth   - users, sessions and the /api/auth request/response bodies
//! rpc    - procedure paths, envelopes and error codes for /trpc
//! chat   - UI chat messages and the streamed chunk format for /ai
//! ```

pub mod auth;
pub mod chat;
pub mod rpc;
pub mod todo;

pub use auth::{SessionInfo, SessionView, UserInfo};
pub use chat::{UiMessage, UiPart, UiRole, UiStreamChunk};
pub use rpc::ErrorCode;
pub use todo::Todo;
