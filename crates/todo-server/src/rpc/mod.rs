//! Typed RPC router
//!
//! Procedures are named by dotted paths (`todo.create`), registered as either
//! a query or a mutation and as public or protected. A handler takes the call
//! context and a typed input and returns a typed output; JSON decoding and
//! encoding happen here, at the router's edge.

pub mod http;
pub mod procedures;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use todo_common::rpc::ErrorCode;
use tracing::error;

use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::Error;

pub use procedures::app_router;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    Query,
    Mutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Requires a session; checked before the handler runs
    Protected,
}

/// Failure of a procedure call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

pub type RpcResult<T> = core::result::Result<T, RpcError>;

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, "Authentication required")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalServerError, "Internal server error")
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<Error> for RpcError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::Unauthorized | Error::InvalidCredentials => ErrorCode::Unauthorized,
            Error::InvalidOrigin => ErrorCode::Forbidden,
            Error::TodoNotFound { .. } | Error::NotFound(_) => ErrorCode::NotFound,
            Error::Database(_) | Error::Internal(_) => {
                error!("[Rpc] {}", err);
                return RpcError::internal();
            }
            _ => ErrorCode::BadRequest,
        };
        RpcError::new(code, err.to_string())
    }
}

/// What a handler gets besides its input
#[derive(Clone)]
pub struct RpcContext {
    pub state: AppState,
    session: Option<Ctx>,
}

impl RpcContext {
    pub fn new(state: AppState, session: Option<Ctx>) -> Self {
        Self { state, session }
    }

    pub fn session(&self) -> RpcResult<&Ctx> {
        self.session.as_ref().ok_or_else(RpcError::unauthorized)
    }
}

type BoxedHandler = Arc<dyn Fn(RpcContext, Value) -> BoxFuture<'static, RpcResult<Value>> + Send + Sync>;

#[derive(Clone)]
struct Procedure {
    kind: ProcedureKind,
    access: Access,
    handler: BoxedHandler,
}

fn boxed<I, O, F, Fut>(handler: F) -> BoxedHandler
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + 'static,
    F: Fn(RpcContext, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<O>> + Send + 'static,
{
    Arc::new(move |ctx: RpcContext, raw: Value| -> BoxFuture<'static, RpcResult<Value>> {
        let input = match serde_json::from_value::<I>(raw) {
            Ok(input) => input,
            Err(e) => {
                let err = RpcError::bad_request(format!("Invalid input: {e}"));
                return async move { Err(err) }.boxed();
            }
        };

        let call = handler(ctx, input);
        async move {
            let output = call.await?;
            serde_json::to_value(output).map_err(|e| {
                error!("[Rpc] Failed to encode output: {}", e);
                RpcError::internal()
            })
        }
        .boxed()
    })
}

#[derive(Clone, Default)]
pub struct RpcRouter {
    procedures: HashMap<String, Procedure>,
}

impl RpcRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query<I, O, F, Fut>(self, path: &str, access: Access, handler: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + 'static,
        F: Fn(RpcContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<O>> + Send + 'static,
    {
        self.register(path, ProcedureKind::Query, access, boxed(handler))
    }

    pub fn mutation<I, O, F, Fut>(self, path: &str, access: Access, handler: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + 'static,
        F: Fn(RpcContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<O>> + Send + 'static,
    {
        self.register(path, ProcedureKind::Mutation, access, boxed(handler))
    }

    /// Mount every procedure of `other` under `prefix.`
    pub fn nest(mut self, prefix: &str, other: RpcRouter) -> Self {
        for (path, procedure) in other.procedures {
            self.procedures.insert(format!("{prefix}.{path}"), procedure);
        }
        self
    }

    fn register(
        mut self,
        path: &str,
        kind: ProcedureKind,
        access: Access,
        handler: BoxedHandler,
    ) -> Self {
        self.procedures.insert(
            path.to_string(),
            Procedure {
                kind,
                access,
                handler,
            },
        );
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.procedures.contains_key(path)
    }

    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.procedures.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Run the procedure at `path`, invoked as `kind`
    pub async fn call(
        &self,
        path: &str,
        kind: ProcedureKind,
        ctx: RpcContext,
        input: Value,
    ) -> RpcResult<Value> {
        let procedure = self
            .procedures
            .get(path)
            .ok_or_else(|| RpcError::not_found(format!("No procedure found on path \"{path}\"")))?;

        if procedure.kind != kind {
            let expected = match procedure.kind {
                ProcedureKind::Query => "GET",
                ProcedureKind::Mutation => "POST",
            };
            return Err(RpcError::new(
                ErrorCode::MethodNotSupported,
                format!("Unsupported method for \"{path}\", use {expected}"),
            ));
        }

        if procedure.access == Access::Protected {
            ctx.session()?;
        }

        (procedure.handler)(ctx, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Echo {
        word: String,
    }

    async fn echo(_ctx: RpcContext, input: Echo) -> RpcResult<String> {
        Ok(input.word)
    }

    #[test]
    fn nest_prefixes_paths() {
        let todo = RpcRouter::new()
            .query("getAll", Access::Public, echo)
            .mutation("create", Access::Public, echo);
        let router = RpcRouter::new()
            .query("healthCheck", Access::Public, echo)
            .nest("todo", todo);

        assert_eq!(router.paths(), vec!["healthCheck", "todo.create", "todo.getAll"]);
    }

    #[test]
    fn storage_errors_are_masked() {
        let err = RpcError::from(Error::Internal("disk on fire".into()));
        assert_eq!(err, RpcError::internal());

        let err = RpcError::from(Error::TodoNotFound { id: 3 });
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "Todo 3 not found");

        let err = RpcError::from(Error::TodoTextEmpty);
        assert_eq!(err.code, ErrorCode::BadRequest);
    }

    fn router() -> RpcRouter {
        RpcRouter::new()
            .query("echo", Access::Public, echo)
            .query("secret", Access::Protected, echo)
    }

    #[tokio::test]
    async fn dispatch_checks_in_order() {
        let state = crate::test_support::state().await;
        let router = router();
        let anonymous = || RpcContext::new(state.clone(), None);

        let ok = router
            .call("echo", ProcedureKind::Query, anonymous(), json!({"word": "hi"}))
            .await;
        assert_eq!(ok, Ok(json!("hi")));

        let missing = router
            .call("nope", ProcedureKind::Query, anonymous(), json!(null))
            .await
            .unwrap_err();
        assert_eq!(missing.code, ErrorCode::NotFound);
        assert_eq!(missing.message, "No procedure found on path \"nope\"");

        let wrong_kind = router
            .call("echo", ProcedureKind::Mutation, anonymous(), json!({"word": "hi"}))
            .await
            .unwrap_err();
        assert_eq!(wrong_kind.code, ErrorCode::MethodNotSupported);

        // Authorization is decided before the input is even looked at
        let denied = router
            .call("secret", ProcedureKind::Query, anonymous(), json!(42))
            .await
            .unwrap_err();
        assert_eq!(denied, RpcError::unauthorized());

        let bad_input = router
            .call("echo", ProcedureKind::Query, anonymous(), json!({"wrd": "hi"}))
            .await
            .unwrap_err();
        assert_eq!(bad_input.code, ErrorCode::BadRequest);
        assert!(bad_input.message.starts_with("Invalid input"));
    }
}
