//! The app's procedures: health check, private data and the todo sub-router

use serde::de::IgnoredAny;
use todo_common::rpc::{HealthStatus, PrivateData};
use todo_common::todo::{CreateTodoInput, DeleteTodoInput, Todo, ToggleTodoInput};

use super::{Access, RpcContext, RpcResult, RpcRouter};

pub fn app_router() -> RpcRouter {
    RpcRouter::new()
        .query("healthCheck", Access::Public, health_check)
        .query("privateData", Access::Protected, private_data)
        .nest("todo", todo_router())
}

pub fn todo_router() -> RpcRouter {
    RpcRouter::new()
        .query("getAll", Access::Public, get_all)
        .mutation("create", Access::Public, create)
        .mutation("toggle", Access::Public, toggle)
        .mutation("delete", Access::Public, delete)
}

async fn health_check(_ctx: RpcContext, _input: IgnoredAny) -> RpcResult<HealthStatus> {
    Ok(HealthStatus {
        status: "OK".to_string(),
    })
}

async fn private_data(ctx: RpcContext, _input: IgnoredAny) -> RpcResult<PrivateData> {
    let session = ctx.session()?;
    Ok(PrivateData {
        message: "This is private".to_string(),
        user: session.user().clone(),
    })
}

async fn get_all(ctx: RpcContext, _input: IgnoredAny) -> RpcResult<Vec<Todo>> {
    Ok(ctx.state.todos.list().await?)
}

async fn create(ctx: RpcContext, input: CreateTodoInput) -> RpcResult<Todo> {
    Ok(ctx.state.todos.create(input).await?)
}

async fn toggle(ctx: RpcContext, input: ToggleTodoInput) -> RpcResult<Todo> {
    Ok(ctx.state.todos.set_completed(input.id, input.completed).await?)
}

async fn delete(ctx: RpcContext, input: DeleteTodoInput) -> RpcResult<Todo> {
    Ok(ctx.state.todos.delete(input.id).await?)
}
