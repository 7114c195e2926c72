//! HTTP transport for the RPC router, mounted at `/trpc`
//!
//! Queries arrive as `GET /trpc/<path>?input=<json>`, mutations as
//! `POST /trpc/<path>` with a JSON body. With `?batch=1` the path is a
//! comma-separated list and the input an object keyed by call index.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use todo_common::rpc::{ErrorCode, RpcResponse};
use tracing::{debug, info};

use super::{ProcedureKind, RpcContext, RpcError, RpcResult};
use crate::config::AppState;
use crate::ctx::Ctx;

pub fn router() -> Router<AppState> {
    Router::new().route("/trpc/{*path}", get(handle_query).post(handle_mutation))
}

#[derive(Debug, Default, Deserialize)]
pub struct RpcParams {
    batch: Option<String>,
    input: Option<String>,
}

impl RpcParams {
    fn is_batch(&self) -> bool {
        matches!(self.batch.as_deref(), Some("1") | Some("true"))
    }
}

/// GET /trpc/{path}
pub async fn handle_query(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<RpcParams>,
    ctx: Option<Ctx>,
) -> Response {
    let raw = params.input.as_deref().map(str::as_bytes);
    dispatch(state, ctx, &path, ProcedureKind::Query, params.is_batch(), raw).await
}

/// POST /trpc/{path}
pub async fn handle_mutation(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<RpcParams>,
    ctx: Option<Ctx>,
    body: Bytes,
) -> Response {
    let raw = (!body.is_empty()).then_some(body.as_ref());
    dispatch(state, ctx, &path, ProcedureKind::Mutation, params.is_batch(), raw).await
}

/// Split the raw input into one value per call. Missing input is `null`.
fn decode_inputs(raw: Option<&[u8]>, count: usize, batch: bool) -> RpcResult<Vec<Value>> {
    let value = match raw {
        Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
            serde_json::from_slice(bytes).map_err(|e| {
                RpcError::new(ErrorCode::ParseError, format!("Failed to parse input: {e}"))
            })?
        }
        _ => Value::Null,
    };

    if !batch {
        return Ok(vec![value]);
    }

    match value {
        Value::Null => Ok(vec![Value::Null; count]),
        Value::Object(mut by_index) => Ok((0..count)
            .map(|i| by_index.remove(&i.to_string()).unwrap_or(Value::Null))
            .collect()),
        _ => Err(RpcError::bad_request(
            "Batched input must be an object keyed by call index",
        )),
    }
}

/// One shared status for the batch, or 207 when the calls disagree
fn batch_status(responses: &[RpcResponse]) -> StatusCode {
    let mut statuses = responses.iter().map(RpcResponse::http_status);
    let first = statuses.next().unwrap_or(200);
    let status = if statuses.all(|s| s == first) { first } else { 207 };
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn status_of(response: &RpcResponse) -> StatusCode {
    StatusCode::from_u16(response.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn dispatch(
    state: AppState,
    ctx: Option<Ctx>,
    path: &str,
    kind: ProcedureKind,
    batch: bool,
    raw: Option<&[u8]>,
) -> Response {
    let paths: Vec<&str> = if batch {
        path.split(',').collect()
    } else {
        vec![path]
    };
    debug!("[Rpc] {:?} {:?}", kind, paths);

    let mut responses: Vec<RpcResponse> = match decode_inputs(raw, paths.len(), batch) {
        Err(err) => paths
            .iter()
            .map(|p| RpcResponse::failure(err.code, err.message.clone(), Some(p.to_string())))
            .collect(),
        Ok(inputs) => {
            let calls = paths.iter().zip(inputs).map(|(path, input)| {
                let rpc = state.rpc.clone();
                let call_ctx = RpcContext::new(state.clone(), ctx.clone());
                async move {
                    match rpc.call(path, kind, call_ctx, input).await {
                        Ok(data) => RpcResponse::success(data),
                        Err(err) => {
                            info!("[Rpc] {} failed: {}", path, err);
                            RpcResponse::failure(err.code, err.message, Some(path.to_string()))
                        }
                    }
                }
            });
            join_all(calls).await
        }
    };

    if batch {
        let status = batch_status(&responses);
        return (status, Json(responses)).into_response();
    }

    match responses.pop() {
        Some(response) => (status_of(&response), Json(response)).into_response(),
        None => {
            let err = RpcError::internal();
            let response = RpcResponse::failure(err.code, err.message, Some(path.to_string()));
            (status_of(&response), Json(response)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_inputs() {
        assert_eq!(decode_inputs(None, 1, false).unwrap(), vec![Value::Null]);
        assert_eq!(decode_inputs(Some(b"  "), 1, false).unwrap(), vec![Value::Null]);
        assert_eq!(
            decode_inputs(Some(br#"{"text":"a"}"#), 1, false).unwrap(),
            vec![json!({"text": "a"})]
        );

        let err = decode_inputs(Some(b"{nope"), 1, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
    }

    #[test]
    fn batched_inputs_are_keyed_by_index() {
        let inputs = decode_inputs(Some(br#"{"1":{"id":4}}"#), 3, true).unwrap();
        assert_eq!(inputs, vec![Value::Null, json!({"id": 4}), Value::Null]);

        assert_eq!(decode_inputs(None, 2, true).unwrap(), vec![Value::Null; 2]);
        assert_eq!(
            decode_inputs(Some(b"[1,2]"), 2, true).unwrap_err().code,
            ErrorCode::BadRequest
        );
    }

    #[test]
    fn batch_status_is_shared_or_multi() {
        let ok = RpcResponse::success(json!(1));
        let missing = RpcResponse::failure(ErrorCode::NotFound, "x", None);

        assert_eq!(batch_status(&[ok.clone(), ok.clone()]), StatusCode::OK);
        assert_eq!(batch_status(&[missing.clone()]), StatusCode::NOT_FOUND);
        assert_eq!(batch_status(&[ok, missing]), StatusCode::MULTI_STATUS);
    }
}
