//! Typed calls to the `/trpc` procedures

use reqwest::Response;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use todo_common::rpc::{paths, HealthStatus, PrivateData, RpcResponse};
use todo_common::todo::{CreateTodoInput, DeleteTodoInput, Todo, ToggleTodoInput};
use tracing::debug;
use url::Url;

use crate::{ApiClient, ClientError, Result};

fn into_result(envelope: RpcResponse) -> Result<Value> {
    match envelope {
        RpcResponse::Success { result } => Ok(result.data),
        RpcResponse::Failure { error } => Err(ClientError::Rpc {
            code: error.data.code,
            message: error.message,
        }),
    }
}

/// Read an envelope (or array of them) whatever the status code
async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|_| ClientError::UnexpectedResponse { status, body })
}

fn with_input(mut url: Url, input: &Value, batch: bool) -> Url {
    {
        let mut query = url.query_pairs_mut();
        if batch {
            query.append_pair("batch", "1");
        }
        if !input.is_null() {
            query.append_pair("input", &input.to_string());
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    url
}

impl ApiClient {
    /// Run a query procedure; the input travels in the URL
    pub async fn query<I, O>(&self, path: &str, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input)?;
        let url = with_input(self.endpoint(&format!("trpc/{path}"))?, &input, false);
        debug!("[Rpc] query {}", path);

        let response = self.authorized(self.http.get(url)).send().await?;
        let data = into_result(read_envelope(response).await?)?;
        Ok(serde_json::from_value(data)?)
    }

    /// Run a mutation procedure; the input is the JSON body
    pub async fn mutation<I, O>(&self, path: &str, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let url = self.endpoint(&format!("trpc/{path}"))?;
        debug!("[Rpc] mutation {}", path);

        let response = self
            .authorized(self.http.post(url))
            .json(input)
            .send()
            .await?;
        let data = into_result(read_envelope(response).await?)?;
        Ok(serde_json::from_value(data)?)
    }

    /// Several queries in one request. Each call succeeds or fails on its own;
    /// the outer error is for the request as a whole.
    pub async fn batch_query(&self, calls: &[(&str, Value)]) -> Result<Vec<Result<Value>>> {
        let joined = calls
            .iter()
            .map(|(path, _)| *path)
            .collect::<Vec<_>>()
            .join(",");

        let mut by_index = Map::new();
        for (i, (_, input)) in calls.iter().enumerate() {
            if !input.is_null() {
                by_index.insert(i.to_string(), input.clone());
            }
        }
        let input = if by_index.is_empty() {
            Value::Null
        } else {
            Value::Object(by_index)
        };

        let url = with_input(self.endpoint(&format!("trpc/{joined}"))?, &input, true);
        debug!("[Rpc] batch {}", joined);

        let response = self.authorized(self.http.get(url)).send().await?;
        let envelopes: Vec<RpcResponse> = read_envelope(response).await?;
        Ok(envelopes.into_iter().map(into_result).collect())
    }

    pub async fn health_check(&self) -> Result<HealthStatus> {
        self.query(paths::HEALTH_CHECK, &Value::Null).await
    }

    /// Requires a session
    pub async fn private_data(&self) -> Result<PrivateData> {
        self.query(paths::PRIVATE_DATA, &Value::Null).await
    }

    pub async fn todos_get_all(&self) -> Result<Vec<Todo>> {
        self.query(paths::TODO_GET_ALL, &Value::Null).await
    }

    pub async fn todo_create(&self, text: &str) -> Result<Todo> {
        self.mutation(paths::TODO_CREATE, &CreateTodoInput::new(text))
            .await
    }

    pub async fn todo_toggle(&self, id: i64, completed: bool) -> Result<Todo> {
        self.mutation(paths::TODO_TOGGLE, &ToggleTodoInput { id, completed })
            .await
    }

    pub async fn todo_delete(&self, id: i64) -> Result<Todo> {
        self.mutation(paths::TODO_DELETE, &DeleteTodoInput { id })
            .await
    }
}
