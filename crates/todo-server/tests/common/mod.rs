#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use clap::Parser;
use futures::StreamExt;
use serde_json::Value;
use tempfile::TempDir;
use todo_server::chat::{ChatModel, ModelMessage, TextStream};
use todo_server::{build_router, db, AppState, ServerConfig};
use tower::ServiceExt;

pub const WEB_ORIGIN: &str = "http://localhost:3001";

/// Model that replays a fixed script of deltas
#[derive(Default)]
pub struct ScriptedModel {
    pub deltas: Vec<String>,
    /// Fail the stream after this many deltas
    pub fail_after: Option<usize>,
    /// Fail before any delta is produced
    pub fail_to_open: bool,
    /// Message lists the relay sent upstream, one per call
    pub seen: Mutex<Vec<Vec<ModelMessage>>>,
}

impl ScriptedModel {
    pub fn replying(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream_text(&self, messages: Vec<ModelMessage>) -> anyhow::Result<TextStream> {
        self.seen.lock().unwrap().push(messages);
        if self.fail_to_open {
            anyhow::bail!("upstream refused the request");
        }

        let mut items: Vec<anyhow::Result<String>> = Vec::new();
        for (i, delta) in self.deltas.iter().enumerate() {
            if self.fail_after == Some(i) {
                items.push(Err(anyhow::anyhow!("upstream dropped the stream")));
                break;
            }
            items.push(Ok(delta.clone()));
        }
        Ok(futures::stream::iter(items).boxed())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

pub async fn app() -> TestApp {
    app_with_model(Arc::new(ScriptedModel::replying(&["Hello", ", world"]))).await
}

pub async fn app_with_model(model: Arc<dyn ChatModel>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let database_url = format!("sqlite://{}", dir.path().join("todo.db").display());

    let config = ServerConfig::try_parse_from([
        "todo-server",
        "--database-url",
        database_url.as_str(),
        "--auth-secret",
        "integration-secret",
        "--auth-base-url",
        "http://localhost:3000",
        "--model-api-key",
        "unused",
        "--cors-origin",
        WEB_ORIGIN,
        "--bcrypt-cost",
        "4",
    ])
    .unwrap();
    config.validate().unwrap();

    let pool = db::connect(&config.database_url).await.unwrap();
    db::init_schema(&pool).await.unwrap();
    let state = AppState::new(config, pool, model);
    let router = build_router(state.clone()).unwrap();

    TestApp {
        router,
        state,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    /// Sign up and return the session token from the response body
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> String {
        let res = self
            .send(json_post(
                "/api/auth/sign-up/email",
                serde_json::json!({"name": name, "email": email, "password": password}),
            ))
            .await;
        assert_eq!(res.status(), 200);
        let body = body_json(res).await;
        body["token"].as_str().unwrap().to_string()
    }
}

pub fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn with_bearer(mut req: Request<Body>, token: &str) -> Request<Body> {
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    req
}

pub async fn body_text(res: Response<Body>) -> String {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(res: Response<Body>) -> Value {
    serde_json::from_str(&body_text(res).await).unwrap()
}

/// `name=value` of the session cookie in a response, for sending it back
pub fn session_cookie_pair(res: &Response<Body>) -> Option<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("todo.session_token="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// Query string value for an RPC input
pub fn encode_input(input: &Value) -> String {
    url::form_urlencoded::byte_serialize(input.to_string().as_bytes()).collect()
}
