//! Typed client for the todo server
//!
//! One [`ApiClient`] covers the auth surface, every RPC procedure and the
//! chat relay. The session token from sign-in is kept on the client and
//! sent as a bearer header; browsers use the cookie instead.

pub mod auth;
pub mod chat;
pub mod error;
pub mod guard;
pub mod rpc;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::RequestBuilder;
use tracing::warn;
use url::Url;

pub use chat::{collect_text, ChatStream};
pub use error::{ClientError, Result};
pub use guard::{guard, Navigation, Route};

/// Where the server lives and how long to wait for a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Client-visible server URL
    pub server_url: String,
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_url: "http://localhost:3000".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl ClientConfig {
    /// Reads `SERVER_URL`, falling back to the default
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("SERVER_URL") {
            if !url.trim().is_empty() {
                config.server_url = url.trim().to_string();
            }
        }
        config
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("signed_in", &self.token.read().is_some())
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::from_config(ClientConfig {
            server_url: base_url.to_string(),
            ..Default::default()
        })
    }

    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.server_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        // No overall timeout: chat replies stream for as long as the model talks
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The current session token, if signed in
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Use a token obtained elsewhere, or forget it with `None`
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Attach the bearer token when there is one
    pub(crate) fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Session check for a client-side route, run before it renders.
    /// A failed session lookup counts as signed out.
    pub async fn navigate(&self, route: Route) -> Navigation {
        if !route.requires_session() {
            return Navigation::Render;
        }

        match self.get_session().await {
            Ok(session) => guard(route, session.as_ref()),
            Err(e) => {
                warn!("[Guard] Session lookup failed: {}", e);
                guard(route, None)
            }
        }
    }
}
