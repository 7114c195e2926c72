//! Server configuration and shared application state

use std::sync::Arc;

use anyhow::{ensure, Context};
use axum::http::HeaderValue;
use clap::Parser;
use sha2::{Digest, Sha512};
use sqlx::SqlitePool;
use tower_cookies::Key;
use url::Url;

use crate::auth::{AuthManager, AuthSettings};
use crate::chat::ChatModel;
use crate::rpc::{app_router, RpcRouter};
use crate::todos::TodoStore;

/// Configuration for the todo server. Every option can come from the environment.
#[derive(Parser, Clone)]
#[command(
    name = "todo-server",
    version,
    about = "Todo server with session auth, typed RPC and a chat relay"
)]
pub struct ServerConfig {
    /// Database connection string, e.g. sqlite://todo.db
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Secret used to sign session cookies
    #[arg(long, env = "AUTH_SECRET", hide_env_values = true)]
    pub auth_secret: String,

    /// Public base URL of the auth surface, trusted as a request origin
    #[arg(long, env = "AUTH_BASE_URL")]
    pub auth_base_url: String,

    /// API key for the hosted generative model
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub model_api_key: String,

    /// The single browser origin allowed by CORS
    #[arg(long, env = "CORS_ORIGIN")]
    pub cors_origin: String,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Model used by the chat relay
    #[arg(long, env = "CHAT_MODEL", default_value = "gemini-2.0-flash")]
    pub chat_model: String,

    /// Session lifetime in seconds
    #[arg(long, env = "SESSION_TTL_SECS", default_value_t = 60 * 60 * 24 * 7)]
    pub session_ttl_secs: i64,

    /// Sessions older than this many seconds get their expiry pushed forward
    #[arg(long, env = "SESSION_REFRESH_SECS", default_value_t = 60 * 60 * 24)]
    pub session_refresh_secs: i64,

    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("database_url", &self.database_url)
            .field("auth_secret", &"<redacted>")
            .field("auth_base_url", &self.auth_base_url)
            .field("model_api_key", &"<redacted>")
            .field("cors_origin", &self.cors_origin)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("chat_model", &self.chat_model)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("session_refresh_secs", &self.session_refresh_secs)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

fn required(name: &str, value: &str) -> anyhow::Result<()> {
    ensure!(!value.trim().is_empty(), "{name} must not be empty");
    Ok(())
}

impl ServerConfig {
    /// Reject empty or malformed settings before anything is started
    pub fn validate(&self) -> anyhow::Result<()> {
        required("DATABASE_URL", &self.database_url)?;
        Url::parse(&self.database_url).context("DATABASE_URL is not a valid URL")?;
        required("AUTH_SECRET", &self.auth_secret)?;
        required("AUTH_BASE_URL", &self.auth_base_url)?;
        Url::parse(&self.auth_base_url).context("AUTH_BASE_URL is not a valid URL")?;
        required("GEMINI_API_KEY", &self.model_api_key)?;
        required("CORS_ORIGIN", &self.cors_origin)?;
        HeaderValue::from_str(&self.cors_origin).context("CORS_ORIGIN is not a valid header value")?;
        required("CHAT_MODEL", &self.chat_model)?;
        ensure!(self.session_ttl_secs > 0, "SESSION_TTL_SECS must be positive");
        ensure!(
            self.session_refresh_secs >= 0,
            "SESSION_REFRESH_SECS must not be negative"
        );
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            session_ttl: chrono::Duration::seconds(self.session_ttl_secs),
            refresh_age: chrono::Duration::seconds(self.session_refresh_secs),
            hash_cost: self.bcrypt_cost,
        }
    }

    /// Origins allowed to POST to the auth surface
    pub fn trusted_origins(&self) -> Vec<String> {
        let mut origins = Vec::new();
        if let Ok(url) = Url::parse(&self.auth_base_url) {
            origins.push(url.origin().ascii_serialization());
        }
        let cors = self.cors_origin.trim_end_matches('/').to_string();
        if !origins.contains(&cors) {
            origins.push(cors);
        }
        origins
    }

    /// Cookie signing key; SHA-512 of the secret gives the 64 bytes `Key` needs
    pub fn cookie_key(&self) -> Key {
        let digest = Sha512::digest(self.auth_secret.as_bytes());
        Key::from(digest.as_slice())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub pool: SqlitePool,
    pub auth: Arc<AuthManager>,
    pub todos: Arc<TodoStore>,
    pub chat: Arc<dyn ChatModel>,
    pub rpc: Arc<RpcRouter>,
    pub cookie_key: Key,
    pub trusted_origins: Arc<Vec<String>>,
}

impl AppState {
    /// Wire the services over an initialized pool
    pub fn new(config: ServerConfig, pool: SqlitePool, chat: Arc<dyn ChatModel>) -> Self {
        let auth = Arc::new(AuthManager::new(pool.clone(), config.auth_settings()));
        let todos = Arc::new(TodoStore::new(pool.clone()));
        let cookie_key = config.cookie_key();
        let trusted_origins = Arc::new(config.trusted_origins());

        Self {
            config: Arc::new(config),
            pool,
            auth,
            todos,
            chat,
            rpc: Arc::new(app_router()),
            cookie_key,
            trusted_origins,
        }
    }
}
