//! Todo Server Library
//!
//! Session auth, a typed RPC router over a SQLite todo table, and a
//! streaming relay to a hosted chat model, all behind one axum router.

pub mod auth;
pub mod chat;
pub mod config;
pub mod ctx;
pub mod db;
pub mod error;
pub mod rpc;
pub mod todos;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat::{relay_chat, GeminiChatModel};
pub use config::{AppState, ServerConfig};
pub use error::{Error, Result};

/// Install the global fmt subscriber; `RUST_LOG` overrides the `info` default
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        // Already set, ignore
    }
}

fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin.trim_end_matches('/'))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

/// The full HTTP surface: liveness, auth, RPC and the chat relay
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.cors_origin)?;

    let app = Router::new()
        .route("/", get(liveness))
        .merge(auth::router())
        .merge(rpc::http::router())
        .route("/ai", post(relay_chat))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::mw_resolve_session,
        ))
        .layer(CookieManagerLayer::new())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

/// GET /
async fn liveness() -> &'static str {
    "OK"
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    info!("=== Todo Server ===");
    info!("Database: {}", config.database_url);

    let pool = db::connect(&config.database_url).await?;
    db::init_schema(&pool).await?;

    let chat = Arc::new(GeminiChatModel::new(
        &config.model_api_key,
        config.chat_model.clone(),
    ));
    let addr = config.bind_addr();
    let state = AppState::new(config, pool.clone(), chat);

    match state.auth.purge_expired().await {
        Ok(0) => {}
        Ok(n) => info!("[Auth] Purged {} expired sessions", n),
        Err(e) => warn!("[Auth] Failed to purge expired sessions: {}", e),
    }

    let app = build_router(state)?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down");
}
