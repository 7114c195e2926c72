use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use todo_common::auth::SESSION_COOKIE;
use tower_cookies::Cookies;
use tracing::{debug, warn};

use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::Error;

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Token from the signed session cookie; tampered cookies are ignored
pub fn cookie_token(state: &AppState, cookies: &Cookies) -> Option<String> {
    cookies
        .signed(&state.cookie_key)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// The session token a request carries, bearer header first
pub fn session_token(state: &AppState, cookies: &Cookies, headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_token(state, cookies))
}

/// Resolve the caller's session, if any, into a `Ctx` extension.
/// Never rejects; protected handlers ask for `Ctx` themselves.
pub async fn mw_resolve_session(
    State(state): State<AppState>,
    cookies: Cookies,
    mut req: Request,
    next: Next,
) -> Response {
    debug!("MIDDLEWARE: resolve_session");

    if let Some(token) = session_token(&state, &cookies, req.headers()) {
        match state.auth.validate_session(&token).await {
            Ok(view) => {
                req.extensions_mut().insert(Ctx::from(view));
            }
            Err(Error::Unauthorized) => debug!("[Auth] Ignoring unknown or expired session"),
            Err(e) => warn!("[Auth] Session lookup failed: {}", e),
        }
    }

    next.run(req).await
}
