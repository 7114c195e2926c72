//! Auth handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap},
    Json,
};
use todo_common::auth::{
    AuthResponse, SessionView, SignInRequest, SignOutResponse, SignUpRequest, SESSION_COOKIE,
};
use tower_cookies::{cookie::SameSite, Cookie, Cookies};
use tracing::{info, warn};

use super::middleware::{cookie_token, session_token};
use super::RequestMeta;
use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::{Error, Result};

/// State-changing auth calls from a browser must come from a trusted origin
fn check_origin(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return Ok(());
    };
    let origin = origin.to_str().map_err(|_| Error::InvalidOrigin)?;
    let origin = origin.trim_end_matches('/');

    if state.trusted_origins.iter().any(|trusted| trusted == origin) {
        Ok(())
    } else {
        warn!("[Auth] Rejected request from untrusted origin {}", origin);
        Err(Error::InvalidOrigin)
    }
}

/// Cross-site session cookie. Without `persistent` it lasts for the browser session.
fn set_session_cookie(state: &AppState, cookies: &Cookies, token: &str, persistent: bool) {
    let mut cookie = Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None);
    if persistent {
        let ttl = state.auth.settings().session_ttl.num_seconds();
        cookie = cookie.max_age(time::Duration::seconds(ttl));
    }
    cookies.signed(&state.cookie_key).add(cookie.build());
}

/// Malformed bodies get the same `{ code, message }` shape as every other auth error
fn json_body<T>(body: core::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    match body {
        Ok(Json(req)) => Ok(req),
        Err(rejection) => {
            warn!("[Auth] Rejected request body: {}", rejection.body_text());
            Err(Error::BadRequest(rejection.body_text()))
        }
    }
}

fn clear_session_cookie(state: &AppState, cookies: &Cookies) {
    cookies
        .signed(&state.cookie_key)
        .remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
}

/// POST /api/auth/sign-up/email
pub async fn sign_up_email(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    body: core::result::Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>> {
    check_origin(&state, &headers)?;
    let req = json_body(body)?;
    info!("POST /api/auth/sign-up/email - {}", req.email);

    let meta = RequestMeta::from_headers(&headers);
    let (user, session) = state.auth.sign_up(req, &meta).await?;
    set_session_cookie(&state, &cookies, &session.token, true);

    Ok(Json(AuthResponse {
        redirect: None,
        token: session.token,
        user,
    }))
}

/// POST /api/auth/sign-in/email
pub async fn sign_in_email(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    body: core::result::Result<Json<SignInRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>> {
    check_origin(&state, &headers)?;
    let req = json_body(body)?;
    info!("POST /api/auth/sign-in/email - {}", req.email);

    let meta = RequestMeta::from_headers(&headers);
    let (user, session) = state
        .auth
        .sign_in(
            &req.email,
            &req.password,
            req.remember_me.unwrap_or(true),
            &meta,
        )
        .await?;
    set_session_cookie(&state, &cookies, &session.token, session.remember_me);

    Ok(Json(AuthResponse {
        redirect: Some(false),
        token: session.token,
        user,
    }))
}

/// POST /api/auth/sign-out
pub async fn sign_out(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
) -> Result<Json<SignOutResponse>> {
    info!("POST /api/auth/sign-out");
    check_origin(&state, &headers)?;

    if let Some(token) = session_token(&state, &cookies, &headers) {
        state.auth.sign_out(&token).await?;
    }
    clear_session_cookie(&state, &cookies);

    Ok(Json(SignOutResponse { success: true }))
}

/// GET /api/auth/get-session
///
/// `null` when the request carries no valid session. A cookie-borne session
/// gets its cookie re-issued so a refreshed expiry reaches the browser; a
/// browser-session cookie stays one.
pub async fn get_session(
    State(state): State<AppState>,
    cookies: Cookies,
    ctx: Option<Ctx>,
) -> Json<Option<SessionView>> {
    let Some(ctx) = ctx else {
        return Json(None);
    };

    if cookie_token(&state, &cookies).as_deref() == Some(ctx.session().token.as_str()) {
        let session = ctx.session();
        set_session_cookie(&state, &cookies, &session.token, session.remember_me);
    }

    Json(Some(ctx.into()))
}

/// Any other path under /api/auth
pub async fn not_found() -> Error {
    Error::NotFound("Not found".to_string())
}
