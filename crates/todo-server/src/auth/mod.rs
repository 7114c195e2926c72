//! Authentication Module
//!
//! Handles sign-up, sign-in and session management. Users, their credential
//! accounts and sessions live in the same SQLite database as the todos.

pub mod handlers;
pub mod middleware;

use axum::{
    http::{header, HeaderMap},
    routing::{get, post},
    Router,
};
use bcrypt::{hash, verify};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use todo_common::auth::{
    SessionInfo, SessionView, SignUpRequest, UserInfo, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppState;
use crate::error::{Error, Result};

/// Session lifetime and password hashing knobs
#[derive(Clone, Debug)]
pub struct AuthSettings {
    pub session_ttl: chrono::Duration,
    /// A session older than this is extended on its next use
    pub refresh_age: chrono::Duration,
    pub hash_cost: u32,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            session_ttl: chrono::Duration::days(7),
            refresh_age: chrono::Duration::days(1),
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Client details recorded on a new session
#[derive(Clone, Debug, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let ip_address = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Self {
            ip_address,
            user_agent,
        }
    }
}

/// Routes of the auth surface, all under `/api/auth`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/sign-up/email", post(handlers::sign_up_email))
        .route("/api/auth/sign-in/email", post(handlers::sign_in_email))
        .route("/api/auth/sign-out", post(handlers::sign_out))
        .route("/api/auth/get-session", get(handlers::get_session))
        .route(
            "/api/auth/{*rest}",
            get(handlers::not_found).post(handlers::not_found),
        )
}

/// Fixed-width UTC timestamps, so stored values also compare correctly as text
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    email_verified: bool,
    image: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<UserRow> for UserInfo {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(UserInfo {
            id: row.id,
            name: row.name,
            email: row.email,
            email_verified: row.email_verified,
            image: row.image,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    token: String,
    user_id: String,
    expires_at: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    remember_me: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SessionRow> for SessionInfo {
    type Error = Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(SessionInfo {
            id: row.id,
            token: row.token,
            user_id: row.user_id,
            expires_at: parse_timestamp(&row.expires_at)?,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            remember_me: row.remember_me,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

const USER_COLUMNS: &str = "id, name, email, email_verified, image, created_at, updated_at";
const SESSION_COLUMNS: &str =
    "id, token, user_id, expires_at, ip_address, user_agent, remember_me, created_at, updated_at";

/// Auth manager handles all authentication
pub struct AuthManager {
    pool: SqlitePool,
    settings: AuthSettings,
}

impl AuthManager {
    pub fn new(pool: SqlitePool, settings: AuthSettings) -> Self {
        Self { pool, settings }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Register a new user with an email/password credential and open a session
    pub async fn sign_up(
        &self,
        req: SignUpRequest,
        meta: &RequestMeta,
    ) -> Result<(UserInfo, SessionInfo)> {
        let email = normalize_email(&req.email);
        let name = req.name.trim().to_string();

        if !is_valid_email(&email) {
            return Err(Error::InvalidEmail);
        }
        if name.is_empty() {
            return Err(Error::NameRequired);
        }
        if req.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(Error::PasswordTooShort);
        }
        if req.password.chars().count() > MAX_PASSWORD_LENGTH {
            return Err(Error::PasswordTooLong);
        }

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(Error::UserAlreadyExists);
        }

        let password_hash = self.hash_password(req.password).await?;
        let now = Utc::now();
        let user = UserInfo {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            email_verified: false,
            image: req.image,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO users (id, name, email, email_verified, image, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.image)
        .bind(timestamp(now))
        .bind(timestamp(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            // Lost a race with a concurrent sign-up for the same email
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return Error::UserAlreadyExists;
                }
            }
            Error::Database(e)
        })?;
        sqlx::query(
            "INSERT INTO accounts (id, user_id, provider_id, password_hash, created_at, updated_at) VALUES (?, ?, 'credential', ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user.id)
        .bind(&password_hash)
        .bind(timestamp(now))
        .bind(timestamp(now))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("[Auth] User registered: {} ({})", user.name, user.email);

        let session = self.create_session(&user.id, true, meta).await?;
        Ok((user, session))
    }

    /// Check an email/password pair and open a session.
    /// `remember_me` is stored on the session for cookie re-issue.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        meta: &RequestMeta,
    ) -> Result<(UserInfo, SessionInfo)> {
        let email = normalize_email(email);

        let row: Option<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT u.id, a.password_hash
            FROM users u
            JOIN accounts a ON a.user_id = u.id AND a.provider_id = 'credential'
            WHERE u.email = ?
            "#,
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        let Some((user_id, Some(password_hash))) = row else {
            warn!("[Auth] Failed login attempt for {}", email);
            return Err(Error::InvalidCredentials);
        };

        if !self.verify_password(password.to_string(), password_hash).await? {
            warn!("[Auth] Failed login attempt for {}", email);
            return Err(Error::InvalidCredentials);
        }

        let user = self.get_user(&user_id).await?;
        let session = self.create_session(&user_id, remember_me, meta).await?;

        info!("[Auth] User logged in: {}", user.email);
        Ok((user, session))
    }

    async fn create_session(
        &self,
        user_id: &str,
        remember_me: bool,
        meta: &RequestMeta,
    ) -> Result<SessionInfo> {
        let now = Utc::now();
        let session = SessionInfo {
            id: Uuid::new_v4().to_string(),
            token: format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
            user_id: user_id.to_string(),
            expires_at: now + self.settings.session_ttl,
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            remember_me,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO sessions (id, token, user_id, expires_at, ip_address, user_agent, remember_me, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(timestamp(session.expires_at))
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.remember_me)
        .bind(timestamp(session.created_at))
        .bind(timestamp(session.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    /// Resolve a session token to its session and user.
    ///
    /// Expired sessions are deleted and rejected. A session whose expiry was
    /// last set more than `refresh_age` ago gets a fresh `session_ttl`.
    pub async fn validate_session(&self, token: &str) -> Result<SessionView> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE token = ?"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let mut session = SessionInfo::try_from(row.ok_or(Error::Unauthorized)?)?;
        let now = Utc::now();

        if session.expires_at <= now {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(&session.id)
                .execute(&self.pool)
                .await?;
            info!("[Auth] Session expired for user {}", session.user_id);
            return Err(Error::Unauthorized);
        }

        let last_refresh = session.expires_at - self.settings.session_ttl;
        if last_refresh + self.settings.refresh_age <= now {
            session.expires_at = now + self.settings.session_ttl;
            session.updated_at = now;
            sqlx::query("UPDATE sessions SET expires_at = ?, updated_at = ? WHERE id = ?")
                .bind(timestamp(session.expires_at))
                .bind(timestamp(session.updated_at))
                .bind(&session.id)
                .execute(&self.pool)
                .await?;
        }

        let user = self.get_user(&session.user_id).await?;
        Ok(SessionView { session, user })
    }

    /// Invalidate a session. Unknown tokens are ignored.
    pub async fn sign_out(&self, token: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            info!("[Auth] Session invalidated");
        }
        Ok(())
    }

    /// Drop every expired session, returning how many were removed
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<UserInfo> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| Error::NotFound("User not found".to_string()))?
            .try_into()
    }

    async fn hash_password(&self, password: String) -> Result<String> {
        let cost = self.settings.hash_cost;
        tokio::task::spawn_blocking(move || hash(password, cost))
            .await
            .map_err(|e| Error::Internal(format!("password hashing task failed: {e}")))?
            .map_err(Error::from)
    }

    async fn verify_password(&self, password: String, password_hash: String) -> Result<bool> {
        tokio::task::spawn_blocking(move || verify(password, &password_hash))
            .await
            .map_err(|e| Error::Internal(format!("password check task failed: {e}")))?
            .map_err(Error::from)
    }
}
