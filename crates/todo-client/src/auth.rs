//! Email/password auth against `/api/auth`

use reqwest::Response;
use serde::de::DeserializeOwned;
use todo_common::auth::{
    AuthErrorBody, AuthResponse, SessionView, SignInRequest, SignOutResponse, SignUpRequest,
    UserInfo,
};
use tracing::{debug, info};

use crate::{ApiClient, ClientError, Result};

/// Decode a success body, or turn an error body into `ClientError::Auth`
async fn auth_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await?;
    match serde_json::from_str::<AuthErrorBody>(&body) {
        Ok(err) => Err(ClientError::Auth {
            status: status.as_u16(),
            code: err.code,
            message: err.message,
        }),
        Err(_) => Err(ClientError::UnexpectedResponse {
            status: status.as_u16(),
            body,
        }),
    }
}

impl ApiClient {
    /// Create an account and sign in as it
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<UserInfo> {
        let request = SignUpRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            image: None,
        };
        let response = self
            .http
            .post(self.endpoint("api/auth/sign-up/email")?)
            .json(&request)
            .send()
            .await?;

        let auth: AuthResponse = auth_body(response).await?;
        info!("[Auth] Signed up as {}", auth.user.email);
        self.set_token(Some(auth.token));
        Ok(auth.user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserInfo> {
        let request = SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
            remember_me: None,
        };
        let response = self
            .http
            .post(self.endpoint("api/auth/sign-in/email")?)
            .json(&request)
            .send()
            .await?;

        let auth: AuthResponse = auth_body(response).await?;
        info!("[Auth] Signed in as {}", auth.user.email);
        self.set_token(Some(auth.token));
        Ok(auth.user)
    }

    /// End the session on the server. The local token is dropped either way.
    pub async fn sign_out(&self) -> Result<()> {
        let request = self.authorized(self.http.post(self.endpoint("api/auth/sign-out")?));
        self.set_token(None);

        let response = request.send().await?;
        let _: SignOutResponse = auth_body(response).await?;
        debug!("[Auth] Signed out");
        Ok(())
    }

    /// The current session, or `None` when signed out or expired
    pub async fn get_session(&self) -> Result<Option<SessionView>> {
        let response = self
            .authorized(self.http.get(self.endpoint("api/auth/get-session")?))
            .send()
            .await?;

        auth_body(response).await
    }
}
