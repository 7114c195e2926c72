use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use todo_common::auth::{SessionInfo, SessionView, UserInfo};

use crate::error::{Error, Result};

/// The authenticated caller of a request, placed in request extensions by
/// the session middleware.
#[derive(Clone, Debug)]
pub struct Ctx {
    user: UserInfo,
    session: SessionInfo,
}

impl Ctx {
    pub fn new(user: UserInfo, session: SessionInfo) -> Self {
        Self { user, session }
    }

    pub fn user(&self) -> &UserInfo {
        &self.user
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

impl From<SessionView> for Ctx {
    fn from(view: SessionView) -> Self {
        Self::new(view.user, view.session)
    }
}

impl From<Ctx> for SessionView {
    fn from(ctx: Ctx) -> Self {
        SessionView {
            session: ctx.session,
            user: ctx.user,
        }
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Ctx>()
            .cloned()
            .ok_or(Error::Unauthorized)
    }
}

impl<S> OptionalFromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> core::result::Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Ctx>().cloned())
    }
}
