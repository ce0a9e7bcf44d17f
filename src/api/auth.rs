//! Session extraction from request headers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::api::error::ApiError;
use crate::dashboard::DashboardCore;
use crate::session::Session;

pub const SESSION_HEADER: &str = "x-session-token";

/// The caller's session. Requests without a known token get an empty,
/// logged-out session; handlers decide whether that is enough.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub token: Option<String>,
    pub session: Session,
}

impl SessionContext {
    pub fn require_token(&self) -> Result<&str, ApiError> {
        match (&self.token, self.session.logged_in) {
            (Some(token), true) => Ok(token),
            _ => Err(ApiError::Unauthorized("login required".to_string())),
        }
    }
}

/// `x-session-token`, else `Authorization: Bearer <token>`.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty());
    let from_bearer = || {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    };
    from_header.or_else(from_bearer).map(ToString::to_string)
}

#[async_trait]
impl FromRequestParts<Arc<DashboardCore>> for SessionContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, core: &Arc<DashboardCore>) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers);
        let session = core.session(token.as_deref()).await;
        Ok(Self { token, session })
    }
}
