use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::api::auth::SessionContext;
use crate::api::error::ApiError;
use crate::dashboard::DashboardCore;
use crate::models::{BooleanResponse, LoginPayload, LoginResponse, RegisterOutcome, RegisterPayload, SessionView};

pub async fn register(
    State(core): State<Arc<DashboardCore>>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse, ApiError> {
    match core.register(payload).await? {
        RegisterOutcome::Created => Ok((StatusCode::CREATED, Json(BooleanResponse { success: true }))),
        RegisterOutcome::Duplicate => Err(ApiError::Conflict("Username already exists.".to_string())),
    }
}

pub async fn login(
    State(core): State<Arc<DashboardCore>>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    Ok(Json(core.login(payload).await?))
}

pub async fn logout(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
) -> Json<BooleanResponse> {
    let success = match context.token.as_deref() {
        Some(token) => core.logout(token).await,
        None => false,
    };
    Json(BooleanResponse { success })
}

pub async fn session(context: SessionContext) -> Json<SessionView> {
    Json(context.session.view())
}
