use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::api::auth::SessionContext;
use crate::api::error::ApiError;
use crate::dashboard::DashboardCore;
use crate::models::{AskPayload, AssistantReply, ChatMessage};

pub async fn ask(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
    Json(payload): Json<AskPayload>,
) -> Result<Json<AssistantReply>, ApiError> {
    let token = context.require_token()?;
    Ok(Json(core.ask(token, &payload.question).await?))
}

pub async fn history(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let token = context.require_token()?;
    Ok(Json(core.history(token).await?))
}
