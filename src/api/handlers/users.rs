use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::api::auth::SessionContext;
use crate::api::error::ApiError;
use crate::dashboard::DashboardCore;
use crate::models::{BooleanResponse, SetRolePayload};

/// Admin-only role change.
pub async fn set_role(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
    Path(username): Path<String>,
    Json(payload): Json<SetRolePayload>,
) -> Result<Json<BooleanResponse>, ApiError> {
    core.set_role(&context.session, &username, payload.role).await?;
    Ok(Json(BooleanResponse { success: true }))
}
