use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::api::auth::SessionContext;
use crate::api::error::ApiError;
use crate::dashboard::DashboardCore;
use crate::policy::AccessGate;
use crate::summary::{IncidentSummary, MetadataSummary, TicketSummary};

pub async fn incidents(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
) -> Result<Json<IncidentSummary>, ApiError> {
    AccessGate::require_login(&context.session)?;
    Ok(Json(core.blocking(|core| core.summaries().incidents()).await?))
}

pub async fn tickets(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
) -> Result<Json<TicketSummary>, ApiError> {
    AccessGate::require_login(&context.session)?;
    Ok(Json(core.blocking(|core| core.summaries().tickets()).await?))
}

pub async fn metadata(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
) -> Result<Json<MetadataSummary>, ApiError> {
    AccessGate::require_login(&context.session)?;
    Ok(Json(core.blocking(|core| core.summaries().metadata()).await?))
}
