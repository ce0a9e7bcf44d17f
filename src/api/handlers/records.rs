//! Record and table writes. All of them require an admin session.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::api::auth::SessionContext;
use crate::api::error::ApiError;
use crate::dashboard::DashboardCore;
use crate::errors::AppResult;
use crate::models::{
    BooleanResponse, CellValue, InsertRecordPayload, InsertResponse, MutationResponse, StatusUpdatePayload,
    UpdateColumnPayload,
};
use crate::policy::AccessGate;

#[derive(Debug, Default, Deserialize)]
pub struct IdColumnQuery {
    #[serde(default)]
    pub id_column: Option<String>,
}

/// Identifier column (given or inferred) and the typed identifier value.
fn resolve_identifier(
    core: &DashboardCore,
    table: &str,
    id_column: Option<&str>,
    raw_id: &str,
) -> AppResult<(String, CellValue)> {
    let schema = core.introspector().describe(table)?;
    let column = match id_column {
        Some(name) => schema.require_column(name)?.to_string(),
        None => schema.identifier.clone(),
    };
    let value = core.records().identifier_value(table, Some(&column), raw_id)?;
    Ok((column, value))
}

pub async fn insert_record(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
    Path(table): Path<String>,
    Json(payload): Json<InsertRecordPayload>,
) -> Result<impl IntoResponse, ApiError> {
    AccessGate::require_admin(&context.session)?;
    let session = context.session;
    let row_id = core
        .blocking(move |core| core.gate().insert_record(&session, &table, &payload.values))
        .await?;
    Ok((StatusCode::CREATED, Json(InsertResponse { row_id })))
}

pub async fn update_record(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
    Path((table, id)): Path<(String, String)>,
    Json(payload): Json<UpdateColumnPayload>,
) -> Result<Json<MutationResponse>, ApiError> {
    AccessGate::require_admin(&context.session)?;
    let session = context.session;
    let affected_rows = core
        .blocking(move |core| {
            let (id_column, id_value) = resolve_identifier(core, &table, payload.id_column.as_deref(), &id)?;
            core.gate()
                .update_single_column(&session, &table, &id_column, &id_value, &payload.column, &payload.value)
        })
        .await?;
    Ok(Json(MutationResponse { affected_rows }))
}

pub async fn update_status(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
    Path((table, id)): Path<(String, String)>,
    Json(payload): Json<StatusUpdatePayload>,
) -> Result<Json<MutationResponse>, ApiError> {
    AccessGate::require_admin(&context.session)?;
    let session = context.session;
    let affected_rows = core
        .blocking(move |core| {
            let (_, id_value) = resolve_identifier(core, &table, None, &id)?;
            core.gate().update_status(&session, &table, &id_value, &payload.status)
        })
        .await?;
    Ok(Json(MutationResponse { affected_rows }))
}

pub async fn delete_record(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
    Path((table, id)): Path<(String, String)>,
    Query(query): Query<IdColumnQuery>,
) -> Result<Json<MutationResponse>, ApiError> {
    AccessGate::require_admin(&context.session)?;
    let session = context.session;
    let affected_rows = core
        .blocking(move |core| {
            let (id_column, id_value) = resolve_identifier(core, &table, query.id_column.as_deref(), &id)?;
            core.gate().delete_record(&session, &table, &id_column, &id_value)
        })
        .await?;
    Ok(Json(MutationResponse { affected_rows }))
}

pub async fn drop_table(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
    Path(table): Path<String>,
) -> Result<Json<BooleanResponse>, ApiError> {
    let session = context.session;
    core.blocking(move |core| core.gate().drop_table(&session, &table))
        .await?;
    Ok(Json(BooleanResponse { success: true }))
}
