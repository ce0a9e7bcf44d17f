//! Read-only table endpoints: listing, rows, schema, charts and export.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::api::auth::SessionContext;
use crate::api::error::ApiError;
use crate::dashboard::DashboardCore;
use crate::models::{DistributionBucket, TableData};
use crate::policy::AccessGate;
use crate::schema::TableSchema;
use crate::summary::TableOverview;

#[derive(Debug, Serialize)]
pub struct TablesResponse {
    pub tables: Vec<String>,
}

pub async fn list_tables(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
) -> Result<Json<TablesResponse>, ApiError> {
    AccessGate::require_login(&context.session)?;
    let tables = core.blocking(|core| core.introspector().list_user_tables()).await?;
    Ok(Json(TablesResponse { tables }))
}

pub async fn read_table(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
    Path(table): Path<String>,
) -> Result<Json<TableData>, ApiError> {
    AccessGate::require_login(&context.session)?;
    Ok(Json(core.blocking(move |core| core.records().read_all(&table)).await?))
}

pub async fn table_schema(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
    Path(table): Path<String>,
) -> Result<Json<TableSchema>, ApiError> {
    AccessGate::require_login(&context.session)?;
    Ok(Json(core.blocking(move |core| core.introspector().describe(&table)).await?))
}

pub async fn table_overview(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
    Path(table): Path<String>,
) -> Result<Json<TableOverview>, ApiError> {
    AccessGate::require_login(&context.session)?;
    Ok(Json(core.blocking(move |core| core.summaries().table_overview(&table)).await?))
}

pub async fn distribution(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
    Path((table, column)): Path<(String, String)>,
) -> Result<Json<Vec<DistributionBucket>>, ApiError> {
    AccessGate::require_login(&context.session)?;
    Ok(Json(
        core.blocking(move |core| core.summaries().value_counts(&table, &column))
            .await?,
    ))
}

pub async fn export(
    State(core): State<Arc<DashboardCore>>,
    context: SessionContext,
    Path(table): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    AccessGate::require_login(&context.session)?;
    let export_table = table.clone();
    let body = core
        .blocking(move |core| core.transfer().export_csv(&export_table))
        .await?;
    let disposition = format!("attachment; filename=\"{}.csv\"", table.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
