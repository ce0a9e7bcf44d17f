//! HTTP JSON API.
//!
//! # Routes
//!
//! ## Public
//! - `GET /health`
//! - `POST /v1/auth/register`, `POST /v1/auth/login`
//!
//! ## Session
//! - `POST /v1/auth/logout`, `GET /v1/auth/session`
//! - `GET /v1/tables`, `GET /v1/tables/:table` and its `schema`, `overview`,
//!   `distribution/:column` and `export` sub-resources
//! - `GET /v1/summaries/incidents|tickets|metadata`
//! - `POST /v1/assistant/ask`, `GET /v1/assistant/history`
//!
//! ## Admin
//! - `DELETE /v1/tables/:table`, `POST /v1/tables/:table/records`
//! - `PATCH|DELETE /v1/tables/:table/records/:id`, `POST /v1/tables/:table/records/:id/status`
//! - `PUT /v1/users/:username/role`

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::dashboard::DashboardCore;
use handlers::{assistant, auth as auth_handlers, health, records, summaries, tables, users};

pub fn create_router(core: Arc<DashboardCore>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/auth/register", post(auth_handlers::register))
        .route("/v1/auth/login", post(auth_handlers::login))
        .route("/v1/auth/logout", post(auth_handlers::logout))
        .route("/v1/auth/session", get(auth_handlers::session))
        .route("/v1/tables", get(tables::list_tables))
        .route("/v1/tables/:table", get(tables::read_table).delete(records::drop_table))
        .route("/v1/tables/:table/schema", get(tables::table_schema))
        .route("/v1/tables/:table/overview", get(tables::table_overview))
        .route("/v1/tables/:table/distribution/:column", get(tables::distribution))
        .route("/v1/tables/:table/export", get(tables::export))
        .route("/v1/tables/:table/records", post(records::insert_record))
        .route(
            "/v1/tables/:table/records/:id",
            patch(records::update_record).delete(records::delete_record),
        )
        .route("/v1/tables/:table/records/:id/status", post(records::update_status))
        .route("/v1/summaries/incidents", get(summaries::incidents))
        .route("/v1/summaries/tickets", get(summaries::tickets))
        .route("/v1/summaries/metadata", get(summaries::metadata))
        .route("/v1/assistant/ask", post(assistant::ask))
        .route("/v1/assistant/history", get(assistant::history))
        .route("/v1/users/:username/role", put(users::set_role))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(cors_origins))
        .with_state(core)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::build_cors_layer;

    #[test]
    fn cors_layers_build_for_any_and_listed_origins() {
        let _any = build_cors_layer(&["*".to_string()]);
        let _listed = build_cors_layer(&["http://localhost:8501".to_string()]);
    }
}
