// src/routes/health.rs
//! API health check endpoint for the FieldSense status service.
//!
//! `/health` is used by container orchestrators and CI pipelines to verify
//! that the service is up. It is a sibling module in the `routes` directory
//! and follows the Explicit Module Boundary Pattern (EMBP):
//! - Internal to this file: endpoint handler(s) and related types
//! - Exports to the gateway (`mod.rs`): a subrouter containing the `/health` route

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    crop_categories: usize,
}

/// Handle `GET /health`.
///
/// Reports the size of the loaded crop catalog. Does not touch the database.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        crop_categories: state.catalog.len(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
