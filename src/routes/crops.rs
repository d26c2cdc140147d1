//! Read-only crop catalog endpoints.

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use super::extract::ApiPath;
use super::{ApiError, AppState};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/crops", get(list_handler))
        .route("/crops/{id}", get(get_handler))
}

async fn list_handler(State(state): State<AppState>) -> Json<Value> {
    // ---
    let crops: Vec<_> = state.catalog.iter().collect();
    Json(json!({ "crops": crops }))
}

async fn get_handler(
    ApiPath(id): ApiPath<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    // ---
    let crop = state.catalog.get(&id).ok_or(ApiError::CropNotFound)?;
    Ok(Json(json!({ "crop": crop })))
}
