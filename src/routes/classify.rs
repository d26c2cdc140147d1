//! Stateless classification endpoints.
//!
//! `POST /status/classify` runs the threshold classifier against the loaded
//! catalog without touching the database; `GET /status/colors` serves the map
//! legend.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::extract::{ApiJson, ApiPath};
use super::{ApiError, AppState};
use crate::status::{self, Color, FieldStatus, ThresholdCheck};
use crate::{CropCatalog, SensorReading};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/status/classify", post(classify_handler))
        .route("/status/colors", get(legend_handler))
        .route("/status/colors/{status}", get(color_handler))
}

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub crop: String,
    pub reading: SensorReading,
    #[serde(default)]
    pub is_irrigating: bool,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub status: FieldStatus,
    pub color: Color,
    /// `None` when the crop is not in the catalog.
    pub checks: Option<ThresholdCheck>,
}

#[derive(Debug, Serialize)]
struct LegendEntry {
    status: FieldStatus,
    color: Color,
}

fn evaluate(catalog: &CropCatalog, request: &ClassifyRequest) -> ClassifyResponse {
    // ---
    let status = status::classify(
        catalog,
        &request.crop,
        &request.reading,
        request.is_irrigating,
    );
    let checks = catalog
        .get(&request.crop)
        .map(|c| status::check(&c.thresholds, &request.reading));

    ClassifyResponse {
        status,
        color: status::color_for(status),
        checks,
    }
}

async fn classify_handler(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ClassifyRequest>,
) -> Json<ClassifyResponse> {
    // ---
    let response = evaluate(&state.catalog, &request);
    debug!(
        "POST /status/classify crop={} -> {}",
        request.crop, response.status
    );
    Json(response)
}

async fn legend_handler() -> Json<Vec<LegendEntry>> {
    // ---
    Json(
        FieldStatus::ALL
            .into_iter()
            .map(|status| LegendEntry {
                status,
                color: status::color_for(status),
            })
            .collect(),
    )
}

async fn color_handler(ApiPath(tag): ApiPath<String>) -> Result<Json<Value>, ApiError> {
    // ---
    let color = status::color_for_tag(&tag)?;
    Ok(Json(json!({ "status": tag, "color": color })))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::crops::tests::test_catalog;

    fn request(crop: &str, moisture: f64, is_irrigating: bool) -> ClassifyRequest {
        ClassifyRequest {
            crop: crop.to_string(),
            reading: SensorReading {
                moisture,
                temperature: 22.0,
                salinity: 1.0,
            },
            is_irrigating,
        }
    }

    #[test]
    fn test_evaluate_known_crop() {
        // ---
        let response = evaluate(&test_catalog(), &request("orchard", 50.0, false));
        assert_eq!(response.status, FieldStatus::NeedsIrrigation);
        assert_eq!(response.color, Color::RED);

        let checks = response.checks.unwrap();
        assert!(!checks.moisture_ok);
        assert!(checks.temperature_ok && checks.salinity_ok);
    }

    #[test]
    fn test_evaluate_irrigating_and_unknown() {
        // ---
        let catalog = test_catalog();

        let irrigating = evaluate(&catalog, &request("orchard", 50.0, true));
        assert_eq!(irrigating.status, FieldStatus::Irrigating);
        assert_eq!(irrigating.color, Color::ORANGE);

        let unknown = evaluate(&catalog, &request("kelp", 50.0, false));
        assert_eq!(unknown.status, FieldStatus::Normal);
        assert!(unknown.checks.is_none());
    }

    #[test]
    fn test_request_defaults_to_not_irrigating() {
        // ---
        let request: ClassifyRequest = serde_json::from_str(
            r#"{"crop":"fruits","reading":{"moisture":70,"temperature":22,"salinity":1.0}}"#,
        )
        .unwrap();
        assert!(!request.is_irrigating);
    }

    #[test]
    fn test_request_requires_every_reading_member() {
        // ---
        let result = serde_json::from_str::<ClassifyRequest>(
            r#"{"crop":"fruits","reading":{"moisture":70,"temperature":22}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_response_json() {
        // ---
        let response = evaluate(&test_catalog(), &request("orchard", 70.0, false));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "normal");
        assert_eq!(json["color"], "#22c55e");
        assert_eq!(json["checks"]["salinity_ok"], true);
    }
}
