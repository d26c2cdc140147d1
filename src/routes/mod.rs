use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;

use crate::{Config, CropCatalog};

mod classify;
mod crops;
mod error;
mod extract;
mod fields;
mod health;
mod sync;

pub use error::ApiError;

// ---

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub catalog: Arc<CropCatalog>,
}

pub fn router(pool: PgPool, config: Config, catalog: Arc<CropCatalog>) -> Router {
    // ---
    Router::new()
        .merge(fields::router())
        .merge(sync::router())
        .merge(classify::router())
        .merge(crops::router())
        .merge(health::router())
        .with_state(AppState {
            pool,
            config,
            catalog,
        })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::crops::tests::test_catalog;
    use reqwest::StatusCode;
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;

    /// Serve the router on an ephemeral port. The pool never connects, so
    /// only requests answered before touching the database succeed.
    async fn spawn_app() -> String {
        // ---
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://fieldsense@127.0.0.1:1/fieldsense")
            .unwrap();
        let config = Config {
            db_url: "postgres://fieldsense@127.0.0.1:1/fieldsense".to_string(),
            db_pool_max: 1,
            listen_port: 0,
            crop_catalog_path: None,
            sensor_api_url: None,
            api_max_pages: 1,
            api_timeout_secs: 1,
        };
        let app = router(pool, config, Arc::new(test_catalog()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn json_error(response: reqwest::Response) -> Value {
        // ---
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(
            content_type.starts_with("application/json"),
            "content type {content_type}"
        );
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string(), "body {body}");
        body
    }

    #[tokio::test]
    async fn test_classify_missing_field_is_json() {
        // ---
        let base = spawn_app().await;
        let response = reqwest::Client::new()
            .post(format!("{base}/status/classify"))
            .json(&json!({"crop": "orchard", "reading": {"temperature": 22, "moisture": 70}}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        json_error(response).await;
    }

    #[tokio::test]
    async fn test_malformed_body_is_json() {
        // ---
        let base = spawn_app().await;
        let response = reqwest::Client::new()
            .post(format!("{base}/status/classify"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{\"crop\": ")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        json_error(response).await;
    }

    #[tokio::test]
    async fn test_bad_field_id_is_json() {
        // ---
        let base = spawn_app().await;
        let response = reqwest::get(format!("{base}/fields/not-a-uuid"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        json_error(response).await;
    }

    #[tokio::test]
    async fn test_sync_without_feed_is_unavailable() {
        // ---
        let base = spawn_app().await;
        let response = reqwest::Client::new()
            .post(format!("{base}/fields/sync"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_error(response).await;
        assert_eq!(body, json!({"error": "Sensor feed is not configured"}));
    }

    #[tokio::test]
    async fn test_classify_and_health() {
        // ---
        let base = spawn_app().await;
        let classified: Value = reqwest::Client::new()
            .post(format!("{base}/status/classify"))
            .json(&json!({
                "crop": "orchard",
                "reading": {"temperature": 22, "moisture": 70, "salinity": 1.0}
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(classified["status"], "normal");
        assert_eq!(classified["color"], "#22c55e");

        let health: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health, json!({"status": "ok", "crop_categories": 1}));
    }
}
