//! Field CRUD endpoints.
//!
//! The `status`/`color` columns are only a cache: every response is
//! classified again from the stored reading, and every write stores the
//! freshly computed value.

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath};
use super::{ApiError, AppState};
use crate::status::{self, FieldStatus};
use crate::{CropCatalog, FieldRow, FieldUpdate, NewField};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/fields", get(list_handler).post(create_handler))
        .route(
            "/fields/{id}",
            get(get_handler).patch(update_handler).delete(delete_handler),
        )
}

async fn list_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    // ---
    let rows = sqlx::query_as::<_, FieldRow>("SELECT * FROM fields ORDER BY created_at DESC")
        .fetch_all(&state.pool)
        .await?;

    debug!("GET /fields - {} fields", rows.len());

    let fields: Vec<_> = rows
        .into_iter()
        .map(|row| row.into_view(&state.catalog))
        .collect();
    Ok(Json(json!({ "fields": fields })))
}

async fn create_handler(
    State(state): State<AppState>,
    ApiJson(new_field): ApiJson<NewField>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    // ---
    new_field.validate()?;

    if state.catalog.get(new_field.crop.trim()).is_none() {
        warn!(
            "Field '{}' uses unknown crop '{}'; it will always classify as normal",
            new_field.name, new_field.crop
        );
    }

    let row = new_field.into_row(&state.catalog, Utc::now());
    insert_field(&state.pool, &row).await?;

    info!("Created field {} ({}) with status {}", row.id, row.name, row.status);
    if Snapshot::of(&state.catalog, &row).dry {
        warn_low_moisture(&row);
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Field created successfully",
            "field": row.into_view(&state.catalog),
        })),
    ))
}

async fn get_handler(
    ApiPath(id): ApiPath<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    // ---
    let row = sqlx::query_as::<_, FieldRow>("SELECT * FROM fields WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::FieldNotFound)?;

    Ok(Json(json!({ "field": row.into_view(&state.catalog) })))
}

async fn update_handler(
    ApiPath(id): ApiPath<Uuid>,
    State(state): State<AppState>,
    ApiJson(update): ApiJson<FieldUpdate>,
) -> Result<Json<Value>, ApiError> {
    // ---
    update.validate()?;

    let mut tx = state.pool.begin().await?;

    let mut row = fetch_for_update(&mut tx, id)
        .await?
        .ok_or(ApiError::FieldNotFound)?;

    let before = Snapshot::of(&state.catalog, &row);
    row.apply_update(&update, Utc::now());
    row.refresh_status(&state.catalog);
    let after = Snapshot::of(&state.catalog, &row);

    save_field(&mut tx, &row).await?;
    tx.commit().await?;

    log_transition(&row, before, after);

    Ok(Json(json!({
        "message": "Field updated successfully",
        "field": row.into_view(&state.catalog),
    })))
}

async fn delete_handler(
    ApiPath(id): ApiPath<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    // ---
    let deleted = sqlx::query_scalar::<_, Uuid>("DELETE FROM fields WHERE id = $1 RETURNING id")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;

    if deleted.is_none() {
        return Err(ApiError::FieldNotFound);
    }

    info!("Deleted field {}", id);
    Ok(Json(json!({ "message": "Field deleted successfully" })))
}

// ---

async fn insert_field(pool: &PgPool, row: &FieldRow) -> Result<(), sqlx::Error> {
    // ---
    sqlx::query(
        r#"
        INSERT INTO fields (
            id, name, crop, area, coordinates,
            moisture, temperature, salinity, sensor_updated_at,
            irrigation_active, total_minutes, remaining_minutes, flow_rate,
            last_irrigation, last_fertigation,
            status, color, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                  $11, $12, $13, $14, $15, $16, $17, $18, $19)
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(&row.crop)
    .bind(row.area)
    .bind(&row.coordinates)
    .bind(row.moisture)
    .bind(row.temperature)
    .bind(row.salinity)
    .bind(row.sensor_updated_at)
    .bind(row.irrigation_active)
    .bind(row.total_minutes)
    .bind(row.remaining_minutes)
    .bind(row.flow_rate)
    .bind(row.last_irrigation)
    .bind(row.last_fertigation)
    .bind(&row.status)
    .bind(&row.color)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a field and lock its row until the surrounding transaction ends.
pub(super) async fn fetch_for_update(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<FieldRow>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, FieldRow>("SELECT * FROM fields WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await
}

/// Write back every mutable column of a field, including the status cache.
pub(super) async fn save_field(conn: &mut PgConnection, row: &FieldRow) -> Result<(), sqlx::Error> {
    // ---
    sqlx::query(
        r#"
        UPDATE fields SET
            name = $2,
            crop = $3,
            moisture = $4,
            temperature = $5,
            salinity = $6,
            sensor_updated_at = $7,
            irrigation_active = $8,
            total_minutes = $9,
            remaining_minutes = $10,
            flow_rate = $11,
            last_irrigation = $12,
            status = $13,
            color = $14,
            updated_at = $15
        WHERE id = $1
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(&row.crop)
    .bind(row.moisture)
    .bind(row.temperature)
    .bind(row.salinity)
    .bind(row.sensor_updated_at)
    .bind(row.irrigation_active)
    .bind(row.total_minutes)
    .bind(row.remaining_minutes)
    .bind(row.flow_rate)
    .bind(row.last_irrigation)
    .bind(&row.status)
    .bind(&row.color)
    .bind(row.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Classification and soil dryness of a field at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Snapshot {
    pub status: FieldStatus,
    /// Moisture below the crop minimum.
    pub dry: bool,
}

impl Snapshot {
    pub(super) fn of(catalog: &CropCatalog, row: &FieldRow) -> Self {
        Self {
            status: row.classify(catalog),
            dry: status::is_dry(catalog, &row.crop, &row.reading()),
        }
    }
}

/// Warn once, when a write takes the soil from wet enough to too dry.
/// Status changes for other reasons (temperature, salinity) do not count.
pub(super) fn should_warn_low_moisture(before: Snapshot, after: Snapshot) -> bool {
    !before.dry && after.dry
}

pub(super) fn log_transition(row: &FieldRow, before: Snapshot, after: Snapshot) {
    // ---
    if before.status != after.status {
        info!("Field {} status {} -> {}", row.id, before.status, after.status);
    }
    if should_warn_low_moisture(before, after) {
        warn_low_moisture(row);
    }
}

fn warn_low_moisture(row: &FieldRow) {
    warn!(
        field_id = %row.id,
        moisture = row.moisture,
        "Low moisture: field '{}' needs irrigation",
        row.name
    );
}
