//! Database schema management for `fieldsense-status`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs`.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the database schema if missing (idempotent).
///
/// `fields` holds one row per drawn field, including the advisory
/// `status`/`color` cache. `sensor_readings` keeps every reading pulled from
/// the sensor feed, at most once per field and timestamp.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fields (
            id                 UUID PRIMARY KEY,
            name               TEXT             NOT NULL,
            crop               TEXT             NOT NULL,
            area               DOUBLE PRECISION NOT NULL CHECK (area >= 0.1),
            coordinates        JSONB            NOT NULL,
            moisture           DOUBLE PRECISION NOT NULL DEFAULT 0,
            temperature        DOUBLE PRECISION NOT NULL DEFAULT 20,
            salinity           DOUBLE PRECISION NOT NULL DEFAULT 0,
            sensor_updated_at  TIMESTAMPTZ      NOT NULL DEFAULT now(),
            irrigation_active  BOOLEAN          NOT NULL DEFAULT FALSE,
            total_minutes      INTEGER          NOT NULL DEFAULT 60,
            remaining_minutes  INTEGER          NOT NULL DEFAULT 0,
            flow_rate          DOUBLE PRECISION NOT NULL DEFAULT 2.5,
            last_irrigation    TIMESTAMPTZ,
            last_fertigation   TIMESTAMPTZ,
            status             TEXT             NOT NULL,
            color              TEXT             NOT NULL,
            created_at         TIMESTAMPTZ      NOT NULL DEFAULT now(),
            updated_at         TIMESTAMPTZ      NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            id           BIGSERIAL PRIMARY KEY,
            field_id     UUID             NOT NULL REFERENCES fields (id) ON DELETE CASCADE,
            recorded_at  TIMESTAMPTZ      NOT NULL,
            moisture     DOUBLE PRECISION NOT NULL,
            temperature  DOUBLE PRECISION NOT NULL,
            salinity     DOUBLE PRECISION NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_fields_created_at
            ON fields (created_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sensor_readings_field_time
            ON sensor_readings (field_id, recorded_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
