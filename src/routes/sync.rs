//! Sensor feed synchronisation: `POST /fields/sync`.
//!
//! Pulls the configured feed page by page, records every reading in
//! `sensor_readings` and applies it to its field, reclassifying as it goes.
//! The feed is replayed from the start on every sync: readings already stored
//! are not inserted twice, and readings older than a field's current one are
//! not applied.

use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgConnection;
use tracing::{debug, info};

use super::fields::{fetch_for_update, log_transition, save_field, Snapshot};
use super::{ApiError, AppState};
use crate::{CropCatalog, FieldRow, RawSensorReading};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/fields/sync", post(handler))
}

#[derive(Debug, Default, Serialize)]
pub struct SyncSummary {
    /// Readings parsed from the feed.
    pub fetched: usize,
    /// Readings applied to an existing field.
    pub applied: usize,
    /// Unparseable items, readings for unknown fields, and readings no newer
    /// than the field's current one.
    pub skipped: usize,
}

/// What happened to one feed reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadingOutcome {
    UnknownField,
    Stale,
    Applied { before: Snapshot, after: Snapshot },
}

impl SyncSummary {
    fn record(&mut self, outcome: ReadingOutcome) {
        match outcome {
            ReadingOutcome::Applied { .. } => self.applied += 1,
            ReadingOutcome::UnknownField | ReadingOutcome::Stale => self.skipped += 1,
        }
    }
}

/// Apply a feed reading to its field and refresh the status cache.
/// The row is left untouched when the reading is stale.
fn apply_feed_reading(
    catalog: &CropCatalog,
    row: &mut FieldRow,
    raw: &RawSensorReading,
    now: DateTime<Utc>,
) -> ReadingOutcome {
    // ---
    let before = Snapshot::of(catalog, row);
    if !row.apply_reading(raw, now) {
        return ReadingOutcome::Stale;
    }
    row.refresh_status(catalog);
    ReadingOutcome::Applied {
        before,
        after: Snapshot::of(catalog, row),
    }
}

async fn handler(State(state): State<AppState>) -> Result<Json<SyncSummary>, ApiError> {
    // ---
    info!("POST /fields/sync - Starting sync");

    let api_url = state
        .config
        .sensor_api_url
        .as_deref()
        .ok_or(ApiError::FeedNotConfigured)?;

    let timeout = Duration::from_secs(u64::from(state.config.api_timeout_secs));
    let (readings, unparsed) =
        fetch_sensor_data(api_url, state.config.api_max_pages, timeout).await?;

    let mut summary = SyncSummary {
        fetched: readings.len(),
        skipped: unparsed,
        ..Default::default()
    };

    for raw in &readings {
        let mut tx = state.pool.begin().await?;

        let Some(mut row) = fetch_for_update(&mut tx, raw.field_id).await? else {
            debug!("Reading for unknown field {}, skipping", raw.field_id);
            summary.record(ReadingOutcome::UnknownField);
            continue;
        };

        store_sensor_reading(&mut tx, raw).await?;

        let outcome = apply_feed_reading(&state.catalog, &mut row, raw, Utc::now());
        match outcome {
            ReadingOutcome::Applied { before, after } => {
                save_field(&mut tx, &row).await?;
                tx.commit().await?;
                log_transition(&row, before, after);
            }
            _ => {
                debug!(
                    "Reading for field {} at {} is not newer than {}, not applied",
                    raw.field_id, raw.timestamp, row.sensor_updated_at
                );
                tx.commit().await?;
            }
        }
        summary.record(outcome);
    }

    info!(
        "Sync complete: fetched {}, applied {}, skipped {}",
        summary.fetched, summary.applied, summary.skipped
    );
    Ok(Json(summary))
}

// ---

/// Fetch paginated readings from the sensor feed.
///
/// Pages look like `{"results": [...], "next_cursor": "..."}`; the loop stops
/// when `next_cursor` is absent or after `max_pages` pages. Returns the parsed
/// readings and the number of items that failed to parse. Each request is
/// bounded by `timeout`.
async fn fetch_sensor_data(
    base_url: &str,
    max_pages: u32,
    timeout: Duration,
) -> Result<(Vec<RawSensorReading>, usize), reqwest::Error> {
    // ---
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let mut all_data = Vec::new();
    let mut unparsed = 0;
    let mut cursor: Option<String> = None;
    let mut page_count = 0;

    loop {
        if page_count >= max_pages {
            debug!(
                "Hit page limit of {}, stopping pagination. Fetched {} records so far.",
                max_pages,
                all_data.len()
            );
            break;
        }
        page_count += 1;

        let mut request = client.get(base_url);
        if let Some(cursor) = &cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        debug!("Fetching page {} from: {}", page_count, base_url);

        let response: serde_json::Value = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let (page, failed) = parse_page(&response);
        debug!(
            "Page {}: {} readings, {} unparseable",
            page_count,
            page.len(),
            failed
        );
        all_data.extend(page);
        unparsed += failed;

        cursor = next_cursor(&response);
        if cursor.is_none() {
            break;
        }
    }

    info!(
        "Finished fetching {} total records from {} pages",
        all_data.len(),
        page_count
    );
    Ok((all_data, unparsed))
}

/// Split a page into parsed readings and a count of rejected items.
fn parse_page(response: &serde_json::Value) -> (Vec<RawSensorReading>, usize) {
    // ---
    let Some(items) = response.get("results").and_then(|d| d.as_array()) else {
        debug!("Page response missing 'results' field or not an array");
        return (Vec::new(), 0);
    };

    let mut readings = Vec::with_capacity(items.len());
    let mut failed = 0;
    for (i, item) in items.iter().enumerate() {
        match serde_json::from_value::<RawSensorReading>(item.clone()) {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                debug!("Failed to parse item {}: {} - Raw item: {}", i, e, item);
                failed += 1;
            }
        }
    }
    (readings, failed)
}

fn next_cursor(response: &serde_json::Value) -> Option<String> {
    response
        .get("next_cursor")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(String::from)
}

async fn store_sensor_reading(
    conn: &mut PgConnection,
    reading: &RawSensorReading,
) -> Result<(), sqlx::Error> {
    // ---
    sqlx::query(
        r#"
        INSERT INTO sensor_readings (
            field_id, recorded_at, moisture, temperature, salinity
        ) VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (field_id, recorded_at) DO NOTHING
        "#,
    )
    .bind(reading.field_id)
    .bind(reading.timestamp)
    .bind(reading.moisture)
    .bind(reading.temperature)
    .bind(reading.salinity)
    .execute(conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::crops::tests::test_catalog;
    use crate::status::FieldStatus;
    use crate::{NewField, SensorReading};
    use chrono::TimeZone;
    use serde_json::json;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
    }

    fn create_test_row(moisture: f64) -> FieldRow {
        // ---
        NewField {
            name: "East plot".to_string(),
            crop: "orchard".to_string(),
            area: 3.0,
            coordinates: vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
            sensor_data: Some(SensorReading {
                moisture,
                temperature: 22.0,
                salinity: 1.0,
            }),
        }
        .into_row(&test_catalog(), at(8))
    }

    fn feed_reading(row: &FieldRow, hour: u32, moisture: f64) -> RawSensorReading {
        RawSensorReading {
            field_id: row.id,
            timestamp: at(hour),
            moisture,
            temperature: 22.0,
            salinity: 1.0,
        }
    }

    #[test]
    fn test_apply_refreshes_status_cache() {
        // ---
        let catalog = test_catalog();
        let mut row = create_test_row(70.0);

        let reading = feed_reading(&row, 10, 40.0);
        let outcome = apply_feed_reading(&catalog, &mut row, &reading, at(10));

        let ReadingOutcome::Applied { before, after } = outcome else {
            panic!("expected the reading to be applied, got {outcome:?}");
        };
        assert_eq!(before.status, FieldStatus::Normal);
        assert_eq!(after.status, FieldStatus::NeedsIrrigation);
        assert!(after.dry);
        assert_eq!(row.status, "needs_irrigation");
        assert_eq!(row.color, "#ef4444");
    }

    #[test]
    fn test_older_reading_is_skipped() {
        // ---
        let catalog = test_catalog();
        let mut row = create_test_row(70.0);

        let newer = feed_reading(&row, 10, 70.0);
        let older = feed_reading(&row, 9, 40.0);
        assert!(matches!(
            apply_feed_reading(&catalog, &mut row, &newer, at(11)),
            ReadingOutcome::Applied { .. }
        ));
        assert_eq!(
            apply_feed_reading(&catalog, &mut row, &older, at(11)),
            ReadingOutcome::Stale
        );

        assert_eq!(row.sensor_updated_at, at(10));
        assert_eq!(row.moisture, 70.0);
        assert_eq!(row.status, "normal");
    }

    #[test]
    fn test_replayed_feed_is_skipped() {
        // ---
        let catalog = test_catalog();
        let mut row = create_test_row(70.0);
        let reading = feed_reading(&row, 10, 65.0);

        assert!(matches!(
            apply_feed_reading(&catalog, &mut row, &reading, at(10)),
            ReadingOutcome::Applied { .. }
        ));
        assert_eq!(
            apply_feed_reading(&catalog, &mut row, &reading, at(12)),
            ReadingOutcome::Stale
        );
        assert_eq!(row.updated_at, at(10));
    }

    #[test]
    fn test_summary_counts() {
        // ---
        let catalog = test_catalog();
        let mut row = create_test_row(70.0);
        let mut summary = SyncSummary {
            fetched: 4,
            skipped: 1,
            ..Default::default()
        };

        let newer = feed_reading(&row, 10, 70.0);
        let older = feed_reading(&row, 9, 70.0);
        summary.record(ReadingOutcome::UnknownField);
        summary.record(apply_feed_reading(&catalog, &mut row, &newer, at(10)));
        summary.record(apply_feed_reading(&catalog, &mut row, &older, at(10)));

        assert_eq!(summary.applied, 1);
        assert_eq!(summary.skipped, 3);
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({ "fetched": 4, "applied": 1, "skipped": 3 })
        );
    }

    #[tokio::test]
    async fn test_unresponsive_feed_times_out() {
        // ---
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // accept connections and never answer
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let started = std::time::Instant::now();
        let url = format!("http://{addr}/readings");
        let err = fetch_sensor_data(&url, 5, Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(err.is_timeout(), "unexpected error: {err}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_parse_page_counts_bad_items() {
        // ---
        let page = json!({
            "results": [
                {
                    "field_id": "6f1c2a8e-3d4b-4c5a-9e7f-0a1b2c3d4e5f",
                    "timestamp": "2025-06-01T08:00:00Z",
                    "moisture": 55.0,
                    "temperature": 24.5,
                    "salinity": 1.2
                },
                { "field_id": "not-a-uuid", "timestamp": "2025-06-01T08:00:00Z" },
                { "moisture": 40 }
            ],
            "next_cursor": "abc"
        });

        let (readings, failed) = parse_page(&page);
        assert_eq!(readings.len(), 1);
        assert_eq!(failed, 2);
        assert_eq!(readings[0].moisture, 55.0);
        assert_eq!(next_cursor(&page).as_deref(), Some("abc"));
    }

    #[test]
    fn test_page_without_results() {
        // ---
        let page = json!({ "detail": "rate limited" });
        let (readings, failed) = parse_page(&page);
        assert!(readings.is_empty());
        assert_eq!(failed, 0);
        assert!(next_cursor(&page).is_none());
    }

    #[test]
    fn test_last_page_cursor() {
        // ---
        assert!(next_cursor(&json!({ "results": [], "next_cursor": null })).is_none());
        assert!(next_cursor(&json!({ "results": [], "next_cursor": "" })).is_none());
    }
}
