//! Data models for fields, sensor readings and irrigation state.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use thiserror::Error;
use uuid::Uuid;

use crate::crops::CropCatalog;
use crate::status::{self, Color, FieldStatus, ThresholdCheck};

// ---

/// Point-in-time soil measurement. Values are not clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    // ---
    /// Volumetric soil moisture, percent.
    pub moisture: f64,
    pub temperature: f64,
    /// Electrical conductivity, dS/m.
    pub salinity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationState {
    // ---
    pub is_active: bool,
    pub total_minutes: i32,
    pub remaining_minutes: i32,
    /// Litres per minute.
    pub flow_rate: f64,
    pub last_irrigation: Option<DateTime<Utc>>,
    pub last_fertigation: Option<DateTime<Utc>>,
}

impl Default for IrrigationState {
    fn default() -> Self {
        Self {
            is_active: false,
            total_minutes: 60,
            remaining_minutes: 0,
            flow_rate: 2.5,
            last_irrigation: None,
            last_fertigation: None,
        }
    }
}

/// Reading as delivered by the external sensor feed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSensorReading {
    // ---
    pub field_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub moisture: f64,
    pub temperature: f64,
    pub salinity: f64,
}

impl RawSensorReading {
    pub fn reading(&self) -> SensorReading {
        SensorReading {
            moisture: self.moisture,
            temperature: self.temperature,
            salinity: self.salinity,
        }
    }
}

/// Rejected request payload; one message per failed rule.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("validation error: {}", .details.join("; "))]
pub struct ValidationError {
    pub details: Vec<String>,
}

fn finish(details: Vec<String>) -> Result<(), ValidationError> {
    if details.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { details })
    }
}

/// Body of `POST /fields`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewField {
    // ---
    pub name: String,
    pub crop: String,
    /// Hectares.
    pub area: f64,
    /// Polygon vertices as `[lng, lat]`.
    pub coordinates: Vec<[f64; 2]>,
    /// Initial reading; simulated when absent.
    #[serde(default)]
    pub sensor_data: Option<SensorReading>,
}

impl NewField {
    // ---
    pub fn validate(&self) -> Result<(), ValidationError> {
        // ---
        let mut details = Vec::new();

        if self.name.trim().is_empty() {
            details.push("Field name is required".to_string());
        }
        if self.crop.trim().is_empty() {
            details.push("Crop type is required".to_string());
        }
        if self.area < 0.1 {
            details.push("Area must be at least 0.1 hectares".to_string());
        }
        if self.coordinates.len() < 3 {
            details.push("Polygon must have at least 3 points".to_string());
        }
        if let Some(reading) = &self.sensor_data {
            check_moisture(reading.moisture, &mut details);
            check_salinity(reading.salinity, &mut details);
        }

        finish(details)
    }

    /// Build the row to insert. The status cache is filled in here.
    pub fn into_row(self, catalog: &CropCatalog, now: DateTime<Utc>) -> FieldRow {
        // ---
        let reading = self
            .sensor_data
            .unwrap_or_else(|| simulated_reading(&mut rand::thread_rng()));
        let irrigation = IrrigationState::default();

        let mut row = FieldRow {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            crop: self.crop.trim().to_string(),
            area: self.area,
            coordinates: Json(self.coordinates),
            moisture: reading.moisture,
            temperature: reading.temperature,
            salinity: reading.salinity,
            sensor_updated_at: now,
            irrigation_active: irrigation.is_active,
            total_minutes: irrigation.total_minutes,
            remaining_minutes: irrigation.remaining_minutes,
            flow_rate: irrigation.flow_rate,
            last_irrigation: None,
            last_fertigation: None,
            status: String::new(),
            color: String::new(),
            created_at: now,
            updated_at: now,
        };
        row.refresh_status(catalog);
        row
    }
}

/// Stand-in reading for a freshly drawn field with no sensor attached yet.
pub fn simulated_reading<R: Rng>(rng: &mut R) -> SensorReading {
    // ---
    SensorReading {
        moisture: rng.gen_range(50_i32..80) as f64,
        temperature: rng.gen_range(20_i32..30) as f64,
        salinity: rng.gen_range(0.5..2.0),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SensorPatch {
    pub moisture: Option<f64>,
    pub temperature: Option<f64>,
    pub salinity: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IrrigationPatch {
    pub is_active: Option<bool>,
    pub total_minutes: Option<i32>,
    pub remaining_minutes: Option<i32>,
    pub flow_rate: Option<f64>,
}

/// Body of `PATCH /fields/{id}`. Absent members are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldUpdate {
    // ---
    pub name: Option<String>,
    pub crop: Option<String>,
    pub sensor_data: Option<SensorPatch>,
    pub irrigation: Option<IrrigationPatch>,
}

impl FieldUpdate {
    // ---
    pub fn validate(&self) -> Result<(), ValidationError> {
        // ---
        let mut details = Vec::new();

        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            details.push("Field name must not be empty".to_string());
        }
        if self.crop.as_deref().is_some_and(|c| c.trim().is_empty()) {
            details.push("Crop type must not be empty".to_string());
        }
        if let Some(sensor) = &self.sensor_data {
            if let Some(moisture) = sensor.moisture {
                check_moisture(moisture, &mut details);
            }
            if let Some(salinity) = sensor.salinity {
                check_salinity(salinity, &mut details);
            }
        }
        if let Some(irrigation) = &self.irrigation {
            if irrigation.total_minutes.is_some_and(|v| v < 0) {
                details.push("Total minutes must not be negative".to_string());
            }
            if irrigation.remaining_minutes.is_some_and(|v| v < 0) {
                details.push("Remaining minutes must not be negative".to_string());
            }
            if irrigation.flow_rate.is_some_and(|v| v < 0.0) {
                details.push("Flow rate must not be negative".to_string());
            }
        }

        finish(details)
    }
}

fn check_moisture(moisture: f64, details: &mut Vec<String>) {
    if !(0.0..=100.0).contains(&moisture) {
        details.push("Moisture must be between 0 and 100".to_string());
    }
}

fn check_salinity(salinity: f64, details: &mut Vec<String>) {
    if salinity < 0.0 {
        details.push("Salinity must not be negative".to_string());
    }
}

/// One row of the `fields` table.
///
/// `status` and `color` are a cache of the last classification written with
/// the row. Readers must not trust them; see [`FieldRow::into_view`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FieldRow {
    // ---
    pub id: Uuid,
    pub name: String,
    pub crop: String,
    pub area: f64,
    pub coordinates: Json<Vec<[f64; 2]>>,
    pub moisture: f64,
    pub temperature: f64,
    pub salinity: f64,
    pub sensor_updated_at: DateTime<Utc>,
    pub irrigation_active: bool,
    pub total_minutes: i32,
    pub remaining_minutes: i32,
    pub flow_rate: f64,
    pub last_irrigation: Option<DateTime<Utc>>,
    pub last_fertigation: Option<DateTime<Utc>>,
    pub status: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FieldRow {
    // ---
    pub fn reading(&self) -> SensorReading {
        SensorReading {
            moisture: self.moisture,
            temperature: self.temperature,
            salinity: self.salinity,
        }
    }

    pub fn irrigation(&self) -> IrrigationState {
        IrrigationState {
            is_active: self.irrigation_active,
            total_minutes: self.total_minutes,
            remaining_minutes: self.remaining_minutes,
            flow_rate: self.flow_rate,
            last_irrigation: self.last_irrigation,
            last_fertigation: self.last_fertigation,
        }
    }

    pub fn classify(&self, catalog: &CropCatalog) -> FieldStatus {
        status::classify(catalog, &self.crop, &self.reading(), self.irrigation_active)
    }

    /// Recompute the cached status and color from the current inputs.
    pub fn refresh_status(&mut self, catalog: &CropCatalog) -> FieldStatus {
        // ---
        let fresh = self.classify(catalog);
        self.status = fresh.as_str().to_string();
        self.color = status::color_for(fresh).as_str().to_string();
        fresh
    }

    pub fn apply_update(&mut self, update: &FieldUpdate, now: DateTime<Utc>) {
        // ---
        if let Some(name) = &update.name {
            self.name = name.trim().to_string();
        }
        if let Some(crop) = &update.crop {
            self.crop = crop.trim().to_string();
        }
        if let Some(sensor) = &update.sensor_data {
            self.moisture = sensor.moisture.unwrap_or(self.moisture);
            self.temperature = sensor.temperature.unwrap_or(self.temperature);
            self.salinity = sensor.salinity.unwrap_or(self.salinity);
            self.sensor_updated_at = now;
        }
        if let Some(irrigation) = &update.irrigation {
            if irrigation.is_active == Some(true) && !self.irrigation_active {
                self.last_irrigation = Some(now);
            }
            self.irrigation_active = irrigation.is_active.unwrap_or(self.irrigation_active);
            self.total_minutes = irrigation.total_minutes.unwrap_or(self.total_minutes);
            self.remaining_minutes = irrigation.remaining_minutes.unwrap_or(self.remaining_minutes);
            self.flow_rate = irrigation.flow_rate.unwrap_or(self.flow_rate);
        }
        self.updated_at = now;
    }

    /// Replace the stored reading with one from the sensor feed.
    ///
    /// Readings taken at or before the stored one are ignored and `false` is
    /// returned, so replaying the feed never rolls a field back.
    pub fn apply_reading(&mut self, raw: &RawSensorReading, now: DateTime<Utc>) -> bool {
        // ---
        if raw.timestamp <= self.sensor_updated_at {
            return false;
        }
        let reading = raw.reading();
        self.moisture = reading.moisture;
        self.temperature = reading.temperature;
        self.salinity = reading.salinity;
        self.sensor_updated_at = raw.timestamp;
        self.updated_at = now;
        true
    }

    /// Response shape, with status and color classified afresh.
    pub fn into_view(self, catalog: &CropCatalog) -> FieldView {
        // ---
        let fresh = self.classify(catalog);
        match self.status.parse::<FieldStatus>() {
            Ok(cached) if cached != fresh => tracing::debug!(
                "Field {} cached status {} is stale, now {}",
                self.id,
                cached,
                fresh
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!("Field {} has unreadable status cache: {}", self.id, e),
        }

        let reading = self.reading();
        let checks = catalog
            .get(&self.crop)
            .map(|c| status::check(&c.thresholds, &reading));

        FieldView {
            id: self.id,
            irrigation: self.irrigation(),
            name: self.name,
            crop: self.crop,
            area: self.area,
            coordinates: self.coordinates.0,
            sensor_data: SensorSnapshot {
                reading,
                last_updated: self.sensor_updated_at,
            },
            status: fresh,
            color: status::color_for(fresh),
            checks,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SensorSnapshot {
    #[serde(flatten)]
    pub reading: SensorReading,
    pub last_updated: DateTime<Utc>,
}

/// Field as returned by the API.
#[derive(Debug, Serialize)]
pub struct FieldView {
    // ---
    pub id: Uuid,
    pub name: String,
    pub crop: String,
    pub area: f64,
    pub coordinates: Vec<[f64; 2]>,
    pub sensor_data: SensorSnapshot,
    pub irrigation: IrrigationState,
    pub status: FieldStatus,
    pub color: Color,
    /// `None` when the crop is not in the catalog.
    pub checks: Option<ThresholdCheck>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
