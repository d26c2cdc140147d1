//! Field status evaluation.
//!
//! Maps a sensor reading, the crop category's thresholds and the irrigation
//! flag to a [`FieldStatus`], and a status to its map color. Everything here
//! is pure: no I/O, no shared state, identical inputs give identical outputs.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crops::{CropCatalog, CropThresholds};
use crate::SensorReading;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    NeedsIrrigation,
    Normal,
    Irrigating,
}

impl FieldStatus {
    pub const ALL: [FieldStatus; 3] = [
        FieldStatus::NeedsIrrigation,
        FieldStatus::Normal,
        FieldStatus::Irrigating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldStatus::NeedsIrrigation => "needs_irrigation",
            FieldStatus::Normal => "normal",
            FieldStatus::Irrigating => "irrigating",
        }
    }
}

impl fmt::Display for FieldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status tag that is none of the three known statuses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown field status '{0}'")]
pub struct UnknownStatusError(pub String);

impl FromStr for FieldStatus {
    type Err = UnknownStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        FieldStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatusError(s.to_string()))
    }
}

/// `#rrggbb` display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Color(&'static str);

impl Color {
    pub const RED: Color = Color("#ef4444");
    pub const GREEN: Color = Color("#22c55e");
    pub const ORANGE: Color = Color("#f97316");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Which threshold bands a reading satisfies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdCheck {
    pub temperature_ok: bool,
    pub moisture_ok: bool,
    pub salinity_ok: bool,
}

impl ThresholdCheck {
    pub fn all_ok(&self) -> bool {
        self.temperature_ok && self.moisture_ok && self.salinity_ok
    }
}

pub fn check(thresholds: &CropThresholds, reading: &SensorReading) -> ThresholdCheck {
    // ---
    ThresholdCheck {
        temperature_ok: thresholds.temperature.contains(reading.temperature),
        moisture_ok: thresholds.moisture.contains(reading.moisture),
        salinity_ok: thresholds.salinity.allows(reading.salinity),
    }
}

/// Classify a field.
///
/// Precedence, first match wins:
/// 1. irrigation running → `Irrigating`
/// 2. unknown crop id → `Normal`
/// 3. moisture below the crop minimum → `NeedsIrrigation`
/// 4. salinity above max, or temperature outside its band → `NeedsIrrigation`
/// 5. every band satisfied → `Normal`
/// 6. moisture outside its band (i.e. above max) → `NeedsIrrigation`
/// 7. otherwise `Normal`
///
/// Never fails: out-of-range and NaN readings still produce a status.
pub fn classify(
    catalog: &CropCatalog,
    crop_id: &str,
    reading: &SensorReading,
    is_irrigating: bool,
) -> FieldStatus {
    // ---
    if is_irrigating {
        return FieldStatus::Irrigating;
    }

    let Some(category) = catalog.get(crop_id) else {
        return FieldStatus::Normal;
    };

    let thresholds = &category.thresholds;
    let checks = check(thresholds, reading);

    if reading.moisture < thresholds.moisture.min {
        return FieldStatus::NeedsIrrigation;
    }

    if !checks.salinity_ok || !checks.temperature_ok {
        return FieldStatus::NeedsIrrigation;
    }

    if checks.all_ok() {
        return FieldStatus::Normal;
    }

    if !checks.moisture_ok {
        return FieldStatus::NeedsIrrigation;
    }

    FieldStatus::Normal
}

pub fn color_for(status: FieldStatus) -> Color {
    match status {
        FieldStatus::NeedsIrrigation => Color::RED,
        FieldStatus::Normal => Color::GREEN,
        FieldStatus::Irrigating => Color::ORANGE,
    }
}

/// Color lookup for a status that arrives as text (a cached column, a
/// request body). Unknown tags are an error, never a default color.
pub fn color_for_tag(tag: &str) -> Result<Color, UnknownStatusError> {
    tag.parse::<FieldStatus>().map(color_for)
}

/// True when the reading is below the crop's moisture minimum.
pub fn is_dry(catalog: &CropCatalog, crop_id: &str, reading: &SensorReading) -> bool {
    catalog
        .get(crop_id)
        .is_some_and(|c| reading.moisture < c.thresholds.moisture.min)
}
