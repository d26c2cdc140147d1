//! Crop category reference data.
//!
//! A [`CropCatalog`] is loaded once at startup, either from the built-in table
//! in `data/crop_categories.json` or from the file named by
//! `CROP_CATALOG_PATH`, and is shared read-only for the rest of the process.

use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../data/crop_categories.json");

// ---

/// Reasons a catalog is rejected while loading.
#[derive(Debug, Error)]
pub enum CatalogError {
    // ---
    #[error("failed to read crop catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed crop catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("crop category with empty id")]
    EmptyId,

    #[error("duplicate crop category id '{0}'")]
    DuplicateId(String),

    #[error("crop category '{id}': {band} min {min} is greater than max {max}")]
    InvertedBand {
        id: String,
        band: &'static str,
        min: f64,
        max: f64,
    },
}

/// Inclusive `[min, max]` band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub unit: String,
}

impl Band {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Upper limit only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ceiling {
    pub max: f64,
    #[serde(default)]
    pub unit: String,
}

impl Ceiling {
    pub fn allows(&self, value: f64) -> bool {
        value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropThresholds {
    pub temperature: Band,
    pub moisture: Band,
    pub salinity: Ceiling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropCategory {
    // ---
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default)]
    pub description: String,
    pub thresholds: CropThresholds,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Validated, immutable set of crop categories keyed by id.
#[derive(Debug, Clone)]
pub struct CropCatalog {
    categories: Vec<CropCategory>,
    index: HashMap<String, usize>,
}

impl CropCatalog {
    // ---
    /// Build a catalog, rejecting empty or duplicate ids and inverted bands.
    pub fn new(categories: Vec<CropCategory>) -> Result<Self, CatalogError> {
        // ---
        let mut index = HashMap::with_capacity(categories.len());

        for (pos, category) in categories.iter().enumerate() {
            if category.id.trim().is_empty() {
                return Err(CatalogError::EmptyId);
            }
            check_band(&category.id, "temperature", &category.thresholds.temperature)?;
            check_band(&category.id, "moisture", &category.thresholds.moisture)?;

            if index.insert(category.id.clone(), pos).is_some() {
                return Err(CatalogError::DuplicateId(category.id.clone()));
            }
        }

        Ok(Self { categories, index })
    }

    /// The default eight categories shipped with the service.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let categories: Vec<CropCategory> = serde_json::from_str(json)?;
        Self::new(categories)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        // ---
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn get(&self, id: &str) -> Option<&CropCategory> {
        self.index.get(id).map(|&pos| &self.categories[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CropCategory> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

fn check_band(id: &str, band: &'static str, range: &Band) -> Result<(), CatalogError> {
    // ---
    if range.min.is_nan() || range.max.is_nan() || range.min > range.max {
        return Err(CatalogError::InvertedBand {
            id: id.to_string(),
            band,
            min: range.min,
            max: range.max,
        });
    }
    Ok(())
}
