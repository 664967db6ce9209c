//! Sensor catalog: read noise, conversion gain and dark current per sensor design
//!
//! The catalog is the single source of truth for camera parameters. It is built once,
//! validated as a whole, and only ever handed out by shared reference afterwards.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::dark_current::DarkCurrentCurve;

/// Built-in catalog data, one object per sensor design
const BUILTIN_SENSORS_JSON: &str = include_str!("../data/sensors.json");

static BUILTIN: Lazy<SensorCatalog> = Lazy::new(|| {
    SensorCatalog::from_json(BUILTIN_SENSORS_JSON)
        .expect("built-in sensor catalog failed its integrity check")
});

/// Errors raised by catalog construction and lookups.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Unknown sensor: {0}")]
    SensorNotFound(String),
    #[error("Unknown camera: brand {brand:?}, model {model:?}")]
    CameraNotFound { brand: String, model: String },
    #[error("Sensor {sensor} has no gain preset {label:?}")]
    GainPresetNotFound { sensor: String, label: String },
    #[error("Sensor {sensor} has no dark current entry at {temp_c}°C")]
    TemperatureNotFound { sensor: String, temp_c: i32 },
    #[error("Catalog integrity error: {0}")]
    Integrity(String),
    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
}

/// One selectable gain setting of a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainPreset {
    /// Label shown to the user, unique per sensor (e.g. "Gain 100 (HCG)")
    pub label: String,
    /// Read noise in electrons RMS
    pub read_noise_e: f64,
    /// Conversion gain in electrons per ADU
    pub conversion_gain: f64,
    /// Bias offset in ADU
    pub offset_adu: u32,
    /// Full well capacity in electrons
    pub full_well_e: u32,
}

/// Noise characteristics of one sensor silicon design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSpec {
    /// Sensor identifier (e.g. "IMX571")
    pub id: String,
    /// Digitizer resolution in bits
    pub bit_depth: u8,
    /// Gain presets in declaration order; the first one is the default
    pub gain_presets: Vec<GainPreset>,
    /// Dark current in e-/s/px by cooling temperature
    #[serde(rename = "dark_current_by_temp")]
    pub dark_current: DarkCurrentCurve,
    /// Camera models built around this sensor, by brand
    pub cameras: BTreeMap<String, Vec<String>>,
}

impl SensorSpec {
    /// Look up a gain preset by label
    pub fn gain_preset(&self, label: &str) -> Result<&GainPreset, CatalogError> {
        self.gain_presets
            .iter()
            .find(|preset| preset.label == label)
            .ok_or_else(|| CatalogError::GainPresetNotFound {
                sensor: self.id.clone(),
                label: label.to_string(),
            })
    }

    /// The preset listed first in the catalog
    pub fn default_preset(&self) -> &GainPreset {
        // Non-empty by construction, see `validate`
        &self.gain_presets[0]
    }

    /// Tabulated dark current at a cooling temperature
    pub fn dark_current_at(&self, temp_c: i32) -> Result<f64, CatalogError> {
        self.dark_current
            .at(temp_c)
            .ok_or_else(|| CatalogError::TemperatureNotFound {
                sensor: self.id.clone(),
                temp_c,
            })
    }

    /// Number of camera models using this sensor, across all brands
    pub fn camera_count(&self) -> usize {
        self.cameras.values().map(Vec::len).sum()
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let fail = |what: String| Err(CatalogError::Integrity(format!("{}: {what}", self.id)));

        if self.id.trim().is_empty() {
            return Err(CatalogError::Integrity("sensor with empty id".to_string()));
        }
        if self.bit_depth == 0 || self.bit_depth > 32 {
            return fail(format!("unsupported bit depth {}", self.bit_depth));
        }
        if self.gain_presets.is_empty() {
            return fail("no gain presets".to_string());
        }

        let mut labels = HashSet::new();
        for preset in &self.gain_presets {
            if !labels.insert(preset.label.as_str()) {
                return fail(format!("duplicate gain preset {:?}", preset.label));
            }
            if !(preset.read_noise_e > 0.0) {
                return fail(format!("{:?} read noise must be positive", preset.label));
            }
            if !(preset.conversion_gain > 0.0) {
                return fail(format!("{:?} conversion gain must be positive", preset.label));
            }
            if preset.full_well_e == 0 {
                return fail(format!("{:?} full well must be positive", preset.label));
            }
        }

        if self.dark_current.is_empty() {
            return fail("no dark current entries".to_string());
        }
        if let Some((temp, dc)) = self.dark_current.iter().find(|(_, dc)| !(*dc >= 0.0)) {
            return fail(format!("negative dark current {dc} at {temp}°C"));
        }

        if self.camera_count() == 0 {
            return fail("not referenced by any camera".to_string());
        }
        if self
            .cameras
            .iter()
            .any(|(brand, models)| brand.trim().is_empty() || models.iter().any(|m| m.trim().is_empty()))
        {
            return fail("empty brand or model name".to_string());
        }

        Ok(())
    }
}

/// Immutable table of sensor designs, keyed by sensor id.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorCatalog {
    sensors: BTreeMap<String, SensorSpec>,
}

impl SensorCatalog {
    /// The catalog shipped with the crate, built on first use.
    ///
    /// Panics if the embedded data fails validation: serving a partial catalog
    /// would feed wrong sensor parameters into every calculation.
    pub fn builtin() -> &'static SensorCatalog {
        &BUILTIN
    }

    /// Build and validate a catalog from sensor specs.
    pub fn from_specs(specs: Vec<SensorSpec>) -> Result<Self, CatalogError> {
        let mut sensors = BTreeMap::new();
        for spec in specs {
            spec.validate()?;
            let id = spec.id.clone();
            if sensors.insert(id.clone(), spec).is_some() {
                return Err(CatalogError::Integrity(format!("duplicate sensor id {id}")));
            }
        }

        if sensors.is_empty() {
            return Err(CatalogError::Integrity("catalog has no sensors".to_string()));
        }

        log::debug!("Loaded sensor catalog with {} sensors", sensors.len());
        Ok(Self { sensors })
    }

    /// Parse a catalog from its JSON representation (an array of sensor objects).
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let specs: Vec<SensorSpec> = serde_json::from_str(json)?;
        Self::from_specs(specs)
    }

    /// Load a catalog from a JSON file with the same schema as the built-in data.
    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Look up a sensor by id
    pub fn lookup_sensor(&self, sensor_id: &str) -> Result<&SensorSpec, CatalogError> {
        self.sensors
            .get(sensor_id)
            .ok_or_else(|| CatalogError::SensorNotFound(sensor_id.to_string()))
    }

    /// All sensors ordered by id
    pub fn sensors(&self) -> impl Iterator<Item = &SensorSpec> {
        self.sensors.values()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}
