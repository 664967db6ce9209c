//! Brand → model index over the sensor catalog
//!
//! Every catalog sensor lists the cameras built around it. The index flattens those
//! lists into `brand → display key → sensor` so a camera can be picked by name.
//! Display keys have the form `"{model}  [{sensor id}]"` and are unique across the index.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use super::dark_current::DarkCurrentCurve;
use super::sensor::{CatalogError, GainPreset, SensorCatalog, SensorSpec};

static BUILTIN: Lazy<CameraIndex<'static>> = Lazy::new(|| {
    CameraIndex::build(SensorCatalog::builtin())
        .expect("built-in camera index failed its integrity check")
});

/// A purchasable camera model and the sensor it uses.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraEntry<'a> {
    pub brand: String,
    pub model: String,
    /// Display key, `"{model}  [{sensor id}]"`
    pub key: String,
    pub sensor: &'a SensorSpec,
}

impl<'a> CameraEntry<'a> {
    pub fn display_key(model: &str, sensor_id: &str) -> String {
        format!("{model}  [{sensor_id}]")
    }

    pub fn gain_presets(&self) -> &'a [GainPreset] {
        &self.sensor.gain_presets
    }

    pub fn dark_current(&self) -> &'a DarkCurrentCurve {
        &self.sensor.dark_current
    }

    pub fn bit_depth(&self) -> u8 {
        self.sensor.bit_depth
    }
}

/// Cameras grouped by brand, both levels sorted by plain byte-wise string order.
#[derive(Debug, Clone)]
pub struct CameraIndex<'a> {
    brands: BTreeMap<String, BTreeMap<String, CameraEntry<'a>>>,
}

impl<'a> CameraIndex<'a> {
    /// Index over the built-in catalog
    pub fn builtin() -> &'static CameraIndex<'static> {
        &BUILTIN
    }

    /// Flatten every sensor's camera list into the brand/model index.
    ///
    /// Fails if two cameras end up with the same display key.
    pub fn build(catalog: &'a SensorCatalog) -> Result<Self, CatalogError> {
        let mut brands: BTreeMap<String, BTreeMap<String, CameraEntry<'a>>> = BTreeMap::new();

        for sensor in catalog.sensors() {
            for (brand, models) in &sensor.cameras {
                let by_key = brands.entry(brand.clone()).or_default();
                for model in models {
                    let key = CameraEntry::display_key(model, &sensor.id);
                    let entry = CameraEntry {
                        brand: brand.clone(),
                        model: model.clone(),
                        key: key.clone(),
                        sensor,
                    };
                    if by_key.insert(key.clone(), entry).is_some() {
                        return Err(CatalogError::Integrity(format!(
                            "camera {brand:?} / {key:?} listed twice"
                        )));
                    }
                }
            }
        }

        let index = Self { brands };
        log::debug!(
            "Indexed {} cameras from {} brands",
            index.len(),
            index.brands.len()
        );
        Ok(index)
    }

    /// Brand names, sorted
    pub fn brands(&self) -> Vec<&str> {
        self.brands.keys().map(String::as_str).collect()
    }

    /// Display keys of a brand's models, sorted. Unknown brands yield an error.
    pub fn models(&self, brand: &str) -> Result<Vec<&str>, CatalogError> {
        self.brands
            .get(brand)
            .map(|models| models.keys().map(String::as_str).collect())
            .ok_or_else(|| CatalogError::CameraNotFound {
                brand: brand.to_string(),
                model: String::new(),
            })
    }

    /// Entries of a brand, in display-key order
    pub fn entries(&self, brand: &str) -> impl Iterator<Item = &CameraEntry<'a>> {
        self.brands.get(brand).into_iter().flat_map(|m| m.values())
    }

    /// Resolve a camera by brand and display key.
    ///
    /// A bare model name (without the `[sensor]` suffix) is also accepted when it
    /// names exactly one camera of the brand.
    pub fn resolve(&self, brand: &str, model: &str) -> Result<&CameraEntry<'a>, CatalogError> {
        let not_found = || CatalogError::CameraNotFound {
            brand: brand.to_string(),
            model: model.to_string(),
        };

        let models = self.brands.get(brand).ok_or_else(not_found)?;
        if let Some(entry) = models.get(model) {
            return Ok(entry);
        }

        let mut by_name = models.values().filter(|entry| entry.model == model);
        match (by_name.next(), by_name.next()) {
            (Some(entry), None) => Ok(entry),
            _ => Err(not_found()),
        }
    }

    /// Total number of cameras
    pub fn len(&self) -> usize {
        self.brands.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
