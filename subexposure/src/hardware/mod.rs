//! Sensor and camera hardware descriptions

pub mod camera_index;
pub mod dark_current;
pub mod sensor;

pub use camera_index::{CameraEntry, CameraIndex};
pub use dark_current::{DarkCurrentCurve, DarkCurrentEstimator};
pub use sensor::{CatalogError, GainPreset, SensorCatalog, SensorSpec};
