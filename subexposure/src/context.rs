//! Inputs of one exposure calculation
//!
//! [`ExposureContext`] gathers everything the noise model needs: sky background per
//! filter channel, sensor parameters, and the user's targets. It is a plain value; edits
//! mutate it in place and every evaluation reads it afresh.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hardware::{CameraEntry, CatalogError};

/// Errors raised while editing or loading a context
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Field {0} is derived and cannot be set directly")]
    DerivedField(String),
    #[error("Invalid value {value:?} for field {field}")]
    InvalidValue { field: String, value: String },
    #[error("Failed to parse context: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to read context: {0}")]
    Io(#[from] std::io::Error),
}

/// Filter channels the calculator evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    L,
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "NB12")]
    Nb12,
    #[serde(rename = "NB7")]
    Nb7,
    #[serde(rename = "NB3")]
    Nb3,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::L,
        Channel::Rgb,
        Channel::Nb12,
        Channel::Nb7,
        Channel::Nb3,
    ];

    /// Short ASCII key, used in exports and field names
    pub fn key(&self) -> &'static str {
        match self {
            Channel::L => "L",
            Channel::Rgb => "RGB",
            Channel::Nb12 => "NB12",
            Channel::Nb7 => "NB7",
            Channel::Nb3 => "NB3",
        }
    }

    pub fn is_narrowband(&self) -> bool {
        matches!(self, Channel::Nb12 | Channel::Nb7 | Channel::Nb3)
    }

    fn field_suffix(&self) -> &'static str {
        match self {
            Channel::L => "l",
            Channel::Rgb => "rgb",
            Channel::Nb12 => "nb12",
            Channel::Nb7 => "nb7",
            Channel::Nb3 => "nb3",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::L => write!(f, "L"),
            Channel::Rgb => write!(f, "RGB"),
            Channel::Nb12 => write!(f, "NB 12 nm"),
            Channel::Nb7 => write!(f, "NB 7 nm"),
            Channel::Nb3 => write!(f, "NB 3 nm"),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown channel {s:?} (expected L, RGB, NB12, NB7 or NB3)"))
    }
}

/// Sky background rates in e-/px/s.
///
/// The 3 nm narrowband rate is not stored: it is always a quarter of the 12 nm rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyBackground {
    pub l: f64,
    pub rgb: f64,
    pub nb12: f64,
    pub nb7: f64,
}

impl SkyBackground {
    pub fn nb3(&self) -> f64 {
        self.nb12 / 4.0
    }

    pub fn rate(&self, channel: Channel) -> f64 {
        match channel {
            Channel::L => self.l,
            Channel::Rgb => self.rgb,
            Channel::Nb12 => self.nb12,
            Channel::Nb7 => self.nb7,
            Channel::Nb3 => self.nb3(),
        }
    }
}

impl Default for SkyBackground {
    fn default() -> Self {
        Self {
            l: 1.76,
            rgb: 1.31,
            nb12: 0.12,
            nb7: 0.07,
        }
    }
}

/// One value per channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerChannel<T> {
    pub l: T,
    pub rgb: T,
    pub nb12: T,
    pub nb7: T,
    pub nb3: T,
}

impl<T: Copy> PerChannel<T> {
    pub fn get(&self, channel: Channel) -> T {
        match channel {
            Channel::L => self.l,
            Channel::Rgb => self.rgb,
            Channel::Nb12 => self.nb12,
            Channel::Nb7 => self.nb7,
            Channel::Nb3 => self.nb3,
        }
    }

    pub fn set(&mut self, channel: Channel, value: T) {
        let slot = match channel {
            Channel::L => &mut self.l,
            Channel::Rgb => &mut self.rgb,
            Channel::Nb12 => &mut self.nb12,
            Channel::Nb7 => &mut self.nb7,
            Channel::Nb3 => &mut self.nb3,
        };
        *slot = value;
    }
}

/// Two candidate sub lengths (seconds) to weigh against each other
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyPair {
    pub first_s: f64,
    pub second_s: f64,
}

impl Default for StrategyPair {
    fn default() -> Self {
        Self {
            first_s: 120.0,
            second_s: 180.0,
        }
    }
}

/// Channel groups offered for strategy comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyGroup {
    L,
    #[serde(rename = "RGB")]
    Rgb,
}

impl StrategyGroup {
    pub const ALL: [StrategyGroup; 2] = [StrategyGroup::L, StrategyGroup::Rgb];

    pub fn channel(&self) -> Channel {
        match self {
            StrategyGroup::L => Channel::L,
            StrategyGroup::Rgb => Channel::Rgb,
        }
    }
}

/// Mutable input state of the calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureContext {
    pub sky: SkyBackground,
    /// Read noise, e- RMS
    pub read_noise: f64,
    /// Conversion gain, e-/ADU
    pub conversion_gain: f64,
    /// Dark current, e-/s/px (informational)
    pub dark_current: f64,
    pub bit_depth: u8,
    pub offset_adu: u32,
    /// Desired swamp factor, typically 3 to 10
    pub swamp_factor: f64,
    /// Accepted additional noise, percent
    pub noise_percent: f64,
    /// Sub length probed for additional noise, per channel (seconds)
    pub probe_durations: PerChannel<f64>,
    pub strategy_l: StrategyPair,
    pub strategy_rgb: StrategyPair,
}

impl Default for ExposureContext {
    fn default() -> Self {
        Self {
            sky: SkyBackground::default(),
            read_noise: 1.375,
            conversion_gain: 0.244,
            dark_current: 0.0017,
            bit_depth: 16,
            offset_adu: 20,
            swamp_factor: 10.0,
            noise_percent: 5.0,
            probe_durations: PerChannel {
                l: 90.0,
                rgb: 90.0,
                nb12: 180.0,
                nb7: 300.0,
                nb3: 300.0,
            },
            strategy_l: StrategyPair::default(),
            strategy_rgb: StrategyPair::default(),
        }
    }
}

impl ExposureContext {
    pub fn strategy(&self, group: StrategyGroup) -> StrategyPair {
        match group {
            StrategyGroup::L => self.strategy_l,
            StrategyGroup::Rgb => self.strategy_rgb,
        }
    }

    /// True when read noise and conversion gain are positive and finite
    pub fn is_computable(&self) -> bool {
        [self.read_noise, self.conversion_gain]
            .into_iter()
            .all(|v| v > 0.0 && v.is_finite())
    }

    /// Copy a camera's preset and dark current into the context.
    ///
    /// Both the preset label and the temperature must exist for the camera's sensor;
    /// on error the context is left as it was.
    pub fn apply_camera(
        &mut self,
        camera: &CameraEntry<'_>,
        preset_label: &str,
        temp_c: i32,
    ) -> Result<(), CatalogError> {
        let preset = camera.sensor.gain_preset(preset_label)?;
        let dark_current = camera.sensor.dark_current_at(temp_c)?;

        self.read_noise = preset.read_noise_e;
        self.conversion_gain = preset.conversion_gain;
        self.offset_adu = preset.offset_adu;
        self.bit_depth = camera.bit_depth();
        self.dark_current = dark_current;

        log::debug!(
            "{} {} | {} | T={}°C | RN={} gain={} e-/ADU DC={} {}bit offset={}",
            camera.brand,
            camera.key,
            preset.label,
            temp_c,
            self.read_noise,
            self.conversion_gain,
            self.dark_current,
            self.bit_depth,
            self.offset_adu
        );
        Ok(())
    }

    /// Set a single field from its textual value, as typed by a user.
    ///
    /// Field names are snake_case (`sky_l`, `read_noise`, `probe_nb7`, `strategy_rgb2`, ...).
    /// The derived `sky_nb3` rate is rejected.
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<(), ContextError> {
        let field = field.trim();
        let value = value.trim();

        match field {
            "sky_l" => self.sky.l = parse_float(field, value)?,
            "sky_rgb" => self.sky.rgb = parse_float(field, value)?,
            "sky_nb12" => self.sky.nb12 = parse_float(field, value)?,
            "sky_nb7" => self.sky.nb7 = parse_float(field, value)?,
            "sky_nb3" => return Err(ContextError::DerivedField(field.to_string())),
            "read_noise" => self.read_noise = parse_float(field, value)?,
            "conversion_gain" => self.conversion_gain = parse_float(field, value)?,
            "dark_current" => self.dark_current = parse_float(field, value)?,
            "bit_depth" => self.bit_depth = parse_value(field, value)?,
            "offset" | "offset_adu" => self.offset_adu = parse_value(field, value)?,
            "swamp_factor" => self.swamp_factor = parse_float(field, value)?,
            "noise_percent" => self.noise_percent = parse_float(field, value)?,
            "strategy_l1" => self.strategy_l.first_s = parse_float(field, value)?,
            "strategy_l2" => self.strategy_l.second_s = parse_float(field, value)?,
            "strategy_rgb1" => self.strategy_rgb.first_s = parse_float(field, value)?,
            "strategy_rgb2" => self.strategy_rgb.second_s = parse_float(field, value)?,
            other => {
                let channel = other
                    .strip_prefix("probe_")
                    .and_then(|suffix| Channel::ALL.into_iter().find(|c| c.field_suffix() == suffix))
                    .ok_or_else(|| ContextError::UnknownField(other.to_string()))?;
                self.probe_durations
                    .set(channel, parse_float(field, value)?);
            }
        }
        Ok(())
    }

    /// Read a context from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ContextError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ContextError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

fn invalid_value(field: &str, value: &str) -> ContextError {
    ContextError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: FromStr>(field: &str, value: &str) -> Result<T, ContextError> {
    value.parse().map_err(|_| invalid_value(field, value))
}

/// `f64::from_str` accepts "NaN" and "inf", neither of which is a usable rate or duration
fn parse_float(field: &str, value: &str) -> Result<f64, ContextError> {
    let parsed: f64 = parse_value(field, value)?;
    if !parsed.is_finite() {
        return Err(invalid_value(field, value));
    }
    Ok(parsed)
}
