//! One-shot JSON export of computed values
//!
//! The document has three sections: `parameters` (every scalar input, including the
//! derived 3 nm rate), `approach1` (swamp-factor targets) and `approach2` (tolerance
//! factor and optimal sub lengths). Infinite values are written as the string `"inf"`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{Channel, ExposureContext};
use crate::noise_model::{
    noise_tolerance_factor, optimal_exposure_time, target_median_adu, Limit, SWAMP_FACTOR_MAX,
    SWAMP_FACTOR_MIN,
};

/// File name suggested for exports
pub const DEFAULT_EXPORT_FILE: &str = "exposure_results.json";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to encode export: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParameters {
    pub sky_l: f64,
    pub sky_rgb: f64,
    pub sky_nb12: f64,
    pub sky_nb7: f64,
    pub sky_nb3: f64,
    pub read_noise: f64,
    pub conversion_gain: f64,
    pub dark_current: f64,
    pub bit_depth: u8,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwampFactorSection {
    #[serde(rename = "swampFactor")]
    pub swamp_factor: f64,
    #[serde(rename = "medianAtSF3")]
    pub median_at_sf3: i64,
    #[serde(rename = "medianAtSF10")]
    pub median_at_sf10: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimalTimeSection {
    pub noise_percent: f64,
    pub tolerance_factor: Limit<f64>,
    /// Keyed by channel key (`L`, `RGB`, `NB12`, `NB7`, `NB3`)
    pub optimal_times_by_channel: BTreeMap<String, Limit<u64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub parameters: ExportParameters,
    pub approach1: SwampFactorSection,
    pub approach2: OptimalTimeSection,
}

impl ExportDocument {
    pub fn from_context(ctx: &ExposureContext) -> Self {
        let median = |sf: f64| {
            target_median_adu(
                sf,
                ctx.read_noise,
                ctx.conversion_gain,
                ctx.offset_adu,
                ctx.bit_depth,
            )
        };
        let factor = noise_tolerance_factor(ctx.noise_percent);
        let optimal_times_by_channel = Channel::ALL
            .into_iter()
            .map(|channel| {
                let seconds = optimal_exposure_time(factor, ctx.read_noise, ctx.sky.rate(channel));
                (channel.key().to_string(), seconds)
            })
            .collect();

        Self {
            parameters: ExportParameters {
                sky_l: ctx.sky.l,
                sky_rgb: ctx.sky.rgb,
                sky_nb12: ctx.sky.nb12,
                sky_nb7: ctx.sky.nb7,
                sky_nb3: ctx.sky.nb3(),
                read_noise: ctx.read_noise,
                conversion_gain: ctx.conversion_gain,
                dark_current: ctx.dark_current,
                bit_depth: ctx.bit_depth,
                offset: ctx.offset_adu,
            },
            approach1: SwampFactorSection {
                swamp_factor: ctx.swamp_factor,
                median_at_sf3: median(SWAMP_FACTOR_MIN),
                median_at_sf10: median(SWAMP_FACTOR_MAX),
            },
            approach2: OptimalTimeSection {
                noise_percent: ctx.noise_percent,
                tolerance_factor: factor,
                optimal_times_by_channel,
            },
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ExportError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ExportError> {
        std::fs::write(path, self.to_json_pretty()?)?;
        log::info!("Exported results to {}", path.display());
        Ok(())
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, ExportError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn optimal_time(&self, channel: Channel) -> Option<Limit<u64>> {
        self.approach2
            .optimal_times_by_channel
            .get(channel.key())
            .copied()
    }
}
