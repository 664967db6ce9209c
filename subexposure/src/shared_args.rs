use crate::context::{Channel, ContextError, ExposureContext};
use crate::hardware::{CameraIndex, CatalogError, SensorCatalog};
use clap::Args;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArgsError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Parse a filter channel name ("L", "rgb", "NB12", ...)
pub fn parse_channel(s: &str) -> Result<Channel, String> {
    s.parse()
}

/// Parse a number, rejecting "NaN" and "inf"
pub fn parse_finite(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid numeric value: {}", s))?;

    if !value.is_finite() {
        return Err(format!("Value must be finite, got {}", s));
    }
    Ok(value)
}

/// Parse a rate, level or duration that must not be negative
pub fn parse_non_negative(s: &str) -> Result<f64, String> {
    let value = parse_finite(s)?;
    if value < 0.0 {
        return Err(format!("Value must be non-negative, got {}", s));
    }
    Ok(value)
}

/// Alternate sensor catalog
#[derive(Args, Debug, Clone, Default)]
pub struct CatalogArgs {
    /// JSON sensor catalog to use instead of the built-in one
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

impl CatalogArgs {
    /// Run `f` against the selected catalog (file or built-in).
    pub fn with_catalog<R>(&self, f: impl FnOnce(&SensorCatalog) -> R) -> Result<R, ArgsError> {
        match &self.catalog {
            Some(path) => {
                log::info!("Loading sensor catalog from {}", path.display());
                let catalog = SensorCatalog::load_from_file(path)?;
                Ok(f(&catalog))
            }
            None => Ok(f(SensorCatalog::builtin())),
        }
    }
}

/// Camera selection. Fills read noise, gain, offset, bit depth and dark current.
#[derive(Args, Debug, Clone, Default)]
pub struct CameraArgs {
    /// Camera brand (e.g. "ZWO")
    #[arg(long, requires = "model")]
    pub brand: Option<String>,

    /// Camera model, either the bare name or the full "Model  [SENSOR]" key
    #[arg(long, requires = "brand")]
    pub model: Option<String>,

    /// Gain preset label; defaults to the sensor's first preset
    #[arg(long, requires = "brand")]
    pub preset: Option<String>,

    /// Cooling temperature in °C; must be listed for the sensor. Defaults to the warmest listed.
    #[arg(long, requires = "brand", allow_hyphen_values = true)]
    pub temperature: Option<i32>,
}

impl CameraArgs {
    pub fn is_selected(&self) -> bool {
        self.brand.is_some() && self.model.is_some()
    }

    /// Apply the selected camera to `ctx`. Does nothing when no camera is selected.
    pub fn apply(
        &self,
        catalog: &SensorCatalog,
        ctx: &mut ExposureContext,
    ) -> Result<(), CatalogError> {
        let (Some(brand), Some(model)) = (&self.brand, &self.model) else {
            return Ok(());
        };

        let index = CameraIndex::build(catalog)?;
        let camera = index.resolve(brand, model)?;

        let preset = match &self.preset {
            Some(label) => label.clone(),
            None => camera.sensor.default_preset().label.clone(),
        };
        let temp_c = match self.temperature {
            Some(t) => t,
            None => camera.dark_current().temperatures().max().ok_or_else(|| {
                CatalogError::Integrity(format!("{} has no dark current data", camera.sensor.id))
            })?,
        };

        ctx.apply_camera(camera, &preset, temp_c)
    }
}

/// Sensor parameters. Each one given here overrides the camera and context file.
#[derive(Args, Debug, Clone, Default)]
pub struct SensorArgs {
    /// Read noise in e- RMS [default: 1.375]
    #[arg(long, value_parser = parse_finite)]
    pub read_noise: Option<f64>,

    /// Conversion gain in e-/ADU [default: 0.244]
    #[arg(long, value_parser = parse_finite)]
    pub conversion_gain: Option<f64>,

    /// Dark current in e-/s/px [default: 0.0017]
    #[arg(long, value_parser = parse_non_negative)]
    pub dark_current: Option<f64>,

    /// ADC bit depth [default: 16]
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub bit_depth: Option<u8>,

    /// Bias offset in ADU [default: 20]
    #[arg(long)]
    pub offset: Option<u32>,
}

impl SensorArgs {
    pub fn apply(&self, ctx: &mut ExposureContext) {
        if let Some(v) = self.read_noise {
            ctx.read_noise = v;
        }
        if let Some(v) = self.conversion_gain {
            ctx.conversion_gain = v;
        }
        if let Some(v) = self.dark_current {
            ctx.dark_current = v;
        }
        if let Some(v) = self.bit_depth {
            ctx.bit_depth = v;
        }
        if let Some(v) = self.offset {
            ctx.offset_adu = v;
        }
    }
}

/// Sky background rates in e-/px/s. The 3 nm rate is always a quarter of the 12 nm rate.
#[derive(Args, Debug, Clone, Default)]
pub struct SkyArgs {
    /// Luminance sky rate [default: 1.76]
    #[arg(long, value_parser = parse_non_negative)]
    pub sky_l: Option<f64>,

    /// RGB sky rate [default: 1.31]
    #[arg(long, value_parser = parse_non_negative)]
    pub sky_rgb: Option<f64>,

    /// 12 nm narrowband sky rate [default: 0.12]
    #[arg(long, value_parser = parse_non_negative)]
    pub sky_nb12: Option<f64>,

    /// 7 nm narrowband sky rate [default: 0.07]
    #[arg(long, value_parser = parse_non_negative)]
    pub sky_nb7: Option<f64>,
}

impl SkyArgs {
    pub fn apply(&self, ctx: &mut ExposureContext) {
        if let Some(v) = self.sky_l {
            ctx.sky.l = v;
        }
        if let Some(v) = self.sky_rgb {
            ctx.sky.rgb = v;
        }
        if let Some(v) = self.sky_nb12 {
            ctx.sky.nb12 = v;
        }
        if let Some(v) = self.sky_nb7 {
            ctx.sky.nb7 = v;
        }
    }
}

/// Inputs shared by every calculating subcommand.
///
/// Layers, lowest precedence first: built-in defaults or `--context` file, selected
/// camera, then individual sensor, sky and target flags.
#[derive(Args, Debug, Clone, Default)]
pub struct SharedCalcArgs {
    /// JSON file with a saved calculation context
    #[arg(long)]
    pub context: Option<PathBuf>,

    #[command(flatten)]
    pub catalog: CatalogArgs,

    #[command(flatten)]
    pub camera: CameraArgs,

    #[command(flatten)]
    pub sensor: SensorArgs,

    #[command(flatten)]
    pub sky: SkyArgs,

    /// Desired swamp factor, typically 3 to 10 [default: 10]
    #[arg(long, value_parser = parse_finite)]
    pub swamp_factor: Option<f64>,

    /// Accepted additional noise in percent [default: 5]
    #[arg(long, value_parser = parse_finite)]
    pub noise_percent: Option<f64>,
}

impl SharedCalcArgs {
    /// Build the calculation context from all layers.
    pub fn to_context(&self) -> Result<ExposureContext, ArgsError> {
        let mut ctx = match &self.context {
            Some(path) => {
                log::info!("Loading context from {}", path.display());
                ExposureContext::load_from_file(path)?
            }
            None => ExposureContext::default(),
        };

        if self.camera.is_selected() {
            self.catalog
                .with_catalog(|catalog| self.camera.apply(catalog, &mut ctx))??;
        }

        self.sensor.apply(&mut ctx);
        self.sky.apply(&mut ctx);
        if let Some(v) = self.swamp_factor {
            ctx.swamp_factor = v;
        }
        if let Some(v) = self.noise_percent {
            ctx.noise_percent = v;
        }

        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        args: SharedCalcArgs,
    }

    fn parse(argv: &[&str]) -> Result<SharedCalcArgs, clap::Error> {
        let mut full = vec!["test"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).map(|cli| cli.args)
    }

    #[test]
    fn test_no_flags_gives_default_context() {
        let ctx = parse(&[]).unwrap().to_context().unwrap();
        assert_eq!(ctx, ExposureContext::default());
    }

    #[test]
    fn test_camera_selection_fills_sensor() {
        let args = parse(&["--brand", "ZWO", "--model", "ASI2600MM Pro"]).unwrap();
        let ctx = args.to_context().unwrap();

        assert_relative_eq!(ctx.read_noise, 3.25);
        assert_relative_eq!(ctx.conversion_gain, 0.75);
        assert_eq!(ctx.offset_adu, 40);
        assert_eq!(ctx.bit_depth, 16);
        // Warmest listed temperature is 0 °C
        assert_relative_eq!(ctx.dark_current, 0.002);
    }

    #[test]
    fn test_explicit_flags_override_camera() {
        let args = parse(&[
            "--brand",
            "ZWO",
            "--model",
            "ASI2600MM Pro",
            "--preset",
            "Gain 100 (HCG)",
            "--temperature",
            "-10",
            "--read-noise",
            "1.5",
        ])
        .unwrap();
        let ctx = args.to_context().unwrap();

        assert_relative_eq!(ctx.read_noise, 1.5);
        assert_relative_eq!(ctx.conversion_gain, 0.21);
        assert_relative_eq!(ctx.dark_current, 0.00075);
    }

    #[test]
    fn test_unknown_preset_is_an_error() {
        let args = parse(&["--brand", "ZWO", "--model", "ASI2600MM Pro", "--preset", "Gain 9"])
            .unwrap();
        assert!(matches!(
            args.to_context(),
            Err(ArgsError::Catalog(CatalogError::GainPresetNotFound { .. }))
        ));
    }

    #[test]
    fn test_model_requires_brand() {
        assert!(parse(&["--model", "ASI2600MM Pro"]).is_err());
    }

    #[test]
    fn test_negative_sky_rejected() {
        assert!(parse(&["--sky-l", "-1"]).is_err());
        assert!(parse(&["--sky-l", "abc"]).is_err());
    }

    #[test]
    fn test_non_finite_values_rejected() {
        for flag in ["--read-noise", "--conversion-gain", "--swamp-factor", "--sky-rgb"] {
            assert!(parse(&[flag, "NaN"]).is_err(), "{flag} accepted NaN");
            assert!(parse(&[flag, "inf"]).is_err(), "{flag} accepted inf");
        }
        assert!(parse(&["--noise-percent", "-inf"]).is_err());
        assert_eq!(parse_finite(" 2.5 "), Ok(2.5));
        assert_eq!(parse_non_negative("0"), Ok(0.0));
    }

    #[test]
    fn test_context_file_is_base_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.json");
        std::fs::write(&path, r#"{"read_noise": 2.0, "noise_percent": 2.0}"#).unwrap();

        let args = parse(&["--context", path.to_str().unwrap(), "--noise-percent", "1"]).unwrap();
        let ctx = args.to_context().unwrap();

        assert_relative_eq!(ctx.read_noise, 2.0);
        assert_relative_eq!(ctx.noise_percent, 1.0);
        assert_relative_eq!(ctx.conversion_gain, 0.244);
    }

    #[test]
    fn test_parse_channel() {
        assert_eq!(parse_channel("nb7"), Ok(Channel::Nb7));
        assert!(parse_channel("Ha").is_err());
    }
}
