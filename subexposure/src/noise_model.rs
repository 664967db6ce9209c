//! Sub-exposure noise model
//!
//! Closed-form relations between read noise, sky background rate and exposure time,
//! under the sky-limited model `σ² = RN² + sky·t`. Dark current does not enter these
//! ratios; it is reported alongside for information only.
//!
//! Every function here is total. Boundary inputs (zero sky rate, non-positive read noise
//! or tolerance) map to a neutral value or to [`Limit::Infinite`] instead of failing,
//! so an interactive caller can recompute on every keystroke.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// String marker used for [`Limit::Infinite`] in serialized output
pub const INFINITE_MARKER: &str = "inf";

/// Placeholder shown for durations that cannot be displayed
pub const DURATION_PLACEHOLDER: &str = "—";

/// Swamp factor below which read noise still dominates
pub const SWAMP_FACTOR_MIN: f64 = 3.0;

/// Swamp factor above which longer subs stop paying off
pub const SWAMP_FACTOR_MAX: f64 = 10.0;

/// A value that is either finite or "no finite answer exists".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Limit<T> {
    Finite(T),
    Infinite,
}

impl<T: Copy> Limit<T> {
    pub fn finite(&self) -> Option<T> {
        match self {
            Limit::Finite(value) => Some(*value),
            Limit::Infinite => None,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Limit::Infinite)
    }
}

impl<T: fmt::Display> fmt::Display for Limit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Finite(value) => value.fmt(f),
            Limit::Infinite => write!(f, "{INFINITE_MARKER}"),
        }
    }
}

impl<T: Serialize> Serialize for Limit<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Limit::Finite(value) => value.serialize(serializer),
            Limit::Infinite => serializer.serialize_str(INFINITE_MARKER),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Limit<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<T> {
            Value(T),
            Marker(String),
        }

        match Repr::<T>::deserialize(deserializer)? {
            Repr::Value(value) => Ok(Limit::Finite(value)),
            Repr::Marker(marker) if marker == INFINITE_MARKER => Ok(Limit::Infinite),
            Repr::Marker(other) => Err(de::Error::invalid_value(
                de::Unexpected::Str(&other),
                &"a number or \"inf\"",
            )),
        }
    }
}

/// Fractional noise penalty of a finite sub-exposure versus one infinitely long exposure.
///
/// With `r = t·sky/RN²`, the penalty is `sqrt((r+1)/r) − 1`. Returns 0 when any input is
/// non-positive or not finite, since no excess noise is definable there. An infinitely
/// long exposure carries no penalty.
///
/// # Example
/// ```
/// use subexposure::noise_model::additional_noise_fraction;
///
/// // r = 1 -> sqrt(2) - 1
/// let penalty = additional_noise_fraction(4.0, 1.0, 2.0);
/// assert!((penalty - (2.0_f64.sqrt() - 1.0)).abs() < 1e-12);
/// ```
pub fn additional_noise_fraction(exposure_s: f64, sky_rate: f64, read_noise: f64) -> f64 {
    let r = achieved_swamp_factor(exposure_s, sky_rate, read_noise);
    if !(r > 0.0) || !r.is_finite() {
        return 0.0;
    }
    ((r + 1.0) / r).sqrt() - 1.0
}

fn positive_finite(value: f64) -> bool {
    value > 0.0 && value.is_finite()
}

/// Translate an accepted extra-noise percentage into the time-budget factor `C`.
///
/// `C = 1 / ((1 + p/100)² − 1)`, rounded to one decimal. A non-positive tolerance has no
/// finite budget.
pub fn noise_tolerance_factor(percent_tolerance: f64) -> Limit<f64> {
    if !(percent_tolerance > 0.0) {
        return Limit::Infinite;
    }
    let ratio = ((100.0 + percent_tolerance) / 100.0).powi(2) - 1.0;
    if ratio <= 0.0 {
        return Limit::Infinite;
    }
    Limit::Finite(round_to_tenth(1.0 / ratio))
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Shortest sub-exposure, in whole seconds, that keeps the noise penalty within budget.
///
/// `ceil(C · RN² / sky)`; infinite for a non-positive sky rate or an infinite factor.
pub fn optimal_exposure_time(factor: Limit<f64>, read_noise: f64, sky_rate: f64) -> Limit<u64> {
    let factor = match factor {
        Limit::Finite(c) if sky_rate > 0.0 => c,
        _ => return Limit::Infinite,
    };
    let seconds = (factor * read_noise * read_noise / sky_rate).ceil();
    if !seconds.is_finite() {
        return Limit::Infinite;
    }
    Limit::Finite(seconds.max(0.0) as u64)
}

/// Sky background median (ADU) to aim for at a given swamp factor.
///
/// `floor(SF · RN² / gain + offset) · 65536 / 2^bits`, truncated to an integer. For a
/// 16-bit sensor this is just `floor(SF · RN² / gain + offset)`. A non-positive
/// conversion gain has no meaningful target and yields 0.
pub fn target_median_adu(
    swamp_factor: f64,
    read_noise: f64,
    conversion_gain: f64,
    offset_adu: u32,
    bit_depth: u8,
) -> i64 {
    if conversion_gain <= 0.0 {
        return 0;
    }
    let electrons_adu =
        (swamp_factor * read_noise * read_noise / conversion_gain + f64::from(offset_adu)).floor();
    let scale = 65536.0 / 2.0_f64.powi(i32::from(bit_depth));
    (electrons_adu * scale).floor() as i64
}

/// Swamp factor actually reached by an exposure: `sky · t / RN²`. Zero when any input is
/// non-positive, NaN or infinite.
pub fn achieved_swamp_factor(exposure_s: f64, sky_rate: f64, read_noise: f64) -> f64 {
    if ![exposure_s, sky_rate, read_noise].into_iter().all(positive_finite) {
        return 0.0;
    }
    exposure_s * sky_rate / (read_noise * read_noise)
}

/// Signed change in additional noise, in percentage points, going from the first
/// strategy to the second. Negative means the second strategy adds less noise.
pub fn snr_delta_percent(first_noise: f64, second_noise: f64) -> f64 {
    (second_noise - first_noise) * 100.0
}

/// Where a swamp factor sits relative to the recommended 3..=10 window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwampZone {
    /// Read noise dominates, lengthen the subs
    Underexposed,
    Optimal,
    /// Past the point of diminishing returns, subs can be shortened
    Saturated,
}

impl SwampZone {
    pub fn classify(swamp_factor: f64) -> Self {
        if swamp_factor < SWAMP_FACTOR_MIN {
            SwampZone::Underexposed
        } else if swamp_factor <= SWAMP_FACTOR_MAX {
            SwampZone::Optimal
        } else {
            SwampZone::Saturated
        }
    }
}

impl fmt::Display for SwampZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwampZone::Underexposed => write!(f, "increase"),
            SwampZone::Optimal => write!(f, "optimal"),
            SwampZone::Saturated => write!(f, "can reduce"),
        }
    }
}

/// Format seconds as zero-padded `mm:ss`.
///
/// Fractional seconds are truncated. Negative, NaN and infinite inputs render as
/// [`DURATION_PLACEHOLDER`].
pub fn format_seconds(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return DURATION_PLACEHOLDER.to_string();
    }
    let whole = seconds.trunc() as u64;
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

/// [`format_seconds`] for an optimal time, which may be infinite
pub fn format_limit_seconds(seconds: Limit<u64>) -> String {
    match seconds {
        Limit::Finite(s) => format_seconds(s as f64),
        Limit::Infinite => DURATION_PLACEHOLDER.to_string(),
    }
}
