//! Dark current lookup for cooled sensors
//!
//! Catalog entries tabulate dark current at a handful of cooling set points.
//! [`DarkCurrentCurve`] answers exact lookups against that table and falls back
//! to the doubling rule of thumb when asked about a temperature the table lacks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Dark current estimator that uses a reference temperature and dark current
/// to predict values at other temperatures using the rule of thumb that
/// dark current doubles for every 8°C temperature increase.
#[derive(Debug, Clone, PartialEq)]
pub struct DarkCurrentEstimator {
    /// Reference dark current in electrons/pixel/second
    reference_dark_current: f64,
    /// Reference temperature in degrees Celsius
    reference_temp_c: f64,
}

impl DarkCurrentEstimator {
    /// Temperature increase that doubles the dark current
    pub const DOUBLING_STEP_C: f64 = 8.0;

    /// Creates a new dark current estimator with reference values
    ///
    /// # Arguments
    /// * `reference_dark_current` - Dark current in electrons/pixel/second at reference temperature
    /// * `reference_temp_c` - Reference temperature in degrees Celsius
    pub fn new(reference_dark_current: f64, reference_temp_c: f64) -> Self {
        Self {
            reference_dark_current,
            reference_temp_c,
        }
    }

    /// Estimates dark current at a target temperature
    ///
    /// # Example
    /// ```
    /// use subexposure::hardware::dark_current::DarkCurrentEstimator;
    ///
    /// let estimator = DarkCurrentEstimator::new(0.002, 0.0);
    /// let at_minus_8 = estimator.estimate_at_temperature(-8.0);
    /// assert!((at_minus_8 - 0.001).abs() < 1e-12);
    /// ```
    pub fn estimate_at_temperature(&self, target_temp_c: f64) -> f64 {
        let doubling_periods = (target_temp_c - self.reference_temp_c) / Self::DOUBLING_STEP_C;
        self.reference_dark_current * 2.0_f64.powf(doubling_periods)
    }
}

/// Sparse dark current table keyed by cooling temperature (°C).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DarkCurrentCurve {
    points: BTreeMap<i32, f64>,
}

impl DarkCurrentCurve {
    pub fn new(points: BTreeMap<i32, f64>) -> Self {
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Tabulated temperatures, coldest first
    pub fn temperatures(&self) -> impl Iterator<Item = i32> + '_ {
        self.points.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.points.iter().map(|(t, dc)| (*t, *dc))
    }

    /// Exact tabulated dark current, if the temperature is in the table.
    pub fn at(&self, temp_c: i32) -> Option<f64> {
        self.points.get(&temp_c).copied()
    }

    /// Dark current at any temperature.
    ///
    /// Returns the tabulated value when present; otherwise extrapolates from the
    /// nearest tabulated point (ties go to the colder one) with the doubling rule.
    /// Returns `None` only for an empty curve.
    pub fn estimate_at(&self, temp_c: i32) -> Option<f64> {
        if let Some(exact) = self.at(temp_c) {
            return Some(exact);
        }

        let (ref_temp, ref_dc) = self
            .points
            .iter()
            .min_by_key(|(t, _)| (i64::from(**t) - i64::from(temp_c)).abs())?;

        let estimate = DarkCurrentEstimator::new(*ref_dc, f64::from(*ref_temp))
            .estimate_at_temperature(f64::from(temp_c));
        log::debug!(
            "Estimated dark current at {temp_c}°C from {ref_temp}°C reference: {estimate:.6} e-/s/px"
        );
        Some(estimate)
    }
}

impl FromIterator<(i32, f64)> for DarkCurrentCurve {
    fn from_iter<I: IntoIterator<Item = (i32, f64)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn imx571_curve() -> DarkCurrentCurve {
        [
            (0, 0.002),
            (-5, 0.00125),
            (-10, 0.00075),
            (-15, 0.00037),
            (-20, 0.00012),
            (-25, 0.00012),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_same_temperature() {
        let estimator = DarkCurrentEstimator::new(0.1, 20.0);
        assert_eq!(estimator.estimate_at_temperature(20.0), 0.1);
    }

    #[test]
    fn test_8_degree_increase_doubles() {
        let estimator = DarkCurrentEstimator::new(0.1, 20.0);
        assert_relative_eq!(estimator.estimate_at_temperature(28.0), 0.2, epsilon = 1e-10);
    }

    #[test]
    fn test_16_degree_decrease_quarters() {
        let estimator = DarkCurrentEstimator::new(0.1, 20.0);
        assert_relative_eq!(estimator.estimate_at_temperature(4.0), 0.025, epsilon = 1e-10);
    }

    #[test]
    fn test_negative_reference_temperature() {
        let estimator = DarkCurrentEstimator::new(0.04, -40.0);
        assert_relative_eq!(estimator.estimate_at_temperature(-32.0), 0.08, epsilon = 1e-10);
    }

    #[test]
    fn test_curve_exact_lookup() {
        let curve = imx571_curve();
        assert_eq!(curve.at(-10), Some(0.00075));
        assert_eq!(curve.at(-12), None);
        assert_eq!(curve.estimate_at(-15), Some(0.00037));
    }

    #[test]
    fn test_curve_temperatures_sorted_coldest_first() {
        let temps: Vec<i32> = imx571_curve().temperatures().collect();
        assert_eq!(temps, vec![-25, -20, -15, -10, -5, 0]);
    }

    #[test]
    fn test_curve_extrapolates_above_table() {
        // Nearest point is 0°C; +8°C doubles it
        let estimate = imx571_curve().estimate_at(8).unwrap();
        assert_relative_eq!(estimate, 0.004, epsilon = 1e-12);
    }

    #[test]
    fn test_curve_uses_nearest_point() {
        // -12 is 2° from -10 and 3° from -15
        let estimate = imx571_curve().estimate_at(-12).unwrap();
        let expected = 0.00075 * 2.0_f64.powf(-2.0 / 8.0);
        assert_relative_eq!(estimate, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_curve_tie_uses_colder_point() {
        // -5 is 5° from both -10 and 0
        let sparse: DarkCurrentCurve = [(-10, 1.0), (0, 4.0)].into_iter().collect();
        let tie = sparse.estimate_at(-5).unwrap();
        assert_relative_eq!(tie, 2.0_f64.powf(5.0 / 8.0), epsilon = 1e-12);

        let from_warmer = 4.0 * 2.0_f64.powf(-5.0 / 8.0);
        assert!((tie - from_warmer).abs() > 0.1);
    }

    #[test]
    fn test_single_point_curve() {
        let curve: DarkCurrentCurve = [(-10, 0.0005)].into_iter().collect();
        assert_eq!(curve.len(), 1);
        assert_relative_eq!(curve.estimate_at(-2).unwrap(), 0.001, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_curve_has_no_estimate() {
        let curve = DarkCurrentCurve::default();
        assert!(curve.is_empty());
        assert_eq!(curve.estimate_at(0), None);
    }
}
