//! Scenario evaluation over the fixed channel set and duration ladders
//!
//! [`evaluate`] runs the noise model for every channel of an [`ExposureContext`] and
//! collects the swamp-factor targets, optimal sub lengths, probe penalties, strategy
//! comparisons and noise tables into one [`EvaluationResult`].

use serde::{Deserialize, Serialize};

use crate::context::{Channel, ExposureContext, StrategyGroup};
use crate::noise_model::{
    achieved_swamp_factor, additional_noise_fraction, format_limit_seconds,
    noise_tolerance_factor, optimal_exposure_time, snr_delta_percent, target_median_adu, Limit,
    SwampZone, SWAMP_FACTOR_MAX, SWAMP_FACTOR_MIN,
};

/// Candidate sub lengths (s) tabulated for L and RGB
pub const BROADBAND_LADDER: [u32; 15] = [
    4, 10, 20, 30, 40, 50, 60, 100, 200, 300, 400, 500, 600, 1000, 2000,
];

/// Candidate sub lengths (s) tabulated for narrowband filters
pub const NARROWBAND_LADDER: [u32; 8] = [100, 200, 300, 400, 500, 600, 1000, 2000];

/// Which duration ladder a table uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ladder {
    Broadband,
    Narrowband,
}

impl Ladder {
    pub fn durations(&self) -> &'static [u32] {
        match self {
            Ladder::Broadband => &BROADBAND_LADDER,
            Ladder::Narrowband => &NARROWBAND_LADDER,
        }
    }

    pub fn channels(&self) -> &'static [Channel] {
        match self {
            Ladder::Broadband => &[Channel::L, Channel::Rgb],
            Ladder::Narrowband => &[Channel::Nb12, Channel::Nb7, Channel::Nb3],
        }
    }
}

/// Target sky medians at the bounds of the swamp window and at the user's factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwampSummary {
    pub swamp_factor: f64,
    pub median_at_min: i64,
    pub median_at_chosen: i64,
    pub median_at_max: i64,
}

/// Recommended sub length for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelTime {
    pub channel: Channel,
    pub seconds: Limit<u64>,
    /// `mm:ss` rendering, or a placeholder when infinite
    pub mmss: String,
    /// Swamp factor reached at `seconds`, when finite
    pub swamp_factor: Option<f64>,
    pub zone: Option<SwampZone>,
}

/// Additional noise of a channel at its probe duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPenalty {
    pub channel: Channel,
    pub duration_s: f64,
    pub additional_noise: f64,
}

/// One side of a strategy comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub duration_s: f64,
    pub additional_noise: f64,
}

/// Two sub lengths for the same channel group, compared by excess noise.
///
/// `delta = second − first`; a negative delta means the second strategy is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyComparison {
    pub group: StrategyGroup,
    pub first: StrategyOutcome,
    pub second: StrategyOutcome,
    pub delta: f64,
}

impl StrategyComparison {
    pub fn compare(group: StrategyGroup, first_s: f64, second_s: f64, ctx: &ExposureContext) -> Self {
        let sky = ctx.sky.rate(group.channel());
        let outcome = |duration_s: f64| StrategyOutcome {
            duration_s,
            additional_noise: additional_noise_fraction(duration_s, sky, ctx.read_noise),
        };
        let first = outcome(first_s);
        let second = outcome(second_s);
        Self {
            group,
            first,
            second,
            delta: second.additional_noise - first.additional_noise,
        }
    }

    pub fn second_is_better(&self) -> bool {
        self.delta < 0.0
    }

    /// Delta in percentage points
    pub fn delta_percent(&self) -> f64 {
        snr_delta_percent(self.first.additional_noise, self.second.additional_noise)
    }
}

/// Display classification of a tabulated penalty against the user's tolerance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseClass {
    Acceptable,
    Exceeds,
}

impl NoiseClass {
    /// Inclusive: a penalty equal to the tolerance is acceptable
    pub fn classify(additional_noise: f64, tolerance_fraction: f64) -> Self {
        if additional_noise <= tolerance_fraction {
            NoiseClass::Acceptable
        } else {
            NoiseClass::Exceeds
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseCell {
    pub duration_s: u32,
    pub additional_noise: f64,
    pub class: NoiseClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseRow {
    pub channel: Channel,
    pub cells: Vec<NoiseCell>,
}

impl NoiseRow {
    /// Chart points as (seconds, percent)
    pub fn curve(&self) -> Vec<(f64, f64)> {
        self.cells
            .iter()
            .map(|cell| (f64::from(cell.duration_s), cell.additional_noise * 100.0))
            .collect()
    }
}

/// Additional noise for every channel of a ladder at every ladder duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseTable {
    pub ladder: Ladder,
    /// Tolerance as a fraction (5 % -> 0.05)
    pub tolerance: f64,
    pub rows: Vec<NoiseRow>,
}

impl NoiseTable {
    pub fn build(ladder: Ladder, ctx: &ExposureContext) -> Self {
        let tolerance = ctx.noise_percent / 100.0;
        let rows = ladder
            .channels()
            .iter()
            .map(|&channel| {
                let sky = ctx.sky.rate(channel);
                let cells = ladder
                    .durations()
                    .iter()
                    .map(|&duration_s| {
                        let additional_noise =
                            additional_noise_fraction(f64::from(duration_s), sky, ctx.read_noise);
                        NoiseCell {
                            duration_s,
                            additional_noise,
                            class: NoiseClass::classify(additional_noise, tolerance),
                        }
                    })
                    .collect();
                NoiseRow { channel, cells }
            })
            .collect();

        Self {
            ladder,
            tolerance,
            rows,
        }
    }

    pub fn row(&self, channel: Channel) -> Option<&NoiseRow> {
        self.rows.iter().find(|row| row.channel == channel)
    }
}

/// Everything derived from one context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub swamp: SwampSummary,
    pub tolerance_factor: Limit<f64>,
    pub optimal_times: Vec<ChannelTime>,
    pub penalties: Vec<ChannelPenalty>,
    pub comparisons: Vec<StrategyComparison>,
    pub tables: Vec<NoiseTable>,
    /// Dark current carried through for display; not part of any ratio
    pub dark_current: f64,
}

impl EvaluationResult {
    pub fn optimal_time(&self, channel: Channel) -> Option<&ChannelTime> {
        self.optimal_times.iter().find(|t| t.channel == channel)
    }

    pub fn penalty(&self, channel: Channel) -> Option<&ChannelPenalty> {
        self.penalties.iter().find(|p| p.channel == channel)
    }

    pub fn comparison(&self, group: StrategyGroup) -> Option<&StrategyComparison> {
        self.comparisons.iter().find(|c| c.group == group)
    }

    pub fn table(&self, ladder: Ladder) -> Option<&NoiseTable> {
        self.tables.iter().find(|t| t.ladder == ladder)
    }
}

/// Swamp-factor targets for a context
pub fn swamp_summary(ctx: &ExposureContext) -> SwampSummary {
    let median = |sf: f64| {
        target_median_adu(
            sf,
            ctx.read_noise,
            ctx.conversion_gain,
            ctx.offset_adu,
            ctx.bit_depth,
        )
    };
    SwampSummary {
        swamp_factor: ctx.swamp_factor,
        median_at_min: median(SWAMP_FACTOR_MIN),
        median_at_chosen: median(ctx.swamp_factor),
        median_at_max: median(SWAMP_FACTOR_MAX),
    }
}

/// Optimal sub length for every channel under a tolerance factor
pub fn optimal_times(ctx: &ExposureContext, factor: Limit<f64>) -> Vec<ChannelTime> {
    Channel::ALL
        .into_iter()
        .map(|channel| {
            let sky = ctx.sky.rate(channel);
            let seconds = optimal_exposure_time(factor, ctx.read_noise, sky);
            let swamp_factor = seconds
                .finite()
                .map(|s| achieved_swamp_factor(s as f64, sky, ctx.read_noise));
            ChannelTime {
                channel,
                seconds,
                mmss: format_limit_seconds(seconds),
                swamp_factor,
                zone: swamp_factor.map(SwampZone::classify),
            }
        })
        .collect()
}

/// Additional noise of every channel at its probe duration
pub fn probe_penalties(ctx: &ExposureContext) -> Vec<ChannelPenalty> {
    Channel::ALL
        .into_iter()
        .map(|channel| {
            let duration_s = ctx.probe_durations.get(channel);
            ChannelPenalty {
                channel,
                duration_s,
                additional_noise: additional_noise_fraction(
                    duration_s,
                    ctx.sky.rate(channel),
                    ctx.read_noise,
                ),
            }
        })
        .collect()
}

/// Run the whole model for a context.
///
/// Returns `None` when read noise or conversion gain is not positive; callers keep
/// showing their previous result in that case.
pub fn evaluate(ctx: &ExposureContext) -> Option<EvaluationResult> {
    if !ctx.is_computable() {
        log::warn!(
            "Skipping evaluation: read noise {} and conversion gain {} must be positive",
            ctx.read_noise,
            ctx.conversion_gain
        );
        return None;
    }

    let tolerance_factor = noise_tolerance_factor(ctx.noise_percent);
    let comparisons = StrategyGroup::ALL
        .into_iter()
        .map(|group| {
            let pair = ctx.strategy(group);
            StrategyComparison::compare(group, pair.first_s, pair.second_s, ctx)
        })
        .collect();

    Some(EvaluationResult {
        swamp: swamp_summary(ctx),
        tolerance_factor,
        optimal_times: optimal_times(ctx, tolerance_factor),
        penalties: probe_penalties(ctx),
        comparisons,
        tables: vec![
            NoiseTable::build(Ladder::Broadband, ctx),
            NoiseTable::build(Ladder::Narrowband, ctx),
        ],
        dark_current: ctx.dark_current,
    })
}

/// Holds the most recent valid evaluation across edits.
#[derive(Debug, Default)]
pub struct ScenarioEvaluator {
    last: Option<EvaluationResult>,
}

impl ScenarioEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-evaluate; an invalid context keeps the previous result.
    pub fn update(&mut self, ctx: &ExposureContext) -> Option<&EvaluationResult> {
        if let Some(result) = evaluate(ctx) {
            self.last = Some(result);
        }
        self.last.as_ref()
    }

    pub fn last(&self) -> Option<&EvaluationResult> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_context_summary() {
        let result = evaluate(&ExposureContext::default()).unwrap();
        assert_eq!(result.swamp.median_at_min, 43);
        assert_eq!(result.swamp.median_at_chosen, 97);
        assert_eq!(result.swamp.median_at_max, 97);
        assert_eq!(result.tolerance_factor, Limit::Finite(9.8));
    }

    #[test]
    fn test_optimal_times_cover_all_channels() {
        let result = evaluate(&ExposureContext::default()).unwrap();
        assert_eq!(result.optimal_times.len(), 5);

        let l = result.optimal_time(Channel::L).unwrap();
        assert_eq!(l.seconds, Limit::Finite(11));
        assert_eq!(l.mmss, "00:11");
        // 11 * 1.76 / 1.890625 = 10.24
        assert_eq!(l.zone, Some(SwampZone::Saturated));

        // 9.8 * 1.890625 / 0.12 = 154.4 -> 155 s, SF = 155 * 0.12 / 1.890625 = 9.84
        let nb12 = result.optimal_time(Channel::Nb12).unwrap();
        assert_eq!(nb12.seconds, Limit::Finite(155));
        assert_eq!(nb12.zone, Some(SwampZone::Optimal));

        // 9.8 * 1.890625 / 0.03 = 617.6...
        let nb3 = result.optimal_time(Channel::Nb3).unwrap();
        assert_eq!(nb3.seconds, Limit::Finite(618));
        assert_eq!(nb3.mmss, "10:18");
    }

    #[test]
    fn test_zero_sky_gives_infinite_time() {
        let mut ctx = ExposureContext::default();
        ctx.sky.nb7 = 0.0;
        let result = evaluate(&ctx).unwrap();
        let nb7 = result.optimal_time(Channel::Nb7).unwrap();
        assert_eq!(nb7.seconds, Limit::Infinite);
        assert_eq!(nb7.mmss, crate::noise_model::DURATION_PLACEHOLDER);
        assert_eq!(nb7.zone, None);
        assert_eq!(result.penalty(Channel::Nb7).unwrap().additional_noise, 0.0);
    }

    #[test]
    fn test_zero_tolerance_gives_infinite_everywhere() {
        let mut ctx = ExposureContext::default();
        ctx.noise_percent = 0.0;
        let result = evaluate(&ctx).unwrap();
        assert!(result.tolerance_factor.is_infinite());
        assert!(result.optimal_times.iter().all(|t| t.seconds.is_infinite()));
    }

    #[test]
    fn test_strategy_comparison_delta_sign() {
        let ctx = ExposureContext::default();
        let result = evaluate(&ctx).unwrap();

        let l = result.comparison(StrategyGroup::L).unwrap();
        assert_eq!(l.first.duration_s, 120.0);
        assert_eq!(l.second.duration_s, 180.0);
        assert!(l.delta < 0.0);
        assert!(l.second_is_better());
        assert_relative_eq!(
            l.delta,
            l.second.additional_noise - l.first.additional_noise
        );

        let reversed = StrategyComparison::compare(StrategyGroup::Rgb, 180.0, 120.0, &ctx);
        assert!(reversed.delta > 0.0);
        assert!(!reversed.second_is_better());
    }

    #[test]
    fn test_tables_use_their_ladders() {
        let result = evaluate(&ExposureContext::default()).unwrap();

        let broadband = result.table(Ladder::Broadband).unwrap();
        assert_eq!(broadband.rows.len(), 2);
        assert_eq!(broadband.row(Channel::L).unwrap().cells.len(), BROADBAND_LADDER.len());

        let narrowband = result.table(Ladder::Narrowband).unwrap();
        assert_eq!(narrowband.rows.len(), 3);
        assert!(narrowband.row(Channel::L).is_none());
        let nb12 = narrowband.row(Channel::Nb12).unwrap();
        let durations: Vec<u32> = nb12.cells.iter().map(|c| c.duration_s).collect();
        assert_eq!(durations, NARROWBAND_LADDER.to_vec());
    }

    #[test]
    fn test_table_classification() {
        let result = evaluate(&ExposureContext::default()).unwrap();
        let row = result.table(Ladder::Broadband).unwrap().row(Channel::L).unwrap();

        // Short subs exceed 5 %, long subs are acceptable
        assert_eq!(row.cells[0].class, NoiseClass::Exceeds);
        assert_eq!(row.cells.last().unwrap().class, NoiseClass::Acceptable);
        for cell in &row.cells {
            let expected = if cell.additional_noise <= 0.05 {
                NoiseClass::Acceptable
            } else {
                NoiseClass::Exceeds
            };
            assert_eq!(cell.class, expected);
        }
    }

    #[test]
    fn test_classification_boundary_is_inclusive() {
        assert_eq!(NoiseClass::classify(0.05, 0.05), NoiseClass::Acceptable);
        assert_eq!(NoiseClass::classify(0.0500001, 0.05), NoiseClass::Exceeds);
    }

    #[test]
    fn test_curve_is_percent() {
        let table = NoiseTable::build(Ladder::Narrowband, &ExposureContext::default());
        let curve = table.row(Channel::Nb7).unwrap().curve();
        assert_eq!(curve.len(), NARROWBAND_LADDER.len());
        assert_eq!(curve[0].0, 100.0);
        let expected = additional_noise_fraction(100.0, 0.07, 1.375) * 100.0;
        assert_relative_eq!(curve[0].1, expected);
    }

    #[test]
    fn test_invalid_context_is_skipped() {
        let mut ctx = ExposureContext::default();
        ctx.conversion_gain = 0.0;
        assert!(evaluate(&ctx).is_none());

        ctx.conversion_gain = 0.244;
        ctx.read_noise = -1.0;
        assert!(evaluate(&ctx).is_none());
    }

    #[test]
    fn test_evaluator_keeps_last_valid_result() {
        let mut evaluator = ScenarioEvaluator::new();
        let mut ctx = ExposureContext::default();

        let first = evaluator.update(&ctx).cloned().unwrap();

        ctx.read_noise = 0.0;
        let stale = evaluator.update(&ctx).cloned().unwrap();
        assert_eq!(stale, first);

        ctx.read_noise = 3.25;
        let fresh = evaluator.update(&ctx).unwrap();
        assert_ne!(fresh, &first);
    }

    #[test]
    fn test_evaluation_is_reproducible() {
        let ctx = ExposureContext::default();
        assert_eq!(evaluate(&ctx), evaluate(&ctx));
    }
}
