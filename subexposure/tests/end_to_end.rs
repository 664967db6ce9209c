//! End-to-end checks of the noise model, scenario evaluation, camera catalog and export.

use approx::assert_relative_eq;
use subexposure::context::{Channel, ExposureContext, StrategyGroup};
use subexposure::export::{ExportDocument, DEFAULT_EXPORT_FILE};
use subexposure::hardware::{CameraIndex, SensorCatalog};
use subexposure::noise_model::{
    additional_noise_fraction, noise_tolerance_factor, optimal_exposure_time, target_median_adu,
    Limit,
};
use subexposure::scenario::{evaluate, Ladder, NoiseClass, ScenarioEvaluator};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn additional_noise_strictly_decreases_with_exposure() {
    let durations = [1.0, 4.0, 10.0, 60.0, 300.0, 2000.0, 10_000.0];
    for (sky, rn) in [(1.76, 1.375), (0.03, 3.25), (12.0, 0.7)] {
        for pair in durations.windows(2) {
            assert!(
                additional_noise_fraction(pair[0], sky, rn)
                    > additional_noise_fraction(pair[1], sky, rn),
                "not decreasing between {}s and {}s at sky {sky}, rn {rn}",
                pair[0],
                pair[1]
            );
        }
    }
}

#[test]
fn additional_noise_zero_cases() {
    for rn in [0.5, 1.375, 6.7] {
        assert_eq!(additional_noise_fraction(120.0, 0.0, rn), 0.0);
        assert_eq!(additional_noise_fraction(0.0, 1.76, rn), 0.0);
    }
}

#[test]
fn tolerance_factor_follows_formula() {
    assert_eq!(noise_tolerance_factor(0.0), Limit::Infinite);
    assert_eq!(noise_tolerance_factor(-3.0), Limit::Infinite);

    for p in [1.0, 2.0, 5.0, 10.0] {
        let exact = 1.0 / ((1.0 + p / 100.0_f64).powi(2) - 1.0);
        let expected = (exact * 10.0).round() / 10.0;
        assert_eq!(noise_tolerance_factor(p), Limit::Finite(expected));
    }
}

#[test]
fn optimal_time_scales_with_read_noise_and_sky() {
    let factor = noise_tolerance_factor(5.0);
    for (rn, sky) in [(1.375, 1.76), (3.25, 0.12), (0.8, 0.03)] {
        let base = optimal_exposure_time(factor, rn, sky).finite().unwrap();
        assert!(base > 0);

        let doubled_rn = optimal_exposure_time(factor, 2.0 * rn, sky).finite().unwrap();
        assert!(doubled_rn <= 4 * base && doubled_rn + 3 >= 4 * base);

        let doubled_sky = optimal_exposure_time(factor, rn, 2.0 * sky).finite().unwrap();
        assert!(2 * doubled_sky + 1 >= base && 2 * doubled_sky <= base + 1);
    }
}

#[test]
fn target_median_zero_gain_and_unscaled_16_bit() {
    assert_eq!(target_median_adu(10.0, 1.375, 0.0, 20, 16), 0);

    let expected = (10.0 * 1.375_f64.powi(2) / 0.244 + 20.0).floor() as i64;
    assert_eq!(target_median_adu(10.0, 1.375, 0.244, 20, 16), expected);
    assert_eq!(expected, 97);
}

#[test]
fn default_context_example() {
    init_logging();
    let ctx = ExposureContext::default();
    let result = evaluate(&ctx).unwrap();

    assert_eq!(result.tolerance_factor, Limit::Finite(9.8));
    assert_eq!(result.swamp.median_at_chosen, 97);

    let l = result.optimal_time(Channel::L).unwrap();
    assert_eq!(l.seconds, Limit::Finite(11));
    assert_eq!(l.mmss, "00:11");

    // 3 nm rate is derived from 12 nm
    assert_relative_eq!(ctx.sky.rate(Channel::Nb3), 0.03);
    assert_relative_eq!(result.dark_current, 0.0017);
}

#[test]
fn camera_resolution_example() {
    init_logging();
    let index = CameraIndex::builtin();
    let camera = index.resolve("ZWO", "ASI2600MM Pro  [IMX571]").unwrap();
    let preset = camera.sensor.default_preset();

    assert_eq!(preset.label, "Gain 0");
    assert_relative_eq!(preset.read_noise_e, 3.25);
    assert_relative_eq!(preset.conversion_gain, 0.75);
    assert_eq!(preset.offset_adu, 40);
    assert_eq!(camera.bit_depth(), 16);

    let mut ctx = ExposureContext::default();
    ctx.apply_camera(camera, "Gain 0", -10).unwrap();
    assert_relative_eq!(ctx.read_noise, 3.25);
    assert_relative_eq!(ctx.dark_current, 0.00075);
}

#[test]
fn catalog_indexes_every_camera() {
    let catalog = SensorCatalog::builtin();
    let index = CameraIndex::build(catalog).unwrap();

    let listed: usize = catalog.sensors().map(|s| s.camera_count()).sum();
    assert_eq!(index.len(), listed);

    let brands = index.brands();
    let mut sorted = brands.clone();
    sorted.sort();
    assert_eq!(brands, sorted);

    for brand in brands {
        for model in index.models(brand).unwrap() {
            let entry = index.resolve(brand, model).unwrap();
            assert!(catalog.lookup_sensor(&entry.sensor.id).is_ok());
        }
    }
}

#[test]
fn export_file_round_trip() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DEFAULT_EXPORT_FILE);

    let mut ctx = ExposureContext::default();
    ctx.sky.nb7 = 0.0;
    ctx.read_noise = 3.25;
    ctx.conversion_gain = 0.75;

    let doc = ExportDocument::from_context(&ctx);
    doc.save_to_file(&path).unwrap();
    let loaded = ExportDocument::load_from_file(&path).unwrap();

    assert_eq!(loaded, doc);
    assert_eq!(loaded.optimal_time(Channel::Nb7), Some(Limit::Infinite));
    assert_eq!(loaded.parameters.read_noise, 3.25);
    assert_eq!(loaded.parameters.sky_nb3, ctx.sky.nb3());
}

#[test]
fn edits_flow_through_evaluator() {
    init_logging();
    let mut ctx = ExposureContext::default();
    let mut evaluator = ScenarioEvaluator::new();
    let before = evaluator.update(&ctx).unwrap().clone();

    ctx.set_field("sky_l", "0.88").unwrap();
    let after = evaluator.update(&ctx).unwrap().clone();
    assert!(
        after.optimal_time(Channel::L).unwrap().seconds.finite()
            > before.optimal_time(Channel::L).unwrap().seconds.finite()
    );

    // An incomplete edit keeps the previous result visible
    ctx.set_field("conversion_gain", "0").unwrap();
    assert_eq!(evaluator.update(&ctx), Some(&after));
}

#[test]
fn non_finite_edits_never_reach_results() {
    init_logging();
    let mut ctx = ExposureContext::default();
    let mut evaluator = ScenarioEvaluator::new();
    let before = evaluator.update(&ctx).unwrap().clone();

    assert!(ctx.set_field("sky_l", "NaN").is_err());
    assert!(ctx.set_field("probe_l", "inf").is_err());
    assert_eq!(evaluator.update(&ctx), Some(&before));

    // Fields assigned directly bypass parsing; results must still stay finite
    ctx.sky.l = f64::NAN;
    ctx.probe_durations.set(Channel::Rgb, f64::INFINITY);
    let result = evaluate(&ctx).unwrap();
    assert_eq!(result.optimal_time(Channel::L).unwrap().seconds, Limit::Infinite);
    assert_eq!(result.penalty(Channel::L).unwrap().additional_noise, 0.0);
    assert_eq!(result.penalty(Channel::Rgb).unwrap().additional_noise, 0.0);
    for row in &result.table(Ladder::Broadband).unwrap().rows {
        assert!(row.cells.iter().all(|c| c.additional_noise.is_finite()));
    }

    ctx.read_noise = f64::INFINITY;
    assert!(evaluate(&ctx).is_none());
}

#[test]
fn tables_and_comparisons() {
    let ctx = ExposureContext::default();
    let result = evaluate(&ctx).unwrap();

    let broadband = result.table(Ladder::Broadband).unwrap();
    let l_row = broadband.row(Channel::L).unwrap();
    assert_eq!(l_row.cells.len(), 15);
    assert_eq!(l_row.cells[0].class, NoiseClass::Exceeds);
    assert_eq!(l_row.cells.last().unwrap().class, NoiseClass::Acceptable);

    let narrowband = result.table(Ladder::Narrowband).unwrap();
    assert_eq!(narrowband.rows.len(), 3);

    let l_cmp = result.comparison(StrategyGroup::L).unwrap();
    assert!(l_cmp.second_is_better());
    assert_relative_eq!(
        l_cmp.delta_percent(),
        l_cmp.delta * 100.0,
        epsilon = 1e-12
    );
}
