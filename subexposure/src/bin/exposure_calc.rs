//! Command line front end for the sub-exposure calculator.
//!
//! Subcommands:
//! - `swamp-factor`: target sky median for a swamp factor
//! - `optimal-time`: recommended sub length per filter
//! - `additional-noise`: noise penalty of a given sub length
//! - `table`: noise penalty over the standard duration ladders
//! - `compare`: weigh two sub lengths against each other
//! - `export`: write all computed values to JSON
//! - `cameras` / `resolve`: browse the built-in camera catalog
//! - `watch`: interactive editing from stdin with debounced recompute
//! - `check-update`: look for a newer release

use std::error::Error;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use itertools::Itertools;
use shared::recompute::{Debouncer, DEFAULT_QUIET_PERIOD};
use shared::update_check::{HttpVersionSource, UpdateChecker, UpdateHandle, UpdateStatus};
use subexposure::context::{Channel, ExposureContext, StrategyGroup};
use subexposure::export::{ExportDocument, DEFAULT_EXPORT_FILE};
use subexposure::hardware::CameraIndex;
use subexposure::noise_model::{additional_noise_fraction, format_seconds, Limit};
use subexposure::scenario::{evaluate, EvaluationResult, Ladder, NoiseClass, ScenarioEvaluator};
use subexposure::shared_args::{parse_channel, parse_non_negative, CatalogArgs, SharedCalcArgs};

/// Raw file whose `__version__` line carries the latest release
const UPDATE_URL: &str =
    "https://raw.githubusercontent.com/NGC4565/ExposureCalculator/main/ExposureCalculator.py";

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "exposure_calc")]
#[command(about = "Sub-exposure time calculator for astronomical imaging")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Target sky-background median (ADU) for the chosen swamp factor
    SwampFactor {
        #[command(flatten)]
        calc: SharedCalcArgs,
    },

    /// Recommended sub length per filter for the accepted additional noise
    OptimalTime {
        #[command(flatten)]
        calc: SharedCalcArgs,
    },

    /// Additional noise of a sub length compared with an ideal sensor
    AdditionalNoise {
        #[command(flatten)]
        calc: SharedCalcArgs,

        /// Only this channel (L, RGB, NB12, NB7, NB3)
        #[arg(long, value_parser = parse_channel)]
        channel: Option<Channel>,

        /// Sub length in seconds; defaults to each channel's probe duration
        #[arg(long, value_parser = parse_non_negative)]
        duration: Option<f64>,
    },

    /// Additional noise over the standard duration ladders
    Table {
        #[command(flatten)]
        calc: SharedCalcArgs,

        /// Print chart points as CSV (channel,seconds,percent)
        #[arg(long)]
        csv: bool,
    },

    /// Compare two sub lengths for L and RGB
    Compare {
        #[command(flatten)]
        calc: SharedCalcArgs,

        /// First L strategy (s)
        #[arg(long)]
        l1: Option<f64>,

        /// Second L strategy (s)
        #[arg(long)]
        l2: Option<f64>,

        /// First RGB strategy (s)
        #[arg(long)]
        rgb1: Option<f64>,

        /// Second RGB strategy (s)
        #[arg(long)]
        rgb2: Option<f64>,
    },

    /// Write parameters and results to a JSON file
    Export {
        #[command(flatten)]
        calc: SharedCalcArgs,

        /// Output file
        #[arg(short, long, default_value = DEFAULT_EXPORT_FILE)]
        output: PathBuf,

        /// Print the document instead of writing a file
        #[arg(long)]
        stdout: bool,
    },

    /// List camera brands, or the models of one brand
    Cameras {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Brand to list models for
        #[arg(long)]
        brand: Option<String>,
    },

    /// Show a camera's sensor, gain presets and dark current
    Resolve {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Camera brand
        #[arg(long)]
        brand: String,

        /// Camera model (bare name or full display key)
        #[arg(long)]
        model: String,

        /// Estimate dark current at this temperature (°C)
        #[arg(long, allow_hyphen_values = true)]
        temperature: Option<i32>,
    },

    /// Edit inputs as `field=value` lines on stdin and recompute as you type
    Watch {
        #[command(flatten)]
        calc: SharedCalcArgs,

        /// Quiet period before recomputing, in milliseconds
        #[arg(long, default_value_t = DEFAULT_QUIET_PERIOD.as_millis() as u64)]
        quiet_ms: u64,

        /// Skip the background update check
        #[arg(long)]
        no_update_check: bool,

        /// Where to look for the latest version
        #[arg(long, default_value = UPDATE_URL)]
        update_url: String,
    },

    /// Check whether a newer release is available
    CheckUpdate {
        /// Where to look for the latest version
        #[arg(long, default_value = UPDATE_URL)]
        update_url: String,

        /// Request timeout in seconds, at most 10
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=10))]
        timeout_secs: u64,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Command::SwampFactor { calc } => cmd_swamp_factor(&calc.to_context()?),
        Command::OptimalTime { calc } => cmd_optimal_time(&calc.to_context()?),
        Command::AdditionalNoise {
            calc,
            channel,
            duration,
        } => cmd_additional_noise(&calc.to_context()?, channel, duration),
        Command::Table { calc, csv } => cmd_table(&calc.to_context()?, csv),
        Command::Compare {
            calc,
            l1,
            l2,
            rgb1,
            rgb2,
        } => {
            let mut ctx = calc.to_context()?;
            for (value, field) in [
                (l1, "strategy_l1"),
                (l2, "strategy_l2"),
                (rgb1, "strategy_rgb1"),
                (rgb2, "strategy_rgb2"),
            ] {
                if let Some(v) = value {
                    ctx.set_field(field, &v.to_string())?;
                }
            }
            cmd_compare(&ctx)
        }
        Command::Export {
            calc,
            output,
            stdout,
        } => cmd_export(&calc.to_context()?, &output, stdout),
        Command::Cameras { catalog, brand } => {
            catalog.with_catalog(|c| cmd_cameras(c, brand.as_deref()))?
        }
        Command::Resolve {
            catalog,
            brand,
            model,
            temperature,
        } => catalog.with_catalog(|c| cmd_resolve(c, &brand, &model, temperature))?,
        Command::Watch {
            calc,
            quiet_ms,
            no_update_check,
            update_url,
        } => cmd_watch(
            calc.to_context()?,
            Duration::from_millis(quiet_ms),
            (!no_update_check).then_some(update_url),
        ),
        Command::CheckUpdate {
            update_url,
            timeout_secs,
        } => cmd_check_update(&update_url, Duration::from_secs(timeout_secs)),
    }
}

fn evaluated(ctx: &ExposureContext) -> Result<EvaluationResult, Box<dyn Error>> {
    evaluate(ctx).ok_or_else(|| "read noise and conversion gain must be positive".into())
}

fn cmd_swamp_factor(ctx: &ExposureContext) -> Result<(), Box<dyn Error>> {
    let swamp = evaluated(ctx)?.swamp;

    println!(
        "Sensor: RN {} e-, gain {} e-/ADU, offset {} ADU, {} bit",
        ctx.read_noise, ctx.conversion_gain, ctx.offset_adu, ctx.bit_depth
    );
    println!(
        "Swamp factor {}: target sky median {} ADU",
        swamp.swamp_factor, swamp.median_at_chosen
    );
    println!(
        "Optimal window: {} ADU (SF 3) .. {} ADU (SF 10)",
        swamp.median_at_min, swamp.median_at_max
    );
    Ok(())
}

fn print_optimal_times(result: &EvaluationResult, noise_percent: f64) {
    println!(
        "Accepted additional noise {}% -> factor {}",
        noise_percent, result.tolerance_factor
    );
    println!(
        "{:<10} {:>8} {:>7} {:>8}  {}",
        "Channel", "Time (s)", "mm:ss", "SF", "Zone"
    );
    for time in &result.optimal_times {
        let seconds = match time.seconds {
            Limit::Finite(s) => s.to_string(),
            Limit::Infinite => "inf".to_string(),
        };
        let swamp = time
            .swamp_factor
            .map(|sf| format!("{sf:.1}"))
            .unwrap_or_else(|| "-".to_string());
        let zone = time
            .zone
            .map(|z| z.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:>8} {:>7} {:>8}  {}",
            time.channel.to_string(),
            seconds,
            time.mmss,
            swamp,
            zone
        );
    }
}

fn cmd_optimal_time(ctx: &ExposureContext) -> Result<(), Box<dyn Error>> {
    let result = evaluated(ctx)?;
    print_optimal_times(&result, ctx.noise_percent);
    Ok(())
}

fn cmd_additional_noise(
    ctx: &ExposureContext,
    channel: Option<Channel>,
    duration: Option<f64>,
) -> Result<(), Box<dyn Error>> {
    if !ctx.is_computable() {
        return Err("read noise and conversion gain must be positive".into());
    }

    let channels = channel.map(|c| vec![c]).unwrap_or_else(|| Channel::ALL.to_vec());
    for channel in channels {
        let duration_s = duration.unwrap_or_else(|| ctx.probe_durations.get(channel));
        let noise = additional_noise_fraction(duration_s, ctx.sky.rate(channel), ctx.read_noise);
        println!(
            "{:<10} {:>7} s ({})  +{:.3}%",
            channel.to_string(),
            duration_s,
            format_seconds(duration_s),
            noise * 100.0
        );
    }
    Ok(())
}

fn cmd_table(ctx: &ExposureContext, csv: bool) -> Result<(), Box<dyn Error>> {
    let result = evaluated(ctx)?;

    if csv {
        println!("channel,seconds,percent");
        for table in &result.tables {
            for row in &table.rows {
                for (seconds, percent) in row.curve() {
                    println!("{},{},{:.4}", row.channel.key(), seconds, percent);
                }
            }
        }
        return Ok(());
    }

    for ladder in [Ladder::Broadband, Ladder::Narrowband] {
        let Some(table) = result.table(ladder) else {
            continue;
        };
        println!(
            "\n{:?} (threshold {}%, * = exceeds)",
            ladder,
            ctx.noise_percent
        );
        println!(
            "{:<10} {}",
            "Time (s)",
            ladder.durations().iter().map(|d| format!("{d:>7}")).join(" ")
        );
        for row in &table.rows {
            let cells = row
                .cells
                .iter()
                .map(|cell| {
                    let marker = match cell.class {
                        NoiseClass::Acceptable => ' ',
                        NoiseClass::Exceeds => '*',
                    };
                    format!("{:>6.2}{}", cell.additional_noise * 100.0, marker)
                })
                .join(" ");
            println!("{:<10} {}", row.channel.to_string(), cells);
        }
    }
    Ok(())
}

fn cmd_compare(ctx: &ExposureContext) -> Result<(), Box<dyn Error>> {
    let result = evaluated(ctx)?;

    for group in StrategyGroup::ALL {
        let Some(cmp) = result.comparison(group) else {
            continue;
        };
        println!("{}:", group.channel());
        println!(
            "  Strategy 1: {} s  +{:.3}%",
            cmp.first.duration_s,
            cmp.first.additional_noise * 100.0
        );
        println!(
            "  Strategy 2: {} s  +{:.3}%",
            cmp.second.duration_s,
            cmp.second.additional_noise * 100.0
        );
        println!(
            "  Delta SNR: {:+.4}%{}",
            cmp.delta_percent(),
            if cmp.second_is_better() {
                "  (strategy 2 better)"
            } else {
                ""
            }
        );
    }
    Ok(())
}

fn cmd_export(
    ctx: &ExposureContext,
    output: &std::path::Path,
    stdout: bool,
) -> Result<(), Box<dyn Error>> {
    let doc = ExportDocument::from_context(ctx);
    if stdout {
        println!("{}", doc.to_json_pretty()?);
    } else {
        doc.save_to_file(output)?;
        println!("Results exported to {}", output.display());
    }
    Ok(())
}

fn cmd_cameras(
    catalog: &subexposure::hardware::SensorCatalog,
    brand: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let index = CameraIndex::build(catalog)?;

    match brand {
        Some(brand) => {
            for model in index.models(brand)? {
                println!("{model}");
            }
        }
        None => {
            for brand in index.brands() {
                println!("{:<12} {} models", brand, index.entries(brand).count());
            }
            println!(
                "{} cameras ({} sensors)",
                index.len(),
                catalog.len()
            );
        }
    }
    Ok(())
}

fn cmd_resolve(
    catalog: &subexposure::hardware::SensorCatalog,
    brand: &str,
    model: &str,
    temperature: Option<i32>,
) -> Result<(), Box<dyn Error>> {
    let index = CameraIndex::build(catalog)?;
    let camera = index.resolve(brand, model)?;

    println!("{} {}", camera.brand, camera.key);
    println!("Sensor {} ({} bit)", camera.sensor.id, camera.bit_depth());
    println!("Gain presets:");
    for preset in camera.gain_presets() {
        println!(
            "  {:<18} RN {:>5} e-  gain {:>5} e-/ADU  offset {:>3}  full well {} e-",
            preset.label,
            preset.read_noise_e,
            preset.conversion_gain,
            preset.offset_adu,
            preset.full_well_e
        );
    }
    println!("Dark current:");
    for (temp_c, rate) in camera.dark_current().iter() {
        println!("  {temp_c:>4} °C  {rate} e-/s/px");
    }

    if let Some(temp_c) = temperature {
        let curve = camera.dark_current();
        let estimate = curve
            .estimate_at(temp_c)
            .ok_or("sensor has no dark current data")?;
        let source = if curve.at(temp_c).is_some() {
            "tabulated"
        } else {
            "estimated"
        };
        println!("At {temp_c} °C: {estimate:.6} e-/s/px ({source})");
    }
    Ok(())
}

fn print_watch_summary(result: &EvaluationResult, ctx: &ExposureContext) {
    println!(
        "SF {}: target median {} ADU (SF 3: {}, SF 10: {})",
        result.swamp.swamp_factor,
        result.swamp.median_at_chosen,
        result.swamp.median_at_min,
        result.swamp.median_at_max
    );
    print_optimal_times(result, ctx.noise_percent);
}

fn report_update(status: UpdateStatus) {
    match status {
        UpdateStatus::Available { current, remote } => {
            println!("A newer version is available: {remote} (running {current})");
        }
        UpdateStatus::UpToDate { .. } => log::info!("Running the latest version"),
        UpdateStatus::Unavailable(reason) => log::debug!("Update check unavailable: {reason}"),
    }
}

fn cmd_watch(
    mut ctx: ExposureContext,
    quiet: Duration,
    update_url: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let mut update: Option<UpdateHandle> = update_url
        .map(|url| UpdateChecker::spawn(HttpVersionSource::new(url), CURRENT_VERSION));

    let mut evaluator = ScenarioEvaluator::new();
    if let Some(result) = evaluator.update(&ctx) {
        print_watch_summary(result, &ctx);
    }

    let debouncer = Debouncer::spawn(quiet, move |ctx: ExposureContext| {
        match evaluator.update(&ctx) {
            Some(result) => print_watch_summary(result, &ctx),
            None => println!("(inputs incomplete, showing nothing new)"),
        }
    })?;

    println!("Enter field=value edits (e.g. sky_l=2.1, read_noise=3.25); 'quit' to stop.");
    for line in io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();

        if let Some(handle) = &update {
            if let Some(status) = handle.try_status() {
                report_update(status);
                update = None;
            }
        }

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        let Some((field, value)) = line.split_once('=') else {
            eprintln!("Expected field=value, got {line:?}");
            continue;
        };
        match ctx.set_field(field, value) {
            Ok(()) => {
                debouncer.submit(ctx.clone());
            }
            Err(e) => eprintln!("{e}"),
        }
    }

    drop(debouncer);

    if let Some(status) = update.and_then(|handle| handle.try_status()) {
        report_update(status);
    }
    Ok(())
}

fn cmd_check_update(url: &str, timeout: Duration) -> Result<(), Box<dyn Error>> {
    let source = HttpVersionSource::new(url).with_timeout(timeout);
    log::info!("Checking {} for updates", source.url());

    let handle = UpdateChecker::spawn(source, CURRENT_VERSION);
    match handle.wait_status(timeout + Duration::from_secs(1)) {
        Some(UpdateStatus::Available { current, remote }) => {
            println!("Update available: {remote} (running {current})");
        }
        Some(UpdateStatus::UpToDate { current }) => println!("Up to date ({current})"),
        Some(UpdateStatus::Unavailable(reason)) => {
            println!("Could not check for updates: {reason}");
        }
        None => println!("Could not check for updates: no answer within {timeout:?}"),
    }
    Ok(())
}
