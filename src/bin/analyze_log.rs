//! CLI tool for analyzing experiment logs.
//!
//! Runs the full identification pipeline over a logged experiment and
//! prints the fitted gains.
//!
//! # Usage
//!
//! ```bash
//! analyze_log arm_test.json
//! analyze_log --config analysis.toml --dataset forward arm_test.json
//! analyze_log --loop velocity flywheel_test.json
//! ```

use std::env;
use std::fs;

use serde::Deserialize;

use yantra_sysid::{
    AnalysisManager, AnalysisSettings, DatasetKey, FeedbackControllerPreset, FeedbackGainMethod,
    FeedbackLoopType,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage(&args[0]);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

struct Config {
    log_path: String,
    settings_path: Option<String>,
    dataset: Option<String>,
    loop_type: Option<String>,
}

fn parse_args(args: &[String]) -> Result<Config, String> {
    let mut log_path = None;
    let mut settings_path = None;
    let mut dataset = None;
    let mut loop_type = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                settings_path = Some(
                    args.get(i)
                        .ok_or("--config requires a file argument")?
                        .clone(),
                );
            }
            "--dataset" | "-d" => {
                i += 1;
                dataset = Some(args.get(i).ok_or("--dataset requires a name")?.clone());
            }
            "--loop" | "-l" => {
                i += 1;
                loop_type = Some(
                    args.get(i)
                        .ok_or("--loop requires position or velocity")?
                        .clone(),
                );
            }
            "--help" | "-h" => {
                return Err("Help requested".to_string());
            }
            arg if !arg.starts_with('-') => {
                if log_path.is_some() {
                    return Err("Multiple log files specified".to_string());
                }
                log_path = Some(arg.to_string());
            }
            _ => {
                return Err(format!("Unknown argument: {}", args[i]));
            }
        }
        i += 1;
    }

    let log_path = log_path.ok_or("Missing log file argument")?;

    Ok(Config {
        log_path,
        settings_path,
        dataset,
        loop_type,
    })
}

fn print_usage(program: &str) {
    eprintln!(
        r#"
Usage: {} [OPTIONS] <LOG_FILE>

Fit feedforward and feedback gains from an experiment log.

OPTIONS:
    -c, --config <FILE>     Analysis settings overlay (TOML)
    -d, --dataset <NAME>    Dataset to fit (default: combined)
    -l, --loop <TYPE>       Feedback loop: position or velocity
    -h, --help              Show this help message

EXAMPLES:
    {} arm_test.json
    {} --dataset "left combined" drivetrain_test.json
"#,
        program, program, program
    );
}

/// Optional overrides loaded from a TOML settings file.
///
/// Absent keys keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    motion_threshold: Option<f64>,
    window_size: Option<usize>,
    step_test_duration: Option<f64>,
    velocity_threshold: Option<f64>,
    preset: Option<String>,
    gain_method: Option<String>,
    q_position: Option<f64>,
    q_velocity: Option<f64>,
    max_effort: Option<f64>,
    convert_gains_to_enc_ticks: Option<bool>,
    gearing: Option<f64>,
    cpr: Option<f64>,
    dataset: Option<String>,
    loop_type: Option<String>,
}

fn preset_from_name(name: &str) -> Result<FeedbackControllerPreset, String> {
    match name.trim().to_ascii_lowercase().as_str() {
        "voltage" => Ok(FeedbackControllerPreset::voltage()),
        "software" => Ok(FeedbackControllerPreset::software()),
        "embedded" => Ok(FeedbackControllerPreset::embedded()),
        _ => Err(format!(
            "unknown preset {name:?} (expected voltage, software, or embedded)"
        )),
    }
}

/// Settings plus the step-duration override, which must be applied after
/// construction (the manager learns an initial duration from the data).
fn build_settings(
    config: &Config,
) -> Result<(AnalysisSettings, Option<f64>), Box<dyn std::error::Error>> {
    let mut settings = AnalysisSettings::default();
    let mut step_test_duration = None;

    if let Some(path) = &config.settings_path {
        let contents = fs::read_to_string(path)?;
        let file: SettingsFile = basic_toml::from_str(&contents)?;
        log::info!("loaded settings overlay from {}", path);

        if let Some(v) = file.motion_threshold {
            settings.motion_threshold = v;
        }
        if let Some(v) = file.window_size {
            settings.window_size = v;
        }
        if let Some(v) = file.step_test_duration {
            step_test_duration = Some(v);
        }
        if let Some(v) = file.velocity_threshold {
            settings.velocity_threshold = v;
        }
        if let Some(name) = &file.preset {
            settings.preset = preset_from_name(name)?;
        }
        if let Some(name) = &file.gain_method {
            settings.gain_method = FeedbackGainMethod::from_name(name)?;
        }
        if let Some(v) = file.q_position {
            settings.lqr.q_position = v;
        }
        if let Some(v) = file.q_velocity {
            settings.lqr.q_velocity = v;
        }
        if let Some(v) = file.max_effort {
            settings.lqr.max_effort = v;
        }
        if let Some(v) = file.convert_gains_to_enc_ticks {
            settings.convert_gains_to_enc_ticks = v;
        }
        if let Some(v) = file.gearing {
            settings.gearing = v;
        }
        if let Some(v) = file.cpr {
            settings.cpr = v;
        }
        if let Some(name) = &file.dataset {
            settings.dataset = DatasetKey::from_name(name)?;
        }
        if let Some(name) = &file.loop_type {
            settings.loop_type = FeedbackLoopType::from_name(name)?;
        }
    }

    // Command line beats the settings file.
    if let Some(name) = &config.dataset {
        settings.dataset = DatasetKey::from_name(name)?;
    }
    if let Some(name) = &config.loop_type {
        settings.loop_type = FeedbackLoopType::from_name(name)?;
    }

    Ok((settings, step_test_duration))
}

fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let (settings, step_test_duration) = build_settings(&config)?;
    let dataset_key = settings.dataset;
    let loop_type = settings.loop_type;
    let gain_method = settings.gain_method;

    let mut manager = AnalysisManager::from_file(&config.log_path, settings)?;
    if let Some(duration) = step_test_duration {
        manager.settings_mut().step_test_duration = duration;
        manager.prepare_data()?;
    }
    let gains = manager.calculate()?;

    println!("Mechanism Characterization");
    println!("==========================");
    println!("File: {}", config.log_path);
    println!();

    println!("Test Information:");
    println!("  Mechanism: {}", manager.mechanism());
    println!("  Units: {}", manager.unit());
    println!("  Units per rotation: {}", manager.units_per_rotation());
    println!("  Dataset: {}", dataset_key);
    println!("  Step test duration: {:.3} s", manager.settings().step_test_duration);
    println!();

    if let Some(dataset) = manager.filtered_dataset(dataset_key) {
        println!("Dataset Sizes:");
        println!("  Quasistatic points: {}", dataset.quasistatic.len());
        println!("  Dynamic points: {}", dataset.dynamic.len());
        println!();
    }

    let ff = &gains.feedforward;
    println!("Feedforward Gains:");
    println!("  Ks: {:>10.5} V", ff.ks());
    if let Some(kg) = ff.kg() {
        println!("  Kg: {:>10.5} V", kg);
    }
    if let Some(kcos) = ff.kcos() {
        println!("  Kcos: {:>8.5} V", kcos);
    }
    println!("  Kv: {:>10.5} V/(unit/s)", ff.kv());
    println!("  Ka: {:>10.5} V/(unit/s^2)", ff.ka());
    println!("  RMSE: {:>8.5} V", ff.rmse);
    println!("  r^2: {:>9.5}", ff.r_squared);
    println!();

    println!("Feedback Gains ({:?} loop, {:?}):", loop_type, gain_method);
    println!("  Kp: {:>10.5}", gains.feedback.kp);
    println!("  Kd: {:>10.5}", gains.feedback.kd);

    if let Some(track_width) = gains.track_width {
        println!();
        println!("Track Width: {:.4} units", track_width);
    }

    Ok(())
}
