//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - reads curves and traces
//! - runs the fit pipeline (single or batch)
//! - prints page summaries
//! - writes optional exports

use clap::Parser;

use crate::cli::{BatchArgs, Command, FitArgs, FitOptions, SimulateArgs};
use crate::data::simulate::{SimulationConfig, simulate};
use crate::domain::{Background, CropInterval, FitConfig};
use crate::error::AppError;
use crate::io::export::{default_labels, statistics_table, write_series_csv, write_statistics_tsv};
use crate::report::{PageInfo, format_fit_line, format_info, format_models};

pub mod pipeline;

/// Entry point for the `fcsfit` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Batch(args) => handle_batch(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Models => {
            print!("{}", format_models());
            Ok(())
        }
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let mut config = fit_config_from_args(&args.options);
    config.export_curve = args.export_curve.clone();
    if config.title.is_none() {
        config.title = args.data.file_name().map(|n| n.to_string_lossy().into_owned());
    }

    let (data, traces) = pipeline::load_inputs(&args.data, &args.trace)?;
    let run = pipeline::run_fit(1, data, traces, &config)?;

    println!("{}", format_info(&run.info));
    Ok(())
}

fn handle_batch(args: BatchArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args.options);
    let items = pipeline::run_batch(&args.files, &args.trace, &config)?;

    let mut infos: Vec<PageInfo> = Vec::new();
    let mut first_error: Option<AppError> = None;
    for item in items {
        let label = item.path.display().to_string();
        match item.outcome {
            Ok(mut run) => {
                println!("{}", format_fit_line(&label, config.model, &run.result));
                run.info.title.user_title = label;
                infos.push(run.info);
            }
            Err(err) => {
                eprintln!("{label}: {err}");
                first_error.get_or_insert(err);
            }
        }
    }

    if let (Some(path), Some(first)) = (&args.stats, infos.first()) {
        let labels = default_labels(first);
        let table = statistics_table(&infos, config.model.id(), &labels);
        write_statistics_tsv(path, &table)?;
        log::info!("Wrote statistics for {} pages to {}", table.rows.len(), path.display());
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let mut sim = SimulationConfig::new(args.model);
    if let Some(values) = args.values {
        sim.values = values;
    }
    sim.seed = args.seed;
    sim.noise = args.noise;
    sim.channels = args.channels;
    sim.count_rate = args.count_rate;
    sim.background_rate = args.bg_rate;

    let data = simulate(&sim)?;
    write_series_csv(&args.out, &data.correlation, "tau [ms]", "G(tau)")?;
    println!("Wrote {} channels to {}", data.correlation.len(), args.out.display());
    if let Some(path) = &args.trace_out {
        write_series_csv(path, &data.trace, "time [s]", "count rate [kHz]")?;
        println!("Wrote trace to {}", path.display());
    }
    Ok(())
}

pub fn fit_config_from_args(args: &FitOptions) -> FitConfig {
    let crop = match (args.start, args.end) {
        (None, None) => None,
        // `usize::MAX` marks an open end, resolved against the data length.
        (start, end) => Some(CropInterval::new(start.unwrap_or(0), end.unwrap_or(usize::MAX))),
    };

    FitConfig {
        model: args.model,
        values: args.values.clone(),
        fit_mask: args.fit_mask.clone(),
        crop,
        weighting: args.weighting.clone(),
        window_halfwidth: args.halfwidth,
        background: args.bg_rate.map(|rate| Background {
            name: args.bg_name.clone(),
            rate,
        }),
        title: args.title.clone(),
        optimizer: args.optimizer,
        max_iterations: args.max_iterations,
        export_curve: None,
    }
}
