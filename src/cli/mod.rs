//! Command-line parsing for the FCS curve fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting code.

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};

use crate::domain::OptimizerKind;
use crate::models::ModelKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "fcsfit", version, about = "Weighted fitting of FCS correlation curves")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit one correlation curve and print the page summary.
    Fit(FitArgs),
    /// Fit several curves in parallel and optionally write a statistics table.
    Batch(BatchArgs),
    /// Write a synthetic correlation curve (and trace) for a model.
    Simulate(SimulateArgs),
    /// List the built-in models with their parameters.
    Models,
}

/// Options for a single fit.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Correlation curve: two columns, lag time [ms] and G(τ).
    #[arg(long, value_name = "FILE")]
    pub data: PathBuf,

    /// Intensity trace (time, count rate [kHz]); repeat for cross-correlation.
    #[arg(long, value_name = "FILE")]
    pub trace: Vec<PathBuf>,

    #[command(flatten)]
    pub options: FitOptions,

    /// Export the fitted page (parameters + curves) to JSON.
    #[arg(long = "export-curve", value_name = "JSON")]
    pub export_curve: Option<PathBuf>,
}

/// Options for fitting several curves.
#[derive(Debug, Args, Clone)]
pub struct BatchArgs {
    /// Correlation curve files.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Intensity traces, one per curve file in the same order.
    #[arg(long, value_name = "FILE")]
    pub trace: Vec<PathBuf>,

    #[command(flatten)]
    pub options: FitOptions,

    /// Write a tab-separated statistics table of all pages.
    #[arg(long, value_name = "TSV")]
    pub stats: Option<PathBuf>,
}

/// Fit settings shared by `fit` and `batch`.
#[derive(Debug, Args, Clone)]
pub struct FitOptions {
    /// Model id.
    #[arg(long, value_enum, default_value = "6012", env = "FCSFIT_MODEL")]
    pub model: ModelKind,

    /// First fitted channel (inclusive).
    #[arg(long)]
    pub start: Option<usize>,

    /// Last fitted channel (exclusive).
    #[arg(long)]
    pub end: Option<usize>,

    /// Weighting: none, splineN (e.g. spline5) or model-function.
    #[arg(long, default_value = "none", env = "FCSFIT_WEIGHTING")]
    pub weighting: String,

    /// Variance window half-width n (window of 2n+1 channels).
    #[arg(long, default_value_t = 3, env = "FCSFIT_HALFWIDTH")]
    pub halfwidth: usize,

    /// Background count rate [kHz].
    #[arg(long = "bg-rate")]
    pub bg_rate: Option<f64>,

    /// Name of the background measurement.
    #[arg(long = "bg-name", default_value = "background")]
    pub bg_name: String,

    /// Initial parameter values, comma separated (model defaults otherwise).
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub values: Option<Vec<f64>>,

    /// Fit flags, comma separated (e.g. 1,1,0).
    #[arg(long = "fit", value_delimiter = ',', value_parser = BoolishValueParser::new())]
    pub fit_mask: Option<Vec<bool>>,

    /// Least-squares backend.
    #[arg(long, value_enum, default_value = "lm", env = "FCSFIT_OPTIMIZER")]
    pub optimizer: OptimizerKind,

    /// Optimizer iteration cap.
    #[arg(long, default_value_t = 200, env = "FCSFIT_MAX_ITER")]
    pub max_iterations: usize,

    /// Page title shown in summaries.
    #[arg(long)]
    pub title: Option<String>,
}

/// Options for writing a synthetic measurement.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output correlation curve file.
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,

    #[arg(long, value_enum, default_value = "6012")]
    pub model: ModelKind,

    /// Parameter values, comma separated (model defaults otherwise).
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub values: Option<Vec<f64>>,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Relative noise level.
    #[arg(long, default_value_t = 0.01)]
    pub noise: f64,

    /// Number of lag-time channels.
    #[arg(long, default_value_t = 150)]
    pub channels: usize,

    /// Output intensity trace file.
    #[arg(long = "trace-out", value_name = "FILE")]
    pub trace_out: Option<PathBuf>,

    /// Mean count rate [kHz] of the trace.
    #[arg(long = "count-rate", default_value_t = 100.0)]
    pub count_rate: f64,

    /// Background count rate [kHz] contained in the signal.
    #[arg(long = "bg-rate")]
    pub bg_rate: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_command_parses_lists() {
        let cli = Cli::try_parse_from([
            "fcsfit", "fit", "--data", "g.csv", "--model", "6001", "--values", "4,0.4,0", "--fit", "1,0,0",
            "--weighting", "spline5",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.options.model, ModelKind::Diffusion2d);
        assert_eq!(args.options.values, Some(vec![4.0, 0.4, 0.0]));
        assert_eq!(args.options.fit_mask, Some(vec![true, false, false]));
        assert_eq!(args.options.weighting, "spline5");
        assert!(args.trace.is_empty());
    }

    #[test]
    fn batch_requires_files() {
        assert!(Cli::try_parse_from(["fcsfit", "batch"]).is_err());
        let cli = Cli::try_parse_from(["fcsfit", "batch", "a.csv", "b.csv", "--stats", "s.tsv"]).unwrap();
        let Command::Batch(args) = cli.command else {
            panic!("expected batch");
        };
        assert_eq!(args.files.len(), 2);
    }

    #[test]
    fn model_aliases_are_accepted() {
        let cli = Cli::try_parse_from(["fcsfit", "simulate", "--out", "x.csv", "--model", "diffusion-2d"]).unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.model, ModelKind::Diffusion2d);
    }
}
