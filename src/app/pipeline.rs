//! Shared "fit pipeline" logic used by the `fit` and `batch` commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! ingest -> page setup -> background correction -> weighted fit -> refresh -> page info
//!
//! The commands can then focus on presentation and exports.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::domain::{BackgroundTable, CropInterval, FitConfig, FitResult, OptimizerKind, Series, WeightingMode};
use crate::error::AppError;
use crate::fit::lbfgs::Lbfgs;
use crate::fit::optimizer::{LevenbergMarquardt, Optimizer};
use crate::fit::page::{CurveView, Page};
use crate::io::curve::{CurveFile, write_curve_json};
use crate::io::ingest::load_series;
use crate::report::PageInfo;

/// All computed outputs of a single fit.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub page: Page,
    pub backgrounds: BackgroundTable,
    pub result: FitResult,
    pub view: CurveView,
    pub info: PageInfo,
}

/// Outcome of one file of a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub path: PathBuf,
    pub outcome: Result<RunOutput, AppError>,
}

/// Load a correlation curve and its traces.
pub fn load_inputs(data: &Path, traces: &[PathBuf]) -> Result<(Series, Vec<Series>), AppError> {
    let curve = load_series(data)?.series;
    let traces = traces
        .iter()
        .map(|path| load_series(path).map(|i| i.series))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((curve, traces))
}

/// Set up a page for `data` according to `config`.
pub fn build_page(
    counter: usize,
    data: Series,
    traces: Vec<Series>,
    config: &FitConfig,
) -> Result<(Page, BackgroundTable), AppError> {
    let model = config.model;
    let len = data.len();
    let mut page = Page::new(counter, model, data.x().to_vec());
    page.set_data(data);
    page.set_traces(traces);

    let values = config.values.clone().unwrap_or_else(|| model.default_values());
    let fit_mask = config.fit_mask.clone().unwrap_or_else(|| model.default_fit_mask());
    page.apply_parameters(values, fit_mask)?;

    let mut backgrounds = BackgroundTable::new();
    if let Some(bg) = &config.background {
        page.background = Some(backgrounds.push(bg.name.clone(), bg.rate));
    }

    // An open-ended interval runs to the last channel.
    page.crop = config
        .crop
        .map(|c| if c.end == usize::MAX { CropInterval::new(c.start, len) } else { c });
    page.weighting = config.weighting.parse::<WeightingMode>()?;
    page.window_halfwidth = config.window_halfwidth;
    if let Some(title) = &config.title {
        page.title = title.clone();
    }

    Ok((page, backgrounds))
}

/// Execute the full fitting pipeline for one curve.
pub fn run_fit(counter: usize, data: Series, traces: Vec<Series>, config: &FitConfig) -> Result<RunOutput, AppError> {
    let (mut page, backgrounds) = build_page(counter, data, traces, config)?;

    let optimizer = optimizer_for(config);
    let result = page.fit(&backgrounds, optimizer.as_ref())?;
    if !result.converged {
        log::warn!(
            "Page {}: iteration cap of {} reached before convergence.",
            page.counter,
            config.max_iterations
        );
    }

    let view = page.refresh(&backgrounds)?;
    let info = PageInfo::from_page(&page, &backgrounds);

    if let Some(path) = &config.export_curve {
        write_curve_json(path, &CurveFile::from_page(&page, &view, &backgrounds))?;
        log::info!("Wrote {}", path.display());
    }

    Ok(RunOutput {
        page,
        backgrounds,
        result,
        view,
        info,
    })
}

fn optimizer_for(config: &FitConfig) -> Box<dyn Optimizer> {
    match config.optimizer {
        OptimizerKind::LevenbergMarquardt => Box::new(LevenbergMarquardt::with_max_iterations(config.max_iterations)),
        OptimizerKind::Lbfgs => Box::new(Lbfgs::with_max_iterations(config.max_iterations)),
    }
}

/// Fit every file independently, in parallel. Pages are numbered from 1 in
/// input order. `traces` is either empty or holds one trace per file.
pub fn run_batch(files: &[PathBuf], traces: &[PathBuf], config: &FitConfig) -> Result<Vec<BatchItem>, AppError> {
    if !traces.is_empty() && traces.len() != files.len() {
        return Err(AppError::new(
            2,
            format!("Got {} traces for {} curve files.", traces.len(), files.len()),
        ));
    }

    let items = files
        .par_iter()
        .enumerate()
        .map(|(idx, path)| {
            let trace = traces.get(idx).map(std::slice::from_ref).unwrap_or_default();
            let outcome = load_inputs(path, trace).and_then(|(data, traces)| run_fit(idx + 1, data, traces, config));
            BatchItem {
                path: path.clone(),
                outcome,
            }
        })
        .collect();
    Ok(items)
}
