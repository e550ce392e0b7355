//! Formatted terminal output.
//!
//! We keep formatting code in one place so the fitting code stays clean and
//! output changes are localized.

use crate::domain::FitResult;
use crate::models::ModelKind;
use crate::report::PageInfo;

/// Human-readable multi-section summary of a page.
pub fn format_info(info: &PageInfo) -> String {
    let mut out = String::new();

    out.push_str(&format!("fcs-fit v.{}\n\n", info.version));

    let t = &info.title;
    out.push_str(&format!("User title: {}\n", t.user_title));
    out.push_str(&format!("Function used: {}\n", t.function));
    out.push_str(&format!("Model name: {}\n", t.model_name));
    out.push_str(&format!("Model ID: {}\n", t.model_id));
    out.push_str(&format!("Page number: {}\n", t.page_number));
    if let Some(kind) = t.data_kind {
        out.push_str(&format!("Data type: {}\n", kind.display_name()));
    }

    out.push_str("\nParameters:\n");
    for (label, value) in &info.parameters {
        out.push_str(&format!("  {label} = {value}\n"));
    }

    if !info.supplement.is_empty() {
        out.push_str("\nSupplementary variables:\n");
        for (label, value) in &info.supplement {
            out.push_str(&format!("  {label} = {value}\n"));
        }
    }

    if let Some(fit) = &info.fitting {
        out.push_str("\nFitting:\n");
        match fit.chi2 {
            Some(chi2) => out.push_str(&format!("  χ²: {chi2}\n")),
            None => out.push_str("  χ²: -\n"),
        }
        out.push_str(&format!("  Weighted fit: {}\n", fit.weighting));
        if let Some(channels) = fit.window_channels {
            out.push_str(&format!("  No. channels: {channels}\n"));
        }
        out.push_str(&format!("  Interval start [ms]: {:.4e}\n", fit.interval_start));
        out.push_str(&format!("  Interval end [ms]: {:.4e}\n", fit.interval_end));
        if !fit.fitted.is_empty() {
            out.push_str(&format!("  fit par.: {}\n", fit.fitted.join(", ")));
        }
    }

    if let Some(bg) = &info.background {
        out.push_str("\nBackground:\n");
        out.push_str(&format!("  bg name: {}\n", bg.name));
        out.push_str(&format!("  bg rate [kHz]: {}\n", bg.rate));
    }

    out.push_str("\n\nModel doc string:\n");
    for line in info.model_doc.lines() {
        out.push_str(&format!("       {}\n", line.trim()));
    }

    out
}

/// One-line result of a fit, used by `batch`.
pub fn format_fit_line(label: &str, model: ModelKind, result: &FitResult) -> String {
    let params = model
        .parameter_labels()
        .iter()
        .zip(&result.values)
        .map(|(l, v)| format!("{l}={v:.5}"))
        .collect::<Vec<_>>()
        .join(" ");
    let flag = if result.converged { "" } else { " (not converged)" };
    format!("{label}: χ²={:.4e} {params}{flag}", result.chi_squared)
}

/// Table of available models.
pub fn format_models() -> String {
    let mut out = String::new();
    for model in ModelKind::ALL {
        out.push_str(&format!("{}  {:<12} {}\n", model.id(), model.display_name(), model.function_name()));
        let defaults = model.default_values();
        let mask = model.default_fit_mask();
        for ((label, value), fit) in model.parameter_labels().iter().zip(&defaults).zip(&mask) {
            let marker = if *fit { "*" } else { " " };
            out.push_str(&format!("    {marker} {label:<14} {value}\n"));
        }
    }
    out
}
