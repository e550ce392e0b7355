//! Two-column data ingest.
//!
//! Correlation curves (`τ [ms]`, `G(τ)`) and intensity traces (`t`, count
//! rate in kHz) share one plain-text layout: two numeric columns separated by
//! tabs or commas, `#` starting a comment line. Rows that do not parse (header
//! lines, stray text) are skipped and reported; non-increasing x values are an
//! error.

use std::fs;
use std::path::Path;

use crate::domain::Series;
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: the series plus what was skipped on the way.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub series: Series,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load a two-column file.
pub fn load_series(path: &Path) -> Result<Ingested, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::new(2, format!("Failed to read '{}': {e}", path.display())))?;
    let ingested = parse_series(&text).map_err(|e| {
        AppError::new(e.exit_code(), format!("{}: {}", path.display(), e))
    })?;
    for err in &ingested.row_errors {
        log::debug!("{}:{}: skipped row: {}", path.display(), err.line, err.message);
    }
    if !ingested.row_errors.is_empty() {
        log::warn!(
            "{}: skipped {} of {} rows.",
            path.display(),
            ingested.row_errors.len(),
            ingested.rows_read
        );
    }
    Ok(ingested)
}

/// Parse two-column text.
pub fn parse_series(text: &str) -> Result<Ingested, AppError> {
    let delimiter = if text.lines().any(|l| !l.trim_start().starts_with('#') && l.contains('\t')) {
        b'\t'
    } else {
        b','
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut pairs = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line: idx + 1,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        let line = record.position().map(|p| p.line() as usize).unwrap_or(idx + 1);

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        match parse_pair(record.get(0), record.get(1)) {
            Ok(pair) => pairs.push(pair),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if pairs.is_empty() {
        return Err(AppError::new(3, "No numeric rows found."));
    }

    let series = Series::from_pairs(&pairs)?;
    Ok(Ingested {
        series,
        row_errors,
        rows_read,
    })
}

fn parse_pair(x: Option<&str>, y: Option<&str>) -> Result<(f64, f64), String> {
    let x = parse_value(x.ok_or_else(|| "Missing first column.".to_string())?)?;
    let y = parse_value(y.ok_or_else(|| "Missing second column.".to_string())?)?;
    Ok((x, y))
}

fn parse_value(s: &str) -> Result<f64, String> {
    let v = s
        .parse::<f64>()
        .map_err(|_| format!("Not a number: '{s}'"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite value: '{s}'"))
    }
}
