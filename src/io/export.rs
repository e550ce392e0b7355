//! Tabular exports.
//!
//! - the statistics table: one row per page, selected info labels as columns
//! - plain two-column series files, as read back by `ingest`

use std::path::Path;

use crate::domain::Series;
use crate::error::AppError;
use crate::report::PageInfo;

/// Placeholder for a label a page does not have.
pub const MISSING: &str = "-";

/// Header and rows of the statistics table.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Every label of `info`, in record order.
pub fn default_labels(info: &PageInfo) -> Vec<String> {
    info.entries().into_iter().map(|(label, _)| label).collect()
}

/// Collect `labels` from all pages fitted with `model_id`, ordered by page number.
pub fn statistics_table(infos: &[PageInfo], model_id: u32, labels: &[String]) -> StatisticsTable {
    let mut pages: Vec<&PageInfo> = infos.iter().filter(|i| i.title.model_id == model_id).collect();
    pages.sort_by_key(|i| i.title.page_number);

    let rows = pages
        .iter()
        .map(|info| {
            let entries = info.entries();
            labels
                .iter()
                .map(|label| {
                    entries
                        .iter()
                        .find(|(l, _)| l == label)
                        .map(|(_, v)| v.to_string())
                        .unwrap_or_else(|| MISSING.to_string())
                })
                .collect()
        })
        .collect();

    StatisticsTable {
        header: labels.to_vec(),
        rows,
    }
}

/// Write the statistics table as tab-separated text.
pub fn write_statistics_tsv(path: &Path, table: &StatisticsTable) -> Result<(), AppError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create statistics file '{}': {e}", path.display())))?;

    writer
        .write_record(&table.header)
        .map_err(|e| AppError::new(2, format!("Failed to write statistics header: {e}")))?;
    for row in &table.rows {
        writer
            .write_record(row)
            .map_err(|e| AppError::new(2, format!("Failed to write statistics row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write statistics file: {e}")))?;
    Ok(())
}

/// Write a series as two comma-separated columns with a commented header.
pub fn write_series_csv(path: &Path, series: &Series, x_label: &str, y_label: &str) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", path.display())))?;

    writer
        .write_record([format!("# {x_label}"), y_label.to_string()])
        .map_err(|e| AppError::new(2, format!("Failed to write header: {e}")))?;
    for (x, y) in series.pairs() {
        writer
            .write_record([x.to_string(), y.to_string()])
            .map_err(|e| AppError::new(2, format!("Failed to write row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))?;
    Ok(())
}
