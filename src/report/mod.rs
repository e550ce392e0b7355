//! Page information: a typed summary of everything known about a page.
//!
//! `PageInfo` is built once per page and feeds both the text summary
//! (`format`) and the statistics table (`io::export`).

pub mod format;

pub use format::*;

use crate::data::crop::{CropValidity, validate};
use crate::domain::{BackgroundTable, DataKind, WeightingMode};
use crate::fit::page::Page;

/// Version string written into summaries.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq)]
pub struct TitleInfo {
    pub function: String,
    pub model_name: String,
    pub model_id: u32,
    pub user_title: String,
    pub page_number: usize,
    /// Known once data is loaded.
    pub data_kind: Option<DataKind>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittingInfo {
    pub chi2: Option<f64>,
    pub weighting: WeightingMode,
    /// Channels per variance window (`2n+1`), for weighted fits only.
    pub window_channels: Option<usize>,
    /// Lag time of the first fitted channel (ms).
    pub interval_start: f64,
    /// Lag time of the last fitted channel (ms).
    pub interval_end: f64,
    pub fitted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundInfo {
    pub name: String,
    pub rate: f64,
}

/// A single value of the info record.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoValue {
    Text(String),
    Number(f64),
    Count(usize),
}

impl std::fmt::Display for InfoValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfoValue::Text(s) => write!(f, "{s}"),
            InfoValue::Number(v) => write!(f, "{v}"),
            InfoValue::Count(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageInfo {
    pub version: String,
    pub title: TitleInfo,
    /// Parameters in display units.
    pub parameters: Vec<(String, f64)>,
    pub supplement: Vec<(String, f64)>,
    pub fitting: Option<FittingInfo>,
    pub background: Option<BackgroundInfo>,
    pub model_doc: String,
}

impl PageInfo {
    pub fn from_page(page: &Page, backgrounds: &BackgroundTable) -> Self {
        let model = page.model;
        let values = page.parameters().values();

        let fitting = page.data().map(|data| {
            let len = data.len();
            let (first, last) = match validate(page.crop, len) {
                CropValidity::Valid(iv) => (iv.start, iv.end - 1),
                _ => (0, len.saturating_sub(1)),
            };
            let tau = data.x();
            FittingInfo {
                chi2: page.chi2(),
                weighting: page.weighting,
                window_channels: page.weighting.is_weighted().then_some(2 * page.window_halfwidth + 1),
                interval_start: tau.get(first).copied().unwrap_or(f64::NAN),
                interval_end: tau.get(last).copied().unwrap_or(f64::NAN),
                fitted: page.parameters().free_names().iter().map(|s| s.to_string()).collect(),
            }
        });

        let background = page
            .background
            .and_then(|i| backgrounds.get(i))
            .map(|bg| BackgroundInfo {
                name: bg.name.clone(),
                rate: bg.rate,
            });

        Self {
            version: VERSION.to_string(),
            title: TitleInfo {
                function: model.function_name().to_string(),
                model_name: model.display_name().to_string(),
                model_id: model.id(),
                user_title: page.title.clone(),
                page_number: page.counter,
                data_kind: page.data().map(|_| page.data_kind),
            },
            parameters: model.human_readable(values),
            supplement: model.supplementary(values),
            fitting,
            background,
            model_doc: model.doc().to_string(),
        }
    }

    /// All labelled values, title entries first.
    pub fn entries(&self) -> Vec<(String, InfoValue)> {
        let t = &self.title;
        let mut out = vec![
            ("User title".to_string(), InfoValue::Text(t.user_title.clone())),
            ("Function used".to_string(), InfoValue::Text(t.function.clone())),
            ("Model name".to_string(), InfoValue::Text(t.model_name.clone())),
            ("Model ID".to_string(), InfoValue::Count(t.model_id as usize)),
            ("Page number".to_string(), InfoValue::Count(t.page_number)),
        ];
        if let Some(kind) = t.data_kind {
            out.push(("Data type".to_string(), InfoValue::Text(kind.display_name().to_string())));
        }
        for (label, v) in self.parameters.iter().chain(&self.supplement) {
            out.push((label.clone(), InfoValue::Number(*v)));
        }
        if let Some(fit) = &self.fitting {
            let chi2 = match fit.chi2 {
                Some(v) => InfoValue::Number(v),
                None => InfoValue::Text("-".to_string()),
            };
            out.push(("χ²".to_string(), chi2));
            out.push(("Weighted fit".to_string(), InfoValue::Text(fit.weighting.to_string())));
            if let Some(channels) = fit.window_channels {
                out.push(("No. channels".to_string(), InfoValue::Count(channels)));
            }
            out.push((
                "Interval start [ms]".to_string(),
                InfoValue::Text(format!("{:.4e}", fit.interval_start)),
            ));
            out.push((
                "Interval end [ms]".to_string(),
                InfoValue::Text(format!("{:.4e}", fit.interval_end)),
            ));
            if !fit.fitted.is_empty() {
                out.push(("fit par.".to_string(), InfoValue::Text(fit.fitted.join(", "))));
            }
        }
        if let Some(bg) = &self.background {
            out.push(("bg name".to_string(), InfoValue::Text(bg.name.clone())));
            out.push(("bg rate [kHz]".to_string(), InfoValue::Number(bg.rate)));
        }
        out
    }

    /// Value for `label`, if this page has it.
    pub fn get(&self, label: &str) -> Option<InfoValue> {
        self.entries().into_iter().find(|(l, _)| l == label).map(|(_, v)| v)
    }

    pub fn chi2(&self) -> Option<f64> {
        self.fitting.as_ref().and_then(|f| f.chi2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CropInterval, Series};
    use crate::models::{ModelKind, predict_all};

    fn page() -> Page {
        let model = ModelKind::Diffusion3d;
        let tau: Vec<f64> = (0..20).map(|i| 0.01 * 1.5f64.powi(i)).collect();
        let mut page = Page::new(7, model, tau.clone());
        page.title = "sample A".to_string();
        page.set_data(Series::new(tau.clone(), predict_all(model, &tau, &model.default_values())).unwrap());
        page
    }

    #[test]
    fn info_without_data_has_no_fitting_section() {
        let page = Page::new(1, ModelKind::Diffusion2d, vec![0.1, 1.0]);
        let info = PageInfo::from_page(&page, &BackgroundTable::new());
        assert!(info.fitting.is_none());
        assert!(info.get("Data type").is_none());
        assert_eq!(info.get("Model ID"), Some(InfoValue::Count(6001)));
    }

    #[test]
    fn fitting_section_reports_interval_lag_times() {
        let mut page = page();
        page.crop = Some(CropInterval::new(2, 5));
        let info = PageInfo::from_page(&page, &BackgroundTable::new());
        let fitting = info.fitting.unwrap();
        let tau = page.data().unwrap().x();
        assert_eq!(fitting.interval_start, tau[2]);
        assert_eq!(fitting.interval_end, tau[4]);
        assert_eq!(fitting.fitted, vec!["n".to_string(), "τ_diff [ms]".to_string()]);
        assert_eq!(fitting.window_channels, None);
    }

    #[test]
    fn weighted_fit_reports_window_size() {
        let mut page = page();
        page.weighting = WeightingMode::ModelFunction;
        page.window_halfwidth = 4;
        let info = PageInfo::from_page(&page, &BackgroundTable::new());
        assert_eq!(info.get("No. channels"), Some(InfoValue::Count(9)));
    }

    #[test]
    fn background_section_uses_the_selected_entry() {
        let mut page = page();
        let mut backgrounds = BackgroundTable::new();
        backgrounds.push("water", 0.5);
        page.background = Some(backgrounds.push("buffer", 1.5));
        let info = PageInfo::from_page(&page, &backgrounds);
        assert_eq!(info.get("bg name"), Some(InfoValue::Text("buffer".into())));
        assert_eq!(info.get("bg rate [kHz]"), Some(InfoValue::Number(1.5)));
    }
}
