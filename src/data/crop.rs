//! Channel selection.
//!
//! The first and last channels of a measured correlation curve are usually
//! noisy, so only a window of channels is used for fitting. Cropping never
//! touches the full series: the result is a new `Series` together with the
//! interval that was actually applied.
//!
//! Invalid intervals are not an error. They fall back to the full range.

use crate::domain::{CropInterval, Series};

/// Outcome of checking a requested interval against a series length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropValidity {
    /// The sentinel `start == end`: use the full range.
    Full,
    /// A usable sub-range.
    Valid(CropInterval),
    /// Out of bounds, reversed or missing: fall back to the full range.
    Invalid,
}

/// A cropped view of a full series.
#[derive(Debug, Clone, PartialEq)]
pub struct Cropped {
    pub series: Series,
    /// The interval that was applied (resolved to `0..len` on fallback).
    pub interval: CropInterval,
}

/// Check `interval` against a series with `len` channels.
pub fn validate(interval: Option<CropInterval>, len: usize) -> CropValidity {
    let Some(interval) = interval else {
        return CropValidity::Invalid;
    };
    if interval.is_unset() {
        return CropValidity::Full;
    }
    if interval.start < interval.end && interval.end <= len {
        CropValidity::Valid(interval)
    } else {
        CropValidity::Invalid
    }
}

/// Select the channels `interval.start..interval.end` of `full`.
pub fn crop(full: &Series, interval: Option<CropInterval>) -> Cropped {
    match validate(interval, full.len()) {
        CropValidity::Valid(iv) => Cropped {
            series: full.slice(iv.start, iv.end),
            interval: iv,
        },
        validity => {
            if validity == CropValidity::Invalid {
                log::debug!(
                    "Crop interval {:?} does not fit {} channels, using the full range.",
                    interval,
                    full.len()
                );
            }
            Cropped {
                series: full.clone(),
                interval: CropInterval::full(full.len()),
            }
        }
    }
}
