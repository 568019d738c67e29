//! Time-range windows. Relative windows are anchored on the latest
//! observation in the data, not on the wall clock.

use super::{invalid, missing};
use crate::config::EngineConfig;
use crate::graph::QueryComponent;
use crate::resample::calendar::midnight;
use crate::store::{MultiEntityData, Time};
use crate::validation::ArgumentError;
use chrono::{Datelike, Months, NaiveDate};
use std::ops::{Bound, RangeBounds};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// `(anchor - n months, anchor]`.
    LastMonths(u32),
    /// From January 1st of the anchor's year.
    YearToDate,
    /// Inclusive on both ends.
    Between(Time, Time),
    AllTime,
}

const STEP: &str = "Time Range";

pub(super) fn prepare(c: Option<&QueryComponent>, config: &EngineConfig, errors: &mut Vec<ArgumentError>) -> Window {
    let default = || parse(&config.default_time_range, None).unwrap_or(Window::LastMonths(12));
    let Some(c) = c else {
        errors.push(missing(STEP, "window", &config.default_time_range));
        return default();
    };
    match parse(&c.canonical_name, Some(c)) {
        Some(w) => w,
        None => {
            let value = if c.parameters.is_empty() {
                c.canonical_name.clone()
            } else {
                format!("{} {}", c.canonical_name, c.parameters.join(" "))
            };
            errors.push(invalid(STEP, "window", &value, &config.default_time_range));
            default()
        }
    }
}

fn parse(name: &str, c: Option<&QueryComponent>) -> Option<Window> {
    let n = || c.and_then(|c| c.param_usize(0)).filter(|n| *n > 0).and_then(|n| u32::try_from(n).ok());
    match name.trim().to_ascii_lowercase().as_str() {
        "last twelve months" => Some(Window::LastMonths(12)),
        "year to date" => Some(Window::YearToDate),
        "last n years" => n().and_then(|n| n.checked_mul(12)).map(Window::LastMonths),
        "last n months" => n().map(Window::LastMonths),
        "date range" => {
            let c = c?;
            let (begin, end) = (c.param_date(0)?, c.param_date(1)?);
            (begin <= end).then_some(Window::Between(begin, end))
        }
        "all time" => Some(Window::AllTime),
        _ => None,
    }
}

fn bounds(window: Window, anchor: Time) -> (Bound<Time>, Bound<Time>) {
    match window {
        Window::LastMonths(n) => match anchor.checked_sub_months(Months::new(n)) {
            Some(begin) => (Bound::Excluded(begin), Bound::Included(anchor)),
            None => (Bound::Unbounded, Bound::Included(anchor)),
        },
        Window::YearToDate => match NaiveDate::from_ymd_opt(anchor.year(), 1, 1) {
            Some(jan1) => (Bound::Included(midnight(jan1)), Bound::Included(anchor)),
            None => (Bound::Unbounded, Bound::Included(anchor)),
        },
        Window::Between(begin, end) => (Bound::Included(begin), Bound::Included(end)),
        Window::AllTime => (Bound::Unbounded, Bound::Unbounded),
    }
}

pub fn apply(window: Window, input: &MultiEntityData) -> MultiEntityData {
    let mut out = input.clone();
    let Some((_, anchor)) = input.span() else { return out };
    let range = bounds(window, anchor);
    debug!(?window, %anchor, "slicing to window");

    for series in out.entities.iter_mut().flat_map(|e| e.series.iter_mut()) {
        series.retain(|p| range.contains(&p.time));
    }
    out
}
