//! Single-pass alignment onto a calendar.

use crate::store::{DataPoint, ResamplePolicy, Series, SeriesMeta, Time};

/// Merge-joins `points` onto `dates`, honoring only the upsample policy.
///
/// Output dates before the first input point are trimmed.
pub fn align_to_dates(dates: &[Time], meta: &SeriesMeta, points: &[DataPoint]) -> Vec<DataPoint> {
    let Some(first) = points.first() else { return Vec::new() };
    let mut out = Vec::with_capacity(dates.len());
    let mut j = 0usize;

    for &d in dates.iter().filter(|d| **d >= first.time) {
        while j < points.len() && points[j].time < d {
            j += 1;
        }
        if j < points.len() && points[j].time == d {
            out.push(DataPoint::new(d, points[j].value));
            continue;
        }
        match meta.upsample {
            // `j > 0` holds because `d >= first.time` and no exact match.
            ResamplePolicy::LastValue if j > 0 => out.push(DataPoint::new(d, points[j - 1].value)),
            ResamplePolicy::Zero => out.push(DataPoint::new(d, 0.0)),
            _ => {}
        }
    }
    out
}

pub fn align_series(dates: &[Time], series: &Series) -> Series {
    series.with_points(align_to_dates(dates, &series.meta, series.points()))
}

/// Force-aligns every series onto the first one's dates with carry-forward,
/// dropping leading dates where any of them has no value yet.
pub fn align_common(series: &[Series]) -> Vec<Series> {
    let Some(driver) = series.first() else { return Vec::new() };
    let dates = driver.dates();

    let resolved: Vec<Vec<Option<f64>>> = series
        .iter()
        .map(|s| dates.iter().map(|d| s.value_as_of(*d).map(|p| p.value)).collect())
        .collect();

    let start = (0..dates.len())
        .find(|&i| resolved.iter().all(|col| col[i].is_some()))
        .unwrap_or(dates.len());

    series
        .iter()
        .zip(resolved)
        .map(|(s, col)| {
            let points = dates[start..]
                .iter()
                .zip(&col[start..])
                .filter_map(|(d, v)| v.map(|v| DataPoint::new(*d, v)))
                .collect();
            s.with_points(points)
        })
        .collect()
}
