//! Per-series time-series transformations. Weight series are left alone.

use crate::compute::kernel;
use crate::execution::registry::TransformKind;
use crate::store::{DataPoint, MultiEntityData, ResamplePolicy, Series};

pub(super) fn name(kind: TransformKind) -> &'static str {
    match kind {
        TransformKind::Change => "Change",
        TransformKind::PercentageChange => "Percentage Change",
        TransformKind::CumulativeReturn => "Cumulative Return",
        TransformKind::MovingAverage => "Moving Average",
        TransformKind::RollingStdDev => "Rolling Standard Deviation",
        TransformKind::Lag => "Lag",
    }
}

pub fn apply(kind: TransformKind, window: usize, input: &MultiEntityData) -> MultiEntityData {
    let mut out = input.clone();
    for series in out.entities.iter_mut().flat_map(|e| e.fields_mut()) {
        *series = transform(kind, window, series);
    }
    out
}

fn transform(kind: TransformKind, window: usize, s: &Series) -> Series {
    let pts = s.points();
    let points: Vec<DataPoint> = match kind {
        TransformKind::Change => {
            pts.windows(2).map(|w| DataPoint::new(w[1].time, w[1].value - w[0].value)).collect()
        }
        // Percentage change as a fraction; a zero base has no change.
        TransformKind::PercentageChange => pts
            .windows(2)
            .filter(|w| w[0].value != 0.0)
            .map(|w| DataPoint::new(w[1].time, w[1].value / w[0].value - 1.0))
            .collect(),
        TransformKind::CumulativeReturn => {
            let mut growth = 1.0;
            pts.iter()
                .map(|p| {
                    growth *= 1.0 + p.value;
                    DataPoint::new(p.time, growth - 1.0)
                })
                .collect()
        }
        TransformKind::MovingAverage => trailing(pts, window, kernel::mean),
        TransformKind::RollingStdDev => trailing(pts, window, kernel::stddev),
        TransformKind::Lag => {
            pts.iter().skip(window).zip(pts).map(|(now, then)| DataPoint::new(now.time, then.value)).collect()
        }
    };

    let mut out = s.with_points(points);
    out.meta.is_transformed = true;
    match kind {
        TransformKind::Change => out.meta = out.meta.with_policies(ResamplePolicy::Zero, ResamplePolicy::Arithmetic),
        TransformKind::PercentageChange => {
            out.meta = out.meta.with_policies(ResamplePolicy::Zero, ResamplePolicy::Geometric)
        }
        _ => {}
    }
    out
}

fn trailing(pts: &[DataPoint], window: usize, f: fn(&[f64]) -> Option<f64>) -> Vec<DataPoint> {
    if window == 0 || window > pts.len() {
        return Vec::new();
    }
    let values: Vec<f64> = pts.iter().map(|p| p.value).collect();
    values
        .windows(window)
        .zip(&pts[window - 1..])
        .filter_map(|(w, p)| f(w).map(|v| DataPoint::new(p.time, v)))
        .collect()
}
