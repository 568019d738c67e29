//! Regression of each left entity on its counterpart from the right side.

use crate::analysis::{ols, OlsFit};
use crate::execution::registry::RegressionKind;
use crate::store::{DataPoint, MultiEntityData, RenderHint, Series, SeriesMeta, SingleEntityData, Time};
use tracing::debug;

pub(super) fn name(kind: RegressionKind) -> &'static str {
    match kind {
        RegressionKind::Static => "Beta",
        RegressionKind::RollingBeta => "Rolling Beta",
        RegressionKind::RollingAlpha => "Rolling Alpha",
    }
}

/// Observations present in both series, keyed by exact timestamp.
struct Pairs {
    dates: Vec<Time>,
    x: Vec<f64>,
    y: Vec<f64>,
}

fn pairs(x: &Series, y: &Series) -> Pairs {
    let mut out = Pairs { dates: Vec::new(), x: Vec::new(), y: Vec::new() };
    for p in y.points() {
        if let Some(xv) = x.value_at(p.time) {
            out.dates.push(p.time);
            out.x.push(xv);
            out.y.push(p.value);
        }
    }
    out
}

pub fn apply(kind: RegressionKind, window: usize, left: &MultiEntityData, right: &MultiEntityData) -> MultiEntityData {
    let mut entities = Vec::new();
    let mut errors: Vec<String> = left.errors.iter().chain(&right.errors).cloned().collect();

    for l in &left.entities {
        let Some(y) = l.fields().next() else {
            errors.push(format!("{}: nothing to regress", l.meta.name));
            continue;
        };
        let Some(x) = right.find(&l.meta.unique_id).or(right.entities.first()).and_then(|r| r.fields().next()) else {
            errors.push(format!("{}: no series to regress against", l.meta.name));
            continue;
        };

        let data = pairs(x, y);
        debug!(entity = %l.meta.name, ?kind, window, observations = data.dates.len(), "regressing");
        let fields = match kind {
            RegressionKind::Static => fixed(&data),
            RegressionKind::RollingBeta => rolling_beta(&data, window),
            RegressionKind::RollingAlpha => rolling_alpha(&data, window),
        };
        if fields.iter().all(Series::is_empty) {
            errors.push(format!("{}: not enough overlapping observations for {}", l.meta.name, name(kind)));
            continue;
        }

        let mut e = SingleEntityData::new(l.meta.clone());
        e.category = l.category.clone();
        for f in fields {
            e.push_field(f);
        }
        entities.push(e);
    }

    let mut out = MultiEntityData::new(entities);
    out.errors = errors;
    out.render_hint = if kind == RegressionKind::Static { RenderHint::Table } else { RenderHint::Line };
    out
}

fn output(label: &str, points: Vec<DataPoint>) -> Series {
    let meta = SeriesMeta { is_transformed: true, ..SeriesMeta::labelled(label) };
    Series::new(meta, points)
}

fn fixed(data: &Pairs) -> Vec<Series> {
    let (Some(fit), Some(&at)) = (ols(&data.x, &data.y), data.dates.last()) else { return Vec::new() };
    vec![
        output("Alpha", vec![DataPoint::new(at, fit.alpha)]),
        output("Beta", vec![DataPoint::new(at, fit.beta)]),
        output("R Squared", vec![DataPoint::new(at, fit.r_squared)]),
    ]
}

fn rolling_beta(data: &Pairs, window: usize) -> Vec<Series> {
    let (mut beta, mut r2) = (Vec::new(), Vec::new());
    for end in window..=data.dates.len() {
        let start = end - window;
        if let Some(fit) = ols(&data.x[start..end], &data.y[start..end]) {
            let at = data.dates[end - 1];
            beta.push(DataPoint::new(at, fit.beta));
            r2.push(DataPoint::new(at, fit.r_squared));
        }
    }
    vec![output("Beta", beta), output("R Squared", r2)]
}

/// Out-of-sample residual at each date, using the fit over the `window`
/// observations before it.
fn rolling_alpha(data: &Pairs, window: usize) -> Vec<Series> {
    let mut alpha = Vec::new();
    for t in window..data.dates.len() {
        let fit: Option<OlsFit> = ols(&data.x[t - window..t], &data.y[t - window..t]);
        if let Some(fit) = fit {
            alpha.push(DataPoint::new(data.dates[t], data.y[t] - fit.predict(data.x[t])));
        }
    }
    vec![output("Alpha", alpha)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::test_support::*;
    use crate::store::EntityMeta;

    fn one(id: &str, values: &[f64]) -> MultiEntityData {
        let mut e = SingleEntityData::new(EntityMeta::new(id, id));
        e.push_field(daily("Return", day(2024, 1, 1), values));
        MultiEntityData::new(vec![e])
    }

    fn field(d: &MultiEntityData, label: &str) -> Vec<f64> {
        d.entities[0].field(label).map(Series::values).unwrap_or_default()
    }

    #[test]
    fn test_static_beta_against_first_right_entity() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y: Vec<f64> = x.iter().map(|v| 1.0 + 1.5 * v).collect();
        let out = apply(RegressionKind::Static, 0, &one("AAPL", &y), &one("SPY", &x));

        assert_eq!(out.render_hint, RenderHint::Table);
        assert!((field(&out, "Beta")[0] - 1.5).abs() < 1e-12);
        assert!((field(&out, "Alpha")[0] - 1.0).abs() < 1e-12);
        assert!((field(&out, "R Squared")[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_beta_window() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        let out = apply(RegressionKind::RollingBeta, 3, &one("A", &y), &one("M", &x));
        let beta = field(&out, "Beta");
        assert_eq!(beta.len(), 4);
        assert!(beta.iter().all(|b| (b - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_rolling_alpha_is_out_of_sample_residual() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 10.0];
        let out = apply(RegressionKind::RollingAlpha, 3, &one("A", &y), &one("M", &x));
        // Fit on the first three points is y = 2x; at x = 4 it predicts 8.
        assert_eq!(field(&out, "Alpha"), vec![2.0]);
    }

    #[test]
    fn test_too_little_overlap_is_noted() {
        let out = apply(RegressionKind::Static, 0, &one("A", &[1.0]), &one("M", &[1.0]));
        assert!(out.is_empty());
        assert_eq!(out.errors.len(), 1);
    }
}
