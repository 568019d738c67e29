//! The full resampler: interval folding with incompleteness flags and
//! weight masking.

use crate::store::{DataPoint, ResamplePolicy, Series, SeriesMeta, Time};

/// Moves series onto a fixed, sorted set of output dates.
///
/// Output date `d_i` owns the interval `(d_{i-1}, d_i]`; the first interval
/// is unbounded below.
#[derive(Debug, Clone)]
pub struct Resampler {
    dates: Vec<Time>,
    begin_incomplete: bool,
    end_incomplete: bool,
}

impl Resampler {
    pub fn new(dates: Vec<Time>, begin_incomplete: bool, end_incomplete: bool) -> Self {
        let mut dates = dates;
        dates.sort();
        dates.dedup();
        Self { dates, begin_incomplete, end_incomplete }
    }

    pub fn dates(&self) -> &[Time] { &self.dates }

    /// Resamples `points` under the policies in `meta`, then drops every
    /// output point whose resampled weight is exactly zero.
    pub fn apply(&self, meta: &SeriesMeta, points: &[DataPoint], weight: Option<&Series>) -> Vec<DataPoint> {
        let mut out = self.resample_points(meta, points);
        if let Some(w) = weight {
            let mask = self.resample_points(&w.meta, w.points());
            out.retain(|p| {
                let idx = mask.partition_point(|m| m.time < p.time);
                !matches!(mask.get(idx), Some(m) if m.time == p.time && m.value == 0.0)
            });
        }
        out
    }

    /// Convenience wrapper keeping the series' metadata.
    pub fn apply_series(&self, series: &Series, weight: Option<&Series>) -> Series {
        series.with_points(self.apply(&series.meta, series.points(), weight))
    }

    pub fn resample_points(&self, meta: &SeriesMeta, points: &[DataPoint]) -> Vec<DataPoint> {
        let mut out = Vec::with_capacity(self.dates.len());
        let last_idx = self.dates.len().saturating_sub(1);
        let mut j = 0usize;

        for (i, &d) in self.dates.iter().enumerate() {
            let start = j;
            while j < points.len() && points[j].time <= d {
                j += 1;
            }
            let interval = &points[start..j];

            let (value, aggregated) = if interval.is_empty() {
                let v = match meta.upsample {
                    ResamplePolicy::LastValue if j > 0 => Some(points[j - 1].value),
                    ResamplePolicy::Zero => Some(0.0),
                    _ => None,
                };
                (v, false)
            } else {
                (downsample(meta.downsample, interval), meta.downsample.is_aggregating())
            };

            let Some(value) = value else { continue };
            let partial = (i == 0 && self.begin_incomplete) || (i == last_idx && self.end_incomplete);
            if aggregated && partial {
                continue;
            }
            out.push(DataPoint::new(d, value));
        }
        out
    }
}

fn downsample(policy: ResamplePolicy, interval: &[DataPoint]) -> Option<f64> {
    match policy {
        ResamplePolicy::LastValue => interval.last().map(|p| p.value),
        ResamplePolicy::Arithmetic => Some(interval.iter().map(|p| p.value).sum()),
        ResamplePolicy::Geometric => Some(interval.iter().map(|p| 1.0 + p.value).product::<f64>() - 1.0),
        ResamplePolicy::None | ResamplePolicy::Zero => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::test_support::*;
    use rstest::rstest;

    fn policies(up: ResamplePolicy, down: ResamplePolicy) -> SeriesMeta {
        SeriesMeta::labelled("X").with_policies(up, down)
    }

    #[rstest]
    #[case(ResamplePolicy::LastValue)]
    #[case(ResamplePolicy::Arithmetic)]
    fn test_resampling_onto_own_dates_is_identity(#[case] down: ResamplePolicy) {
        let s = daily("X", day(2020, 1, 1), &[1.0, -2.0, 3.5, 4.0]);
        let r = Resampler::new(s.dates(), false, false);
        let out = r.apply(&policies(ResamplePolicy::LastValue, down), s.points(), None);
        assert_eq!(out, s.points().to_vec());
    }

    #[test]
    fn test_geometric_vs_arithmetic_downsample() {
        let s = daily("R", day(2020, 1, 1), &[0.1, 0.1, 0.1]);
        let r = Resampler::new(vec![day(2020, 1, 3)], false, false);

        let geo = r.apply(&policies(ResamplePolicy::None, ResamplePolicy::Geometric), s.points(), None);
        assert!((geo[0].value - (1.1f64.powi(3) - 1.0)).abs() < 1e-12);

        let arith = r.apply(&policies(ResamplePolicy::None, ResamplePolicy::Arithmetic), s.points(), None);
        assert!((arith[0].value - 0.3).abs() < 1e-12);
    }

    #[rstest]
    #[case(ResamplePolicy::LastValue, vec![Some(1.0), Some(1.0), Some(2.0)])]
    #[case(ResamplePolicy::Zero, vec![Some(1.0), Some(0.0), Some(2.0)])]
    #[case(ResamplePolicy::None, vec![Some(1.0), None, Some(2.0)])]
    #[case(ResamplePolicy::Arithmetic, vec![Some(1.0), None, Some(2.0)])]
    fn test_upsample_policies(#[case] up: ResamplePolicy, #[case] expected: Vec<Option<f64>>) {
        let s = series("X", &[(day(2020, 1, 1), 1.0), (day(2020, 1, 3), 2.0)]);
        let dates = vec![day(2020, 1, 1), day(2020, 1, 2), day(2020, 1, 3)];
        let out = Resampler::new(dates.clone(), false, false).apply(&policies(up, ResamplePolicy::LastValue), s.points(), None);
        let got: Vec<Option<f64>> = dates
            .iter()
            .map(|d| out.iter().find(|p| p.time == *d).map(|p| p.value))
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_zero_as_downsample_drops() {
        let s = daily("X", day(2020, 1, 1), &[1.0, 2.0]);
        let r = Resampler::new(vec![day(2020, 1, 2)], false, false);
        assert!(r.apply(&policies(ResamplePolicy::LastValue, ResamplePolicy::Zero), s.points(), None).is_empty());
    }

    #[test]
    fn test_incomplete_flags_only_suppress_aggregates() {
        let s = daily("X", day(2020, 1, 1), &[1.0, 2.0, 3.0, 4.0]);
        let dates = vec![day(2020, 1, 2), day(2020, 1, 4)];
        let r = Resampler::new(dates, true, true);

        let sums = r.apply(&policies(ResamplePolicy::None, ResamplePolicy::Arithmetic), s.points(), None);
        assert!(sums.is_empty());

        let lasts = r.apply(&policies(ResamplePolicy::None, ResamplePolicy::LastValue), s.points(), None);
        assert_eq!(lasts.iter().map(|p| p.value).collect::<Vec<_>>(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_weight_masking_drops_exact_zero_only() {
        let s = daily("X", day(2020, 1, 1), &[1.0, 2.0, 3.0]);
        let w = Series::weight(vec![
            DataPoint::new(day(2020, 1, 1), 1.0),
            DataPoint::new(day(2020, 1, 2), 0.0),
        ]);
        // Weight policies: default LastValue/LastValue, so day 3 carries the zero.
        let r = Resampler::new(s.dates(), false, false);
        let out = r.apply(&s.meta, s.points(), Some(&w));
        assert_eq!(out.iter().map(|p| p.value).collect::<Vec<_>>(), vec![1.0]);

        // No carry-forward: days 1 and 3 have no weight value and are kept.
        let sparse = Series::new(
            policies(ResamplePolicy::None, ResamplePolicy::LastValue),
            vec![DataPoint::new(day(2020, 1, 2), 0.0)],
        );
        let out = r.apply(&s.meta, s.points(), Some(&sparse));
        assert_eq!(out.iter().map(|p| p.value).collect::<Vec<_>>(), vec![1.0, 3.0]);
    }
}
