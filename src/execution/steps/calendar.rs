//! Calendar-driven steps: alignment, resampling and weight rebalancing.

use crate::resample::{align_series, calendar_dates, Frequency, Resampler};
use crate::store::{DataPoint, MultiEntityData, Series};
use tracing::debug;

/// Fast path: every series is merge-joined onto the shared calendar.
pub fn align(freq: Frequency, input: &MultiEntityData) -> MultiEntityData {
    let mut out = input.clone();
    let Some((begin, end)) = input.span() else { return out };
    let calendar = calendar_dates(freq, begin, end);
    debug!(freq = freq.name(), dates = calendar.dates.len(), "aligning to calendar");

    for series in out.entities.iter_mut().flat_map(|e| e.series.iter_mut()) {
        *series = align_series(&calendar.dates, series);
    }
    out
}

/// Full resampler, honoring incomplete periods and masking by weight.
pub fn resample(freq: Frequency, input: &MultiEntityData) -> MultiEntityData {
    let mut out = input.clone();
    let Some((begin, end)) = input.span() else { return out };
    let calendar = calendar_dates(freq, begin, end);
    let resampler = Resampler::new(calendar.dates, calendar.begin_incomplete, calendar.end_incomplete);
    debug!(
        freq = freq.name(),
        dates = resampler.dates().len(),
        begin_incomplete = calendar.begin_incomplete,
        end_incomplete = calendar.end_incomplete,
        "resampling"
    );

    for entity in out.entities.iter_mut() {
        let weight = entity.weight().cloned();
        for series in entity.series.iter_mut() {
            let mask = if series.is_weight { None } else { weight.as_ref() };
            *series = resampler.apply_series(series, mask);
        }
    }
    out
}

/// Holds every weight constant between cadence dates: a weight observed at
/// `t` takes the value the series had on the latest cadence date at or
/// before `t`.
pub fn rebalance(freq: Frequency, input: &MultiEntityData) -> MultiEntityData {
    let mut out = input.clone();
    for entity in out.entities.iter_mut() {
        if let Some(w) = entity.weight_mut() {
            *w = rebalanced(freq, w);
        }
    }
    out
}

fn rebalanced(freq: Frequency, weight: &Series) -> Series {
    let (Some(first), Some(last)) = (weight.first(), weight.last()) else { return weight.clone() };
    let calendar = calendar_dates(freq, first.time, last.time);
    let mut cadence = calendar.dates;
    // A period cut short by the data is not a rebalance date.
    if calendar.end_incomplete {
        cadence.pop();
    }

    let points = weight
        .points()
        .iter()
        .map(|p| {
            let k = cadence.partition_point(|c| *c <= p.time);
            let held = match k {
                0 => first.value,
                _ => weight.value_as_of(cadence[k - 1]).map_or(first.value, |q| q.value),
            };
            DataPoint::new(p.time, held)
        })
        .collect();
    weight.with_points(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::test_support::*;
    use crate::store::{EntityMeta, SingleEntityData};

    #[test]
    fn test_rebalance_holds_between_month_ends() {
        let mut e = SingleEntityData::new(EntityMeta::new("A", "A"));
        e.set_weight(Series::weight(vec![
            DataPoint::new(day(2024, 1, 15), 0.2),
            DataPoint::new(day(2024, 1, 31), 0.3),
            DataPoint::new(day(2024, 2, 10), 0.4),
            DataPoint::new(day(2024, 2, 29), 0.5),
            DataPoint::new(day(2024, 3, 5), 0.6),
        ]));
        let out = rebalance(Frequency::Monthly, &MultiEntityData::new(vec![e]));
        let w = out.entities[0].weight().map(Series::values);
        assert_eq!(w, Some(vec![0.2, 0.3, 0.3, 0.5, 0.5]));
    }

    #[test]
    fn test_resample_masks_fields_by_weight() {
        let mut e = SingleEntityData::new(EntityMeta::new("A", "A"));
        e.push_field(daily("P", day(2024, 1, 1), &[1.0, 2.0, 3.0, 4.0, 5.0]));
        e.set_weight(Series::weight(vec![
            DataPoint::new(day(2024, 1, 1), 1.0),
            DataPoint::new(day(2024, 1, 3), 0.0),
        ]));
        let out = resample(Frequency::Daily, &MultiEntityData::new(vec![e]));
        let p = out.entities[0].field("P").map(Series::values);
        // Jan 1-2 kept; weight carries 0 forward from Jan 3.
        assert_eq!(p, Some(vec![1.0, 2.0]));
    }
}
