//! Event alignment: cut every entity into windows around the stretches where
//! its weight is nonzero and re-anchor each window on the epoch.

use super::market::snap_to_market;
use crate::store::{
    epoch, CategorySeries, DataPoint, EntityMeta, EntityRegistry, MergeKey, MultiEntityData, Series,
    SingleEntityData, Time,
};
use chrono::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventAlignment {
    pub before_days: i64,
    pub after_days: i64,
    pub snap_to_market: bool,
}

/// A nonzero stretch of a weight series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub start: Time,
    pub end: Time,
}

/// `start` is the first nonzero timestamp, `end` the first zero after it (or
/// the last timestamp when the stretch runs to the end).
pub fn event_windows(weight: &Series) -> Vec<EventWindow> {
    let mut out = Vec::new();
    let mut open: Option<Time> = None;
    for p in weight.points() {
        match (open, p.value != 0.0) {
            (None, true) => open = Some(p.time),
            (Some(start), false) => {
                out.push(EventWindow { start, end: p.time });
                open = None;
            }
            _ => {}
        }
    }
    if let (Some(start), Some(last)) = (open, weight.last()) {
        out.push(EventWindow { start, end: last.time });
    }
    out
}

pub fn window_name(w: &EventWindow) -> String {
    format!("{} to {}", w.start.format("%Y-%m-%d"), w.end.format("%Y-%m-%d"))
}

pub fn align_event_before_after(data: &MultiEntityData, cfg: EventAlignment) -> MultiEntityData {
    let market_dates = if cfg.snap_to_market { data.all_dates() } else { Vec::new() };
    let mut registry = EntityRegistry::new(MergeKey::Name);
    let mut errors = Vec::new();

    for entity in &data.entities {
        let Some(weight) = entity.weight() else {
            errors.push(format!("{} has no event dates", entity.meta.name));
            continue;
        };

        for window in event_windows(weight) {
            let anchor = if cfg.snap_to_market {
                match snap_to_market(window.start, &market_dates) {
                    Some(t) => t,
                    None => {
                        debug!(entity = %entity.meta.name, start = %window.start, "event window outside market calendar");
                        continue;
                    }
                }
            } else {
                window.start
            };

            let lo = anchor - Duration::days(cfg.before_days);
            let hi = window.end + Duration::days(cfg.after_days);
            let shift = anchor - epoch();

            let name = window_name(&window);
            let mut out = SingleEntityData::new(EntityMeta { is_custom: true, ..EntityMeta::new(name.clone(), name) });
            let mut weight_points: Vec<DataPoint> = Vec::new();

            for s in entity.fields() {
                let points: Vec<DataPoint> = s
                    .slice_between(lo, hi)
                    .iter()
                    .map(|p| DataPoint::new(p.time - shift, p.value))
                    .collect();
                weight_points.extend(points.iter().map(|p| DataPoint::new(p.time, 1.0)));
                out.push_field(s.with_points(points));
            }

            if let Some(label) = entity.category.label_at(window.start) {
                out.category = CategorySeries::constant(label);
            }
            out.set_weight(Series::weight(weight_points));
            registry.add(out, Some(&entity.meta.name));
        }
    }

    let mut result = MultiEntityData::new(registry.into_entities());
    result.title = data.title.clone();
    result.errors = data.errors.clone();
    result.extend_errors(errors);
    result.render_hint = data.render_hint;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::test_support::*;

    fn event_entity(name: &str, start: Time, end: Time) -> SingleEntityData {
        let mut e = SingleEntityData::new(EntityMeta::new(name, name));
        let prices: Vec<f64> = (0..40).map(f64::from).collect();
        e.push_field(daily("Price", day(2020, 1, 1), &prices));
        e.set_weight(Series::weight(vec![
            DataPoint::new(day(2020, 1, 1), 0.0),
            DataPoint::new(start, 1.0),
            DataPoint::new(end, 0.0),
        ]));
        e
    }

    #[test]
    fn test_windows_from_weight_stretches() {
        let w = Series::weight(vec![
            DataPoint::new(day(2020, 1, 1), 0.0),
            DataPoint::new(day(2020, 1, 2), 1.0),
            DataPoint::new(day(2020, 1, 3), 1.0),
            DataPoint::new(day(2020, 1, 4), 0.0),
            DataPoint::new(day(2020, 1, 5), 2.0),
        ]);
        let ws = event_windows(&w);
        assert_eq!(ws.len(), 2);
        assert_eq!((ws[0].start, ws[0].end), (day(2020, 1, 2), day(2020, 1, 4)));
        assert_eq!((ws[1].start, ws[1].end), (day(2020, 1, 5), day(2020, 1, 5)));
    }

    #[test]
    fn test_event_reanchoring() {
        let data = MultiEntityData::new(vec![event_entity("A", day(2020, 1, 10), day(2020, 1, 20))]);
        let cfg = EventAlignment { before_days: 5, after_days: 5, snap_to_market: false };
        let out = align_event_before_after(&data, cfg);

        assert_eq!(out.len(), 1);
        let e = &out.entities[0];
        assert_eq!(e.meta.name, "2020-01-10 to 2020-01-20");
        let price = e.field("Price").unwrap();
        assert_eq!(price.first().unwrap().time, epoch() - Duration::days(5));
        assert_eq!(price.len(), 21);
        // Values are the day offsets from 2020-01-01: 2020-01-05 through 2020-01-25.
        assert_eq!(price.first().unwrap().value, 4.0);
        assert_eq!(price.last().unwrap().value, 24.0);
        let weight = e.weight().unwrap();
        assert_eq!(weight.len(), 21);
        assert!(weight.values().iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_same_window_from_two_entities_merges() {
        let data = MultiEntityData::new(vec![
            event_entity("A", day(2020, 1, 10), day(2020, 1, 20)),
            event_entity("B", day(2020, 1, 10), day(2020, 1, 20)),
        ]);
        let cfg = EventAlignment { before_days: 1, after_days: 1, snap_to_market: false };
        let out = align_event_before_after(&data, cfg);
        assert_eq!(out.len(), 1);
        let labels: Vec<&str> = out.entities[0].fields().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["Price", "Price (B)"]);
    }

    #[test]
    fn test_entities_without_weights_are_reported() {
        let mut e = SingleEntityData::new(EntityMeta::new("X", "x"));
        e.push_field(daily("Price", day(2020, 1, 1), &[1.0]));
        let out = align_event_before_after(&MultiEntityData::new(vec![e]), EventAlignment {
            before_days: 1,
            after_days: 1,
            snap_to_market: false,
        });
        assert!(out.is_empty());
        assert!(out.error().unwrap().contains("X has no event dates"));
    }
}
