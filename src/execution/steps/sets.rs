//! Set algebra over entity collections, keyed by `unique_id`.
//!
//! Membership over time lives in the weight series: an entity is a member on
//! the dates where its weight is nonzero, and on every date when it has no
//! weight series at all. Exclude keeps every left entity and only changes
//! the weight of the shared ones.

use crate::execution::registry::SetOp;
use crate::store::{DataPoint, MultiEntityData, Series, SingleEntityData, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Or,
    And,
    AndNot,
}

impl Rule {
    fn apply(self, a: bool, b: bool) -> bool {
        match self {
            Rule::Or => a || b,
            Rule::And => a && b,
            Rule::AndNot => a && !b,
        }
    }
}

pub fn combine(op: SetOp, left: &MultiEntityData, right: &MultiEntityData) -> MultiEntityData {
    let in_right = |e: &SingleEntityData| right.find(&e.meta.unique_id);
    let in_left = |e: &SingleEntityData| left.find(&e.meta.unique_id);
    let mut entities = Vec::new();

    match op {
        SetOp::Union => {
            for l in &left.entities {
                entities.push(match in_right(l) {
                    Some(r) => merge(l, r, Rule::Or),
                    None => l.clone(),
                });
            }
            entities.extend(right.entities.iter().filter(|r| in_left(r).is_none()).cloned());
        }
        SetOp::Intersect => {
            for l in &left.entities {
                if let Some(r) = in_right(l) {
                    entities.push(merge(l, r, Rule::And));
                }
            }
            entities.retain(is_ever_member);
        }
        SetOp::Exclude => {
            for l in &left.entities {
                let mut e = l.clone();
                if let Some(r) = in_right(l) {
                    e.set_weight(exclude_weight(l, r));
                }
                entities.push(e);
            }
        }
        SetOp::Difference => {
            entities.extend(left.entities.iter().filter(|l| in_right(l).is_none()).cloned());
            entities.extend(right.entities.iter().filter(|r| in_left(r).is_none()).cloned());
        }
    }

    let mut out = MultiEntityData::new(entities);
    out.errors = left.errors.iter().chain(&right.errors).cloned().collect();
    out.render_hint = left.render_hint;
    out
}

fn is_ever_member(e: &SingleEntityData) -> bool {
    e.weight().map_or(true, |w| w.points().iter().any(|p| p.value != 0.0))
}

/// Left membership with the right side's removed. A right entity without
/// weights is a member everywhere, which zeroes the left on all its dates.
fn exclude_weight(l: &SingleEntityData, r: &SingleEntityData) -> Series {
    match r.weight() {
        Some(_) => combine_weights(l.weight(), r.weight(), Rule::AndNot)
            .unwrap_or_else(|| Series::weight(Vec::new())),
        None => {
            let mut dates: Vec<Time> = match l.weight() {
                Some(w) => w.dates(),
                None => l.fields().flat_map(|s| s.dates()).collect(),
            };
            dates.sort();
            dates.dedup();
            Series::weight(dates.into_iter().map(|t| DataPoint::new(t, 0.0)).collect())
        }
    }
}

/// Left entity with the right side's extra fields and the combined weight.
fn merge(l: &SingleEntityData, r: &SingleEntityData, rule: Rule) -> SingleEntityData {
    let mut e = l.clone();
    for s in r.fields() {
        if e.field(s.label()).is_none() {
            e.push_field(s.clone());
        }
    }
    if e.category.is_empty() {
        e.category = r.category.clone();
    }
    match combine_weights(l.weight(), r.weight(), rule) {
        Some(w) => e.set_weight(w),
        None => e.clear_weight(),
    }
    e
}

/// Combines membership on the union of both weight series' dates, carrying
/// each side's last value forward. `None` when neither side has a weight.
fn combine_weights(a: Option<&Series>, b: Option<&Series>, rule: Rule) -> Option<Series> {
    if a.is_none() && b.is_none() {
        return None;
    }
    let mut dates: Vec<Time> = a.into_iter().chain(b).flat_map(|s| s.dates()).collect();
    dates.sort();
    dates.dedup();

    let member = |s: Option<&Series>, t: Time| match s {
        None => true,
        Some(s) => s.value_as_of(t).is_some_and(|p| p.value != 0.0),
    };
    let points = dates
        .into_iter()
        .map(|t| DataPoint::new(t, if rule.apply(member(a, t), member(b, t)) { 1.0 } else { 0.0 }))
        .collect();
    Some(Series::weight(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::test_support::*;
    use crate::store::EntityMeta;

    fn entity(id: &str, weight: Option<&[(Time, f64)]>) -> SingleEntityData {
        let mut e = SingleEntityData::new(EntityMeta::new(id, id));
        e.push_field(daily("P", day(2024, 1, 1), &[1.0, 2.0, 3.0]));
        if let Some(w) = weight {
            e.set_weight(Series::weight(w.iter().map(|&(t, v)| DataPoint::new(t, v)).collect()));
        }
        e
    }

    fn ids(d: &MultiEntityData) -> Vec<&str> {
        d.entities.iter().map(|e| e.meta.unique_id.as_str()).collect()
    }

    #[test]
    fn test_union_ors_weights() {
        let a = [(day(2024, 1, 1), 1.0), (day(2024, 1, 3), 0.0)];
        let b = [(day(2024, 1, 2), 1.0), (day(2024, 1, 4), 0.0)];
        let left = MultiEntityData::new(vec![entity("x", Some(&a))]);
        let right = MultiEntityData::new(vec![entity("x", Some(&b)), entity("z", None)]);

        let out = combine(SetOp::Union, &left, &right);
        assert_eq!(ids(&out), vec!["x", "z"]);
        let w = out.entities[0].weight().map(Series::values);
        // Jan 1 a; Jan 2 a,b; Jan 3 b; Jan 4 none.
        assert_eq!(w, Some(vec![1.0, 1.0, 1.0, 0.0]));
    }

    #[test]
    fn test_intersect_keeps_shared() {
        let left = MultiEntityData::new(vec![entity("x", None), entity("y", None)]);
        let right = MultiEntityData::new(vec![entity("y", None), entity("z", None)]);
        let out = combine(SetOp::Intersect, &left, &right);
        assert_eq!(ids(&out), vec!["y"]);
        assert!(out.entities[0].weight().is_none());
    }

    #[test]
    fn test_exclude_zeroes_shared_entity() {
        let left = MultiEntityData::new(vec![entity("x", None), entity("y", None)]);
        let right = MultiEntityData::new(vec![entity("y", None)]);
        let out = combine(SetOp::Exclude, &left, &right);
        assert_eq!(ids(&out), vec!["x", "y"]);
        assert!(out.entities[0].weight().is_none());
        assert_eq!(out.entities[1].weight().map(Series::values), Some(vec![0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_exclude_weighted_sets() {
        let all = [(day(2024, 1, 1), 1.0), (day(2024, 1, 2), 1.0), (day(2024, 1, 3), 1.0)];
        let left = MultiEntityData::new(vec![entity("x", Some(&all)), entity("y", Some(&all))]);
        let right = MultiEntityData::new(vec![entity("y", Some(&all)), entity("z", Some(&all))]);
        let out = combine(SetOp::Exclude, &left, &right);
        assert_eq!(ids(&out), vec!["x", "y"]);
        assert_eq!(out.entities[0].weight().map(Series::values), Some(vec![1.0, 1.0, 1.0]));
        assert_eq!(out.entities[1].weight().map(Series::values), Some(vec![0.0, 0.0, 0.0]));
        assert_eq!(out.entities[1].field("P").map(Series::len), Some(3));
    }

    #[test]
    fn test_exclude_over_time() {
        let a = [(day(2024, 1, 1), 1.0)];
        let b = [(day(2024, 1, 2), 1.0), (day(2024, 1, 3), 0.0)];
        let left = MultiEntityData::new(vec![entity("x", Some(&a))]);
        let right = MultiEntityData::new(vec![entity("x", Some(&b))]);
        let out = combine(SetOp::Exclude, &left, &right);
        let w = out.entities[0].weight().map(Series::values);
        assert_eq!(w, Some(vec![1.0, 0.0, 1.0]));
    }

    #[test]
    fn test_difference_drops_shared() {
        let left = MultiEntityData::new(vec![entity("x", None), entity("y", None)]);
        let right = MultiEntityData::new(vec![entity("y", None), entity("z", None)]);
        assert_eq!(ids(&combine(SetOp::Difference, &left, &right)), vec!["x", "z"]);
    }
}
