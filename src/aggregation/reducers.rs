use super::bundle::{build_bundle, DataForAggregation, FieldCategoryBundle};
use crate::compute::kernel;
use crate::store::{
    CategorySeries, DataPoint, EntityMeta, EntityRegistry, MergeKey, MultiEntityData, Series, SeriesMeta,
    SingleEntityData, Time,
};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Average,
    Count,
    PercentPositive,
    Median,
    Boxplot,
    TopN(usize),
    BottomN(usize),
    Quantile(usize),
}

const BOX_ROWS: [&str; 5] = ["Min", "Q1", "Median", "Q3", "Max"];

impl Reducer {
    /// Classifying reducers keep the source entities instead of producing
    /// one synthetic entity per category.
    pub fn is_per_entity(self) -> bool {
        matches!(self, Reducer::TopN(_) | Reducer::BottomN(_) | Reducer::Quantile(_))
    }
}

/// Folds every (field, category) pair of `data` with `reducer` and unions the
/// outputs into one result.
pub fn cross_entity_aggregation(reducer: Reducer, data: &MultiEntityData) -> MultiEntityData {
    let mut registry = EntityRegistry::new(MergeKey::UniqueId);
    let mut placements = Placements::new(data.len());

    for field in data.field_labels() {
        for category in data.category_labels() {
            let Some(bundle) = build_bundle(data, &field, &category) else { continue };
            debug!(field = %field, category = %category, dates = bundle.dates.len(), ?reducer, "aggregating");
            match reducer {
                Reducer::TopN(n) => placements.extend(rank(&bundle, n, true)),
                Reducer::BottomN(n) => placements.extend(rank(&bundle, n, false)),
                Reducer::Quantile(n) => placements.extend(classify(&bundle, n)),
                _ => {
                    for entity in reduce(reducer, &bundle) {
                        registry.add(entity, None);
                    }
                }
            }
        }
    }

    let entities = if reducer.is_per_entity() { placements.into_entities(data) } else { registry.into_entities() };
    let mut out = MultiEntityData::new(entities);
    out.title = data.title.clone();
    out.errors = data.errors.clone();
    out.render_hint = data.render_hint;
    out
}

/// One source entity's share of a classifying reducer within one bundle,
/// restricted to the dates the entity spent in the bundle's category.
#[derive(Debug, Clone)]
struct Placement {
    entity: usize,
    field: Series,
    weight: Option<Series>,
    labels: Vec<(Time, String)>,
}

#[derive(Debug, Clone, Default)]
struct Placed {
    fields: Vec<Series>,
    weight: Option<Series>,
    labels: BTreeMap<Time, String>,
}

/// Merges placements by source entity and date, so an entity that changes
/// category keeps one series per field.
struct Placements {
    slots: Vec<Option<Placed>>,
}

impl Placements {
    fn new(len: usize) -> Self {
        Self { slots: vec![None; len] }
    }

    fn extend(&mut self, placements: Vec<Placement>) {
        for p in placements {
            let Some(slot) = self.slots.get_mut(p.entity) else { continue };
            let placed = slot.get_or_insert_with(Placed::default);

            match placed.fields.iter_mut().find(|s| s.label() == p.field.label()) {
                Some(existing) => p.field.points().iter().for_each(|pt| existing.insert(*pt)),
                None => placed.fields.push(p.field),
            }
            if let Some(w) = p.weight {
                match &mut placed.weight {
                    Some(existing) => w.points().iter().for_each(|pt| existing.insert(*pt)),
                    None => placed.weight = Some(w),
                }
            }
            // First field's bucket wins on a shared date.
            for (t, label) in p.labels {
                placed.labels.entry(t).or_insert(label);
            }
        }
    }

    fn into_entities(self, data: &MultiEntityData) -> Vec<SingleEntityData> {
        self.slots
            .into_iter()
            .zip(&data.entities)
            .filter_map(|(slot, source)| {
                let placed = slot?;
                let mut e = SingleEntityData::new(source.meta.clone());
                for field in placed.fields {
                    e.push_field(field);
                }
                if let Some(w) = placed.weight {
                    e.set_weight(w);
                }
                e.category = if placed.labels.is_empty() {
                    source.category.clone()
                } else {
                    let mut category = CategorySeries::new();
                    for (t, label) in &placed.labels {
                        category.set(*t, label);
                    }
                    category
                };
                Some(e)
            })
            .collect()
    }
}

fn reduce(reducer: Reducer, bundle: &FieldCategoryBundle) -> Vec<SingleEntityData> {
    match reducer {
        Reducer::Sum => vec![scalar_entity(bundle, &bundle.category, |d| Some(kernel::sum(&d.values())))],
        Reducer::Average => vec![scalar_entity(bundle, &bundle.category, weighted_average)],
        Reducer::Count => vec![scalar_entity(bundle, &bundle.category, |d| Some(d.rows.len() as f64))],
        Reducer::PercentPositive => vec![scalar_entity(bundle, &bundle.category, |d| {
            let n = d.rows.len() as f64;
            let pos = d.rows.iter().filter(|r| r.point.value > 0.0).count() as f64;
            Some(100.0 * pos / n)
        })],
        Reducer::Median => vec![scalar_entity(bundle, &bundle.category, |d| kernel::median(&d.values()))],
        Reducer::Boxplot => BOX_ROWS
            .iter()
            .enumerate()
            .map(|(k, row)| {
                let name = format!("{} {}", bundle.category, row);
                scalar_entity(bundle, &name, |d| {
                    let mut v = d.values();
                    v.sort_by(|a, b| a.total_cmp(b));
                    kernel::quantile_sorted(&v, k as f64 / 4.0)
                })
            })
            .collect(),
        Reducer::TopN(_) | Reducer::BottomN(_) | Reducer::Quantile(_) => Vec::new(),
    }
}

fn weighted_average(d: &DataForAggregation) -> Option<f64> {
    let sw: f64 = d.rows.iter().map(|r| r.weight).sum();
    if sw == 0.0 {
        return kernel::mean(&d.values());
    }
    Some(d.rows.iter().map(|r| r.weight * r.point.value).sum::<f64>() / sw)
}

/// One synthetic entity with one point per non-empty date.
fn scalar_entity<F>(bundle: &FieldCategoryBundle, name: &str, f: F) -> SingleEntityData
where
    F: Fn(&DataForAggregation) -> Option<f64>,
{
    let points = bundle
        .by_date
        .iter()
        .filter(|d| !d.rows.is_empty())
        .filter_map(|d| f(d).map(|v| DataPoint::new(d.time, v)))
        .collect();
    let meta = SeriesMeta { is_transformed: true, ..bundle.meta.clone() };

    let mut e = SingleEntityData::new(EntityMeta { is_custom: true, ..EntityMeta::new(name, name) });
    e.push_field(Series::new(meta, points));
    e.category = CategorySeries::constant(&bundle.category);
    e
}

/// Keeps the `n` heaviest (or lightest) rows per date; the rest get weight 0
/// and disappear from the field series.
fn rank(bundle: &FieldCategoryBundle, n: usize, descending: bool) -> Vec<Placement> {
    let mut weights: Vec<Vec<DataPoint>> = vec![Vec::new(); bundle.members.len()];
    let member_of = |entity: usize| bundle.members.iter().position(|m| m.entity == entity);

    for d in &bundle.by_date {
        let mut rows: Vec<_> = d.rows.iter().collect();
        // Stable: ties keep entity order.
        if descending {
            rows.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        } else {
            rows.sort_by(|a, b| a.weight.total_cmp(&b.weight));
        }
        for (rank, row) in rows.iter().enumerate() {
            let Some(m) = member_of(row.entity) else { continue };
            let w = if rank < n { row.weight } else { 0.0 };
            weights[m].push(DataPoint::new(d.time, w));
        }
    }

    bundle
        .members
        .iter()
        .zip(weights)
        .map(|(m, w)| {
            let weight = Series::weight(w);
            let mut field = m.field.clone();
            field.retain(|p| matches!(weight.value_at(p.time), Some(v) if v != 0.0));
            Placement { entity: m.entity, field, weight: Some(weight), labels: Vec::new() }
        })
        .collect()
}

pub fn ordinal(k: usize) -> String {
    let suffix = match (k % 10, k % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", k, suffix)
}

pub fn quantile_label(k: usize, n: usize) -> String {
    let name = match n {
        4 => "Quartile",
        5 => "Quintile",
        10 => "Decile",
        _ => "Quantile",
    };
    format!("{} {}", ordinal(k), name)
}

/// Bucket (1-based) of `value` given ascending cut points.
pub fn bucket_of(value: f64, cuts: &[f64]) -> usize {
    cuts.iter().position(|c| value <= *c).map_or(cuts.len(), |i| i + 1)
}

/// Assigns each entity, date by date, the quantile bucket of its value within
/// the bundle; the bucket becomes the entity's category.
fn classify(bundle: &FieldCategoryBundle, n: usize) -> Vec<Placement> {
    let n = n.max(1);
    let mut labels: Vec<Vec<(Time, String)>> = vec![Vec::new(); bundle.members.len()];

    for d in &bundle.by_date {
        let mut sorted = d.values();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let cuts: Vec<f64> =
            (1..=n).filter_map(|k| kernel::quantile_sorted(&sorted, k as f64 / n as f64)).collect();
        for row in &d.rows {
            let Some(m) = bundle.members.iter().position(|m| m.entity == row.entity) else { continue };
            labels[m].push((d.time, quantile_label(bucket_of(row.point.value, &cuts), n)));
        }
    }

    bundle
        .members
        .iter()
        .zip(labels)
        .map(|(m, labels)| {
            let placed = |t: Time| labels.iter().any(|(lt, _)| *lt == t);
            let mut field = m.field.clone();
            field.retain(|p| placed(p.time));
            let weight = m.weight.clone().map(|mut w| {
                w.retain(|p| placed(p.time));
                w
            });
            Placement { entity: m.entity, field, weight, labels }
        })
        .collect()
}
