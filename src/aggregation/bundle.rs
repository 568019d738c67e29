//! Groups one field of one category across entities, date by date.

use crate::resample::Resampler;
use crate::store::{DataPoint, MultiEntityData, Series, SeriesMeta, SingleEntityData, Time, DEFAULT_CATEGORY};

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRow {
    /// Index into the source `MultiEntityData::entities`.
    pub entity: usize,
    pub point: DataPoint,
    pub category: String,
    pub weight: f64,
}

/// Every entity's contribution on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct DataForAggregation {
    pub time: Time,
    pub rows: Vec<AggregationRow>,
}

impl DataForAggregation {
    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.point.value).collect()
    }
}

/// One (field, category) pair of the cross product, resampled onto the
/// union of its candidates' dates.
#[derive(Debug, Clone)]
pub struct FieldCategoryBundle {
    pub field: String,
    pub category: String,
    pub meta: SeriesMeta,
    pub dates: Vec<Time>,
    pub by_date: Vec<DataForAggregation>,
    /// Candidate entities with their resampled field and weight series.
    pub members: Vec<BundleMember>,
}

#[derive(Debug, Clone)]
pub struct BundleMember {
    pub entity: usize,
    pub field: Series,
    pub weight: Option<Series>,
}

fn belongs_to(entity: &SingleEntityData, category: &str) -> bool {
    entity.category.labels().contains(&category)
        || (category == DEFAULT_CATEGORY && entity.has_default_category_dates())
}

pub fn build_bundle(data: &MultiEntityData, field: &str, category: &str) -> Option<FieldCategoryBundle> {
    let candidates: Vec<(usize, &Series)> = data
        .entities
        .iter()
        .enumerate()
        .filter(|(_, e)| belongs_to(e, category))
        .filter_map(|(i, e)| e.field(field).map(|s| (i, s)))
        .collect();
    let (_, first) = candidates.first()?;
    let meta = first.meta.clone();

    let mut dates: Vec<Time> = candidates.iter().flat_map(|(_, s)| s.dates()).collect();
    dates.sort();
    dates.dedup();
    let resampler = Resampler::new(dates, false, false);
    let dates = resampler.dates().to_vec();

    let members: Vec<BundleMember> = candidates
        .iter()
        .map(|&(i, s)| {
            let weight = data.entities[i].weight();
            BundleMember {
                entity: i,
                field: resampler.apply_series(s, weight),
                weight: weight.map(|w| resampler.apply_series(w, None)),
            }
        })
        .collect();

    let by_date = dates
        .iter()
        .map(|&time| {
            let rows = members
                .iter()
                .filter(|m| data.entities[m.entity].category_at(time) == category)
                .filter_map(|m| {
                    let value = m.field.value_at(time)?;
                    let weight = m.weight.as_ref().and_then(|w| w.value_at(time)).unwrap_or(1.0);
                    Some(AggregationRow {
                        entity: m.entity,
                        point: DataPoint::new(time, value),
                        category: category.to_string(),
                        weight,
                    })
                })
                .collect();
            DataForAggregation { time, rows }
        })
        .collect();

    Some(FieldCategoryBundle {
        field: field.to_string(),
        category: category.to_string(),
        meta,
        dates,
        by_date,
        members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::test_support::*;
    use crate::store::{CategorySeries, EntityMeta};

    #[test]
    fn test_rows_follow_category_changes() {
        let mut a = SingleEntityData::new(EntityMeta::new("A", "a"));
        a.push_field(daily("P", day(2020, 1, 1), &[1.0, 2.0, 3.0]));
        let mut cat = CategorySeries::new();
        cat.set(day(2020, 1, 1), "Tech");
        cat.set(day(2020, 1, 3), "Energy");
        a.category = cat;
        let mut b = SingleEntityData::new(EntityMeta::new("B", "b"));
        b.push_field(daily("P", day(2020, 1, 2), &[5.0, 6.0]));
        b.category = CategorySeries::constant("Tech");

        let data = MultiEntityData::new(vec![a, b]);
        let bundle = build_bundle(&data, "P", "Tech").unwrap();
        assert_eq!(bundle.dates.len(), 3);
        let counts: Vec<usize> = bundle.by_date.iter().map(|d| d.rows.len()).collect();
        assert_eq!(counts, vec![1, 2, 1]);
        assert_eq!(bundle.by_date[2].rows[0].entity, 1);
        assert!(bundle.by_date.iter().flat_map(|d| &d.rows).all(|r| r.weight == 1.0));

        assert!(build_bundle(&data, "Missing", "Tech").is_none());
    }

    #[test]
    fn test_dates_before_first_category_fall_under_default() {
        let mut a = SingleEntityData::new(EntityMeta::new("A", "a"));
        a.push_field(daily("P", day(2020, 1, 1), &[1.0, 2.0, 3.0]));
        let mut cat = CategorySeries::new();
        cat.set(day(2020, 1, 3), "Tech");
        a.category = cat;

        let data = MultiEntityData::new(vec![a]);
        assert_eq!(data.category_labels(), vec![DEFAULT_CATEGORY.to_string(), "Tech".to_string()]);
        let early = build_bundle(&data, "P", DEFAULT_CATEGORY).unwrap();
        let counts: Vec<usize> = early.by_date.iter().map(|d| d.rows.len()).collect();
        assert_eq!(counts, vec![1, 1, 0]);
    }
}
