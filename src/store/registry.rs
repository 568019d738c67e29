use super::entity::SingleEntityData;
use std::collections::{HashMap, HashSet};

/// Which entity field identifies "the same" entity when merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKey {
    UniqueId,
    Name,
}

/// Accumulates entities from several sources, merging the ones that share a
/// key while keeping every series label unique within an entity.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    key: MergeKey,
    entities: Vec<SingleEntityData>,
    index: HashMap<String, usize>,
    // Ephemeral per-entity label sets for uniqueness checks
    used_labels: Vec<HashSet<String>>,
}

impl EntityRegistry {
    pub fn new(key: MergeKey) -> Self {
        Self { key, entities: Vec::new(), index: HashMap::new(), used_labels: Vec::new() }
    }

    pub fn count(&self) -> usize { self.entities.len() }

    fn key_of<'e>(&self, entity: &'e SingleEntityData) -> &'e str {
        match self.key {
            MergeKey::UniqueId => &entity.meta.unique_id,
            MergeKey::Name => &entity.meta.name,
        }
    }

    /// Adds `entity`, merging into an existing one with the same key.
    ///
    /// On merge the incoming weight only fills dates where the existing
    /// weight is missing or zero, so the first nonzero weight wins. A field
    /// whose label is already taken is renamed with `source` (or a counter).
    pub fn add(&mut self, entity: SingleEntityData, source: Option<&str>) -> usize {
        let key = self.key_of(&entity).to_string();
        let Some(&idx) = self.index.get(&key) else {
            let idx = self.entities.len();
            self.used_labels.push(entity.fields().map(|s| s.meta.label.clone()).collect());
            self.entities.push(entity);
            self.index.insert(key, idx);
            return idx;
        };

        let SingleEntityData { series, category, .. } = entity;
        let target = &mut self.entities[idx];
        let used = &mut self.used_labels[idx];

        if target.category.is_empty() && !category.is_empty() {
            target.category = category;
        }

        for mut s in series {
            if s.is_weight {
                match target.weight_mut() {
                    None => target.set_weight(s),
                    Some(existing) => {
                        for p in s.points() {
                            match existing.value_at(p.time) {
                                Some(v) if v != 0.0 => {}
                                _ => existing.insert(*p),
                            }
                        }
                    }
                }
                continue;
            }

            // --- Unique Label Enforcement ---
            let original = s.meta.label.clone();
            let mut candidate = match source {
                Some(src) if used.contains(&original) => format!("{} ({})", original, src),
                _ => original.clone(),
            };
            let mut counter = 1;
            while used.contains(&candidate) {
                candidate = format!("{}_{}", original, counter);
                counter += 1;
            }
            used.insert(candidate.clone());
            s.meta.label = candidate;
            target.push_field(s);
        }
        idx
    }

    pub fn into_entities(self) -> Vec<SingleEntityData> {
        self.entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::entity::EntityMeta;
    use crate::store::types::test_support::*;
    use crate::store::types::Series;
    use crate::store::DataPoint;

    fn entity(name: &str, id: &str, field: &str) -> SingleEntityData {
        let mut e = SingleEntityData::new(EntityMeta::new(name, id));
        e.push_field(daily(field, day(2020, 1, 1), &[1.0, 2.0]));
        e
    }

    #[test]
    fn test_merge_by_name_suffixes_colliding_labels() {
        let mut reg = EntityRegistry::new(MergeKey::Name);
        reg.add(entity("W", "a", "Price"), Some("AAPL"));
        reg.add(entity("W", "b", "Price"), Some("MSFT"));
        reg.add(entity("V", "c", "Price"), Some("IBM"));

        assert_eq!(reg.count(), 2);
        let out = reg.into_entities();
        let labels: Vec<&str> = out[0].fields().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["Price", "Price (MSFT)"]);
    }

    #[test]
    fn test_merge_keeps_first_nonzero_weight() {
        let mut reg = EntityRegistry::new(MergeKey::UniqueId);
        let mut a = entity("A", "x", "F1");
        a.set_weight(Series::weight(vec![DataPoint::new(day(2020, 1, 1), 0.0), DataPoint::new(day(2020, 1, 2), 3.0)]));
        let mut b = entity("A", "x", "F2");
        b.set_weight(Series::weight(vec![DataPoint::new(day(2020, 1, 1), 5.0), DataPoint::new(day(2020, 1, 2), 7.0)]));

        reg.add(a, None);
        reg.add(b, None);
        let out = reg.into_entities();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].weight().map(|w| w.values()), Some(vec![5.0, 3.0]));
        assert_eq!(out[0].fields().count(), 2);
    }
}
