//! Entities and the multi-entity result that flows between tree nodes.

use super::types::{Series, Time};
use serde::{Deserialize, Serialize};

/// Category assigned to entities that carry no classification.
pub const DEFAULT_CATEGORY: &str = "All";

pub type CategoryId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPoint {
    pub time: Time,
    pub id: CategoryId,
}

/// A sparse step function: a point is stored only when the active category
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategorySeries {
    points: Vec<CategoryPoint>,
    labels: Vec<String>,
}

impl CategorySeries {
    pub fn new() -> Self { Self::default() }

    /// A single label active from the beginning of time.
    pub fn constant(label: &str) -> Self {
        let mut cs = Self::new();
        cs.set(Time::MIN_UTC, label);
        cs
    }

    pub fn is_empty(&self) -> bool { self.points.is_empty() }

    pub fn points(&self) -> &[CategoryPoint] { &self.points }

    fn intern(&mut self, label: &str) -> CategoryId {
        match self.labels.iter().position(|l| l == label) {
            Some(i) => i as CategoryId,
            None => {
                self.labels.push(label.to_string());
                (self.labels.len() - 1) as CategoryId
            }
        }
    }

    /// Makes `label` active from `time` on.
    ///
    /// Points are expected in time order; a point at the same timestamp as the
    /// last one overwrites it.
    pub fn set(&mut self, time: Time, label: &str) {
        let id = self.intern(label);
        match self.points.last_mut() {
            Some(last) if last.time == time => {
                last.id = id;
                let len = self.points.len();
                if len >= 2 && self.points[len - 2].id == id {
                    self.points.pop();
                }
            }
            Some(last) if last.id == id => {}
            Some(last) if last.time > time => {
                // Out-of-order write: rebuild through the ordered insert path.
                self.insert_unordered(time, id);
            }
            _ => self.points.push(CategoryPoint { time, id }),
        }
    }

    fn insert_unordered(&mut self, time: Time, id: CategoryId) {
        let idx = self.points.partition_point(|p| p.time < time);
        if idx < self.points.len() && self.points[idx].time == time {
            self.points[idx].id = id;
        } else {
            self.points.insert(idx, CategoryPoint { time, id });
        }
        self.points.dedup_by(|b, a| a.id == b.id);
    }

    pub fn label(&self, id: CategoryId) -> Option<&str> {
        self.labels.get(id as usize).map(String::as_str)
    }

    /// The label active at or before `time`.
    pub fn label_at(&self, time: Time) -> Option<&str> {
        let mut active = None;
        for p in &self.points {
            if p.time > time {
                break;
            }
            active = Some(p.id);
        }
        active.and_then(|id| self.label(id))
    }

    /// Distinct labels that are actually referenced, in first-use order.
    pub fn labels(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for p in &self.points {
            if let Some(l) = self.label(p.id) {
                if !out.contains(&l) {
                    out.push(l);
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityMeta {
    pub name: String,
    /// The only valid join key across set operations.
    pub unique_id: String,
    #[serde(default)]
    pub is_custom: bool,
}

impl EntityMeta {
    pub fn new(name: impl Into<String>, unique_id: impl Into<String>) -> Self {
        Self { name: name.into(), unique_id: unique_id.into(), is_custom: false }
    }
}

/// One entity's bundle of series, at most one of which is the weight series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SingleEntityData {
    pub meta: EntityMeta,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub category: CategorySeries,
}

impl SingleEntityData {
    pub fn new(meta: EntityMeta) -> Self {
        Self { meta, ..Default::default() }
    }

    pub fn weight(&self) -> Option<&Series> {
        self.series.iter().find(|s| s.is_weight)
    }

    pub fn weight_mut(&mut self) -> Option<&mut Series> {
        self.series.iter_mut().find(|s| s.is_weight)
    }

    /// Installs `weight` as the entity's only weight series.
    pub fn set_weight(&mut self, mut weight: Series) {
        weight.is_weight = true;
        self.series.retain(|s| !s.is_weight);
        self.series.push(weight);
    }

    pub fn clear_weight(&mut self) {
        self.series.retain(|s| !s.is_weight);
    }

    pub fn fields(&self) -> impl Iterator<Item = &Series> {
        self.series.iter().filter(|s| !s.is_weight)
    }

    pub fn fields_mut(&mut self) -> impl Iterator<Item = &mut Series> {
        self.series.iter_mut().filter(|s| !s.is_weight)
    }

    pub fn field(&self, label: &str) -> Option<&Series> {
        self.fields().find(|s| s.meta.label == label)
    }

    pub fn push_field(&mut self, mut series: Series) {
        series.is_weight = false;
        self.series.push(series);
    }

    /// Replaces every non-weight series, keeping the weight series in place.
    pub fn replace_fields(&mut self, fields: Vec<Series>) {
        self.series.retain(|s| s.is_weight);
        self.series.extend(fields);
    }

    pub fn category_at(&self, time: Time) -> &str {
        self.category.label_at(time).unwrap_or(DEFAULT_CATEGORY)
    }

    /// True when some dates fall under [`DEFAULT_CATEGORY`]: the entity has
    /// no category points, or data before the first one.
    pub fn has_default_category_dates(&self) -> bool {
        match (self.category.points().first(), self.span()) {
            (None, _) => true,
            (Some(first), Some((begin, _))) => begin < first.time,
            (Some(_), None) => false,
        }
    }

    /// Earliest and latest timestamps across all series.
    pub fn span(&self) -> Option<(Time, Time)> {
        let first = self.series.iter().filter_map(|s| s.first()).map(|p| p.time).min()?;
        let last = self.series.iter().filter_map(|s| s.last()).map(|p| p.time).max()?;
        Some((first, last))
    }
}

/// Hint for the rendering consumers; it never changes computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderHint {
    #[default]
    Line,
    Column,
    Table,
    BoxPlot,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultiEntityData {
    pub entities: Vec<SingleEntityData>,
    #[serde(default)]
    pub title: String,
    /// Human-readable trail of non-fatal problems, oldest first.
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub render_hint: RenderHint,
}

impl MultiEntityData {
    pub fn new(entities: Vec<SingleEntityData>) -> Self {
        Self { entities, ..Default::default() }
    }

    pub fn len(&self) -> usize { self.entities.len() }
    pub fn is_empty(&self) -> bool { self.entities.is_empty() }

    pub fn record_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn extend_errors<I: IntoIterator<Item = String>>(&mut self, errs: I) {
        self.errors.extend(errs);
    }

    /// The accumulated trail, or `None` when nothing went wrong.
    pub fn error(&self) -> Option<String> {
        if self.errors.is_empty() { None } else { Some(self.errors.join("; ")) }
    }

    pub fn find(&self, unique_id: &str) -> Option<&SingleEntityData> {
        self.entities.iter().find(|e| e.meta.unique_id == unique_id)
    }

    pub fn find_mut(&mut self, unique_id: &str) -> Option<&mut SingleEntityData> {
        self.entities.iter_mut().find(|e| e.meta.unique_id == unique_id)
    }

    /// Distinct non-weight series labels in first-seen order.
    pub fn field_labels(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for s in self.entities.iter().flat_map(|e| e.fields()) {
            if !out.iter().any(|l| l == &s.meta.label) {
                out.push(s.meta.label.clone());
            }
        }
        out
    }

    /// Distinct category labels; entities with uncategorized dates
    /// contribute [`DEFAULT_CATEGORY`].
    pub fn category_labels(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for e in &self.entities {
            let mut labels = e.category.labels();
            if e.has_default_category_dates() {
                labels.insert(0, DEFAULT_CATEGORY);
            }
            for l in labels {
                if !out.iter().any(|x| x == l) {
                    out.push(l.to_string());
                }
            }
        }
        out
    }

    /// Earliest and latest timestamps across every entity.
    pub fn span(&self) -> Option<(Time, Time)> {
        let spans: Vec<(Time, Time)> = self.entities.iter().filter_map(|e| e.span()).collect();
        let first = spans.iter().map(|s| s.0).min()?;
        let last = spans.iter().map(|s| s.1).max()?;
        Some((first, last))
    }

    /// Sorted union of every series' timestamps.
    pub fn all_dates(&self) -> Vec<Time> {
        let mut dates: Vec<Time> = self
            .entities
            .iter()
            .flat_map(|e| e.series.iter())
            .flat_map(|s| s.points().iter().map(|p| p.time))
            .collect();
        dates.sort();
        dates.dedup();
        dates
    }
}
