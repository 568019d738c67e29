//! Scalar observations, resample policies and the `Series` container.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Every timestamp in the engine is a UTC instant.
pub type Time = DateTime<Utc>;

/// The synthetic origin used when event windows are re-anchored.
#[inline]
pub fn epoch() -> Time {
    Time::default()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub time: Time,
    pub value: f64,
}

impl DataPoint {
    #[inline(always)]
    pub fn new(time: Time, value: f64) -> Self {
        Self { time, value }
    }
}

/// How gaps are filled (upsample) or how several points collapse into one
/// (downsample) when a series moves onto a different date set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResamplePolicy {
    #[default]
    None,
    LastValue,
    Zero,
    Arithmetic,
    Geometric,
}

impl ResamplePolicy {
    /// Arithmetic and Geometric fold a whole period into one value.
    pub fn is_aggregating(self) -> bool {
        matches!(self, ResamplePolicy::Arithmetic | ResamplePolicy::Geometric)
    }

    fn agree(self, other: ResamplePolicy) -> ResamplePolicy {
        if self == other { self } else { ResamplePolicy::None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesMeta {
    pub label: String,
    pub units: String,
    pub source: String,
    pub vendor_code: String,
    pub upsample: ResamplePolicy,
    pub downsample: ResamplePolicy,
    pub is_transformed: bool,
}

impl Default for SeriesMeta {
    /// A plain level series: gaps carry forward, periods keep their last value.
    fn default() -> Self {
        Self {
            label: String::new(),
            units: String::new(),
            source: String::new(),
            vendor_code: String::new(),
            upsample: ResamplePolicy::LastValue,
            downsample: ResamplePolicy::LastValue,
            is_transformed: false,
        }
    }
}

impl SeriesMeta {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self { label: label.into(), ..Default::default() }
    }

    pub fn with_policies(mut self, upsample: ResamplePolicy, downsample: ResamplePolicy) -> Self {
        self.upsample = upsample;
        self.downsample = downsample;
        self
    }

    /// Metadata for a series derived from `self` and `other`.
    ///
    /// Policies are immutable tags: a policy survives only when both inputs
    /// carry the same one, otherwise it degrades to `None`.
    pub fn combine(&self, other: &SeriesMeta) -> SeriesMeta {
        SeriesMeta {
            label: self.label.clone(),
            units: self.units.clone(),
            source: self.source.clone(),
            vendor_code: self.vendor_code.clone(),
            upsample: self.upsample.agree(other.upsample),
            downsample: self.downsample.agree(other.downsample),
            is_transformed: true,
        }
    }
}

/// An ordered signal with strictly increasing, unique timestamps.
///
/// Points live behind an `Arc` so tree branches can share one series; every
/// mutating method goes through `Arc::make_mut`, which copies the backing
/// vector first whenever another branch still holds it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    pub meta: SeriesMeta,
    points: Arc<Vec<DataPoint>>,
    #[serde(default)]
    pub is_weight: bool,
}

impl Series {
    /// Builds a series, sorting the input and keeping the last write for
    /// duplicated timestamps.
    pub fn new(meta: SeriesMeta, mut points: Vec<DataPoint>) -> Self {
        points.sort_by(|a, b| a.time.cmp(&b.time));
        let mut unique: Vec<DataPoint> = Vec::with_capacity(points.len());
        for p in points {
            match unique.last_mut() {
                Some(last) if last.time == p.time => *last = p,
                _ => unique.push(p),
            }
        }
        Self { meta, points: Arc::new(unique), is_weight: false }
    }

    pub fn empty(meta: SeriesMeta) -> Self {
        Self { meta, points: Arc::new(Vec::new()), is_weight: false }
    }

    pub fn weight(points: Vec<DataPoint>) -> Self {
        let meta = SeriesMeta::labelled("Weight");
        Self { is_weight: true, ..Self::new(meta, points) }
    }

    /// Same metadata, different points.
    pub fn with_points(&self, points: Vec<DataPoint>) -> Self {
        Self { is_weight: self.is_weight, ..Self::new(self.meta.clone(), points) }
    }

    pub fn label(&self) -> &str { &self.meta.label }

    #[inline(always)]
    pub fn len(&self) -> usize { self.points.len() }

    #[inline(always)]
    pub fn is_empty(&self) -> bool { self.points.is_empty() }

    #[inline(always)]
    pub fn points(&self) -> &[DataPoint] { &self.points }

    pub fn dates(&self) -> Vec<Time> {
        self.points.iter().map(|p| p.time).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn first(&self) -> Option<&DataPoint> { self.points.first() }
    pub fn last(&self) -> Option<&DataPoint> { self.points.last() }

    /// True when both handles still share one backing vector.
    pub fn shares_storage(&self, other: &Series) -> bool {
        Arc::ptr_eq(&self.points, &other.points)
    }

    /// Exact-timestamp lookup.
    pub fn value_at(&self, time: Time) -> Option<f64> {
        self.points
            .binary_search_by(|p| p.time.cmp(&time))
            .ok()
            .map(|i| self.points[i].value)
    }

    /// The last point at or before `time`.
    pub fn value_as_of(&self, time: Time) -> Option<&DataPoint> {
        let idx = self.points.partition_point(|p| p.time <= time);
        if idx == 0 { None } else { Some(&self.points[idx - 1]) }
    }

    /// Points inside the inclusive `[begin, end]` interval.
    pub fn slice_between(&self, begin: Time, end: Time) -> &[DataPoint] {
        let lo = self.points.partition_point(|p| p.time < begin);
        let hi = self.points.partition_point(|p| p.time <= end);
        if lo >= hi { &[] } else { &self.points[lo..hi] }
    }

    /// Inserts a point at its ordered position, replacing an equal timestamp.
    pub fn insert(&mut self, point: DataPoint) {
        let points = Arc::make_mut(&mut self.points);
        match points.binary_search_by(|p| p.time.cmp(&point.time)) {
            Ok(i) => points[i] = point,
            Err(i) => points.insert(i, point),
        }
    }

    pub fn retain(&mut self, f: impl FnMut(&DataPoint) -> bool) {
        Arc::make_mut(&mut self.points).retain(f);
    }

    pub fn map_values(&mut self, mut f: impl FnMut(f64) -> f64) {
        for p in Arc::make_mut(&mut self.points).iter_mut() {
            p.value = f(p.value);
        }
    }

    /// Keeps only the points inside `[begin, end]`.
    pub fn truncate_to(&mut self, begin: Time, end: Time) {
        let kept = self.slice_between(begin, end).to_vec();
        self.points = Arc::new(kept);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    pub fn day(y: i32, m: u32, d: u32) -> Time {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    pub fn series(label: &str, pts: &[(Time, f64)]) -> Series {
        Series::new(
            SeriesMeta::labelled(label),
            pts.iter().map(|&(t, v)| DataPoint::new(t, v)).collect(),
        )
    }

    pub fn daily(label: &str, start: Time, values: &[f64]) -> Series {
        let pts = values
            .iter()
            .enumerate()
            .map(|(i, &v)| DataPoint::new(start + chrono::Duration::days(i as i64), v))
            .collect();
        Series::new(SeriesMeta::labelled(label), pts)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_new_sorts_and_dedups_last_write_wins() {
        let s = series("P", &[(day(2020, 1, 3), 3.0), (day(2020, 1, 1), 1.0), (day(2020, 1, 3), 4.0)]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.values(), vec![1.0, 4.0]);
    }

    #[test]
    fn test_mutation_copies_shared_storage() {
        let a = daily("P", day(2020, 1, 1), &[1.0, 2.0, 3.0]);
        let mut b = a.clone();
        assert!(a.shares_storage(&b));

        b.map_values(|v| v * 10.0);
        assert!(!a.shares_storage(&b));
        assert_eq!(a.values(), vec![1.0, 2.0, 3.0]);
        assert_eq!(b.values(), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_lookups() {
        let s = daily("P", day(2020, 1, 1), &[1.0, 2.0, 3.0]);
        assert_eq!(s.value_at(day(2020, 1, 2)), Some(2.0));
        assert_eq!(s.value_at(day(2020, 1, 5)), None);
        assert_eq!(s.value_as_of(day(2020, 1, 9)).map(|p| p.value), Some(3.0));
        assert!(s.value_as_of(day(2019, 12, 31)).is_none());
        assert_eq!(s.slice_between(day(2020, 1, 2), day(2020, 1, 3)).len(), 2);
    }

    #[test]
    fn test_combine_degrades_differing_policies() {
        let a = SeriesMeta::labelled("A").with_policies(ResamplePolicy::Zero, ResamplePolicy::Arithmetic);
        let b = SeriesMeta::labelled("B").with_policies(ResamplePolicy::Zero, ResamplePolicy::Geometric);
        let c = a.combine(&b);
        assert_eq!(c.upsample, ResamplePolicy::Zero);
        assert_eq!(c.downsample, ResamplePolicy::None);
        assert!(c.is_transformed);
    }
}
