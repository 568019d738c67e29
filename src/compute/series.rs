//! Applies a compiled formula to every entity of a result.

use crate::analysis::telemetry::ProgramReport;
use crate::compute::bytecode::Expression;
use crate::compute::engine::{Engine, EvalContext};
use crate::compute::ledger::{Ledger, VmError};
use crate::resample::align_common;
use crate::store::{DataPoint, MultiEntityData, Series, SingleEntityData};
use tracing::debug;

pub fn apply_formula(expr: &Expression, data: &MultiEntityData) -> MultiEntityData {
    let report = ProgramReport::analyze(expr);
    let mut out = data.clone();
    let mut errors = Vec::new();

    for entity in out.entities.iter_mut() {
        match apply_to_entity(expr, &report, entity) {
            Ok(fields) => entity.replace_fields(fields),
            Err(e) => {
                errors.push(format!("Formula '{}' failed for {}: {}", expr.source, entity.meta.name, e));
                entity.replace_fields(Vec::new());
            }
        }
    }
    out.extend_errors(errors);
    out
}

fn apply_to_entity(
    expr: &Expression,
    report: &ProgramReport,
    entity: &SingleEntityData,
) -> Result<Vec<Series>, VmError> {
    let fields: Vec<Series> = entity.fields().cloned().collect();
    if let Some(&max) = report.specific.iter().next_back() {
        if max >= fields.len() {
            return Err(VmError::MissingSeries(max + 1));
        }
    }

    if report.uses_general {
        let mut outputs = Vec::with_capacity(fields.len());
        for general in &fields {
            let (driver, aligned) = aligned_inputs(report, general, &fields);
            let points = run(expr, report, &aligned, Some(&driver), &driver, entity)?;
            let mut meta = general.meta.clone();
            meta.is_transformed = true;
            outputs.push(Series::new(meta, points));
        }
        return Ok(outputs);
    }

    let Some(first) = fields.get(report.lowest_specific().unwrap_or(0)) else {
        return Ok(Vec::new());
    };
    let (driver, aligned) = aligned_inputs(report, first, &fields);
    let points = run(expr, report, &aligned, None, &driver, entity)?;

    let mut metas = report.specific.iter().map(|&i| &fields[i].meta);
    let mut meta = match metas.next() {
        Some(m) => metas.fold(m.clone(), |acc, m| acc.combine(m)),
        None => first.meta.clone(),
    };
    meta.label = expr.source.clone();
    meta.is_transformed = true;
    Ok(vec![Series::new(meta, points)])
}

/// When two or more different specific series are referenced they are
/// force-aligned onto the driver's dates; the driver is trimmed with them.
fn aligned_inputs(report: &ProgramReport, driver: &Series, fields: &[Series]) -> (Series, Vec<Series>) {
    if !report.needs_alignment() {
        return (driver.clone(), fields.to_vec());
    }
    let mut group = vec![driver.clone()];
    group.extend(report.specific.iter().map(|&i| fields[i].clone()));
    let mut aligned = align_common(&group).into_iter();
    let driver = aligned.next().unwrap_or_default();

    let mut out = fields.to_vec();
    for (&i, s) in report.specific.iter().zip(aligned) {
        out[i] = s;
    }
    (driver, out)
}

fn run(
    expr: &Expression,
    report: &ProgramReport,
    fields: &[Series],
    general: Option<&Series>,
    driver: &Series,
    entity: &SingleEntityData,
) -> Result<Vec<DataPoint>, VmError> {
    let category = if entity.category.is_empty() { None } else { Some(&entity.category) };
    let mut ledger = Ledger::with_capacity(driver.len());
    let positions = if report.is_time_varying() {
        0..driver.len()
    } else {
        driver.len().saturating_sub(1)..driver.len()
    };

    let mut points = Vec::with_capacity(positions.len());
    for position in positions {
        let ctx = EvalContext { fields, general, driver, category, position, ledger: &ledger };
        let value = match Engine::evaluate(expr, &ctx) {
            Ok(v) => Some(v),
            Err(e) if e.is_point_local() => {
                debug!(formula = %expr.source, position, error = %e, "skipping output point");
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(v) = value {
            points.push(DataPoint::new(driver.points()[position].time, v));
        }
        ledger.push(value);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::bytecode::compile;
    use crate::store::types::test_support::*;
    use crate::store::{EntityMeta, ResamplePolicy};

    fn entity(fields: Vec<Series>) -> MultiEntityData {
        let mut e = SingleEntityData::new(EntityMeta::new("A", "a"));
        for f in fields {
            e.push_field(f);
        }
        MultiEntityData::new(vec![e])
    }

    #[test]
    fn test_broadcast_over_every_field() {
        let data = entity(vec![
            daily("P", day(2020, 1, 1), &[1.0, 2.0, 4.0]),
            daily("Q", day(2020, 1, 1), &[10.0, 20.0]),
        ]);
        let out = apply_formula(&compile("val / val[t-1] - 1").unwrap(), &data);
        let e = &out.entities[0];
        assert_eq!(e.fields().count(), 2);
        // The first position has no predecessor and is skipped.
        assert_eq!(e.field("P").unwrap().values(), vec![1.0, 1.0]);
        assert_eq!(e.field("Q").unwrap().values(), vec![1.0]);
        assert!(e.field("P").unwrap().meta.is_transformed);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_non_time_varying_evaluates_once_at_last_date() {
        let data = entity(vec![daily("P", day(2020, 1, 1), &[100.0, 110.0, 121.0])]);
        let out = apply_formula(&compile("val[end] / val[begin] - 1").unwrap(), &data);
        let p = out.entities[0].field("P").unwrap();
        assert_eq!(p.len(), 1);
        assert_eq!(p.first().unwrap().time, day(2020, 1, 3));
        assert!((p.first().unwrap().value - 0.21).abs() < 1e-12);
    }

    #[test]
    fn test_specific_alignment_and_metadata() {
        let a = daily("A", day(2020, 1, 1), &[1.0, 2.0, 3.0]);
        let mut b = series("B", &[(day(2020, 1, 2), 10.0)]);
        b.meta.downsample = ResamplePolicy::Arithmetic;
        let out = apply_formula(&compile("val1 + val2").unwrap(), &entity(vec![a, b]));

        let s = out.entities[0].field("val1 + val2").unwrap();
        assert_eq!(s.dates(), vec![day(2020, 1, 2), day(2020, 1, 3)]);
        assert_eq!(s.values(), vec![12.0, 13.0]);
        assert_eq!(s.meta.downsample, ResamplePolicy::None);
        assert_eq!(s.meta.upsample, ResamplePolicy::LastValue);
    }

    #[test]
    fn test_recurrence_through_this() {
        let data = entity(vec![daily("R", day(2020, 1, 1), &[0.0, 0.1, -0.5])]);
        let out = apply_formula(&compile("if t == 0 then 100 else this[t-1] * (1 + val)").unwrap(), &data);
        let values = out.entities[0].field("R").unwrap().values();
        assert_eq!(values.len(), 3);
        assert!((values[1] - 110.0).abs() < 1e-9);
        assert!((values[2] - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_specific_series_is_reported() {
        let data = entity(vec![daily("A", day(2020, 1, 1), &[1.0])]);
        let out = apply_formula(&compile("val2 * 2").unwrap(), &data);
        assert_eq!(out.entities[0].fields().count(), 0);
        assert!(out.error().unwrap().contains("val2"));
    }
}
