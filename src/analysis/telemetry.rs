use crate::compute::bytecode::{Expression, OpCode, SeriesRef};
use std::collections::{BTreeSet, HashMap};

/// Static facts about a compiled formula, gathered in one pass over its ops.
#[derive(Debug, Clone, Default)]
pub struct ProgramReport {
    pub total_ops: usize,
    pub op_counts: HashMap<&'static str, usize>,
    /// `val` appears: the formula is broadcast over every field.
    pub uses_general: bool,
    pub uses_this: bool,
    pub uses_category: bool,
    /// Loads the position `t` as a number.
    pub uses_position: bool,
    /// Some index bound depends on `t`.
    pub indexes_current: bool,
    /// 0-based specific series indices referenced.
    pub specific: BTreeSet<usize>,
}

impl ProgramReport {
    pub fn analyze(expr: &Expression) -> Self {
        let mut report = ProgramReport { total_ops: expr.ops.len(), ..Default::default() };

        for op in &expr.ops {
            *report.op_counts.entry(op_name(op)).or_insert(0) += 1;

            let (series, index) = match *op {
                OpCode::Load { series, index } | OpCode::LoadSlice { series, index } => (Some(series), Some(index)),
                OpCode::LoadCategory { index } => {
                    report.uses_category = true;
                    (None, Some(index))
                }
                OpCode::LoadPosition => {
                    report.uses_position = true;
                    (None, None)
                }
                _ => (None, None),
            };

            match series {
                Some(SeriesRef::General) => report.uses_general = true,
                Some(SeriesRef::This) => report.uses_this = true,
                Some(SeriesRef::Specific(i)) => {
                    report.specific.insert(i);
                }
                None => {}
            }

            if let Some(spec) = index.and_then(|i| expr.indices.get(i as usize)) {
                report.indexes_current |= spec.uses_current();
            }
        }
        report
    }

    /// Whether the result can differ between positions.
    pub fn is_time_varying(&self) -> bool {
        self.indexes_current || self.uses_this || self.uses_position
    }

    /// The lowest referenced specific series, which drives the output dates
    /// when nothing is broadcast.
    pub fn lowest_specific(&self) -> Option<usize> {
        self.specific.iter().next().copied()
    }

    /// Two or more different specific series must share one set of dates.
    pub fn needs_alignment(&self) -> bool {
        self.specific.len() >= 2
    }
}

fn op_name(op: &OpCode) -> &'static str {
    match op {
        OpCode::PushNumber(_) | OpCode::PushBool(_) | OpCode::PushText(_) => "Push",
        OpCode::LoadPosition => "Position",
        OpCode::Load { .. } => "Load",
        OpCode::LoadSlice { .. } => "LoadSlice",
        OpCode::LoadCategory { .. } => "Category",
        OpCode::Neg | OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod | OpCode::Pow => "Arithmetic",
        OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge | OpCode::NumEq | OpCode::NumNe | OpCode::TextEq | OpCode::TextNe => "Compare",
        OpCode::And | OpCode::Or | OpCode::Not => "Logic",
        OpCode::ToBool | OpCode::ToNumber => "Coerce",
        OpCode::Call1(_) | OpCode::Call2(_) => "Call",
        OpCode::Then { .. } | OpCode::Else { .. } => "Branch",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::bytecode::compile;
    use rstest::rstest;

    #[rstest]
    #[case("2 * 3", false)]
    #[case("val[end] / val[begin] - 1", false)]
    #[case("sum(val)", false)]
    #[case("val[t-1]", true)]
    #[case("val", true)]
    #[case("this[t-1] + 1", true)]
    #[case("t * 2", true)]
    #[case("sum(val[t-3:t])", true)]
    fn test_time_varying(#[case] src: &str, #[case] expected: bool) {
        let report = ProgramReport::analyze(&compile(src).unwrap());
        assert_eq!(report.is_time_varying(), expected, "{}", src);
    }

    #[test]
    fn test_collects_references() {
        let report = ProgramReport::analyze(&compile("val3 - val1 + sum(val3)").unwrap());
        assert!(!report.uses_general);
        assert_eq!(report.specific.iter().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(report.lowest_specific(), Some(0));
        assert!(report.needs_alignment());
        assert_eq!(report.op_counts.get("Call"), Some(&1));
    }
}
