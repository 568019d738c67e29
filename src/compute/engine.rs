use crate::compute::bytecode::{Expression, Func1, Func2, IndexCode, IndexOp, IndexSpec, OpCode, SeriesRef};
use crate::compute::kernel;
use crate::compute::ledger::{Ledger, VmError};
use crate::store::{CategorySeries, Series, DEFAULT_CATEGORY};
use smallvec::SmallVec;

/// Upper bound on any single evaluation stack.
pub const MAX_STACK_DEPTH: usize = 256;

/// Everything a formula can see at one output position.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// The entity's non-weight series, `val1` first.
    pub fields: &'a [Series],
    /// The series `val` broadcasts over, if any.
    pub general: Option<&'a Series>,
    /// Dates of the output; `category` and `cagr` spans read them.
    pub driver: &'a Series,
    pub category: Option<&'a CategorySeries>,
    pub position: usize,
    pub ledger: &'a Ledger,
}

/// Values and the time span they cover, for `cagr`.
#[derive(Debug, Clone, Default)]
struct Slice {
    values: Vec<f64>,
    days: f64,
}

#[derive(Default)]
struct Stacks {
    numbers: Vec<f64>,
    booleans: Vec<bool>,
    strings: Vec<String>,
    slices: Vec<Slice>,
}

fn push<T>(stack: &mut Vec<T>, v: T) -> Result<(), VmError> {
    if stack.len() >= MAX_STACK_DEPTH {
        return Err(VmError::StackOverflow);
    }
    stack.push(v);
    Ok(())
}

fn pop<T>(stack: &mut Vec<T>) -> Result<T, VmError> {
    stack.pop().ok_or(VmError::StackUnderflow)
}

pub struct Engine;

impl Engine {
    /// Runs `expr` at `ctx.position` and returns the numeric result.
    pub fn evaluate(expr: &Expression, ctx: &EvalContext<'_>) -> Result<f64, VmError> {
        let mut st = Stacks::default();
        let mut pc = 0usize;
        let ops = &expr.ops;

        while pc < ops.len() {
            let op = ops[pc];
            pc += 1;
            match op {
                OpCode::PushNumber(n) => push(&mut st.numbers, n)?,
                OpCode::PushBool(b) => push(&mut st.booleans, b)?,
                OpCode::PushText(id) => {
                    let s = expr.strings.get(id as usize).cloned().unwrap_or_default();
                    push(&mut st.strings, s)?
                }
                OpCode::LoadPosition => push(&mut st.numbers, ctx.position as f64)?,
                OpCode::Load { series, index } => {
                    let v = Self::load_point(series, &expr.indices[index as usize], ctx)?;
                    push(&mut st.numbers, v)?
                }
                OpCode::LoadSlice { series, index } => {
                    let s = Self::load_slice(series, &expr.indices[index as usize], ctx)?;
                    push(&mut st.slices, s)?
                }
                OpCode::LoadCategory { index } => {
                    let label = Self::load_category(&expr.indices[index as usize], ctx)?;
                    push(&mut st.strings, label)?
                }
                OpCode::Neg => {
                    let a = pop(&mut st.numbers)?;
                    push(&mut st.numbers, -a)?
                }
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod | OpCode::Pow => {
                    let b = pop(&mut st.numbers)?;
                    let a = pop(&mut st.numbers)?;
                    push(&mut st.numbers, Self::arith(op, a, b)?)?
                }
                OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge | OpCode::NumEq | OpCode::NumNe => {
                    let b = pop(&mut st.numbers)?;
                    let a = pop(&mut st.numbers)?;
                    let r = match op {
                        OpCode::Lt => a < b,
                        OpCode::Le => a <= b,
                        OpCode::Gt => a > b,
                        OpCode::Ge => a >= b,
                        OpCode::NumEq => a == b,
                        _ => a != b,
                    };
                    push(&mut st.booleans, r)?
                }
                OpCode::TextEq | OpCode::TextNe => {
                    let b = pop(&mut st.strings)?;
                    let a = pop(&mut st.strings)?;
                    push(&mut st.booleans, (a == b) == (op == OpCode::TextEq))?
                }
                OpCode::And | OpCode::Or => {
                    let b = pop(&mut st.booleans)?;
                    let a = pop(&mut st.booleans)?;
                    push(&mut st.booleans, if op == OpCode::And { a && b } else { a || b })?
                }
                OpCode::Not => {
                    let a = pop(&mut st.booleans)?;
                    push(&mut st.booleans, !a)?
                }
                OpCode::ToBool => {
                    let a = pop(&mut st.numbers)?;
                    push(&mut st.booleans, a != 0.0)?
                }
                OpCode::ToNumber => {
                    let a = pop(&mut st.booleans)?;
                    push(&mut st.numbers, if a { 1.0 } else { 0.0 })?
                }
                OpCode::Call1(f) => {
                    let s = pop(&mut st.slices)?;
                    push(&mut st.numbers, Self::call1(f, &s)?)?
                }
                OpCode::Call2(f) => {
                    let b = pop(&mut st.slices)?;
                    let a = pop(&mut st.slices)?;
                    push(&mut st.numbers, Self::call2(f, &a.values, &b.values)?)?
                }
                OpCode::Then { else_at } => {
                    if !pop(&mut st.booleans)? {
                        pc = else_at as usize;
                    }
                }
                OpCode::Else { end_at } => pc = end_at as usize,
            }
        }

        pop(&mut st.numbers)
    }

    #[inline(always)]
    fn arith(op: OpCode, a: f64, b: f64) -> Result<f64, VmError> {
        Ok(match op {
            OpCode::Add => a + b,
            OpCode::Sub => a - b,
            OpCode::Mul => a * b,
            OpCode::Div => {
                if b == 0.0 {
                    return Err(VmError::DivisionByZero);
                }
                a / b
            }
            OpCode::Mod => {
                if b == 0.0 {
                    return Err(VmError::DivisionByZero);
                }
                a % b
            }
            _ => a.powf(b),
        })
    }

    fn call1(f: Func1, s: &Slice) -> Result<f64, VmError> {
        let xs = &s.values;
        let empty = || VmError::EmptyArgument(f.name());
        match f {
            Func1::Sum => {
                if xs.is_empty() {
                    return Err(empty());
                }
                Ok(kernel::sum(xs))
            }
            Func1::Count => Ok(xs.len() as f64),
            Func1::Average => kernel::mean(xs).ok_or_else(empty),
            Func1::StdDev => kernel::stddev(xs).ok_or_else(empty),
            Func1::Variance => kernel::variance(xs).ok_or_else(empty),
            Func1::Median => kernel::median(xs).ok_or_else(empty),
            Func1::Min => kernel::min(xs).ok_or_else(empty),
            Func1::Max => kernel::max(xs).ok_or_else(empty),
            Func1::Compound => kernel::compound(xs).ok_or_else(empty),
            Func1::Product => kernel::product(xs).ok_or_else(empty),
            Func1::Cagr => kernel::cagr(xs, s.days).ok_or_else(empty),
        }
    }

    fn call2(f: Func2, a: &[f64], b: &[f64]) -> Result<f64, VmError> {
        let empty = || VmError::EmptyArgument(f.name());
        match f {
            Func2::SumProduct => {
                if a.is_empty() || b.is_empty() {
                    return Err(empty());
                }
                Ok(kernel::sumproduct(a, b))
            }
            Func2::SumIf => {
                let picked = kernel::masked(a, b);
                if picked.is_empty() {
                    return Err(empty());
                }
                Ok(kernel::sum(&picked))
            }
            Func2::AverageIf => kernel::mean(&kernel::masked(a, b)).ok_or_else(empty),
            Func2::MedianIf => kernel::median(&kernel::masked(a, b)).ok_or_else(empty),
        }
    }

    // --- Index resolution ---

    fn resolve_bound(code: &IndexCode, len: usize, position: usize) -> Result<i64, VmError> {
        let mut stack: SmallVec<[i64; 8]> = SmallVec::new();
        for op in &code.ops {
            match *op {
                IndexOp::Begin => stack.push(0),
                IndexOp::End => stack.push(len as i64 - 1),
                IndexOp::Current => stack.push(position as i64),
                IndexOp::Constant(n) => stack.push(n),
                IndexOp::Add | IndexOp::Sub => {
                    let b = stack.pop().ok_or(VmError::StackUnderflow)?;
                    let a = stack.pop().ok_or(VmError::StackUnderflow)?;
                    stack.push(if *op == IndexOp::Add { a + b } else { a - b });
                }
            }
        }
        stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn checked(index: i64, len: usize) -> Result<usize, VmError> {
        if index < 0 || index as usize >= len {
            Err(VmError::OutOfBounds { index, len })
        } else {
            Ok(index as usize)
        }
    }

    fn resolve_point(spec: &IndexSpec, len: usize, position: usize) -> Result<usize, VmError> {
        match spec {
            IndexSpec::Point(code) => Self::checked(Self::resolve_bound(code, len, position)?, len),
            IndexSpec::Range(..) => Err(VmError::InvalidRange { begin: 0, end: 0 }),
        }
    }

    fn resolve_range(spec: &IndexSpec, len: usize, position: usize) -> Result<(usize, usize), VmError> {
        let (b, e) = match spec {
            IndexSpec::Point(code) => {
                let i = Self::resolve_bound(code, len, position)?;
                (i, i)
            }
            IndexSpec::Range(a, b) => {
                (Self::resolve_bound(a, len, position)?, Self::resolve_bound(b, len, position)?)
            }
        };
        if b > e {
            return Err(VmError::InvalidRange { begin: b, end: e });
        }
        Ok((Self::checked(b, len)?, Self::checked(e, len)?))
    }

    fn series_for<'a>(series: SeriesRef, ctx: &EvalContext<'a>) -> Result<&'a Series, VmError> {
        match series {
            SeriesRef::General => ctx.general.ok_or(VmError::MissingGeneral),
            SeriesRef::Specific(i) => ctx.fields.get(i).ok_or(VmError::MissingSeries(i + 1)),
            SeriesRef::This => Ok(ctx.driver),
        }
    }

    fn load_point(series: SeriesRef, spec: &IndexSpec, ctx: &EvalContext<'_>) -> Result<f64, VmError> {
        if series == SeriesRef::This {
            let i = Self::resolve_point(spec, ctx.ledger.len(), ctx.position)?;
            return ctx.ledger.get(i);
        }
        let s = Self::series_for(series, ctx)?;
        let i = Self::resolve_point(spec, s.len(), ctx.position)?;
        Ok(s.points()[i].value)
    }

    fn load_slice(series: SeriesRef, spec: &IndexSpec, ctx: &EvalContext<'_>) -> Result<Slice, VmError> {
        if series == SeriesRef::This {
            let (b, e) = Self::resolve_range(spec, ctx.ledger.len(), ctx.position)?;
            let values = (b..=e).map(|i| ctx.ledger.get(i)).collect::<Result<Vec<_>, _>>()?;
            return Ok(Slice { values, days: Self::span_days(ctx.driver, b, e) });
        }
        let s = Self::series_for(series, ctx)?;
        let (b, e) = Self::resolve_range(spec, s.len(), ctx.position)?;
        let values = s.points()[b..=e].iter().map(|p| p.value).collect();
        Ok(Slice { values, days: Self::span_days(s, b, e) })
    }

    fn span_days(s: &Series, b: usize, e: usize) -> f64 {
        match (s.points().get(b), s.points().get(e)) {
            (Some(first), Some(last)) => (last.time - first.time).num_seconds() as f64 / 86_400.0,
            _ => 0.0,
        }
    }

    fn load_category(spec: &IndexSpec, ctx: &EvalContext<'_>) -> Result<String, VmError> {
        let i = Self::resolve_point(spec, ctx.driver.len(), ctx.position)?;
        let time = ctx.driver.points()[i].time;
        let label = ctx.category.and_then(|c| c.label_at(time)).unwrap_or(DEFAULT_CATEGORY);
        Ok(label.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::bytecode::compile;
    use crate::store::types::test_support::*;
    use rstest::rstest;

    fn run_at(src: &str, fields: &[Series], general: Option<&Series>, position: usize) -> Result<f64, VmError> {
        let expr = compile(src).unwrap();
        let ledger = Ledger::new();
        let driver = general.or(fields.first()).cloned().unwrap_or_default();
        let ctx = EvalContext { fields, general, driver: &driver, category: None, position, ledger: &ledger };
        Engine::evaluate(&expr, &ctx)
    }

    fn scalar(src: &str) -> Result<f64, VmError> {
        run_at(src, &[], None, 0)
    }

    #[rstest]
    #[case("1+2*3", 7.0)]
    #[case("(1+2)*3", 9.0)]
    #[case("2^3^2", 512.0)]
    #[case("-2^2", -4.0)]
    #[case("7 % 4", 3.0)]
    #[case("if 1>0 then 5 else 6", 5.0)]
    #[case("if 1<0 then 5 else 6", 6.0)]
    #[case("if true then if false then 1 else 2 else 3", 2.0)]
    #[case("if false then 1 else if false then 2 else 3", 3.0)]
    #[case("1 < 2 and not 2 < 1", 1.0)]
    #[case("0 || 0", 0.0)]
    #[case("if true then false else 2", 0.0)]
    #[case("'a' == 'a'", 1.0)]
    #[case("'a' <> 'a'", 0.0)]
    fn test_scalar_programs(#[case] src: &str, #[case] expected: f64) {
        assert_eq!(scalar(src), Ok(expected), "{}", src);
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(scalar("1/0"), Err(VmError::DivisionByZero));
        assert_eq!(scalar("1%0"), Err(VmError::DivisionByZero));
    }

    #[test]
    fn test_lagged_general_reference() {
        let s = daily("P", day(2020, 1, 1), &[1.0, 2.0, 3.0]);
        assert_eq!(run_at("val[t-1]", &[], Some(&s), 2), Ok(2.0));
        assert!(matches!(run_at("val[t-5]", &[], Some(&s), 2), Err(VmError::OutOfBounds { index: -3, .. })));
        assert_eq!(run_at("val[end] - val[begin]", &[], Some(&s), 0), Ok(2.0));
    }

    #[test]
    fn test_specific_references_are_one_based() {
        let a = daily("A", day(2020, 1, 1), &[1.0, 2.0]);
        let b = daily("B", day(2020, 1, 1), &[10.0, 20.0]);
        let fields = vec![a, b];
        assert_eq!(run_at("val2 - val1", &fields, None, 1), Ok(18.0));
        assert_eq!(run_at("val3", &fields, None, 1), Err(VmError::MissingSeries(3)));
    }

    #[test]
    fn test_functions_over_ranges() {
        let s = daily("P", day(2020, 1, 1), &[1.0, 2.0, 3.0, 4.0]);
        let fields = vec![s.clone()];
        assert_eq!(run_at("sum(val)", &[], Some(&s), 0), Ok(10.0));
        assert_eq!(run_at("average(val[t-1:t])", &[], Some(&s), 3), Ok(3.5));
        assert_eq!(run_at("count(val1[1:2])", &fields, None, 0), Ok(2.0));
        assert_eq!(run_at("max(val[t])", &[], Some(&s), 1), Ok(2.0));
        assert!(matches!(run_at("sum(val[2:1])", &[], Some(&s), 0), Err(VmError::InvalidRange { .. })));
        assert_eq!(run_at("stddev(val[0:0])", &[], Some(&s), 0), Err(VmError::EmptyArgument("stddev")));
    }

    #[test]
    fn test_conditional_functions() {
        let v = daily("V", day(2020, 1, 1), &[1.0, 2.0, 3.0, 4.0]);
        let m = daily("M", day(2020, 1, 1), &[1.0, 0.0, 1.0, 0.0]);
        let fields = vec![v, m];
        assert_eq!(run_at("sumif(val1, val2)", &fields, None, 0), Ok(4.0));
        assert_eq!(run_at("averageif(val1, val2)", &fields, None, 0), Ok(2.0));
        assert_eq!(run_at("sumproduct(val1, val2)", &fields, None, 0), Ok(4.0));
        assert_eq!(run_at("medianif(val1, val2[0:0])", &fields, None, 0), Ok(1.0));
    }

    #[test]
    fn test_this_reads_only_the_computed_prefix() {
        let s = daily("P", day(2020, 1, 1), &[1.0, 2.0, 3.0]);
        let expr = compile("if t == 0 then 100 else this[t-1] + val").unwrap();
        let mut ledger = Ledger::new();
        for position in 0..s.len() {
            let ctx = EvalContext {
                fields: &[],
                general: Some(&s),
                driver: &s,
                category: None,
                position,
                ledger: &ledger,
            };
            let v = Engine::evaluate(&expr, &ctx).ok();
            ledger.push(v);
        }
        assert_eq!(ledger.values(), &[Some(100.0), Some(102.0), Some(105.0)]);

        let ctx = EvalContext { fields: &[], general: Some(&s), driver: &s, category: None, position: 3, ledger: &ledger };
        let peek_ahead = compile("this[t]").unwrap();
        assert!(Engine::evaluate(&peek_ahead, &ctx).is_err());
    }

    #[test]
    fn test_category_lookup() {
        let s = daily("P", day(2020, 1, 1), &[1.0, 2.0]);
        let mut cat = CategorySeries::new();
        cat.set(day(2020, 1, 2), "Tech");
        let expr = compile("if category == 'Tech' then val else 0 - val").unwrap();
        let ledger = Ledger::new();
        let at = |position| EvalContext {
            fields: &[],
            general: Some(&s),
            driver: &s,
            category: Some(&cat),
            position,
            ledger: &ledger,
        };
        assert_eq!(Engine::evaluate(&expr, &at(0)), Ok(-1.0));
        assert_eq!(Engine::evaluate(&expr, &at(1)), Ok(2.0));
    }
}
