//! Typed computation steps.
//!
//! `Step::prepare` checks a node's arguments once and fills in defaults;
//! `Step::compute` then runs against the children's results.

pub mod aggregate;
pub mod calendar;
pub mod events;
pub mod fetch;
pub mod formula;
pub mod regression;
pub mod sets;
pub mod transform;
pub mod universe;
pub mod window;

use super::registry::{ClassifyKind, RegressionKind, SetOp, StepKind, TransformKind};
use crate::aggregation::Reducer;
use crate::collaborators::{Collaborators, FetchError, RequestContext};
use crate::compute::CompileError;
use crate::config::EngineConfig;
use crate::graph::{ExecutionNode, QueryComponent};
use crate::resample::{EventAlignment, Frequency};
use crate::store::MultiEntityData;
use crate::validation::ArgumentError;
use thiserror::Error;
use window::Window;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("{0}")]
    Fetch(FetchError),
    #[error("formula '{text}' does not compile: {source}")]
    Formula { text: String, source: CompileError },
    #[error("{0} needs input from a child node")]
    MissingInput(&'static str),
    #[error("request cancelled")]
    Cancelled,
}

impl From<FetchError> for StepError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Cancelled => StepError::Cancelled,
            other => StepError::Fetch(other),
        }
    }
}

/// What a step may reach outside its inputs.
pub struct StepContext<'a> {
    pub request: &'a RequestContext,
    pub collaborators: &'a Collaborators,
    pub config: &'a EngineConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    ResolveUniverse(Vec<QueryComponent>),
    FetchWeight(QueryComponent),
    FetchFields(Vec<QueryComponent>),
    TimeWindow(Window),
    Formula(String),
    CalendarAlign(Frequency),
    Resample(Frequency),
    Rebalance(Frequency),
    EventAlign(EventAlignment),
    Aggregate(Reducer),
    SetAlgebra(SetOp),
    Regression { kind: RegressionKind, window: usize },
    Transform { kind: TransformKind, window: usize },
    /// Passes the first input through.
    Identity,
}

impl Step {
    /// Builds the typed step for `node`. Problems with the arguments never
    /// fail: the default is used and the problem is reported back.
    pub fn prepare(kind: StepKind, node: &ExecutionNode, config: &EngineConfig) -> (Step, Vec<ArgumentError>) {
        let mut errors = Vec::new();
        let first = node.arguments.first();

        let step = match kind {
            StepKind::ResolveUniverse => Step::ResolveUniverse(node.arguments.clone()),
            StepKind::FetchWeight => match first {
                Some(c) => Step::FetchWeight(c.clone()),
                None => Step::FetchWeight(QueryComponent::new(node.node_type, "Weight")),
            },
            StepKind::FetchFields => Step::FetchFields(node.arguments.clone()),
            StepKind::TimeWindow => Step::TimeWindow(window::prepare(first, config, &mut errors)),
            StepKind::Formula => {
                let text = first.map(|c| c.param(0).unwrap_or(c.original_text.as_str()).trim().to_string());
                match text.filter(|t| !t.is_empty()) {
                    Some(t) => Step::Formula(t),
                    None => {
                        errors.push(missing("Formula", "formula text", "the input unchanged"));
                        Step::Identity
                    }
                }
            }
            StepKind::CalendarAlign(f) => Step::CalendarAlign(f),
            StepKind::Resample(f) => Step::Resample(f),
            StepKind::Rebalance(f) => Step::Rebalance(f),
            StepKind::EventAlign { snap_to_market } => Step::EventAlign(EventAlignment {
                before_days: day_param(first, 0, "before days", config.default_event_before_days, &mut errors),
                after_days: day_param(first, 1, "after days", config.default_event_after_days, &mut errors),
                snap_to_market,
            }),
            StepKind::Aggregate(reducer) => Step::Aggregate(reducer),
            StepKind::Classify(ClassifyKind::TopN) => {
                Step::Aggregate(Reducer::TopN(count_param(first, "Top N", config.default_classification_count, &mut errors)))
            }
            StepKind::Classify(ClassifyKind::BottomN) => Step::Aggregate(Reducer::BottomN(count_param(
                first,
                "Bottom N",
                config.default_classification_count,
                &mut errors,
            ))),
            StepKind::Classify(ClassifyKind::Quantile(Some(n))) => Step::Aggregate(Reducer::Quantile(n)),
            StepKind::Classify(ClassifyKind::Quantile(None)) => {
                Step::Aggregate(Reducer::Quantile(count_param(first, "Quantile", 4, &mut errors)))
            }
            StepKind::SetAlgebra(op) => Step::SetAlgebra(op),
            StepKind::Regression(kind) => {
                let window = match kind {
                    RegressionKind::Static => 0,
                    _ => window_param(first, regression::name(kind), 2, config.default_rolling_window, &mut errors),
                };
                Step::Regression { kind, window }
            }
            StepKind::Transform(kind) => {
                let window = match kind {
                    TransformKind::MovingAverage | TransformKind::RollingStdDev => {
                        let min = if kind == TransformKind::RollingStdDev { 2 } else { 1 };
                        window_param(first, transform::name(kind), min, config.default_rolling_window, &mut errors)
                    }
                    TransformKind::Lag => window_param(first, transform::name(kind), 1, 1, &mut errors),
                    _ => 1,
                };
                Step::Transform { kind, window }
            }
        };
        (step, errors)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::ResolveUniverse(_) => "ResolveUniverse",
            Step::FetchWeight(_) => "FetchWeight",
            Step::FetchFields(_) => "FetchFields",
            Step::TimeWindow(_) => "TimeWindow",
            Step::Formula(_) => "Formula",
            Step::CalendarAlign(_) => "CalendarAlign",
            Step::Resample(_) => "Resample",
            Step::Rebalance(_) => "Rebalance",
            Step::EventAlign(_) => "EventAlign",
            Step::Aggregate(_) => "Aggregate",
            Step::SetAlgebra(_) => "SetAlgebra",
            Step::Regression { .. } => "Regression",
            Step::Transform { .. } => "Transform",
            Step::Identity => "Identity",
        }
    }

    pub fn compute(&self, ctx: &StepContext<'_>, inputs: &[MultiEntityData]) -> Result<MultiEntityData, StepError> {
        let first = inputs.first();
        let input = |step: &'static str| first.ok_or(StepError::MissingInput(step));

        match self {
            Step::ResolveUniverse(components) => universe::resolve(ctx, components, inputs),
            Step::FetchWeight(component) => fetch::fetch_weight(ctx, component, input("Data")?),
            Step::FetchFields(components) => fetch::fetch_fields(ctx, components, input("Data")?),
            Step::TimeWindow(w) => Ok(window::apply(*w, input("Time Range")?)),
            Step::Formula(text) => formula::apply(text, input("Formula")?),
            Step::CalendarAlign(f) => Ok(calendar::align(*f, input("Calendar Alignment")?)),
            Step::Resample(f) => Ok(calendar::resample(*f, input("Resample")?)),
            Step::Rebalance(f) => Ok(calendar::rebalance(*f, input("Rebalance")?)),
            Step::EventAlign(cfg) => Ok(events::align(*cfg, input("Event Alignment")?)),
            Step::Aggregate(reducer) => Ok(aggregate::apply(*reducer, input("Aggregation")?)),
            Step::SetAlgebra(op) => match inputs {
                [left, right, ..] => Ok(sets::combine(*op, left, right)),
                _ => Err(StepError::MissingInput("Set Operation")),
            },
            Step::Regression { kind, window } => match inputs {
                [left, right, ..] => Ok(regression::apply(*kind, *window, left, right)),
                _ => Err(StepError::MissingInput("Regression")),
            },
            Step::Transform { kind, window } => Ok(transform::apply(*kind, *window, input("Transformation")?)),
            Step::Identity => Ok(first.cloned().unwrap_or_default()),
        }
    }
}

fn missing(step: &str, what: &str, default: impl ToString) -> ArgumentError {
    ArgumentError::Missing { step: step.to_string(), what: what.to_string(), default: default.to_string() }
}

fn invalid(step: &str, what: &str, value: &str, default: impl ToString) -> ArgumentError {
    ArgumentError::Invalid {
        step: step.to_string(),
        what: what.to_string(),
        value: value.to_string(),
        default: default.to_string(),
    }
}

fn day_param(c: Option<&QueryComponent>, i: usize, what: &str, default: i64, errors: &mut Vec<ArgumentError>) -> i64 {
    let Some(raw) = c.and_then(|c| c.param(i)) else { return default };
    match raw.parse::<i64>() {
        Ok(v) if v >= 0 => v,
        _ => {
            errors.push(invalid("Event Alignment", what, raw, default));
            default
        }
    }
}

fn count_param(c: Option<&QueryComponent>, step: &str, default: usize, errors: &mut Vec<ArgumentError>) -> usize {
    window_param(c, step, 1, default, errors)
}

/// First parameter as a count of at least `min`.
fn window_param(
    c: Option<&QueryComponent>,
    step: &str,
    min: usize,
    default: usize,
    errors: &mut Vec<ArgumentError>,
) -> usize {
    let Some(raw) = c.and_then(|c| c.param(0)) else {
        errors.push(missing(step, "count", default));
        return default;
    };
    match raw.parse::<usize>() {
        Ok(n) if n >= min => n,
        _ => {
            errors.push(invalid(step, "count", raw, default));
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MajorType;
    use rstest::rstest;

    fn node(major: MajorType, name: &str, params: &[&str]) -> ExecutionNode {
        ExecutionNode::new(major).with_argument(QueryComponent::new(major, name).with_params(params.iter().copied()))
    }

    #[test]
    fn test_top_n_defaults_with_argument_error() {
        let cfg = EngineConfig::default();
        let (step, errs) =
            Step::prepare(StepKind::Classify(ClassifyKind::TopN), &node(MajorType::Classification, "Top N", &[]), &cfg);
        assert_eq!(step, Step::Aggregate(Reducer::TopN(10)));
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].to_string(), "Top N: missing count, using 10");
    }

    #[test]
    fn test_event_days_from_params() {
        let cfg = EngineConfig::default();
        let n = node(MajorType::EventAlignment, "Align Events", &["3", "x"]);
        let (step, errs) = Step::prepare(StepKind::EventAlign { snap_to_market: false }, &n, &cfg);
        assert_eq!(
            step,
            Step::EventAlign(EventAlignment { before_days: 3, after_days: 5, snap_to_market: false })
        );
        assert!(matches!(&errs[..], [ArgumentError::Invalid { value, .. }] if value == "x"));
    }

    #[test]
    fn test_formula_text_prefers_parameter() {
        let cfg = EngineConfig::default();
        let n = node(MajorType::Formula, "Formula", &["val1 / val2"]);
        let (step, errs) = Step::prepare(StepKind::Formula, &n, &cfg);
        assert_eq!(step, Step::Formula("val1 / val2".into()));
        assert!(errs.is_empty());
    }

    #[rstest]
    #[case(&[], 1, Some("Lag: missing count, using 1"))]
    #[case(&["soon"], 1, Some("Lag: invalid count 'soon', using 1"))]
    #[case(&["0"], 1, Some("Lag: invalid count '0', using 1"))]
    #[case(&["3"], 3, None)]
    fn test_lag_periods(#[case] params: &[&str], #[case] expected: usize, #[case] error: Option<&str>) {
        let cfg = EngineConfig::default();
        let n = node(MajorType::TimeSeriesTransformation, "Lag", params);
        let (step, errs) = Step::prepare(StepKind::Transform(TransformKind::Lag), &n, &cfg);
        assert_eq!(step, Step::Transform { kind: TransformKind::Lag, window: expected });
        let messages: Vec<String> = errs.iter().map(ToString::to_string).collect();
        assert_eq!(messages, error.into_iter().map(String::from).collect::<Vec<_>>());
    }

    #[test]
    fn test_binary_step_without_inputs() {
        let cfg = EngineConfig::default();
        let collaborators = crate::collaborators::Collaborators::new(
            std::sync::Arc::new(crate::collaborators::MemoryDataSource::new()),
            std::sync::Arc::new(crate::collaborators::MemoryUniverse::new()),
        );
        let request = RequestContext::new("r");
        let ctx = StepContext { request: &request, collaborators: &collaborators, config: &cfg };
        let err = Step::SetAlgebra(SetOp::Union).compute(&ctx, &[MultiEntityData::default()]).unwrap_err();
        assert_eq!(err, StepError::MissingInput("Set Operation"));
    }
}
