//! The step registry: which typed step a node runs.
//!
//! Built once and handed to the evaluator; resolution never looks at
//! anything but the node's major type and the name of its first argument.

use crate::aggregation::Reducer;
use crate::graph::{ExecutionNode, MajorType};
use crate::resample::Frequency;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyKind {
    TopN,
    BottomN,
    /// Fixed bucket count, or `None` to read it from the node parameters.
    Quantile(Option<usize>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Difference,
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegressionKind {
    Static,
    RollingBeta,
    RollingAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Change,
    PercentageChange,
    CumulativeReturn,
    MovingAverage,
    RollingStdDev,
    Lag,
}

/// What a node does, before its arguments are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    ResolveUniverse,
    FetchWeight,
    FetchFields,
    TimeWindow,
    Formula,
    CalendarAlign(Frequency),
    Resample(Frequency),
    Rebalance(Frequency),
    EventAlign { snap_to_market: bool },
    Aggregate(Reducer),
    Classify(ClassifyKind),
    SetAlgebra(SetOp),
    Regression(RegressionKind),
    Transform(TransformKind),
}

#[derive(Debug, Clone)]
struct Registration {
    major: MajorType,
    /// `None` matches any argument name.
    name: Option<String>,
    kind: StepKind,
}

#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    entries: Vec<Registration>,
}

impl StepRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn register(&mut self, major: MajorType, name: Option<&str>, kind: StepKind) -> &mut Self {
        self.entries.push(Registration { major, name: name.map(str::to_string), kind });
        self
    }

    pub fn has_steps_for(&self, major: MajorType) -> bool {
        self.entries.iter().any(|r| r.major == major)
    }

    /// 1. Exact (major type, first argument name) match, ignoring case.
    /// 2. Otherwise the first step registered for the major type.
    pub fn resolve(&self, node: &ExecutionNode) -> Option<StepKind> {
        let major = node.node_type;
        let candidates = move || self.entries.iter().filter(move |r| r.major == major);

        if let Some(name) = node.primary_name() {
            let exact = candidates().find(|r| matches!(&r.name, Some(n) if n.eq_ignore_ascii_case(name.trim())));
            if let Some(r) = exact {
                return Some(r.kind);
            }
        }
        let fallback = candidates().next().map(|r| r.kind);
        if fallback.is_some() {
            debug!(major = %node.node_type, name = ?node.primary_name(), "no exact step match, using default");
        }
        fallback
    }

    /// The full catalog.
    pub fn standard() -> Self {
        let mut r = Self::new();

        r.register(MajorType::Universe, None, StepKind::ResolveUniverse);

        // Field fetch comes first so it is the default for unknown names.
        r.register(MajorType::Data, None, StepKind::FetchFields)
            .register(MajorType::Data, Some("Weight"), StepKind::FetchWeight)
            .register(MajorType::Data, Some("Membership"), StepKind::FetchWeight);

        for name in ["Last Twelve Months", "Year To Date", "Last N Years", "Last N Months", "Date Range", "All Time"] {
            r.register(MajorType::TimeRange, Some(name), StepKind::TimeWindow);
        }

        r.register(MajorType::Formula, None, StepKind::Formula);

        for f in Frequency::ALL {
            r.register(MajorType::CalendarAlignment, Some(f.name()), StepKind::CalendarAlign(f));
        }
        for f in Frequency::ALL {
            r.register(MajorType::Resample, Some(f.name()), StepKind::Resample(f));
        }
        for f in Frequency::ALL {
            r.register(MajorType::Rebalance, Some(f.name()), StepKind::Rebalance(f));
        }

        r.register(MajorType::EventAlignment, Some("Align Events"), StepKind::EventAlign { snap_to_market: false })
            .register(
                MajorType::EventAlignment,
                Some("Market Aligned Events"),
                StepKind::EventAlign { snap_to_market: true },
            );

        for (name, reducer) in [
            ("Sum", Reducer::Sum),
            ("Average", Reducer::Average),
            ("Mean", Reducer::Average),
            ("Count", Reducer::Count),
            ("Percent Positive", Reducer::PercentPositive),
            ("Median", Reducer::Median),
            ("Boxplot", Reducer::Boxplot),
        ] {
            r.register(MajorType::Aggregation, Some(name), StepKind::Aggregate(reducer));
        }

        for (name, kind) in [
            ("Top N", ClassifyKind::TopN),
            ("Bottom N", ClassifyKind::BottomN),
            ("Quantile", ClassifyKind::Quantile(None)),
            ("Quartile", ClassifyKind::Quantile(Some(4))),
            ("Quintile", ClassifyKind::Quantile(Some(5))),
            ("Decile", ClassifyKind::Quantile(Some(10))),
        ] {
            r.register(MajorType::Classification, Some(name), StepKind::Classify(kind));
        }

        for (name, op) in [
            ("Union", SetOp::Union),
            ("Intersect", SetOp::Intersect),
            ("Difference", SetOp::Difference),
            ("Exclude", SetOp::Exclude),
        ] {
            r.register(MajorType::SetOperation, Some(name), StepKind::SetAlgebra(op));
        }

        for (name, kind) in [
            ("Beta", RegressionKind::Static),
            ("Rolling Beta", RegressionKind::RollingBeta),
            ("Rolling Alpha", RegressionKind::RollingAlpha),
        ] {
            r.register(MajorType::Regression, Some(name), StepKind::Regression(kind));
        }

        for (name, kind) in [
            ("Change", TransformKind::Change),
            ("Percentage Change", TransformKind::PercentageChange),
            ("Cumulative Return", TransformKind::CumulativeReturn),
            ("Moving Average", TransformKind::MovingAverage),
            ("Rolling Standard Deviation", TransformKind::RollingStdDev),
            ("Lag", TransformKind::Lag),
        ] {
            r.register(MajorType::TimeSeriesTransformation, Some(name), StepKind::Transform(kind));
        }

        r
    }
}
