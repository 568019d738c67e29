//! Defines the execution-tree node and the query arguments attached to it.

use crate::store::Time;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of computation a node performs.
///
/// Unknown kinds are rejected at deserialization time, which makes them a
/// structural error rather than something the evaluator has to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MajorType {
    Universe,
    Data,
    TimeRange,
    Formula,
    CalendarAlignment,
    Resample,
    Rebalance,
    EventAlignment,
    Aggregation,
    Classification,
    SetOperation,
    Regression,
    TimeSeriesTransformation,
}

impl MajorType {
    pub const ALL: [MajorType; 13] = [
        MajorType::Universe,
        MajorType::Data,
        MajorType::TimeRange,
        MajorType::Formula,
        MajorType::CalendarAlignment,
        MajorType::Resample,
        MajorType::Rebalance,
        MajorType::EventAlignment,
        MajorType::Aggregation,
        MajorType::Classification,
        MajorType::SetOperation,
        MajorType::Regression,
        MajorType::TimeSeriesTransformation,
    ];

    /// Human-readable label, used in titles when a node has no arguments.
    pub fn label(self) -> &'static str {
        match self {
            MajorType::Universe => "Universe",
            MajorType::Data => "Data",
            MajorType::TimeRange => "Time Range",
            MajorType::Formula => "Formula",
            MajorType::CalendarAlignment => "Calendar Alignment",
            MajorType::Resample => "Resample",
            MajorType::Rebalance => "Rebalance",
            MajorType::EventAlignment => "Event Alignment",
            MajorType::Aggregation => "Aggregation",
            MajorType::Classification => "Classification",
            MajorType::SetOperation => "Set Operation",
            MajorType::Regression => "Regression",
            MajorType::TimeSeriesTransformation => "Transformation",
        }
    }

    /// Number of children the node must have, when fixed.
    pub fn required_children(self) -> Option<usize> {
        match self {
            MajorType::SetOperation | MajorType::Regression => Some(2),
            _ => None,
        }
    }
}

impl fmt::Display for MajorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One resolved argument of a query: a field, an entity list, a window name...
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryComponent {
    pub canonical_name: String,
    pub major_type: MajorType,
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub original_text: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl QueryComponent {
    pub fn new(major_type: MajorType, canonical_name: impl Into<String>) -> Self {
        let canonical_name = canonical_name.into();
        Self {
            original_text: canonical_name.clone(),
            canonical_name,
            major_type,
            provider_id: String::new(),
            source: String::new(),
            parameters: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self
    }

    pub fn with_text(mut self, original_text: impl Into<String>) -> Self {
        self.original_text = original_text.into();
        self
    }

    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.canonical_name.eq_ignore_ascii_case(name)
    }

    pub fn param(&self, i: usize) -> Option<&str> {
        self.parameters.get(i).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    pub fn param_f64(&self, i: usize) -> Option<f64> {
        self.param(i)?.parse().ok()
    }

    pub fn param_usize(&self, i: usize) -> Option<usize> {
        self.param(i)?.parse().ok()
    }

    /// Parses a `YYYY-MM-DD` parameter into UTC midnight.
    pub fn param_date(&self, i: usize) -> Option<Time> {
        let d = NaiveDate::parse_from_str(self.param(i)?, "%Y-%m-%d").ok()?;
        Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?))
    }
}

/// A node of the execution tree. Leaves fetch or resolve data; inner nodes
/// transform the results of their children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionNode {
    pub node_type: MajorType,
    #[serde(default)]
    pub arguments: Vec<QueryComponent>,
    #[serde(default)]
    pub children: Vec<ExecutionNode>,
}

impl ExecutionNode {
    pub fn new(node_type: MajorType) -> Self {
        Self { node_type, arguments: Vec::new(), children: Vec::new() }
    }

    pub fn with_argument(mut self, arg: QueryComponent) -> Self {
        self.arguments.push(arg);
        self
    }

    pub fn with_child(mut self, child: ExecutionNode) -> Self {
        self.children.push(child);
        self
    }

    /// Canonical name of the first argument, used for step resolution.
    pub fn primary_name(&self) -> Option<&str> {
        self.arguments.first().map(|a| a.canonical_name.as_str())
    }

    pub fn is_leaf(&self) -> bool { self.children.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("20", Some(20))]
    #[case(" 7 ", Some(7))]
    #[case("", None)]
    #[case("x", None)]
    fn test_param_usize(#[case] raw: &str, #[case] expected: Option<usize>) {
        let c = QueryComponent::new(MajorType::Classification, "Top N").with_params([raw]);
        assert_eq!(c.param_usize(0), expected);
    }

    #[test]
    fn test_param_date() {
        let c = QueryComponent::new(MajorType::TimeRange, "Date Range").with_params(["2020-01-31", "bad"]);
        assert_eq!(c.param_date(0).map(|t| t.to_rfc3339()), Some("2020-01-31T00:00:00+00:00".to_string()));
        assert!(c.param_date(1).is_none());
    }

    #[test]
    fn test_unknown_major_type_fails_to_deserialize() {
        let ok = r#"{"node_type":"Formula","arguments":[],"children":[]}"#;
        assert!(serde_json::from_str::<ExecutionNode>(ok).is_ok());
        let bad = r#"{"node_type":"Teleport","arguments":[],"children":[]}"#;
        assert!(serde_json::from_str::<ExecutionNode>(bad).is_err());
    }
}
