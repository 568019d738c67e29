//! Chart titles synthesized bottom-up from the node arguments.
use crate::graph::{ExecutionNode, MajorType};

/// The node's own words: its first argument as the user typed it, else the
/// label of its major type.
pub fn phrase(node: &ExecutionNode) -> String {
    node.arguments
        .first()
        .map(|a| a.original_text.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| node.node_type.label().to_string())
}

/// Combines the node phrase with the titles already built for its children.
pub fn synthesize(node: &ExecutionNode, child_titles: &[String]) -> String {
    let phrase = phrase(node);
    match child_titles {
        [] => phrase,
        [only] => format!("{} -> {}", only, phrase),
        [left, right] if node.node_type == MajorType::Regression => {
            format!("{} of ({}) against ({})", phrase, left, right)
        }
        many => format!("{} ({})", phrase, many.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::QueryComponent;
    use rstest::rstest;

    fn node(kind: MajorType, text: Option<&str>) -> ExecutionNode {
        let n = ExecutionNode::new(kind);
        match text {
            Some(t) => n.with_argument(QueryComponent::new(kind, t.to_lowercase()).with_text(t)),
            None => n,
        }
    }

    #[rstest]
    #[case(MajorType::Data, Some("Price"), &[], "Price")]
    #[case(MajorType::Aggregation, None, &["S&P 500"], "S&P 500 -> Aggregation")]
    #[case(MajorType::Regression, Some("Beta"), &["AAPL", "SPY"], "Beta of (AAPL) against (SPY)")]
    #[case(MajorType::SetOperation, Some("Union"), &["A", "B"], "Union (A, B)")]
    fn test_synthesize(
        #[case] kind: MajorType,
        #[case] text: Option<&str>,
        #[case] children: &[&str],
        #[case] expected: &str,
    ) {
        let titles: Vec<String> = children.iter().map(|s| s.to_string()).collect();
        assert_eq!(synthesize(&node(kind, text), &titles), expected);
    }

    #[test]
    fn test_blank_text_falls_back_to_label() {
        let n = node(MajorType::TimeSeriesTransformation, Some("  "));
        assert_eq!(phrase(&n), "Transformation");
    }
}
