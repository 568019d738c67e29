//! The structural validator that runs every rule before evaluation starts.
use super::error::{StructuralError, StructuralErrorKind};
use super::rules::arity;
use crate::analysis::topology;
use crate::execution::StepRegistry;
use crate::graph::ExecutionNode;

/// Walks the tree once and collects every structural problem, like a linter
/// run before "compilation".
pub struct Validator<'a> {
    registry: &'a StepRegistry,
    max_depth: usize,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a StepRegistry, max_depth: usize) -> Self {
        Self { registry, max_depth }
    }

    pub fn validate(&self, root: &ExecutionNode) -> Result<(), Vec<StructuralError>> {
        let mut errors = Vec::new();

        let depth = topology::depth(root);
        if depth > self.max_depth {
            errors.push(StructuralError {
                path: Vec::new(),
                kind: StructuralErrorKind::TooDeep,
                message: format!("tree depth {} exceeds the limit of {}", depth, self.max_depth),
            });
        }

        // Rules are local to a node, so any traversal order works.
        for path in topology::post_order(root) {
            let Some(node) = topology::node_at(root, &path) else { continue };
            if let Some(err) = arity::validate_arity(&path, node) {
                errors.push(err);
            }
            if let Some(err) = arity::validate_leaf(&path, node, self.registry) {
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{MajorType, QueryComponent};

    fn universe(name: &str) -> ExecutionNode {
        ExecutionNode::new(MajorType::Universe).with_argument(QueryComponent::new(MajorType::Universe, name))
    }

    #[test]
    fn test_valid_tree() {
        let registry = StepRegistry::standard();
        let tree = ExecutionNode::new(MajorType::SetOperation)
            .with_argument(QueryComponent::new(MajorType::SetOperation, "Union"))
            .with_child(universe("A"))
            .with_child(universe("B"));
        assert!(Validator::new(&registry, 64).validate(&tree).is_ok());
    }

    #[test]
    fn test_reports_every_violation() {
        let registry = StepRegistry::standard();
        let tree = ExecutionNode::new(MajorType::SetOperation)
            .with_child(universe("A"))
            .with_child(ExecutionNode::new(MajorType::Regression).with_child(universe("B")));
        let errs = Validator::new(&registry, 2).validate(&tree).unwrap_err();
        let kinds: Vec<StructuralErrorKind> = errs.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(kinds, vec![StructuralErrorKind::TooDeep, StructuralErrorKind::Arity]);
        assert_eq!(errs[1].path, vec![1]);
    }

    #[test]
    fn test_leaf_without_step_is_structural() {
        let registry = StepRegistry::new();
        let errs = Validator::new(&registry, 64).validate(&universe("A")).unwrap_err();
        assert_eq!(errs[0].kind, StructuralErrorKind::NoLeafStep);
    }
}
