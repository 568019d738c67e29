//! Child-count rules.

use crate::analysis::NodePath;
use crate::execution::StepRegistry;
use crate::graph::ExecutionNode;
use crate::validation::error::{StructuralError, StructuralErrorKind};

/// Binary node types (set algebra, regression) need exactly two children.
pub(crate) fn validate_arity(path: &NodePath, node: &ExecutionNode) -> Option<StructuralError> {
    let expected = node.node_type.required_children()?;
    let found = node.children.len();
    if found == expected {
        return None;
    }
    Some(StructuralError {
        path: path.clone(),
        kind: StructuralErrorKind::Arity,
        message: format!("{} needs exactly {} children, found {}", node.node_type, expected, found),
    })
}

/// A childless node can only produce data through a registered step.
pub(crate) fn validate_leaf(path: &NodePath, node: &ExecutionNode, registry: &StepRegistry) -> Option<StructuralError> {
    if !node.is_leaf() || registry.has_steps_for(node.node_type) {
        return None;
    }
    Some(StructuralError {
        path: path.clone(),
        kind: StructuralErrorKind::NoLeafStep,
        message: format!("{} node has no children and no computation step", node.node_type),
    })
}
