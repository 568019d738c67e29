//! Error types for argument checking and structural validation.
use crate::analysis::NodePath;
use thiserror::Error;

/// A node argument was missing or unusable; the step ran with `default`.
///
/// Never fatal: the message is attached to the node's result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("{step}: missing {what}, using {default}")]
    Missing { step: String, what: String, default: String },
    #[error("{step}: invalid {what} '{value}', using {default}")]
    Invalid { step: String, what: String, value: String, default: String },
}

/// The category of a structural problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralErrorKind {
    /// The tree is deeper than the configured limit.
    TooDeep,
    /// A node has the wrong number of children for its type.
    Arity,
    /// A leaf whose type has no step to produce data.
    NoLeafStep,
}

/// A structural report from the tree validator. Any one of these aborts the
/// evaluation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StructuralError {
    /// Where the problem was detected.
    pub path: NodePath,
    pub kind: StructuralErrorKind,
    pub message: String,
}
