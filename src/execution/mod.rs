//! Execution-tree evaluation: the step registry, the typed steps and the
//! depth-first evaluator.
pub mod evaluator;
pub mod registry;
pub mod steps;

pub use evaluator::{Evaluator, ExecutionError, ExecutionTrace, NodeReport, NodeState};
pub use registry::{ClassifyKind, RegressionKind, SetOp, StepKind, StepRegistry, TransformKind};
pub use steps::{Step, StepContext, StepError};
