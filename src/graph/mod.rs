//! Query arguments and the execution tree built from them.
pub mod node;

pub use node::{ExecutionNode, MajorType, QueryComponent};
