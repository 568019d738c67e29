//! Argument errors and structural validation of execution trees.
pub mod error;
pub mod rules;
pub mod validator;

pub use error::{ArgumentError, StructuralError, StructuralErrorKind};
pub use validator::Validator;
