//! Static analysis of formulas and trees, plus least-squares fitting.
pub mod regression;
pub mod telemetry;
pub mod topology;

pub use regression::{ols, OlsFit};
pub use telemetry::ProgramReport;
pub use topology::NodePath;
