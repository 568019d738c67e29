//! Human-readable output: chart titles and evaluation traces.
pub mod title;
pub mod trace;

pub use trace::format_trace;
