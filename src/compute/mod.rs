//! The formula language: lexer, compiler, bytecode VM and numeric kernels.
pub mod bytecode;
pub mod engine;
pub mod kernel;
pub mod ledger;
pub mod lexer;
pub mod series;

pub use bytecode::{compile, Expression, IndexCode, IndexOp, IndexSpec, OpCode, SeriesRef};
pub use engine::{Engine, EvalContext};
pub use ledger::{CompileError, Ledger, VmError};
pub use series::apply_formula;
