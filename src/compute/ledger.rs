use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Empty formula")]
    Empty,
    #[error("Syntax error at {pos}: {msg}")]
    Syntax { pos: usize, msg: String },
    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Bad index: {0}")]
    BadIndex(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VmError {
    #[error("Index {index} out of bounds for length {len}")]
    OutOfBounds { index: i64, len: usize },
    #[error("Invalid range [{begin}:{end}]")]
    InvalidRange { begin: i64, end: i64 },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Empty argument to '{0}'")]
    EmptyArgument(&'static str),
    #[error("Series val{0} is not available")]
    MissingSeries(usize),
    #[error("No general series to broadcast over")]
    MissingGeneral,
    #[error("Output value at position {0} is not available")]
    MissingLedgerValue(usize),
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Stack overflow")]
    StackOverflow,
}

impl VmError {
    /// Errors that only invalidate the current output point.
    pub fn is_point_local(&self) -> bool {
        matches!(
            self,
            VmError::OutOfBounds { .. }
                | VmError::InvalidRange { .. }
                | VmError::DivisionByZero
                | VmError::EmptyArgument(_)
                | VmError::MissingLedgerValue(_)
        )
    }
}

/// The output under construction, readable by `this`.
///
/// Only the already computed prefix is visible: its length is the current
/// position. Skipped points are stored as `None`.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    values: Vec<Option<f64>>,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(n: usize) -> Self {
        Self { values: Vec::with_capacity(n) }
    }

    #[inline(always)]
    pub fn len(&self) -> usize { self.values.len() }

    #[inline(always)]
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn push(&mut self, value: Option<f64>) {
        self.values.push(value);
    }

    pub fn get(&self, idx: usize) -> Result<f64, VmError> {
        match self.values.get(idx) {
            Some(Some(v)) => Ok(*v),
            _ => Err(VmError::MissingLedgerValue(idx)),
        }
    }

    pub fn values(&self) -> &[Option<f64>] { &self.values }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_missing_values() {
        let mut l = Ledger::new();
        l.push(Some(1.0));
        l.push(None);
        assert_eq!(l.get(0), Ok(1.0));
        assert_eq!(l.get(1), Err(VmError::MissingLedgerValue(1)));
        assert_eq!(l.get(2), Err(VmError::MissingLedgerValue(2)));
    }

    #[test]
    fn test_point_local_classification() {
        assert!(VmError::DivisionByZero.is_point_local());
        assert!(VmError::MissingLedgerValue(3).is_point_local());
        assert!(!VmError::MissingSeries(2).is_point_local());
        assert!(!VmError::StackUnderflow.is_point_local());
    }
}
