//! Ordinary least squares of one series on another.

use crate::compute::kernel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OlsFit {
    pub alpha: f64,
    pub beta: f64,
    pub r_squared: f64,
}

impl OlsFit {
    #[inline(always)]
    pub fn predict(&self, x: f64) -> f64 {
        self.alpha + self.beta * x
    }
}

/// Fits `y = alpha + beta·x`. Needs two or more points and a non-constant x.
pub fn ols(x: &[f64], y: &[f64]) -> Option<OlsFit> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mx = kernel::sum(x) / n as f64;
    let my = kernel::sum(y) / n as f64;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if sxx == 0.0 {
        return None;
    }
    let beta = sxy / sxx;
    let alpha = my - beta * mx;
    let r_squared = if syy == 0.0 { 1.0 } else { (sxy * sxy) / (sxx * syy) };
    Some(OlsFit { alpha, beta, r_squared })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|v| 0.5 + 2.0 * v).collect();
        let fit = ols(&x, &y).unwrap();
        assert!((fit.alpha - 0.5).abs() < 1e-12);
        assert!((fit.beta - 2.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert!((fit.predict(5.0) - 10.5).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(ols(&[1.0], &[1.0]).is_none());
        assert!(ols(&[1.0, 1.0], &[1.0, 2.0]).is_none());
    }
}
