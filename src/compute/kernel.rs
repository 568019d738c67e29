//! Numeric kernels behind the formula functions.
//!
//! Empty inputs are reported as `None`; the engine maps that to
//! `VmError::EmptyArgument`.

use wide::f64x4;

#[inline(always)]
fn lanes(c: &[f64]) -> f64x4 {
    f64x4::new([c[0], c[1], c[2], c[3]])
}

pub fn sum(xs: &[f64]) -> f64 {
    let chunks = xs.chunks_exact(4);
    let tail: f64 = chunks.remainder().iter().sum();
    let mut acc = f64x4::splat(0.0);
    for c in chunks {
        acc = acc + lanes(c);
    }
    acc.to_array().iter().sum::<f64>() + tail
}

/// Σ aᵢ·bᵢ over the common prefix.
pub fn sumproduct(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    let (a, b) = (&a[..n], &b[..n]);
    let ca = a.chunks_exact(4);
    let cb = b.chunks_exact(4);
    let tail: f64 = ca.remainder().iter().zip(cb.remainder()).map(|(x, y)| x * y).sum();
    let mut acc = f64x4::splat(0.0);
    for (x, y) in ca.zip(cb) {
        acc = acc + lanes(x) * lanes(y);
    }
    acc.to_array().iter().sum::<f64>() + tail
}

pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() { None } else { Some(sum(xs) / xs.len() as f64) }
}

/// Sample variance (n−1 denominator).
pub fn variance(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs)?;
    let ss: f64 = xs.iter().map(|x| (x - m) * (x - m)).sum();
    Some(ss / (xs.len() - 1) as f64)
}

pub fn stddev(xs: &[f64]) -> Option<f64> {
    variance(xs).map(f64::sqrt)
}

pub fn median(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    let mut v = xs.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    Some(if v.len() % 2 == 0 { (v[mid - 1] + v[mid]) / 2.0 } else { v[mid] })
}

pub fn min(xs: &[f64]) -> Option<f64> {
    xs.iter().copied().reduce(f64::min)
}

pub fn max(xs: &[f64]) -> Option<f64> {
    xs.iter().copied().reduce(f64::max)
}

pub fn product(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() { None } else { Some(xs.iter().product()) }
}

/// Π(1+x) − 1.
pub fn compound(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() { None } else { Some(xs.iter().map(|x| 1.0 + x).product::<f64>() - 1.0) }
}

/// (last/first)^(365.25/days) − 1.
pub fn cagr(xs: &[f64], days: f64) -> Option<f64> {
    let (first, last) = (*xs.first()?, *xs.last()?);
    if days <= 0.0 || first == 0.0 {
        return None;
    }
    Some((last / first).powf(365.25 / days) - 1.0)
}

/// Values whose mask entry is nonzero.
pub fn masked(values: &[f64], mask: &[f64]) -> Vec<f64> {
    values.iter().zip(mask).filter(|(_, m)| **m != 0.0).map(|(v, _)| *v).collect()
}

/// Linear-interpolated quantile of sorted data (numpy's default).
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_simd_sum_matches_scalar() {
        let xs: Vec<f64> = (1..=11).map(f64::from).collect();
        assert!(close(sum(&xs), 66.0));
        assert!(close(sum(&[]), 0.0));
        let ys: Vec<f64> = (1..=11).map(|i| f64::from(i) * 0.5).collect();
        assert!(close(sumproduct(&xs, &ys), xs.iter().zip(&ys).map(|(a, b)| a * b).sum()));
    }

    #[rstest]
    #[case(&[1.0, 2.0, 3.0, 4.0], 2.5)]
    #[case(&[5.0, 1.0, 3.0], 3.0)]
    fn test_median(#[case] xs: &[f64], #[case] expected: f64) {
        assert_eq!(median(xs), Some(expected));
    }

    #[test]
    fn test_sample_statistics() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(close(variance(&xs).unwrap(), 32.0 / 7.0));
        assert!(variance(&[1.0]).is_none());
    }

    #[test]
    fn test_compound_and_cagr() {
        assert!(close(compound(&[0.1, 0.1, 0.1]).unwrap(), 1.1f64.powi(3) - 1.0));
        assert!(close(cagr(&[100.0, 121.0], 2.0 * 365.25).unwrap(), 0.1));
        assert!(cagr(&[100.0, 121.0], 0.0).is_none());
        assert!(compound(&[]).is_none());
    }

    #[test]
    fn test_quantile_interpolates() {
        let v = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(quantile_sorted(&v, 0.25), Some(20.0));
        assert_eq!(quantile_sorted(&v, 0.5), Some(30.0));
        assert_eq!(quantile_sorted(&[1.0, 2.0], 0.5), Some(1.5));
    }
}
