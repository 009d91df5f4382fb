//! Row-stochastic matrix helpers.

use nalgebra::DMatrix;

use crate::error::MatrixError;

pub fn row_sums(m: &DMatrix<f64>) -> Vec<f64> {
    m.row_iter().map(|r| r.sum()).collect()
}

/// Divide every row by its total.
///
/// Fails with [`MatrixError::InvalidRow`] on the first row whose total is not
/// strictly positive.
pub fn normalize_rows(m: &DMatrix<f64>) -> Result<DMatrix<f64>, MatrixError> {
    if !m.iter().all(|v| v.is_finite()) {
        return Err(MatrixError::NonFinite);
    }
    let mut out = m.clone();
    for (i, total) in row_sums(m).into_iter().enumerate() {
        if total <= 0.0 {
            return Err(MatrixError::InvalidRow { row: i });
        }
        for v in out.row_mut(i).iter_mut() {
            *v /= total;
        }
    }
    Ok(out)
}

/// Zero out negative entries, then renormalize rows to sum to one.
pub fn clamp_and_renormalize(m: &DMatrix<f64>) -> Result<DMatrix<f64>, MatrixError> {
    normalize_rows(&m.map(|v| v.max(0.0)))
}

/// Copy of `m` whose row `state` is `e_state` (absorbing).
pub fn with_absorbing_row(m: &DMatrix<f64>, state: usize) -> DMatrix<f64> {
    let mut out = m.clone();
    out.row_mut(state).fill(0.0);
    out[(state, state)] = 1.0;
    out
}

/// Non-negative entries with rows summing to one within `tol`.
pub fn is_row_stochastic(m: &DMatrix<f64>, tol: f64) -> bool {
    m.iter().all(|v| v.is_finite() && *v >= 0.0)
        && row_sums(m).iter().all(|s| (s - 1.0).abs() <= tol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_balance_weights() {
        let w = DMatrix::from_row_slice(2, 2, &[300.0, 100.0, 0.0, 50.0]);
        let p = normalize_rows(&w).unwrap();
        assert_eq!(p[(0, 0)], 0.75);
        assert_eq!(p[(0, 1)], 0.25);
        assert_eq!(p[(1, 1)], 1.0);
    }

    #[test]
    fn empty_row_is_reported() {
        let w = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 0.0]);
        assert_eq!(normalize_rows(&w), Err(MatrixError::InvalidRow { row: 1 }));
    }

    #[test]
    fn clamp_removes_small_negatives() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0001, -0.0001, 0.5, 0.5]);
        let c = clamp_and_renormalize(&m).unwrap();
        assert!(is_row_stochastic(&c, 1e-12));
        assert_eq!(c[(0, 1)], 0.0);
    }

    #[test]
    fn absorbing_row_leaves_source_untouched() {
        let m = DMatrix::from_row_slice(2, 2, &[0.9, 0.1, 0.3, 0.7]);
        let a = with_absorbing_row(&m, 1);
        assert_eq!(a[(1, 0)], 0.0);
        assert_eq!(a[(1, 1)], 1.0);
        assert_eq!(m[(1, 0)], 0.3);
    }
}
