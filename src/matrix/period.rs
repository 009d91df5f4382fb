//! Conversion of a multi-month transition matrix to its monthly equivalent.
//!
//! `M_monthly = expm(logm(M) / period)`, followed by clamping negative entries
//! to zero and renormalizing rows. The log/exp round trip can leave small
//! negative probabilities when `M` has no exact stochastic root.

use nalgebra::DMatrix;

use crate::error::MatrixError;
use crate::math::{clamp_and_renormalize, expm, logm};

/// Monthly matrix for a matrix observed over `period` months.
///
/// `period <= 1` returns `m` unchanged.
pub fn to_monthly(m: &DMatrix<f64>, period: u32) -> Result<DMatrix<f64>, MatrixError> {
    if period <= 1 {
        return Ok(m.clone());
    }
    let generator = logm(m)? / period as f64;
    clamp_and_renormalize(&expm(&generator)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::is_row_stochastic;
    use proptest::prelude::*;

    #[test]
    fn monthly_period_is_identity_operation() {
        let m = DMatrix::from_row_slice(3, 3, &[0.9, 0.08, 0.02, 0.3, 0.5, 0.2, 0.0, 0.0, 1.0]);
        assert_eq!(to_monthly(&m, 1).unwrap(), m);
    }

    #[test]
    fn quarterly_root_cubes_back() {
        let m = DMatrix::from_row_slice(3, 3, &[0.85, 0.1, 0.05, 0.2, 0.6, 0.2, 0.0, 0.0, 1.0]);
        let monthly = to_monthly(&m, 3).unwrap();
        assert!(is_row_stochastic(&monthly, 1e-9));
        let cubed = &monthly * &monthly * &monthly;
        let err = (&cubed - &m).iter().fold(0.0f64, |a, v| a.max(v.abs()));
        assert!(err < 1e-6, "max deviation {err}");
    }

    #[test]
    fn singular_matrix_fails() {
        let m = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert!(to_monthly(&m, 3).is_err());
    }

    /// Diagonally dominant stochastic rows with an absorbing last state.
    fn stochastic_matrix() -> impl Strategy<Value = DMatrix<f64>> {
        prop::collection::vec((0.55f64..0.98, 0.0f64..1.0, 0.0f64..1.0), 3).prop_map(|rows| {
            let mut m = DMatrix::<f64>::zeros(3, 3);
            for (i, (diag, a, b)) in rows.into_iter().enumerate().take(2) {
                let rest = 1.0 - diag;
                let share = if a + b > 0.0 { a / (a + b) } else { 0.5 };
                let others: Vec<usize> = (0..3).filter(|&j| j != i).collect();
                m[(i, i)] = diag;
                m[(i, others[0])] = rest * share;
                m[(i, others[1])] = rest * (1.0 - share);
            }
            m[(2, 2)] = 1.0;
            m
        })
    }

    proptest! {
        #[test]
        fn converted_rows_are_stochastic(m in stochastic_matrix(), period in prop::sample::select(vec![3u32, 6, 12])) {
            let monthly = to_monthly(&m, period).unwrap();
            prop_assert!(monthly.iter().all(|v| *v >= 0.0));
            for row in monthly.row_iter() {
                prop_assert!((row.sum() - 1.0).abs() < 1e-6);
            }
        }
    }
}
