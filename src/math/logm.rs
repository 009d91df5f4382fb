//! Principal matrix logarithm and square root.
//!
//! `logm` uses inverse scaling and squaring:
//!
//! 1. take repeated principal square roots until `A^(1/2^k)` is close to `I`
//! 2. evaluate `log(X)` with the Gregory series
//!    `log(X) = 2 Σ_{j≥0} Z^(2j+1) / (2j+1)`, `Z = (X - I)(X + I)^-1`
//! 3. scale back: `log(A) = 2^k log(X)`
//!
//! Square roots use the Denman–Beavers iteration, which only needs inverses.
//! Both routines target the small (3x3 / 4x4) transition matrices of this
//! crate; they are not tuned for large dimensions.

use nalgebra::DMatrix;

use crate::error::MatrixError;

/// Stop taking square roots once `‖X - I‖_F` drops below this.
const SQRT_TARGET: f64 = 0.25;
const MAX_SQRTS: usize = 64;
const MAX_DB_ITERS: usize = 100;
const MAX_SERIES_TERMS: usize = 200;
const TOL: f64 = 1e-15;

/// Principal logarithm of a square matrix with no eigenvalues on the closed negative real axis.
pub fn logm(a: &DMatrix<f64>) -> Result<DMatrix<f64>, MatrixError> {
    check_square_finite(a)?;
    let n = a.nrows();
    let identity = DMatrix::<f64>::identity(n, n);

    let mut x = a.clone();
    let mut k = 0usize;
    while (&x - &identity).norm() > SQRT_TARGET {
        if k == MAX_SQRTS {
            return Err(MatrixError::NoConvergence("inverse scaling and squaring"));
        }
        x = sqrtm(&x)?;
        k += 1;
    }

    let denom = (&x + &identity).try_inverse().ok_or(MatrixError::Singular)?;
    let z = (&x - &identity) * denom;
    let z2 = &z * &z;

    let mut term = z.clone();
    let mut sum = z;
    let mut converged = false;
    for j in 1..MAX_SERIES_TERMS {
        term = &term * &z2;
        let add = &term / (2 * j + 1) as f64;
        let add_norm = add.norm();
        sum += add;
        if add_norm <= TOL * sum.norm().max(1.0) {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(MatrixError::NoConvergence("logarithm series"));
    }

    let out = sum * (2.0 * 2f64.powi(k as i32));
    if out.iter().all(|v| v.is_finite()) {
        Ok(out)
    } else {
        Err(MatrixError::NonFinite)
    }
}

/// Principal square root via the Denman–Beavers iteration.
pub fn sqrtm(a: &DMatrix<f64>) -> Result<DMatrix<f64>, MatrixError> {
    check_square_finite(a)?;
    let n = a.nrows();
    let mut y = a.clone();
    let mut z = DMatrix::<f64>::identity(n, n);

    for _ in 0..MAX_DB_ITERS {
        let y_inv = y.clone().try_inverse().ok_or(MatrixError::Singular)?;
        let z_inv = z.clone().try_inverse().ok_or(MatrixError::Singular)?;
        let y_next = (&y + z_inv) * 0.5;
        let z_next = (&z + y_inv) * 0.5;

        let delta = (&y_next - &y).norm();
        let scale = y_next.norm().max(1.0);
        y = y_next;
        z = z_next;

        if !y.iter().all(|v| v.is_finite()) {
            return Err(MatrixError::NonFinite);
        }
        if delta <= 1e-14 * scale {
            return Ok(y);
        }
    }

    Err(MatrixError::NoConvergence("matrix square root"))
}

/// Matrix exponential (Padé approximation with scaling and squaring).
pub fn expm(a: &DMatrix<f64>) -> Result<DMatrix<f64>, MatrixError> {
    check_square_finite(a)?;
    let out = a.exp();
    if out.iter().all(|v| v.is_finite()) {
        Ok(out)
    } else {
        Err(MatrixError::NonFinite)
    }
}

fn check_square_finite(a: &DMatrix<f64>) -> Result<(), MatrixError> {
    if !a.is_square() {
        return Err(MatrixError::NotSquare {
            rows: a.nrows(),
            cols: a.ncols(),
        });
    }
    if !a.iter().all(|v| v.is_finite()) {
        return Err(MatrixError::NonFinite);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn max_abs_diff(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
        (a - b).iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    #[test]
    fn log_of_identity_is_zero() {
        let i = DMatrix::<f64>::identity(3, 3);
        let l = logm(&i).unwrap();
        assert!(l.iter().all(|v| v.abs() < 1e-15));
    }

    #[test]
    fn log_of_diagonal_matches_scalar_log() {
        let d = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![0.9, 0.5, 0.05]));
        let l = logm(&d).unwrap();
        assert_relative_eq!(l[(0, 0)], 0.9f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(l[(1, 1)], 0.5f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(l[(2, 2)], 0.05f64.ln(), epsilon = 1e-10);
        assert!(l[(0, 1)].abs() < 1e-14);
    }

    #[test]
    fn exp_inverts_log_on_transition_matrix() {
        let m = DMatrix::from_row_slice(
            3,
            3,
            &[0.90, 0.07, 0.03, 0.20, 0.60, 0.20, 0.0, 0.0, 1.0],
        );
        let back = expm(&logm(&m).unwrap()).unwrap();
        assert!(max_abs_diff(&back, &m) < 1e-10);
    }

    #[test]
    fn sqrt_squares_back() {
        let m = DMatrix::from_row_slice(2, 2, &[0.8, 0.2, 0.1, 0.9]);
        let r = sqrtm(&m).unwrap();
        assert!(max_abs_diff(&(&r * &r), &m) < 1e-12);
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 0.0]);
        assert!(logm(&m).is_err());
    }

    #[test]
    fn non_square_is_rejected() {
        let m = DMatrix::<f64>::zeros(2, 3);
        assert_eq!(
            logm(&m),
            Err(MatrixError::NotSquare { rows: 2, cols: 3 })
        );
    }
}
