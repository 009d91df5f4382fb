//! Cure and recovery curves for defaulted exposures.
//!
//! States of the compact matrix: `0` performing (cured), `1` recovered,
//! `2` still in default. Rows 0 and 1 are absorbing; row 2 comes from the
//! segment's [`DefaultOutcomes`].

use nalgebra::DMatrix;

use crate::domain::{EngineConfig, ProbabilityCurve, Warning};
use crate::error::EngineError;
use crate::matrix::builder::DefaultOutcomes;
use crate::matrix::projector::{check_curve, project};

const CURED: usize = 0;
const RECOVERED: usize = 1;
const DEFAULTED: usize = 2;

/// Identity matrix with the defaulted row replaced by the normalized outcome weights.
///
/// A segment with no defaulted balance keeps the identity row, so both curves are zero.
pub fn cure_recovery_matrix(outcomes: &DefaultOutcomes) -> DMatrix<f64> {
    let mut m = DMatrix::<f64>::identity(3, 3);
    let row = outcomes.cure_row();
    let total: f64 = row.iter().sum();
    if total > 0.0 && row.iter().all(|v| v.is_finite() && *v >= 0.0) {
        for (j, v) in row.iter().enumerate() {
            m[(DEFAULTED, j)] = v / total;
        }
    }
    m
}

/// Monthly root of a cure/recovery matrix over `period` months.
///
/// With rows 0 and 1 absorbing, the defaulted row `[c, r, s]` has the exact
/// root `[c k, r k, s^(1/p)]` with `k = (1 - s^(1/p)) / (1 - s)`. This holds
/// for `s = 0`, where the matrix is singular and has no logarithm.
pub fn monthly_root(period_matrix: &DMatrix<f64>, period: u32) -> DMatrix<f64> {
    let mut m = period_matrix.clone();
    if period <= 1 {
        return m;
    }
    let stay = period_matrix[(DEFAULTED, DEFAULTED)];
    if stay >= 1.0 {
        return m;
    }
    let stay_monthly = stay.max(0.0).powf(1.0 / period as f64);
    let k = (1.0 - stay_monthly) / (1.0 - stay);
    m[(DEFAULTED, CURED)] = period_matrix[(DEFAULTED, CURED)] * k;
    m[(DEFAULTED, RECOVERED)] = period_matrix[(DEFAULTED, RECOVERED)] * k;
    m[(DEFAULTED, DEFAULTED)] = stay_monthly;
    m
}

#[derive(Debug, Clone, PartialEq)]
pub struct CureRecoveryCurves {
    pub segment: String,
    /// Matrix over the observation period.
    pub period_matrix: DMatrix<f64>,
    pub monthly_matrix: DMatrix<f64>,
    pub cure: ProbabilityCurve,
    pub recovery: ProbabilityCurve,
}

impl CureRecoveryCurves {
    /// Marginal cure rates, month 1 first.
    pub fn cure_rates(&self) -> &[f64] {
        &self.cure.marginal
    }

    /// Marginal recovery rates, month 1 first.
    pub fn recovery_rates(&self) -> &[f64] {
        &self.recovery.marginal
    }
}

/// Build the segment's cure/recovery matrix, convert it to monthly and
/// project both curves over the lifetime horizon.
pub fn estimate(
    segment: &str,
    outcomes: &DefaultOutcomes,
    period_months: u32,
    config: &EngineConfig,
) -> Result<(CureRecoveryCurves, Vec<Warning>), EngineError> {
    let period_matrix = cure_recovery_matrix(outcomes);
    let monthly_matrix = monthly_root(&period_matrix, period_months);
    if monthly_matrix.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::degenerate(
            segment,
            "non-finite monthly cure/recovery matrix",
        ));
    }

    let steps = config.lifetime_horizon;
    let cure = project(&monthly_matrix, DEFAULTED, CURED, steps);
    let recovery = project(&monthly_matrix, DEFAULTED, RECOVERED, steps);

    let tol = config.monotone_tolerance;
    let mut warnings = check_curve(&cure, tol, segment, "cure");
    warnings.extend(check_curve(&recovery, tol, segment, "recovery"));

    let curves = CureRecoveryCurves {
        segment: segment.to_string(),
        period_matrix,
        monthly_matrix,
        cure,
        recovery,
    };
    Ok((curves, warnings))
}
