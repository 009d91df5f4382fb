//! Multi-step default curves from a monthly transition matrix.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use nalgebra::{DMatrix, RowDVector};

use crate::domain::{EngineConfig, MatrixSize, ProbabilityCurve, Stage, Warning};
use crate::math::month_end_offset;

/// `cumulative[i-1] = (M^i)[origin, target]` for `i = 1..=steps`.
///
/// Propagates the origin's row vector one step at a time, which is the same
/// as reading one row of successive matrix powers.
pub fn project(m: &DMatrix<f64>, origin: usize, target: usize, steps: usize) -> ProbabilityCurve {
    let n = m.nrows();
    let mut state = RowDVector::<f64>::zeros(n);
    state[origin] = 1.0;

    let mut cumulative = Vec::with_capacity(steps);
    for _ in 0..steps {
        state = &state * m;
        cumulative.push(state[target]);
    }
    ProbabilityCurve::from_cumulative(cumulative)
}

/// Report decreasing or out-of-range points of `curve` as warnings.
pub fn check_curve(curve: &ProbabilityCurve, tol: f64, scope: &str, label: &str) -> Vec<Warning> {
    let mut out = Vec::new();
    let drops = curve.monotonic_violations(tol);
    if let Some(first) = drops.first() {
        out.push(Warning::new(
            scope,
            format!(
                "{label}: cumulative curve decreases at {} point(s), first at month {}",
                drops.len(),
                first + 1
            ),
        ));
    }
    let bounds = curve.bound_violations(tol);
    if let Some(first) = bounds.first() {
        out.push(Warning::new(
            scope,
            format!(
                "{label}: {} probability value(s) outside [0, 1], first at month {}",
                bounds.len(),
                first + 1
            ),
        ));
    }
    out
}

/// Default curves for every non-default origin stage of one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct PdCurves {
    pub segment: String,
    pub size: MatrixSize,
    /// Monthly matrix with an absorbing default row.
    pub monthly_matrix: DMatrix<f64>,
    pub by_stage: BTreeMap<Stage, ProbabilityCurve>,
}

impl PdCurves {
    /// Curve for a loan currently in `stage`; `None` for default or a stage
    /// of the other matrix size.
    pub fn for_stage(&self, stage: Stage) -> Option<&ProbabilityCurve> {
        self.by_stage.get(&stage)
    }
}

/// Project the segment's monthly matrix from each performing origin stage.
///
/// The first origin uses `stage1_horizon` steps, the others `lifetime_horizon`.
pub fn project_segment(
    segment: &str,
    monthly: DMatrix<f64>,
    config: &EngineConfig,
) -> (PdCurves, Vec<Warning>) {
    let size = config.matrix_size;
    let default = size.default_index();
    let mut by_stage = BTreeMap::new();
    let mut warnings = Vec::new();

    for (origin, &stage) in size.stages().iter().enumerate().take(default) {
        let steps = if origin == 0 {
            config.stage1_horizon
        } else {
            config.lifetime_horizon
        };
        let curve = project(&monthly, origin, default, steps);
        warnings.extend(check_curve(
            &curve,
            config.monotone_tolerance,
            segment,
            stage.as_str(),
        ));
        by_stage.insert(stage, curve);
    }

    let curves = PdCurves {
        segment: segment.to_string(),
        size,
        monthly_matrix: monthly,
        by_stage,
    };
    (curves, warnings)
}

/// Month-end dates for curve points `1..=len` after `valuation_date`.
pub fn curve_dates(valuation_date: NaiveDate, len: usize) -> Vec<NaiveDate> {
    (1..=len as u32)
        .map(|i| month_end_offset(valuation_date, i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_matrix() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[0.95, 0.04, 0.01, 0.10, 0.80, 0.10, 0.0, 0.0, 1.0])
    }

    #[test]
    fn first_step_reads_the_matrix_entry() {
        let m = sample_matrix();
        let curve = project(&m, 0, 2, 3);
        assert!((curve.cumulative[0] - 0.01).abs() < 1e-15);
        let m2 = &m * &m;
        assert!((curve.cumulative[1] - m2[(0, 2)]).abs() < 1e-15);
        let m3 = &m2 * &m;
        assert!((curve.cumulative[2] - m3[(0, 2)]).abs() < 1e-15);
    }

    #[test]
    fn horizons_follow_origin_stage() {
        let (curves, warnings) = project_segment("retail", sample_matrix(), &EngineConfig::default());
        assert!(warnings.is_empty());
        assert_eq!(curves.for_stage(Stage::Stage1).unwrap().len(), 12);
        assert_eq!(curves.for_stage(Stage::Stage2).unwrap().len(), 300);
        assert!(curves.for_stage(Stage::Stage3).is_none());
    }

    #[test]
    fn four_state_curves_are_keyed_by_substage() {
        let m = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.90, 0.06, 0.03, 0.01, //
                0.20, 0.60, 0.15, 0.05, //
                0.05, 0.15, 0.60, 0.20, //
                0.00, 0.00, 0.00, 1.00,
            ],
        );
        let config = EngineConfig {
            matrix_size: MatrixSize::Four,
            ..EngineConfig::default()
        };
        let (curves, _) = project_segment("sme", m, &config);
        assert_eq!(curves.by_stage.len(), 3);
        let a = curves.for_stage(Stage::Stage2a).unwrap();
        let b = curves.for_stage(Stage::Stage2b).unwrap();
        assert!(b.cumulative[0] > a.cumulative[0]);
    }

    #[test]
    fn decreasing_curve_is_reported() {
        let curve = ProbabilityCurve::from_cumulative(vec![0.1, 0.05, 1.2]);
        let warnings = check_curve(&curve, 1e-12, "retail", "stage_1");
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].scope, "retail");
    }

    #[test]
    fn curve_dates_are_month_ends() {
        let v = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let dates = curve_dates(v, 2);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }

    fn absorbing_matrix() -> impl Strategy<Value = DMatrix<f64>> {
        prop::collection::vec(0.0f64..1.0, 6).prop_map(|w| {
            let mut m = DMatrix::<f64>::zeros(3, 3);
            for i in 0..2 {
                let row = [w[3 * i] + 1e-3, w[3 * i + 1], w[3 * i + 2]];
                let total: f64 = row.iter().sum();
                for (j, v) in row.iter().enumerate() {
                    m[(i, j)] = v / total;
                }
            }
            m[(2, 2)] = 1.0;
            m
        })
    }

    proptest! {
        #[test]
        fn cumulative_default_is_monotone_and_bounded(m in absorbing_matrix(), origin in 0usize..2, steps in 1usize..120) {
            let curve = project(&m, origin, 2, steps);
            prop_assert!(curve.monotonic_violations(1e-12).is_empty());
            prop_assert!(curve.bound_violations(1e-12).is_empty());
            let total: f64 = curve.marginal.iter().sum();
            prop_assert!((total - curve.cumulative[steps - 1]).abs() < 1e-9);
        }
    }
}
