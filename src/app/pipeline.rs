//! The ECL batch pipeline shared by every front-end command.
//!
//! Two phases separated by a hard barrier:
//!
//! 1. segment phase: link history → PD matrix → monthly matrix → PD curves,
//!    plus cure/recovery curves, for every segment
//! 2. loan phase: amortization → LGD → ECL for every loan, in parallel, reading
//!    the segment curves by shared reference
//!
//! Failures of one segment or one loan are recorded in [`Diagnostics`] and do
//! not stop the rest of the batch.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::{
    Diagnostics, EclRecord, EngineConfig, LoanFailure, LoanObservation, LoanRecord, LoanResult,
    RecoveryObservation, SegmentFailure, SegmentPhase, Warning,
};
use crate::error::EngineError;
use crate::loan::{SegmentInputs, evaluate_loan};
use crate::matrix::{
    CureRecoveryCurves, PdCurves, SegmentTransitions, build_transitions, estimate, project_segment,
    to_monthly,
};

/// Segment-level outputs, complete before any loan is evaluated.
#[derive(Debug, Clone)]
pub struct SegmentOutput {
    pub period_months: u32,
    pub transitions: BTreeMap<String, SegmentTransitions>,
    pub pd_curves: BTreeMap<String, PdCurves>,
    pub cure_recovery: BTreeMap<String, CureRecoveryCurves>,
    pub diagnostics: Diagnostics,
}

/// Everything one engine run produces.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub segments: SegmentOutput,
    /// Successful loans, in input order.
    pub loans: Vec<LoanResult>,
    pub diagnostics: Diagnostics,
}

impl BatchResult {
    pub fn records(&self) -> impl Iterator<Item = &EclRecord> {
        self.loans.iter().map(|l| &l.ecl)
    }

    pub fn total_ecl(&self) -> f64 {
        crate::math::round2(self.records().map(|r| r.total_ecl).sum())
    }
}

struct SegmentCurves {
    segment: String,
    pd: Result<(PdCurves, Vec<Warning>), EngineError>,
    cure: Result<(CureRecoveryCurves, Vec<Warning>), EngineError>,
}

/// Run the segment phase only.
pub fn run_segments(
    history: &[LoanObservation],
    recoveries: Option<&[RecoveryObservation]>,
    config: &EngineConfig,
) -> Result<SegmentOutput, EngineError> {
    config.validate()?;
    let set = build_transitions(history, recoveries, config)?;
    info!(
        rows = history.len(),
        segments = set.segments.len(),
        period_months = set.period_months,
        "linked loan history"
    );

    let period = set.period_months;
    let computed: Vec<SegmentCurves> = set
        .segments
        .par_iter()
        .map(|(name, seg)| SegmentCurves {
            segment: name.clone(),
            pd: seg.pd_matrix(config.zero_row_policy).and_then(|m| {
                let monthly = to_monthly(&m, period).map_err(|e| EngineError::degenerate(name, e))?;
                Ok(project_segment(name, monthly, config))
            }),
            cure: estimate(name, &seg.outcomes, period, config),
        })
        .collect();

    let mut diagnostics = Diagnostics {
        warnings: set.warnings.clone(),
        ..Diagnostics::default()
    };
    let mut pd_curves = BTreeMap::new();
    let mut cure_recovery = BTreeMap::new();

    for SegmentCurves { segment, pd, cure } in computed {
        match pd {
            Ok((curves, warnings)) => {
                diagnostics.warnings.extend(warnings);
                pd_curves.insert(segment.clone(), curves);
            }
            Err(error) => {
                warn!(segment = %segment, %error, "segment excluded from PD output");
                diagnostics.segment_failures.push(SegmentFailure {
                    segment: segment.clone(),
                    phase: SegmentPhase::PdMatrix,
                    error,
                });
            }
        }
        match cure {
            Ok((curves, warnings)) => {
                diagnostics.warnings.extend(warnings);
                cure_recovery.insert(segment, curves);
            }
            Err(error) => {
                warn!(segment = %segment, %error, "cure/recovery curves unavailable");
                diagnostics.segment_failures.push(SegmentFailure {
                    segment,
                    phase: SegmentPhase::CureRecovery,
                    error,
                });
            }
        }
    }

    info!(
        pd_segments = pd_curves.len(),
        cure_segments = cure_recovery.len(),
        failures = diagnostics.segment_failures.len(),
        "segment phase complete"
    );

    Ok(SegmentOutput {
        period_months: period,
        transitions: set.segments,
        pd_curves,
        cure_recovery,
        diagnostics,
    })
}

/// Evaluate every loan against already computed segment curves.
pub fn run_loans(
    segments: &SegmentOutput,
    loans: &[LoanRecord],
    config: &EngineConfig,
) -> (Vec<LoanResult>, Diagnostics) {
    let size = config.matrix_size;
    let results: Vec<Result<LoanResult, EngineError>> = loans
        .par_iter()
        .map(|loan| {
            let stage = size.classify(loan.days_past_due);
            let cure_recovery = segments.cure_recovery.get(&loan.segment).ok_or_else(|| {
                EngineError::loan(&loan.account_id, "no cure/recovery curves for segment")
            })?;
            let inputs = SegmentInputs {
                pd: segments.pd_curves.get(&loan.segment),
                cure_recovery,
                use_recovery_curve: config.use_recovery_curve,
            };
            evaluate_loan(loan, stage, &inputs)
        })
        .collect();

    let mut diagnostics = Diagnostics::default();
    let mut unknown: BTreeSet<&str> = BTreeSet::new();
    let mut ok = Vec::with_capacity(loans.len());
    for (loan, result) in loans.iter().zip(results) {
        match result {
            Ok(r) => ok.push(r),
            Err(error) => {
                warn!(account_id = %loan.account_id, %error, "loan excluded from ECL batch");
                diagnostics.loan_failures.push(LoanFailure {
                    account_id: loan.account_id.clone(),
                    error,
                });
            }
        }
        if !segments.transitions.contains_key(&loan.segment) {
            unknown.insert(loan.segment.as_str());
        }
    }
    for segment in unknown {
        diagnostics.warnings.push(Warning::new(
            segment,
            "segment appears in the loan book but not in the history",
        ));
    }
    (ok, diagnostics)
}

/// Full run: segment phase, then the per-loan phase.
pub fn run_engine(
    history: &[LoanObservation],
    recoveries: Option<&[RecoveryObservation]>,
    loans: &[LoanRecord],
    config: &EngineConfig,
) -> Result<BatchResult, EngineError> {
    if loans.is_empty() {
        return Err(EngineError::InvalidInput("loan book is empty".to_string()));
    }
    let segments = run_segments(history, recoveries, config)?;
    let (results, loan_diagnostics) = run_loans(&segments, loans, config);

    let mut diagnostics = segments.diagnostics.clone();
    diagnostics.loan_failures = loan_diagnostics.loan_failures;
    diagnostics.warnings.extend(loan_diagnostics.warnings);

    info!(
        loans = loans.len(),
        evaluated = results.len(),
        failed = diagnostics.loan_failures.len(),
        "loan phase complete"
    );

    Ok(BatchResult {
        segments,
        loans: results,
        diagnostics,
    })
}
