//! Per-loan ECL: `pd[t] * ead[t] * lgd[t] * (1 + eir)^(-t/12)` for `t = 1..=n`.

use crate::domain::{AmortizationEntry, EclEntry, EclRecord, LgdEntry, LoanRecord, LoanResult, Stage};
use crate::error::EngineError;
use crate::loan::amortization::amortize;
use crate::loan::collateral::{LgdInputs, lgd_schedule};
use crate::math::{round_to, round2};
use crate::matrix::{CureRecoveryCurves, PdCurves};

/// Decimal places kept on probability-like output fields.
const PROB_DP: i32 = 8;

/// Defaulted loans carry a certain default in their single period.
static DEFAULTED_PD: [f64; 1] = [1.0];

/// Marginal PD curve applied to a loan in `stage`.
pub fn stage_pd<'a>(
    account_id: &str,
    stage: Stage,
    curves: Option<&'a PdCurves>,
) -> Result<&'a [f64], EngineError> {
    if stage.is_default() {
        return Ok(&DEFAULTED_PD[..]);
    }
    let curves = curves.ok_or_else(|| EngineError::loan(account_id, "no PD curves for segment"))?;
    curves
        .for_stage(stage)
        .map(|c| c.marginal.as_slice())
        .ok_or_else(|| {
            EngineError::loan(
                account_id,
                format!("no PD curve for {stage} in a {}-state matrix", curves.size.states()),
            )
        })
}

/// Combine PD, EAD and LGD into the loan's ECL record.
pub fn aggregate(
    loan: &LoanRecord,
    stage: Stage,
    schedule: &[AmortizationEntry],
    lgd: &[LgdEntry],
    pd: &[f64],
) -> Result<EclRecord, EngineError> {
    let n = schedule.len().min(pd.len()).min(lgd.len());
    if n == 0 {
        return Err(EngineError::loan(
            &loan.account_id,
            "PD, exposure and LGD series do not overlap",
        ));
    }

    let eir = loan.annual_rate;
    let mut total = 0.0;
    let mut entries = Vec::with_capacity(n);
    for t in 1..=n {
        let ead = schedule[t - 1].outstanding_balance;
        let p = pd[t - 1];
        let l = lgd[t - 1].lgd;
        let df = (1.0 + eir).powf(-(t as f64) / 12.0);
        let ecl = p * ead * l * df;
        if !ecl.is_finite() {
            return Err(EngineError::loan(
                &loan.account_id,
                format!("non-finite ECL in period {t}"),
            ));
        }
        total += ecl;
        entries.push(EclEntry {
            period_index: t,
            period_date: schedule[t - 1].period_date,
            ead: round2(ead),
            pd: round_to(p, PROB_DP),
            lgd: round_to(l, PROB_DP),
            discount_factor: round_to(df, PROB_DP),
            ecl: round2(ecl),
        });
    }

    Ok(EclRecord {
        account_id: loan.account_id.clone(),
        segment: loan.segment.clone(),
        stage,
        exposure: round2(loan.outstanding_balance),
        entries,
        total_ecl: round2(total),
    })
}

/// Shared segment-level inputs for one loan.
#[derive(Debug, Clone, Copy)]
pub struct SegmentInputs<'a> {
    pub pd: Option<&'a PdCurves>,
    pub cure_recovery: &'a CureRecoveryCurves,
    pub use_recovery_curve: bool,
}

/// Schedule, LGD and ECL for one loan in `stage`.
pub fn evaluate_loan(
    loan: &LoanRecord,
    stage: Stage,
    segment: &SegmentInputs<'_>,
) -> Result<LoanResult, EngineError> {
    let pd = stage_pd(&loan.account_id, stage, segment.pd)?;
    let schedule = amortize(loan, stage)?;
    let inputs = LgdInputs {
        stage,
        eir: loan.annual_rate,
        collateral: &loan.collateral,
        cure_rates: segment.cure_recovery.cure_rates(),
        recovery_rates: segment
            .use_recovery_curve
            .then(|| segment.cure_recovery.recovery_rates()),
    };
    let lgd = lgd_schedule(&loan.account_id, &schedule, &inputs)?;
    let ecl = aggregate(loan, stage, &schedule, &lgd, pd)?;
    Ok(LoanResult { schedule, lgd, ecl })
}
