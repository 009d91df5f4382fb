//! Discounted collateral value and the per-period LGD schedule.

use crate::domain::{AmortizationEntry, CollateralItem, LgdEntry, Stage};
use crate::error::EngineError;
use crate::math::clip01;

/// Guards the LGD ratio when the period's exposure is zero.
pub const LGD_EPSILON: f64 = 1e-5;

/// `value * (1 - haircut) * (1 + eir)^(-months / 12) - cost_of_recovery * value`
pub fn discounted_value(item: &CollateralItem, eir: f64) -> f64 {
    let years = item.time_to_realize_months / 12.0;
    item.value * (1.0 - item.haircut) * (1.0 + eir).powf(-years)
        - item.cost_of_recovery_rate * item.value
}

/// Sum of discounted values; items with an unknown (non-finite) value are skipped.
pub fn total_discounted_value(items: &[CollateralItem], eir: f64) -> f64 {
    let total: f64 = items
        .iter()
        .map(|item| discounted_value(item, eir))
        .filter(|v| v.is_finite())
        .sum();
    if total.is_finite() { total } else { 0.0 }
}

/// Inputs shared by every period of one loan's LGD schedule.
#[derive(Debug, Clone, Copy)]
pub struct LgdInputs<'a> {
    pub stage: Stage,
    pub eir: f64,
    pub collateral: &'a [CollateralItem],
    /// Marginal monthly cure rates of the loan's segment.
    pub cure_rates: &'a [f64],
    /// Marginal monthly recovery rates; `None` leaves recoveries out of the LGD.
    pub recovery_rates: Option<&'a [f64]>,
}

/// LGD per period, aligned by index with `schedule`.
///
/// Defaulted loans get a single entry for the current period.
pub fn lgd_schedule(
    account_id: &str,
    schedule: &[AmortizationEntry],
    inputs: &LgdInputs<'_>,
) -> Result<Vec<LgdEntry>, EngineError> {
    let dcv = total_discounted_value(inputs.collateral, inputs.eir);

    let mut len = schedule.len().min(inputs.cure_rates.len());
    if let Some(rec) = inputs.recovery_rates {
        len = len.min(rec.len());
    }
    if inputs.stage.is_default() {
        len = len.min(1);
    }
    if len == 0 {
        return Err(EngineError::loan(
            account_id,
            "no overlap between schedule and cure curve",
        ));
    }

    let entries = schedule
        .iter()
        .take(len)
        .enumerate()
        .map(|(t, entry)| {
            let ead = entry.outstanding_balance;
            let cure = inputs.cure_rates[t];
            let recovery = inputs.recovery_rates.map(|r| r[t]);
            let uncovered = clip01((ead - dcv) / (ead + LGD_EPSILON));
            let lgd = clip01(uncovered * (1.0 - cure) * (1.0 - recovery.unwrap_or(0.0)));
            LgdEntry {
                period_date: entry.period_date,
                lgd,
                cure_rate: cure,
                recovery_rate: recovery,
                total_discounted_collateral_value: dcv,
            }
        })
        .collect();
    Ok(entries)
}
