//! Forward amortization of a single loan from its valuation date.
//!
//! The contracted installment is the level annuity payment on the disbursed
//! amount over the full term. The schedule then runs month by month from the
//! valuation date on the current balance:
//!
//! ```text
//! payment month:     closing = round2(balance * (1 + r) - payment)
//! non-payment month: closing = round2(balance * (1 + r))
//! ```
//!
//! where `r = annual_rate / payment_frequency` and payment months are every
//! `12 / payment_frequency` months. A payment larger than the balance is cut
//! down to clear the loan and stays cut for the rest of the schedule.

use crate::domain::{AmortizationEntry, LoanRecord, Stage};
use crate::error::EngineError;
use crate::math::{month_end_offset, round2, year_fraction};

/// Months covered by a performing loan's schedule at most.
pub const STAGE1_MONTHS: usize = 12;

/// Added to a capped final payment so the closing balance rounds to zero.
const FINAL_PAYMENT_BUFFER: f64 = 0.001;

/// Level payment for `principal` over `periods` payments at `rate` per period.
pub fn annuity_payment(rate: f64, periods: u32, principal: f64) -> f64 {
    if periods == 0 {
        return principal;
    }
    if rate == 0.0 {
        return principal / periods as f64;
    }
    principal * rate / (1.0 - (1.0 + rate).powi(-(periods as i32)))
}

/// Derived terms of a loan used to drive the schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmortizationTerms {
    pub periodic_rate: f64,
    pub remaining_payments: u32,
    pub total_payments: u32,
    pub installment: f64,
    /// Months between payments.
    pub payment_interval: u32,
}

impl AmortizationTerms {
    pub fn from_loan(loan: &LoanRecord) -> Result<Self, EngineError> {
        let freq = loan.payment_frequency;
        if freq == 0 || 12 % freq != 0 {
            return Err(EngineError::loan(
                &loan.account_id,
                format!("payment frequency {freq} does not divide 12"),
            ));
        }
        if !loan.annual_rate.is_finite() {
            return Err(EngineError::loan(&loan.account_id, "missing or non-finite rate"));
        }
        if !(loan.outstanding_balance.is_finite() && loan.disbursed_amount.is_finite()) {
            return Err(EngineError::loan(&loan.account_id, "non-finite balance"));
        }

        let maturity = effective_maturity(loan);
        let remaining_years = year_fraction(loan.valuation_date, maturity);
        let total_years = year_fraction(loan.disbursement_date, maturity);
        let remaining_payments = payment_count(freq, remaining_years);
        let total_payments = payment_count(freq, total_years);

        let periodic_rate = loan.annual_rate / freq as f64;
        let installment = round2(annuity_payment(
            periodic_rate,
            total_payments,
            loan.disbursed_amount,
        ));

        Ok(Self {
            periodic_rate,
            remaining_payments,
            total_payments,
            installment,
            payment_interval: 12 / freq,
        })
    }

    /// Months the schedule may run for a loan in `stage`.
    pub fn horizon_months(&self, stage: Stage) -> usize {
        let lifetime = (self.remaining_payments * self.payment_interval) as usize;
        if stage.is_default() {
            1
        } else if stage.is_underperforming() {
            lifetime
        } else {
            lifetime.min(STAGE1_MONTHS)
        }
    }
}

/// Maturity on or before valuation is pushed to 12 month ends after valuation.
pub fn effective_maturity(loan: &LoanRecord) -> chrono::NaiveDate {
    if loan.maturity_date <= loan.valuation_date {
        month_end_offset(loan.valuation_date, 12)
    } else {
        loan.maturity_date
    }
}

fn payment_count(freq: u32, years: f64) -> u32 {
    let n = (freq as f64 * years).round();
    if n >= 1.0 { n as u32 } else { 1 }
}

/// Project the schedule of `loan` for a loan currently in `stage`.
pub fn amortize(loan: &LoanRecord, stage: Stage) -> Result<Vec<AmortizationEntry>, EngineError> {
    let terms = AmortizationTerms::from_loan(loan)?;
    let r = terms.periodic_rate;
    let interval = terms.payment_interval as usize;
    let max_months = terms.horizon_months(stage);

    let mut schedule = Vec::with_capacity(max_months);
    let mut balance = loan.outstanding_balance;
    let mut payment = terms.installment;

    for month in 0..max_months {
        if balance.round() <= 0.0 {
            break;
        }
        if payment > balance {
            payment = round2(balance * (1.0 + r)) + FINAL_PAYMENT_BUFFER;
        }

        let interest = round2(balance * r);
        let (paid, principal, closing) = if (month + 1) % interval == 0 {
            (
                payment,
                round2(payment - interest),
                round2(balance * (1.0 + r) - payment),
            )
        } else {
            (0.0, 0.0, round2(balance * (1.0 + r)))
        };

        schedule.push(AmortizationEntry {
            period_date: month_end_offset(loan.valuation_date, month as u32),
            outstanding_balance: balance,
            payment: paid,
            interest,
            principal,
            closing_balance: closing,
        });
        balance = closing;
    }

    if schedule.is_empty() {
        return Err(EngineError::loan(
            &loan.account_id,
            "empty amortization schedule (no outstanding balance)",
        ));
    }
    Ok(schedule)
}
