//! Deterministic synthetic loan history and loan book.
//!
//! Accounts migrate between delinquency states month by month under a fixed
//! per-segment chain, so the engine has something realistic to estimate.
//! The same seed always produces the same data.

use chrono::NaiveDate;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{CollateralKind, CollateralParameters, LoanObservation, LoanRecord};
use crate::error::AppError;
use crate::math::{month_end_offset, round2};

/// Segment name and its monthly chain over performing / late / default.
const SEGMENTS: [(&str, [[f64; 3]; 3]); 3] = [
    ("retail", [[0.965, 0.027, 0.008], [0.30, 0.55, 0.15], [0.04, 0.01, 0.95]]),
    ("sme", [[0.950, 0.035, 0.015], [0.25, 0.55, 0.20], [0.03, 0.01, 0.96]]),
    ("mortgage", [[0.985, 0.012, 0.003], [0.40, 0.50, 0.10], [0.06, 0.02, 0.92]]),
];

/// Monthly probability that a defaulted account leaves the book.
const DEFAULT_EXIT_PROB: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub accounts: usize,
    /// Months of history up to and including the valuation date.
    pub months: u32,
    pub seed: u64,
    /// Month end the loan book is valued at.
    pub valuation_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct SampleData {
    pub history: Vec<LoanObservation>,
    pub loans: Vec<LoanRecord>,
}

pub fn generate_sample(config: &SampleConfig) -> Result<SampleData, AppError> {
    if config.accounts == 0 {
        return Err(AppError::new(2, "Sample account count must be > 0."));
    }
    if config.months < 2 {
        return Err(AppError::new(2, "Sample history needs at least 2 months."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let log_balance = Normal::new(9.5_f64, 0.8)
        .map_err(|e| AppError::new(4, format!("Balance distribution error: {e}")))?;
    let params = CollateralParameters::default();

    let valuation = month_end_offset(config.valuation_date, 0);
    let first_month = month_end_offset(valuation, 0)
        .checked_sub_months(chrono::Months::new(config.months - 1))
        .map(|d| month_end_offset(d, 0))
        .ok_or_else(|| AppError::new(2, "Sample history starts before the calendar range."))?;

    let mut history = Vec::with_capacity(config.accounts * config.months as usize);
    let mut loans = Vec::with_capacity(config.accounts);

    for i in 0..config.accounts {
        let (segment, chain) = SEGMENTS[i % SEGMENTS.len()];
        let account_id = format!("{}-{:05}", &segment[..1].to_ascii_uppercase(), i + 1);

        let disbursed = round2(log_balance.sample(&mut rng).exp().clamp(500.0, 500_000.0));
        let term_months: u32 = *[24u32, 36, 48, 60, 120]
            .choose(&mut rng)
            .unwrap_or(&36);
        let annual_rate = round2(rng.gen_range(4.0..22.0)) / 100.0;
        let monthly_amortization = disbursed / term_months as f64;

        let mut state = if rng.gen_bool(0.9) { 0 } else { 1 };
        let mut balance = disbursed * rng.gen_range(0.6..1.0);
        let mut last_dpd = 0;
        let mut active = true;

        for m in 0..config.months {
            let date = month_end_offset(first_month, m);
            last_dpd = dpd_for_state(state, &mut rng);
            history.push(LoanObservation {
                account_id: account_id.clone(),
                segment: segment.to_string(),
                observation_date: date,
                outstanding_balance: round2(balance),
                days_past_due: last_dpd,
            });

            if state == 2 && rng.gen_bool(DEFAULT_EXIT_PROB) && date < valuation {
                active = false;
                break;
            }
            state = next_state(&chain[state], &mut rng);
            balance = match state {
                0 => (balance - monthly_amortization).max(monthly_amortization),
                1 => balance * (1.0 + annual_rate / 12.0),
                _ => balance * rng.gen_range(0.9..1.0),
            };
        }

        if !active {
            continue;
        }

        let elapsed = rng.gen_range(6..term_months.max(7));
        let disbursement_date = month_end_offset(valuation, 0)
            .checked_sub_months(chrono::Months::new(elapsed))
            .unwrap_or(valuation);
        let maturity_date = month_end_offset(disbursement_date, term_months);
        let outstanding = history
            .last()
            .map(|o| o.outstanding_balance)
            .unwrap_or(balance);

        let mut collateral = Vec::new();
        if rng.gen_bool(0.4) {
            let kind = *CollateralKind::ALL
                .choose(&mut rng)
                .unwrap_or(&CollateralKind::Other);
            if let Some(item) = params.item(kind, round2(disbursed * rng.gen_range(0.2..1.2))) {
                collateral.push(item);
            }
        }

        loans.push(LoanRecord {
            account_id,
            segment: segment.to_string(),
            valuation_date: valuation,
            disbursement_date,
            maturity_date,
            disbursed_amount: disbursed,
            outstanding_balance: outstanding,
            annual_rate,
            days_past_due: last_dpd,
            payment_frequency: if rng.gen_bool(0.8) { 12 } else { 4 },
            collateral,
        });
    }

    Ok(SampleData { history, loans })
}

fn next_state(row: &[f64; 3], rng: &mut StdRng) -> usize {
    let u: f64 = rng.r#gen();
    let mut acc = 0.0;
    for (j, p) in row.iter().enumerate() {
        acc += p;
        if u < acc {
            return j;
        }
    }
    row.len() - 1
}

fn dpd_for_state(state: usize, rng: &mut StdRng) -> u32 {
    match state {
        0 => {
            if rng.gen_bool(0.8) {
                0
            } else {
                rng.gen_range(1..=30)
            }
        }
        1 => rng.gen_range(31..=90),
        _ => rng.gen_range(91..=360),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> SampleConfig {
        SampleConfig {
            accounts: 60,
            months: 12,
            seed,
            valuation_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        }
    }

    #[test]
    fn same_seed_same_data() {
        let a = generate_sample(&config(7)).unwrap();
        let b = generate_sample(&config(7)).unwrap();
        assert_eq!(a.history, b.history);
        assert_eq!(a.loans, b.loans);
    }

    #[test]
    fn history_is_monthly_up_to_valuation() {
        let data = generate_sample(&config(1)).unwrap();
        let valuation = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert!(data.history.iter().all(|o| o.observation_date <= valuation));
        assert!(data.history.iter().any(|o| o.observation_date == valuation));
        assert!(
            data.history
                .iter()
                .any(|o| o.observation_date == NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
        );
        assert!(!data.loans.is_empty());
        assert!(data.loans.iter().all(|l| l.valuation_date == valuation));
        assert!(data.loans.iter().all(|l| l.maturity_date > l.disbursement_date));
    }

    #[test]
    fn rejects_empty_sample() {
        let mut c = config(1);
        c.accounts = 0;
        assert_eq!(generate_sample(&c).unwrap_err().exit_code(), 2);
    }
}
