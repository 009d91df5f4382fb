//! Empirical transition matrices from loan history.
//!
//! Every observation is linked to the same account's observation exactly one
//! period later (month-end arithmetic, see [`crate::math::month_end_offset`]).
//! Linked pairs add the current balance to `weights[current][next]`; rows
//! without a successor are exits and only count towards the exit totals.
//!
//! Rows that start in default additionally feed [`DefaultOutcomes`], the
//! aggregates behind the cure/recovery matrix.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use nalgebra::DMatrix;
use tracing::debug;

use crate::domain::{
    EngineConfig, LoanObservation, MatrixSize, RecoveryObservation, SUPPORTED_PERIODS, Stage,
    Warning, ZeroRowPolicy,
};
use crate::error::EngineError;
use crate::math::{month_end_offset, with_absorbing_row, year_fraction};

/// Average month length used to turn day gaps into months.
const DAYS_PER_MONTH: f64 = 30.44;

/// Balances of defaulted rows split by what happened one period later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultOutcomes {
    /// Default → performing or underperforming.
    pub cured_balance: f64,
    /// Default → default.
    pub retained_balance: f64,
    /// Default → no further observation, before the last history date.
    pub exit_recoveries: f64,
    /// Balance reductions of accounts that stayed in default.
    pub cash_recoveries: f64,
    /// Discounted collections on defaulted rows that did not cure.
    pub discounted_recovered: Option<f64>,
    /// Default → default balance on rows without any collection.
    pub retained_unrecovered: Option<f64>,
}

impl DefaultOutcomes {
    /// Weights of the defaulted row of the cure/recovery matrix:
    /// `[cured, recovered, still in default]`.
    pub fn cure_row(&self) -> [f64; 3] {
        match (self.discounted_recovered, self.retained_unrecovered) {
            (Some(recovered), Some(retained)) => [self.cured_balance, recovered, retained],
            _ => [
                self.cured_balance,
                self.exit_recoveries + self.cash_recoveries,
                self.retained_balance,
            ],
        }
    }
}

/// Linked transition weights for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentTransitions {
    pub segment: String,
    pub size: MatrixSize,
    /// `weights[(from, to)]` = summed balance moving `from → to` in one period.
    pub weights: DMatrix<f64>,
    /// Balance per origin stage with no successor observation.
    pub exit_balance: Vec<f64>,
    /// Linked pairs that contributed to `weights`.
    pub linked: usize,
    pub outcomes: DefaultOutcomes,
}

impl SegmentTransitions {
    fn new(segment: &str, size: MatrixSize) -> Self {
        let n = size.states();
        Self {
            segment: segment.to_string(),
            size,
            weights: DMatrix::zeros(n, n),
            exit_balance: vec![0.0; n],
            linked: 0,
            outcomes: DefaultOutcomes {
                discounted_recovered: None,
                retained_unrecovered: None,
                ..DefaultOutcomes::default()
            },
        }
    }

    /// Row-normalized probabilities; rows with no weight come back as zeros
    /// and are listed in the second element.
    pub fn normalized(&self) -> (DMatrix<f64>, Vec<usize>) {
        let mut out = self.weights.clone();
        let mut undefined = Vec::new();
        for i in 0..out.nrows() {
            let total: f64 = out.row(i).sum();
            if total > 0.0 {
                for v in out.row_mut(i).iter_mut() {
                    *v /= total;
                }
            } else {
                undefined.push(i);
            }
        }
        (out, undefined)
    }

    /// Period transition matrix ready for conversion: normalized, default row
    /// made absorbing, remaining empty rows resolved by `policy`.
    pub fn pd_matrix(&self, policy: ZeroRowPolicy) -> Result<DMatrix<f64>, EngineError> {
        let (normalized, undefined) = self.normalized();
        let default = self.size.default_index();
        let mut matrix = with_absorbing_row(&normalized, default);

        let empty: Vec<usize> = undefined.into_iter().filter(|&i| i != default).collect();
        if empty.is_empty() {
            return Ok(matrix);
        }
        match policy {
            ZeroRowPolicy::Exclude => {
                let names: Vec<&str> = empty
                    .iter()
                    .map(|&i| self.size.stages()[i].as_str())
                    .collect();
                Err(EngineError::degenerate(
                    &self.segment,
                    format!("no observations for {}", names.join(", ")),
                ))
            }
            ZeroRowPolicy::Identity => {
                for i in empty {
                    matrix = with_absorbing_row(&matrix, i);
                }
                Ok(matrix)
            }
        }
    }
}

/// Result of linking a whole history.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionSet {
    pub period_months: u32,
    /// Per segment, in name order.
    pub segments: BTreeMap<String, SegmentTransitions>,
    /// Latest observation date anywhere in the history.
    pub last_observation_date: NaiveDate,
    pub duplicates_dropped: usize,
    /// Rows dated on or after the valuation date.
    pub rows_after_valuation: usize,
    pub warnings: Vec<Warning>,
}

/// Snap each gap between consecutive distinct dates to {1, 3, 6, 12} months
/// and return the most common one (ties go to the shorter period).
pub fn detect_period(dates: &[NaiveDate]) -> u32 {
    let mut distinct = dates.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() < 2 {
        return 1;
    }

    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for pair in distinct.windows(2) {
        let months = (pair[1] - pair[0]).num_days() as f64 / DAYS_PER_MONTH;
        *counts.entry(snap_period(months)).or_insert(0) += 1;
    }

    // BTreeMap iterates ascending, so a strict `>` keeps the smaller period on ties.
    let mut best = (1, 0);
    for (period, count) in counts {
        if count > best.1 {
            best = (period, count);
        }
    }
    best.0
}

fn snap_period(months: f64) -> u32 {
    let mut best = SUPPORTED_PERIODS[0];
    for p in SUPPORTED_PERIODS {
        if (months - p as f64).abs() < (months - best as f64).abs() {
            best = p;
        }
    }
    best
}

/// Discount a collection back to the default date.
pub fn discounted_collection(r: &RecoveryObservation) -> f64 {
    let years = year_fraction(r.default_date, r.recovery_date);
    r.cash_collections * (1.0 + r.eir).powf(-years)
}

/// Link `history` into per-segment transition weights and default outcomes.
pub fn build_transitions(
    history: &[LoanObservation],
    recoveries: Option<&[RecoveryObservation]>,
    config: &EngineConfig,
) -> Result<TransitionSet, EngineError> {
    if history.is_empty() {
        return Err(EngineError::InvalidInput(
            "loan history is empty".to_string(),
        ));
    }
    if let Some(bad) = history.iter().find(|o| !o.outstanding_balance.is_finite()) {
        return Err(EngineError::InvalidInput(format!(
            "non-finite outstanding balance for `{}` on {}",
            bad.account_id, bad.observation_date
        )));
    }

    let size = config.matrix_size;
    let mut warnings = Vec::new();

    // First row wins for a repeated (account, date).
    let mut by_key: HashMap<(&str, NaiveDate), usize> = HashMap::with_capacity(history.len());
    let mut rows: Vec<&LoanObservation> = Vec::with_capacity(history.len());
    for obs in history {
        let key = (obs.account_id.as_str(), obs.observation_date);
        if by_key.contains_key(&key) {
            continue;
        }
        by_key.insert(key, rows.len());
        rows.push(obs);
    }
    let duplicates_dropped = history.len() - rows.len();
    if duplicates_dropped > 0 {
        warnings.push(Warning::new(
            "history",
            format!("dropped {duplicates_dropped} duplicate account/date rows"),
        ));
    }

    let period_months = match config.period_months {
        Some(p) => p,
        None => {
            let dates: Vec<NaiveDate> = rows.iter().map(|o| o.observation_date).collect();
            detect_period(&dates)
        }
    };
    let last_observation_date = rows
        .iter()
        .map(|o| o.observation_date)
        .max()
        .ok_or_else(|| EngineError::InvalidInput("loan history is empty".to_string()))?;

    let collections = recoveries.map(collections_by_row);

    let default_stage = Stage::Stage3;
    let default_index = size.default_index();
    let mut segments: BTreeMap<String, SegmentTransitions> = BTreeMap::new();
    let mut rows_after_valuation = 0usize;

    for obs in &rows {
        if config
            .valuation_date
            .is_some_and(|v| obs.observation_date >= v)
        {
            rows_after_valuation += 1;
            continue;
        }

        let stage = size.classify(obs.days_past_due);
        let from = size.index_of(stage).unwrap_or(default_index);
        let next_date = month_end_offset(obs.observation_date, period_months);
        let next = by_key
            .get(&(obs.account_id.as_str(), next_date))
            .map(|&i| rows[i]);

        let seg = segments
            .entry(obs.segment.clone())
            .or_insert_with(|| SegmentTransitions::new(&obs.segment, size));
        let balance = obs.outstanding_balance;

        let next_stage = next.map(|n| size.classify(n.days_past_due));
        match next_stage {
            Some(to_stage) => {
                let to = size.index_of(to_stage).unwrap_or(default_index);
                seg.weights[(from, to)] += balance;
                seg.linked += 1;
            }
            None => seg.exit_balance[from] += balance,
        }

        if stage != default_stage {
            continue;
        }

        let outcomes = &mut seg.outcomes;
        match (next, next_stage) {
            (Some(n), Some(Stage::Stage3)) => {
                outcomes.retained_balance += balance;
                if n.outstanding_balance < balance {
                    outcomes.cash_recoveries += balance - n.outstanding_balance;
                }
            }
            (Some(_), Some(_)) => outcomes.cured_balance += balance,
            _ => {
                if obs.observation_date != last_observation_date {
                    outcomes.exit_recoveries += balance;
                }
            }
        }

        if let Some(collections) = &collections {
            let cured = matches!(next_stage, Some(s) if s != Stage::Stage3);
            let collected = collections
                .get(&(obs.account_id.clone(), obs.observation_date))
                .copied()
                .unwrap_or(0.0);
            let recovered = outcomes.discounted_recovered.get_or_insert(0.0);
            let retained = outcomes.retained_unrecovered.get_or_insert(0.0);
            if !cured && collected > 0.0 {
                *recovered += collected;
            } else if next_stage == Some(Stage::Stage3) {
                *retained += balance;
            }
        }
    }

    if segments.is_empty() {
        return Err(EngineError::InvalidInput(
            "no history rows dated before the valuation date".to_string(),
        ));
    }

    for seg in segments.values() {
        debug!(
            segment = %seg.segment,
            linked = seg.linked,
            period_months,
            "linked transition pairs"
        );
    }

    Ok(TransitionSet {
        period_months,
        segments,
        last_observation_date,
        duplicates_dropped,
        rows_after_valuation,
        warnings,
    })
}

fn collections_by_row(recoveries: &[RecoveryObservation]) -> HashMap<(String, NaiveDate), f64> {
    let mut out: HashMap<(String, NaiveDate), f64> = HashMap::new();
    for r in recoveries {
        let value = discounted_collection(r);
        if value.is_finite() {
            *out.entry((r.account_id.clone(), r.observation_date))
                .or_insert(0.0) += value;
        }
    }
    out
}
