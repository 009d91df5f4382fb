//! Shared domain types.
//!
//! Everything here is a plain value object. A pipeline run reads inputs by
//! reference and produces fresh outputs; nothing is cached between runs.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// IFRS 9 stage label derived from days past due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "stage_1")]
    Stage1,
    #[serde(rename = "stage_2")]
    Stage2,
    #[serde(rename = "stage_2a")]
    Stage2a,
    #[serde(rename = "stage_2b")]
    Stage2b,
    #[serde(rename = "stage_3")]
    Stage3,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Stage1 => "stage_1",
            Stage::Stage2 => "stage_2",
            Stage::Stage2a => "stage_2a",
            Stage::Stage2b => "stage_2b",
            Stage::Stage3 => "stage_3",
        }
    }

    /// `true` for the absorbing default stage.
    pub fn is_default(self) -> bool {
        self == Stage::Stage3
    }

    /// `true` for the underperforming stages (full-lifetime horizon).
    pub fn is_underperforming(self) -> bool {
        matches!(self, Stage::Stage2 | Stage::Stage2a | Stage::Stage2b)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of states in the transition matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum MatrixSize {
    /// `stage_1`, `stage_2`, `stage_3`.
    #[serde(rename = "3")]
    #[value(name = "3")]
    Three,
    /// `stage_1`, `stage_2a`, `stage_2b`, `stage_3`.
    #[serde(rename = "4")]
    #[value(name = "4")]
    Four,
}

const STAGES_3: [Stage; 3] = [Stage::Stage1, Stage::Stage2, Stage::Stage3];
const STAGES_4: [Stage; 4] = [Stage::Stage1, Stage::Stage2a, Stage::Stage2b, Stage::Stage3];

impl MatrixSize {
    /// Resolve an integer state count; only 3 and 4 are supported.
    pub fn from_states(states: usize) -> Result<Self, EngineError> {
        match states {
            3 => Ok(MatrixSize::Three),
            4 => Ok(MatrixSize::Four),
            other => Err(EngineError::InvalidConfig(format!(
                "matrix size must be 3 or 4, got {other}"
            ))),
        }
    }

    pub fn states(self) -> usize {
        match self {
            MatrixSize::Three => 3,
            MatrixSize::Four => 4,
        }
    }

    /// Stages in matrix row/column order.
    pub fn stages(self) -> &'static [Stage] {
        match self {
            MatrixSize::Three => &STAGES_3,
            MatrixSize::Four => &STAGES_4,
        }
    }

    /// Row/column index of `stage`, or `None` if the stage belongs to the other size.
    pub fn index_of(self, stage: Stage) -> Option<usize> {
        self.stages().iter().position(|s| *s == stage)
    }

    /// Index of the absorbing default state (always the last one).
    pub fn default_index(self) -> usize {
        self.states() - 1
    }
}

/// One historical observation of a loan account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanObservation {
    pub account_id: String,
    /// Loan segment (loan type) the matrices are built per.
    pub segment: String,
    pub observation_date: NaiveDate,
    pub outstanding_balance: f64,
    pub days_past_due: u32,
}

/// One cash collection on a defaulted account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryObservation {
    pub account_id: String,
    /// Observation date of the history row the collection belongs to.
    pub observation_date: NaiveDate,
    pub default_date: NaiveDate,
    pub recovery_date: NaiveDate,
    pub cash_collections: f64,
    /// Annual effective rate used to discount the collection back to default.
    pub eir: f64,
}

/// Collateral categories carried on the loan book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollateralKind {
    Building,
    Land,
    Bond,
    MotorVehicle,
    Cash,
    Equity,
    Other,
}

impl CollateralKind {
    pub const ALL: [CollateralKind; 7] = [
        CollateralKind::Building,
        CollateralKind::Land,
        CollateralKind::Bond,
        CollateralKind::MotorVehicle,
        CollateralKind::Cash,
        CollateralKind::Equity,
        CollateralKind::Other,
    ];

    /// Column name in loan-book files.
    pub fn as_str(self) -> &'static str {
        match self {
            CollateralKind::Building => "building",
            CollateralKind::Land => "land",
            CollateralKind::Bond => "bond",
            CollateralKind::MotorVehicle => "motor_vehicle",
            CollateralKind::Cash => "cash",
            CollateralKind::Equity => "equity",
            CollateralKind::Other => "other",
        }
    }
}

/// Realisation terms applied to one collateral kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollateralTerms {
    pub haircut: f64,
    pub time_to_realize_months: f64,
    pub cost_of_recovery_rate: f64,
}

/// Lookup table of collateral terms, shared read-only across loans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralParameters {
    pub terms: BTreeMap<CollateralKind, CollateralTerms>,
}

impl Default for CollateralParameters {
    fn default() -> Self {
        let table = [
            (CollateralKind::Building, 3.0, 0.20, 0.03),
            (CollateralKind::Land, 15.0, 0.35, 0.05),
            (CollateralKind::Bond, 3.0, 0.0, 0.01),
            (CollateralKind::MotorVehicle, 3.0, 0.15, 0.03),
            (CollateralKind::Cash, 0.0, 0.0, 0.01),
            (CollateralKind::Equity, 4.0, 0.05, 0.015),
            (CollateralKind::Other, 6.0, 0.15, 0.05),
        ];
        let terms = table
            .into_iter()
            .map(|(kind, months, haircut, cost)| {
                (
                    kind,
                    CollateralTerms {
                        haircut,
                        time_to_realize_months: months,
                        cost_of_recovery_rate: cost,
                    },
                )
            })
            .collect();
        Self { terms }
    }
}

impl CollateralParameters {
    /// Attach the terms for `kind` to a pledged value.
    pub fn item(&self, kind: CollateralKind, value: f64) -> Option<CollateralItem> {
        let terms = self.terms.get(&kind)?;
        Some(CollateralItem {
            kind,
            value,
            haircut: terms.haircut,
            time_to_realize_months: terms.time_to_realize_months,
            cost_of_recovery_rate: terms.cost_of_recovery_rate,
        })
    }

    fn validate(&self) -> Result<(), EngineError> {
        for (kind, t) in &self.terms {
            let ok = t.haircut.is_finite()
                && (0.0..=1.0).contains(&t.haircut)
                && t.time_to_realize_months.is_finite()
                && t.time_to_realize_months >= 0.0
                && t.cost_of_recovery_rate.is_finite()
                && t.cost_of_recovery_rate >= 0.0;
            if !ok {
                return Err(EngineError::InvalidConfig(format!(
                    "invalid collateral terms for `{}`",
                    kind.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// A pledged collateral item with its realisation terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollateralItem {
    pub kind: CollateralKind,
    /// Market value; NaN means "unknown" and excludes the item.
    pub value: f64,
    pub haircut: f64,
    pub time_to_realize_months: f64,
    pub cost_of_recovery_rate: f64,
}

/// One row of the current loan book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub account_id: String,
    pub segment: String,
    pub valuation_date: NaiveDate,
    pub disbursement_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub disbursed_amount: f64,
    pub outstanding_balance: f64,
    /// Nominal annual rate as a decimal (0.12 = 12%). Also used as the EIR.
    pub annual_rate: f64,
    pub days_past_due: u32,
    /// Payments per year; must divide 12.
    pub payment_frequency: u32,
    pub collateral: Vec<CollateralItem>,
}

/// Cumulative and marginal probabilities indexed by month offset `1..=N`.
///
/// `cumulative[i]` is the probability the event has happened by month `i+1`;
/// `marginal[i]` the probability it happens in exactly that month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityCurve {
    pub cumulative: Vec<f64>,
    pub marginal: Vec<f64>,
}

impl ProbabilityCurve {
    /// Build from a cumulative curve; marginals are first differences with `cumulative[0] = 0`.
    pub fn from_cumulative(cumulative: Vec<f64>) -> Self {
        let mut prev = 0.0;
        let marginal = cumulative
            .iter()
            .map(|&c| {
                let m = c - prev;
                prev = c;
                m
            })
            .collect();
        Self {
            cumulative,
            marginal,
        }
    }

    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    /// Indices (0-based) where the cumulative curve drops by more than `tol`.
    pub fn monotonic_violations(&self, tol: f64) -> Vec<usize> {
        let mut out = Vec::new();
        let mut prev = 0.0;
        for (i, &c) in self.cumulative.iter().enumerate() {
            if c < prev - tol {
                out.push(i);
            }
            prev = c;
        }
        out
    }

    /// Indices (0-based) where the cumulative value is outside `[0, 1]` by more than `tol`.
    pub fn bound_violations(&self, tol: f64) -> Vec<usize> {
        self.cumulative
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_finite() || **c < -tol || **c > 1.0 + tol)
            .map(|(i, _)| i)
            .collect()
    }
}

/// One month of a projected amortization schedule.
///
/// `outstanding_balance` is the exposure at the start of the month (the EAD
/// for that period); `closing_balance` is what remains after the month's
/// compounding and payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmortizationEntry {
    pub period_date: NaiveDate,
    pub outstanding_balance: f64,
    pub payment: f64,
    pub interest: f64,
    pub principal: f64,
    pub closing_balance: f64,
}

/// One period of an LGD schedule, aligned by index with the amortization schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LgdEntry {
    pub period_date: NaiveDate,
    pub lgd: f64,
    pub cure_rate: f64,
    pub recovery_rate: Option<f64>,
    pub total_discounted_collateral_value: f64,
}

/// One period of a loan's expected credit loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EclEntry {
    /// 1-based month offset used for discounting.
    pub period_index: usize,
    pub period_date: NaiveDate,
    pub ead: f64,
    pub pd: f64,
    pub lgd: f64,
    pub discount_factor: f64,
    pub ecl: f64,
}

/// Expected credit loss for one loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EclRecord {
    pub account_id: String,
    pub segment: String,
    pub stage: Stage,
    /// Outstanding balance at the valuation date.
    pub exposure: f64,
    pub entries: Vec<EclEntry>,
    pub total_ecl: f64,
}

/// Everything computed for one loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanResult {
    pub schedule: Vec<AmortizationEntry>,
    pub lgd: Vec<LgdEntry>,
    pub ecl: EclRecord,
}

/// What to do with a transition-matrix row that received no observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ZeroRowPolicy {
    /// Flag the segment as degenerate and leave it out of the PD output.
    Exclude,
    /// Treat the empty row as "stays in its current stage".
    Identity,
}

/// Explicit configuration handed to the pipeline entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub matrix_size: MatrixSize,
    /// Observation period of the history in months; `None` detects it.
    pub period_months: Option<u32>,
    /// Projection steps for the first (performing) origin stage.
    pub stage1_horizon: usize,
    /// Projection steps for the other origin stages and cure/recovery curves.
    pub lifetime_horizon: usize,
    /// History rows dated on or after this date do not feed the matrices.
    pub valuation_date: Option<NaiveDate>,
    pub zero_row_policy: ZeroRowPolicy,
    /// Apply `(1 - recovery_rate)` in the LGD schedule.
    pub use_recovery_curve: bool,
    pub collateral: CollateralParameters,
    /// Allowed downward step of a cumulative curve before it is reported.
    pub monotone_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matrix_size: MatrixSize::Three,
            period_months: None,
            stage1_horizon: 12,
            lifetime_horizon: 300,
            valuation_date: None,
            zero_row_policy: ZeroRowPolicy::Exclude,
            use_recovery_curve: true,
            collateral: CollateralParameters::default(),
            monotone_tolerance: 1e-12,
        }
    }
}

/// Observation periods the history can be snapped to.
pub const SUPPORTED_PERIODS: [u32; 4] = [1, 3, 6, 12];

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.stage1_horizon == 0 || self.lifetime_horizon == 0 {
            return Err(EngineError::InvalidConfig(
                "projection horizons must be positive".to_string(),
            ));
        }
        if let Some(p) = self.period_months {
            if !SUPPORTED_PERIODS.contains(&p) {
                return Err(EngineError::InvalidConfig(format!(
                    "period must be one of 1, 3, 6, 12 months, got {p}"
                )));
            }
        }
        if !(self.monotone_tolerance.is_finite() && self.monotone_tolerance >= 0.0) {
            return Err(EngineError::InvalidConfig(
                "monotone tolerance must be finite and >= 0".to_string(),
            ));
        }
        self.collateral.validate()
    }
}

/// Non-fatal observation attached to a batch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    /// Segment name, account id, or `"history"` / `"loan_book"`.
    pub scope: String,
    pub message: String,
}

impl Warning {
    pub fn new(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            message: message.into(),
        }
    }
}

/// Which segment-level computation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentPhase {
    PdMatrix,
    CureRecovery,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFailure {
    pub segment: String,
    pub phase: SegmentPhase,
    pub error: EngineError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoanFailure {
    pub account_id: String,
    pub error: EngineError,
}

/// Per-unit failures and warnings collected during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub segment_failures: Vec<SegmentFailure>,
    pub loan_failures: Vec<LoanFailure>,
    pub warnings: Vec<Warning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_size_rejects_other_state_counts() {
        assert_eq!(MatrixSize::from_states(3).unwrap(), MatrixSize::Three);
        assert_eq!(MatrixSize::from_states(4).unwrap(), MatrixSize::Four);
        assert!(matches!(
            MatrixSize::from_states(5),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn stage_indices_follow_matrix_order() {
        assert_eq!(MatrixSize::Three.index_of(Stage::Stage2), Some(1));
        assert_eq!(MatrixSize::Three.index_of(Stage::Stage2a), None);
        assert_eq!(MatrixSize::Four.index_of(Stage::Stage2b), Some(2));
        assert_eq!(MatrixSize::Four.default_index(), 3);
    }

    #[test]
    fn curve_from_cumulative_telescopes() {
        let curve = ProbabilityCurve::from_cumulative(vec![0.1, 0.25, 0.3]);
        let total: f64 = curve.marginal.iter().sum();
        assert!((total - 0.3).abs() < 1e-15);
        assert!(curve.monotonic_violations(0.0).is_empty());

        let bad = ProbabilityCurve::from_cumulative(vec![0.2, 0.1]);
        assert_eq!(bad.monotonic_violations(1e-12), vec![1]);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        let bad = EngineConfig {
            lifetime_horizon: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(bad.validate(), Err(EngineError::InvalidConfig(_))));
        let bad_period = EngineConfig {
            period_months: Some(2),
            ..EngineConfig::default()
        };
        assert!(bad_period.validate().is_err());
    }

    #[test]
    fn default_collateral_table_matches_realisation_terms() {
        let params = CollateralParameters::default();
        let land = params.item(CollateralKind::Land, 100.0).unwrap();
        assert_eq!(land.time_to_realize_months, 15.0);
        assert_eq!(land.haircut, 0.35);
        assert_eq!(land.cost_of_recovery_rate, 0.05);
        assert_eq!(params.terms.len(), CollateralKind::ALL.len());
    }
}
