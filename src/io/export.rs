//! Exports of a finished batch.
//!
//! - per-period ECL rows as CSV (one line per loan and period)
//! - the whole run as JSON: matrices, curves, schedules, records, diagnostics

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use nalgebra::DMatrix;
use serde::Serialize;

use crate::app::pipeline::{BatchResult, SegmentOutput};
use crate::domain::{Diagnostics, LoanResult, ProbabilityCurve, Stage, Warning};
use crate::error::AppError;
use crate::matrix::curve_dates;

/// Write per-period ECL rows to a CSV file.
pub fn write_results_csv(path: &Path, result: &BatchResult) -> Result<(), AppError> {
    let mut file = File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display()))
    })?;
    write_results(&mut file, result)
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV: {e}")))
}

fn write_results<W: Write>(out: &mut W, result: &BatchResult) -> std::io::Result<()> {
    writeln!(
        out,
        "account_id,segment,stage,period_index,period_date,ead,pd,lgd,discount_factor,ecl"
    )?;
    for record in result.records() {
        for e in &record.entries {
            writeln!(
                out,
                "{},{},{},{},{},{:.2},{:.8},{:.8},{:.8},{:.2}",
                csv_field(&record.account_id),
                csv_field(&record.segment),
                record.stage,
                e.period_index,
                e.period_date,
                e.ead,
                e.pd,
                e.lgd,
                e.discount_factor,
                e.ecl,
            )?;
        }
    }
    Ok(())
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct CurveDoc<'a> {
    pub cumulative: &'a [f64],
    pub marginal: &'a [f64],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dates: Option<Vec<NaiveDate>>,
}

#[derive(Debug, Serialize)]
pub struct SegmentDoc<'a> {
    pub segment: &'a str,
    pub linked_pairs: usize,
    pub transition_weights: Vec<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_matrix: Option<Vec<Vec<f64>>>,
    pub pd_curves: BTreeMap<Stage, CurveDoc<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cure_recovery_matrix: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cure: Option<CurveDoc<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<CurveDoc<'a>>,
}

#[derive(Debug, Serialize)]
pub struct FailureDoc {
    pub scope: String,
    pub phase: &'static str,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticsDoc<'a> {
    pub failures: Vec<FailureDoc>,
    pub warnings: &'a [Warning],
}

/// JSON view of a batch.
#[derive(Debug, Serialize)]
pub struct ResultsDocument<'a> {
    pub tool: &'static str,
    pub period_months: u32,
    pub total_ecl: f64,
    pub segments: Vec<SegmentDoc<'a>>,
    pub loans: &'a [LoanResult],
    pub diagnostics: DiagnosticsDoc<'a>,
}

/// Build the JSON view; curve points are dated when `valuation_date` is known.
pub fn results_document(result: &BatchResult, valuation_date: Option<NaiveDate>) -> ResultsDocument<'_> {
    ResultsDocument {
        tool: "ecl",
        period_months: result.segments.period_months,
        total_ecl: result.total_ecl(),
        segments: segment_docs(&result.segments, valuation_date),
        loans: &result.loans,
        diagnostics: diagnostics_doc(&result.diagnostics),
    }
}

pub fn segment_docs(segments: &SegmentOutput, valuation_date: Option<NaiveDate>) -> Vec<SegmentDoc<'_>> {
    segments
        .transitions
        .iter()
        .map(|(name, seg)| {
            let pd = segments.pd_curves.get(name);
            let cure = segments.cure_recovery.get(name);
            SegmentDoc {
                segment: name,
                linked_pairs: seg.linked,
                transition_weights: matrix_rows(&seg.weights),
                monthly_matrix: pd.map(|p| matrix_rows(&p.monthly_matrix)),
                pd_curves: pd
                    .map(|p| {
                        p.by_stage
                            .iter()
                            .map(|(stage, c)| (*stage, curve_doc(c, valuation_date)))
                            .collect()
                    })
                    .unwrap_or_default(),
                cure_recovery_matrix: cure.map(|c| matrix_rows(&c.monthly_matrix)),
                cure: cure.map(|c| curve_doc(&c.cure, valuation_date)),
                recovery: cure.map(|c| curve_doc(&c.recovery, valuation_date)),
            }
        })
        .collect()
}

fn curve_doc(curve: &ProbabilityCurve, valuation_date: Option<NaiveDate>) -> CurveDoc<'_> {
    CurveDoc {
        cumulative: &curve.cumulative,
        marginal: &curve.marginal,
        dates: valuation_date.map(|v| curve_dates(v, curve.len())),
    }
}

fn diagnostics_doc(diagnostics: &Diagnostics) -> DiagnosticsDoc<'_> {
    let segments = diagnostics.segment_failures.iter().map(|f| FailureDoc {
        scope: f.segment.clone(),
        phase: match f.phase {
            crate::domain::SegmentPhase::PdMatrix => "pd_matrix",
            crate::domain::SegmentPhase::CureRecovery => "cure_recovery",
        },
        error: f.error.to_string(),
    });
    let loans = diagnostics.loan_failures.iter().map(|f| FailureDoc {
        scope: f.account_id.clone(),
        phase: "loan",
        error: f.error.to_string(),
    });
    DiagnosticsDoc {
        failures: segments.chain(loans).collect(),
        warnings: &diagnostics.warnings,
    }
}

pub fn matrix_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|r| r.iter().copied().collect()).collect()
}

/// Write the JSON view of a batch.
pub fn write_results_json(
    path: &Path,
    result: &BatchResult,
    valuation_date: Option<NaiveDate>,
) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create results JSON '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(file, &results_document(result, valuation_date))
        .map_err(|e| AppError::new(2, format!("Failed to write results JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_rows_are_row_major() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(matrix_rows(&m), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn curve_doc_dates_follow_valuation() {
        let curve = ProbabilityCurve::from_cumulative(vec![0.1, 0.2]);
        let v = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let doc = curve_doc(&curve, Some(v));
        assert_eq!(doc.dates.unwrap().len(), 2);
        assert!(curve_doc(&curve, None).dates.is_none());
    }
}
