//! Formatted terminal output.
//!
//! Formatting lives here so the engine code stays free of presentation
//! concerns and output changes stay localized.

use nalgebra::DMatrix;

use crate::app::pipeline::{BatchResult, SegmentOutput};
use crate::domain::{Diagnostics, EngineConfig};
use crate::report::summary::{Bucket, PortfolioSummary};

/// Header, portfolio totals and the by-stage / by-segment tables.
pub fn format_run_summary(
    result: &BatchResult,
    summary: &PortfolioSummary,
    config: &EngineConfig,
) -> String {
    let mut out = String::new();

    out.push_str("=== ecl - IFRS 9 Expected Credit Loss ===\n");
    out.push_str(&format!(
        "States: {} | period: {}m -> 1m | horizons: {}m / {}m\n",
        config.matrix_size.states(),
        result.segments.period_months,
        config.stage1_horizon,
        config.lifetime_horizon,
    ));
    if let Some(v) = config.valuation_date {
        out.push_str(&format!("Valuation date: {v}\n"));
    }
    out.push_str(&format!(
        "Segments: {} with PD curves, {} with cure/recovery curves\n",
        result.segments.pd_curves.len(),
        result.segments.cure_recovery.len(),
    ));
    out.push_str(&format!(
        "Loans: {} evaluated, {} excluded\n\n",
        result.loans.len(),
        result.diagnostics.loan_failures.len(),
    ));

    out.push_str("By stage:\n");
    out.push_str(&format_buckets(
        summary.by_stage.iter().map(|(s, b)| (s.as_str().to_string(), b)),
        &summary.total,
    ));
    out.push('\n');
    out.push_str("By segment:\n");
    out.push_str(&format_buckets(
        summary.by_segment.iter().map(|(s, b)| (s.clone(), b)),
        &summary.total,
    ));

    out
}

fn format_buckets<'a>(rows: impl Iterator<Item = (String, &'a Bucket)>, total: &Bucket) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<20} {:>6} {:>16} {:>14} {:>9}\n",
        "group", "loans", "exposure", "ecl", "coverage"
    ));
    out.push_str(&format!(
        "{:-<20} {:-<6} {:-<16} {:-<14} {:-<9}\n",
        "", "", "", "", ""
    ));
    for (name, b) in rows {
        out.push_str(&bucket_line(&truncate(&name, 20), b));
    }
    out.push_str(&bucket_line("total", total));
    out
}

fn bucket_line(name: &str, b: &Bucket) -> String {
    format!(
        "{:<20} {:>6} {:>16.2} {:>14.2} {:>8.2}%\n",
        name,
        b.loans,
        b.exposure,
        b.ecl,
        100.0 * b.coverage()
    )
}

/// Monthly matrices and the first months of every PD curve, per segment.
pub fn format_segments(segments: &SegmentOutput, head: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Observation period: {} month(s)\n",
        segments.period_months
    ));

    for (name, transitions) in &segments.transitions {
        out.push_str(&format!("\n[{name}] linked pairs: {}\n", transitions.linked));
        let Some(pd) = segments.pd_curves.get(name) else {
            out.push_str("  no PD curves (see diagnostics)\n");
            continue;
        };

        let labels: Vec<&str> = pd.size.stages().iter().map(|s| s.as_str()).collect();
        out.push_str("  monthly transition matrix:\n");
        out.push_str(&format_matrix(&pd.monthly_matrix, &labels));

        for (stage, curve) in &pd.by_stage {
            let shown: Vec<String> = curve
                .cumulative
                .iter()
                .take(head)
                .map(|p| format!("{p:.4}"))
                .collect();
            let last = curve.cumulative.last().copied().unwrap_or(0.0);
            out.push_str(&format!(
                "  PD from {:<8} [{}] .. {}m: {last:.4}\n",
                stage.as_str(),
                shown.join(", "),
                curve.len(),
            ));
        }
        if let Some(cure) = segments.cure_recovery.get(name) {
            let total_cure = cure.cure.cumulative.last().copied().unwrap_or(0.0);
            let total_recovery = cure.recovery.cumulative.last().copied().unwrap_or(0.0);
            out.push_str(&format!(
                "  lifetime cure {total_cure:.4} | lifetime recovery {total_recovery:.4}\n"
            ));
        }
    }
    out
}

fn format_matrix(m: &DMatrix<f64>, labels: &[&str]) -> String {
    let mut out = String::new();
    out.push_str(&format!("  {:<10}", ""));
    for l in labels {
        out.push_str(&format!(" {l:>9}"));
    }
    out.push('\n');
    for (i, row) in m.row_iter().enumerate() {
        out.push_str(&format!("  {:<10}", labels.get(i).copied().unwrap_or("")));
        for v in row.iter() {
            out.push_str(&format!(" {v:>9.5}"));
        }
        out.push('\n');
    }
    out
}

/// Segment/loan failures and warnings; empty string when there is nothing to report.
pub fn format_diagnostics(diagnostics: &Diagnostics) -> String {
    let mut out = String::new();
    if !diagnostics.segment_failures.is_empty() {
        out.push_str("Segment failures:\n");
        for f in &diagnostics.segment_failures {
            out.push_str(&format!("- {} ({:?}): {}\n", f.segment, f.phase, f.error));
        }
    }
    if !diagnostics.loan_failures.is_empty() {
        out.push_str("Excluded loans:\n");
        for f in &diagnostics.loan_failures {
            out.push_str(&format!("- {}: {}\n", f.account_id, f.error));
        }
    }
    if !diagnostics.warnings.is_empty() {
        out.push_str("Warnings:\n");
        for w in &diagnostics.warnings {
            out.push_str(&format!("- [{}] {}\n", w.scope, w.message));
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
