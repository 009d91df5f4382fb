//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and sets up logging
//! - parses CLI arguments into an [`EngineConfig`]
//! - reads input files (or generates synthetic ones)
//! - runs the pipeline and prints the report
//! - writes optional exports

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::cli::{Command, DemoArgs, EngineArgs, MatricesArgs, OutputArgs, RunArgs};
use crate::domain::{
    CollateralParameters, EngineConfig, LoanObservation, LoanRecord, RecoveryObservation,
};
use crate::error::AppError;
use crate::io::ingest::{Ingested, load_history, load_loans, load_recoveries};

pub mod pipeline;

/// Entry point for the `ecl` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Matrices(args) => handle_matrices(args),
        Command::Demo(args) => handle_demo(args),
    }
}

/// Log filter precedence: `RUST_LOG`, then `ECL_LOG`, then the verbosity flag.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("ECL_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    // Ignore a second initialisation (e.g. when `run` is called from tests).
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

pub fn engine_config_from_args(args: &EngineArgs) -> EngineConfig {
    EngineConfig {
        matrix_size: args.matrix_size,
        period_months: args.period_months,
        stage1_horizon: args.stage1_horizon,
        lifetime_horizon: args.lifetime_horizon,
        valuation_date: args.valuation_date,
        zero_row_policy: args.zero_row_policy,
        use_recovery_curve: !args.no_recovery_curve,
        collateral: CollateralParameters::default(),
        ..EngineConfig::default()
    }
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = engine_config_from_args(&args.engine);
    config.validate()?;

    let history = report_ingest("history", load_history(&args.history)?);
    let loans = report_ingest(
        "loan book",
        load_loans(&args.loans, &config.collateral, config.valuation_date)?,
    );
    let recoveries = match &args.recoveries {
        Some(path) => Some(report_ingest("recoveries", load_recoveries(path)?)),
        None => None,
    };

    compute_and_report(&history, recoveries.as_deref(), &loans, &config, &args.output)
}

fn handle_matrices(args: MatricesArgs) -> Result<(), AppError> {
    let config = engine_config_from_args(&args.engine);
    config.validate()?;

    let history = report_ingest("history", load_history(&args.history)?);
    let recoveries = match &args.recoveries {
        Some(path) => Some(report_ingest("recoveries", load_recoveries(path)?)),
        None => None,
    };

    let segments = pipeline::run_segments(&history, recoveries.as_deref(), &config)?;
    println!("{}", crate::report::format_segments(&segments, args.head));
    let diagnostics = crate::report::format_diagnostics(&segments.diagnostics);
    if !diagnostics.is_empty() {
        println!("{diagnostics}");
    }
    if segments.pd_curves.is_empty() {
        return Err(AppError::new(3, "No segment produced PD curves."));
    }
    Ok(())
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let mut config = engine_config_from_args(&args.engine);
    let valuation = config
        .valuation_date
        .unwrap_or_else(|| crate::math::end_of_month(chrono::Local::now().date_naive()));
    config.valuation_date = Some(valuation);
    config.validate()?;

    let sample = crate::data::generate_sample(&crate::data::SampleConfig {
        accounts: args.accounts,
        months: args.months,
        seed: args.seed,
        valuation_date: valuation,
    })?;
    info!(
        history_rows = sample.history.len(),
        loans = sample.loans.len(),
        seed = args.seed,
        "generated synthetic portfolio"
    );

    compute_and_report(&sample.history, None, &sample.loans, &config, &args.output)
}

fn compute_and_report(
    history: &[LoanObservation],
    recoveries: Option<&[RecoveryObservation]>,
    loans: &[LoanRecord],
    config: &EngineConfig,
    output: &OutputArgs,
) -> Result<(), AppError> {
    let result = pipeline::run_engine(history, recoveries, loans, config)?;
    let summary = crate::report::summarize(result.records());

    println!(
        "{}",
        crate::report::format_run_summary(&result, &summary, config)
    );
    let diagnostics = crate::report::format_diagnostics(&result.diagnostics);
    if !diagnostics.is_empty() {
        println!("{diagnostics}");
    }

    if let Some(path) = &output.export_results {
        crate::io::export::write_results_csv(path, &result)?;
        info!(path = %path.display(), "wrote per-period ECL rows");
    }
    if let Some(path) = &output.export_json {
        crate::io::export::write_results_json(path, &result, config.valuation_date)?;
        info!(path = %path.display(), "wrote results JSON");
    }

    if result.loans.is_empty() {
        return Err(AppError::new(4, "Every loan failed; no ECL was computed."));
    }
    Ok(())
}

fn report_ingest<T>(label: &str, ingested: Ingested<T>) -> Vec<T> {
    info!(
        file = label,
        rows_read = ingested.rows_read,
        rows_used = ingested.rows.len(),
        "ingested"
    );
    for e in &ingested.row_errors {
        tracing::warn!(
            file = label,
            line = e.line,
            id = e.id.as_deref().unwrap_or(""),
            "{}",
            e.message
        );
    }
    for note in &ingested.notes {
        info!(file = label, "{note}");
    }
    ingested.rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::{MatrixSize, ZeroRowPolicy};

    #[test]
    fn engine_flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "ecl",
            "demo",
            "--matrix-size",
            "4",
            "--period-months",
            "3",
            "--no-recovery-curve",
        ])
        .unwrap();
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        let config = engine_config_from_args(&args.engine);
        assert_eq!(config.matrix_size, MatrixSize::Four);
        assert_eq!(config.period_months, Some(3));
        assert!(!config.use_recovery_curve);
        assert_eq!(config.zero_row_policy, ZeroRowPolicy::Exclude);
        assert!(config.validate().is_ok());
    }
}
