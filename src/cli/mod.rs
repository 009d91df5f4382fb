//! Command-line parsing for the `ecl` binary.
//!
//! Argument parsing and command dispatch stay separate from the engine code.
//! Every option can also be set through an `ECL_*` environment variable
//! (a `.env` file is loaded first); explicit flags win.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::{MatrixSize, ZeroRowPolicy};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "ecl", version, about = "IFRS 9 Expected Credit Loss engine")]
pub struct Cli {
    /// Debug-level logging (ignored when RUST_LOG or ECL_LOG is set).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Estimate curves from history and compute ECL for a loan book.
    Run(RunArgs),
    /// Estimate and print transition matrices and curves only.
    Matrices(MatricesArgs),
    /// Run the full pipeline on deterministic synthetic data.
    Demo(DemoArgs),
}

/// Engine options shared by every command.
#[derive(Debug, Args, Clone)]
pub struct EngineArgs {
    /// Number of states in the transition matrix.
    #[arg(long, value_enum, env = "ECL_MATRIX_SIZE", default_value = "3")]
    pub matrix_size: MatrixSize,

    /// Observation period of the history in months (1, 3, 6, 12); detected when omitted.
    #[arg(long, env = "ECL_PERIOD_MONTHS")]
    pub period_months: Option<u32>,

    /// Projection months for performing loans.
    #[arg(long, env = "ECL_STAGE1_HORIZON", default_value_t = 12)]
    pub stage1_horizon: usize,

    /// Projection months for underperforming loans and cure/recovery curves.
    #[arg(long, env = "ECL_LIFETIME_HORIZON", default_value_t = 300)]
    pub lifetime_horizon: usize,

    /// Valuation date (YYYY-MM-DD). History on or after it does not feed the matrices.
    #[arg(long, env = "ECL_VALUATION_DATE")]
    pub valuation_date: Option<NaiveDate>,

    /// What to do with a matrix row that has no observations.
    #[arg(long, value_enum, env = "ECL_ZERO_ROW_POLICY", default_value_t = ZeroRowPolicy::Exclude)]
    pub zero_row_policy: ZeroRowPolicy,

    /// Leave the recovery curve out of the LGD.
    #[arg(long, env = "ECL_NO_RECOVERY_CURVE")]
    pub no_recovery_curve: bool,
}

/// Output options for commands that compute ECL.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Export per-period ECL rows to CSV.
    #[arg(long, env = "ECL_EXPORT_RESULTS")]
    pub export_results: Option<PathBuf>,

    /// Export matrices, curves, schedules, records and diagnostics to JSON.
    #[arg(long, env = "ECL_EXPORT_JSON")]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Loan history CSV.
    #[arg(long, env = "ECL_HISTORY", value_name = "CSV")]
    pub history: PathBuf,

    /// Current loan book CSV.
    #[arg(long, env = "ECL_LOANS", value_name = "CSV")]
    pub loans: PathBuf,

    /// Optional recovery cash-flow CSV (discounted recoveries).
    #[arg(long, env = "ECL_RECOVERIES", value_name = "CSV")]
    pub recoveries: Option<PathBuf>,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct MatricesArgs {
    /// Loan history CSV.
    #[arg(long, env = "ECL_HISTORY", value_name = "CSV")]
    pub history: PathBuf,

    /// Optional recovery cash-flow CSV (discounted recoveries).
    #[arg(long, env = "ECL_RECOVERIES", value_name = "CSV")]
    pub recoveries: Option<PathBuf>,

    /// Curve points to print per origin stage.
    #[arg(long, default_value_t = 6)]
    pub head: usize,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Random seed for the synthetic data.
    #[arg(long, env = "ECL_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Number of synthetic accounts.
    #[arg(short = 'n', long, env = "ECL_ACCOUNTS", default_value_t = 300)]
    pub accounts: usize,

    /// Months of synthetic history.
    #[arg(long, default_value_t = 24)]
    pub months: u32,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_parses_engine_flags() {
        let cli = Cli::try_parse_from([
            "ecl",
            "run",
            "--history",
            "h.csv",
            "--loans",
            "l.csv",
            "--matrix-size",
            "4",
            "--valuation-date",
            "2024-12-31",
            "--zero-row-policy",
            "identity",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.engine.matrix_size, MatrixSize::Four);
        assert_eq!(args.engine.zero_row_policy, ZeroRowPolicy::Identity);
        assert_eq!(
            args.engine.valuation_date,
            NaiveDate::from_ymd_opt(2024, 12, 31)
        );
        assert_eq!(args.engine.lifetime_horizon, 300);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
