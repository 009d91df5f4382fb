use std::io::Write;

use chrono::NaiveDate;
use ifrs9_ecl::app::pipeline::run_engine;
use ifrs9_ecl::data::{SampleConfig, generate_sample};
use ifrs9_ecl::domain::{
    CollateralParameters, EngineConfig, LoanObservation, LoanRecord, MatrixSize, Stage,
};
use ifrs9_ecl::io::{load_history, load_loans, write_results_csv, write_results_json};
use ifrs9_ecl::math::is_row_stochastic;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn history() -> Vec<LoanObservation> {
    let rows = [
        ("A", 0, 0),
        ("B", 0, 45),
        ("C", 45, 120),
        ("D", 45, 0),
        ("E", 120, 0),
        ("F", 120, 120),
    ];
    rows.iter()
        .flat_map(|&(id, jan, feb)| {
            [(d(2023, 1, 31), jan), (d(2023, 2, 28), feb)].map(|(date, dpd)| LoanObservation {
                account_id: id.to_string(),
                segment: "retail".to_string(),
                observation_date: date,
                outstanding_balance: 100.0,
                days_past_due: dpd,
            })
        })
        .collect()
}

fn loan(id: &str, dpd: u32) -> LoanRecord {
    LoanRecord {
        account_id: id.to_string(),
        segment: "retail".to_string(),
        valuation_date: d(2023, 2, 28),
        disbursement_date: d(2022, 2, 28),
        maturity_date: d(2025, 2, 28),
        disbursed_amount: 1000.0,
        outstanding_balance: 800.0,
        annual_rate: 0.1,
        days_past_due: dpd,
        payment_frequency: 12,
        collateral: Vec::new(),
    }
}

/// One linked pair: `id` at `from` with `dpd.0`, one period later with `dpd.1`.
fn pair(
    id: &str,
    from: NaiveDate,
    to: NaiveDate,
    dpd: (u32, u32),
    balance: f64,
) -> [LoanObservation; 2] {
    [(from, dpd.0), (to, dpd.1)].map(|(date, days_past_due)| LoanObservation {
        account_id: id.to_string(),
        segment: "retail".to_string(),
        observation_date: date,
        outstanding_balance: balance,
        days_past_due,
    })
}

#[test]
fn performing_and_defaulted_loans_each_get_one_record() {
    let loans = vec![loan("P1", 0), loan("D1", 150)];
    let result = run_engine(&history(), None, &loans, &EngineConfig::default()).unwrap();

    let records: Vec<_> = result.records().collect();
    assert_eq!(records.len(), 2);
    assert!(result.diagnostics.loan_failures.is_empty());

    let performing = records.iter().find(|r| r.account_id == "P1").unwrap();
    assert_eq!(performing.stage, Stage::Stage1);
    assert_eq!(performing.entries.len(), 12);
    assert!(performing.total_ecl > 0.0);

    let defaulted = records.iter().find(|r| r.account_id == "D1").unwrap();
    assert_eq!(defaulted.stage, Stage::Stage3);
    assert_eq!(defaulted.entries.len(), 1);
    assert_eq!(defaulted.entries[0].pd, 1.0);

    let sum: f64 = records.iter().map(|r| r.total_ecl).sum();
    assert!((result.total_ecl() - sum).abs() < 0.011);
}

#[test]
fn synthetic_portfolio_runs_end_to_end() {
    let valuation = d(2024, 12, 31);
    let sample = generate_sample(&SampleConfig {
        accounts: 90,
        months: 24,
        seed: 42,
        valuation_date: valuation,
    })
    .unwrap();
    let config = EngineConfig {
        valuation_date: Some(valuation),
        ..EngineConfig::default()
    };

    let result = run_engine(&sample.history, None, &sample.loans, &config).unwrap();
    assert_eq!(result.segments.period_months, 1);
    assert!(!result.loans.is_empty());
    for record in result.records() {
        assert!(record.total_ecl >= 0.0);
        assert!(record.entries.iter().all(|e| (0.0..=1.0).contains(&e.lgd)));
    }
}

#[test]
fn csv_inputs_flow_through_to_exports() {
    let dir = tempfile::tempdir().unwrap();

    let history_path = dir.path().join("history.csv");
    let mut f = std::fs::File::create(&history_path).unwrap();
    writeln!(f, "account_no,loan_type,date,outstanding_balance,dpd").unwrap();
    for o in history() {
        writeln!(
            f,
            "{},{},{},{},{}",
            o.account_id, o.segment, o.observation_date, o.outstanding_balance, o.days_past_due
        )
        .unwrap();
    }
    drop(f);

    let loans_path = dir.path().join("loans.csv");
    std::fs::write(
        &loans_path,
        "account_id,segment,disbursement_date,maturity_date,disbursed_amount,outstanding_balance,interest_rate,days_past_due,building\n\
         P1,retail,2022-02-28,2025-02-28,1000,800,10,0,500\n\
         D1,retail,28/02/2022,28/02/2025,1000,800,0.1,150,\n",
    )
    .unwrap();

    let history = load_history(&history_path).unwrap();
    assert_eq!(history.rows.len(), 12);
    let loans = load_loans(
        &loans_path,
        &CollateralParameters::default(),
        Some(d(2023, 2, 28)),
    )
    .unwrap();
    assert_eq!(loans.rows.len(), 2);
    assert!((loans.rows[0].annual_rate - 0.1).abs() < 1e-12);
    assert_eq!(loans.rows[0].collateral.len(), 1);

    let result = run_engine(&history.rows, None, &loans.rows, &EngineConfig::default()).unwrap();
    assert_eq!(result.loans.len(), 2);

    let csv_path = dir.path().join("ecl.csv");
    write_results_csv(&csv_path, &result).unwrap();
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert!(csv.starts_with("account_id,segment,stage,period_index"));
    assert_eq!(csv.lines().count(), 1 + 12 + 1);

    let json_path = dir.path().join("ecl.json");
    write_results_json(&json_path, &result, Some(d(2023, 2, 28))).unwrap();
    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(doc["period_months"], 1);
    assert_eq!(doc["loans"].as_array().unwrap().len(), 2);
    assert_eq!(doc["segments"][0]["segment"], "retail");
}

#[test]
fn quarterly_history_converts_to_monthly_curves() {
    let (q1, q2) = (d(2022, 3, 31), d(2022, 6, 30));
    let mut history: Vec<LoanObservation> = [
        pair("A", q1, q2, (0, 0), 900.0),
        pair("B", q1, q2, (0, 45), 60.0),
        pair("C", q1, q2, (0, 120), 40.0),
        pair("D", q1, q2, (45, 0), 200.0),
        pair("E", q1, q2, (45, 45), 700.0),
        pair("F", q1, q2, (45, 120), 100.0),
        // Every defaulted balance cures or leaves the book: nothing stays in default.
        pair("G", q1, q2, (120, 0), 100.0),
    ]
    .into_iter()
    .flatten()
    .collect();
    history.push(LoanObservation {
        account_id: "H".to_string(),
        segment: "retail".to_string(),
        observation_date: q1,
        outstanding_balance: 50.0,
        days_past_due: 150,
    });

    let loans: Vec<LoanRecord> = [("P1", 0), ("S2", 45), ("D3", 120)]
        .into_iter()
        .map(|(id, dpd)| LoanRecord {
            valuation_date: q2,
            disbursement_date: d(2021, 6, 30),
            maturity_date: d(2024, 6, 30),
            ..loan(id, dpd)
        })
        .collect();

    let result = run_engine(&history, None, &loans, &EngineConfig::default()).unwrap();
    assert_eq!(result.segments.period_months, 3);
    assert!(result.diagnostics.segment_failures.is_empty());
    assert!(result.diagnostics.loan_failures.is_empty());
    assert_eq!(result.loans.len(), 3);

    let pd = &result.segments.pd_curves["retail"];
    assert!(is_row_stochastic(&pd.monthly_matrix, 1e-9));
    assert!(pd.monthly_matrix.iter().all(|v| *v >= 0.0));
    let cure = &result.segments.cure_recovery["retail"];
    assert!(is_row_stochastic(&cure.monthly_matrix, 1e-9));
    // 100 cured and 50 recovered over the quarter.
    assert!((cure.cure.cumulative[2] - 100.0 / 150.0).abs() < 1e-9);
    assert!((cure.recovery.cumulative[2] - 50.0 / 150.0).abs() < 1e-9);

    for record in result.records() {
        assert!(record.total_ecl >= 0.0);
        assert!(!record.entries.is_empty());
    }
}

#[test]
fn four_state_substages_use_lifetime_curves() {
    let (jan, feb) = (d(2023, 1, 31), d(2023, 2, 28));
    let history: Vec<LoanObservation> = [
        pair("A", jan, feb, (0, 0), 800.0),
        pair("B", jan, feb, (0, 45), 100.0),
        pair("C", jan, feb, (45, 45), 500.0),
        pair("D", jan, feb, (45, 75), 200.0),
        pair("E", jan, feb, (75, 75), 400.0),
        pair("F", jan, feb, (75, 120), 100.0),
        pair("G", jan, feb, (120, 120), 300.0),
        pair("H", jan, feb, (120, 0), 100.0),
    ]
    .into_iter()
    .flatten()
    .collect();
    let loans = vec![loan("P1", 0), loan("A2", 45), loan("B2", 75), loan("D3", 150)];
    let config = EngineConfig {
        matrix_size: MatrixSize::Four,
        ..EngineConfig::default()
    };

    let result = run_engine(&history, None, &loans, &config).unwrap();
    assert!(result.diagnostics.loan_failures.is_empty());
    assert_eq!(result.loans.len(), 4);

    let pd = &result.segments.pd_curves["retail"];
    assert_eq!(pd.for_stage(Stage::Stage1).unwrap().len(), config.stage1_horizon);
    assert_eq!(pd.for_stage(Stage::Stage2a).unwrap().len(), config.lifetime_horizon);
    assert_eq!(pd.for_stage(Stage::Stage2b).unwrap().len(), config.lifetime_horizon);
    assert!(pd.for_stage(Stage::Stage2).is_none());

    let stages: Vec<Stage> = result.records().map(|r| r.stage).collect();
    assert_eq!(
        stages,
        vec![Stage::Stage1, Stage::Stage2a, Stage::Stage2b, Stage::Stage3]
    );
    for loan in &result.loans[1..3] {
        assert!(loan.ecl.entries.len() > config.stage1_horizon);
        assert_eq!(loan.ecl.entries.len(), loan.schedule.len());
    }
    assert_eq!(result.loans[0].ecl.entries.len(), config.stage1_horizon);
    assert_eq!(result.loans[3].ecl.entries.len(), 1);
}
