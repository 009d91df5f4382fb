//! CSV ingest of loan history, the current loan book, and recovery cash flows.
//!
//! Files are expected to be already cleaned upstream; this layer only maps
//! columns onto domain types.
//!
//! - **Strict schema** for required columns (missing column = exit code 2)
//! - **Row-level validation** (bad rows are skipped and reported)
//! - **Loan-book normalization**: duplicate accounts merged, percentage rates
//!   converted to decimals, collateral columns turned into items

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;

use crate::domain::{
    CollateralKind, CollateralParameters, LoanObservation, LoanRecord, RecoveryObservation,
};
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Parsed rows plus what was skipped along the way.
#[derive(Debug, Clone)]
pub struct Ingested<T> {
    pub rows: Vec<T>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    /// Informational notes about normalization applied to the file.
    pub notes: Vec<String>,
}

const HISTORY_COLUMNS: [&str; 5] = [
    "account_id",
    "segment",
    "observation_date",
    "outstanding_balance",
    "days_past_due",
];

const LOAN_COLUMNS: [&str; 8] = [
    "account_id",
    "segment",
    "disbursement_date",
    "maturity_date",
    "disbursed_amount",
    "outstanding_balance",
    "annual_rate",
    "days_past_due",
];

const RECOVERY_COLUMNS: [&str; 5] = [
    "account_id",
    "observation_date",
    "default_date",
    "recovery_date",
    "cash_collections",
];

/// Alternative header spellings accepted for the canonical column names.
const ALIASES: [(&str, &str); 6] = [
    ("account_no", "account_id"),
    ("loan_type", "segment"),
    ("date", "observation_date"),
    ("interest_rate", "annual_rate"),
    ("dpd", "days_past_due"),
    ("recovery_amount", "cash_collections"),
];

pub fn load_history(path: &Path) -> Result<Ingested<LoanObservation>, AppError> {
    read_history(open(path)?)
}

pub fn load_loans(
    path: &Path,
    collateral: &CollateralParameters,
    valuation_date: Option<NaiveDate>,
) -> Result<Ingested<LoanRecord>, AppError> {
    read_loans(open(path)?, collateral, valuation_date)
}

pub fn load_recoveries(path: &Path) -> Result<Ingested<RecoveryObservation>, AppError> {
    read_recoveries(open(path)?)
}

fn open(path: &Path) -> Result<File, AppError> {
    File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))
}

/// Parse a history table.
pub fn read_history<R: Read>(source: R) -> Result<Ingested<LoanObservation>, AppError> {
    read_table(source, &HISTORY_COLUMNS, "history", |record, header_map| {
        with_account(record, header_map, parse_history_row)
    })
}

/// Parse a recovery cash-flow table.
pub fn read_recoveries<R: Read>(source: R) -> Result<Ingested<RecoveryObservation>, AppError> {
    read_table(source, &RECOVERY_COLUMNS, "recoveries", |record, header_map| {
        with_account(record, header_map, parse_recovery_row)
    })
}

/// Parse the current loan book.
///
/// `valuation_date` fills rows without a `valuation_date` column value.
pub fn read_loans<R: Read>(
    source: R,
    collateral: &CollateralParameters,
    valuation_date: Option<NaiveDate>,
) -> Result<Ingested<LoanRecord>, AppError> {
    let mut percent_rates = 0usize;
    let mut parsed = read_table(source, &LOAN_COLUMNS, "loan book", |record, header_map| {
        let (loan, was_percent) = with_account(record, header_map, |r, h, id| {
            parse_loan_row(r, h, id, collateral, valuation_date)
        })?;
        if was_percent {
            percent_rates += 1;
        }
        Ok(loan)
    })?;

    if percent_rates > 0 {
        parsed
            .notes
            .push(format!("{percent_rates} rate(s) quoted in percent were divided by 100"));
    }
    let before = parsed.rows.len();
    parsed.rows = merge_duplicate_accounts(std::mem::take(&mut parsed.rows));
    let merged = before - parsed.rows.len();
    if merged > 0 {
        parsed
            .notes
            .push(format!("{merged} duplicate account row(s) merged into their first occurrence"));
    }
    Ok(parsed)
}

/// Resolve the row's account id first so later errors can name it.
fn with_account<T>(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    parse: impl FnOnce(&StringRecord, &HashMap<String, usize>, String) -> Result<T, String>,
) -> RowResult<T> {
    let account_id = get_required(record, header_map, "account_id")
        .map_err(|e| (None, e))?
        .to_string();
    parse(record, header_map, account_id.clone()).map_err(|e| (Some(account_id), e))
}

fn parse_history_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    account_id: String,
) -> Result<LoanObservation, String> {
    Ok(LoanObservation {
        account_id,
        segment: get_required(record, header_map, "segment")?.to_string(),
        observation_date: parse_date(get_required(record, header_map, "observation_date")?)?,
        outstanding_balance: parse_f64(record, header_map, "outstanding_balance")?,
        days_past_due: parse_days(record, header_map)?,
    })
}

fn parse_recovery_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    account_id: String,
) -> Result<RecoveryObservation, String> {
    let eir = parse_opt_f64(get_optional(record, header_map, "eir")).unwrap_or(0.0);
    Ok(RecoveryObservation {
        account_id,
        observation_date: parse_date(get_required(record, header_map, "observation_date")?)?,
        default_date: parse_date(get_required(record, header_map, "default_date")?)?,
        recovery_date: parse_date(get_required(record, header_map, "recovery_date")?)?,
        cash_collections: parse_f64(record, header_map, "cash_collections")?,
        eir: rate_as_decimal(eir),
    })
}

/// Returns the loan and whether its rate was quoted in percent.
fn parse_loan_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    account_id: String,
    collateral: &CollateralParameters,
    default_valuation: Option<NaiveDate>,
) -> Result<(LoanRecord, bool), String> {
    let valuation_date = match get_optional(record, header_map, "valuation_date") {
        Some(s) => parse_date(s)?,
        None => default_valuation
            .ok_or_else(|| "Missing `valuation_date` and no default was given.".to_string())?,
    };
    let raw_rate = parse_f64(record, header_map, "annual_rate")?;
    let annual_rate = rate_as_decimal(raw_rate);
    let payment_frequency = match get_optional(record, header_map, "payment_frequency") {
        Some(s) => parse_count(s, "payment_frequency")?,
        None => 12,
    };
    let items = CollateralKind::ALL
        .iter()
        .filter_map(|&kind| {
            let value = parse_opt_f64(get_optional(record, header_map, kind.as_str()))?;
            collateral.item(kind, value)
        })
        .collect();

    let loan = LoanRecord {
        account_id,
        segment: get_required(record, header_map, "segment")?.to_string(),
        valuation_date,
        disbursement_date: parse_date(get_required(record, header_map, "disbursement_date")?)?,
        maturity_date: parse_date(get_required(record, header_map, "maturity_date")?)?,
        disbursed_amount: parse_f64(record, header_map, "disbursed_amount")?,
        outstanding_balance: parse_f64(record, header_map, "outstanding_balance")?,
        annual_rate,
        days_past_due: parse_days(record, header_map)?,
        payment_frequency,
        collateral: items,
    };
    Ok((loan, annual_rate != raw_rate))
}

/// Keep the first row per account, adding later rows' outstanding balances to it.
pub fn merge_duplicate_accounts(rows: Vec<LoanRecord>) -> Vec<LoanRecord> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(rows.len());
    let mut out: Vec<LoanRecord> = Vec::with_capacity(rows.len());
    for row in rows {
        match index.get(&row.account_id) {
            Some(&i) => out[i].outstanding_balance += row.outstanding_balance,
            None => {
                index.insert(row.account_id.clone(), out.len());
                out.push(row);
            }
        }
    }
    out
}

/// Rates above 1 are taken to be percentages.
pub fn rate_as_decimal(rate: f64) -> f64 {
    if rate > 1.0 { rate / 100.0 } else { rate }
}

type RowResult<T> = Result<T, (Option<String>, String)>;

fn read_table<R, T, F>(
    source: R,
    required: &[&str],
    label: &str,
    mut parse: F,
) -> Result<Ingested<T>, AppError>
where
    R: Read,
    F: FnMut(&StringRecord, &HashMap<String, usize>) -> RowResult<T>,
{
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read {label} CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for column in required {
        if !header_map.contains_key(*column) {
            return Err(AppError::new(
                2,
                format!("Missing required {label} column: `{column}`"),
            ));
        }
    }

    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse(&record, &header_map) {
            Ok(row) => rows.push(row),
            Err((id, message)) => row_errors.push(RowError { line, id, message }),
        }
    }

    if rows.is_empty() {
        return Err(AppError::new(3, format!("No valid {label} rows.")));
    }

    Ok(Ingested {
        rows,
        row_errors,
        rows_read,
        notes: Vec::new(),
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (idx, name) in headers.iter().enumerate() {
        let name = normalize_header_name(name);
        let canonical = ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, canonical)| canonical.to_string())
            .unwrap_or(name);
        map.entry(canonical).or_insert(idx);
    }
    map
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase().replace([' ', '-'], "_")
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    const FMTS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    Err(format!(
        "Invalid date '{s}'. Expected one of: YYYY-MM-DD, DD/MM/YYYY, DD-MM-YYYY, YYYY/MM/DD."
    ))
}

fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let v = s?.replace(',', "").parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

fn parse_f64(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<f64, String> {
    let raw = get_required(record, header_map, name)?;
    parse_opt_f64(Some(raw)).ok_or_else(|| format!("Invalid number for `{name}`: '{raw}'"))
}

fn parse_days(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<u32, String> {
    let raw = get_required(record, header_map, "days_past_due")?;
    parse_count(raw, "days_past_due")
}

fn parse_count(raw: &str, name: &str) -> Result<u32, String> {
    match parse_opt_f64(Some(raw)) {
        Some(v) if v >= 0.0 && v <= u32::MAX as f64 => Ok(v.round() as u32),
        _ => Err(format!("Invalid `{name}`: '{raw}' (must be a non-negative number)")),
    }
}
