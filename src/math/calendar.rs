//! Month-end calendar arithmetic.
//!
//! Observation dates, schedule dates and curve dates all live on month ends.
//! [`month_end_offset`] moves a date by `n` month ends: a date that already is
//! a month end advances `n` whole months, while a mid-month date first rolls
//! forward to its own month end, and that roll counts as the first step.

use chrono::{Datelike, Months, NaiveDate};

/// Last calendar day of the month containing `date`.
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

pub fn is_month_end(date: NaiveDate) -> bool {
    end_of_month(date) == date
}

/// Move `date` forward by `n` month ends. `n = 0` rolls to the current month end.
pub fn month_end_offset(date: NaiveDate, n: u32) -> NaiveDate {
    let steps = if n > 0 && !is_month_end(date) { n - 1 } else { n };
    let first = date.with_day(1).unwrap_or(date);
    let shifted = first
        .checked_add_months(Months::new(steps))
        .unwrap_or(first);
    end_of_month(shifted)
}

/// Signed day count `to - from`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Actual/365.25 year fraction.
pub fn year_fraction(from: NaiveDate, to: NaiveDate) -> f64 {
    days_between(from, to) as f64 / 365.25
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn end_of_month_handles_leap_years() {
        assert_eq!(end_of_month(d(2024, 2, 10)), d(2024, 2, 29));
        assert_eq!(end_of_month(d(2023, 2, 1)), d(2023, 2, 28));
        assert_eq!(end_of_month(d(2023, 12, 31)), d(2023, 12, 31));
    }

    #[test]
    fn month_end_dates_advance_whole_months() {
        assert_eq!(month_end_offset(d(2024, 1, 31), 1), d(2024, 2, 29));
        assert_eq!(month_end_offset(d(2024, 1, 31), 3), d(2024, 4, 30));
        assert_eq!(month_end_offset(d(2023, 12, 31), 12), d(2024, 12, 31));
        assert_eq!(month_end_offset(d(2024, 1, 31), 0), d(2024, 1, 31));
    }

    #[test]
    fn mid_month_roll_counts_as_first_step() {
        assert_eq!(month_end_offset(d(2024, 1, 15), 1), d(2024, 1, 31));
        assert_eq!(month_end_offset(d(2024, 1, 15), 3), d(2024, 3, 31));
        assert_eq!(month_end_offset(d(2024, 1, 15), 0), d(2024, 1, 31));
    }

    #[test]
    fn year_fraction_uses_actual_365_25() {
        let yf = year_fraction(d(2024, 1, 31), d(2025, 1, 31));
        assert!((yf - 366.0 / 365.25).abs() < 1e-12);
    }
}
