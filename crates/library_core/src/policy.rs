//! crates/library_core/src/policy.rs
//!
//! The fixed circulation rules: loan period, stock availability and the
//! late-return fine. Everything here is a pure function of its inputs so the
//! store adapter and the HTTP layer compute the same numbers.

use chrono::{Duration, NaiveDate};

/// Number of days a book may be kept before it is overdue.
pub const LOAN_PERIOD_DAYS: i64 = 14;

/// Fine charged per whole day a book is returned late, in currency units.
pub const FINE_PER_DAY: i64 = 5;

/// The outcome of assessing a late return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub days_late: i64,
    pub amount: i64,
}

/// Due date for a loan issued on `issue_date`.
pub fn due_date_for(issue_date: NaiveDate) -> NaiveDate {
    issue_date + Duration::days(LOAN_PERIOD_DAYS)
}

/// Copies of a book still on the shelf. Never negative, even if the stock was
/// lowered underneath existing loans by a direct data edit.
pub fn available_copies(total_stock: i64, active_loans: i64) -> i64 {
    (total_stock - active_loans).max(0)
}

/// Whole days between `due_date` and `on`, zero when `on` is not after it.
pub fn days_late(due_date: NaiveDate, on: NaiveDate) -> i64 {
    (on - due_date).num_days().max(0)
}

/// Assess the fine for a return made on `returned_on`.
///
/// Returns `None` when the book came back on or before its due date.
pub fn assess(due_date: NaiveDate, returned_on: NaiveDate) -> Option<Assessment> {
    let days_late = days_late(due_date, returned_on);
    if days_late == 0 {
        return None;
    }
    Some(Assessment {
        days_late,
        amount: days_late * FINE_PER_DAY,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn loans_are_due_two_weeks_after_issue() {
        assert_eq!(due_date_for(date(2024, 1, 1)), date(2024, 1, 15));
        assert_eq!(due_date_for(date(2024, 2, 20)), date(2024, 3, 5));
    }

    #[test]
    fn five_days_late_costs_twenty_five() {
        let assessment = assess(date(2024, 1, 1), date(2024, 1, 6)).unwrap();
        assert_eq!(assessment.days_late, 5);
        assert_eq!(assessment.amount, 25);
    }

    #[test]
    fn on_time_and_early_returns_are_not_fined() {
        assert_eq!(assess(date(2024, 1, 1), date(2024, 1, 1)), None);
        assert_eq!(assess(date(2024, 1, 1), date(2023, 12, 20)), None);
    }

    #[test]
    fn availability_is_clamped_at_zero() {
        assert_eq!(available_copies(3, 1), 2);
        assert_eq!(available_copies(1, 1), 0);
        assert_eq!(available_copies(1, 2), 0);
    }

    #[test]
    fn days_late_counts_across_month_boundaries() {
        assert_eq!(days_late(date(2024, 1, 30), date(2024, 2, 2)), 3);
        assert_eq!(days_late(date(2024, 2, 2), date(2024, 1, 30)), 0);
    }
}
