//! Calendar-month arithmetic for fiscal windows.

use chrono::{Datelike, NaiveDate};

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month after the one containing `date`.
pub fn next_month_start(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Last day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    next_month_start(date).pred_opt().unwrap_or(date)
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    month_end(date).day()
}

/// Display label used on ledger lines, e.g. "Apr 2025".
pub fn month_label(date: NaiveDate) -> String {
    date.format("%b %Y").to_string()
}

/// Month starts of every calendar month touched by `[start, end]`, in order.
/// Empty when `end < start`.
pub fn months_in_window(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    if end < start {
        return months;
    }
    let last = month_start(end);
    let mut cursor = month_start(start);
    while cursor <= last {
        months.push(cursor);
        cursor = next_month_start(cursor);
    }
    months
}

/// Fiscal window `[start, end]` that contains `date`, for a fiscal year
/// beginning on the first day of `start_month`.
pub fn fiscal_window_containing(date: NaiveDate, start_month: u32) -> (NaiveDate, NaiveDate) {
    let start_month = start_month.clamp(1, 12);
    let year = if date.month() >= start_month {
        date.year()
    } else {
        date.year() - 1
    };
    let start = NaiveDate::from_ymd_opt(year, start_month, 1).unwrap_or(date);
    let end = NaiveDate::from_ymd_opt(year + 1, start_month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(date);
    (start, end)
}
