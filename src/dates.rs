//! Calendar-day helpers. Everything is whole days; no time of day, no zones.

use chrono::{Duration, NaiveDate};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
const LONG_FORMAT: &str = "%B %-d, %Y";

pub fn parse(date: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
}

/// `YYYY-MM-DD`
pub fn format(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// `January 29, 2024`
pub fn format_long(date: NaiveDate) -> String {
    date.format(LONG_FORMAT).to_string()
}

pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date + Duration::days(days)
}

/// Signed number of days from `from` to `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
