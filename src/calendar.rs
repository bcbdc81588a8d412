use chrono::NaiveDate;
use serde::Serialize;

use crate::dates;
use crate::models::{CycleRecord, Phase, UserProfile};
use crate::prediction;

#[derive(Debug, thiserror::Error)]
#[error("invalid month {year}-{month:02}")]
pub struct InvalidMonth {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "phase", rename_all = "snake_case")]
pub enum DayMarker {
    /// Inside a logged period.
    Period,
    /// Inside the forecast for the next period.
    PredictedPeriod,
    Phase(Phase),
    /// Nothing logged yet to reason from.
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub marker: DayMarker,
}

/// Data for a month view
#[derive(Debug, Clone, Serialize)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub predicted_start: Option<NaiveDate>,
    pub days: Vec<CalendarDay>,
}

pub fn month_view(
    year: i32,
    month: u32,
    cycles: &[CycleRecord],
    profile: &UserProfile,
) -> Result<MonthView, InvalidMonth> {
    let invalid = || InvalidMonth { year, month };
    let first_day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(invalid)?;

    let latest = prediction::most_recent_cycle(cycles);
    let predicted_start =
        latest.map(|c| prediction::predict_next(c.start_date, profile.cycle_length()));
    // Only forecast once the current period has been closed.
    let forecast = match (latest, predicted_start) {
        (Some(c), Some(start)) if !c.is_open() => Some((
            start,
            dates::add_days(start, i64::from(profile.period_length()) - 1),
        )),
        _ => None,
    };

    let days = first_day
        .iter_days()
        .take_while(|date| *date < next_month)
        .map(|date| {
            let marker = if cycles.iter().any(|c| in_period(c, date)) {
                DayMarker::Period
            } else if forecast.is_some_and(|(start, end)| date >= start && date <= end) {
                DayMarker::PredictedPeriod
            } else if let Some(c) = latest {
                DayMarker::Phase(prediction::classify_phase(
                    date,
                    c.start_date,
                    Some(profile.cycle_length()),
                    Some(profile.period_length()),
                ))
            } else {
                DayMarker::Unknown
            };
            CalendarDay { date, marker }
        })
        .collect();

    Ok(MonthView {
        year,
        month,
        predicted_start,
        days,
    })
}

fn in_period(cycle: &CycleRecord, date: NaiveDate) -> bool {
    match cycle.end_date {
        Some(end) => date >= cycle.start_date && date <= end,
        None => date == cycle.start_date,
    }
}
