use chrono::NaiveDate;
use serde::Deserialize;

use crate::dates;
use crate::models::{
    CycleRecord, CycleStats, CycleSummary, Phase, UserProfile, DEFAULT_CYCLE_LENGTH,
    DEFAULT_PERIOD_LENGTH,
};

/// Ovulation is assumed to happen this many days before the next period.
const LUTEAL_LENGTH_DAYS: i64 = 14;
/// Half-width of the ovulation window around the estimated ovulation day.
const OVULATION_HALF_WINDOW: i64 = 2;
/// Closed cycles shown in the stats history.
const RECENT_CYCLES: usize = 5;

pub const DEFAULT_MAX_STD_DEV_DAYS: f64 = 7.0;
pub const DEFAULT_MAX_LATEST_DEVIATION_DAYS: u32 = 7;

/// Thresholds for flagging a cycle history as irregular.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct IrregularityPolicy {
    #[serde(default = "default_max_std_dev")]
    pub max_std_dev_days: f64,
    #[serde(default = "default_max_latest_deviation")]
    pub max_latest_deviation_days: u32,
}

fn default_max_std_dev() -> f64 {
    DEFAULT_MAX_STD_DEV_DAYS
}

fn default_max_latest_deviation() -> u32 {
    DEFAULT_MAX_LATEST_DEVIATION_DAYS
}

impl Default for IrregularityPolicy {
    fn default() -> Self {
        Self {
            max_std_dev_days: DEFAULT_MAX_STD_DEV_DAYS,
            max_latest_deviation_days: DEFAULT_MAX_LATEST_DEVIATION_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Irregularity {
    pub irregular: bool,
    pub reason: Option<String>,
}

impl Irregularity {
    fn regular() -> Self {
        Self {
            irregular: false,
            reason: None,
        }
    }

    fn because(reason: String) -> Self {
        Self {
            irregular: true,
            reason: Some(reason),
        }
    }
}

/// Classify where `reference` falls in the cycle that began on `last_period_start`.
/// Missing or zero averages fall back to a 28-day cycle with a 5-day period.
pub fn classify_phase(
    reference: NaiveDate,
    last_period_start: NaiveDate,
    avg_cycle_length: Option<u32>,
    avg_period_length: Option<u32>,
) -> Phase {
    let cycle_length = i64::from(or_default(avg_cycle_length, DEFAULT_CYCLE_LENGTH));
    let period_length = i64::from(or_default(avg_period_length, DEFAULT_PERIOD_LENGTH));

    let d = dates::days_between(last_period_start, reference);
    let ovulation_day = cycle_length - LUTEAL_LENGTH_DAYS;

    if d < 0 {
        // Reference precedes the known start: treat as the tail of the previous cycle.
        Phase::Luteal
    } else if d < period_length {
        Phase::Menstrual
    } else if d < ovulation_day - OVULATION_HALF_WINDOW {
        Phase::Follicular
    } else if d <= ovulation_day + OVULATION_HALF_WINDOW {
        Phase::Ovulation
    } else {
        Phase::Luteal
    }
}

fn or_default(value: Option<u32>, default: u32) -> u32 {
    match value {
        Some(v) if v > 0 => v,
        _ => default,
    }
}

/// Predicted start of the next period. No range checks on `avg_cycle_length`.
pub fn predict_next(last_period_start: NaiveDate, avg_cycle_length: u32) -> NaiveDate {
    dates::add_days(last_period_start, i64::from(avg_cycle_length))
}

/// Flag irregular cycles with the default thresholds.
///
/// `cycle_lengths` is ordered oldest to newest; a zero entry stands for a
/// cycle without a recorded length and is skipped.
pub fn detect_irregularity(cycle_lengths: &[u32], avg_cycle_length: u32) -> Irregularity {
    detect_irregularity_with(cycle_lengths, avg_cycle_length, &IrregularityPolicy::default())
}

pub fn detect_irregularity_with(
    cycle_lengths: &[u32],
    avg_cycle_length: u32,
    policy: &IrregularityPolicy,
) -> Irregularity {
    let lengths: Vec<f64> = cycle_lengths
        .iter()
        .filter(|&&len| len > 0)
        .map(|&len| f64::from(len))
        .collect();

    if lengths.len() < 2 {
        return Irregularity::regular();
    }

    if population_std_deviation(&lengths) > policy.max_std_dev_days {
        return Irregularity::because(
            "Your cycle length varies significantly from month to month.".to_string(),
        );
    }

    if let Some(&latest) = cycle_lengths.last().filter(|&&len| len > 0) {
        if latest.abs_diff(avg_cycle_length) > policy.max_latest_deviation_days {
            let direction = if latest > avg_cycle_length {
                "longer"
            } else {
                "shorter"
            };
            return Irregularity::because(format!(
                "Your latest cycle ({latest} days) is significantly {direction} than your average cycle ({avg_cycle_length} days)."
            ));
        }
    }

    Irregularity::regular()
}

/// The cycle with the latest start date. On a tie the earliest entry wins,
/// which is the newest-inserted one in a newest-first list.
pub fn most_recent_cycle(cycles: &[CycleRecord]) -> Option<&CycleRecord> {
    cycles.iter().reduce(|best, c| {
        if c.start_date > best.start_date {
            c
        } else {
            best
        }
    })
}

/// Recorded cycle lengths ordered oldest to newest, zero for open cycles.
pub fn chronological_lengths(cycles: &[CycleRecord]) -> Vec<u32> {
    let mut ordered: Vec<&CycleRecord> = cycles.iter().collect();
    ordered.sort_by_key(|c| c.start_date);
    ordered.iter().map(|c| c.length.unwrap_or(0)).collect()
}

/// Rounded means of recorded cycle lengths and non-zero period lengths.
/// `None` unless both histories have at least one sample.
pub fn recompute_averages(cycles: &[CycleRecord]) -> Option<(u32, u32)> {
    let cycle_lengths: Vec<f64> = cycles
        .iter()
        .filter_map(|c| c.length)
        .filter(|&len| len > 0)
        .map(f64::from)
        .collect();
    let period_lengths: Vec<f64> = cycles
        .iter()
        .map(CycleRecord::period_length)
        .filter(|&len| len > 0)
        .map(f64::from)
        .collect();

    if cycle_lengths.is_empty() || period_lengths.is_empty() {
        return None;
    }

    Some((
        mean(&cycle_lengths).round() as u32,
        mean(&period_lengths).round() as u32,
    ))
}

/// Compute cycle statistics for the stats view.
pub fn cycle_stats(cycles: &[CycleRecord], profile: &UserProfile) -> CycleStats {
    let mut closed: Vec<&CycleRecord> = cycles.iter().filter(|c| c.length.is_some()).collect();
    closed.sort_by_key(|c| c.start_date);

    let lengths: Vec<u32> = closed.iter().filter_map(|c| c.length).collect();
    let latest = most_recent_cycle(cycles);

    let recent = closed
        .iter()
        .rev()
        .take(RECENT_CYCLES)
        .rev()
        .map(|c| CycleSummary {
            start_date: c.start_date,
            cycle_length: c.length.unwrap_or(0),
            period_length: c.period_length(),
        })
        .collect();

    CycleStats {
        total_cycles: cycles.len(),
        closed_cycles: closed.len(),
        avg_cycle_length: profile.cycle_length(),
        avg_period_length: profile.period_length(),
        shortest_cycle: lengths.iter().copied().min(),
        longest_cycle: lengths.iter().copied().max(),
        last_period_start: latest.map(|c| c.start_date),
        last_period_end: latest.and_then(|c| c.end_date),
        recent,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
