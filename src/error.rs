use chrono::NaiveDate;

use crate::calendar::InvalidMonth;
use crate::storage::StorageError;

/// Errors surfaced by session operations.
///
/// Validation variants are raised before anything is written.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("not signed in")]
    SignedOut,
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("you cannot log a period {what} date in the future ({date})")]
    FutureDate { what: &'static str, date: NaiveDate },
    #[error("period end date {end} cannot be before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    #[error("a cycle already starts on {0}")]
    DuplicateCycleStart(NaiveDate),
    #[error("no active cycle")]
    NoActiveCycle,
    #[error(transparent)]
    Calendar(#[from] InvalidMonth),
    #[error("store error: {0}")]
    Store(#[from] StorageError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CommandResult<T> = Result<T, CommandError>;
