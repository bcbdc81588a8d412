//! Cycle tracking core: phase classification, next-period prediction,
//! irregularity detection and insights over a user's logged cycles, plus the
//! session layer that keeps a per-user cache in step with a [`storage::CycleStore`].

pub mod calendar;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod dates;
pub mod error;
pub mod insights;
pub mod logging;
pub mod models;
pub mod pcos;
pub mod prediction;
pub mod storage;

pub use commands::{AppState, Clock, Session};
pub use error::{CommandError, CommandResult};
