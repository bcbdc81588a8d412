#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;

use cyclesense::commands::{AppState, Clock, Session};
use cyclesense::config::{AppConfig, ConfigError};
use cyclesense::models::{FlowIntensity, ProfileUpdate, Symptom};
use cyclesense::pcos::{PcosClient, PcosError, PcosQuestionnaire};
use cyclesense::storage::{EncryptedFileStore, StorageError};
use cyclesense::{dates, logging, CommandError};

#[derive(Parser)]
#[command(name = "cyclesense")]
#[command(about = "Track periods, predict the next one, and spot irregular cycles")]
struct Cli {
    /// Account to act on.
    #[arg(long, global = true, env = "CYCLESENSE_USER", default_value = "default")]
    user: String,
    /// Passphrase that unlocks the account's data file.
    #[arg(long, global = true, env = "CYCLESENSE_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,
    /// Override the data directory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty encrypted data file for the account.
    Init,
    /// Mark the first day of a period.
    Start {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },
    /// Mark the last day of the current period.
    End {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },
    Flow {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        level: FlowIntensity,
    },
    Symptom {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        symptom: Symptom,
        #[arg(long, default_value_t = false)]
        remove: bool,
    },
    Note {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        text: String,
    },
    /// Update profile fields.
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_parser = parse_date)]
        birthdate: Option<NaiveDate>,
        #[arg(long)]
        height_cm: Option<f32>,
        #[arg(long)]
        weight_kg: Option<f32>,
        #[arg(long)]
        cycle_length: Option<u32>,
        #[arg(long)]
        period_length: Option<u32>,
    },
    /// Phase, next period and insights.
    Status {
        #[arg(long, value_parser = parse_date)]
        on: Option<NaiveDate>,
    },
    Stats,
    Month {
        year: i32,
        month: u32,
    },
    /// Print all data as JSON.
    Export,
    /// Permanently delete the account's data.
    Wipe {
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Submit a PCOS questionnaire (JSON file) to the screening service.
    Pcos {
        #[arg(long)]
        answers: PathBuf,
        /// Take cycle length, period length and age from the profile.
        #[arg(long, default_value_t = false)]
        prefill: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Store(#[from] StorageError),
    #[error(transparent)]
    Pcos(#[from] PcosError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(&'static str),
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    dates::parse(s).map_err(|_| CommandError::InvalidDate(s.to_string()).to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.log_level);

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: &AppConfig) -> Result<(), CliError> {
    let dir = match cli.data_dir.clone().or_else(|| config.data_dir.clone()) {
        Some(dir) => dir,
        None => EncryptedFileStore::default_dir()?,
    };

    if let Commands::Pcos { answers, prefill } = &cli.command {
        let mut questionnaire: PcosQuestionnaire = serde_json::from_slice(&fs::read(answers)?)?;
        if *prefill {
            let mut state = AppState::new();
            let session = sign_in(&mut state, &cli, &dir, config)?;
            questionnaire = questionnaire.prefill_from_profile(session.profile(), session.today());
        }
        let assessment = PcosClient::new(&config.pcos)?.predict(&questionnaire)?;
        return print_json(&assessment);
    }

    if let Commands::Init = cli.command {
        let passphrase = cli.passphrase.clone().ok_or(CliError::Usage("a passphrase is required"))?;
        EncryptedFileStore::create(&dir, &cli.user, passphrase)?;
        println!("created account `{}`", cli.user);
        return Ok(());
    }

    let mut state = AppState::new();
    sign_in(&mut state, &cli, &dir, config)?;

    if let Commands::Wipe { yes } = cli.command {
        if !yes {
            return Err(CliError::Usage("refusing to wipe without --yes"));
        }
        state.wipe_all_data()?;
        println!("all data for `{}` deleted", cli.user);
        return Ok(());
    }

    let session = state.session_mut()?;
    dispatch(session, cli.command)?;
    state.sign_out();
    Ok(())
}

fn sign_in<'a>(
    state: &'a mut AppState,
    cli: &Cli,
    dir: &std::path::Path,
    config: &AppConfig,
) -> Result<&'a mut Session, CliError> {
    let passphrase = cli.passphrase.clone().ok_or(CliError::Usage("a passphrase is required"))?;
    let store = EncryptedFileStore::open(dir, &cli.user, passphrase)?;
    Ok(state.sign_in(&cli.user, Box::new(store), config.irregularity, Clock::System)?)
}

fn dispatch(session: &mut Session, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Start { date } => {
            session.log_period_start(date)?;
            println!("period start logged for {}", dates::format(date));
        }
        Commands::End { date } => {
            session.log_period_end(date)?;
            println!("period end logged for {}", dates::format(date));
        }
        Commands::Flow { date, level } => print_json(&session.log_flow(date, level)?)?,
        Commands::Symptom {
            date,
            symptom,
            remove,
        } => match session.log_symptom(date, symptom, !remove)? {
            Some(day) => print_json(&day)?,
            None => println!("nothing logged for {}", dates::format(date)),
        },
        Commands::Note { date, text } => print_json(&session.log_note(date, text)?)?,
        Commands::Profile {
            name,
            birthdate,
            height_cm,
            weight_kg,
            cycle_length,
            period_length,
        } => {
            let profile = session.update_profile(ProfileUpdate {
                name,
                birthdate,
                height_cm,
                weight_kg,
                cycle_average_length: cycle_length,
                period_average_length: period_length,
            })?;
            print_json(profile)?;
        }
        Commands::Status { on } => {
            let reference = on.unwrap_or_else(|| session.today());
            print_json(&session.overview(reference))?;
        }
        Commands::Stats => print_json(&session.stats())?,
        Commands::Month { year, month } => print_json(&session.month(year, month)?)?,
        Commands::Export => println!("{}", session.export()?),
        Commands::Init | Commands::Wipe { .. } | Commands::Pcos { .. } => {
            return Err(CliError::Usage("command handled before sign-in"));
        }
    }
    Ok(())
}
