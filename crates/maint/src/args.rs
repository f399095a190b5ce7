#![forbid(unsafe_code)]

use clap::Parser;
use fleetlog_storage::StorageEngine;
use std::path::PathBuf;

pub(crate) const DEFAULT_STORAGE_DIR: &str = ".fleetlog";

#[derive(Debug, Parser)]
#[command(name = "fleetlog_maint")]
#[command(about = "Maintenance tasks for the fleet event log")]
#[command(
    after_help = "Exactly one of --events-per-sec, --convert-engine or --copy-to is required.\n\
                  Other settings come from FLEETLOG_* environment variables."
)]
pub(crate) struct MaintArgs {
    /// Directory holding the event database.
    #[arg(long, env = "FLEETLOG_STORAGE_DIR", default_value = DEFAULT_STORAGE_DIR)]
    pub storage_dir: PathBuf,

    /// Live event table; overrides FLEETLOG_EVENT_TABLE.
    #[arg(long, value_name = "TABLE")]
    pub table: Option<String>,

    /// Report events per second over the trailing window.
    #[arg(long, value_name = "HOURS", value_parser = clap::value_parser!(u32).range(1..))]
    pub events_per_sec: Option<u32>,

    /// Switch the storage engine backing the event tables.
    #[arg(long, value_name = "ENGINE", value_parser = parse_engine)]
    pub convert_engine: Option<StorageEngine>,

    /// Downtime you accept for --convert-engine; must cover the estimate.
    #[arg(long, value_name = "N", requires = "convert_engine")]
    pub confirm_downtime_minutes: Option<u64>,

    /// Copy events from the live table into TABLE.
    #[arg(long, value_name = "TABLE")]
    pub copy_to: Option<String>,

    /// Limit --copy-to to one account.
    #[arg(long, requires = "copy_to")]
    pub account: Option<String>,

    /// Limit --copy-to to one device of --account.
    #[arg(long, requires = "account")]
    pub device: Option<String>,

    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Action {
    EventRate {
        hours: u32,
    },
    ConvertEngine {
        target: StorageEngine,
        confirmed_minutes: Option<u64>,
    },
    Copy {
        destination: String,
        account: Option<String>,
        device: Option<String>,
    },
}

impl MaintArgs {
    pub(crate) fn action(&self) -> Result<Action, String> {
        let mut actions = Vec::new();
        if let Some(hours) = self.events_per_sec {
            actions.push(Action::EventRate { hours });
        }
        if let Some(target) = self.convert_engine {
            actions.push(Action::ConvertEngine {
                target,
                confirmed_minutes: self.confirm_downtime_minutes,
            });
        }
        if let Some(destination) = &self.copy_to {
            actions.push(Action::Copy {
                destination: destination.clone(),
                account: self.account.clone(),
                device: self.device.clone(),
            });
        }

        match actions.len() {
            0 => Err(
                "no action given (try --events-per-sec, --convert-engine or --copy-to)".into(),
            ),
            1 => Ok(actions.remove(0)),
            _ => Err("only one action may be given per run".into()),
        }
    }
}

fn parse_engine(raw: &str) -> Result<StorageEngine, String> {
    StorageEngine::parse(raw).ok_or_else(|| "expected transactional or table-locking".to_string())
}
