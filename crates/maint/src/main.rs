#![forbid(unsafe_code)]

mod args;
#[cfg(test)]
mod tests;

use args::{Action, MaintArgs};
use clap::Parser;
use fleetlog_core::Predicate;
use fleetlog_core::ids::{AccountId, DeviceId};
use fleetlog_storage::{
    CopyReport, EventLog, EventLogConfig, EventStore, SqliteStore, StorageEngine, StoreError,
};
use serde_json::json;
use std::process::ExitCode;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "fleetlog=info";
/// Rows the engine conversion rewrites per minute, for the downtime estimate.
const CONVERSION_ROWS_PER_MINUTE: u64 = 500_000;

#[derive(Debug, Error)]
enum MaintError {
    #[error("{0}")]
    Usage(String),
    #[error(
        "conversion is estimated at {required} minute(s) of downtime; \
         confirm with --confirm-downtime-minutes {required} or more (got {confirmed})"
    )]
    Confirmation { required: u64, confirmed: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MaintError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Store(err) if err.is_storage() => 99,
            _ => 1,
        }
    }
}

fn main() -> ExitCode {
    let args = match MaintArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // --help and --version come through here too.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };
    init_tracing();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fleetlog_maint: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run(args: &MaintArgs) -> Result<(), MaintError> {
    let action = args.action().map_err(MaintError::Usage)?;
    let mut config = EventLogConfig::from_env()?;
    if let Some(table) = &args.table {
        config.event_table = table.clone();
    }
    let store = SqliteStore::open(&args.storage_dir)?
        .with_transactional_count(config.allow_transactional_count);

    match action {
        Action::EventRate { hours } => {
            report_event_rate(&EventLog::new(store, config)?, hours, args.json)
        }
        Action::ConvertEngine {
            target,
            confirmed_minutes,
        } => convert_engine(store, &config.event_table, target, confirmed_minutes, args.json),
        Action::Copy {
            destination,
            account,
            device,
        } => copy_events(
            EventLog::new(store, config)?,
            &destination,
            account.as_deref(),
            device.as_deref(),
            args.json,
        ),
    }
}

fn report_event_rate(
    log: &EventLog<SqliteStore>,
    hours: u32,
    as_json: bool,
) -> Result<(), MaintError> {
    let rate = log.event_rate(hours)?;
    if as_json {
        println!(
            "{}",
            json!({
                "window_hours": hours,
                "since": rate.since,
                "total": rate.total.exact(),
                "per_second": rate.per_second,
            })
        );
        return Ok(());
    }

    match (rate.total.exact(), rate.per_second) {
        (Some(total), Some(per_second)) => {
            println!("events in last {hours}h: {total} ({per_second:.3} events/sec)");
        }
        _ => println!("count unavailable"),
    }
    Ok(())
}

pub(crate) fn estimated_downtime_minutes(rows: u64) -> u64 {
    rows.div_ceil(CONVERSION_ROWS_PER_MINUTE).max(1)
}

fn check_confirmation(required: u64, confirmed: Option<u64>) -> Result<(), MaintError> {
    let Some(confirmed) = confirmed else {
        return Err(MaintError::Usage(format!(
            "--convert-engine requires --confirm-downtime-minutes (estimated {required})"
        )));
    };
    if confirmed < required {
        return Err(MaintError::Confirmation {
            required,
            confirmed,
        });
    }
    Ok(())
}

fn convert_engine(
    mut store: SqliteStore,
    table: &str,
    target: StorageEngine,
    confirmed_minutes: Option<u64>,
    as_json: bool,
) -> Result<(), MaintError> {
    let rows = if store.table_exists(table)? {
        store.count(table, &Predicate::all())?
    } else {
        0
    };
    let required = estimated_downtime_minutes(rows);
    check_confirmation(required, confirmed_minutes)?;

    info!(rows, minutes = required, target = target.as_str(), "converting storage engine");
    let conversion = store.convert_engine(target)?;
    if as_json {
        println!(
            "{}",
            json!({
                "from": conversion.from.as_str(),
                "to": conversion.to.as_str(),
                "changed": conversion.changed,
                "rows": rows,
            })
        );
    } else if conversion.changed {
        println!(
            "converted {} -> {} ({rows} rows)",
            conversion.from.as_str(),
            conversion.to.as_str()
        );
    } else {
        println!("already {}", conversion.to.as_str());
    }
    Ok(())
}

fn copy_events(
    mut log: EventLog<SqliteStore>,
    destination: &str,
    account: Option<&str>,
    device: Option<&str>,
    as_json: bool,
) -> Result<(), MaintError> {
    let reports = match (account, device) {
        (Some(account), Some(device)) => vec![log.copy_device_events(
            &parse_account(account)?,
            &parse_device(device)?,
            destination,
        )?],
        (Some(account), None) => log.copy_account_events(&parse_account(account)?, destination)?,
        (None, _) => log.copy_all_events(destination)?,
    };

    if as_json {
        let rows = reports.iter().map(copy_report_json).collect::<Vec<_>>();
        println!("{}", serde_json::Value::Array(rows));
        return Ok(());
    }
    for report in &reports {
        println!(
            "{}/{}: {} rows in {} blocks (checkpoint {} -> {})",
            report.account_id,
            report.device_id,
            report.copied,
            report.blocks,
            report.start_checkpoint,
            report.end_checkpoint
        );
    }
    if reports.is_empty() {
        println!("nothing to copy");
    }
    Ok(())
}

fn copy_report_json(report: &CopyReport) -> serde_json::Value {
    json!({
        "account_id": report.account_id.as_str(),
        "device_id": report.device_id.as_str(),
        "start_checkpoint": report.start_checkpoint,
        "end_checkpoint": report.end_checkpoint,
        "copied": report.copied,
        "blocks": report.blocks,
    })
}

fn parse_account(raw: &str) -> Result<AccountId, MaintError> {
    AccountId::try_new(raw)
        .map_err(|err| MaintError::Usage(format!("--account: {}", err.message())))
}

fn parse_device(raw: &str) -> Result<DeviceId, MaintError> {
    DeviceId::try_new(raw)
        .map_err(|err| MaintError::Usage(format!("--device: {}", err.message())))
}
