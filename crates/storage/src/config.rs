#![forbid(unsafe_code)]

use crate::StoreError;
use fleetlog_core::{Column, EventRecord};

pub const DEFAULT_EVENT_TABLE: &str = "EventData";
pub const DEFAULT_MIGRATION_BLOCK: usize = 25_000;

/// Configured table-locking policy for reads, before engine introspection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TableLocking {
    Always,
    Never,
    #[default]
    Auto,
}

impl TableLocking {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" | "true" | "on" => Some(Self::Always),
            "never" | "false" | "off" => Some(Self::Never),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Column a table is copied and checkpointed by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderKey {
    #[default]
    Timestamp,
    CreationTime,
}

impl OrderKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Some(Self::Timestamp),
            "creation_time" | "creationtime" => Some(Self::CreationTime),
            _ => None,
        }
    }

    pub fn column(self) -> Column {
        match self {
            Self::Timestamp => Column::Timestamp,
            Self::CreationTime => Column::CreationTime,
        }
    }

    pub fn value_of(self, record: &EventRecord) -> i64 {
        match self {
            Self::Timestamp => record.timestamp(),
            Self::CreationTime => record.creation_time,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventLogConfig {
    pub event_table: String,
    pub table_locking: TableLocking,
    pub migration_block_size: usize,
    pub migration_order_key: OrderKey,
    pub allow_transactional_count: bool,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            event_table: DEFAULT_EVENT_TABLE.to_string(),
            table_locking: TableLocking::Auto,
            migration_block_size: DEFAULT_MIGRATION_BLOCK,
            migration_order_key: OrderKey::Timestamp,
            allow_transactional_count: true,
        }
    }
}

impl EventLogConfig {
    /// Defaults overridden by `FLEETLOG_*` environment variables.
    pub fn from_env() -> Result<Self, StoreError> {
        let mut config = Self::default();
        if let Some(table) = env_var("FLEETLOG_EVENT_TABLE") {
            config.event_table = table;
        }
        if let Some(raw) = env_var("FLEETLOG_TABLE_LOCKING") {
            config.table_locking = TableLocking::parse(&raw)
                .ok_or(StoreError::InvalidInput("FLEETLOG_TABLE_LOCKING must be always|never|auto"))?;
        }
        if let Some(raw) = env_var("FLEETLOG_MIGRATION_BLOCK") {
            config.migration_block_size = raw
                .parse::<usize>()
                .map_err(|_| StoreError::InvalidInput("FLEETLOG_MIGRATION_BLOCK must be a number"))?;
        }
        if let Some(raw) = env_var("FLEETLOG_MIGRATION_ORDER") {
            config.migration_order_key = OrderKey::parse(&raw).ok_or(StoreError::InvalidInput(
                "FLEETLOG_MIGRATION_ORDER must be timestamp|creation_time",
            ))?;
        }
        if let Some(raw) = env_var("FLEETLOG_ALLOW_TX_COUNT") {
            config.allow_transactional_count = parse_bool(&raw)
                .ok_or(StoreError::InvalidInput("FLEETLOG_ALLOW_TX_COUNT must be a boolean"))?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.migration_block_size == 0 {
            return Err(StoreError::InvalidInput("migration block size must be positive"));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
