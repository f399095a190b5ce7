#![forbid(unsafe_code)]

mod boundary;
mod config;
mod error;
mod events;
mod sqlite;

pub use boundary::{EventStore, RowAction, ScanOrder, StorageEngine};
pub use config::{
    DEFAULT_EVENT_TABLE, DEFAULT_MIGRATION_BLOCK, EventLogConfig, OrderKey, TableLocking,
};
pub use error::StoreError;
pub use events::{
    Clock, CopyReport, EventLog, EventRate, FUTURE_CUTOFF_MARGIN_SECS, FixedClock, FutureDeletion,
    KeepAll, LockGate, MinimumRetention, RetentionOutcome, RetentionPolicy, RetentionRequest,
    SystemClock,
};
pub use sqlite::{EngineConversion, SqliteStore};
