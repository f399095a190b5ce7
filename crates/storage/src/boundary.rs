#![forbid(unsafe_code)]

use crate::{OrderKey, StoreError};
use fleetlog_core::{EventRecord, EventSchema, Predicate, SortDirection, StatusCode};
use std::collections::BTreeMap;

/// Returned by a row consumer to keep reading or to end the scan early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowAction {
    Continue,
    Stop,
}

/// Concurrency model of the engine holding the event table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageEngine {
    /// Readers see consistent snapshots while a writer is active.
    Transactional,
    /// Readers and writers serialize on a table (or file) lock.
    TableLocking,
}

impl StorageEngine {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transactional => "transactional",
            Self::TableLocking => "table-locking",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "transactional" | "wal" => Some(Self::Transactional),
            "table-locking" | "table_locking" | "locking" => Some(Self::TableLocking),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanOrder {
    pub key: OrderKey,
    pub direction: SortDirection,
}

impl ScanOrder {
    pub fn by_timestamp(direction: SortDirection) -> Self {
        Self {
            key: OrderKey::Timestamp,
            direction,
        }
    }
}

/// Relational store holding event tables.
///
/// Reads take `&self`; anything that writes takes `&mut self`. Table names are
/// validated by the implementation.
pub trait EventStore {
    fn engine(&self) -> StorageEngine;

    fn event_schema(&self, table: &str) -> Result<EventSchema, StoreError>;

    fn ensure_event_table(&mut self, table: &str) -> Result<(), StoreError>;

    /// Streams matching rows in `order`, at most `limit` of them, until the
    /// consumer returns [`RowAction::Stop`].
    fn scan(
        &self,
        table: &str,
        filter: &Predicate,
        order: ScanOrder,
        limit: Option<u64>,
        on_row: &mut dyn FnMut(EventRecord) -> RowAction,
    ) -> Result<(), StoreError>;

    fn delete(&mut self, table: &str, filter: &Predicate) -> Result<u64, StoreError>;

    /// Insert-or-replace by primary key. The block is applied atomically.
    fn upsert_block(&mut self, table: &str, records: &[EventRecord]) -> Result<usize, StoreError>;

    /// Takes a read lock on `table`. Calls nest; each must be paired with
    /// [`EventStore::unlock_tables`].
    fn lock_table_read(&self, table: &str) -> Result<(), StoreError>;

    fn unlock_tables(&self) -> Result<(), StoreError>;

    /// Whether `count` with a filter is cheap on the active engine.
    fn supports_filtered_count(&self, table: &str) -> bool;

    fn count(&self, table: &str, filter: &Predicate) -> Result<u64, StoreError>;

    fn count_by_status(
        &self,
        table: &str,
        filter: &Predicate,
    ) -> Result<BTreeMap<StatusCode, u64>, StoreError>;

    fn max_order_key(
        &self,
        table: &str,
        filter: &Predicate,
        key: OrderKey,
    ) -> Result<Option<i64>, StoreError>;

    fn distinct_accounts(&self, table: &str) -> Result<Vec<String>, StoreError>;

    fn distinct_devices(&self, table: &str, account_id: &str) -> Result<Vec<String>, StoreError>;
}
