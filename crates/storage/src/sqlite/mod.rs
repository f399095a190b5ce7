#![forbid(unsafe_code)]

mod render;
mod schema;

use crate::{EventStore, OrderKey, RowAction, ScanOrder, StorageEngine, StoreError};
use fleetlog_core::ids::{AccountId, DeviceId};
use fleetlog_core::{EventKey, EventRecord, EventSchema, Predicate, StatusCode};
use render::{append_order, append_predicate, quote_table};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const DB_FILE_NAME: &str = "fleetlog.db";
const EVENT_COLUMNS: &str = "account_id, device_id, timestamp, status_code, latitude, longitude, \
     cell_latitude, cell_longitude, creation_time, payload_json";
const EVENT_COLUMNS_NO_CELL: &str = "account_id, device_id, timestamp, status_code, latitude, longitude, \
     NULL, NULL, creation_time, payload_json";
const INSERT_COLUMNS_NO_CELL: &str = "account_id, device_id, timestamp, status_code, latitude, longitude, \
     creation_time, payload_json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConversion {
    pub from: StorageEngine,
    pub to: StorageEngine,
    pub changed: bool,
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    engine: StorageEngine,
    allow_transactional_count: bool,
    lock_level: Cell<usize>,
    /// Column layout of tables known to exist.
    schemas: RefCell<BTreeMap<String, EventSchema>>,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref();
        std::fs::create_dir_all(storage_dir)?;

        let db_path = storage_dir.join(DB_FILE_NAME);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let engine = schema::read_engine(&conn)?;
        debug!(engine = engine.as_str(), dir = %storage_dir.display(), "opened event store");

        Ok(Self {
            conn,
            engine,
            allow_transactional_count: true,
            lock_level: Cell::new(0),
            schemas: RefCell::new(BTreeMap::new()),
        })
    }

    /// Whether the transactional engine advertises cheap filtered counts.
    pub fn with_transactional_count(mut self, allowed: bool) -> Self {
        self.allow_transactional_count = allowed;
        self
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        quote_table(table)?;
        schema::table_exists(&self.conn, table)
    }

    /// Switches the journal mode backing every table and rewrites the file.
    /// The database is unavailable to other connections while this runs.
    pub fn convert_engine(&mut self, target: StorageEngine) -> Result<EngineConversion, StoreError> {
        if self.lock_level.get() > 0 {
            return Err(StoreError::InvalidInput("cannot convert while a read lock is held"));
        }
        let from = schema::read_engine(&self.conn)?;
        if from == target {
            return Ok(EngineConversion {
                from,
                to: target,
                changed: false,
            });
        }

        let to = schema::set_journal_mode(&self.conn, target)?;
        if to != target {
            return Err(StoreError::InvalidInput("engine refused the requested journal mode"));
        }
        self.conn.execute_batch("VACUUM")?;
        self.engine = to;
        info!(from = from.as_str(), to = to.as_str(), "converted storage engine");
        Ok(EngineConversion {
            from,
            to,
            changed: true,
        })
    }

    fn table_schema(&self, table: &str) -> Result<EventSchema, StoreError> {
        if let Some(known) = self.schemas.borrow().get(table) {
            return Ok(*known);
        }
        let read = schema::read_event_schema(&self.conn, table)?;
        if schema::table_exists(&self.conn, table)? {
            self.schemas.borrow_mut().insert(table.to_string(), read);
        }
        Ok(read)
    }

    fn select_sql(&self, table: &str) -> Result<String, StoreError> {
        let quoted = quote_table(table)?;
        let columns = if self.table_schema(table)?.has_cell_position {
            EVENT_COLUMNS
        } else {
            EVENT_COLUMNS_NO_CELL
        };
        Ok(format!("SELECT {columns} FROM {quoted} WHERE "))
    }
}

impl EventStore for SqliteStore {
    fn engine(&self) -> StorageEngine {
        self.engine
    }

    fn event_schema(&self, table: &str) -> Result<EventSchema, StoreError> {
        self.table_schema(table)
    }

    fn ensure_event_table(&mut self, table: &str) -> Result<(), StoreError> {
        schema::create_event_table(&self.conn, table)?;
        self.schemas.get_mut().remove(table);
        Ok(())
    }

    fn scan(
        &self,
        table: &str,
        filter: &Predicate,
        order: ScanOrder,
        limit: Option<u64>,
        on_row: &mut dyn FnMut(EventRecord) -> RowAction,
    ) -> Result<(), StoreError> {
        let mut sql = self.select_sql(table)?;
        let mut params: Vec<SqlValue> = Vec::new();
        append_predicate(&mut sql, &mut params, filter);
        append_order(&mut sql, order);
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        while let Some(row) = rows.next()? {
            if on_row(decode_event(row)?) == RowAction::Stop {
                break;
            }
        }
        Ok(())
    }

    fn delete(&mut self, table: &str, filter: &Predicate) -> Result<u64, StoreError> {
        let mut sql = format!("DELETE FROM {} WHERE ", quote_table(table)?);
        let mut params: Vec<SqlValue> = Vec::new();
        append_predicate(&mut sql, &mut params, filter);
        let deleted = self.conn.execute(&sql, params_from_iter(params.iter()))?;
        Ok(deleted as u64)
    }

    fn upsert_block(&mut self, table: &str, records: &[EventRecord]) -> Result<usize, StoreError> {
        let quoted = quote_table(table)?;
        let has_cell_position = self.table_schema(table)?.has_cell_position;
        for record in records {
            check_record(record, has_cell_position)?;
        }

        let tx = self.conn.transaction()?;
        if has_cell_position {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT OR REPLACE INTO {quoted}({EVENT_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ))?;
            for record in records {
                stmt.execute(params![
                    record.key.account_id,
                    record.key.device_id,
                    record.key.timestamp,
                    record.key.status_code,
                    record.latitude,
                    record.longitude,
                    record.cell_latitude,
                    record.cell_longitude,
                    record.creation_time,
                    record.payload_json,
                ])?;
            }
        } else {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT OR REPLACE INTO {quoted}({INSERT_COLUMNS_NO_CELL}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ))?;
            for record in records {
                stmt.execute(params![
                    record.key.account_id,
                    record.key.device_id,
                    record.key.timestamp,
                    record.key.status_code,
                    record.latitude,
                    record.longitude,
                    record.creation_time,
                    record.payload_json,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn lock_table_read(&self, table: &str) -> Result<(), StoreError> {
        let quoted = quote_table(table)?;
        let level = self.lock_level.get();
        if level == 0 {
            self.conn.execute_batch("BEGIN DEFERRED")?;
            // A deferred transaction takes its shared lock on first read.
            let touched = self
                .conn
                .query_row(&format!("SELECT 1 FROM {quoted} LIMIT 1"), [], |row| {
                    row.get::<_, i64>(0)
                })
                .optional();
            if let Err(err) = touched {
                let _ = self.conn.execute_batch("ROLLBACK");
                return Err(err.into());
            }
            debug!(table, "table read lock acquired");
        }
        self.lock_level.set(level + 1);
        Ok(())
    }

    fn unlock_tables(&self) -> Result<(), StoreError> {
        match self.lock_level.get() {
            0 => Ok(()),
            1 => {
                self.lock_level.set(0);
                self.conn.execute_batch("COMMIT")?;
                debug!("table read lock released");
                Ok(())
            }
            level => {
                self.lock_level.set(level - 1);
                Ok(())
            }
        }
    }

    fn supports_filtered_count(&self, _table: &str) -> bool {
        match self.engine {
            StorageEngine::TableLocking => true,
            StorageEngine::Transactional => self.allow_transactional_count,
        }
    }

    fn count(&self, table: &str, filter: &Predicate) -> Result<u64, StoreError> {
        let mut sql = format!("SELECT COUNT(1) FROM {} WHERE ", quote_table(table)?);
        let mut params: Vec<SqlValue> = Vec::new();
        append_predicate(&mut sql, &mut params, filter);
        let count = self
            .conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get::<_, i64>(0))?;
        Ok(count.max(0) as u64)
    }

    fn count_by_status(
        &self,
        table: &str,
        filter: &Predicate,
    ) -> Result<BTreeMap<StatusCode, u64>, StoreError> {
        let mut sql = format!(
            "SELECT status_code, COUNT(1) FROM {} WHERE ",
            quote_table(table)?
        );
        let mut params: Vec<SqlValue> = Vec::new();
        append_predicate(&mut sql, &mut params, filter);
        sql.push_str(" GROUP BY status_code");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let code = row.get::<_, StatusCode>(0)?;
            let count = row.get::<_, i64>(1)?;
            out.insert(code, count.max(0) as u64);
        }
        Ok(out)
    }

    fn max_order_key(
        &self,
        table: &str,
        filter: &Predicate,
        key: OrderKey,
    ) -> Result<Option<i64>, StoreError> {
        let mut sql = format!(
            "SELECT MAX({}) FROM {} WHERE ",
            key.column().name(),
            quote_table(table)?
        );
        let mut params: Vec<SqlValue> = Vec::new();
        append_predicate(&mut sql, &mut params, filter);
        let max = self.conn.query_row(&sql, params_from_iter(params.iter()), |row| {
            row.get::<_, Option<i64>>(0)
        })?;
        Ok(max)
    }

    fn distinct_accounts(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT account_id FROM {} ORDER BY account_id ASC",
            quote_table(table)?
        ))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row.get::<_, String>(0)?);
        }
        Ok(out)
    }

    fn distinct_devices(&self, table: &str, account_id: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT device_id FROM {} WHERE account_id=?1 ORDER BY device_id ASC",
            quote_table(table)?
        ))?;
        let mut rows = stmt.query(params![account_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row.get::<_, String>(0)?);
        }
        Ok(out)
    }
}

/// Rejects rows the rest of the engine could not address or store faithfully.
fn check_record(record: &EventRecord, has_cell_position: bool) -> Result<(), StoreError> {
    AccountId::try_new(record.account_id()).map_err(|err| StoreError::InvalidId {
        id: record.account_id().to_string(),
        reason: err.message(),
    })?;
    DeviceId::try_new(record.device_id()).map_err(|err| StoreError::InvalidId {
        id: record.device_id().to_string(),
        reason: err.message(),
    })?;
    if serde_json::from_str::<serde_json::Value>(&record.payload_json).is_err() {
        return Err(StoreError::InvalidInput("payload_json must be valid json"));
    }
    if !has_cell_position && (record.cell_latitude.is_some() || record.cell_longitude.is_some()) {
        return Err(StoreError::InvalidInput(
            "table has no cell position columns for this record",
        ));
    }
    Ok(())
}

fn decode_event(row: &Row<'_>) -> Result<EventRecord, StoreError> {
    Ok(EventRecord {
        key: EventKey {
            account_id: row.get(0)?,
            device_id: row.get(1)?,
            timestamp: row.get(2)?,
            status_code: row.get(3)?,
        },
        latitude: row.get(4)?,
        longitude: row.get(5)?,
        cell_latitude: row.get(6)?,
        cell_longitude: row.get(7)?,
        creation_time: row.get(8)?,
        payload_json: row.get(9)?,
    })
}
