#![forbid(unsafe_code)]

use super::render::quote_table;
use crate::{StorageEngine, StoreError};
use fleetlog_core::EventSchema;
use rusqlite::{Connection, params};

pub(super) fn create_event_table(conn: &Connection, table: &str) -> Result<(), StoreError> {
    let quoted = quote_table(table)?;
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {quoted} (
          account_id TEXT NOT NULL,
          device_id TEXT NOT NULL,
          timestamp INTEGER NOT NULL,
          status_code INTEGER NOT NULL,
          latitude REAL NOT NULL DEFAULT 0,
          longitude REAL NOT NULL DEFAULT 0,
          cell_latitude REAL,
          cell_longitude REAL,
          creation_time INTEGER NOT NULL DEFAULT 0,
          payload_json TEXT NOT NULL DEFAULT '{{}}',
          PRIMARY KEY(account_id, device_id, timestamp, status_code)
        );

        CREATE INDEX IF NOT EXISTS "idx_{table}_creation"
          ON {quoted}(account_id, device_id, creation_time);
        "#
    ))?;
    Ok(())
}

pub(super) fn table_exists(conn: &Connection, table: &str) -> Result<bool, StoreError> {
    let found = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?1",
        params![table],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(found > 0)
}

pub(super) fn read_event_schema(conn: &Connection, table: &str) -> Result<EventSchema, StoreError> {
    let quoted = quote_table(table)?;
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({quoted})"))?;
    let mut rows = stmt.query([])?;
    let mut has_cell_latitude = false;
    let mut has_cell_longitude = false;
    while let Some(row) = rows.next()? {
        match row.get::<_, String>(1)?.as_str() {
            "cell_latitude" => has_cell_latitude = true,
            "cell_longitude" => has_cell_longitude = true,
            _ => {}
        }
    }
    Ok(EventSchema {
        has_cell_position: has_cell_latitude && has_cell_longitude,
    })
}

/// WAL gives readers a snapshot next to a writer; every rollback-journal mode
/// serializes on the database file lock.
pub(super) fn read_engine(conn: &Connection) -> Result<StorageEngine, StoreError> {
    let mode = conn.pragma_query_value(None, "journal_mode", |row| row.get::<_, String>(0))?;
    Ok(engine_for_journal_mode(&mode))
}

pub(super) fn engine_for_journal_mode(mode: &str) -> StorageEngine {
    if mode.eq_ignore_ascii_case("wal") {
        StorageEngine::Transactional
    } else {
        StorageEngine::TableLocking
    }
}

pub(super) fn set_journal_mode(
    conn: &Connection,
    engine: StorageEngine,
) -> Result<StorageEngine, StoreError> {
    let requested = match engine {
        StorageEngine::Transactional => "WAL",
        StorageEngine::TableLocking => "DELETE",
    };
    let mode = conn.pragma_update_and_check(None, "journal_mode", requested, |row| {
        row.get::<_, String>(0)
    })?;
    Ok(engine_for_journal_mode(&mode))
}
