#![forbid(unsafe_code)]

use crate::{EventStore, StorageEngine, StoreError, TableLocking};
use tracing::warn;

/// Resolved read-locking policy.
///
/// Table-locking engines can hand a long read a half-applied insert burst, so
/// reads against them are wrapped in a table read lock; transactional engines
/// already read from a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockGate {
    Always,
    Never,
    IfTableLocking { engine: StorageEngine },
}

impl LockGate {
    pub fn resolve(mode: TableLocking, engine: StorageEngine) -> Self {
        match mode {
            TableLocking::Always => Self::Always,
            TableLocking::Never => Self::Never,
            TableLocking::Auto => Self::IfTableLocking { engine },
        }
    }

    pub fn locks_reads(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::IfTableLocking { engine } => engine == StorageEngine::TableLocking,
        }
    }

    /// Runs `read` under a table read lock when the gate says so. The lock is
    /// released whether or not `read` succeeds; the read's error wins.
    pub fn run<S, T>(
        self,
        store: &S,
        table: &str,
        read: impl FnOnce(&S) -> Result<T, StoreError>,
    ) -> Result<T, StoreError>
    where
        S: EventStore + ?Sized,
    {
        if !self.locks_reads() {
            return read(store);
        }

        store.lock_table_read(table)?;
        let result = read(store);
        let released = store.unlock_tables();
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), released) => {
                if let Err(unlock_err) = released {
                    warn!(error = %unlock_err, "failed to release table read lock");
                }
                Err(err)
            }
        }
    }
}
