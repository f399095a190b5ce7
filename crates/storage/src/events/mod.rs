#![forbid(unsafe_code)]

mod aggregate;
mod lock_gate;
mod migrate;
mod retention;
mod select;
mod stats;

pub use lock_gate::LockGate;
pub use migrate::CopyReport;
pub use retention::{
    FUTURE_CUTOFF_MARGIN_SECS, FutureDeletion, KeepAll, MinimumRetention, RetentionOutcome,
    RetentionPolicy, RetentionRequest,
};
pub use stats::EventRate;

use crate::{EventLogConfig, EventStore, StoreError};
use fleetlog_core::EventSchema;
use tracing::debug;

/// Source of "now" in Unix-epoch seconds.
pub trait Clock {
    fn now_secs(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};

        let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(duration) => duration,
            Err(_) => return 0,
        };
        i64::try_from(now.as_secs()).unwrap_or(i64::MAX)
    }
}

/// Clock pinned to one instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_secs(&self) -> i64 {
        self.0
    }
}

/// Query, retention and migration engine over one live event table.
///
/// The lock gate is resolved once here from the configured policy and the
/// store's engine; it does not change for the lifetime of the value.
pub struct EventLog<S: EventStore> {
    store: S,
    config: EventLogConfig,
    gate: LockGate,
    schema: EventSchema,
    policy: Box<dyn RetentionPolicy>,
    clock: Box<dyn Clock>,
}

impl<S: EventStore> EventLog<S> {
    pub fn new(mut store: S, config: EventLogConfig) -> Result<Self, StoreError> {
        config.validate()?;
        store.ensure_event_table(&config.event_table)?;
        let schema = store.event_schema(&config.event_table)?;
        let gate = LockGate::resolve(config.table_locking, store.engine());
        debug!(
            table = %config.event_table,
            engine = store.engine().as_str(),
            locks_reads = gate.locks_reads(),
            "event log ready"
        );
        Ok(Self {
            store,
            config,
            gate,
            schema,
            policy: Box::new(KeepAll),
            clock: Box::new(SystemClock),
        })
    }

    pub fn with_retention_policy(mut self, policy: impl RetentionPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn lock_gate(&self) -> LockGate {
        self.gate
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn table(&self) -> &str {
        &self.config.event_table
    }

    fn now_secs(&self) -> i64 {
        self.clock.now_secs()
    }
}
