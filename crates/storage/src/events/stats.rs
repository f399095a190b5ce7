#![forbid(unsafe_code)]

use super::EventLog;
use crate::{EventStore, StoreError};
use fleetlog_core::{Column, Predicate, RecordCount};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EventRate {
    pub window_secs: i64,
    pub since: i64,
    pub total: RecordCount,
    pub per_second: Option<f64>,
}

impl<S: EventStore> EventLog<S> {
    /// Events stamped within the trailing window across all accounts, and the
    /// resulting average rate.
    pub fn event_rate(&self, window_hours: u32) -> Result<EventRate, StoreError> {
        if window_hours == 0 {
            return Err(StoreError::InvalidInput("rate window must be at least one hour"));
        }
        let window_secs = i64::from(window_hours) * 3600;
        let since = self.now_secs().saturating_sub(window_secs);
        let total = self.count_matching(&Predicate::ge(Column::Timestamp, since))?;
        let per_second = total
            .exact()
            .map(|total| total as f64 / window_secs as f64);
        Ok(EventRate {
            window_secs,
            since,
            total,
            per_second,
        })
    }
}
