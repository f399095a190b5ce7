#![forbid(unsafe_code)]

use super::EventLog;
use crate::{EventStore, StoreError};
use fleetlog_core::{SelectionCriteria, StatusCode};
use std::collections::BTreeMap;
use tracing::debug;

impl<S: EventStore> EventLog<S> {
    /// Occurrences of each requested status code within `criteria`, from one
    /// grouped count. Every requested code appears in the result, zero when
    /// absent. No status codes means no query and an empty map.
    pub fn count_by_status(
        &self,
        criteria: &SelectionCriteria,
    ) -> Result<BTreeMap<StatusCode, u64>, StoreError> {
        if criteria.status_codes.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut out: BTreeMap<StatusCode, u64> = criteria
            .status_codes
            .iter()
            .map(|code| (*code, 0))
            .collect();
        let Some(filter) = self.filter_for(criteria) else {
            return Ok(out);
        };

        let table = self.table();
        let grouped = self
            .gate
            .run(&self.store, table, |store| store.count_by_status(table, &filter))?;
        for (code, count) in grouped {
            out.insert(code, count);
        }
        debug!(account = %criteria.account_id, codes = out.len(), "grouped status counts");
        Ok(out)
    }
}
