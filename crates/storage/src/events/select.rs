#![forbid(unsafe_code)]

use super::EventLog;
use crate::{EventStore, RowAction, ScanOrder, StoreError};
use fleetlog_core::{
    Column, EventRecord, FetchPolicy, LimitType, MAX_EXTRA_PREDICATES, Predicate, RecordCount,
    SelectionCriteria, SortDirection, build_predicate,
};
use fleetlog_core::ids::{AccountId, DeviceId};
use tracing::{debug, warn};

impl<S: EventStore> EventLog<S> {
    /// Returns matching events ordered by timestamp; never fails on malformed
    /// criteria, which simply select nothing.
    ///
    /// `LAST n` is fetched newest-first with the limit pushed down to the
    /// store, then flipped back to ascending in memory unless the caller asked
    /// for descending output. Every other policy is fetched as requested.
    pub fn ordered_fetch(
        &self,
        criteria: &SelectionCriteria,
        policy: FetchPolicy,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let limit = policy.bounded_limit();
        if policy.limit_type == LimitType::Last && limit.is_some() {
            let mut out = self.fetch(criteria, SortDirection::Descending, limit)?;
            if policy.ascending {
                out.reverse();
            }
            return Ok(out);
        }
        self.fetch(criteria, policy.direction(), limit)
    }

    /// Streams matching events to `handler` until it returns
    /// [`RowAction::Stop`].
    pub fn scan_events(
        &self,
        criteria: &SelectionCriteria,
        direction: SortDirection,
        limit: Option<u64>,
        mut handler: impl FnMut(EventRecord) -> RowAction,
    ) -> Result<(), StoreError> {
        let Some(filter) = self.filter_for(criteria) else {
            return Ok(());
        };
        self.gated_scan(
            self.table(),
            &filter,
            ScanOrder::by_timestamp(direction),
            limit,
            &mut handler,
        )
    }

    pub fn last_event(
        &self,
        account_id: &AccountId,
        device_id: &DeviceId,
    ) -> Result<Option<EventRecord>, StoreError> {
        let criteria = SelectionCriteria::for_device(account_id.as_str(), device_id.as_str());
        let mut newest = self.ordered_fetch(&criteria, FetchPolicy::last(1))?;
        Ok(newest.pop())
    }

    pub fn count_events(&self, criteria: &SelectionCriteria) -> Result<RecordCount, StoreError> {
        let Some(filter) = self.filter_for(criteria) else {
            return Ok(RecordCount::Exact(0));
        };
        self.count_matching(&filter)
    }

    fn fetch(
        &self,
        criteria: &SelectionCriteria,
        direction: SortDirection,
        limit: Option<u64>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let mut out = Vec::new();
        self.scan_events(criteria, direction, limit, |record| {
            out.push(record);
            RowAction::Continue
        })?;
        debug!(
            account = %criteria.account_id,
            rows = out.len(),
            ?direction,
            ?limit,
            "fetched events"
        );
        Ok(out)
    }

    pub(super) fn filter_for(&self, criteria: &SelectionCriteria) -> Option<Predicate> {
        if !criteria.is_satisfiable() {
            debug!(account = %criteria.account_id, "criteria select nothing");
            return None;
        }
        if criteria.extra_predicates.len() > MAX_EXTRA_PREDICATES {
            warn!(
                supplied = criteria.extra_predicates.len(),
                kept = MAX_EXTRA_PREDICATES,
                "ignoring surplus extra predicates"
            );
        }
        Some(build_predicate(criteria, self.schema))
    }

    pub(super) fn gated_scan(
        &self,
        table: &str,
        filter: &Predicate,
        order: ScanOrder,
        limit: Option<u64>,
        on_row: &mut dyn FnMut(EventRecord) -> RowAction,
    ) -> Result<(), StoreError> {
        self.gate.run(&self.store, table, |store| {
            store.scan(table, filter, order, limit, on_row)
        })
    }

    pub(super) fn count_matching(&self, filter: &Predicate) -> Result<RecordCount, StoreError> {
        let table = self.table();
        if !self.store.supports_filtered_count(table) {
            return Ok(RecordCount::Unavailable);
        }
        self.gate
            .run(&self.store, table, |store| store.count(table, filter))
            .map(RecordCount::Exact)
    }
}

pub(super) fn device_scope(account_id: &AccountId, device_id: &DeviceId) -> Predicate {
    Predicate::And(vec![
        Predicate::eq(Column::AccountId, account_id.as_str()),
        Predicate::eq(Column::DeviceId, device_id.as_str()),
    ])
}
