#![forbid(unsafe_code)]

use super::EventLog;
use super::select::device_scope;
use crate::{EventStore, StoreError};
use fleetlog_core::ids::{AccountId, DeviceId};
use fleetlog_core::{Column, Predicate, RecordCount};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A future-event cutoff must lie strictly beyond now plus this margin.
pub const FUTURE_CUTOFF_MARGIN_SECS: i64 = 60;

/// Per-account hook that may move a proposed retention cutoff.
pub trait RetentionPolicy {
    fn adjust_cutoff(
        &self,
        account_id: &AccountId,
        device_id: &DeviceId,
        proposed: i64,
        now: i64,
    ) -> i64;
}

/// Leaves every cutoff as proposed.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeepAll;

impl RetentionPolicy for KeepAll {
    fn adjust_cutoff(&self, _: &AccountId, _: &DeviceId, proposed: i64, _: i64) -> i64 {
        proposed
    }
}

/// Guarantees each account keeps at least its minimum age of history by
/// lowering cutoffs that reach into that window.
#[derive(Clone, Debug, Default)]
pub struct MinimumRetention {
    default_secs: Option<i64>,
    per_account: BTreeMap<AccountId, i64>,
}

impl MinimumRetention {
    pub fn new(default_secs: Option<i64>) -> Self {
        Self {
            default_secs,
            per_account: BTreeMap::new(),
        }
    }

    pub fn with_account(mut self, account_id: AccountId, min_secs: i64) -> Self {
        self.per_account.insert(account_id, min_secs);
        self
    }
}

impl RetentionPolicy for MinimumRetention {
    fn adjust_cutoff(
        &self,
        account_id: &AccountId,
        _: &DeviceId,
        proposed: i64,
        now: i64,
    ) -> i64 {
        let min_secs = self
            .per_account
            .get(account_id)
            .copied()
            .or(self.default_secs);
        match min_secs {
            Some(min_secs) if min_secs > 0 => proposed.min(now.saturating_sub(min_secs)),
            _ => proposed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetentionRequest {
    pub account_id: AccountId,
    pub device_id: DeviceId,
    pub cutoff: i64,
    /// Also delete events exactly at `cutoff`.
    pub inclusive: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionOutcome {
    /// Exclusive upper bound actually applied; `None` when the device has no
    /// events.
    pub effective_cutoff: Option<i64>,
    /// The bound was lowered to keep the newest event.
    pub clamped: bool,
    pub counted: RecordCount,
    pub deleted: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FutureDeletion {
    pub cutoff: i64,
    pub counted: RecordCount,
    pub deleted: u64,
}

#[derive(Clone, Copy, Debug)]
struct RetentionPlan {
    bound: i64,
    clamped: bool,
}

impl<S: EventStore> EventLog<S> {
    /// Deletes the device's events older than the request's cutoff, never
    /// including its most recent event.
    pub fn delete_old_events(
        &mut self,
        request: &RetentionRequest,
    ) -> Result<RetentionOutcome, StoreError> {
        let Some(plan) = self.plan_retention(request)? else {
            return Ok(RetentionOutcome {
                effective_cutoff: None,
                clamped: false,
                counted: RecordCount::Exact(0),
                deleted: 0,
            });
        };

        let filter = old_events_filter(request, plan.bound);
        let counted = self.count_matching(&filter)?;
        let deleted = if counted == RecordCount::Exact(0) {
            0
        } else {
            self.store.delete(&self.config.event_table, &filter)?
        };

        info!(
            account = %request.account_id,
            device = %request.device_id,
            cutoff = plan.bound,
            clamped = plan.clamped,
            counted = %counted,
            deleted,
            "deleted old events"
        );
        Ok(RetentionOutcome {
            effective_cutoff: Some(plan.bound),
            clamped: plan.clamped,
            counted,
            deleted,
        })
    }

    /// What `delete_old_events` would remove, without removing it.
    pub fn count_old_events(
        &self,
        request: &RetentionRequest,
    ) -> Result<RetentionOutcome, StoreError> {
        let Some(plan) = self.plan_retention(request)? else {
            return Ok(RetentionOutcome {
                effective_cutoff: None,
                clamped: false,
                counted: RecordCount::Exact(0),
                deleted: 0,
            });
        };
        let counted = self.count_matching(&old_events_filter(request, plan.bound))?;
        Ok(RetentionOutcome {
            effective_cutoff: Some(plan.bound),
            clamped: plan.clamped,
            counted,
            deleted: 0,
        })
    }

    /// Deletes the device's events stamped at or after `cutoff`, which must be
    /// more than [`FUTURE_CUTOFF_MARGIN_SECS`] ahead of now.
    pub fn delete_future_events(
        &mut self,
        account_id: &AccountId,
        device_id: &DeviceId,
        cutoff: i64,
    ) -> Result<FutureDeletion, StoreError> {
        let now = self.now_secs();
        if cutoff <= now.saturating_add(FUTURE_CUTOFF_MARGIN_SECS) {
            return Err(StoreError::RetentionPolicyViolation {
                reason: "future cutoff must be more than 60 seconds ahead",
                cutoff,
                now,
            });
        }

        let filter =
            device_scope(account_id, device_id).and(Predicate::ge(Column::Timestamp, cutoff));
        let counted = self.count_matching(&filter)?;
        let deleted = self.store.delete(&self.config.event_table, &filter)?;

        info!(
            account = %account_id,
            device = %device_id,
            cutoff,
            deleted,
            "deleted future events"
        );
        Ok(FutureDeletion {
            cutoff,
            counted,
            deleted,
        })
    }

    fn plan_retention(
        &self,
        request: &RetentionRequest,
    ) -> Result<Option<RetentionPlan>, StoreError> {
        let now = self.now_secs();
        let adjusted = self
            .policy
            .adjust_cutoff(&request.account_id, &request.device_id, request.cutoff, now);
        let candidate = if request.inclusive {
            adjusted.saturating_add(1)
        } else {
            adjusted
        };

        let Some(newest) = self.last_event(&request.account_id, &request.device_id)? else {
            return Ok(None);
        };
        if newest.timestamp() <= candidate {
            if newest.timestamp() < candidate {
                warn!(
                    account = %request.account_id,
                    device = %request.device_id,
                    requested = candidate,
                    newest = newest.timestamp(),
                    "retention cutoff clamped to keep the newest event"
                );
            }
            return Ok(Some(RetentionPlan {
                bound: newest.timestamp(),
                clamped: newest.timestamp() < candidate,
            }));
        }
        Ok(Some(RetentionPlan {
            bound: candidate,
            clamped: false,
        }))
    }
}

fn old_events_filter(request: &RetentionRequest, bound: i64) -> Predicate {
    device_scope(&request.account_id, &request.device_id)
        .and(Predicate::lt(Column::Timestamp, bound))
}
