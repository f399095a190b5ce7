#![forbid(unsafe_code)]

use super::EventLog;
use super::select::device_scope;
use crate::{EventStore, OrderKey, RowAction, ScanOrder, StoreError};
use fleetlog_core::ids::{AccountId, DeviceId};
use fleetlog_core::{Column, EventRecord, Predicate, SortDirection};
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyReport {
    pub account_id: AccountId,
    pub device_id: DeviceId,
    /// Highest order key already in the destination when the copy started.
    pub start_checkpoint: i64,
    pub end_checkpoint: i64,
    /// Rows upserted, including rows at the start checkpoint that were
    /// already present.
    pub copied: u64,
    pub blocks: u64,
}

impl<S: EventStore> EventLog<S> {
    /// Copies one device's events from the live table into `destination`.
    ///
    /// The checkpoint is recomputed from the destination on every call, so a
    /// copy interrupted mid-way resumes where the destination left off. The
    /// first block starts at the checkpoint itself; later blocks start after
    /// the last copied row in `(key, timestamp, status_code)` order, so rows
    /// sharing one key value are paged through rather than cut off.
    pub fn copy_device_events(
        &mut self,
        account_id: &AccountId,
        device_id: &DeviceId,
        destination: &str,
    ) -> Result<CopyReport, StoreError> {
        if destination == self.config.event_table {
            return Err(StoreError::InvalidInput(
                "destination must differ from the live event table",
            ));
        }
        self.store.ensure_event_table(destination)?;

        let key = self.config.migration_order_key;
        let block_size = self.config.migration_block_size;
        let scope = device_scope(account_id, device_id);
        let start_checkpoint = self
            .store
            .max_order_key(destination, &scope, key)?
            .unwrap_or(0);

        let mut report = CopyReport {
            account_id: account_id.clone(),
            device_id: device_id.clone(),
            start_checkpoint,
            end_checkpoint: start_checkpoint,
            copied: 0,
            blocks: 0,
        };
        let mut cursor = Predicate::ge(key.column(), start_checkpoint);
        loop {
            let filter = scope.clone().and(cursor);
            let mut block = Vec::with_capacity(block_size.min(4096));
            self.gated_scan(
                &self.config.event_table,
                &filter,
                ScanOrder {
                    key,
                    direction: SortDirection::Ascending,
                },
                Some(block_size as u64),
                &mut |record| {
                    block.push(record);
                    RowAction::Continue
                },
            )?;
            let Some(last) = block.last() else {
                break;
            };

            let copied = self.store.upsert_block(destination, &block)?;
            let from = report.end_checkpoint;
            report.end_checkpoint = key.value_of(last);
            report.copied += copied as u64;
            report.blocks += 1;
            debug!(
                account = %account_id,
                device = %device_id,
                block = report.blocks,
                rows = copied,
                from,
                to = report.end_checkpoint,
                "copied event block"
            );

            if block.len() < block_size {
                break;
            }
            cursor = rows_after(key, last);
        }

        info!(
            account = %account_id,
            device = %device_id,
            copied = report.copied,
            blocks = report.blocks,
            checkpoint = report.end_checkpoint,
            "device copy complete"
        );
        Ok(report)
    }

    /// Copies every device of one account. A stored device id that cannot be
    /// addressed fails the copy instead of being left behind.
    pub fn copy_account_events(
        &mut self,
        account_id: &AccountId,
        destination: &str,
    ) -> Result<Vec<CopyReport>, StoreError> {
        let devices = self
            .store
            .distinct_devices(&self.config.event_table, account_id.as_str())?;
        let mut reports = Vec::with_capacity(devices.len());
        for device in devices {
            let device_id = DeviceId::try_new(device.as_str()).map_err(|err| {
                StoreError::InvalidId {
                    id: device,
                    reason: err.message(),
                }
            })?;
            reports.push(self.copy_device_events(account_id, &device_id, destination)?);
        }
        Ok(reports)
    }

    pub fn copy_all_events(&mut self, destination: &str) -> Result<Vec<CopyReport>, StoreError> {
        let accounts = self.store.distinct_accounts(&self.config.event_table)?;
        let mut reports = Vec::new();
        for account in accounts {
            let account_id = AccountId::try_new(account.as_str()).map_err(|err| {
                StoreError::InvalidId {
                    id: account,
                    reason: err.message(),
                }
            })?;
            reports.extend(self.copy_account_events(&account_id, destination)?);
        }
        Ok(reports)
    }
}

/// Rows strictly after `record` in `(key, timestamp, status_code)` order.
/// Every column involved is an integer, so `> n` is written `>= n + 1`.
fn rows_after(key: OrderKey, record: &EventRecord) -> Predicate {
    let timestamp = record.timestamp();
    let same_second = Predicate::Or(vec![
        Predicate::ge(Column::Timestamp, timestamp.saturating_add(1)),
        Predicate::eq(Column::Timestamp, timestamp).and(Predicate::ge(
            Column::StatusCode,
            i64::from(record.status_code()) + 1,
        )),
    ]);
    match key {
        OrderKey::Timestamp => same_second,
        OrderKey::CreationTime => Predicate::Or(vec![
            Predicate::ge(Column::CreationTime, record.creation_time.saturating_add(1)),
            Predicate::eq(Column::CreationTime, record.creation_time).and(same_second),
        ]),
    }
}
