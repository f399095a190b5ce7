#![forbid(unsafe_code)]

use fleetlog_core::ids::{AccountId, DeviceId};
use fleetlog_core::{EventRecord, FetchPolicy, RecordCount, SelectionCriteria};
use fleetlog_storage::{
    DEFAULT_EVENT_TABLE, EventLog, EventLogConfig, EventStore, FixedClock, MinimumRetention,
    RetentionRequest, SqliteStore, StorageEngine, StoreError,
};
use tempfile::TempDir;

const NOW: i64 = 1_700_000_000;

fn ids() -> (AccountId, DeviceId) {
    (
        AccountId::try_new("acme").expect("account id"),
        DeviceId::try_new("dev-d").expect("device id"),
    )
}

fn open_log(dir: &TempDir) -> EventLog<SqliteStore> {
    let store = SqliteStore::open(dir.path()).expect("open store");
    let mut log = EventLog::new(store, EventLogConfig::default())
        .expect("event log")
        .with_clock(FixedClock(NOW));
    log.store_mut()
        .upsert_block(
            DEFAULT_EVENT_TABLE,
            &[
                EventRecord::new("acme", "dev-d", 100, 1),
                EventRecord::new("acme", "dev-d", 200, 1),
                EventRecord::new("acme", "dev-d", 300, 2),
                EventRecord::new("acme", "dev-e", 50, 1),
            ],
        )
        .expect("seed events");
    log
}

fn remaining(log: &EventLog<SqliteStore>, device: &str) -> Vec<i64> {
    log.ordered_fetch(
        &SelectionCriteria::for_device("acme", device),
        FetchPolicy::unlimited(),
    )
    .expect("fetch")
    .iter()
    .map(EventRecord::timestamp)
    .collect()
}

fn request(cutoff: i64, inclusive: bool) -> RetentionRequest {
    let (account_id, device_id) = ids();
    RetentionRequest {
        account_id,
        device_id,
        cutoff,
        inclusive,
    }
}

#[test]
fn delete_old_below_newest_event() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);

    let outcome = log.delete_old_events(&request(250, false)).expect("delete old");
    assert_eq!(outcome.effective_cutoff, Some(250));
    assert!(!outcome.clamped);
    assert_eq!(outcome.counted, RecordCount::Exact(2));
    assert_eq!(outcome.deleted, 2);
    assert_eq!(remaining(&log, "dev-d"), vec![300]);
    assert_eq!(remaining(&log, "dev-e"), vec![50]);
}

#[test]
fn delete_old_clamps_to_keep_newest_event() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);

    let outcome = log.delete_old_events(&request(350, false)).expect("delete old");
    assert_eq!(outcome.effective_cutoff, Some(300));
    assert!(outcome.clamped);
    assert_eq!(outcome.deleted, 2);
    assert_eq!(remaining(&log, "dev-d"), vec![300]);

    let again = log.delete_old_events(&request(i64::MAX, true)).expect("delete old");
    assert_eq!(again.deleted, 0);
    assert_eq!(remaining(&log, "dev-d"), vec![300]);
}

#[test]
fn inclusive_cutoff_removes_events_at_cutoff() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);

    let exclusive = log.count_old_events(&request(200, false)).expect("dry run");
    assert_eq!(exclusive.counted, RecordCount::Exact(1));
    assert_eq!(exclusive.deleted, 0);

    let outcome = log.delete_old_events(&request(200, true)).expect("delete old");
    assert_eq!(outcome.effective_cutoff, Some(201));
    assert_eq!(outcome.deleted, 2);
    assert_eq!(remaining(&log, "dev-d"), vec![300]);
}

#[test]
fn delete_old_on_empty_device_is_a_no_op() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);
    let (account_id, _) = ids();

    let outcome = log
        .delete_old_events(&RetentionRequest {
            account_id,
            device_id: DeviceId::try_new("dev-z").expect("device id"),
            cutoff: NOW,
            inclusive: false,
        })
        .expect("delete old");
    assert_eq!(outcome.effective_cutoff, None);
    assert_eq!(outcome.deleted, 0);
}

#[test]
fn account_policy_lowers_cutoff() {
    let dir = TempDir::new().expect("temp dir");
    let (account_id, _) = ids();
    let mut log = open_log(&dir).with_retention_policy(
        MinimumRetention::new(None).with_account(account_id, NOW - 150),
    );

    let outcome = log.delete_old_events(&request(250, false)).expect("delete old");
    assert_eq!(outcome.effective_cutoff, Some(150));
    assert_eq!(outcome.deleted, 1);
    assert_eq!(remaining(&log, "dev-d"), vec![200, 300]);
}

#[test]
fn uncountable_engine_still_deletes() {
    let dir = TempDir::new().expect("temp dir");
    let mut store = SqliteStore::open(dir.path()).expect("open store");
    store
        .convert_engine(StorageEngine::Transactional)
        .expect("convert engine");
    let store = store.with_transactional_count(false);
    let mut log = EventLog::new(store, EventLogConfig::default())
        .expect("event log")
        .with_clock(FixedClock(NOW));
    log.store_mut()
        .upsert_block(
            DEFAULT_EVENT_TABLE,
            &[
                EventRecord::new("acme", "dev-d", 100, 1),
                EventRecord::new("acme", "dev-d", 300, 2),
            ],
        )
        .expect("seed events");

    let outcome = log.delete_old_events(&request(250, false)).expect("delete old");
    assert_eq!(outcome.counted, RecordCount::Unavailable);
    assert_eq!(outcome.deleted, 1);
    assert_eq!(remaining(&log, "dev-d"), vec![300]);
}

#[test]
fn delete_future_requires_margin() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);
    let (account_id, device_id) = ids();

    for cutoff in [NOW - 10, NOW, NOW + 30, NOW + 60] {
        let err = log
            .delete_future_events(&account_id, &device_id, cutoff)
            .expect_err("cutoff too close");
        match err {
            StoreError::RetentionPolicyViolation { cutoff: got, now, .. } => {
                assert_eq!(got, cutoff);
                assert_eq!(now, NOW);
            }
            other => panic!("expected RetentionPolicyViolation, got {other:?}"),
        }
    }
    assert_eq!(remaining(&log, "dev-d"), vec![100, 200, 300]);
}

#[test]
fn delete_future_removes_only_skewed_events() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);
    let (account_id, device_id) = ids();
    log.store_mut()
        .upsert_block(
            DEFAULT_EVENT_TABLE,
            &[
                EventRecord::new("acme", "dev-d", NOW + 3600, 1),
                EventRecord::new("acme", "dev-d", NOW + 7200, 1),
                EventRecord::new("acme", "dev-e", NOW + 7200, 1),
            ],
        )
        .expect("seed future events");

    let outcome = log
        .delete_future_events(&account_id, &device_id, NOW + 61)
        .expect("delete future");
    assert_eq!(outcome.counted, RecordCount::Exact(2));
    assert_eq!(outcome.deleted, 2);
    assert_eq!(remaining(&log, "dev-d"), vec![100, 200, 300]);
    assert_eq!(remaining(&log, "dev-e"), vec![50, NOW + 7200]);
}
