#![forbid(unsafe_code)]

use fleetlog_core::ids::{AccountId, DeviceId};
use fleetlog_core::{
    Column, DeviceFilter, EventRecord, FetchPolicy, Predicate, RecordCount, SelectionCriteria,
    SortDirection,
};
use fleetlog_storage::{
    DEFAULT_EVENT_TABLE, EventLog, EventLogConfig, EventStore, RowAction, SqliteStore,
};
use tempfile::TempDir;

const CODE_A: u32 = 0xF020;
const CODE_B: u32 = 0xF011;

fn open_log(dir: &TempDir) -> EventLog<SqliteStore> {
    let store = SqliteStore::open(dir.path()).expect("open store");
    EventLog::new(store, EventLogConfig::default()).expect("event log")
}

fn seed(log: &mut EventLog<SqliteStore>, records: &[EventRecord]) {
    log.store_mut()
        .upsert_block(DEFAULT_EVENT_TABLE, records)
        .expect("seed events");
}

fn timestamps(records: &[EventRecord]) -> Vec<i64> {
    records.iter().map(EventRecord::timestamp).collect()
}

fn seed_device_d(log: &mut EventLog<SqliteStore>) {
    seed(
        log,
        &[
            EventRecord::new("acme", "dev-d", 300, CODE_B).with_position(39.7, -104.9),
            EventRecord::new("acme", "dev-d", 100, CODE_A).with_position(39.7, -104.9),
            EventRecord::new("acme", "dev-d", 200, CODE_A).with_position(39.7, -104.9),
            EventRecord::new("acme", "dev-e", 150, CODE_A).with_position(40.0, -105.0),
            EventRecord::new("other", "dev-d", 250, CODE_A).with_position(40.0, -105.0),
        ],
    );
}

#[test]
fn range_results_stay_within_bounds() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);
    seed_device_d(&mut log);

    let criteria = SelectionCriteria::for_device("acme", "dev-d").with_range(Some(150), Some(300));
    let events = log
        .ordered_fetch(&criteria, FetchPolicy::unlimited())
        .expect("fetch");
    assert_eq!(timestamps(&events), vec![200, 300]);
    assert!(
        events
            .iter()
            .all(|event| (150..=300).contains(&event.timestamp()))
    );
}

#[test]
fn last_n_is_reverse_of_descending_first_n() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);
    seed_device_d(&mut log);
    let criteria = SelectionCriteria::for_device("acme", "dev-d");

    let last_two = log
        .ordered_fetch(&criteria, FetchPolicy::last(2))
        .expect("last two");
    let mut newest_first = log
        .ordered_fetch(&criteria, FetchPolicy::first(2).descending())
        .expect("descending two");
    assert_eq!(timestamps(&last_two), vec![200, 300]);
    newest_first.reverse();
    assert_eq!(last_two, newest_first);

    let last_two_desc = log
        .ordered_fetch(&criteria, FetchPolicy::last(2).descending())
        .expect("last two descending");
    assert_eq!(timestamps(&last_two_desc), vec![300, 200]);

    let first_two = log
        .ordered_fetch(&criteria, FetchPolicy::first(2))
        .expect("first two");
    assert_eq!(timestamps(&first_two), vec![100, 200]);

    let last_unbounded = log
        .ordered_fetch(&criteria, FetchPolicy::last(0))
        .expect("last unbounded");
    assert_eq!(timestamps(&last_unbounded), vec![100, 200, 300]);
}

#[test]
fn invalid_criteria_yield_empty_not_error() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);
    seed_device_d(&mut log);

    let blank = log
        .ordered_fetch(&SelectionCriteria::for_account(" "), FetchPolicy::unlimited())
        .expect("blank account");
    assert!(blank.is_empty());

    let inverted = log
        .ordered_fetch(
            &SelectionCriteria::for_device("acme", "dev-d").with_range(Some(300), Some(100)),
            FetchPolicy::last(5),
        )
        .expect("inverted range");
    assert!(inverted.is_empty());

    let count = log
        .count_events(&SelectionCriteria::for_account(""))
        .expect("blank count");
    assert_eq!(count, RecordCount::Exact(0));
}

#[test]
fn all_devices_and_status_filters() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);
    seed_device_d(&mut log);

    let mut criteria = SelectionCriteria::for_account("acme");
    assert_eq!(criteria.device, DeviceFilter::All);
    let events = log
        .ordered_fetch(&criteria, FetchPolicy::unlimited())
        .expect("all devices");
    assert_eq!(timestamps(&events), vec![100, 150, 200, 300]);

    criteria = criteria.with_status_codes([CODE_B]);
    let events = log
        .ordered_fetch(&criteria, FetchPolicy::unlimited())
        .expect("status filtered");
    assert_eq!(timestamps(&events), vec![300]);
}

#[test]
fn gps_required_excludes_unlocated_events() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);
    seed(
        &mut log,
        &[
            EventRecord::new("acme", "dev-d", 100, CODE_A),
            EventRecord::new("acme", "dev-d", 200, CODE_A).with_position(39.7, -104.9),
            EventRecord::new("acme", "dev-d", 300, CODE_A).with_cell_position(39.6, -105.1),
            EventRecord::new("acme", "dev-d", 400, CODE_A).with_cell_position(0.0, 0.0),
        ],
    );

    let events = log
        .ordered_fetch(
            &SelectionCriteria::for_device("acme", "dev-d").require_gps(),
            FetchPolicy::unlimited(),
        )
        .expect("gps fetch");
    assert_eq!(timestamps(&events), vec![200, 300]);
}

#[test]
fn extra_predicates_narrow_selection() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);
    seed(
        &mut log,
        &[
            EventRecord::new("acme", "dev-d", 100, CODE_A).with_creation_time(1_000),
            EventRecord::new("acme", "dev-d", 200, CODE_A).with_creation_time(5_000),
        ],
    );

    let criteria = SelectionCriteria::for_device("acme", "dev-d")
        .with_extra(Predicate::ge(Column::CreationTime, 2_000_i64));
    let events = log
        .ordered_fetch(&criteria, FetchPolicy::unlimited())
        .expect("extra predicate");
    assert_eq!(timestamps(&events), vec![200]);
}

#[test]
fn scan_stops_when_consumer_asks() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);
    seed_device_d(&mut log);

    let mut seen = Vec::new();
    log.scan_events(
        &SelectionCriteria::for_device("acme", "dev-d"),
        SortDirection::Descending,
        None,
        |event| {
            seen.push(event.timestamp());
            if seen.len() == 2 {
                RowAction::Stop
            } else {
                RowAction::Continue
            }
        },
    )
    .expect("scan");
    assert_eq!(seen, vec![300, 200]);
}

#[test]
fn last_event_and_counts() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);
    seed_device_d(&mut log);

    let account = AccountId::try_new("acme").expect("account id");
    let device = DeviceId::try_new("dev-d").expect("device id");
    let newest = log
        .last_event(&account, &device)
        .expect("last event")
        .expect("device has events");
    assert_eq!(newest.timestamp(), 300);
    assert_eq!(newest.status_code(), CODE_B);

    let missing = DeviceId::try_new("dev-z").expect("device id");
    assert!(log.last_event(&account, &missing).expect("last event").is_none());

    let count = log
        .count_events(
            &SelectionCriteria::for_device("acme", "dev-d")
                .with_range(Some(0), Some(1000))
                .with_status_codes([CODE_A]),
        )
        .expect("count");
    assert_eq!(count, RecordCount::Exact(2));
}

#[test]
fn payload_round_trips_through_the_store() {
    let dir = TempDir::new().expect("temp dir");
    let mut log = open_log(&dir);
    let record = EventRecord::new("acme", "dev-d", 100, CODE_A)
        .with_position(39.7, -104.9)
        .with_payload(r#"{"speed_kph":62.5,"heading":270}"#);
    seed(&mut log, std::slice::from_ref(&record));

    let events = log
        .ordered_fetch(
            &SelectionCriteria::for_device("acme", "dev-d"),
            FetchPolicy::unlimited(),
        )
        .expect("fetch");
    assert_eq!(events, vec![record]);

    let err = log
        .store_mut()
        .upsert_block(
            DEFAULT_EVENT_TABLE,
            &[EventRecord::new("acme", "dev-d", 200, CODE_A).with_payload("not json")],
        )
        .expect_err("invalid payload");
    assert!(!err.is_storage());
}
