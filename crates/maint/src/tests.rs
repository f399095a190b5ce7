#![forbid(unsafe_code)]

use super::*;
use fleetlog_core::EventRecord;
use fleetlog_storage::DEFAULT_EVENT_TABLE;
use tempfile::TempDir;

fn parse(extra: &[&str]) -> Result<MaintArgs, clap::Error> {
    let mut argv = vec!["fleetlog_maint"];
    argv.extend_from_slice(extra);
    MaintArgs::try_parse_from(argv)
}

fn args_in(dir: &TempDir, extra: &[&str]) -> MaintArgs {
    let storage_dir = dir.path().to_str().expect("utf-8 temp path");
    let mut argv = vec!["--storage-dir", storage_dir];
    argv.extend_from_slice(extra);
    parse(&argv).expect("valid args")
}

fn seed(dir: &TempDir, records: &[EventRecord]) {
    let mut store = SqliteStore::open(dir.path()).expect("open store");
    store
        .ensure_event_table(DEFAULT_EVENT_TABLE)
        .expect("live table");
    store
        .upsert_block(DEFAULT_EVENT_TABLE, records)
        .expect("seed events");
}

#[test]
fn exactly_one_action_is_required() {
    let none = parse(&[]).expect("parses");
    assert!(none.action().is_err());

    let two = parse(&["--events-per-sec", "1", "--copy-to", "Archive"]).expect("parses");
    assert!(two.action().is_err());

    let one = parse(&["--events-per-sec", "6"]).expect("parses");
    assert_eq!(one.action(), Ok(Action::EventRate { hours: 6 }));
}

#[test]
fn dependent_flags_need_their_action() {
    assert!(parse(&["--confirm-downtime-minutes", "3"]).is_err());
    assert!(parse(&["--account", "acme"]).is_err());
    assert!(parse(&["--copy-to", "Archive", "--device", "dev-d"]).is_err());
    assert!(parse(&["--events-per-sec", "0"]).is_err());
    assert!(parse(&["--convert-engine", "columnar"]).is_err());

    let convert = parse(&[
        "--convert-engine",
        "transactional",
        "--confirm-downtime-minutes",
        "2",
    ])
    .expect("parses");
    assert_eq!(
        convert.action(),
        Ok(Action::ConvertEngine {
            target: StorageEngine::Transactional,
            confirmed_minutes: Some(2),
        })
    );
}

#[test]
fn downtime_estimate_rounds_up() {
    assert_eq!(estimated_downtime_minutes(0), 1);
    assert_eq!(estimated_downtime_minutes(500_000), 1);
    assert_eq!(estimated_downtime_minutes(500_001), 2);
    assert_eq!(estimated_downtime_minutes(2_000_000), 4);
}

#[test]
fn confirmation_must_cover_estimate() {
    assert!(check_confirmation(3, Some(3)).is_ok());
    assert!(matches!(
        check_confirmation(3, Some(2)),
        Err(MaintError::Confirmation {
            required: 3,
            confirmed: 2
        })
    ));
    assert!(matches!(
        check_confirmation(1, None),
        Err(MaintError::Usage(_))
    ));
}

#[test]
fn exit_codes_separate_usage_from_storage_failures() {
    assert_eq!(MaintError::Usage("bad".into()).exit_code(), 1);
    assert_eq!(
        MaintError::Confirmation {
            required: 2,
            confirmed: 1
        }
        .exit_code(),
        1
    );
    assert_eq!(
        MaintError::Store(StoreError::InvalidInput("bad table")).exit_code(),
        1
    );
    assert_eq!(
        MaintError::Store(StoreError::Io(std::io::Error::other("disk gone"))).exit_code(),
        99
    );
}

#[test]
fn reports_event_rate() {
    let dir = TempDir::new().expect("temp dir");
    seed(&dir, &[EventRecord::new("acme", "dev-d", 100, 1)]);
    run(&args_in(&dir, &["--events-per-sec", "24"])).expect("event rate");
    run(&args_in(&dir, &["--events-per-sec", "1", "--json"])).expect("event rate json");
}

#[test]
fn conversion_refuses_short_confirmation() {
    let dir = TempDir::new().expect("temp dir");
    seed(&dir, &[EventRecord::new("acme", "dev-d", 100, 1)]);

    let refused = run(&args_in(
        &dir,
        &["--convert-engine", "transactional", "--confirm-downtime-minutes", "0"],
    ))
    .expect_err("confirmation too short");
    assert_eq!(refused.exit_code(), 1);
    let store = SqliteStore::open(dir.path()).expect("open store");
    assert_eq!(store.engine(), StorageEngine::TableLocking);
    drop(store);

    run(&args_in(
        &dir,
        &["--convert-engine", "transactional", "--confirm-downtime-minutes", "1"],
    ))
    .expect("conversion");
    let store = SqliteStore::open(dir.path()).expect("open store");
    assert_eq!(store.engine(), StorageEngine::Transactional);
}

#[test]
fn copies_one_device_to_destination() {
    let dir = TempDir::new().expect("temp dir");
    seed(
        &dir,
        &[
            EventRecord::new("acme", "dev-d", 100, 1),
            EventRecord::new("acme", "dev-d", 200, 1),
            EventRecord::new("acme", "dev-e", 300, 1),
        ],
    );

    run(&args_in(
        &dir,
        &["--copy-to", "Archive", "--account", "acme", "--device", "dev-d"],
    ))
    .expect("copy");

    let store = SqliteStore::open(dir.path()).expect("open store");
    assert_eq!(
        store.count("Archive", &Predicate::all()).expect("count"),
        2
    );

    let bad = run(&args_in(&dir, &["--copy-to", "Archive", "--account", "bad id"]))
        .expect_err("malformed account");
    assert!(matches!(bad, MaintError::Usage(_)));
}
