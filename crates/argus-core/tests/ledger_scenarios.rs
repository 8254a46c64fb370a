use argus_core::{
    Embedding, Frame, Ledger, LedgerPolicy, LedgerUpdate, SimilarityMetric, UnknownLog,
    UnknownLogPolicy,
};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use std::fs;
use tempfile::TempDir;

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 3)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn after(secs: i64) -> NaiveDateTime {
    t0() + TimeDelta::seconds(secs)
}

#[test]
fn test_alice_walkthrough() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::new(dir.path().join("Attendance.csv"), LedgerPolicy::default());
    let read = || fs::read_to_string(ledger.path()).unwrap();

    assert_eq!(ledger.record_detection("ALICE", 72.0, t0()).unwrap(), LedgerUpdate::Appended);
    assert_eq!(
        read(),
        "Name,Timestamp,Confidence\nALICE,2024-06-03 10:00:00,72.00\n"
    );

    assert_eq!(ledger.record_detection("ALICE", 65.0, after(10)).unwrap(), LedgerUpdate::Absorbed);
    assert_eq!(
        read(),
        "Name,Timestamp,Confidence\nALICE,2024-06-03 10:00:00,72.00\n"
    );

    assert_eq!(ledger.record_detection("ALICE", 95.0, after(20)).unwrap(), LedgerUpdate::Improved);
    assert_eq!(
        read(),
        "Name,Timestamp,Confidence\nALICE,2024-06-03 10:00:20,95.00\n"
    );

    assert_eq!(ledger.record_detection("ALICE", 80.0, after(90)).unwrap(), LedgerUpdate::Appended);
    assert_eq!(
        read(),
        "Name,Timestamp,Confidence\n\
         ALICE,2024-06-03 10:00:20,95.00\n\
         ALICE,2024-06-03 10:01:30,80.00\n"
    );
}

#[test]
fn test_only_latest_visit_row_is_updated() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::new(dir.path().join("Attendance.csv"), LedgerPolicy::default());
    let read = || fs::read_to_string(ledger.path()).unwrap();

    ledger.record_detection("ALICE", 72.0, t0()).unwrap();
    ledger.record_detection("ALICE", 95.0, after(20)).unwrap();
    ledger.record_detection("ALICE", 80.0, after(90)).unwrap();
    assert_eq!(
        read(),
        "Name,Timestamp,Confidence\n\
         ALICE,2024-06-03 10:00:20,95.00\n\
         ALICE,2024-06-03 10:01:30,80.00\n"
    );

    // The first row is 80s old and out of the window; only the second is recent.
    assert_eq!(ledger.record_detection("ALICE", 85.0, after(100)).unwrap(), LedgerUpdate::Improved);
    let improved = "Name,Timestamp,Confidence\n\
                    ALICE,2024-06-03 10:00:20,95.00\n\
                    ALICE,2024-06-03 10:01:40,85.00\n";
    assert_eq!(read(), improved);

    assert_eq!(ledger.record_detection("ALICE", 70.0, after(110)).unwrap(), LedgerUpdate::Absorbed);
    assert_eq!(read(), improved);
}

#[test]
fn test_dedup_window_then_second_visit() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::new(dir.path().join("Attendance.csv"), LedgerPolicy::default());

    ledger.record_detection("BOB", 70.0, t0()).unwrap();
    ledger.record_detection("BOB", 70.0, after(30)).unwrap();
    assert_eq!(ledger.rows().unwrap().len(), 1);

    ledger.record_detection("BOB", 70.0, after(61)).unwrap();
    assert_eq!(ledger.rows().unwrap().len(), 2);
}

#[test]
fn test_header_survives_clear_and_reuse() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::new(dir.path().join("Attendance.csv"), LedgerPolicy::default());

    ledger.clear().unwrap();
    ledger.record_detection("CAROL", 88.0, t0()).unwrap();
    ledger.clear().unwrap();
    ledger.clear().unwrap();

    assert_eq!(
        fs::read_to_string(ledger.path()).unwrap(),
        "Name,Timestamp,Confidence\n"
    );
}

#[test]
fn test_unknown_cooldown_and_clustering() {
    let dir = TempDir::new().unwrap();
    let mut log = UnknownLog::new(
        dir.path().join("UnknownLog.csv"),
        dir.path().join("UNKNOWN"),
        UnknownLogPolicy {
            cooldown: TimeDelta::seconds(10),
            metric: SimilarityMetric::euclidean(0.5),
        },
    );
    let frame = Frame::from_pixel(2, 2, image::Rgb([1, 2, 3]));
    let stranger = Embedding::new(vec![0.2, 0.3, 0.4]);
    let lookalike = Embedding::new(vec![0.21, 0.3, 0.41]);
    let other = Embedding::new(vec![0.9, -0.5, 0.0]);

    log.record_unknown(&frame, &stranger, 40.0, t0()).unwrap();
    log.record_unknown(&frame, &lookalike, 41.0, after(3)).unwrap();
    assert_eq!(log.rows().unwrap().len(), 1);
    assert_eq!(fs::read_dir(log.snapshot_dir()).unwrap().count(), 1);

    log.record_unknown(&frame, &other, 42.0, after(4)).unwrap();
    assert_eq!(log.rows().unwrap().len(), 2);

    log.record_unknown(&frame, &lookalike, 43.0, after(15)).unwrap();
    assert_eq!(log.rows().unwrap().len(), 3);
    assert_eq!(fs::read_dir(log.snapshot_dir()).unwrap().count(), 3);
    assert_eq!(log.registry().len(), 2);
}
