use chrono::{Duration as ChronoDuration, Utc};
use daynews::lock::{read_lock_record, LockPolicy, LockRecord, RunLock};
use daynews::types::DayNewsError;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

fn policy() -> LockPolicy {
    LockPolicy {
        max_age: Duration::from_secs(6 * 3600),
    }
}

fn plant(path: &Path, pid: u32, started_ago: ChronoDuration) {
    let record = LockRecord {
        pid,
        run_id: "planted".to_string(),
        started_at: Utc::now() - started_ago,
    };
    std::fs::write(path, serde_json::to_vec(&record).unwrap()).unwrap();
}

#[test]
fn test_acquire_writes_record_and_release_removes_it() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("locks").join("daynews.lock");
    let run_id = Uuid::new_v4();

    let lock = RunLock::acquire(&path, run_id, policy()).unwrap();
    assert_eq!(lock.path(), path.as_path());

    let record = read_lock_record(&path).unwrap();
    assert_eq!(record.pid, std::process::id());
    assert_eq!(record.run_id, run_id.to_string());

    lock.release().unwrap();
    assert!(!path.exists());
}

#[test]
fn test_second_acquire_is_contended() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("daynews.lock");
    let first = Uuid::new_v4();

    let _held = RunLock::acquire(&path, first, policy()).unwrap();
    let error = RunLock::acquire(&path, Uuid::new_v4(), policy()).unwrap_err();

    match error {
        DayNewsError::LockContended { holder_pid, holder_run, .. } => {
            assert_eq!(holder_pid, Some(std::process::id()));
            assert_eq!(holder_run, Some(first.to_string()));
        }
        other => panic!("expected LockContended, got {:?}", other),
    }
}

#[test]
fn test_drop_releases_lock() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("daynews.lock");

    {
        let _lock = RunLock::acquire(&path, Uuid::new_v4(), policy()).unwrap();
        assert!(path.exists());
    }

    assert!(!path.exists());
    RunLock::acquire(&path, Uuid::new_v4(), policy()).unwrap();
}

#[cfg(unix)]
#[test]
fn test_dead_holder_is_stale() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("daynews.lock");
    plant(&path, 999_999_999, ChronoDuration::minutes(5));

    let run_id = Uuid::new_v4();
    let _lock = RunLock::acquire(&path, run_id, policy()).unwrap();

    assert_eq!(read_lock_record(&path).unwrap().run_id, run_id.to_string());
}

#[test]
fn test_overage_lock_is_stale_even_if_holder_lives() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("daynews.lock");
    plant(&path, std::process::id(), ChronoDuration::hours(7));

    assert!(RunLock::acquire(&path, Uuid::new_v4(), policy()).is_ok());
}

#[test]
fn test_fresh_unreadable_lock_is_respected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("daynews.lock");
    std::fs::write(&path, "{\"pid\": 12").unwrap();

    let error = RunLock::acquire(&path, Uuid::new_v4(), policy()).unwrap_err();

    assert!(matches!(
        error,
        DayNewsError::LockContended { holder_pid: None, .. }
    ));
    assert!(path.exists());
}

#[test]
fn test_release_leaves_foreign_lock_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("daynews.lock");

    let lock = RunLock::acquire(&path, Uuid::new_v4(), policy()).unwrap();
    // Someone else took over the file while we were running
    plant(&path, std::process::id(), ChronoDuration::zero());
    lock.release().unwrap();

    assert_eq!(read_lock_record(&path).unwrap().run_id, "planted");
}
