// Drives the compiled binary's `status` subcommand against a scratch
// state database. No network and no TTY involved.

use assert_cmd::Command;

use skilltest::assessment::ApplicationId;
use skilltest::lock::AttemptLockRegistry;
use skilltest::store::{KvStore, SqliteStore};

fn status(db: &std::path::Path, id: &str) -> String {
    let output = Command::cargo_bin("skilltest")
        .unwrap()
        .env("HOME", db.parent().unwrap())
        .arg("--state-db")
        .arg(db)
        .arg("status")
        .arg(id)
        .output()
        .unwrap();
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn status_of_untouched_application() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");

    assert_eq!(status(&db, "5").trim(), "application 5: not started · timer none");
}

#[test]
fn status_reports_lock_and_bad_timer() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    {
        let store = SqliteStore::open(&db).unwrap();
        AttemptLockRegistry::new(&store).lock(&ApplicationId::from("5"));
        store.set("test_timer_5", "not json").unwrap();
    }

    assert_eq!(status(&db, "5").trim(), "application 5: locked · timer invalid");
}

#[test]
fn status_reports_expired_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    {
        let store = SqliteStore::open(&db).unwrap();
        store
            .set("test_timer_9", r#"{"applicationId":"9","expiresAt":1000}"#)
            .unwrap();
    }

    assert_eq!(status(&db, "9").trim(), "application 9: not started · timer expired");
}
