//! CLI integration tests using assert_cmd.
//!
//! Tests without database: always run (help, arg validation).
//! Tests with database: gated on TEST_DATABASE_URL environment variable.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn riverwatch() -> Command {
    let mut cmd = Command::cargo_bin("riverwatch").unwrap();
    cmd.env_remove("DATABASE_URL")
        .env_remove("TRAINER_BASE_URL")
        .env_remove("TRAINER_TIMEOUT_SECS")
        .env_remove("RIVERWATCH_CONFIG");
    cmd
}

// --- Help and arg validation (no database needed) ---

#[test]
fn help_shows_all_subcommands() {
    riverwatch().arg("--help").assert().success().stdout(
        predicate::str::contains("serve")
            .and(predicate::str::contains("migrate"))
            .and(predicate::str::contains("train"))
            .and(predicate::str::contains("predict"))
            .and(predicate::str::contains("tune"))
            .and(predicate::str::contains("plot")),
    );
}

#[test]
fn help_train_shows_args() {
    riverwatch()
        .args(["train", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--indicator")
                .and(predicate::str::contains("--method"))
                .and(predicate::str::contains("--uid")),
        );
}

#[test]
fn train_rejects_unknown_indicator() {
    riverwatch()
        .args(["train", "--indicator", "turbidity", "--method", "SVM", "--uid", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown indicator"));
}

#[test]
fn tune_rejects_unknown_search_method() {
    riverwatch()
        .args(["tune", "--id", "1", "--method", "grid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown search method"));
}

#[test]
fn predict_requires_model_id() {
    riverwatch()
        .args(["predict", "--indicator", "PH"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--id"));
}

#[test]
fn train_without_database_url_fails() {
    riverwatch()
        .args(["train", "--indicator", "PH", "--method", "SVM", "--uid", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("database"));
}

#[test]
fn invalid_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("riverwatch.toml");
    std::fs::write(&path, "[server]\nport = \"eighty\"\n").unwrap();
    riverwatch()
        .args(["--config", path.to_str().unwrap(), "migrate"])
        .assert()
        .failure();
}

// --- Database-backed commands ---

#[test]
fn migrate_creates_schema() {
    if !common::has_test_db() {
        eprintln!("Skipping: TEST_DATABASE_URL not set");
        return;
    }
    riverwatch()
        .args(["--database-url", &common::test_db_url(), "migrate"])
        .assert()
        .success();
}
