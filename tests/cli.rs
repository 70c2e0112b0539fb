use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const CREDENTIAL_VARS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "ELEVENLABS_API_KEY",
    "GENERATION_API_KEY",
    "TIKTOK_ACCESS_TOKEN",
    "INSTAGRAM_USER_ID",
    "INSTAGRAM_ACCESS_TOKEN",
];

/// A project directory with a settings file rooted at itself
fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let settings = format!("paths:\n  root: {}\n", dir.path().display());
    std::fs::write(dir.path().join("wotd.yaml"), settings).unwrap();
    dir
}

fn wotd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("wotd").unwrap();
    cmd.current_dir(dir).env_remove("WOTD_CONFIG").arg("--quiet");
    for var in CREDENTIAL_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("wotd")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("approve"))
        .stdout(predicate::str::contains("platforms"));
}

#[test]
fn replay_without_checkpoint_fails_fast() {
    let dir = project();

    wotd(dir.path())
        .args(["run", "--test"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("checkpoint"));

    assert!(!dir.path().join("exports").join("word_of_the_day.mp4").exists());
}

#[test]
fn approve_without_export_fails() {
    let dir = project();

    wotd(dir.path())
        .arg("approve")
        .write_stdin("y\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No exported video found"));

    assert!(!dir.path().join("HANDOVER.md").exists());
}

#[test]
fn platforms_reports_missing_credentials() {
    let dir = project();

    wotd(dir.path())
        .arg("platforms")
        .assert()
        .success()
        .stdout(predicate::str::contains("tiktok - credentials missing"))
        .stdout(predicate::str::contains("instagram - credentials missing"));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    wotd(dir.path())
        .args(["--config", "nope.yaml", "config", "--show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}
