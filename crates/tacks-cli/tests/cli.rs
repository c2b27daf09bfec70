//! End-to-end CLI checks that never touch the network.

use assert_cmd::Command;
use predicates::prelude::*;

/// A `tk` invocation with a scrubbed environment and a cwd that cannot
/// contain a `.env` file.
fn tk(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tk").expect("binary builds");
    cmd.env_clear().current_dir(dir.path());
    cmd
}

fn full_config(cmd: &mut Command, dir: &tempfile::TempDir) {
    cmd.env("CANVAS_BASE_URL", "https://canvas.test")
        .env("CANVAS_TOKEN", "canvas-secret")
        .env("TRELLO_KEY", "key")
        .env("TRELLO_TOKEN", "trello-secret")
        .env("TRELLO_BOARD_ID", "board-1")
        .env("SYNC_STATE_FILE", dir.path().join("state.json"));
}

#[test]
fn help_lists_all_subcommands() {
    let dir = tempfile::tempdir().expect("tempdir");
    tk(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("courses"))
        .stdout(predicate::str::contains("wipe"));
}

#[test]
fn missing_config_fails_fast_naming_the_variable() {
    let dir = tempfile::tempdir().expect("tempdir");
    tk(&dir)
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("CANVAS_BASE_URL"));
}

#[test]
fn wipe_refuses_wrong_confirmation_before_any_call() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cmd = tk(&dir);
    full_config(&mut cmd, &dir);
    cmd.args(["wipe", "--confirm", "not-the-board"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing to wipe"))
        .stderr(predicate::str::contains("board-1"));
}

#[test]
fn sync_wipe_refuses_missing_confirmation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cmd = tk(&dir);
    full_config(&mut cmd, &dir);
    cmd.args(["sync", "--wipe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing to wipe"));
}
