use anidb_identify_test_utils::{TestFileBuilder, TestFiles};
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

/// The binary with a config file that does not exist and no ANIDB_ variables
fn anidb(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("anidb-identify").unwrap();
    cmd.arg("--config")
        .arg(config_dir.join("absent.toml"))
        .env_remove("ANIDB_PROTOCOL__USERNAME")
        .env_remove("ANIDB_PROTOCOL__PASSWORD")
        .env_remove("ANIDB_STORAGE__DATABASE_PATH");
    cmd
}

#[test]
fn test_version() {
    let files = TestFiles::new().unwrap();
    anidb(files.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_hash_prints_ed2k_link() {
    let files = TestFiles::new().unwrap();
    let path = files.add(&TestFileBuilder::new("empty.mkv").size(0)).unwrap();

    anidb(files.path())
        .arg("hash")
        .arg(&path)
        .arg("--no-progress")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "ed2k://|file|empty.mkv|0|31d6cfe0d16ae931b73c59d7e0c089c0|/",
        ));
}

#[test]
fn test_hash_directory_as_json() {
    let files = TestFiles::new().unwrap();
    files.add(&TestFileBuilder::new("ep01.mkv").size(1000)).unwrap();
    files.add(&TestFileBuilder::new("ep02.mkv").size(2000).seed(3)).unwrap();
    files.add(&TestFileBuilder::new("readme.txt").size(10)).unwrap();

    let output = anidb(files.path())
        .arg("hash")
        .arg(files.path())
        .args(["--format", "json", "--no-progress", "-j", "2"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2, "readme.txt is not a media file");
    assert_eq!(entries[0]["size"], 1000);
    assert_eq!(entries[0]["ed2k"].as_str().unwrap().len(), 32);
    assert!(entries[1]["link"].as_str().unwrap().contains("|ep02.mkv|2000|"));
}

#[test]
fn test_hash_missing_path_fails() {
    let files = TestFiles::new().unwrap();
    anidb(files.path())
        .arg("hash")
        .arg(files.path().join("nope.mkv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path not found"));
}

#[test]
fn test_status_on_fresh_database() {
    let files = TestFiles::new().unwrap();
    anidb(files.path())
        .arg("--database")
        .arg(files.path().join("state.db"))
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Packet queue"))
        .stdout(predicate::str::contains("unhashed"))
        .stdout(predicate::str::contains("No identify run recorded"));
}

#[test]
fn test_identify_without_credentials_fails_before_network() {
    let files = TestFiles::new().unwrap();
    let path = files.add(&TestFileBuilder::new("ep01.mkv").size(10)).unwrap();
    anidb(files.path())
        .arg("--database")
        .arg(files.path().join("state.db"))
        .arg("identify")
        .arg(&path)
        .arg("--no-progress")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No AniDB credentials configured"));
}

#[test]
fn test_config_masks_password() {
    let files = TestFiles::new().unwrap();
    anidb(files.path())
        .env("ANIDB_PROTOCOL__PASSWORD", "hunter2")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[protocol]"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn test_viewed_requires_add() {
    let files = TestFiles::new().unwrap();
    anidb(files.path())
        .args(["identify", ".", "--viewed", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--add"));
}
