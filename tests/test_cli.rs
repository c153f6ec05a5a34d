
use assert_cmd::Command;
use fixtures::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn build_logon(manifest: &Path, output: &Path) {
    let mut cmd = Command::new(assert_cmd::cargo_bin!("etwrec_dump"));
    cmd.args([
        "build",
        "-l",
        manifest.to_str().unwrap(),
        "--event-id",
        "301",
        "--version",
        "4",
        "--provider",
        "199FE037-2B82-40A9-82AC-E1D46C792B99",
        "-f",
        "TargetUserName=alice",
        "-f",
        "KeyLength=5",
        "-f",
        "LogonType=2",
        "-f",
        "LogonId=1000",
        "--stack",
        "0x7ff610000000",
        "-o",
        output.to_str().unwrap(),
        "--no-confirm-overwrite",
    ]);
    cmd.assert().success();
}

#[test]
fn it_builds_and_filters_records() {
    ensure_env_logger_initialized();
    let d = tempdir().unwrap();
    let manifest = write_manifest(d.path());
    let records = d.path().join("records.jsonl");

    build_logon(&manifest, &records);
    assert!(fs::read_to_string(&records).unwrap().contains("\"event_id\":301"));

    let mut cmd = Command::new(assert_cmd::cargo_bin!("etwrec_dump"));
    cmd.args([
        "parse",
        records.to_str().unwrap(),
        "-l",
        manifest.to_str().unwrap(),
        "--field-eq",
        "LogonType=2",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""TargetUserName":"alice""#))
        .stdout(predicate::str::contains(r#""event_name":"Logon""#))
        .stdout(predicate::str::contains("0x7ff610000000"));

    let mut cmd = Command::new(assert_cmd::cargo_bin!("etwrec_dump"));
    cmd.args([
        "parse",
        records.to_str().unwrap(),
        "-l",
        manifest.to_str().unwrap(),
        "--field-eq",
        "LogonType=3",
    ]);
    cmd.assert().success().stdout(predicate::str::is_empty());
}

#[test]
fn it_prints_hexdump_of_matching_records() {
    let d = tempdir().unwrap();
    let manifest = write_manifest(d.path());
    let records = d.path().join("records.jsonl");
    build_logon(&manifest, &records);

    let mut cmd = Command::new(assert_cmd::cargo_bin!("etwrec_dump"));
    cmd.args([
        "parse",
        records.to_str().unwrap(),
        "-l",
        manifest.to_str().unwrap(),
        "--contains",
        "TargetUserName=lic",
        "--hexdump",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("event 301 v4"))
        .stdout(predicate::str::contains("00000000: 61 6c 69 63 65 00"));
}

#[test]
fn it_respects_directory_output() {
    let d = tempdir().unwrap();
    let manifest = write_manifest(d.path());
    let f = d.path().to_path_buf();

    let mut cmd = Command::new(assert_cmd::cargo_bin!("etwrec_dump"));
    cmd.args([
        "build",
        "-l",
        manifest.to_str().unwrap(),
        "--event-id",
        "302",
        "-f",
        "LogonId=1",
        "--incomplete",
        "-o",
        f.to_str().unwrap(),
    ]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("refusing to overwrite"));
}

#[test]
fn it_rejects_unknown_fields() {
    let d = tempdir().unwrap();
    let manifest = write_manifest(d.path());

    let mut cmd = Command::new(assert_cmd::cargo_bin!("etwrec_dump"));
    cmd.args([
        "build",
        "-l",
        manifest.to_str().unwrap(),
        "--event-id",
        "301",
        "--version",
        "4",
        "-f",
        "Workstation=DESKTOP",
    ]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("has no field `Workstation`"));
}

#[test]
fn it_refuses_incomplete_records_unless_asked() {
    let d = tempdir().unwrap();
    let manifest = write_manifest(d.path());
    let args = [
        "build",
        "-l",
        manifest.to_str().unwrap(),
        "--event-id",
        "302",
        "-f",
        "LogonId=1",
    ];

    let mut cmd = Command::new(assert_cmd::cargo_bin!("etwrec_dump"));
    cmd.args(args);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("missing field(s): TargetUserName"));

    let mut cmd = Command::new(assert_cmd::cargo_bin!("etwrec_dump"));
    cmd.args(args).arg("--incomplete");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"event_id\":302"));
}
