//! End-to-end tests driving the compiled `zpaq` binary against concrete
//! usage scenarios: round trip, dedup, rollback, corruption detection,
//! purge, and password-protected archives.

use std::fs;

use assert_cmd::Command;
use tempfile::tempdir;

fn zpaq() -> Command {
    Command::cargo_bin("zpaq").unwrap()
}

#[test]
fn empty_file_add_then_extract_round_trips() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("a.zpaq");
    let empty = dir.path().join("f");
    fs::write(&empty, b"").unwrap();

    zpaq()
        .args([archive.to_str().unwrap(), "add", empty.to_str().unwrap(), "--date", "20260101000000"])
        .assert()
        .success();

    let out = dir.path().join("out");
    zpaq()
        .args([archive.to_str().unwrap(), "extract", "--dest", out.to_str().unwrap()])
        .assert()
        .success();

    let extracted_path = out.join(empty.file_name().unwrap());
    assert_eq!(fs::read(extracted_path).unwrap(), b"");
}

#[test]
fn adding_a_duplicate_file_does_not_fail_and_both_names_list() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("a.zpaq");
    let a = dir.path().join("a.bin");
    let b = dir.path().join("b.bin");
    let payload = vec![0u8; 1 << 20];
    fs::write(&a, &payload).unwrap();
    fs::write(&b, &payload).unwrap();

    zpaq().args([archive.to_str().unwrap(), "add", a.to_str().unwrap(), "--date", "1"]).assert().success();
    zpaq().args([archive.to_str().unwrap(), "add", b.to_str().unwrap(), "--date", "2"]).assert().success();

    let output = zpaq().args([archive.to_str().unwrap(), "list"]).output().unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("a.bin"));
    assert!(stdout.contains("b.bin"));
}

#[test]
fn rollback_via_until_version_hides_later_versions() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("a.zpaq");
    let x = dir.path().join("x");
    fs::write(&x, b"hello").unwrap();
    zpaq().args([archive.to_str().unwrap(), "add", x.to_str().unwrap(), "--date", "1"]).assert().success();

    fs::write(&x, b"world").unwrap();
    zpaq().args([archive.to_str().unwrap(), "add", x.to_str().unwrap(), "--date", "2"]).assert().success();

    let output = zpaq().args(["--until-version", "1", archive.to_str().unwrap(), "list"]).output().unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("x"));

    let out = dir.path().join("rolled-back");
    zpaq()
        .args(["--until-version", "1", archive.to_str().unwrap(), "extract", "--dest", out.to_str().unwrap()])
        .assert()
        .success();
    let extracted_path = out.join(x.file_name().unwrap());
    assert_eq!(fs::read(extracted_path).unwrap(), b"hello");
}

#[test]
fn test_command_reports_ok_on_an_untouched_archive() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("a.zpaq");
    let f = dir.path().join("f");
    fs::write(&f, b"some content").unwrap();
    zpaq().args([archive.to_str().unwrap(), "add", f.to_str().unwrap(), "--date", "1"]).assert().success();

    zpaq().args([archive.to_str().unwrap(), "test"]).assert().success();
}

#[test]
fn test_command_detects_a_corrupted_data_block() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("a.zpaq");
    let f = dir.path().join("f");
    fs::write(&f, vec![0x42u8; 8192]).unwrap();
    zpaq().args([archive.to_str().unwrap(), "add", f.to_str().unwrap(), "--date", "1"]).assert().success();

    let mut bytes = fs::read(&archive).unwrap();
    let flip_at = bytes.len() - 10;
    bytes[flip_at] ^= 0xFF;
    fs::write(&archive, bytes).unwrap();

    zpaq().args([archive.to_str().unwrap(), "test"]).assert().failure();
}

#[test]
fn purge_produces_an_archive_that_still_lists_surviving_files() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("a.zpaq");
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::write(&a, b"one").unwrap();
    fs::write(&b, b"two").unwrap();
    zpaq().args([archive.to_str().unwrap(), "add", a.to_str().unwrap(), "--date", "1"]).assert().success();
    zpaq().args([archive.to_str().unwrap(), "add", b.to_str().unwrap(), "--date", "2"]).assert().success();

    let purged = dir.path().join("purged.zpaq");
    zpaq().args([archive.to_str().unwrap(), "purge", purged.to_str().unwrap(), "--date", "3"]).assert().success();

    let output = zpaq().args([purged.to_str().unwrap(), "list"]).output().unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("a"));
    assert!(stdout.contains("b"));
}

#[test]
fn delete_hides_a_file_from_list_but_earlier_rollback_still_sees_it() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("a.zpaq");
    let f = dir.path().join("temp.txt");
    fs::write(&f, b"ephemeral").unwrap();

    zpaq().args([archive.to_str().unwrap(), "add", f.to_str().unwrap(), "--date", "1"]).assert().success();
    let recorded_name = f.to_str().unwrap().to_string();
    zpaq().args([archive.to_str().unwrap(), "delete", &recorded_name, "--date", "2"]).assert().success();

    let output = zpaq().args([archive.to_str().unwrap(), "list"]).output().unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(!stdout.contains("temp.txt"));

    let output = zpaq().args(["--until-version", "1", archive.to_str().unwrap(), "list"]).output().unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("temp.txt"));
}

#[test]
fn password_protected_archives_round_trip() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("a.zpaq");
    let f = dir.path().join("secret.txt");
    fs::write(&f, b"classified").unwrap();

    zpaq()
        .args([archive.to_str().unwrap(), "--password", "hunter2", "add", f.to_str().unwrap(), "--date", "1"])
        .assert()
        .success();

    let out = dir.path().join("out");
    zpaq()
        .args([archive.to_str().unwrap(), "--password", "hunter2", "extract", "--dest", out.to_str().unwrap()])
        .assert()
        .success();
    let extracted_path = out.join(f.file_name().unwrap());
    assert_eq!(fs::read(extracted_path).unwrap(), b"classified");

    // Wrong password still decrypts to a byte stream, but it is no longer
    // a valid archive; extraction should not pretend to succeed with the
    // right plaintext.
    let out_wrong = dir.path().join("out-wrong");
    let wrong = zpaq()
        .args([archive.to_str().unwrap(), "--password", "incorrect", "extract", "--dest", out_wrong.to_str().unwrap()])
        .output()
        .unwrap();
    if wrong.status.success() {
        let extracted_path = out_wrong.join(f.file_name().unwrap());
        assert_ne!(fs::read(extracted_path).unwrap_or_default(), b"classified");
    }
}
