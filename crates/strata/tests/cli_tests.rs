//! Tests for the strata binary's command surface.
use std::fs;
use std::os::unix::fs::PermissionsExt;

use assert_cmd::Command;
use predicates::prelude::*;

fn strata() -> Command {
    let mut cmd = Command::cargo_bin("strata").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn internal_cp_and_chmod() {
    let temp = tempfile::tempdir().unwrap();
    let src = temp.path().join("hosts");
    let dst = temp.path().join("copy");
    fs::write(&src, "127.0.0.1 localhost\n").unwrap();

    strata()
        .args(["internal", "cp"])
        .arg(&src)
        .arg(&dst)
        .assert()
        .success();

    strata()
        .args(["internal", "chmod", "0o600"])
        .arg(&dst)
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&dst).unwrap(), "127.0.0.1 localhost\n");
    assert_eq!(fs::metadata(&dst).unwrap().permissions().mode() & 0o7777, 0o600);
}

#[test]
fn internal_chmod_rejects_invalid_mode() {
    let temp = tempfile::NamedTempFile::new().unwrap();

    strata()
        .args(["internal", "chmod", "rwxr-xr-x"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid file mode"));
}

#[test]
fn internal_cp_missing_source_fails() {
    let temp = tempfile::tempdir().unwrap();

    strata()
        .args(["internal", "cp"])
        .arg(temp.path().join("absent"))
        .arg(temp.path().join("copy"))
        .assert()
        .failure();
}

#[test]
fn replayed_flags_are_accepted() {
    let temp = tempfile::tempdir().unwrap();
    let lib = temp.path().join("usr/lib");
    fs::create_dir_all(&lib).unwrap();
    fs::write(lib.join("libc.so"), "x").unwrap();
    let output = temp.path().join("artifacts/libs.spdx");

    strata()
        .args([
            "--oci-dir",
            "/b/oci",
            "--roots-dir",
            "/b/roots",
            "--state-dir",
            "/b/state",
            "--storage-type",
            "overlay",
            "--internal-namespace",
            "internal",
            "bom",
        ])
        .arg(&lib)
        .arg(&output)
        .assert()
        .success();

    let doc = fs::read_to_string(&output).unwrap();
    assert!(doc.contains("FileName: ./libc.so"));
}

#[test]
fn inventory_to_stdout() {
    let temp = tempfile::tempdir().unwrap();
    fs::create_dir_all(temp.path().join("a")).unwrap();
    fs::write(temp.path().join("a/file1"), "x").unwrap();
    fs::create_dir_all(temp.path().join("proc/1")).unwrap();
    fs::write(temp.path().join("proc/1/status"), "pid").unwrap();

    strata()
        .arg("inventory")
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"/a/file1\""))
        .stdout(predicate::str::contains(
            "sha256:2d711642b726b04401627ca9fbac32f5c8530fb1903cc4db02258717921a4881",
        ))
        .stdout(predicate::str::contains("/proc/").not());
}

#[test]
fn inventory_to_file() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("root");
    fs::create_dir_all(root.join("etc")).unwrap();
    fs::write(root.join("etc/hostname"), "builder\n").unwrap();
    let output = temp.path().join("inventory.json");

    strata()
        .arg("inventory")
        .arg(&root)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let json: serde_json::Value = serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
    assert_eq!(json["entries"][0]["path"], "/etc/hostname");
    assert_eq!(json["entries"][0]["mode"].as_str().map(str::len), Some(4));
}

#[test]
fn internal_is_hidden_from_help() {
    strata()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("grab"))
        .stdout(predicate::str::contains("layer-artifacts"))
        .stdout(predicate::str::contains("internal").not());
}
