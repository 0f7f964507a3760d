#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use assert_cmd::Command;
use predicates::str::contains;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tempfile::TempDir;

fn warden(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("warden").unwrap();
    cmd.env("WARDEN_HOME", home).env_remove("RUST_LOG");
    cmd
}

fn payload(stdout: &[u8]) -> Value {
    serde_json::from_slice(stdout).unwrap()
}

#[cfg(unix)]
#[test]
fn exec_prints_json_payload() {
    let home = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();

    let assert = warden(home.path())
        .args(["exec", "-s", "none", "-a", "full-auto", "-C"])
        .arg(work.path())
        .args(["--", "echo", "hello"])
        .assert()
        .success();

    let json = payload(&assert.get_output().stdout);
    assert_eq!(json["output"], "hello\n");
    assert_eq!(json["stdout"], "hello\n");
    assert_eq!(json["metadata"]["exit_code"], 0);
}

#[cfg(unix)]
#[test]
fn exec_exit_code_is_propagated() {
    let home = TempDir::new().unwrap();

    let assert = warden(home.path())
        .args(["exec", "-s", "none", "-a", "full-auto", "--", "sh", "-c", "exit 4"])
        .assert()
        .code(4);

    assert_eq!(payload(&assert.get_output().stdout)["metadata"]["exit_code"], 4);
}

#[test]
fn declined_prompt_rejects_the_command() {
    let home = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let marker = work.path().join("marker");

    warden(home.path())
        .args(["exec", "-s", "none", "-a", "always-ask", "--", "touch"])
        .arg(&marker)
        .write_stdin("n\n")
        .assert()
        .code(1)
        .stdout(contains("rejected by user"))
        .stderr(contains("warden wants to run:"));

    assert!(!marker.exists());
}

#[test]
fn background_is_refused_under_landlock() {
    let home = TempDir::new().unwrap();

    let assert = warden(home.path())
        .args([
            "exec",
            "-s",
            "landlock",
            "-a",
            "full-auto",
            "--background",
            "--",
            "sleep",
            "1",
        ])
        .assert()
        .code(125);

    let json = payload(&assert.get_output().stdout);
    assert!(
        json["stderr"]
            .as_str()
            .unwrap()
            .contains("background execution is not supported")
    );
}

#[test]
fn apply_patch_reads_patch_from_stdin() {
    let home = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();

    let assert = warden(home.path())
        .args(["apply-patch", "-a", "auto-edit", "-C"])
        .arg(work.path())
        .write_stdin("*** Begin Patch\n*** Add File: notes.md\n+# Notes\n*** End Patch\n")
        .assert()
        .success();

    assert_eq!(
        payload(&assert.get_output().stdout)["output"],
        "Success. Updated the following files:\nA notes.md\n"
    );
    assert_eq!(
        std::fs::read_to_string(work.path().join("notes.md")).unwrap(),
        "# Notes\n"
    );
}

#[test]
fn replace_edits_one_file() {
    let home = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    std::fs::write(
        work.path().join("test.js"),
        "console.log(\"hello world\");\n",
    )
    .unwrap();

    let assert = warden(home.path())
        .args(["replace", "-a", "full-auto", "-C"])
        .arg(work.path())
        .args([
            "test.js",
            "------- SEARCH\nconsole.log(\"hello world\");\n=======\nconsole.log(\"Hello, World!\");\n+++++++ REPLACE\n",
        ])
        .assert()
        .success();

    assert_eq!(
        payload(&assert.get_output().stdout)["output"],
        "Successfully applied 1 search/replace operation"
    );
    assert_eq!(
        std::fs::read_to_string(work.path().join("test.js")).unwrap(),
        "console.log(\"Hello, World!\");\n"
    );
}

#[test]
fn replace_all_flag_rewrites_every_occurrence() {
    let home = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    std::fs::write(work.path().join("dup.txt"), "x = 1\ny = x\n").unwrap();

    let assert = warden(home.path())
        .args(["replace", "-a", "full-auto", "--replace-all", "-C"])
        .arg(work.path())
        .args(["dup.txt", "------- SEARCH\nx\n=======\nz\n+++++++ REPLACE\n"])
        .assert()
        .success();

    assert_eq!(
        payload(&assert.get_output().stdout)["output"],
        "Successfully applied 1 search/replace operation"
    );
    assert_eq!(
        std::fs::read_to_string(work.path().join("dup.txt")).unwrap(),
        "z = 1\ny = z\n"
    );
}

#[test]
fn zero_timeout_is_rejected() {
    let home = TempDir::new().unwrap();

    warden(home.path())
        .args(["exec", "--timeout-ms", "0", "--", "ls"])
        .assert()
        .code(2)
        .stderr(contains("invalid value '0'"));
}

#[test]
fn invalid_config_override_is_an_error() {
    let home = TempDir::new().unwrap();

    warden(home.path())
        .args(["-c", "nonsense", "exec", "--", "ls"])
        .assert()
        .failure()
        .stderr(contains("missing '='"));
}
