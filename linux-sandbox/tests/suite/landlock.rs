#![cfg(target_os = "linux")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::process::Output;

use assert_cmd::Command;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use warden_protocol::protocol::SandboxPolicy;

/// Directories outside `/tmp`, so the implicit temp-dir writable roots do
/// not cover them.
fn scratch_dir() -> TempDir {
    tempfile::tempdir_in(env!("CARGO_TARGET_TMPDIR")).expect("tempdir")
}

fn run_sandboxed(cwd: &Path, policy: &SandboxPolicy, command: &[&str]) -> Output {
    let policy_json = serde_json::to_string(policy).expect("serialize policy");
    Command::cargo_bin("warden-linux-sandbox")
        .expect("helper binary")
        .current_dir(cwd)
        .env_remove("TMPDIR")
        .arg("--sandbox-policy-cwd")
        .arg(cwd)
        .arg("--sandbox-policy")
        .arg(policy_json)
        .arg("--")
        .args(command)
        .output()
        .expect("run helper")
}

/// Kernels without Landlock (or containers that forbid it) cannot run these
/// tests; the helper refuses to run unsandboxed in that case.
fn landlock_unavailable(output: &Output) -> bool {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr.contains("Landlock") || stderr.contains("seccomp")
}

#[test]
fn writes_inside_cwd_are_allowed() {
    let cwd = scratch_dir();
    let output = run_sandboxed(
        cwd.path(),
        &SandboxPolicy::new_workspace_write_policy(),
        &["bash", "-c", "echo hello > inside.txt"],
    );
    if landlock_unavailable(&output) {
        eprintln!("skipping: Landlock unavailable");
        return;
    }

    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        std::fs::read_to_string(cwd.path().join("inside.txt")).unwrap(),
        "hello\n"
    );
}

#[test]
fn writes_outside_writable_roots_are_denied() {
    let cwd = scratch_dir();
    let forbidden = scratch_dir();
    let target = forbidden.path().join("outside.txt");
    let script = format!("echo nope > {}", target.display());
    let output = run_sandboxed(
        cwd.path(),
        &SandboxPolicy::new_workspace_write_policy(),
        &["bash", "-c", &script],
    );
    if landlock_unavailable(&output) {
        eprintln!("skipping: Landlock unavailable");
        return;
    }

    assert!(!output.status.success());
    assert!(!target.exists());
}

#[test]
fn additional_writable_roots_are_honored() {
    let cwd = scratch_dir();
    let extra = scratch_dir();
    let target = extra.path().join("extra.txt");
    let policy = SandboxPolicy {
        writable_roots: vec![extra.path().to_path_buf()],
        network_access: false,
    };
    let script = format!("echo extra > {}", target.display());
    let output = run_sandboxed(cwd.path(), &policy, &["bash", "-c", &script]);
    if landlock_unavailable(&output) {
        eprintln!("skipping: Landlock unavailable");
        return;
    }

    assert!(output.status.success(), "{output:?}");
    assert_eq!(std::fs::read_to_string(target).unwrap(), "extra\n");
}

#[test]
fn missing_program_exits_127() {
    let cwd = scratch_dir();
    let output = run_sandboxed(
        cwd.path(),
        &SandboxPolicy::new_workspace_write_policy(),
        &["definitely-not-a-real-program-warden"],
    );
    if landlock_unavailable(&output) {
        eprintln!("skipping: Landlock unavailable");
        return;
    }

    assert_eq!(output.status.code(), Some(127));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to execvp"));
}
