#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use warden_core::ExecRequest;
use warden_core::config::Config;
use warden_core::config::ConfigOverrides;
use warden_core::config::ConfigToml;
use warden_core::dispatch;
use warden_core::dispatch::BACKGROUND_UNSUPPORTED_EXIT_CODE;
use warden_core::exec::EXEC_TIMEOUT_EXIT_CODE;
use warden_core::protocol::SandboxKind;

fn config_in(dir: &Path) -> Config {
    Config::load_from_base_config_with_overrides(
        ConfigToml::default(),
        ConfigOverrides {
            cwd: Some(dir.to_path_buf()),
            ..Default::default()
        },
        dir.to_path_buf(),
    )
    .unwrap()
}

#[cfg(unix)]
#[tokio::test]
async fn ls_lists_fixture_files_without_sandbox() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("alpha.txt"), "a").unwrap();
    std::fs::write(dir.path().join("beta.txt"), "b").unwrap();

    let output = dispatch(
        &ExecRequest::new(vec!["ls".to_string()]),
        SandboxKind::None,
        &config_in(dir.path()),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(output.exit_code, 0);
    assert_eq!(output.stdout, "alpha.txt\nbeta.txt\n");
    assert!(!output.timed_out);
    assert!(!output.sandbox_denied);
}

#[tokio::test]
async fn background_is_refused_under_restricted_sandboxes() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("spawned");

    for sandbox in [SandboxKind::MacosSeatbelt, SandboxKind::LinuxLandlock] {
        let request = ExecRequest {
            run_in_background: true,
            ..ExecRequest::new(vec!["touch".to_string(), marker.display().to_string()])
        };
        let output = dispatch(
            &request,
            sandbox,
            &config_in(dir.path()),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(output.exit_code, BACKGROUND_UNSUPPORTED_EXIT_CODE);
        assert!(output.stderr.contains("background execution is not supported"));
        assert_eq!(output.background_pid, None);
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!marker.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn shell_script_with_pipes_runs_through_the_shell() {
    let dir = TempDir::new().unwrap();

    let output = dispatch(
        &ExecRequest::new(vec!["printf 'a\\nb\\n' | wc -l".to_string()]),
        SandboxKind::None,
        &config_in(dir.path()),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(output.exit_code, 0);
    assert_eq!(output.stdout.trim(), "2");
}

#[cfg(unix)]
#[tokio::test]
async fn non_zero_exit_is_reported_not_raised() {
    let dir = TempDir::new().unwrap();

    let output = dispatch(
        &ExecRequest::new(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo oops >&2; exit 3".to_string(),
        ]),
        SandboxKind::None,
        &config_in(dir.path()),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(output.exit_code, 3);
    assert_eq!(output.stderr, "oops\n");
    assert_eq!(output.to_payload().metadata.exit_code, 3);
}

#[cfg(unix)]
#[tokio::test]
async fn cancellation_stops_a_long_command() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let output = dispatch(
        &ExecRequest::new(vec!["sleep".to_string(), "30".to_string()]),
        SandboxKind::None,
        &config_in(dir.path()),
        cancel,
    )
    .await;

    assert_eq!(output.exit_code, EXEC_TIMEOUT_EXIT_CODE);
    assert!(output.timed_out);
    assert!(output.duration < Duration::from_secs(10));
}
