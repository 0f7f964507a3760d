#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use futures::FutureExt;
use futures::future::BoxFuture;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use warden_core::ExecRequest;
use warden_core::Session;
use warden_core::ToolCallOutcome;
use warden_core::approval::ApprovalPrompter;
use warden_core::approval::CommandApprovalRequest;
use warden_core::approval::PatchApprovalRequest;
use warden_core::config::Config;
use warden_core::config::ConfigOverrides;
use warden_core::config::ConfigToml;
use warden_core::protocol::ApprovalDecision;
use warden_core::protocol::ApprovalPolicy;
use warden_core::protocol::RiskLevel;
use warden_core::protocol::SandboxKind;

/// Answers with a scripted decision and records every command it was shown.
struct RecordingPrompter {
    decision: ApprovalDecision,
    seen: Mutex<Vec<CommandApprovalRequest>>,
}

impl RecordingPrompter {
    fn new(decision: ApprovalDecision) -> Arc<Self> {
        Arc::new(Self {
            decision,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<CommandApprovalRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl ApprovalPrompter for RecordingPrompter {
    fn request_command_approval<'a>(
        &'a self,
        request: &'a CommandApprovalRequest,
    ) -> BoxFuture<'a, ApprovalDecision> {
        self.seen.lock().unwrap().push(request.clone());
        futures::future::ready(self.decision.clone()).boxed()
    }

    fn request_patch_approval<'a>(
        &'a self,
        _request: &'a PatchApprovalRequest,
    ) -> BoxFuture<'a, ApprovalDecision> {
        futures::future::ready(self.decision.clone()).boxed()
    }
}

fn session(dir: &Path, policy: ApprovalPolicy, prompter: Arc<RecordingPrompter>) -> Session {
    let config = Config::load_from_base_config_with_overrides(
        ConfigToml::default(),
        ConfigOverrides {
            cwd: Some(dir.to_path_buf()),
            approval_policy: Some(policy),
            ..Default::default()
        },
        dir.to_path_buf(),
    )
    .unwrap();
    Session::new(config, prompter).with_sandbox(SandboxKind::None)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[tokio::test]
async fn approved_for_session_skips_the_second_prompt() {
    let dir = TempDir::new().unwrap();
    let prompter = RecordingPrompter::new(ApprovalDecision::ApprovedForSession);
    let session = session(dir.path(), ApprovalPolicy::AlwaysAsk, prompter.clone());
    let command = strings(&["git", "status"]);

    let first = session
        .approval_gate()
        .check_command(&command, dir.path())
        .await;
    let second = session
        .approval_gate()
        .check_command(&command, dir.path())
        .await;

    assert_eq!(first, ApprovalDecision::ApprovedForSession);
    assert_eq!(second, ApprovalDecision::ApprovedForSession);
    assert_eq!(prompter.seen().len(), 1);
}

#[tokio::test]
async fn prompt_carries_command_and_risk() {
    let dir = TempDir::new().unwrap();
    let prompter = RecordingPrompter::new(ApprovalDecision::Denied {
        reason: "declined".to_string(),
    });
    let session = session(dir.path(), ApprovalPolicy::FullAuto, prompter.clone());

    let outcome = session
        .run_exec(
            &ExecRequest::new(strings(&["rm", "-rf", "/"])),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(
        outcome,
        ToolCallOutcome::Rejected {
            reason: "declined".to_string()
        }
    );
    let seen = prompter.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].command, strings(&["rm", "-rf", "/"]));
    assert_eq!(seen[0].risk.level, RiskLevel::High);
    assert!(!seen[0].risk.issues.is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn full_auto_runs_read_only_commands_without_asking() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("only.txt"), "").unwrap();
    let prompter = RecordingPrompter::new(ApprovalDecision::Abort {
        reason: "should not be asked".to_string(),
    });
    let session = session(dir.path(), ApprovalPolicy::FullAuto, prompter.clone());

    let outcome = session
        .run_exec(&ExecRequest::new(strings(&["ls"])), CancellationToken::new())
        .await;

    let ToolCallOutcome::Completed(output) = outcome else {
        panic!("expected the command to run, got {outcome:?}");
    };
    assert_eq!(output.stdout, "only.txt\n");
    assert!(prompter.seen().is_empty());
}

#[tokio::test]
async fn abort_halts_the_turn() {
    let dir = TempDir::new().unwrap();
    let prompter = RecordingPrompter::new(ApprovalDecision::Abort {
        reason: "stop here".to_string(),
    });
    let session = session(dir.path(), ApprovalPolicy::AlwaysAsk, prompter);

    let outcome = session
        .run_exec(&ExecRequest::new(strings(&["ls"])), CancellationToken::new())
        .await;

    assert_eq!(
        outcome,
        ToolCallOutcome::AbortTurn {
            reason: "stop here".to_string()
        }
    );
}
