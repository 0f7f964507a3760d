#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use warden_apply_patch::SearchReplaceFile;
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
use warden_core::protocol::SandboxKind;

struct ApproveAll;

impl ApprovalPrompter for ApproveAll {
    fn request_command_approval<'a>(
        &'a self,
        _request: &'a CommandApprovalRequest,
    ) -> BoxFuture<'a, ApprovalDecision> {
        futures::future::ready(ApprovalDecision::Approved).boxed()
    }

    fn request_patch_approval<'a>(
        &'a self,
        _request: &'a PatchApprovalRequest,
    ) -> BoxFuture<'a, ApprovalDecision> {
        futures::future::ready(ApprovalDecision::Approved).boxed()
    }
}

fn session(dir: &Path) -> Session {
    let config = Config::load_from_base_config_with_overrides(
        ConfigToml::default(),
        ConfigOverrides {
            cwd: Some(dir.to_path_buf()),
            approval_policy: Some(ApprovalPolicy::AutoEdit),
            ..Default::default()
        },
        dir.to_path_buf(),
    )
    .unwrap();
    Session::new(config, Arc::new(ApproveAll)).with_sandbox(SandboxKind::None)
}

fn completed(outcome: ToolCallOutcome) -> warden_core::exec::ExecToolCallOutput {
    match outcome {
        ToolCallOutcome::Completed(output) => output,
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn multi_file_batch_is_all_or_nothing() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    std::fs::write(&a, "alpha\n").unwrap();
    std::fs::write(&b, "beta\n").unwrap();
    let session = session(dir.path());

    let edits = vec![
        SearchReplaceFile::new(
            "a.txt",
            "------- SEARCH\nalpha\n=======\nALPHA\n+++++++ REPLACE\n",
        ),
        SearchReplaceFile::new(
            "b.txt",
            "------- SEARCH\nmissing\n=======\nfound\n+++++++ REPLACE\n",
        ),
    ];
    let output = completed(session.apply_search_replace(&edits, None).await);

    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("b.txt"));
    assert_eq!(std::fs::read(&a).unwrap(), b"alpha\n");
    assert_eq!(std::fs::read(&b).unwrap(), b"beta\n");
}

#[tokio::test]
async fn ambiguous_search_leaves_file_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dup.txt");
    std::fs::write(&path, "x\nx\n").unwrap();
    let session = session(dir.path());

    let edits = vec![SearchReplaceFile::new(
        "dup.txt",
        "<<<<<<< SEARCH\nx\n=======\ny\n>>>>>>> REPLACE\n",
    )];
    let output = completed(session.apply_search_replace(&edits, None).await);

    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("multiple occurrences"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "x\nx\n");
}

#[tokio::test]
async fn replace_all_rewrites_every_occurrence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dup.txt");
    std::fs::write(&path, "x\nx\n").unwrap();
    let session = session(dir.path());

    let edits = vec![
        SearchReplaceFile::new("dup.txt", "------- SEARCH\nx\n=======\ny\n+++++++ REPLACE\n")
            .with_replace_all(true),
    ];
    let output = completed(session.apply_search_replace(&edits, None).await);

    assert_eq!(output.exit_code, 0);
    assert_eq!(
        output.stdout,
        "Successfully applied 1 search/replace operation"
    );
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "y\ny\n");
}

#[tokio::test]
async fn failed_patch_leaves_no_new_directories() {
    let dir = TempDir::new().unwrap();
    let session = session(dir.path());

    let patch = "*** Begin Patch
*** Add File: fresh/nested/x.txt
+new
*** Delete File: missing.txt
*** End Patch";
    let output = completed(session.apply_patch(patch, None).await);

    assert_eq!(output.exit_code, 1);
    assert_eq!(
        output.stderr,
        "Cannot delete missing.txt: file does not exist"
    );
    assert!(!dir.path().join("fresh").exists());
}

#[tokio::test]
async fn context_patch_updates_moves_and_deletes() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("keep.txt"), "one\ntwo\nthree\n").unwrap();
    std::fs::write(dir.path().join("old.txt"), "gone\n").unwrap();
    let session = session(dir.path());

    let patch = "*** Begin Patch
*** Update File: keep.txt
@@
 one
-two
+TWO
 three
*** Delete File: old.txt
*** Add File: new.txt
+fresh
*** End Patch";
    let output = completed(session.apply_patch(patch, None).await);

    assert_eq!(output.exit_code, 0);
    assert_eq!(
        output.stdout,
        "Success. Updated the following files:\nA new.txt\nM keep.txt\nD old.txt\n"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("keep.txt")).unwrap(),
        "one\nTWO\nthree\n"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("new.txt")).unwrap(),
        "fresh\n"
    );
    assert!(!dir.path().join("old.txt").exists());
}

#[tokio::test]
async fn heredoc_invocation_honours_cd_prefix() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let session = session(dir.path());
    let script = "cd sub && apply_patch <<'EOF'\n*** Begin Patch\n*** Add File: inside.txt\n+hello\n*** End Patch\nEOF\n";

    let output = completed(
        session
            .run_exec(
                &ExecRequest::new(vec![
                    "bash".to_string(),
                    "-lc".to_string(),
                    script.to_string(),
                ]),
                CancellationToken::new(),
            )
            .await,
    );

    assert_eq!(output.exit_code, 0);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("sub/inside.txt")).unwrap(),
        "hello\n"
    );
}

#[tokio::test]
async fn invalid_patch_reports_parse_error() {
    let dir = TempDir::new().unwrap();
    let session = session(dir.path());

    let output = completed(session.apply_patch("not a patch", None).await);

    assert_eq!(output.exit_code, 1);
    assert!(!output.stderr.is_empty());
    assert_eq!(output.to_payload().output, output.stderr);
}
