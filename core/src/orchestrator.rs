//! One entry point per tool call: approval first, then either the execution
//! dispatcher or the patch applier. Calls on a [`Session`] are serialized so
//! two runs never race on the same tree. Denials come back as outcomes, not
//! errors.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use path_absolutize::Absolutize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use warden_apply_patch::AffectedPaths;
use warden_apply_patch::ApplyPatchError;
use warden_apply_patch::MaybeApplyPatch;
use warden_apply_patch::PatchPlan;
use warden_apply_patch::RealFileAccess;
use warden_apply_patch::SearchReplaceFile;
use warden_apply_patch::apply_plan;
use warden_apply_patch::is_implicit_apply_patch;
use warden_apply_patch::maybe_parse_apply_patch;
use warden_apply_patch::parse_patch;
use warden_apply_patch::preview_plan;
use warden_apply_patch::search_replace_plan;
use warden_apply_patch::search_replace_success_message;
use warden_protocol::models::ExecOutputPayload;

use crate::approval::ApprovalGate;
use crate::approval::ApprovalPrompter;
use crate::approval::ApprovalStore;
use crate::config::Config;
use crate::dispatch::ExecRequest;
use crate::dispatch::dispatch;
use crate::exec::ExecToolCallOutput;
use crate::protocol::ApprovalDecision;
use crate::protocol::SandboxKind;

/// Result of one tool call as seen by the agent loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallOutcome {
    /// The request ran (successfully or not).
    Completed(ExecToolCallOutput),
    /// The user declined; the agent may try something else.
    Rejected { reason: String },
    /// The user asked to stop; the caller must end the current turn.
    AbortTurn { reason: String },
}

impl ToolCallOutcome {
    fn from_denial(decision: ApprovalDecision) -> Option<Self> {
        match decision {
            ApprovalDecision::Approved | ApprovalDecision::ApprovedForSession => None,
            ApprovalDecision::Denied { reason } => Some(ToolCallOutcome::Rejected { reason }),
            ApprovalDecision::Abort { reason } => Some(ToolCallOutcome::AbortTurn { reason }),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ToolCallOutcome::Completed(output) => output.exit_code,
            ToolCallOutcome::Rejected { .. } | ToolCallOutcome::AbortTurn { .. } => 1,
        }
    }

    pub fn to_payload(&self) -> ExecOutputPayload {
        match self {
            ToolCallOutcome::Completed(output) => output.to_payload(),
            ToolCallOutcome::Rejected { reason } => {
                ExecToolCallOutput::failure(format!("rejected by user: {reason}")).to_payload()
            }
            ToolCallOutcome::AbortTurn { reason } => {
                ExecToolCallOutput::failure(format!("aborted by user: {reason}")).to_payload()
            }
        }
    }
}

/// Per-run state: configuration, the selected sandbox and everything the
/// user approved so far.
pub struct Session {
    config: Config,
    sandbox: SandboxKind,
    approvals: Mutex<ApprovalStore>,
    prompter: Arc<dyn ApprovalPrompter>,
    turn_lock: Mutex<()>,
}

impl Session {
    pub fn new(config: Config, prompter: Arc<dyn ApprovalPrompter>) -> Self {
        let sandbox = config.sandbox_kind();
        info!("session rooted at {} using sandbox {sandbox}", config.cwd.display());
        Self {
            config,
            sandbox,
            approvals: Mutex::new(ApprovalStore::default()),
            prompter,
            turn_lock: Mutex::new(()),
        }
    }

    /// Replaces the sandbox picked from the config.
    pub fn with_sandbox(mut self, sandbox: SandboxKind) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sandbox(&self) -> SandboxKind {
        self.sandbox
    }

    pub fn approval_gate(&self) -> ApprovalGate<'_> {
        ApprovalGate {
            policy: self.config.approval_policy,
            risk_rules: &self.config.risk_rules,
            store: &self.approvals,
            prompter: self.prompter.as_ref(),
        }
    }

    /// Runs a command. `apply_patch` invocations (direct or heredoc) are
    /// routed to the patch applier instead of a shell.
    pub async fn run_exec(&self, request: &ExecRequest, cancel: CancellationToken) -> ToolCallOutcome {
        let _turn = self.turn_lock.lock().await;
        let started = Instant::now();
        let cwd = self.resolve(request.cwd.as_deref());

        match maybe_parse_apply_patch(&request.command) {
            MaybeApplyPatch::Body(args) => {
                let cwd = match args.workdir.as_deref() {
                    Some(workdir) => resolve_against(Path::new(workdir), &cwd),
                    None => cwd,
                };
                debug!("intercepted apply_patch in {}", cwd.display());
                return self
                    .gate_and_apply(PatchPlan::from_hunks(args.hunks), &cwd, started, |affected| {
                        affected.summary()
                    })
                    .await;
            }
            MaybeApplyPatch::PatchParseError(err) => {
                return patch_failure(ApplyPatchError::from(err), started);
            }
            MaybeApplyPatch::ShellParseError(err) => {
                warn!("could not inspect shell script for apply_patch: {err}");
            }
            MaybeApplyPatch::NotApplyPatch => {}
        }

        if is_implicit_apply_patch(&request.command) {
            return patch_failure(ApplyPatchError::ImplicitInvocation, started);
        }

        let decision = self
            .approval_gate()
            .check_command(&request.command, &cwd)
            .await;
        if let Some(outcome) = ToolCallOutcome::from_denial(decision) {
            return outcome;
        }

        ToolCallOutcome::Completed(dispatch(request, self.sandbox, &self.config, cancel).await)
    }

    /// Applies a `*** Begin Patch` patch relative to `cwd` (or the session
    /// root).
    pub async fn apply_patch(&self, patch: &str, cwd: Option<&Path>) -> ToolCallOutcome {
        let _turn = self.turn_lock.lock().await;
        let started = Instant::now();
        let cwd = self.resolve(cwd);

        let args = match parse_patch(patch) {
            Ok(args) => args,
            Err(err) => return patch_failure(err.into(), started),
        };
        self.gate_and_apply(PatchPlan::from_hunks(args.hunks), &cwd, started, |affected| {
            affected.summary()
        })
        .await
    }

    /// Applies SEARCH/REPLACE diffs for one or more files as a single batch.
    pub async fn apply_search_replace(
        &self,
        files: &[SearchReplaceFile],
        cwd: Option<&Path>,
    ) -> ToolCallOutcome {
        let _turn = self.turn_lock.lock().await;
        let started = Instant::now();
        let cwd = self.resolve(cwd);

        let plan = match search_replace_plan(files) {
            Ok(plan) => plan,
            Err(err) => return patch_failure(err, started),
        };
        let count = plan.search_replace_count();
        self.gate_and_apply(plan, &cwd, started, |_| {
            search_replace_success_message(count)
        })
        .await
    }

    async fn gate_and_apply(
        &self,
        plan: PatchPlan,
        cwd: &Path,
        started: Instant,
        success_message: impl FnOnce(&AffectedPaths) -> String,
    ) -> ToolCallOutcome {
        let mut fs = RealFileAccess::new(cwd);
        let changes = match preview_plan(&plan, &fs) {
            Ok(changes) => changes,
            Err(err) => return patch_failure(err, started),
        };

        let decision = self
            .approval_gate()
            .check_patch(
                &plan,
                changes,
                cwd,
                &self.config.sandbox_policy,
                &self.config.cwd,
            )
            .await;
        if let Some(outcome) = ToolCallOutcome::from_denial(decision) {
            return outcome;
        }

        match apply_plan(&plan, &mut fs) {
            Ok(affected) => {
                let message = success_message(&affected);
                ToolCallOutcome::Completed(ExecToolCallOutput {
                    exit_code: 0,
                    stdout: message.clone(),
                    aggregated_output: message,
                    duration: started.elapsed(),
                    ..Default::default()
                })
            }
            Err(err) => patch_failure(err, started),
        }
    }

    fn resolve(&self, cwd: Option<&Path>) -> PathBuf {
        match cwd {
            Some(path) => resolve_against(path, &self.config.cwd),
            None => self.config.cwd.clone(),
        }
    }
}

fn resolve_against(path: &Path, base: &Path) -> PathBuf {
    path.absolutize_from(base)
        .map(|path| path.into_owned())
        .unwrap_or_else(|_| base.join(path))
}

fn patch_failure(err: ApplyPatchError, started: Instant) -> ToolCallOutcome {
    debug!("patch failed: {err}");
    ToolCallOutcome::Completed(ExecToolCallOutput {
        duration: started.elapsed(),
        ..ExecToolCallOutput::failure(err.to_string())
    })
}
