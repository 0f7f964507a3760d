//! Approval gating for commands and patches.
//!
//! A request is first checked against the session's [`ApprovalStore`]; if
//! every key it touches was approved for the session it runs without asking.
//! Otherwise its risk is assessed and the [`ApprovalPolicy`] decides whether
//! the [`ApprovalPrompter`] has to be consulted.

use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use futures::Future;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;
use warden_apply_patch::ApplyPatchFileChange;
use warden_apply_patch::PatchOperation;
use warden_apply_patch::PatchPlan;
use warden_shell_command::RiskRules;

pub use warden_shell_command::RiskAssessment;

use crate::protocol::ApprovalDecision;
use crate::protocol::ApprovalPolicy;
use crate::protocol::RiskLevel;
use crate::protocol::SandboxPolicy;

/// Keys approved for the rest of the session. Entries are only ever added.
#[derive(Clone, Default, Debug)]
pub struct ApprovalStore {
    // Serialized keys, so commands and paths can share one store.
    approved_for_session: HashSet<String>,
}

impl ApprovalStore {
    pub fn is_approved_for_session<K>(&self, key: &K) -> bool
    where
        K: Serialize,
    {
        serde_json::to_string(key)
            .is_ok_and(|key| self.approved_for_session.contains(&key))
    }

    pub fn approve_for_session<K>(&mut self, key: K)
    where
        K: Serialize,
    {
        if let Ok(key) = serde_json::to_string(&key) {
            self.approved_for_session.insert(key);
        }
    }

    pub fn len(&self) -> usize {
        self.approved_for_session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approved_for_session.is_empty()
    }
}

/// Takes a vector of approval keys and returns a decision. There is one key
/// for a command, and one per touched path for a patch.
///
/// - If every key is already approved for session, `fetch` is not called.
/// - If `fetch` returns `ApprovedForSession`, each key is stored on its own
///   so later requests touching any subset skip prompting.
pub(crate) async fn with_cached_approval<K, F, Fut>(
    store: &Mutex<ApprovalStore>,
    // Name of the tool, for logs.
    tool_name: &str,
    keys: Vec<K>,
    fetch: F,
) -> ApprovalDecision
where
    K: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApprovalDecision>,
{
    if keys.is_empty() {
        return fetch().await;
    }

    let already_approved = {
        let store = store.lock().await;
        keys.iter().all(|key| store.is_approved_for_session(key))
    };
    if already_approved {
        debug!("{tool_name}: approved earlier in this session");
        return ApprovalDecision::ApprovedForSession;
    }

    let decision = fetch().await;
    debug!("{tool_name}: {}", decision.to_opaque_string());

    if matches!(decision, ApprovalDecision::ApprovedForSession) {
        let mut store = store.lock().await;
        for key in keys {
            store.approve_for_session(key);
        }
    }

    decision
}

/// What the gate should do with a request before anything runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalRequirement {
    Skip,
    NeedsApproval { reason: String },
}

pub fn exec_approval_requirement(
    policy: ApprovalPolicy,
    assessment: &RiskAssessment,
) -> ApprovalRequirement {
    match policy {
        ApprovalPolicy::FullAuto if assessment.level < RiskLevel::High => ApprovalRequirement::Skip,
        ApprovalPolicy::FullAuto => ApprovalRequirement::NeedsApproval {
            reason: "high risk command".to_string(),
        },
        ApprovalPolicy::AutoEdit => ApprovalRequirement::NeedsApproval {
            reason: "commands always need approval in auto-edit mode".to_string(),
        },
        ApprovalPolicy::AlwaysAsk => ApprovalRequirement::NeedsApproval {
            reason: "every command needs approval in always-ask mode".to_string(),
        },
    }
}

pub fn patch_approval_requirement(
    policy: ApprovalPolicy,
    assessment: &RiskAssessment,
) -> ApprovalRequirement {
    match policy {
        ApprovalPolicy::FullAuto | ApprovalPolicy::AutoEdit
            if assessment.level < RiskLevel::High =>
        {
            ApprovalRequirement::Skip
        }
        ApprovalPolicy::FullAuto | ApprovalPolicy::AutoEdit => {
            ApprovalRequirement::NeedsApproval {
                reason: "patch writes outside the writable roots".to_string(),
            }
        }
        ApprovalPolicy::AlwaysAsk => ApprovalRequirement::NeedsApproval {
            reason: "every patch needs approval in always-ask mode".to_string(),
        },
    }
}

/// Writes outside the writable roots are high risk, deletions medium, and
/// everything else low. Patch paths resolve against `cwd`; the writable roots
/// are anchored at `sandbox_cwd`.
pub fn assess_patch(
    plan: &PatchPlan,
    sandbox_policy: &SandboxPolicy,
    cwd: &Path,
    sandbox_cwd: &Path,
) -> RiskAssessment {
    let mut level = RiskLevel::Low;
    let mut issues = Vec::new();

    for operation in &plan.operations {
        for path in operation.touched_paths() {
            if !sandbox_policy.is_path_writable(&cwd.join(path), sandbox_cwd) {
                level = RiskLevel::High;
                issues.push(format!(
                    "writes outside the writable roots: {}",
                    path.display()
                ));
            }
        }
        if let PatchOperation::Delete { path } = operation {
            level = level.max(RiskLevel::Medium);
            issues.push(format!("deletes {}", path.display()));
        }
    }

    RiskAssessment { level, issues }
}

/// Shell-quoted rendering of `command` for prompts and logs.
pub fn format_command_for_display(command: &[String]) -> String {
    shlex::try_join(command.iter().map(String::as_str)).unwrap_or_else(|_| command.join(" "))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApprovalRequest {
    pub command: Vec<String>,
    pub cwd: PathBuf,
    pub risk: RiskAssessment,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchApprovalRequest {
    pub cwd: PathBuf,
    /// Per-file preview, in patch order. Paths are as written in the patch.
    pub changes: Vec<(PathBuf, ApplyPatchFileChange)>,
    pub risk: RiskAssessment,
    pub reason: String,
}

/// Asks a human (or a stand-in) about a request.
pub trait ApprovalPrompter: Send + Sync {
    fn request_command_approval<'a>(
        &'a self,
        request: &'a CommandApprovalRequest,
    ) -> BoxFuture<'a, ApprovalDecision>;

    fn request_patch_approval<'a>(
        &'a self,
        request: &'a PatchApprovalRequest,
    ) -> BoxFuture<'a, ApprovalDecision>;
}

/// Borrowed view of everything needed to decide on one request.
pub struct ApprovalGate<'a> {
    pub policy: ApprovalPolicy,
    pub risk_rules: &'a RiskRules,
    pub store: &'a Mutex<ApprovalStore>,
    pub prompter: &'a dyn ApprovalPrompter,
}

impl ApprovalGate<'_> {
    pub async fn check_command(&self, command: &[String], cwd: &Path) -> ApprovalDecision {
        with_cached_approval(self.store, "exec", vec![command.to_vec()], || async {
            let risk = self.risk_rules.assess(command);
            debug!(
                "risk of `{}`: {} {:?}",
                format_command_for_display(command),
                risk.level,
                risk.issues
            );
            match exec_approval_requirement(self.policy, &risk) {
                ApprovalRequirement::Skip => ApprovalDecision::Approved,
                ApprovalRequirement::NeedsApproval { reason } => {
                    let request = CommandApprovalRequest {
                        command: command.to_vec(),
                        cwd: cwd.to_path_buf(),
                        risk,
                        reason,
                    };
                    self.prompter.request_command_approval(&request).await
                }
            }
        })
        .await
    }

    /// `changes` is the preview of `plan`; approval keys are the absolute
    /// paths the plan touches.
    pub async fn check_patch(
        &self,
        plan: &PatchPlan,
        changes: Vec<(PathBuf, ApplyPatchFileChange)>,
        cwd: &Path,
        sandbox_policy: &SandboxPolicy,
        sandbox_cwd: &Path,
    ) -> ApprovalDecision {
        let keys: Vec<PathBuf> = plan
            .operations
            .iter()
            .flat_map(PatchOperation::touched_paths)
            .map(|path| cwd.join(path))
            .collect();

        with_cached_approval(self.store, "apply_patch", keys, || async {
            let risk = assess_patch(plan, sandbox_policy, cwd, sandbox_cwd);
            match patch_approval_requirement(self.policy, &risk) {
                ApprovalRequirement::Skip => ApprovalDecision::Approved,
                ApprovalRequirement::NeedsApproval { reason } => {
                    let request = PatchApprovalRequest {
                        cwd: cwd.to_path_buf(),
                        changes,
                        risk,
                        reason,
                    };
                    self.prompter.request_patch_approval(&request).await
                }
            }
        })
        .await
    }
}
