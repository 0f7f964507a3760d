//! Sandbox and approval vocabulary.

use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use path_absolutize::Absolutize;
use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumString;
use tracing::error;

/// Isolation primitive used to run a command. Selected once per process
/// invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SandboxKind {
    /// No sandboxing; the command runs with the caller's privileges.
    None,

    /// macOS `sandbox-exec` with a generated Seatbelt profile.
    MacosSeatbelt,

    /// Linux Landlock (filesystem) plus seccomp (network), applied by the
    /// `warden-linux-sandbox` helper.
    LinuxLandlock,
}

impl SandboxKind {
    pub fn is_restricted(self) -> bool {
        !matches!(self, SandboxKind::None)
    }
}

/// Determines the conditions under which the user is consulted before a
/// command or patch is allowed to run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ApprovalPolicy {
    /// Every command and every patch requires explicit confirmation.
    #[default]
    AlwaysAsk,

    /// Patches are applied without asking; commands always ask.
    AutoEdit,

    /// Low and medium risk requests run unattended; high risk ones ask.
    FullAuto,
}

/// Outcome of an approval request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Run this one request.
    Approved,

    /// Run this request and every identical request for the rest of the
    /// session without asking again.
    ApprovedForSession,

    /// Do not run this request; the agent may continue with something else.
    Denied { reason: String },

    /// Do not run this request and halt the current turn.
    Abort { reason: String },
}

impl ApprovalDecision {
    pub fn is_approved(&self) -> bool {
        matches!(
            self,
            ApprovalDecision::Approved | ApprovalDecision::ApprovedForSession
        )
    }

    /// Returns a variant name without the free-form reason, suitable for logs.
    pub fn to_opaque_string(&self) -> &'static str {
        match self {
            ApprovalDecision::Approved => "approved",
            ApprovalDecision::ApprovedForSession => "approved_for_session",
            ApprovalDecision::Denied { .. } => "denied",
            ApprovalDecision::Abort { .. } => "abort",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Filesystem and network constraints shared by every restricted sandbox
/// strategy. Reads are always allowed everywhere; writes only below the
/// roots returned by [`SandboxPolicy::get_writable_roots_with_cwd`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    /// Additional folders (beyond cwd and the temp dirs) the command may
    /// write to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub writable_roots: Vec<PathBuf>,

    /// When false, outbound network access is blocked.
    #[serde(default)]
    pub network_access: bool,
}

impl FromStr for SandboxPolicy {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

impl SandboxPolicy {
    /// Returns a policy that can write to the current working directory and
    /// the temp dirs only, without network access.
    pub fn new_workspace_write_policy() -> Self {
        Self::default()
    }

    pub fn has_full_network_access(&self) -> bool {
        self.network_access
    }

    /// Returns the absolute writable roots for a command running in `cwd`:
    /// `cwd`, `/tmp` (Unix, if present), `$TMPDIR`, and the configured roots,
    /// in that order and without duplicates.
    pub fn get_writable_roots_with_cwd(&self, cwd: &Path) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = Vec::new();
        let mut push = |path: &Path| match path.absolutize_from(cwd) {
            Ok(absolute) => {
                let absolute = absolute.into_owned();
                if !roots.contains(&absolute) {
                    roots.push(absolute);
                }
            }
            Err(e) => {
                error!("Ignoring invalid writable root {path:?}: {e}");
            }
        };

        push(cwd);

        if cfg!(unix) {
            let slash_tmp = Path::new("/tmp");
            if slash_tmp.is_dir() {
                push(slash_tmp);
            }
        }

        // TMPDIR is per-user on macOS and optional elsewhere; the platform
        // temp dir stands in when it is unset.
        let tmpdir = std::env::var_os("TMPDIR")
            .filter(|tmpdir| !tmpdir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        if !tmpdir.as_os_str().is_empty() {
            push(&tmpdir);
        }

        for root in &self.writable_roots {
            push(root);
        }

        roots
    }

    /// True when `path` (resolved against `cwd`) falls under one of the
    /// writable roots.
    pub fn is_path_writable(&self, path: &Path, cwd: &Path) -> bool {
        let Ok(path) = path.absolutize_from(cwd) else {
            return false;
        };
        self.get_writable_roots_with_cwd(cwd)
            .iter()
            .any(|root| path.starts_with(root))
    }
}
