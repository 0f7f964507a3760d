pub mod config_override;
pub mod debug_sandbox;
pub mod prompter;
pub mod tool_cmd;

use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::ValueEnum;
use warden_core::config::ConfigOverrides;
use warden_core::config::SandboxMode;
use warden_core::protocol::ApprovalPolicy;

pub use config_override::CliConfigOverrides;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum ApprovalModeCliArg {
    /// Ask before every command and every patch.
    AlwaysAsk,
    /// Apply patches inside the writable roots without asking; ask for
    /// every command.
    AutoEdit,
    /// Only ask for high-risk commands and out-of-tree writes.
    FullAuto,
}

impl From<ApprovalModeCliArg> for ApprovalPolicy {
    fn from(value: ApprovalModeCliArg) -> Self {
        match value {
            ApprovalModeCliArg::AlwaysAsk => ApprovalPolicy::AlwaysAsk,
            ApprovalModeCliArg::AutoEdit => ApprovalPolicy::AutoEdit,
            ApprovalModeCliArg::FullAuto => ApprovalPolicy::FullAuto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum SandboxModeCliArg {
    Auto,
    None,
    Seatbelt,
    Landlock,
}

impl From<SandboxModeCliArg> for SandboxMode {
    fn from(value: SandboxModeCliArg) -> Self {
        match value {
            SandboxModeCliArg::Auto => SandboxMode::Auto,
            SandboxModeCliArg::None => SandboxMode::None,
            SandboxModeCliArg::Seatbelt => SandboxMode::Seatbelt,
            SandboxModeCliArg::Landlock => SandboxMode::Landlock,
        }
    }
}

/// Options shared by every subcommand that opens a session.
#[derive(Debug, Clone, Default, Args)]
pub struct SessionArgs {
    /// When to ask before running commands or applying patches.
    #[arg(long = "ask-for-approval", short = 'a', value_enum)]
    pub approval_policy: Option<ApprovalModeCliArg>,

    /// Sandbox for executed commands.
    #[arg(long = "sandbox", short = 's', value_enum)]
    pub sandbox_mode: Option<SandboxModeCliArg>,

    /// Allow outbound network access from sandboxed commands.
    #[arg(long = "network", default_value_t = false)]
    pub network: bool,

    /// Session root. Relative paths and the writable roots resolve against
    /// it. Defaults to the current directory.
    #[arg(long = "cd", short = 'C', value_name = "DIR")]
    pub cwd: Option<PathBuf>,
}

impl SessionArgs {
    pub fn into_overrides(self, linux_sandbox_exe: Option<PathBuf>) -> ConfigOverrides {
        ConfigOverrides {
            cwd: self.cwd,
            approval_policy: self.approval_policy.map(Into::into),
            sandbox_mode: self.sandbox_mode.map(Into::into),
            default_timeout_ms: None,
            network_access: self.network.then_some(true),
            linux_sandbox_exe,
        }
    }
}

/// Run a command under Seatbelt (macOS only).
#[derive(Debug, Parser)]
pub struct SeatbeltCommand {
    #[clap(flatten)]
    pub config_overrides: CliConfigOverrides,

    #[clap(flatten)]
    pub sandbox: SandboxCommandArgs,
}

/// Run a command under Landlock+seccomp (Linux only).
#[derive(Debug, Parser)]
pub struct LandlockCommand {
    #[clap(flatten)]
    pub config_overrides: CliConfigOverrides,

    #[clap(flatten)]
    pub sandbox: SandboxCommandArgs,
}

#[derive(Debug, Clone, Args)]
pub struct SandboxCommandArgs {
    /// Allow outbound network access.
    #[arg(long = "network", default_value_t = false)]
    pub network: bool,

    /// Extra directory the command may write to, on top of the cwd and the
    /// configured roots. May be repeated.
    #[arg(long = "writable-root", value_name = "DIR")]
    pub writable_roots: Vec<PathBuf>,

    /// Full command args to run under the sandbox.
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}
