use std::io;
use std::path::PathBuf;

use thiserror::Error;
use warden_apply_patch::ApplyPatchError;
use warden_shell_command::RiskRulesError;

use crate::exec::ExecToolCallOutput;

pub type Result<T> = std::result::Result<T, WardenErr>;

#[derive(Error, Debug)]
pub enum SandboxErr {
    /// The command ran but most likely failed because the sandbox blocked it.
    #[error(
        "sandbox denied exec error, exit code: {}, stdout: {}, stderr: {}",
        .output.exit_code, .output.stdout, .output.stderr
    )]
    Denied { output: Box<ExecToolCallOutput> },

    /// Timed out or cancelled. `output` holds whatever was captured before
    /// the process group was killed.
    #[error("command timed out")]
    Timeout { output: Box<ExecToolCallOutput> },

    /// Killed by a signal other than the one used for timeouts.
    #[error("command was killed by signal {signal}")]
    Signal {
        signal: i32,
        output: Box<ExecToolCallOutput>,
    },

    #[error("seatbelt sandbox is only available on macOS")]
    SeatbeltUnavailable,

    #[error("landlock sandbox is only available on Linux")]
    LandlockUnavailable,

    #[error("missing warden-linux-sandbox executable path")]
    MissingLinuxSandboxExecutable,

    #[error("cannot pass {0} to the sandbox helper")]
    InvalidHelperArgs(String),
}

#[derive(Error, Debug)]
pub enum WardenErr {
    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxErr),

    #[error("command args are empty")]
    EmptyCommand,

    #[error("working directory {} is not accessible: {source}", .path.display())]
    InvalidCwd {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    ApplyPatch(#[from] ApplyPatchError),

    #[error("failed to read {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    RiskRules(#[from] RiskRulesError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
