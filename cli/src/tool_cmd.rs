//! `warden exec`, `warden apply-patch` and `warden replace`: one tool call
//! each, gated by the interactive prompter, result printed as JSON.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use warden_apply_patch::SearchReplaceFile;
use warden_core::ExecRequest;
use warden_core::Session;
use warden_core::ToolCallOutcome;
use warden_core::config::Config;
use warden_core::models::ExecOutputPayload;

use crate::CliConfigOverrides;
use crate::SessionArgs;
use crate::prompter::TerminalPrompter;

#[derive(Debug, Parser)]
pub struct ExecCommand {
    #[clap(flatten)]
    pub config_overrides: CliConfigOverrides,

    #[clap(flatten)]
    pub session: SessionArgs,

    /// Kill the command after this many milliseconds.
    #[arg(
        long = "timeout-ms",
        value_name = "MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_ms: Option<u64>,

    /// Start the command detached and return its PID. Refused under a
    /// restricted sandbox.
    #[arg(long = "background", default_value_t = false)]
    pub run_in_background: bool,

    /// Extra directory the command may write to. May be repeated.
    #[arg(long = "writable-root", value_name = "DIR")]
    pub writable_roots: Vec<PathBuf>,

    /// Command to run. A single argument containing shell syntax is run
    /// through the user's shell.
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct ApplyPatchCommand {
    #[clap(flatten)]
    pub config_overrides: CliConfigOverrides,

    #[clap(flatten)]
    pub session: SessionArgs,

    /// `*** Begin Patch` text. Read from stdin when omitted or `-`.
    #[arg(value_name = "PATCH")]
    pub patch: Option<String>,
}

#[derive(Debug, Parser)]
pub struct ReplaceCommand {
    #[clap(flatten)]
    pub config_overrides: CliConfigOverrides,

    #[clap(flatten)]
    pub session: SessionArgs,

    /// File to edit, relative to the session root.
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// SEARCH/REPLACE blocks. Read from stdin when omitted or `-`.
    #[arg(value_name = "DIFF")]
    pub diff: Option<String>,

    /// Replace every occurrence of each SEARCH block instead of only the
    /// first.
    #[arg(long = "replace-all", default_value_t = false)]
    pub replace_all: bool,
}

pub async fn run_exec_command(
    cmd: ExecCommand,
    linux_sandbox_exe: Option<PathBuf>,
) -> anyhow::Result<i32> {
    let ExecCommand {
        config_overrides,
        session,
        timeout_ms,
        run_in_background,
        writable_roots,
        command,
    } = cmd;
    let session = open_session(&config_overrides, session, linux_sandbox_exe)?;

    let request = ExecRequest {
        timeout_ms,
        run_in_background,
        additional_writable_roots: writable_roots,
        ..ExecRequest::new(command)
    };
    let outcome = session.run_exec(&request, cancel_on_ctrl_c()).await;
    Ok(report(&outcome))
}

pub async fn run_apply_patch_command(
    cmd: ApplyPatchCommand,
    linux_sandbox_exe: Option<PathBuf>,
) -> anyhow::Result<i32> {
    let patch = arg_or_stdin(cmd.patch)?;
    let session = open_session(&cmd.config_overrides, cmd.session, linux_sandbox_exe)?;

    let outcome = session.apply_patch(&patch, None).await;
    Ok(report(&outcome))
}

pub async fn run_replace_command(
    cmd: ReplaceCommand,
    linux_sandbox_exe: Option<PathBuf>,
) -> anyhow::Result<i32> {
    let diff = arg_or_stdin(cmd.diff)?;
    let session = open_session(&cmd.config_overrides, cmd.session, linux_sandbox_exe)?;

    let file = SearchReplaceFile::new(cmd.path, diff).with_replace_all(cmd.replace_all);
    let outcome = session.apply_search_replace(&[file], None).await;
    Ok(report(&outcome))
}

fn open_session(
    config_overrides: &CliConfigOverrides,
    session: SessionArgs,
    linux_sandbox_exe: Option<PathBuf>,
) -> anyhow::Result<Session> {
    let cli_overrides = config_overrides
        .parse_overrides()
        .map_err(anyhow::Error::msg)?;
    let config =
        Config::load_with_cli_overrides(cli_overrides, session.into_overrides(linux_sandbox_exe))?;
    Ok(Session::new(config, Arc::new(TerminalPrompter::new())))
}

fn arg_or_stdin(arg: Option<String>) -> anyhow::Result<String> {
    match arg {
        Some(text) if text != "-" => Ok(text),
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Cancels the returned token on the first Ctrl-C.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupted; cancelling the running command");
            trigger.cancel();
        }
    });
    cancel
}

fn report(outcome: &ToolCallOutcome) -> i32 {
    if let ToolCallOutcome::AbortTurn { reason } = outcome {
        debug!("turn aborted: {reason}");
    }
    print_payload(&outcome.to_payload())
}

/// Writes the JSON result to stdout and returns the exit code to use.
pub(crate) fn print_payload(payload: &ExecOutputPayload) -> i32 {
    println!("{}", payload.to_json());
    payload.metadata.exit_code
}
