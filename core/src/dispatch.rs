//! Turns an [`ExecRequest`] into a running command: shell wrapping, platform
//! adaptation, background handling and sandbox selection. The public entry
//! point never fails; every error is folded into the returned output.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use path_absolutize::Absolutize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use warden_shell_command::adapt_command;
use warden_shell_command::bash::parse_plain_command;
use warden_shell_command::bash::requires_shell;
use warden_shell_command::shell::default_user_shell;

use crate::background::spawn_background;
use crate::config::Config;
use crate::error::Result;
use crate::error::WardenErr;
use crate::exec::ExecExpiration;
use crate::exec::ExecParams;
use crate::exec::ExecToolCallOutput;
use crate::exec::fold_exec_result;
use crate::exec::process_exec_tool_call;
use crate::protocol::SandboxKind;

/// Exit status reported when a background run is requested under a
/// restricted sandbox. Nothing is spawned in that case.
pub const BACKGROUND_UNSUPPORTED_EXIT_CODE: i32 = 125;

/// A command the agent wants to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecRequest {
    /// argv, or a single shell script string.
    pub command: Vec<String>,
    /// Relative paths resolve against the session cwd.
    pub cwd: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub additional_writable_roots: Vec<PathBuf>,
    pub run_in_background: bool,
}

impl ExecRequest {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            ..Default::default()
        }
    }
}

pub async fn dispatch(
    request: &ExecRequest,
    sandbox: SandboxKind,
    config: &Config,
    cancel: CancellationToken,
) -> ExecToolCallOutput {
    fold_exec_result(try_dispatch(request, sandbox, config, cancel).await)
}

async fn try_dispatch(
    request: &ExecRequest,
    sandbox: SandboxKind,
    config: &Config,
    cancel: CancellationToken,
) -> Result<ExecToolCallOutput> {
    if request
        .command
        .first()
        .is_none_or(|program| program.trim().is_empty())
    {
        return Err(WardenErr::EmptyCommand);
    }

    let cwd = resolve_cwd(request.cwd.as_deref(), &config.cwd)?;
    let command = prepare_command(&request.command);
    let env: HashMap<String, String> = std::env::vars().collect();

    if request.run_in_background {
        if sandbox.is_restricted() {
            debug!("refusing background run under {sandbox}");
            let message = format!(
                "background execution is not supported under the {sandbox} sandbox: \
                 a detached process would escape the sandbox. Rerun without run_in_background."
            );
            return Ok(ExecToolCallOutput {
                exit_code: BACKGROUND_UNSUPPORTED_EXIT_CODE,
                stderr: message.clone(),
                aggregated_output: message,
                sandbox_denied: true,
                ..Default::default()
            });
        }
        return spawn_background(command, cwd, env).await;
    }

    let mut sandbox_policy = config.sandbox_policy.clone();
    sandbox_policy
        .writable_roots
        .extend(request.additional_writable_roots.iter().cloned());

    let timeout_ms = request.timeout_ms.unwrap_or(config.default_timeout_ms);
    let params = ExecParams {
        command,
        cwd,
        expiration: ExecExpiration::new(Duration::from_millis(timeout_ms), cancel),
        env,
        arg0: None,
    };

    process_exec_tool_call(
        params,
        sandbox,
        &sandbox_policy,
        &config.cwd,
        config.linux_sandbox_exe.as_deref(),
    )
    .await
}

/// A single token with shell operators runs through the user's shell; a
/// single plain token is word-split; argv is passed through. Non-shell
/// commands are then adapted to the host platform.
pub(crate) fn prepare_command(command: &[String]) -> Vec<String> {
    if requires_shell(command) {
        let shell = default_user_shell();
        debug!("running through {}: {command:?}", shell.shell_path.display());
        return shell.derive_exec_args(&command[0]);
    }

    let argv = match command {
        [script] => parse_plain_command(script).unwrap_or_else(|| vec![script.clone()]),
        _ => command.to_vec(),
    };
    adapt_command(&argv)
}

fn resolve_cwd(requested: Option<&Path>, session_cwd: &Path) -> Result<PathBuf> {
    let cwd = match requested {
        Some(path) => path
            .absolutize_from(session_cwd)
            .map_err(|source| WardenErr::InvalidCwd {
                path: path.to_path_buf(),
                source,
            })?
            .into_owned(),
        None => session_cwd.to_path_buf(),
    };

    match std::fs::metadata(&cwd) {
        Ok(metadata) if metadata.is_dir() => Ok(cwd),
        Ok(_) => Err(WardenErr::InvalidCwd {
            path: cwd,
            source: io::Error::other("not a directory"),
        }),
        Err(source) => Err(WardenErr::InvalidCwd { path: cwd, source }),
    }
}
