#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use std::time::Instant;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use warden_protocol::models::ExecOutputMetadata;
use warden_protocol::models::ExecOutputPayload;

use crate::error::Result;
use crate::error::SandboxErr;
use crate::error::WardenErr;
use crate::process_group::kill_child_process_group;
use crate::protocol::SandboxKind;
use crate::protocol::SandboxPolicy;
use crate::sandboxing::CommandSpec;
use crate::sandboxing::ExecEnv;
use crate::sandboxing::SandboxManager;
use crate::sandboxing::SandboxTransformRequest;
use crate::spawn::SpawnChildRequest;
use crate::spawn::StdioPolicy;
use crate::spawn::spawn_child_async;

pub const DEFAULT_EXEC_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// Conventional `timeout(1)` exit status, used for timeouts and cancellation.
pub const EXEC_TIMEOUT_EXIT_CODE: i32 = 124;

const EXIT_CODE_SIGNAL_BASE: i32 = 128; // conventional shell: 128 + signal

const READ_CHUNK_SIZE: usize = 8192;
const AGGREGATE_BUFFER_INITIAL_CAPACITY: usize = 8 * 1024;

/// Hard cap on bytes retained per stream so a runaway command cannot exhaust
/// memory.
const EXEC_OUTPUT_MAX_BYTES: usize = 1024 * 1024; // 1 MiB

/// How long to wait for the output readers after the child is gone.
/// Grandchildren that inherited the pipes can keep them open forever.
const IO_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct ExecParams {
    pub command: Vec<String>,
    pub cwd: PathBuf,
    pub expiration: ExecExpiration,
    pub env: HashMap<String, String>,
    pub arg0: Option<String>,
}

/// Stops an exec invocation when either the timeout elapses or the caller
/// cancels, whichever comes first.
#[derive(Debug, Clone)]
pub struct ExecExpiration {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl ExecExpiration {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    async fn wait(self) -> Expiry {
        tokio::select! {
            _ = tokio::time::sleep(self.timeout) => Expiry::TimedOut(self.timeout),
            _ = self.cancel.cancelled() => Expiry::Cancelled,
        }
    }
}

/// Why a command was stopped before it exited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    TimedOut(Duration),
    Cancelled,
}

impl Expiry {
    fn note(self) -> String {
        match self {
            Expiry::TimedOut(timeout) => {
                format!("command timed out after {} ms", timeout.as_millis())
            }
            Expiry::Cancelled => "command was cancelled".to_string(),
        }
    }
}


/// Result of running one command. Streams are decoded lossily and capped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecToolCallOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub aggregated_output: String,
    pub duration: Duration,
    pub timed_out: bool,
    pub sandbox_denied: bool,
    pub background_pid: Option<u32>,
}

impl ExecToolCallOutput {
    /// Output for a call that never produced a process: exit code 1 with
    /// `message` as stderr.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            exit_code: 1,
            stderr: message.clone(),
            aggregated_output: message,
            ..Default::default()
        }
    }

    pub fn to_payload(&self) -> ExecOutputPayload {
        ExecOutputPayload {
            output: self.aggregated_output.clone(),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            metadata: ExecOutputMetadata {
                exit_code: self.exit_code,
                duration_seconds: self.duration.as_secs_f32(),
                timed_out: self.timed_out,
                background_pid: self.background_pid,
                sandbox_denied: self.sandbox_denied,
            },
        }
    }
}

/// Collapses an exec result into the output reported to the caller. Sandbox
/// errors that carry captured output keep it; every other error becomes a
/// [`ExecToolCallOutput::failure`].
pub fn fold_exec_result(result: Result<ExecToolCallOutput>) -> ExecToolCallOutput {
    match result {
        Ok(output) => output,
        Err(WardenErr::Sandbox(
            SandboxErr::Denied { output }
            | SandboxErr::Timeout { output }
            | SandboxErr::Signal { output, .. },
        )) => *output,
        Err(err) => ExecToolCallOutput::failure(err.to_string()),
    }
}

/// Runs `params.command` under `sandbox`, enforcing `params.expiration`.
///
/// `sandbox_cwd` anchors the policy's writable roots and may differ from the
/// command's own cwd.
pub async fn process_exec_tool_call(
    params: ExecParams,
    sandbox: SandboxKind,
    sandbox_policy: &SandboxPolicy,
    sandbox_cwd: &Path,
    linux_sandbox_exe: Option<&Path>,
) -> Result<ExecToolCallOutput> {
    debug!("sandbox kind: {sandbox}");

    let ExecParams {
        command,
        cwd,
        env,
        expiration,
        arg0,
    } = params;
    let (program, args) = command.split_first().ok_or(WardenErr::EmptyCommand)?;

    let spec = CommandSpec {
        program: program.clone(),
        args: args.to_vec(),
        cwd,
        env,
        expiration,
        arg0,
    };

    let exec_env = SandboxManager::new().transform(SandboxTransformRequest {
        spec,
        policy: sandbox_policy,
        sandbox,
        sandbox_policy_cwd: sandbox_cwd,
        linux_sandbox_exe,
    })?;

    execute_exec_env(exec_env).await
}

pub(crate) async fn execute_exec_env(exec_env: ExecEnv) -> Result<ExecToolCallOutput> {
    let sandbox = exec_env.sandbox;
    let start = Instant::now();
    let raw_output_result = exec(exec_env).await;
    let duration = start.elapsed();
    finalize_exec_result(raw_output_result, sandbox, duration)
}

#[derive(Debug)]
struct RawExecToolCallOutput {
    exit_status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    aggregated_output: Vec<u8>,
    expiry: Option<Expiry>,
}

fn finalize_exec_result(
    raw_output_result: Result<RawExecToolCallOutput>,
    sandbox: SandboxKind,
    duration: Duration,
) -> Result<ExecToolCallOutput> {
    let raw_output = match raw_output_result {
        Ok(raw_output) => raw_output,
        Err(err) => {
            error!("exec error: {err}");
            return Err(err);
        }
    };

    let mut exec_output = ExecToolCallOutput {
        exit_code: raw_output.exit_status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&raw_output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&raw_output.stderr).into_owned(),
        aggregated_output: String::from_utf8_lossy(&raw_output.aggregated_output).into_owned(),
        duration,
        ..Default::default()
    };

    if let Some(expiry) = raw_output.expiry {
        exec_output.exit_code = EXEC_TIMEOUT_EXIT_CODE;
        exec_output.timed_out = true;
        append_note(&mut exec_output, &expiry.note());
        return Err(SandboxErr::Timeout {
            output: Box::new(exec_output),
        }
        .into());
    }

    #[cfg(unix)]
    {
        if let Some(signal) = raw_output.exit_status.signal() {
            exec_output.exit_code = EXIT_CODE_SIGNAL_BASE + signal;
            append_note(
                &mut exec_output,
                &format!("command was killed by signal {signal}"),
            );
            exec_output.sandbox_denied = is_likely_sandbox_denied(sandbox, &exec_output);
            return Err(SandboxErr::Signal {
                signal,
                output: Box::new(exec_output),
            }
            .into());
        }
    }

    if is_likely_sandbox_denied(sandbox, &exec_output) {
        exec_output.sandbox_denied = true;
        return Err(SandboxErr::Denied {
            output: Box::new(exec_output),
        }
        .into());
    }

    Ok(exec_output)
}

fn append_note(output: &mut ExecToolCallOutput, note: &str) {
    for text in [&mut output.stderr, &mut output.aggregated_output] {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(note);
        text.push('\n');
    }
}

/// There is no deterministic way to tell that a command failed because of
/// the sandbox, so look for well known denial messages and exit codes.
pub(crate) fn is_likely_sandbox_denied(
    sandbox: SandboxKind,
    exec_output: &ExecToolCallOutput,
) -> bool {
    if !sandbox.is_restricted() || exec_output.exit_code == 0 {
        return false;
    }

    const SANDBOX_DENIED_KEYWORDS: [&str; 6] = [
        "operation not permitted",
        "permission denied",
        "read-only file system",
        "seccomp",
        "sandbox",
        "landlock",
    ];

    let has_sandbox_keyword = [
        &exec_output.stderr,
        &exec_output.stdout,
        &exec_output.aggregated_output,
    ]
    .into_iter()
    .any(|section| {
        let lower = section.to_lowercase();
        SANDBOX_DENIED_KEYWORDS
            .iter()
            .any(|needle| lower.contains(needle))
    });
    if has_sandbox_keyword {
        return true;
    }

    // 2: misuse of shell builtins, 126: not executable, 127: not found.
    const QUICK_REJECT_EXIT_CODES: [i32; 3] = [2, 126, 127];
    if QUICK_REJECT_EXIT_CODES.contains(&exec_output.exit_code) {
        return false;
    }

    #[cfg(unix)]
    {
        if sandbox == SandboxKind::LinuxLandlock
            && exec_output.exit_code == EXIT_CODE_SIGNAL_BASE + libc::SIGSYS
        {
            return true;
        }
    }

    false
}

async fn exec(exec_env: ExecEnv) -> Result<RawExecToolCallOutput> {
    let ExecEnv {
        command,
        cwd,
        env,
        expiration,
        arg0,
        ..
    } = exec_env;

    let (program, args) = command.split_first().ok_or(WardenErr::EmptyCommand)?;
    let child = spawn_child_async(SpawnChildRequest {
        program: PathBuf::from(program),
        args: args.to_vec(),
        arg0: arg0.as_deref(),
        cwd,
        stdio_policy: StdioPolicy::RedirectForShellTool,
        env,
    })
    .await
    .map_err(|source| WardenErr::Spawn {
        program: program.clone(),
        source,
    })?;

    consume_truncated_output(child, expiration).await
}

/// Reads both pipes to EOF while racing the child's exit against
/// `expiration`. On expiry the child's whole process group is killed.
async fn consume_truncated_output(
    mut child: Child,
    expiration: ExecExpiration,
) -> Result<RawExecToolCallOutput> {
    let stdout_reader = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout pipe was unexpectedly not available"))?;
    let stderr_reader = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("stderr pipe was unexpectedly not available"))?;

    let mut stdout_handle = tokio::spawn(read_capped(
        BufReader::new(stdout_reader),
        EXEC_OUTPUT_MAX_BYTES,
    ));
    let mut stderr_handle = tokio::spawn(read_capped(
        BufReader::new(stderr_reader),
        EXEC_OUTPUT_MAX_BYTES,
    ));

    let (exit_status, expiry) = tokio::select! {
        status_result = child.wait() => (status_result?, None),
        expiry = expiration.wait() => {
            kill_child_process_group(&mut child)?;
            child.start_kill()?;
            (child.wait().await?, Some(expiry))
        }
    };

    let stdout = await_with_timeout(&mut stdout_handle, IO_DRAIN_TIMEOUT).await?;
    let stderr = await_with_timeout(&mut stderr_handle, IO_DRAIN_TIMEOUT).await?;
    let aggregated_output = aggregate_output(&stdout, &stderr, EXEC_OUTPUT_MAX_BYTES);

    Ok(RawExecToolCallOutput {
        exit_status,
        stdout,
        stderr,
        aggregated_output,
        expiry,
    })
}

async fn await_with_timeout(
    handle: &mut JoinHandle<io::Result<Vec<u8>>>,
    timeout: Duration,
) -> io::Result<Vec<u8>> {
    match tokio::time::timeout(timeout, &mut *handle).await {
        Ok(Ok(io_res)) => io_res,
        Ok(Err(join_err)) => Err(io::Error::other(join_err)),
        Err(_elapsed) => {
            handle.abort();
            Ok(Vec::new())
        }
    }
}

async fn read_capped<R: AsyncRead + Unpin + Send + 'static>(
    mut reader: R,
    max_bytes: usize,
) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(AGGREGATE_BUFFER_INITIAL_CAPACITY.min(max_bytes));
    let mut tmp = [0u8; READ_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        append_capped(&mut buf, &tmp[..n], max_bytes);
        // Keep reading to EOF so the child never blocks on a full pipe.
    }

    Ok(buf)
}

#[inline]
fn append_capped(dst: &mut Vec<u8>, src: &[u8], max_bytes: usize) {
    let remaining = max_bytes.saturating_sub(dst.len());
    let take = remaining.min(src.len());
    dst.extend_from_slice(&src[..take]);
}

/// stdout followed by stderr. When both do not fit, stdout is limited to a
/// third of the budget and stderr gets the rest; unused stderr budget goes
/// back to stdout.
fn aggregate_output(stdout: &[u8], stderr: &[u8], max_bytes: usize) -> Vec<u8> {
    let total_len = stdout.len().saturating_add(stderr.len());
    let mut aggregated = Vec::with_capacity(total_len.min(max_bytes));

    if total_len <= max_bytes {
        aggregated.extend_from_slice(stdout);
        aggregated.extend_from_slice(stderr);
        return aggregated;
    }

    let want_stdout = stdout.len().min(max_bytes / 3);
    let stderr_take = stderr.len().min(max_bytes.saturating_sub(want_stdout));
    let remaining = max_bytes.saturating_sub(want_stdout + stderr_take);
    let stdout_take = want_stdout + remaining.min(stdout.len().saturating_sub(want_stdout));

    aggregated.extend_from_slice(&stdout[..stdout_take]);
    aggregated.extend_from_slice(&stderr[..stderr_take]);
    aggregated
}
