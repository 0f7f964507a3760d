//! Detached execution for `run_in_background` requests. Only available
//! without a sandbox: a detached child would outlive the sandboxed parent
//! that is supposed to contain it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use tracing::debug;

use crate::error::Result;
use crate::error::WardenErr;
use crate::exec::ExecToolCallOutput;
use crate::spawn::SpawnChildRequest;
use crate::spawn::StdioPolicy;
use crate::spawn::spawn_child_async;

/// Starts `command` in a new session with all stdio on `/dev/null` and
/// returns as soon as it is running. The child is intentionally not awaited.
pub(crate) async fn spawn_background(
    command: Vec<String>,
    cwd: PathBuf,
    env: HashMap<String, String>,
) -> Result<ExecToolCallOutput> {
    let start = Instant::now();
    let (program, args) = command.split_first().ok_or(WardenErr::EmptyCommand)?;

    let child = spawn_child_async(SpawnChildRequest {
        program: PathBuf::from(program),
        args: args.to_vec(),
        arg0: None,
        cwd,
        stdio_policy: StdioPolicy::Detached,
        env,
    })
    .await
    .map_err(|source| WardenErr::Spawn {
        program: program.clone(),
        source,
    })?;

    let pid = child.id();
    debug!("started background process {pid:?}: {command:?}");

    let stdout = match pid {
        Some(pid) => format!("Started background process with PID {pid}\n"),
        None => "Started background process\n".to_string(),
    };
    Ok(ExecToolCallOutput {
        exit_code: 0,
        aggregated_output: stdout.clone(),
        stdout,
        duration: start.elapsed(),
        background_pid: pid,
        ..Default::default()
    })
}
