use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Child;
use tokio::process::Command;
use tracing::trace;

/// Set to `1` for commands spawned under a restricted sandbox whose policy
/// blocks network access.
pub const WARDEN_SANDBOX_NETWORK_DISABLED_ENV_VAR: &str = "WARDEN_SANDBOX_NETWORK_DISABLED";

/// Set for commands spawned under a restricted sandbox: `seatbelt` on macOS,
/// `landlock` on Linux.
pub const WARDEN_SANDBOX_ENV_VAR: &str = "WARDEN_SANDBOX";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioPolicy {
    /// stdin is `/dev/null`, stdout/stderr are captured, and the child leads
    /// its own process group so timeouts can kill everything it started.
    RedirectForShellTool,

    /// All stdio goes to `/dev/null` and the child starts a new session. The
    /// child outlives the call.
    Detached,
}

/// Everything needed to create the `Command` for a tool call. `env` is the
/// complete environment; nothing is inherited implicitly.
pub(crate) struct SpawnChildRequest<'a> {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub arg0: Option<&'a str>,
    pub cwd: PathBuf,
    pub stdio_policy: StdioPolicy,
    pub env: HashMap<String, String>,
}

pub(crate) async fn spawn_child_async(request: SpawnChildRequest<'_>) -> std::io::Result<Child> {
    let SpawnChildRequest {
        program,
        args,
        arg0,
        cwd,
        stdio_policy,
        env,
    } = request;

    trace!("spawn_child_async: {program:?} {args:?} {arg0:?} {cwd:?} {stdio_policy:?} {env:?}");

    let mut cmd = Command::new(&program);
    #[cfg(unix)]
    cmd.arg0(arg0.map_or_else(|| program.to_string_lossy().to_string(), String::from));
    cmd.args(args);
    cmd.current_dir(cwd);
    cmd.env_clear();
    cmd.envs(env);

    #[cfg(unix)]
    unsafe {
        #[cfg(target_os = "linux")]
        let parent_pid = libc::getpid();
        cmd.pre_exec(move || {
            match stdio_policy {
                StdioPolicy::RedirectForShellTool => {
                    crate::process_group::set_process_group()?;

                    // If Warden dies (even via SIGKILL) the command goes with it.
                    #[cfg(target_os = "linux")]
                    crate::process_group::set_parent_death_signal(parent_pid)?;
                }
                StdioPolicy::Detached => crate::process_group::detach_from_session()?,
            }
            Ok(())
        });
    }

    match stdio_policy {
        StdioPolicy::RedirectForShellTool => {
            // No stdin: some tools (ripgrep, for one) probe it and would hang.
            cmd.stdin(Stdio::null());
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            cmd.kill_on_drop(true);
        }
        StdioPolicy::Detached => {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }
    }

    cmd.spawn()
}
