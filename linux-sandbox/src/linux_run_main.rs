use std::ffi::CString;
use std::path::PathBuf;

use clap::Parser;
use warden_protocol::protocol::SandboxPolicy;

use crate::landlock::LinuxSandboxError;
use crate::landlock::apply_sandbox_policy_to_current_thread;

/// Exit status when the sandbox could not be set up, or the command could
/// not be exec'd.
const SANDBOX_SETUP_EXIT_CODE: i32 = 1;
const COMMAND_NOT_FOUND_EXIT_CODE: i32 = 127;
const COMMAND_NOT_EXECUTABLE_EXIT_CODE: i32 = 126;

#[derive(Debug, Parser)]
/// CLI surface for the Linux sandbox helper.
pub struct LandlockCommand {
    /// The cwd used to resolve the policy's writable roots. It may differ
    /// from the cwd of the process to spawn.
    #[arg(long = "sandbox-policy-cwd")]
    pub sandbox_policy_cwd: PathBuf,

    /// JSON-encoded `SandboxPolicy`.
    #[arg(long = "sandbox-policy")]
    pub sandbox_policy: SandboxPolicy,

    /// Full command args to run under the Linux sandbox helper.
    #[arg(trailing_var_arg = true)]
    pub command: Vec<String>,
}

/// Entry point for the Linux sandbox helper.
///
/// 1. Apply `no_new_privs`, seccomp (when network is disabled) and Landlock
///    to the current thread.
/// 2. `execvp` into the command, which inherits the restrictions.
pub fn run_main() -> ! {
    let LandlockCommand {
        sandbox_policy_cwd,
        sandbox_policy,
        command,
    } = LandlockCommand::parse();

    let err = match sandbox_and_exec(&sandbox_policy, &sandbox_policy_cwd, command) {
        Ok(never) => match never {},
        Err(err) => err,
    };
    eprintln!("warden-linux-sandbox: {err}");
    std::process::exit(exit_code_for(&err));
}

fn sandbox_and_exec(
    sandbox_policy: &SandboxPolicy,
    sandbox_policy_cwd: &std::path::Path,
    command: Vec<String>,
) -> Result<std::convert::Infallible, LinuxSandboxError> {
    if command.is_empty() {
        return Err(LinuxSandboxError::MissingCommand);
    }
    apply_sandbox_policy_to_current_thread(sandbox_policy, sandbox_policy_cwd)?;
    Err(execvp(&command))
}

fn exit_code_for(err: &LinuxSandboxError) -> i32 {
    match err {
        LinuxSandboxError::Exec { source, .. } => match source.kind() {
            std::io::ErrorKind::NotFound => COMMAND_NOT_FOUND_EXIT_CODE,
            _ => COMMAND_NOT_EXECUTABLE_EXIT_CODE,
        },
        _ => SANDBOX_SETUP_EXIT_CODE,
    }
}

/// Replaces the current process image. Only returns on failure.
fn execvp(command: &[String]) -> LinuxSandboxError {
    let c_args = match command
        .iter()
        .map(|arg| CString::new(arg.as_str()).map_err(|_| LinuxSandboxError::NulByte(arg.clone())))
        .collect::<Result<Vec<CString>, _>>()
    {
        Ok(c_args) => c_args,
        Err(err) => return err,
    };
    let Some(program) = c_args.first() else {
        return LinuxSandboxError::MissingCommand;
    };

    let mut c_args_ptrs: Vec<*const libc::c_char> = c_args.iter().map(|arg| arg.as_ptr()).collect();
    c_args_ptrs.push(std::ptr::null());

    unsafe {
        libc::execvp(program.as_ptr(), c_args_ptrs.as_ptr());
    }

    LinuxSandboxError::Exec {
        program: command[0].clone(),
        source: std::io::Error::last_os_error(),
    }
}
