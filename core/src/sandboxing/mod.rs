//! Turns a portable [`CommandSpec`] into a ready-to-spawn [`ExecEnv`] for the
//! selected [`SandboxKind`]. The command is wrapped in `sandbox-exec` or the
//! Linux helper and the environment gets the sandbox markers.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

use crate::error::SandboxErr;
use crate::exec::ExecExpiration;
use crate::landlock::LINUX_SANDBOX_ARG0;
use crate::landlock::create_linux_sandbox_command_args;
use crate::protocol::SandboxKind;
use crate::protocol::SandboxPolicy;
use crate::seatbelt::MACOS_PATH_TO_SEATBELT_EXECUTABLE;
use crate::seatbelt::create_seatbelt_command_args;
use crate::spawn::WARDEN_SANDBOX_ENV_VAR;
use crate::spawn::WARDEN_SANDBOX_NETWORK_DISABLED_ENV_VAR;

#[derive(Debug)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub expiration: ExecExpiration,
    pub arg0: Option<String>,
}

/// A command after sandbox placement: `command[0]` is what actually gets
/// spawned (`sandbox-exec`, the Linux helper, or the program itself).
#[derive(Debug)]
pub struct ExecEnv {
    pub command: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub expiration: ExecExpiration,
    pub sandbox: SandboxKind,
    pub sandbox_policy: SandboxPolicy,
    pub arg0: Option<String>,
}

/// Bundled arguments for sandbox transformation.
pub(crate) struct SandboxTransformRequest<'a> {
    pub spec: CommandSpec,
    pub policy: &'a SandboxPolicy,
    pub sandbox: SandboxKind,
    pub sandbox_policy_cwd: &'a Path,
    pub linux_sandbox_exe: Option<&'a Path>,
}

#[derive(Default)]
pub struct SandboxManager;

impl SandboxManager {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn transform(
        &self,
        request: SandboxTransformRequest<'_>,
    ) -> Result<ExecEnv, SandboxErr> {
        let SandboxTransformRequest {
            mut spec,
            policy,
            sandbox,
            sandbox_policy_cwd,
            linux_sandbox_exe,
        } = request;

        let mut env = spec.env;
        if sandbox.is_restricted() && !policy.has_full_network_access() {
            env.insert(
                WARDEN_SANDBOX_NETWORK_DISABLED_ENV_VAR.to_string(),
                "1".to_string(),
            );
        }

        let mut command = Vec::with_capacity(1 + spec.args.len());
        command.push(spec.program);
        command.append(&mut spec.args);

        let (command, arg0) = match sandbox {
            SandboxKind::None => (command, spec.arg0),
            SandboxKind::MacosSeatbelt => {
                if !cfg!(target_os = "macos") {
                    return Err(SandboxErr::SeatbeltUnavailable);
                }
                env.insert(WARDEN_SANDBOX_ENV_VAR.to_string(), "seatbelt".to_string());
                let args = create_seatbelt_command_args(command, policy, sandbox_policy_cwd);
                let mut full_command = Vec::with_capacity(1 + args.len());
                full_command.push(MACOS_PATH_TO_SEATBELT_EXECUTABLE.to_string());
                full_command.extend(args);
                (full_command, None)
            }
            SandboxKind::LinuxLandlock => {
                if !cfg!(target_os = "linux") {
                    return Err(SandboxErr::LandlockUnavailable);
                }
                let exe = linux_sandbox_exe.ok_or(SandboxErr::MissingLinuxSandboxExecutable)?;
                env.insert(WARDEN_SANDBOX_ENV_VAR.to_string(), "landlock".to_string());
                let args = create_linux_sandbox_command_args(command, policy, sandbox_policy_cwd)?;
                let mut full_command = Vec::with_capacity(1 + args.len());
                full_command.push(exe.to_string_lossy().to_string());
                full_command.extend(args);
                (full_command, Some(LINUX_SANDBOX_ARG0.to_string()))
            }
        };
        debug!("sandboxed command for {sandbox}: {command:?}");

        Ok(ExecEnv {
            command,
            cwd: spec.cwd,
            env,
            expiration: spec.expiration,
            sandbox,
            sandbox_policy: policy.clone(),
            arg0,
        })
    }
}
