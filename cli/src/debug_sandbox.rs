use std::path::PathBuf;

use warden_core::ExecRequest;
use warden_core::config::Config;
use warden_core::config::ConfigOverrides;
use warden_core::dispatch;
use warden_core::protocol::SandboxKind;

use crate::CliConfigOverrides;
use crate::LandlockCommand;
use crate::SandboxCommandArgs;
use crate::SeatbeltCommand;
use crate::tool_cmd::cancel_on_ctrl_c;
use crate::tool_cmd::print_payload;

pub async fn run_command_under_seatbelt(
    command: SeatbeltCommand,
    linux_sandbox_exe: Option<PathBuf>,
) -> anyhow::Result<i32> {
    let SeatbeltCommand {
        config_overrides,
        sandbox,
    } = command;
    run_command_under_sandbox(
        config_overrides,
        sandbox,
        SandboxKind::MacosSeatbelt,
        linux_sandbox_exe,
    )
    .await
}

pub async fn run_command_under_landlock(
    command: LandlockCommand,
    linux_sandbox_exe: Option<PathBuf>,
) -> anyhow::Result<i32> {
    let LandlockCommand {
        config_overrides,
        sandbox,
    } = command;
    run_command_under_sandbox(
        config_overrides,
        sandbox,
        SandboxKind::LinuxLandlock,
        linux_sandbox_exe,
    )
    .await
}

/// Runs the command directly under `sandbox_kind`, skipping approval.
async fn run_command_under_sandbox(
    config_overrides: CliConfigOverrides,
    args: SandboxCommandArgs,
    sandbox_kind: SandboxKind,
    linux_sandbox_exe: Option<PathBuf>,
) -> anyhow::Result<i32> {
    let SandboxCommandArgs {
        network,
        writable_roots,
        command,
    } = args;

    let config = Config::load_with_cli_overrides(
        config_overrides
            .parse_overrides()
            .map_err(anyhow::Error::msg)?,
        ConfigOverrides {
            network_access: network.then_some(true),
            linux_sandbox_exe,
            ..Default::default()
        },
    )?;

    let request = ExecRequest {
        additional_writable_roots: writable_roots,
        ..ExecRequest::new(command)
    };
    let output = dispatch(&request, sandbox_kind, &config, cancel_on_ctrl_c()).await;
    Ok(print_payload(&output.to_payload()))
}
