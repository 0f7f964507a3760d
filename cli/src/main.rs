use std::path::PathBuf;

use clap::Parser;
use supports_color::Stream;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use warden_arg0::arg0_dispatch_or_else;
use warden_cli::CliConfigOverrides;
use warden_cli::LandlockCommand;
use warden_cli::SeatbeltCommand;
use warden_cli::debug_sandbox::run_command_under_landlock;
use warden_cli::debug_sandbox::run_command_under_seatbelt;
use warden_cli::tool_cmd::ApplyPatchCommand;
use warden_cli::tool_cmd::ExecCommand;
use warden_cli::tool_cmd::ReplaceCommand;
use warden_cli::tool_cmd::run_apply_patch_command;
use warden_cli::tool_cmd::run_exec_command;
use warden_cli::tool_cmd::run_replace_command;

/// Default `RUST_LOG` when none is set: stay quiet unless something breaks.
const DEFAULT_LOG_LEVEL: &str = "error";

/// Warden CLI
///
/// Runs agent tool calls (commands and patches) behind an approval prompt
/// and an OS sandbox. Every subcommand prints a JSON result on stdout.
#[derive(Debug, Parser)]
#[clap(author, version, bin_name = "warden")]
struct MultitoolCli {
    #[clap(flatten)]
    pub config_overrides: CliConfigOverrides,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
enum Subcommand {
    /// Run a command through approval and the sandbox.
    #[clap(visible_alias = "e")]
    Exec(ExecCommand),

    /// Apply a `*** Begin Patch` patch in the session root.
    #[clap(visible_alias = "a")]
    ApplyPatch(ApplyPatchCommand),

    /// Apply SEARCH/REPLACE blocks to one file.
    Replace(ReplaceCommand),

    /// Run commands within a Warden-provided sandbox, without approval.
    Sandbox(SandboxArgs),
}

#[derive(Debug, Parser)]
struct SandboxArgs {
    #[command(subcommand)]
    cmd: SandboxCommand,
}

#[derive(Debug, clap::Subcommand)]
enum SandboxCommand {
    /// Run a command under Seatbelt (macOS only).
    #[clap(visible_alias = "seatbelt")]
    Macos(SeatbeltCommand),

    /// Run a command under Landlock+seccomp (Linux only).
    #[clap(visible_alias = "landlock")]
    Linux(LandlockCommand),
}

fn main() -> anyhow::Result<()> {
    arg0_dispatch_or_else(|linux_sandbox_exe| async move {
        let exit_code = cli_main(linux_sandbox_exe).await?;
        if exit_code != 0 {
            std::process::exit(exit_code);
        }
        Ok(())
    })
}

async fn cli_main(linux_sandbox_exe: Option<PathBuf>) -> anyhow::Result<i32> {
    let MultitoolCli {
        config_overrides: root_config_overrides,
        subcommand,
    } = MultitoolCli::parse();

    init_logging();

    match subcommand {
        Subcommand::Exec(mut exec_cli) => {
            prepend_config_flags(&mut exec_cli.config_overrides, root_config_overrides);
            run_exec_command(exec_cli, linux_sandbox_exe).await
        }
        Subcommand::ApplyPatch(mut apply_cli) => {
            prepend_config_flags(&mut apply_cli.config_overrides, root_config_overrides);
            run_apply_patch_command(apply_cli, linux_sandbox_exe).await
        }
        Subcommand::Replace(mut replace_cli) => {
            prepend_config_flags(&mut replace_cli.config_overrides, root_config_overrides);
            run_replace_command(replace_cli, linux_sandbox_exe).await
        }
        Subcommand::Sandbox(sandbox_args) => match sandbox_args.cmd {
            SandboxCommand::Macos(mut seatbelt_cli) => {
                prepend_config_flags(&mut seatbelt_cli.config_overrides, root_config_overrides);
                run_command_under_seatbelt(seatbelt_cli, linux_sandbox_exe).await
            }
            SandboxCommand::Linux(mut landlock_cli) => {
                prepend_config_flags(&mut landlock_cli.config_overrides, root_config_overrides);
                run_command_under_landlock(landlock_cli, linux_sandbox_exe).await
            }
        },
    }
}

/// Logs go to stderr; stdout carries only the JSON result.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(supports_color::on_cached(Stream::Stderr).is_some())
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}

/// Prepend root-level overrides so they have lower precedence than
/// CLI-specific ones specified after the subcommand (if any).
fn prepend_config_flags(
    subcommand_config_overrides: &mut CliConfigOverrides,
    cli_config_overrides: CliConfigOverrides,
) {
    subcommand_config_overrides
        .raw_overrides
        .splice(0..0, cli_config_overrides.raw_overrides);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn root_overrides_come_first() {
        let cli = MultitoolCli::try_parse_from([
            "warden",
            "-c",
            "default_timeout_ms=1",
            "exec",
            "-c",
            "default_timeout_ms=2",
            "--",
            "ls",
        ])
        .unwrap();
        let Subcommand::Exec(mut exec_cli) = cli.subcommand else {
            panic!("expected exec");
        };

        prepend_config_flags(&mut exec_cli.config_overrides, cli.config_overrides);

        assert_eq!(exec_cli.command, vec!["ls".to_string()]);
        assert_eq!(
            exec_cli.config_overrides.raw_overrides,
            vec![
                "default_timeout_ms=1".to_string(),
                "default_timeout_ms=2".to_string(),
            ]
        );
    }

    #[test]
    fn subcommand_overrides_do_not_replace_root_ones() {
        let cli = MultitoolCli::try_parse_from([
            "warden",
            "-c",
            "network=true",
            "replace",
            "-c",
            "default_timeout_ms=5",
            "--replace-all",
            "a.txt",
            "-",
        ])
        .unwrap();
        let Subcommand::Replace(mut replace_cli) = cli.subcommand else {
            panic!("expected replace");
        };

        prepend_config_flags(&mut replace_cli.config_overrides, cli.config_overrides);

        assert!(replace_cli.replace_all);
        assert_eq!(
            replace_cli.config_overrides.raw_overrides,
            vec!["network=true".to_string(), "default_timeout_ms=5".to_string()]
        );
    }

    #[test]
    fn zero_timeout_fails_to_parse() {
        let err = MultitoolCli::try_parse_from(["warden", "exec", "--timeout-ms", "0", "--", "ls"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn sandbox_subcommand_accepts_aliases() {
        let cli = MultitoolCli::try_parse_from([
            "warden",
            "sandbox",
            "landlock",
            "--writable-root",
            "/tmp/out",
            "touch",
            "/tmp/out/x",
        ])
        .unwrap();
        let Subcommand::Sandbox(SandboxArgs {
            cmd: SandboxCommand::Linux(landlock_cli),
        }) = cli.subcommand
        else {
            panic!("expected sandbox linux");
        };

        assert_eq!(
            landlock_cli.sandbox.writable_roots,
            vec![PathBuf::from("/tmp/out")]
        );
        assert_eq!(
            landlock_cli.sandbox.command,
            vec!["touch".to_string(), "/tmp/out/x".to_string()]
        );
    }
}
