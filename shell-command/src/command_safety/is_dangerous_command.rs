use std::path::Path;

use crate::bash::parse_shell_lc_plain_commands;
use crate::command_safety::windows_dangerous_commands::dangerous_windows_reason;

pub fn command_might_be_dangerous(command: &[String]) -> bool {
    dangerous_command_reason(command).is_some()
}

/// Returns a short description of why `command` is destructive, looking
/// inside `bash -lc "<script>"` when every part of the script is a plain
/// command.
pub fn dangerous_command_reason(command: &[String]) -> Option<&'static str> {
    if let Some(reason) = dangerous_windows_reason(command) {
        return Some(reason);
    }

    if let Some(reason) = reason_to_avoid_exec(command) {
        return Some(reason);
    }

    parse_shell_lc_plain_commands(command)?
        .iter()
        .find_map(|cmd| reason_to_avoid_exec(cmd))
}

fn is_git_global_option_with_value(arg: &str) -> bool {
    matches!(
        arg,
        "-C" | "-c"
            | "--config-env"
            | "--exec-path"
            | "--git-dir"
            | "--namespace"
            | "--super-prefix"
            | "--work-tree"
    )
}

fn is_git_global_option_with_inline_value(arg: &str) -> bool {
    [
        "--config-env=",
        "--exec-path=",
        "--git-dir=",
        "--namespace=",
        "--super-prefix=",
        "--work-tree=",
    ]
    .iter()
    .any(|prefix| arg.starts_with(prefix))
        || ((arg.starts_with("-C") || arg.starts_with("-c")) && arg.len() > 2)
}

/// Find the first matching git subcommand, skipping known global options that
/// may appear before it (e.g., `-C`, `-c`, `--git-dir`).
///
/// Shared with `is_safe_command` so global options cannot smuggle a
/// subcommand past either check.
pub(crate) fn find_git_subcommand<'a>(
    command: &'a [String],
    subcommands: &[&str],
) -> Option<(usize, &'a str)> {
    let cmd0 = command.first().map(String::as_str)?;
    if program_name(cmd0) != "git" {
        return None;
    }

    let mut skip_next = false;
    for (idx, arg) in command.iter().enumerate().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }

        let arg = arg.as_str();

        if is_git_global_option_with_inline_value(arg) {
            continue;
        }

        if is_git_global_option_with_value(arg) {
            skip_next = true;
            continue;
        }

        if arg == "--" || arg.starts_with('-') {
            continue;
        }

        if subcommands.contains(&arg) {
            return Some((idx, arg));
        }

        // The first non-option token is the subcommand; later positional
        // arguments (branch names, paths) are not.
        return None;
    }

    None
}

pub(crate) fn program_name(cmd: &str) -> &str {
    Path::new(cmd)
        .file_name()
        .and_then(|osstr| osstr.to_str())
        .unwrap_or(cmd)
}

fn reason_to_avoid_exec(command: &[String]) -> Option<&'static str> {
    let cmd0 = program_name(command.first()?);

    match cmd0 {
        "git" => {
            let (subcommand_idx, subcommand) =
                find_git_subcommand(command, &["reset", "rm", "branch", "push", "clean"])?;
            let args = &command[subcommand_idx + 1..];
            match subcommand {
                "reset" => Some("discards git working tree changes"),
                "rm" => Some("removes files from the git index and working tree"),
                "branch" if git_branch_is_delete(args) => Some("deletes a git branch"),
                "push" if git_push_is_dangerous(args) => {
                    Some("force pushes or deletes remote refs")
                }
                "clean" if git_clean_is_force(args) => Some("deletes untracked files"),
                _ => None,
            }
        }

        "rm" if rm_is_forced_or_recursive(&command[1..]) => Some("forced or recursive deletion"),

        "dd" if command.iter().skip(1).any(|arg| arg.starts_with("of=")) => {
            Some("writes raw data to a file or device")
        }

        cmd if cmd == "mkfs" || cmd.starts_with("mkfs.") => Some("formats a filesystem"),

        "shred" | "wipefs" => Some("irrecoverably erases data"),

        "shutdown" | "reboot" | "halt" | "poweroff" => Some("stops the machine"),

        // Judge the wrapped command, but privilege escalation is itself risky.
        "sudo" | "doas" => reason_to_avoid_exec(&command[1..])
            .or(Some("runs a command with elevated privileges")),

        _ => None,
    }
}

fn rm_is_forced_or_recursive(args: &[String]) -> bool {
    args.iter()
        .map(String::as_str)
        .take_while(|arg| *arg != "--")
        .any(|arg| {
            matches!(arg, "--force" | "--recursive")
                || short_flag_group_contains(arg, 'f')
                || short_flag_group_contains(arg, 'r')
                || short_flag_group_contains(arg, 'R')
        })
}

fn git_branch_is_delete(branch_args: &[String]) -> bool {
    // Stacked short flags such as `-dv` or `-vD` still delete.
    branch_args.iter().map(String::as_str).any(|arg| {
        matches!(arg, "-d" | "-D" | "--delete")
            || arg.starts_with("--delete=")
            || short_flag_group_contains(arg, 'd')
            || short_flag_group_contains(arg, 'D')
    })
}

fn short_flag_group_contains(arg: &str, target: char) -> bool {
    arg.starts_with('-') && !arg.starts_with("--") && arg.chars().skip(1).any(|c| c == target)
}

fn git_push_is_dangerous(push_args: &[String]) -> bool {
    push_args.iter().map(String::as_str).any(|arg| {
        matches!(
            arg,
            "--force" | "--force-with-lease" | "--force-if-includes" | "--delete" | "-f" | "-d"
        ) || arg.starts_with("--force-with-lease=")
            || arg.starts_with("--force-if-includes=")
            || arg.starts_with("--delete=")
            || short_flag_group_contains(arg, 'f')
            || short_flag_group_contains(arg, 'd')
            || git_push_refspec_is_dangerous(arg)
    })
}

fn git_push_refspec_is_dangerous(arg: &str) -> bool {
    // `+<refspec>` forces updates and `:<dst>` deletes remote refs.
    (arg.starts_with('+') || arg.starts_with(':')) && arg.len() > 1
}

fn git_clean_is_force(clean_args: &[String]) -> bool {
    clean_args.iter().map(String::as_str).any(|arg| {
        matches!(arg, "--force" | "-f")
            || arg.starts_with("--force=")
            || short_flag_group_contains(arg, 'f')
    })
}
