use crate::bash::parse_shell_lc_plain_commands;
use crate::command_safety::is_dangerous_command::find_git_subcommand;
use crate::command_safety::is_dangerous_command::program_name;

/// True when `command` only reads state: every program is a known read-only
/// utility invoked without options that write, execute or delete.
pub fn is_known_safe_command(command: &[String]) -> bool {
    if is_safe_to_call_with_exec(command) {
        return true;
    }

    // `bash -lc "ls && cat foo"` is safe when every part is.
    parse_shell_lc_plain_commands(command).is_some_and(|commands| {
        !commands.is_empty() && commands.iter().all(|cmd| is_safe_to_call_with_exec(cmd))
    })
}

pub(crate) fn is_safe_to_call_with_exec(command: &[String]) -> bool {
    let Some(cmd0) = command.first().map(|cmd| program_name(cmd)) else {
        return false;
    };

    match cmd0 {
        "cat" | "cd" | "cut" | "echo" | "expr" | "false" | "file" | "grep" | "head" | "id"
        | "ls" | "nl" | "paste" | "pwd" | "rev" | "seq" | "sort" | "stat" | "tail" | "tr"
        | "true" | "uname" | "uniq" | "wc" | "which" | "whoami" | "du" | "df" | "tree" => true,

        "find" => {
            // Options that can delete, execute or write files.
            const UNSAFE_FIND_OPTIONS: &[&str] = &[
                "-exec", "-execdir", "-ok", "-okdir", "-delete", "-fls", "-fprint", "-fprint0",
                "-fprintf",
            ];
            !command
                .iter()
                .any(|arg| UNSAFE_FIND_OPTIONS.contains(&arg.as_str()))
        }

        "rg" => {
            const UNSAFE_RG_OPTIONS_WITH_ARGS: &[&str] = &["--pre", "--hostname-bin"];
            const UNSAFE_RG_OPTIONS: &[&str] = &["--search-zip", "-z"];
            !command.iter().any(|arg| {
                UNSAFE_RG_OPTIONS.contains(&arg.as_str())
                    || UNSAFE_RG_OPTIONS_WITH_ARGS
                        .iter()
                        .any(|opt| arg == opt || arg.starts_with(&format!("{opt}=")))
            })
        }

        "git" => find_git_subcommand(command, &["status", "log", "diff", "show", "branch"])
            .is_some_and(|(idx, subcommand)| {
                let args = &command[idx + 1..];
                // `git branch` only lists when no other argument is given.
                subcommand != "branch"
                    || args
                        .iter()
                        .all(|arg| matches!(arg.as_str(), "-a" | "-r" | "-v" | "--list" | "--show-current"))
            }),

        // `sed -n 1,20p file` only prints.
        "sed" => matches!(
            command,
            [_, flag, range, ..] if flag == "-n" && is_valid_sed_n_arg(range) && command.len() <= 4
        ),

        _ => false,
    }
}

fn is_valid_sed_n_arg(arg: &str) -> bool {
    let Some(core) = arg.strip_suffix('p') else {
        return false;
    };
    let parts: Vec<&str> = core.split(',').collect();
    match parts.as_slice() {
        [num] => !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()),
        [a, b] => {
            !a.is_empty()
                && !b.is_empty()
                && a.chars().all(|c| c.is_ascii_digit())
                && b.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}
