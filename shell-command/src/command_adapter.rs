//! Rewrites POSIX utility invocations into their native equivalent on hosts
//! that lack them.

use std::collections::HashMap;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Unix,
    Windows,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else {
            HostPlatform::Unix
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct NativeEquivalent {
    program: &'static str,
    /// Built into `cmd.exe` rather than shipped as an executable.
    builtin: bool,
}

static WINDOWS_EQUIVALENTS: LazyLock<HashMap<&'static str, NativeEquivalent>> =
    LazyLock::new(|| {
        let builtin = |program: &'static str| NativeEquivalent {
            program,
            builtin: true,
        };
        let executable = |program: &'static str| NativeEquivalent {
            program,
            builtin: false,
        };
        HashMap::from([
            ("ls", builtin("dir")),
            ("cat", builtin("type")),
            ("rm", builtin("del")),
            ("cp", builtin("copy")),
            ("mv", builtin("move")),
            ("pwd", builtin("cd")),
            ("clear", builtin("cls")),
            ("mkdir", builtin("mkdir")),
            ("rmdir", builtin("rmdir")),
            ("grep", executable("findstr")),
            ("which", executable("where")),
            ("ps", executable("tasklist")),
            ("kill", executable("taskkill")),
            ("ifconfig", executable("ipconfig")),
            ("diff", executable("fc")),
        ])
    });

const SHELL_METACHARACTERS: &[char] = &['$', '|', '&', ';', '<', '>', '(', ')', '`', '*', '?'];

fn is_malformed_program(program: &str) -> bool {
    let program = program.trim();
    program.is_empty() || program.chars().all(|c| SHELL_METACHARACTERS.contains(&c))
}

/// Adapts `command` for the host this process runs on.
pub fn adapt_command(command: &[String]) -> Vec<String> {
    adapt_command_for(command, HostPlatform::current())
}

/// Adapts `command` for `platform`. Only Windows needs rewriting; the first
/// token selects the mapping and remaining arguments are passed through.
pub fn adapt_command_for(command: &[String], platform: HostPlatform) -> Vec<String> {
    let Some((program, args)) = command.split_first() else {
        return command.to_vec();
    };
    if platform == HostPlatform::Unix || is_malformed_program(program) {
        return command.to_vec();
    }
    let Some(native) = WINDOWS_EQUIVALENTS.get(program.as_str()) else {
        return command.to_vec();
    };

    let mut adapted = Vec::with_capacity(command.len() + 2);
    if native.builtin {
        adapted.push("cmd".to_string());
        adapted.push("/c".to_string());
    }
    adapted.push(native.program.to_string());
    adapted.extend(args.iter().cloned());
    adapted
}
