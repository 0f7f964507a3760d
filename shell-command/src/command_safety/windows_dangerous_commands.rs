use std::path::Path;

use shlex::split as shlex_split;

/// Destructive `cmd.exe` and PowerShell invocations. These are recognised on
/// every host so approval prompts classify them the same way everywhere.
pub(crate) fn dangerous_windows_reason(command: &[String]) -> Option<&'static str> {
    let (exe, rest) = command.split_first()?;
    let base = executable_basename(exe)?;
    match base.as_str() {
        "cmd" | "cmd.exe" => dangerous_cmd_reason(rest),
        "powershell" | "powershell.exe" | "pwsh" | "pwsh.exe" => {
            let tokens = parse_powershell_invocation(rest)?;
            dangerous_powershell_reason(&tokens)
        }
        "format" | "format.com" => Some("formats a volume"),
        _ => None,
    }
}

fn dangerous_cmd_reason(args: &[String]) -> Option<&'static str> {
    let mut iter = args.iter();
    for arg in iter.by_ref() {
        let lower = arg.to_ascii_lowercase();
        match lower.as_str() {
            "/c" | "/k" | "/r" => break,
            _ if lower.starts_with('/') => continue,
            // Unknown tokens before the command body.
            _ => return None,
        }
    }

    let remaining: Vec<String> = iter.cloned().collect();
    let cmd_tokens: Vec<String> = match remaining.as_slice() {
        [] => return None,
        [only] => shlex_split(only).unwrap_or_else(|| vec![only.clone()]),
        _ => remaining,
    };

    // `echo hi&del /f x` arrives as a single token.
    let tokens: Vec<String> = cmd_tokens
        .into_iter()
        .flat_map(|t| split_embedded_cmd_operators(&t))
        .collect();

    const CMD_SEPARATORS: &[&str] = &["&", "&&", "|", "||"];
    tokens
        .split(|t| CMD_SEPARATORS.contains(&t.as_str()))
        .find_map(|segment| {
            let cmd = segment.first()?.to_ascii_lowercase();
            match cmd.as_str() {
                "del" | "erase" if has_flag(segment, "/s") || has_flag(segment, "/f") => {
                    Some("force or recursive deletion")
                }
                "rd" | "rmdir" if has_flag(segment, "/s") => Some("recursive directory removal"),
                "format" => Some("formats a volume"),
                _ => None,
            }
        })
}

fn dangerous_powershell_reason(tokens: &[String]) -> Option<&'static str> {
    const DELETE_CMDLETS: &[&str] = &["remove-item", "ri", "rm", "del", "erase", "rd", "rmdir"];

    let lowered: Vec<String> = tokens
        .iter()
        .map(|t| t.trim_matches('\'').trim_matches('"').to_ascii_lowercase())
        .collect();

    // -Force / -Recurse only count when they sit in the same pipeline segment
    // as the delete cmdlet.
    lowered
        .split(|t| matches!(t.as_str(), ";" | "|" | "&&" | "||"))
        .find_map(|segment| {
            let atoms: Vec<&str> = segment
                .iter()
                .flat_map(|t| t.split(['{', '}', '(', ')', ';', ',']))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if atoms.iter().any(|a| *a == "format-volume") {
                return Some("formats a volume");
            }
            let deletes = atoms.iter().any(|a| DELETE_CMDLETS.contains(a));
            let forced = atoms
                .iter()
                .any(|a| *a == "-force" || a.starts_with("-force:") || *a == "-recurse");
            (deletes && forced).then_some("force or recursive deletion")
        })
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a.eq_ignore_ascii_case(flag))
}

fn split_embedded_cmd_operators(token: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut it = token.char_indices().peekable();

    while let Some((i, ch)) = it.next() {
        if ch == '&' || ch == '|' {
            if i > start {
                parts.push(token[start..i].to_string());
            }
            let op_len = match it.peek() {
                Some(&(j, next)) if next == ch => {
                    it.next();
                    (j + next.len_utf8()) - i
                }
                _ => ch.len_utf8(),
            };
            parts.push(token[i..i + op_len].to_string());
            start = i + op_len;
        }
    }

    if start < token.len() {
        parts.push(token[start..].to_string());
    }

    parts.retain(|s| !s.trim().is_empty());
    parts
}

fn executable_basename(exe: &str) -> Option<String> {
    // Windows paths are not split by `Path` on Unix hosts.
    let name = exe.rsplit(['\\', '/']).next()?;
    Path::new(name)
        .file_name()
        .and_then(|osstr| osstr.to_str())
        .map(str::to_ascii_lowercase)
}

fn parse_powershell_invocation(args: &[String]) -> Option<Vec<String>> {
    let mut idx = 0;
    while idx < args.len() {
        let arg = &args[idx];
        let lower = arg.to_ascii_lowercase();
        match lower.as_str() {
            "-command" | "/command" | "-c" => {
                let script = args.get(idx + 1)?;
                if idx + 2 != args.len() {
                    return None;
                }
                return shlex_split(script);
            }
            _ if lower.starts_with("-command:") || lower.starts_with("/command:") => {
                let (_, script) = arg.split_once(':')?;
                return shlex_split(script);
            }
            _ if lower.starts_with('-') => idx += 1,
            _ => return Some(args[idx..].to_vec()),
        }
    }
    None
}
