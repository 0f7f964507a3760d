use std::path::Path;

use crate::error::SandboxErr;
use crate::protocol::SandboxPolicy;

/// arg0 the helper is spawned under. The `warden` binary dispatches on it,
/// so the helper can be the main executable itself.
pub const LINUX_SANDBOX_ARG0: &str = "warden-linux-sandbox";

/// Converts the sandbox policy into the CLI invocation for
/// `warden-linux-sandbox`, which applies Landlock and seccomp to itself and
/// then execs `command`.
pub(crate) fn create_linux_sandbox_command_args(
    command: Vec<String>,
    sandbox_policy: &SandboxPolicy,
    sandbox_policy_cwd: &Path,
) -> Result<Vec<String>, SandboxErr> {
    let sandbox_policy_cwd = sandbox_policy_cwd
        .to_str()
        .ok_or_else(|| {
            SandboxErr::InvalidHelperArgs(format!(
                "non UTF-8 cwd {}",
                sandbox_policy_cwd.display()
            ))
        })?
        .to_string();

    let sandbox_policy_json = serde_json::to_string(sandbox_policy)
        .map_err(|err| SandboxErr::InvalidHelperArgs(format!("sandbox policy: {err}")))?;

    let mut linux_cmd: Vec<String> = vec![
        "--sandbox-policy-cwd".to_string(),
        sandbox_policy_cwd,
        "--sandbox-policy".to_string(),
        sandbox_policy_json,
        // Arguments after this are never parsed as helper options.
        "--".to_string(),
    ];
    linux_cmd.extend(command);

    Ok(linux_cmd)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn policy_is_passed_as_json_before_the_separator() {
        let policy = SandboxPolicy {
            writable_roots: vec![PathBuf::from("/data")],
            network_access: false,
        };
        let args = create_linux_sandbox_command_args(
            vec!["ls".to_string(), "--help".to_string()],
            &policy,
            Path::new("/work"),
        )
        .unwrap();

        assert_eq!(
            args,
            vec![
                "--sandbox-policy-cwd".to_string(),
                "/work".to_string(),
                "--sandbox-policy".to_string(),
                r#"{"writable_roots":["/data"],"network_access":false}"#.to_string(),
                "--".to_string(),
                "ls".to_string(),
                "--help".to_string(),
            ]
        );

        let round_trip: SandboxPolicy = args[3].parse().unwrap();
        assert_eq!(round_trip, policy);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_cwd_is_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let cwd = Path::new(OsStr::from_bytes(b"/tmp/\xff"));
        let result = create_linux_sandbox_command_args(
            vec!["ls".to_string()],
            &SandboxPolicy::default(),
            cwd,
        );

        assert!(matches!(result, Err(SandboxErr::InvalidHelperArgs(_))));
    }
}
