#![cfg_attr(not(target_os = "macos"), allow(dead_code))]

use std::path::Path;
use std::path::PathBuf;

use crate::protocol::SandboxPolicy;

const MACOS_SEATBELT_BASE_POLICY: &str = include_str!("seatbelt_base_policy.sbpl");
const MACOS_SEATBELT_NETWORK_POLICY: &str = include_str!("seatbelt_network_policy.sbpl");

/// Only trust `sandbox-exec` in `/usr/bin`; a tampered copy there already
/// implies root access, while anything on `PATH` could be planted.
pub(crate) const MACOS_PATH_TO_SEATBELT_EXECUTABLE: &str = "/usr/bin/sandbox-exec";

/// Builds the `sandbox-exec` arguments that run `command` under `sandbox_policy`:
/// `-p <profile> -DWRITABLE_ROOT_0=... -- <command...>`.
pub(crate) fn create_seatbelt_command_args(
    command: Vec<String>,
    sandbox_policy: &SandboxPolicy,
    sandbox_policy_cwd: &Path,
) -> Vec<String> {
    let mut writable_folder_policies: Vec<String> = Vec::new();
    let mut dir_params: Vec<(String, PathBuf)> = Vec::new();

    for (index, root) in sandbox_policy
        .get_writable_roots_with_cwd(sandbox_policy_cwd)
        .into_iter()
        .enumerate()
    {
        // Canonicalize to avoid mismatches like /var vs /private/var on macOS.
        let canonical_root = root.canonicalize().unwrap_or(root);
        let root_param = format!("WRITABLE_ROOT_{index}");
        writable_folder_policies.push(format!("(subpath (param \"{root_param}\"))"));
        dir_params.push((root_param, canonical_root));
    }

    let file_write_policy = if writable_folder_policies.is_empty() {
        String::new()
    } else {
        format!(
            "(allow file-write*\n{}\n)",
            writable_folder_policies.join(" ")
        )
    };

    let network_policy = if sandbox_policy.has_full_network_access() {
        dir_params.extend(macos_dir_params());
        MACOS_SEATBELT_NETWORK_POLICY
    } else {
        ""
    };

    let full_policy = format!(
        "{MACOS_SEATBELT_BASE_POLICY}\n; allow read-only file operations\n(allow file-read*)\n{file_write_policy}\n{network_policy}"
    );

    let mut seatbelt_args: Vec<String> = vec!["-p".to_string(), full_policy];
    seatbelt_args.extend(
        dir_params
            .into_iter()
            .map(|(key, value)| format!("-D{key}={value}", value = value.to_string_lossy())),
    );
    seatbelt_args.push("--".to_string());
    seatbelt_args.extend(command);
    seatbelt_args
}

#[cfg(target_os = "macos")]
fn confstr(name: libc::c_int) -> Option<String> {
    let mut buf = vec![0 as libc::c_char; (libc::PATH_MAX as usize) + 1];
    let len = unsafe { libc::confstr(name, buf.as_mut_ptr(), buf.len()) };
    if len == 0 {
        return None;
    }
    // confstr guarantees NUL-termination when len > 0.
    let cstr = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) };
    cstr.to_str().ok().map(ToString::to_string)
}

/// Directories the network profile refers to by parameter.
#[cfg(target_os = "macos")]
fn macos_dir_params() -> Vec<(String, PathBuf)> {
    confstr(libc::_CS_DARWIN_USER_CACHE_DIR)
        .map(PathBuf::from)
        .map(|path| path.canonicalize().unwrap_or(path))
        .map(|path| vec![("DARWIN_USER_CACHE_DIR".to_string(), path)])
        .unwrap_or_default()
}

#[cfg(not(target_os = "macos"))]
fn macos_dir_params() -> Vec<(String, PathBuf)> {
    Vec::new()
}
