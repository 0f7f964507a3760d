//! In-process Linux sandbox primitives: `no_new_privs`, Landlock and seccomp.
use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use landlock::ABI;
use landlock::Access;
use landlock::AccessFs;
use landlock::CompatLevel;
use landlock::Compatible;
use landlock::Ruleset;
use landlock::RulesetAttr;
use landlock::RulesetCreatedAttr;
use seccompiler::BpfProgram;
use seccompiler::SeccompAction;
use seccompiler::SeccompCmpArgLen;
use seccompiler::SeccompCmpOp;
use seccompiler::SeccompCondition;
use seccompiler::SeccompFilter;
use seccompiler::SeccompRule;
use seccompiler::TargetArch;
use seccompiler::apply_filter;
use thiserror::Error;
use warden_protocol::protocol::SandboxPolicy;

#[derive(Debug, Error)]
pub enum LinuxSandboxError {
    #[error("no command specified to execute")]
    MissingCommand,

    #[error("failed to enable no_new_privs: {0}")]
    NoNewPrivs(#[source] std::io::Error),

    #[error("Landlock ruleset error: {0}")]
    Landlock(#[from] landlock::RulesetError),

    #[error("Landlock is not supported by this kernel; refusing to run unsandboxed")]
    LandlockNotEnforced,

    #[error("seccomp filter error: {0}")]
    SeccompBackend(#[from] seccompiler::BackendError),

    #[error("failed to install seccomp filter: {0}")]
    SeccompInstall(#[from] seccompiler::Error),

    #[error("seccomp filters are not supported on this architecture")]
    UnsupportedArchitecture,

    #[error("argument contains a NUL byte: {0:?}")]
    NulByte(String),

    #[error("failed to execvp {program}: {source}")]
    Exec {
        program: String,
        source: std::io::Error,
    },
}

/// Apply sandbox policies inside this thread so only the command that is
/// exec'd next inherits them.
pub(crate) fn apply_sandbox_policy_to_current_thread(
    sandbox_policy: &SandboxPolicy,
    cwd: &Path,
) -> Result<(), LinuxSandboxError> {
    // Required for seccomp and for unprivileged Landlock.
    set_no_new_privs()?;

    if !sandbox_policy.has_full_network_access() {
        install_network_seccomp_filter_on_current_thread()?;
    }

    let writable_roots = sandbox_policy.get_writable_roots_with_cwd(cwd);
    install_filesystem_landlock_rules_on_current_thread(&writable_roots)?;

    Ok(())
}

fn set_no_new_privs() -> Result<(), LinuxSandboxError> {
    let result = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if result != 0 {
        return Err(LinuxSandboxError::NoNewPrivs(
            std::io::Error::last_os_error(),
        ));
    }
    Ok(())
}

/// Installs Landlock file-system rules on the current thread allowing read
/// access to the entire file-system while restricting write access to
/// `/dev/null` and the provided list of `writable_roots`.
fn install_filesystem_landlock_rules_on_current_thread(
    writable_roots: &[PathBuf],
) -> Result<(), LinuxSandboxError> {
    let abi = ABI::V5;
    let access_rw = AccessFs::from_all(abi);
    let access_ro = AccessFs::from_read(abi);

    let mut ruleset = Ruleset::default()
        .set_compatibility(CompatLevel::BestEffort)
        .handle_access(access_rw)?
        .create()?
        .add_rules(landlock::path_beneath_rules(&["/"], access_ro))?
        .add_rules(landlock::path_beneath_rules(&["/dev/null"], access_rw))?
        .set_no_new_privs(true);

    // Roots that do not exist yet (e.g. an unset TMPDIR target) are skipped
    // instead of failing the whole sandbox.
    let existing_roots: Vec<&PathBuf> = writable_roots.iter().filter(|root| root.exists()).collect();
    if !existing_roots.is_empty() {
        ruleset = ruleset.add_rules(landlock::path_beneath_rules(existing_roots, access_rw))?;
    }

    let status = ruleset.restrict_self()?;

    if status.ruleset == landlock::RulesetStatus::NotEnforced {
        return Err(LinuxSandboxError::LandlockNotEnforced);
    }

    Ok(())
}

/// Installs a seccomp filter that blocks outbound network access except for
/// AF_UNIX domain sockets.
fn install_network_seccomp_filter_on_current_thread() -> Result<(), LinuxSandboxError> {
    let mut rules: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();

    // An empty rule vec is an unconditional match.
    let mut deny_syscall = |nr: i64| {
        rules.insert(nr, vec![]);
    };

    deny_syscall(libc::SYS_connect);
    deny_syscall(libc::SYS_accept);
    deny_syscall(libc::SYS_accept4);
    deny_syscall(libc::SYS_bind);
    deny_syscall(libc::SYS_listen);
    deny_syscall(libc::SYS_getpeername);
    deny_syscall(libc::SYS_getsockname);
    deny_syscall(libc::SYS_shutdown);
    deny_syscall(libc::SYS_sendto);
    deny_syscall(libc::SYS_sendmmsg);
    // recvfrom stays allowed: build tools talk to their own children over
    // socketpairs.
    deny_syscall(libc::SYS_recvmmsg);
    deny_syscall(libc::SYS_getsockopt);
    deny_syscall(libc::SYS_setsockopt);
    deny_syscall(libc::SYS_ptrace);
    deny_syscall(libc::SYS_io_uring_setup);
    deny_syscall(libc::SYS_io_uring_enter);
    deny_syscall(libc::SYS_io_uring_register);

    // socket/socketpair: allow AF_UNIX (arg0), deny everything else.
    let unix_only_rule = SeccompRule::new(vec![SeccompCondition::new(
        0,
        SeccompCmpArgLen::Dword,
        SeccompCmpOp::Ne,
        libc::AF_UNIX as u64,
    )?])?;

    rules.insert(libc::SYS_socket, vec![unix_only_rule.clone()]);
    rules.insert(libc::SYS_socketpair, vec![unix_only_rule]);

    let filter = SeccompFilter::new(
        rules,
        SeccompAction::Allow,
        SeccompAction::Errno(libc::EPERM as u32),
        seccomp_target_arch()?,
    )?;

    let prog: BpfProgram = filter.try_into()?;

    apply_filter(&prog)?;

    Ok(())
}

fn seccomp_target_arch() -> Result<TargetArch, LinuxSandboxError> {
    if cfg!(target_arch = "x86_64") {
        Ok(TargetArch::x86_64)
    } else if cfg!(target_arch = "aarch64") {
        Ok(TargetArch::aarch64)
    } else {
        Err(LinuxSandboxError::UnsupportedArchitecture)
    }
}
