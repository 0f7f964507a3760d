//! Process-group helpers used when spawning and reaping commands.
//!
//! - `set_process_group` runs in `pre_exec` so the child leads its own group
//!   and a timeout can kill grandchildren too.
//! - `detach_from_session` runs in `pre_exec` for background commands so they
//!   survive the caller.
//! - `set_parent_death_signal` (Linux only) delivers `SIGTERM` to the child
//!   when this process exits.
//!
//! On non-Unix platforms these helpers are no-ops.

use std::io;

use tokio::process::Child;

#[cfg(target_os = "linux")]
/// Ensure the child receives SIGTERM when the original parent dies.
///
/// `parent_pid` is captured before spawn; if the parent already exited
/// between fork and exec the child signals itself.
pub(crate) fn set_parent_death_signal(parent_pid: libc::pid_t) -> io::Result<()> {
    if unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) } == -1 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { libc::getppid() } != parent_pid {
        unsafe {
            libc::raise(libc::SIGTERM);
        }
    }

    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_process_group() -> io::Result<()> {
    if unsafe { libc::setpgid(0, 0) } == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(unix)]
/// Start a new session, which also drops the controlling terminal.
pub(crate) fn detach_from_session() -> io::Result<()> {
    if unsafe { libc::setsid() } == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(unix)]
/// SIGKILL the whole process group led by `child` (best-effort).
pub(crate) fn kill_child_process_group(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };

    let pgid = unsafe { libc::getpgid(pid as libc::pid_t) };
    if pgid == -1 {
        return ignore_missing_process(io::Error::last_os_error());
    }

    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == -1 {
        return ignore_missing_process(io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(unix)]
fn ignore_missing_process(err: io::Error) -> io::Result<()> {
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_child_process_group(_child: &mut Child) -> io::Result<()> {
    Ok(())
}
