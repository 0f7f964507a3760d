//! Linux sandbox helper entry point.
//!
//! On Linux, `warden-linux-sandbox` applies `no_new_privs`, Landlock
//! filesystem rules and (when network access is disabled) a seccomp filter
//! to itself, then `execvp`s the requested command.
#[cfg(target_os = "linux")]
mod landlock;
#[cfg(target_os = "linux")]
mod linux_run_main;

#[cfg(target_os = "linux")]
pub use landlock::LinuxSandboxError;

#[cfg(target_os = "linux")]
pub fn run_main() -> ! {
    linux_run_main::run_main();
}

#[cfg(not(target_os = "linux"))]
pub fn run_main() -> ! {
    eprintln!("warden-linux-sandbox is only supported on Linux");
    std::process::exit(1);
}
