use std::future::Future;
use std::path::Path;
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::fs::symlink;
use tempfile::TempDir;
use warden_core::LINUX_SANDBOX_ARG0;
use warden_core::WARDEN_APPLY_PATCH_ARG1;

const APPLY_PATCH_ARG0: &str = "apply_patch";
const MISSPELLED_APPLY_PATCH_ARG0: &str = "applypatch";
const TOKIO_WORKER_STACK_SIZE_BYTES: usize = 16 * 1024 * 1024;

/// Which program the current process should behave as, decided from argv.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg0Role {
    LinuxSandbox,
    ApplyPatch,
    /// `warden --warden-run-as-apply-patch PATCH`; `None` when PATCH is
    /// missing or not UTF-8.
    ApplyPatchFlag(Option<String>),
    Warden,
}

fn classify_invocation<I>(mut args: I) -> Arg0Role
where
    I: Iterator<Item = std::ffi::OsString>,
{
    let argv0 = args.next().unwrap_or_default();
    let exe_name = Path::new(&argv0)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("");

    if exe_name == LINUX_SANDBOX_ARG0 {
        return Arg0Role::LinuxSandbox;
    }
    if exe_name == APPLY_PATCH_ARG0 || exe_name == MISSPELLED_APPLY_PATCH_ARG0 {
        return Arg0Role::ApplyPatch;
    }
    if args.next().is_some_and(|arg| arg == WARDEN_APPLY_PATCH_ARG1) {
        let patch = args.next().and_then(|arg| arg.into_string().ok());
        return Arg0Role::ApplyPatchFlag(patch);
    }
    Arg0Role::Warden
}

/// Ships `warden`, `warden-linux-sandbox` and `apply_patch` as one binary by
/// looking at the name it was invoked under.
///
/// Helper roles never return. For a regular invocation this:
///
/// 1.  Loads `.env` from the Warden home before any threads exist.
/// 2.  Puts `apply_patch` aliases on `PATH` so sandboxed commands can use it.
/// 3.  Builds a multi-thread Tokio runtime and runs `main_fn` on it, passing
///     the current executable as the Linux sandbox helper on Linux.
pub fn arg0_dispatch_or_else<F, Fut>(main_fn: F) -> anyhow::Result<()>
where
    F: FnOnce(Option<PathBuf>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    match classify_invocation(std::env::args_os()) {
        Arg0Role::LinuxSandbox => warden_linux_sandbox::run_main(),
        Arg0Role::ApplyPatch => warden_apply_patch::main(),
        Arg0Role::ApplyPatchFlag(patch) => std::process::exit(run_apply_patch_flag(patch)),
        Arg0Role::Warden => {}
    }

    // Mutates the environment, so it has to happen while single-threaded.
    load_dotenv();
    let _path_entry = match prepend_path_entry_for_apply_patch() {
        Ok(entry) => Some(entry),
        Err(err) => {
            eprintln!("WARNING: proceeding, even though we could not update PATH: {err}");
            None
        }
    };

    let runtime = build_runtime()?;
    runtime.block_on(async move {
        let linux_sandbox_exe = if cfg!(target_os = "linux") {
            std::env::current_exe().ok()
        } else {
            None
        };
        main_fn(linux_sandbox_exe).await
    })
}

fn run_apply_patch_flag(patch: Option<String>) -> i32 {
    let Some(patch) = patch else {
        eprintln!("Error: {WARDEN_APPLY_PATCH_ARG1} requires a UTF-8 PATCH argument.");
        return 1;
    };
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    match warden_apply_patch::apply_patch(&patch, &mut stdout, &mut stderr) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn build_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    builder.thread_stack_size(TOKIO_WORKER_STACK_SIZE_BYTES);
    Ok(builder.build()?)
}

const ILLEGAL_ENV_VAR_PREFIX: &str = "WARDEN_";

/// Load env vars from `$WARDEN_HOME/.env`. Keys starting with `WARDEN_` are
/// ignored so a `.env` file cannot reconfigure the sandbox.
fn load_dotenv() {
    if let Ok(warden_home) = warden_core::config::find_warden_home()
        && let Ok(iter) = dotenvy::from_path_iter(warden_home.join(".env"))
    {
        for (key, value) in allowed_env_vars(iter) {
            // Safe: the process is still single-threaded here.
            unsafe { std::env::set_var(&key, &value) };
        }
    }
}

fn allowed_env_vars<I>(iter: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = Result<(String, String), dotenvy::Error>>,
{
    iter.into_iter()
        .flatten()
        .filter(|(key, _)| !key.to_ascii_uppercase().starts_with(ILLEGAL_ENV_VAR_PREFIX))
        .collect()
}

/// Creates a temporary directory holding `apply_patch` aliases of the current
/// executable (symlinks on Unix, `.bat` shims on Windows) and prepends it to
/// `PATH`. The directory lives as long as the returned guard.
///
/// Must be called before any other threads are spawned.
pub fn prepend_path_entry_for_apply_patch() -> std::io::Result<TempDir> {
    let temp_dir = TempDir::with_prefix("warden-arg0")?;
    let exe = std::env::current_exe()?;
    create_aliases(temp_dir.path(), &exe)?;

    let updated = prepend_to_path_var(temp_dir.path(), std::env::var_os("PATH"))?;
    unsafe {
        std::env::set_var("PATH", updated);
    }
    Ok(temp_dir)
}

fn create_aliases(dir: &Path, exe: &Path) -> std::io::Result<()> {
    for filename in [APPLY_PATCH_ARG0, MISSPELLED_APPLY_PATCH_ARG0] {
        #[cfg(unix)]
        symlink(exe, dir.join(filename))?;

        #[cfg(windows)]
        std::fs::write(
            dir.join(format!("{filename}.bat")),
            format!(
                "@echo off\r\n\"{}\" {WARDEN_APPLY_PATCH_ARG1} %*\r\n",
                exe.display()
            ),
        )?;
    }
    Ok(())
}

fn prepend_to_path_var(
    entry: &Path,
    existing: Option<std::ffi::OsString>,
) -> std::io::Result<std::ffi::OsString> {
    let mut paths = vec![entry.to_path_buf()];
    if let Some(existing) = existing {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).map_err(std::io::Error::other)
}
