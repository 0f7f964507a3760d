use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellType {
    Bash,
    Zsh,
    Sh,
    Cmd,
    PowerShell,
}

/// The shell used to run commands that contain control operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    pub shell_type: ShellType,
    pub shell_path: PathBuf,
}

impl Shell {
    /// Wraps `script` into an argv that runs it through this shell.
    pub fn derive_exec_args(&self, script: &str) -> Vec<String> {
        let program = self.shell_path.to_string_lossy().into_owned();
        match self.shell_type {
            ShellType::Bash | ShellType::Zsh | ShellType::Sh => {
                vec![program, "-c".to_string(), script.to_string()]
            }
            ShellType::Cmd => vec![program, "/c".to_string(), script.to_string()],
            ShellType::PowerShell => vec![
                program,
                "-NoProfile".to_string(),
                "-Command".to_string(),
                script.to_string(),
            ],
        }
    }
}

pub fn detect_shell_type(shell_path: &Path) -> Option<ShellType> {
    match shell_path.as_os_str().to_str() {
        Some("zsh") => Some(ShellType::Zsh),
        Some("sh") => Some(ShellType::Sh),
        Some("cmd") => Some(ShellType::Cmd),
        Some("bash") => Some(ShellType::Bash),
        Some("pwsh" | "powershell") => Some(ShellType::PowerShell),
        _ => {
            let shell_name = Path::new(shell_path.file_stem()?);
            if shell_name != shell_path {
                return detect_shell_type(shell_name);
            }
            None
        }
    }
}

/// Picks `bash` from `PATH` when available, falling back to `/bin/sh` on
/// Unix and `cmd` on Windows.
pub fn default_user_shell() -> Shell {
    if cfg!(windows) {
        return Shell {
            shell_type: ShellType::Cmd,
            shell_path: which::which("cmd").unwrap_or_else(|_| PathBuf::from("cmd")),
        };
    }
    match which::which("bash") {
        Ok(shell_path) => Shell {
            shell_type: ShellType::Bash,
            shell_path,
        },
        Err(_) => Shell {
            shell_type: ShellType::Sh,
            shell_path: PathBuf::from("/bin/sh"),
        },
    }
}
