use crate::protocol::SandboxKind;

/// The restricted sandbox available on this host, if any.
pub fn get_platform_sandbox() -> Option<SandboxKind> {
    if cfg!(target_os = "macos") {
        Some(SandboxKind::MacosSeatbelt)
    } else if cfg!(target_os = "linux") {
        Some(SandboxKind::LinuxLandlock)
    } else {
        None
    }
}
