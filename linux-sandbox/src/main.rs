/// Standalone entry point; `warden` also dispatches here when invoked as
/// `warden-linux-sandbox` through arg0.
fn main() -> ! {
    warden_linux_sandbox::run_main()
}
