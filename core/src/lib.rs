//! Root of the `warden-core` library.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output goes through the tracing stack or the caller.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod approval;
mod background;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod exec;
mod landlock;
pub mod orchestrator;
mod process_group;
pub mod safety;
pub mod sandboxing;
mod seatbelt;
pub mod spawn;

pub use warden_protocol::models;
pub use warden_protocol::protocol;

pub use dispatch::ExecRequest;
pub use dispatch::dispatch;
pub use landlock::LINUX_SANDBOX_ARG0;
pub use orchestrator::Session;
pub use orchestrator::ToolCallOutcome;
pub use safety::get_platform_sandbox;
pub use warden_apply_patch::WARDEN_APPLY_PATCH_ARG1;
