//! Types shared between the Warden crates: sandbox and approval vocabulary,
//! file-change descriptions, and the JSON payload reported to callers.

pub mod models;
pub mod protocol;
