//! Flat JSON payload returned to the agent loop for every tool call.

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecOutputPayload {
    /// Human-oriented summary: aggregated stdout/stderr for commands, the
    /// summary or error message for patches.
    pub output: String,
    pub stdout: String,
    pub stderr: String,
    pub metadata: ExecOutputMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecOutputMetadata {
    pub exit_code: i32,
    pub duration_seconds: f32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sandbox_denied: bool,
}

impl ExecOutputPayload {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            format!(r#"{{"output":"failed to serialize output: {err}","stdout":"","stderr":"","metadata":{{"exit_code":1,"duration_seconds":0.0}}}}"#)
        })
    }
}
