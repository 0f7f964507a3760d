//! Interactive approval on the controlling terminal. Prompts go to stderr so
//! stdout stays reserved for the JSON result; answers are read from stdin.

use std::io::BufRead;
use std::io::Write;
use std::path::Path;

use futures::FutureExt;
use futures::future::BoxFuture;
use owo_colors::OwoColorize;
use supports_color::Stream;
use tracing::warn;
use warden_apply_patch::ApplyPatchFileChange;
use warden_core::approval::ApprovalPrompter;
use warden_core::approval::CommandApprovalRequest;
use warden_core::approval::PatchApprovalRequest;
use warden_core::approval::format_command_for_display;
use warden_core::protocol::ApprovalDecision;
use warden_core::protocol::RiskLevel;

const ANSWER_HINT: &str = "[y]es / [a]lways this session / [n]o / [q]uit";

pub struct TerminalPrompter {
    color: bool,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            color: supports_color::on_cached(Stream::Stderr).is_some(),
        }
    }

    async fn ask(&self, prompt: String) -> ApprovalDecision {
        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<Option<String>> {
            let mut stderr = std::io::stderr().lock();
            stderr.write_all(prompt.as_bytes())?;
            stderr.flush()?;

            let mut line = String::new();
            let read = std::io::stdin().lock().read_line(&mut line)?;
            Ok((read > 0).then_some(line))
        })
        .await;

        match answer {
            Ok(Ok(Some(line))) => parse_answer(&line).unwrap_or_else(|| ApprovalDecision::Denied {
                reason: format!("unrecognised answer `{}`", line.trim()),
            }),
            Ok(Ok(None)) => ApprovalDecision::Denied {
                reason: "no answer: stdin is closed".to_string(),
            },
            Ok(Err(err)) => {
                warn!("failed to read approval answer: {err}");
                ApprovalDecision::Denied {
                    reason: format!("failed to read answer: {err}"),
                }
            }
            Err(err) => ApprovalDecision::Abort {
                reason: format!("approval prompt failed: {err}"),
            },
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalPrompter for TerminalPrompter {
    fn request_command_approval<'a>(
        &'a self,
        request: &'a CommandApprovalRequest,
    ) -> BoxFuture<'a, ApprovalDecision> {
        self.ask(render_command_prompt(request, self.color)).boxed()
    }

    fn request_patch_approval<'a>(
        &'a self,
        request: &'a PatchApprovalRequest,
    ) -> BoxFuture<'a, ApprovalDecision> {
        self.ask(render_patch_prompt(request, self.color)).boxed()
    }
}

pub fn parse_answer(line: &str) -> Option<ApprovalDecision> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(ApprovalDecision::Approved),
        "a" | "always" => Some(ApprovalDecision::ApprovedForSession),
        "n" | "no" | "" => Some(ApprovalDecision::Denied {
            reason: "declined by user".to_string(),
        }),
        "q" | "quit" => Some(ApprovalDecision::Abort {
            reason: "user aborted the turn".to_string(),
        }),
        _ => None,
    }
}

fn risk_badge(level: RiskLevel, color: bool) -> String {
    let label = format!("{} risk", level.to_string().to_uppercase());
    if !color {
        return format!("[{label}]");
    }
    match level {
        RiskLevel::Low => label.green().to_string(),
        RiskLevel::Medium => label.yellow().bold().to_string(),
        RiskLevel::High => label.red().bold().to_string(),
    }
}

fn push_details(
    out: &mut String,
    cwd: &Path,
    level: RiskLevel,
    issues: &[String],
    reason: &str,
    color: bool,
) {
    out.push_str(&format!("  cwd: {}\n", cwd.display()));
    out.push_str(&format!("  {} ({reason})\n", risk_badge(level, color)));
    for issue in issues {
        out.push_str(&format!("  - {issue}\n"));
    }
}

pub fn render_command_prompt(request: &CommandApprovalRequest, color: bool) -> String {
    let command = format_command_for_display(&request.command);
    let command = if color {
        command.bold().to_string()
    } else {
        command
    };

    let mut out = format!("\nwarden wants to run:\n  $ {command}\n");
    push_details(
        &mut out,
        &request.cwd,
        request.risk.level,
        &request.risk.issues,
        &request.reason,
        color,
    );
    out.push_str(&format!("Allow? {ANSWER_HINT}: "));
    out
}

pub fn render_patch_prompt(request: &PatchApprovalRequest, color: bool) -> String {
    let mut out = String::from("\nwarden wants to edit files:\n");
    for (path, change) in &request.changes {
        match change {
            ApplyPatchFileChange::Add { content } => {
                out.push_str(&format!("A {}\n", path.display()));
                for line in content.lines() {
                    out.push_str(&diff_line(&format!("+{line}"), color));
                }
            }
            ApplyPatchFileChange::Delete { .. } => {
                out.push_str(&format!("D {}\n", path.display()));
            }
            ApplyPatchFileChange::Update {
                unified_diff,
                move_path,
                ..
            } => {
                match move_path {
                    Some(dest) => out.push_str(&format!(
                        "M {} -> {}\n",
                        path.display(),
                        dest.display()
                    )),
                    None => out.push_str(&format!("M {}\n", path.display())),
                }
                for line in unified_diff.lines() {
                    out.push_str(&diff_line(line, color));
                }
            }
        }
    }
    push_details(
        &mut out,
        &request.cwd,
        request.risk.level,
        &request.risk.issues,
        &request.reason,
        color,
    );
    out.push_str(&format!("Apply? {ANSWER_HINT}: "));
    out
}

fn diff_line(line: &str, color: bool) -> String {
    if !color {
        return format!("    {line}\n");
    }
    let line = if line.starts_with("@@") {
        line.cyan().to_string()
    } else if line.starts_with('+') && !line.starts_with("+++") {
        line.green().to_string()
    } else if line.starts_with('-') && !line.starts_with("---") {
        line.red().to_string()
    } else {
        line.to_string()
    };
    format!("    {line}\n")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use warden_core::approval::RiskAssessment;

    fn command_request(level: RiskLevel, issues: &[&str]) -> CommandApprovalRequest {
        CommandApprovalRequest {
            command: vec!["rm".to_string(), "-rf".to_string(), "my dir".to_string()],
            cwd: PathBuf::from("/work"),
            risk: RiskAssessment {
                level,
                issues: issues.iter().map(|issue| issue.to_string()).collect(),
            },
            reason: "high risk command".to_string(),
        }
    }

    #[test]
    fn answers_map_to_decisions() {
        assert_eq!(parse_answer("y\n"), Some(ApprovalDecision::Approved));
        assert_eq!(
            parse_answer(" Always "),
            Some(ApprovalDecision::ApprovedForSession)
        );
        assert!(matches!(
            parse_answer("\n"),
            Some(ApprovalDecision::Denied { .. })
        ));
        assert!(matches!(
            parse_answer("q"),
            Some(ApprovalDecision::Abort { .. })
        ));
        assert_eq!(parse_answer("maybe"), None);
    }

    #[test]
    fn command_prompt_shows_literal_command_and_risk() {
        let prompt = render_command_prompt(
            &command_request(RiskLevel::High, &["recursive delete"]),
            false,
        );

        assert_eq!(
            prompt,
            "\nwarden wants to run:\n  $ rm -rf 'my dir'\n  cwd: /work\n  [HIGH risk] (high risk command)\n  - recursive delete\nAllow? [y]es / [a]lways this session / [n]o / [q]uit: "
        );
    }

    #[test]
    fn risk_badge_is_coloured_when_enabled() {
        let prompt = render_command_prompt(&command_request(RiskLevel::High, &[]), true);
        assert!(prompt.contains("\u{1b}[31m"));
        assert!(!prompt.contains("[HIGH risk]"));
    }

    #[test]
    fn patch_prompt_lists_each_file() {
        let request = PatchApprovalRequest {
            cwd: PathBuf::from("/work"),
            changes: vec![
                (
                    PathBuf::from("new.txt"),
                    ApplyPatchFileChange::Add {
                        content: "hello\n".to_string(),
                    },
                ),
                (
                    PathBuf::from("old.txt"),
                    ApplyPatchFileChange::Delete {
                        content: "bye\n".to_string(),
                    },
                ),
            ],
            risk: RiskAssessment {
                level: RiskLevel::Medium,
                issues: vec!["deletes old.txt".to_string()],
            },
            reason: "every patch needs approval in always-ask mode".to_string(),
        };

        let prompt = render_patch_prompt(&request, false);

        assert!(prompt.contains("A new.txt\n    +hello\n"));
        assert!(prompt.contains("D old.txt\n"));
        assert!(prompt.contains("[MEDIUM risk]"));
        assert!(prompt.contains("  - deletes old.txt\n"));
    }
}
