//! Three-tier risk classification used by the approval gate.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use warden_protocol::protocol::RiskLevel;

use crate::bash::extract_bash_command;
use crate::bash::parse_shell_lc_plain_commands;
use crate::bash::try_parse_shell;
use crate::bash::try_parse_word_only_commands_sequence;
use crate::command_safety::is_dangerous_command::dangerous_command_reason;
use crate::command_safety::is_dangerous_command::program_name;
use crate::command_safety::is_safe_command::is_safe_to_call_with_exec;

#[derive(Debug, Error)]
pub enum RiskRulesError {
    #[error("invalid risk pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A pattern matched against the space-joined command text.
#[derive(Debug, Clone)]
pub struct RiskRule {
    pattern: Regex,
    description: String,
}

impl RiskRule {
    pub fn new(pattern: &str, description: impl Into<String>) -> Result<Self, RiskRulesError> {
        let compiled = Regex::new(pattern).map_err(|source| RiskRulesError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern: compiled,
            description: description.into(),
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

const DEFAULT_HIGH_RISK_PATTERNS: &[(&str, &str)] = &[
    (
        r"\brm\s+((-[a-zA-Z]*|--[a-z-]+)\s+)*(-[a-zA-Z]*[rRf]|--recursive\b|--force\b)",
        "forced or recursive deletion",
    ),
    (
        r"\b(sudo|doas)\b",
        "runs a command with elevated privileges",
    ),
    (r"\bmkfs(\.[a-z0-9]+)?\b", "formats a filesystem"),
    (r"\bdd\b.*\bof=", "writes raw data to a file or device"),
    (
        r"\b(curl|wget)\b[^|;&]*\|\s*(sudo\s+)?(ba|z|da|k)?sh\b",
        "pipes downloaded content into a shell",
    ),
    (r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "fork bomb"),
    (
        r"\bgit\s+push\b.*(--force|\s-f\b)",
        "force pushes or deletes remote refs",
    ),
    (
        r">\s*/dev/(sd|hd|nvme|disk|mmcblk)",
        "overwrites a block device",
    ),
    (
        r"\bchmod\s+(-R\s+)?0?777\s+/(\s|$)",
        "opens permissions on the filesystem root",
    ),
    (r"(?i)\bformat(\.com)?\s+[a-z]:", "formats a volume"),
    (
        r"(?i)\b(del|erase)\b.*\s/[sfq]\b",
        "force or recursive deletion",
    ),
    (r"(?i)\b(rd|rmdir)\b.*\s/s\b", "recursive directory removal"),
    (
        r"(?i)\bremove-item\b.*\s-(recurse|force)\b",
        "force or recursive deletion",
    ),
];

const DEFAULT_MEDIUM_RISK_PATTERNS: &[(&str, &str)] = &[
    (r"\b(curl|wget)\b", "accesses the network"),
    (
        r"\b(npm|pnpm|yarn|pip3?|cargo|gem|apt|apt-get|brew)\s+(install|add)\b",
        "installs packages",
    ),
    (
        r"\b(chmod|chown|chgrp)\b",
        "changes file ownership or permissions",
    ),
    (r"\b(kill|pkill|killall)\b", "terminates processes"),
    (
        r"\bgit\s+(commit|checkout|rebase|merge|stash|pull)\b",
        "modifies git state",
    ),
    (r"(^|\s)>{1,2}\s*[^&\s]", "redirects output into a file"),
];

fn compile_defaults(patterns: &[(&str, &str)]) -> Vec<RiskRule> {
    patterns
        .iter()
        .filter_map(|(pattern, description)| RiskRule::new(pattern, *description).ok())
        .collect()
}

static DEFAULT_HIGH_RISK_RULES: LazyLock<Vec<RiskRule>> =
    LazyLock::new(|| compile_defaults(DEFAULT_HIGH_RISK_PATTERNS));
static DEFAULT_MEDIUM_RISK_RULES: LazyLock<Vec<RiskRule>> =
    LazyLock::new(|| compile_defaults(DEFAULT_MEDIUM_RISK_PATTERNS));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// Human readable findings, in the order they were detected.
    pub issues: Vec<String>,
}

/// Heuristics used to classify a command. The defaults can be extended with
/// extra patterns and extra read-only programs from configuration.
#[derive(Debug, Clone)]
pub struct RiskRules {
    high: Vec<RiskRule>,
    medium: Vec<RiskRule>,
    low_commands: BTreeSet<String>,
}

impl Default for RiskRules {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_RISK_RULES.clone(),
            medium: DEFAULT_MEDIUM_RISK_RULES.clone(),
            low_commands: BTreeSet::new(),
        }
    }
}

impl RiskRules {
    /// Default rules plus the user supplied ones. Fails on the first pattern
    /// that is not a valid regex.
    pub fn with_overrides(
        high: &[String],
        medium: &[String],
        low_commands: &[String],
    ) -> Result<Self, RiskRulesError> {
        let mut rules = Self::default();
        for pattern in high {
            rules.high.push(RiskRule::new(
                pattern,
                format!("matches configured high-risk pattern `{pattern}`"),
            )?);
        }
        for pattern in medium {
            rules.medium.push(RiskRule::new(
                pattern,
                format!("matches configured medium-risk pattern `{pattern}`"),
            )?);
        }
        rules.low_commands.extend(low_commands.iter().cloned());
        Ok(rules)
    }

    pub fn assess(&self, command: &[String]) -> RiskAssessment {
        let text = command.join(" ");
        let subcommands = decompose(command);
        let mut issues = Vec::new();

        let structural = std::iter::once(command)
            .chain(subcommands.iter().flatten().map(Vec::as_slice))
            .filter_map(dangerous_command_reason);
        for reason in structural {
            push_unique(&mut issues, reason);
        }
        for rule in self.high.iter().filter(|rule| rule.is_match(&text)) {
            push_unique(&mut issues, rule.description());
        }
        if !issues.is_empty() {
            return RiskAssessment {
                level: RiskLevel::High,
                issues,
            };
        }

        for rule in self.medium.iter().filter(|rule| rule.is_match(&text)) {
            push_unique(&mut issues, rule.description());
        }
        let Some(subcommands) = subcommands else {
            push_unique(
                &mut issues,
                "uses shell constructs that cannot be analyzed statically",
            );
            return RiskAssessment {
                level: RiskLevel::Medium,
                issues,
            };
        };

        let read_only = !subcommands.is_empty()
            && subcommands.iter().all(|cmd| {
                is_safe_to_call_with_exec(cmd)
                    || cmd
                        .first()
                        .is_some_and(|program| self.low_commands.contains(program_name(program)))
            });
        let level = if issues.is_empty() && read_only {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        };
        RiskAssessment { level, issues }
    }
}

fn push_unique(issues: &mut Vec<String>, issue: &str) {
    if !issues.iter().any(|existing| existing == issue) {
        issues.push(issue.to_string());
    }
}

/// Splits a request into the plain commands it would run, or `None` when it
/// contains shell constructs beyond `&&`, `||`, `;` and `|`.
fn decompose(command: &[String]) -> Option<Vec<Vec<String>>> {
    if extract_bash_command(command).is_some() {
        return parse_shell_lc_plain_commands(command);
    }
    match command {
        [script] => {
            let tree = try_parse_shell(script)?;
            try_parse_word_only_commands_sequence(&tree, script)
        }
        _ => Some(vec![command.to_vec()]),
    }
}
