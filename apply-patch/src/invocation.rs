//! Recognises exec requests that are really `apply_patch` invocations so they
//! can be routed through the patch pipeline instead of being spawned.

use std::path::Path;
use std::str::Utf8Error;
use std::sync::LazyLock;

use tree_sitter::LanguageError;
use tree_sitter::Parser;
use tree_sitter::Query;
use tree_sitter::QueryCursor;
use tree_sitter::StreamingIterator;
use tree_sitter_bash::LANGUAGE as BASH;

use crate::ApplyPatchArgs;
use crate::parser::ParseError;
use crate::parser::parse_patch;

const APPLY_PATCH_COMMANDS: [&str; 2] = ["apply_patch", "applypatch"];

#[derive(Debug, PartialEq)]
pub enum MaybeApplyPatch {
    Body(ApplyPatchArgs),
    ShellParseError(ExtractHeredocError),
    PatchParseError(ParseError),
    NotApplyPatch,
}

#[derive(Debug, PartialEq)]
pub enum ExtractHeredocError {
    CommandDidNotStartWithApplyPatch,
    FailedToLoadBashGrammar(LanguageError),
    HeredocNotUtf8(Utf8Error),
    FailedToParsePatchIntoAst,
    FailedToFindHeredocBody,
}

impl std::fmt::Display for ExtractHeredocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractHeredocError::CommandDidNotStartWithApplyPatch => {
                write!(f, "command did not start with apply_patch")
            }
            ExtractHeredocError::FailedToLoadBashGrammar(err) => {
                write!(f, "failed to load bash grammar: {err}")
            }
            ExtractHeredocError::HeredocNotUtf8(err) => write!(f, "heredoc is not UTF-8: {err}"),
            ExtractHeredocError::FailedToParsePatchIntoAst => {
                write!(f, "failed to parse shell script")
            }
            ExtractHeredocError::FailedToFindHeredocBody => {
                write!(f, "failed to find heredoc body")
            }
        }
    }
}

fn is_posix_shell(shell: &str, flag: &str) -> bool {
    let name = Path::new(shell)
        .file_stem()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    matches!(name, "bash" | "zsh" | "sh") && matches!(flag, "-lc" | "-c")
}

fn shell_script(argv: &[String]) -> Option<&str> {
    match argv {
        [shell, flag, script] if is_posix_shell(shell, flag) => Some(script.as_str()),
        _ => None,
    }
}

/// Detects `["apply_patch", "<patch>"]` and the heredoc form
/// `bash -lc "[cd <dir> &&] apply_patch <<'EOF' ... EOF"`.
pub fn maybe_parse_apply_patch(argv: &[String]) -> MaybeApplyPatch {
    match argv {
        [cmd, body] if APPLY_PATCH_COMMANDS.contains(&cmd.as_str()) => match parse_patch(body) {
            Ok(source) => MaybeApplyPatch::Body(source),
            Err(e) => MaybeApplyPatch::PatchParseError(e),
        },
        _ => match shell_script(argv) {
            Some(script) => match extract_apply_patch_from_bash(script) {
                Ok((body, workdir)) => match parse_patch(&body) {
                    Ok(mut source) => {
                        source.workdir = workdir;
                        MaybeApplyPatch::Body(source)
                    }
                    Err(e) => MaybeApplyPatch::PatchParseError(e),
                },
                Err(ExtractHeredocError::CommandDidNotStartWithApplyPatch) => {
                    MaybeApplyPatch::NotApplyPatch
                }
                Err(e) => MaybeApplyPatch::ShellParseError(e),
            },
            None => MaybeApplyPatch::NotApplyPatch,
        },
    }
}

/// True when a raw patch body was passed as the command itself (or as a
/// shell script) without calling `apply_patch`.
pub fn is_implicit_apply_patch(argv: &[String]) -> bool {
    if let [body] = argv
        && parse_patch(body).is_ok()
    {
        return true;
    }
    shell_script(argv).is_some_and(|script| parse_patch(script).is_ok())
}

/// Extracts the heredoc body (and the optional `cd` target) from a script
/// whose only top-level statement is `apply_patch <<'EOF'` or
/// `cd <path> && apply_patch <<'EOF'`.
fn extract_apply_patch_from_bash(
    src: &str,
) -> std::result::Result<(String, Option<String>), ExtractHeredocError> {
    // The `.` anchors make the redirected statement the only top-level
    // statement, so `echo x; apply_patch <<EOF` or a trailing `&& echo done`
    // do not match.
    static APPLY_PATCH_QUERY: LazyLock<Query> = LazyLock::new(|| {
        let language = BASH.into();
        #[expect(clippy::expect_used)]
        Query::new(
            &language,
            r#"
            (
              program
                . (redirected_statement
                    body: (command
                            name: (command_name (word) @apply_name) .)
                    (#any-of? @apply_name "apply_patch" "applypatch")
                    redirect: (heredoc_redirect
                                . (heredoc_start)
                                . (heredoc_body) @heredoc
                                . (heredoc_end)
                                .))
                .)

            (
              program
                . (redirected_statement
                    body: (list
                            . (command
                                name: (command_name (word) @cd_name) .
                                argument: [
                                  (word) @cd_path
                                  (string (string_content) @cd_path)
                                  (raw_string) @cd_raw_string
                                ] .)
                            "&&"
                            . (command
                                name: (command_name (word) @apply_name))
                            .)
                    (#eq? @cd_name "cd")
                    (#any-of? @apply_name "apply_patch" "applypatch")
                    redirect: (heredoc_redirect
                                . (heredoc_start)
                                . (heredoc_body) @heredoc
                                . (heredoc_end)
                                .))
                .)
            "#,
        )
        .expect("valid bash query")
    });

    let lang = BASH.into();
    let mut parser = Parser::new();
    parser
        .set_language(&lang)
        .map_err(ExtractHeredocError::FailedToLoadBashGrammar)?;
    let tree = parser
        .parse(src, None)
        .ok_or(ExtractHeredocError::FailedToParsePatchIntoAst)?;

    let bytes = src.as_bytes();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&APPLY_PATCH_QUERY, tree.root_node(), bytes);
    while let Some(m) = matches.next() {
        let mut heredoc_text: Option<String> = None;
        let mut cd_path: Option<String> = None;

        for capture in m.captures.iter() {
            let text = capture
                .node
                .utf8_text(bytes)
                .map_err(ExtractHeredocError::HeredocNotUtf8)?;
            match APPLY_PATCH_QUERY.capture_names()[capture.index as usize] {
                "heredoc" => heredoc_text = Some(text.trim_end_matches('\n').to_string()),
                "cd_path" => cd_path = Some(text.to_string()),
                "cd_raw_string" => {
                    let trimmed = text
                        .strip_prefix('\'')
                        .and_then(|s| s.strip_suffix('\''))
                        .unwrap_or(text);
                    cd_path = Some(trimmed.to_string());
                }
                _ => {}
            }
        }

        if let Some(heredoc) = heredoc_text {
            return Ok((heredoc, cd_path));
        }
    }

    Err(ExtractHeredocError::CommandDidNotStartWithApplyPatch)
}
