use tree_sitter::Node;
use tree_sitter::Parser;
use tree_sitter::Tree;
use tree_sitter_bash::LANGUAGE as BASH;

/// Parse the provided bash source using tree-sitter-bash, returning a Tree on
/// success or None if the grammar could not be loaded or parsing failed.
pub fn try_parse_shell(src: &str) -> Option<Tree> {
    let lang = BASH.into();
    let mut parser = Parser::new();
    parser.set_language(&lang).ok()?;
    parser.parse(src, None)
}

/// Parse a script which may contain multiple simple commands joined only by
/// the logical/pipe/sequencing operators: `&&`, `||`, `;`, `|`.
///
/// Returns `Some(Vec<command_words>)` if every command is a plain word-only
/// command and the parse tree does not contain other constructs
/// (parentheses, redirections, substitutions, control flow, etc.). Otherwise
/// returns `None`.
pub fn try_parse_word_only_commands_sequence(tree: &Tree, src: &str) -> Option<Vec<Vec<String>>> {
    if tree.root_node().has_error() {
        return None;
    }

    const ALLOWED_KINDS: &[&str] = &[
        // top level containers
        "program",
        "list",
        "pipeline",
        // commands & words
        "command",
        "command_name",
        "word",
        "string",
        "string_content",
        "raw_string",
        "number",
        "concatenation",
    ];
    const ALLOWED_PUNCT_TOKENS: &[&str] = &["&&", "||", ";", "|", "\"", "'"];

    let root = tree.root_node();
    let mut cursor = root.walk();
    let mut stack = vec![root];
    let mut command_nodes = Vec::new();
    while let Some(node) = stack.pop() {
        let kind = node.kind();
        if node.is_named() {
            if !ALLOWED_KINDS.contains(&kind) {
                return None;
            }
            if kind == "command" {
                command_nodes.push(node);
            }
        } else if !(ALLOWED_PUNCT_TOKENS.contains(&kind) || kind.trim().is_empty()) {
            // Redirects, background `&`, parentheses, braces, backticks...
            return None;
        }
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }

    // Walk uses a stack (LIFO), so re-sort by position to restore source order.
    command_nodes.sort_by_key(Node::start_byte);

    command_nodes
        .into_iter()
        .map(|node| parse_plain_command_from_node(node, src))
        .collect()
}

/// Returns the `(shell, script)` pair of a `bash -c "<script>"` style
/// invocation (`bash`, `zsh` or `sh`, with `-c` or `-lc`).
pub fn extract_bash_command(command: &[String]) -> Option<(&str, &str)> {
    let [shell, flag, script] = command else {
        return None;
    };
    let shell_name = std::path::Path::new(shell)
        .file_stem()
        .and_then(|name| name.to_str())?;
    if !matches!(flag.as_str(), "-lc" | "-c") || !matches!(shell_name, "bash" | "zsh" | "sh") {
        return None;
    }
    Some((shell, script))
}

/// Returns the sequence of plain commands within a `bash -lc "..."`
/// invocation when the script only contains word-only commands joined by
/// `&&`, `||`, `;` or `|`.
pub fn parse_shell_lc_plain_commands(command: &[String]) -> Option<Vec<Vec<String>>> {
    let (_, script) = extract_bash_command(command)?;
    let tree = try_parse_shell(script)?;
    try_parse_word_only_commands_sequence(&tree, script)
}

/// Whether a single command string can only be executed by a shell: it
/// contains pipes, lists, redirects, background `&`, subshells,
/// substitutions, expansions, or does not parse at all.
///
/// Multi-token commands are already argv and never need a shell.
pub fn requires_shell(command: &[String]) -> bool {
    let [script] = command else {
        return false;
    };
    !script.trim().is_empty() && parse_plain_command(script).is_none()
}

/// Splits a script made of exactly one plain command into its words, with
/// quotes removed.
pub fn parse_plain_command(script: &str) -> Option<Vec<String>> {
    let tree = try_parse_shell(script)?;
    if has_top_level_separator(&tree) {
        return None;
    }
    match try_parse_word_only_commands_sequence(&tree, script)?.as_slice() {
        [words] => Some(words.clone()),
        _ => None,
    }
}

fn has_top_level_separator(tree: &Tree) -> bool {
    let root = tree.root_node();
    let mut cursor = root.walk();
    root.children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == ";")
}

fn parse_plain_command_from_node(cmd: Node, src: &str) -> Option<Vec<String>> {
    if cmd.kind() != "command" {
        return None;
    }
    let mut words = Vec::new();
    let mut cursor = cmd.walk();
    for child in cmd.named_children(&mut cursor) {
        match child.kind() {
            "command_name" => {
                let word_node = child.named_child(0)?;
                if word_node.kind() != "word" {
                    return None;
                }
                words.push(word_node.utf8_text(src.as_bytes()).ok()?.to_owned());
            }
            "word" | "number" => {
                words.push(child.utf8_text(src.as_bytes()).ok()?.to_owned());
            }
            "string" => words.push(parse_double_quoted_string(child, src)?),
            "raw_string" => words.push(parse_raw_string(child, src)?),
            "concatenation" => {
                // Concatenated arguments such as -g"*.py".
                let mut concatenated = String::new();
                let mut concat_cursor = child.walk();
                for part in child.named_children(&mut concat_cursor) {
                    match part.kind() {
                        "word" | "number" => {
                            concatenated.push_str(part.utf8_text(src.as_bytes()).ok()?);
                        }
                        "string" => concatenated.push_str(&parse_double_quoted_string(part, src)?),
                        "raw_string" => concatenated.push_str(&parse_raw_string(part, src)?),
                        _ => return None,
                    }
                }
                if concatenated.is_empty() {
                    return None;
                }
                words.push(concatenated);
            }
            _ => return None,
        }
    }
    Some(words)
}

fn parse_double_quoted_string(node: Node, src: &str) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }

    let mut cursor = node.walk();
    for part in node.named_children(&mut cursor) {
        if part.kind() != "string_content" {
            return None;
        }
    }
    let raw = node.utf8_text(src.as_bytes()).ok()?;
    let stripped = raw
        .strip_prefix('"')
        .and_then(|text| text.strip_suffix('"'))?;
    Some(stripped.to_string())
}

fn parse_raw_string(node: Node, src: &str) -> Option<String> {
    if node.kind() != "raw_string" {
        return None;
    }

    let raw_string = node.utf8_text(src.as_bytes()).ok()?;
    raw_string
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_seq(src: &str) -> Option<Vec<Vec<String>>> {
        let tree = try_parse_shell(src)?;
        try_parse_word_only_commands_sequence(&tree, src)
    }

    fn one(s: &str) -> Vec<String> {
        vec![s.to_string()]
    }

    #[test]
    fn accepts_multiple_commands_with_allowed_operators() {
        let src = "ls && pwd; echo 'hi there' | wc -l";
        let cmds = parse_seq(src).unwrap();
        let expected: Vec<Vec<String>> = vec![
            vec!["ls".to_string()],
            vec!["pwd".to_string()],
            vec!["echo".to_string(), "hi there".to_string()],
            vec!["wc".to_string(), "-l".to_string()],
        ];
        assert_eq!(cmds, expected);
    }

    #[test]
    fn accepts_mixed_quote_concatenation() {
        assert_eq!(
            parse_seq(r#"echo "/usr"'/'"local"/bin"#).unwrap(),
            vec![vec!["echo".to_string(), "/usr/local/bin".to_string()]]
        );
    }

    #[test]
    fn rejects_substitutions_redirects_and_subshells() {
        assert!(parse_seq("echo $(pwd)").is_none());
        assert!(parse_seq("echo `pwd`").is_none());
        assert!(parse_seq("ls > out.txt").is_none());
        assert!(parse_seq("(ls)").is_none());
        assert!(parse_seq("echo hi & echo bye").is_none());
        assert!(parse_seq("FOO=bar ls").is_none());
        assert!(parse_seq("ls &&").is_none());
    }

    #[test]
    fn plain_single_token_does_not_require_shell() {
        assert!(!requires_shell(&one("ls -la")));
        assert!(!requires_shell(&one("git commit -m 'a message'")));
        assert!(!requires_shell(&one("")));
    }

    #[test]
    fn control_operators_require_shell() {
        for script in [
            "ls | wc -l",
            "cd src && ls",
            "false || echo fallback",
            "echo a; echo b",
            "sleep 10 &",
            "echo hi > out.txt",
            "cat < in.txt",
            "(cd src; ls)",
            "echo $(date)",
            "echo $HOME",
            "if true; then echo x; fi",
            "echo 'unterminated",
        ] {
            assert!(requires_shell(&one(script)), "expected shell for {script:?}");
        }
    }

    #[test]
    fn plain_command_is_split_into_words() {
        assert_eq!(
            parse_plain_command("git commit -m 'a message'"),
            Some(vec![
                "git".to_string(),
                "commit".to_string(),
                "-m".to_string(),
                "a message".to_string(),
            ])
        );
        assert_eq!(parse_plain_command("ls | wc -l"), None);
    }

    #[test]
    fn multi_token_commands_never_require_shell() {
        let command = vec!["echo".to_string(), "|".to_string(), "&&".to_string()];
        assert!(!requires_shell(&command));
    }

    #[test]
    fn extracts_bash_lc_scripts() {
        let command = vec![
            "/bin/bash".to_string(),
            "-lc".to_string(),
            "ls && pwd".to_string(),
        ];
        assert_eq!(
            parse_shell_lc_plain_commands(&command),
            Some(vec![vec!["ls".to_string()], vec!["pwd".to_string()]])
        );
        assert_eq!(
            extract_bash_command(&["python".to_string(), "-c".to_string(), "1".to_string()]),
            None
        );
    }
}
