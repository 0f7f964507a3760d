//! Parser for SEARCH/REPLACE edit blocks.
//!
//! ```text
//! ------- SEARCH
//! console.log("hello world");
//! =======
//! console.log("Hello, World!");
//! +++++++ REPLACE
//! ```
//!
//! The legacy form `<<<<<<< SEARCH` / `=======` / `>>>>>>> REPLACE` is also
//! accepted. Any run of three or more marker characters is recognised. Text
//! outside of blocks (fences, prose) is ignored.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOperation {
    /// Exact text to look for. Never empty.
    pub search: String,
    pub replace: String,
    /// Replace every occurrence instead of requiring a unique match.
    pub replace_all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchReplaceError {
    #[error("unterminated SEARCH block starting at line {line_number}: missing '=======' divider")]
    MissingDivider { line_number: usize },
    #[error("unterminated SEARCH block starting at line {line_number}: missing REPLACE marker")]
    MissingReplaceMarker { line_number: usize },
    #[error("SEARCH block starting at line {line_number} has empty search text")]
    EmptySearch { line_number: usize },
    #[error("no SEARCH/REPLACE blocks found")]
    NoBlocks,
}

enum State {
    Outside,
    Search {
        start_line: usize,
        lines: Vec<String>,
    },
    Replace {
        start_line: usize,
        search: Vec<String>,
        lines: Vec<String>,
    },
}

pub fn parse_search_replace_blocks(text: &str) -> Result<Vec<EditOperation>, SearchReplaceError> {
    let mut operations = Vec::new();
    let mut state = State::Outside;

    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        state = match state {
            State::Outside => {
                if is_search_marker(line) {
                    State::Search {
                        start_line: line_number,
                        lines: Vec::new(),
                    }
                } else {
                    State::Outside
                }
            }
            State::Search {
                start_line,
                mut lines,
            } => {
                if is_divider(line) {
                    State::Replace {
                        start_line,
                        search: lines,
                        lines: Vec::new(),
                    }
                } else {
                    lines.push(line.to_string());
                    State::Search { start_line, lines }
                }
            }
            State::Replace {
                start_line,
                search,
                mut lines,
            } => {
                if is_replace_marker(line) {
                    let search = search.join("\n");
                    if search.is_empty() {
                        return Err(SearchReplaceError::EmptySearch {
                            line_number: start_line,
                        });
                    }
                    operations.push(EditOperation {
                        search,
                        replace: lines.join("\n"),
                        replace_all: false,
                    });
                    State::Outside
                } else {
                    lines.push(line.to_string());
                    State::Replace {
                        start_line,
                        search,
                        lines,
                    }
                }
            }
        };
    }

    match state {
        State::Outside if operations.is_empty() => Err(SearchReplaceError::NoBlocks),
        State::Outside => Ok(operations),
        State::Search { start_line, .. } => Err(SearchReplaceError::MissingDivider {
            line_number: start_line,
        }),
        State::Replace { start_line, .. } => Err(SearchReplaceError::MissingReplaceMarker {
            line_number: start_line,
        }),
    }
}

/// Returns true when `line` is `<run of at least 3 `marker`s> <keyword>`.
fn is_marker_line(line: &str, marker: char, keyword: &str) -> bool {
    let line = line.trim_end();
    let rest = line.trim_start_matches(marker);
    let run = line.len() - rest.len();
    run >= 3 && rest.strip_prefix(' ').is_some_and(|kw| kw == keyword)
}

fn is_search_marker(line: &str) -> bool {
    is_marker_line(line, '-', "SEARCH") || is_marker_line(line, '<', "SEARCH")
}

fn is_divider(line: &str) -> bool {
    let line = line.trim_end();
    line.len() >= 3 && line.chars().all(|c| c == '=')
}

fn is_replace_marker(line: &str) -> bool {
    is_marker_line(line, '+', "REPLACE") || is_marker_line(line, '>', "REPLACE")
}
