/// Finds `pattern` within `lines` at or after `start`, returning the index of
/// the first matching line.
///
/// Matching is attempted with decreasing strictness: exact, then ignoring
/// trailing whitespace, then ignoring surrounding whitespace, then with
/// typographic punctuation folded to ASCII. When `eof` is set the pattern is
/// first tried against the end of the file.
pub(crate) fn seek_sequence(
    lines: &[String],
    pattern: &[String],
    start: usize,
    eof: bool,
) -> Option<usize> {
    if pattern.is_empty() {
        return Some(start);
    }
    if pattern.len() > lines.len() {
        return None;
    }
    let search_start = if eof && lines.len() >= pattern.len() {
        lines.len() - pattern.len()
    } else {
        start
    };
    let last_start = lines.len() - pattern.len();

    let matches_with = |eq: &dyn Fn(&str, &str) -> bool| {
        (search_start..=last_start).find(|&i| {
            pattern
                .iter()
                .enumerate()
                .all(|(p_idx, pat)| eq(&lines[i + p_idx], pat))
        })
    };

    matches_with(&|a, b| a == b)
        .or_else(|| matches_with(&|a, b| a.trim_end() == b.trim_end()))
        .or_else(|| matches_with(&|a, b| a.trim() == b.trim()))
        .or_else(|| matches_with(&|a, b| normalise(a) == normalise(b)))
}

fn normalise(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
            | '\u{2212}' => '-',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            '\u{00A0}' | '\u{2002}' | '\u{2003}' | '\u{2004}' | '\u{2005}' | '\u{2006}'
            | '\u{2007}' | '\u{2008}' | '\u{2009}' | '\u{200A}' | '\u{202F}' | '\u{205F}'
            | '\u{3000}' => ' ',
            other => other,
        })
        .collect()
}
