use std::sync::LazyLock;

use regex::Regex;

static SPACE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{3000}]{2,}").expect("valid regex"));

static BLANK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Strip a byte-order mark and convert CRLF/CR line endings to LF
pub fn normalize_line_endings(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Collapse space runs, trim every line, and keep at most one blank line
/// between paragraphs
pub fn normalize_whitespace(text: &str) -> String {
    let collapsed = SPACE_RUN_RE.replace_all(text, " ");
    let trimmed: Vec<&str> = collapsed.split('\n').map(str::trim).collect();
    let joined = trimmed.join("\n");
    BLANK_RUN_RE.replace_all(&joined, "\n\n").trim().to_string()
}
