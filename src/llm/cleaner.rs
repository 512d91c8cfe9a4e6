use regex::Regex;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:[A-Za-z]+[ \t]*\r?\n|\r?\n)?(.*?)```").expect("valid regex"));
static FENCE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(sql)?").expect("valid regex"));
static LEADING_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(SQL Query:|Query:|SQL:)\s*").expect("valid regex"));

/// Reduces raw model output to a single line of SQL.
///
/// When the output holds a complete fenced block only that block is kept.
/// Stray fence markers and a leading `SQL:`-style label are dropped, then
/// blank lines and `--`/`#` comment lines are removed and the remaining
/// lines are joined with single spaces.
pub fn clean_sql(raw: &str) -> String {
    let body = match FENCED_BLOCK.captures(raw).and_then(|caps| caps.get(1)) {
        Some(block) => block.as_str(),
        None => raw,
    };

    let unfenced = FENCE_MARKER.replace_all(body, "");
    let unlabeled = LEADING_LABEL.replace(&unfenced, "");

    unlabeled
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--") && !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join(" ")
}
