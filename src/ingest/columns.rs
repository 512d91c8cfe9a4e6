use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w]").expect("valid regex"));

/// Trims, turns whitespace runs into `_` and drops anything that is not a
/// letter, digit or underscore.
pub fn sanitize_column_name(raw: &str) -> String {
    let underscored = WHITESPACE.replace_all(raw.trim(), "_");
    NON_WORD.replace_all(&underscored, "").into_owned()
}

/// Sanitizes a full header. Names that end up empty become `column_<n>`
/// (1-based position) and repeats get a `_<k>` suffix, so the result is
/// always a set of distinct, non-empty identifiers.
pub fn sanitize_column_names(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut names = Vec::with_capacity(raw.len());

    for (idx, name) in raw.iter().enumerate() {
        let mut base = sanitize_column_name(name);
        if base.is_empty() {
            base = format!("column_{}", idx + 1);
        }

        let mut candidate = base.clone();
        let mut suffix = 2;
        // engine identifiers are case-insensitive
        while !seen.insert(candidate.to_lowercase()) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        names.push(candidate);
    }

    names
}
