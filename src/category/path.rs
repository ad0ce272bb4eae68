use std::sync::LazyLock;

use regex::Regex;

static DELIMITER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*(?:>|/|\\|\|)\s*").unwrap());
static SLUG_STRIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static SLUG_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static SLUG_DASH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").unwrap());

pub const PATH_SEPARATOR: &str = " > ";

/// Trimmed, whitespace-collapsed name; `None` when nothing is left.
pub fn sanitize_category_name(value: &str) -> Option<String> {
    let text = value.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Split on `>`, `/`, `\` or `|` and drop empty segments.
pub fn split_category_path(raw: &str) -> Vec<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Vec::new();
    }
    DELIMITER_RE
        .split(text)
        .filter_map(sanitize_category_name)
        .collect()
}

pub fn join_category_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

pub fn slugify(value: &str) -> String {
    let lower = value.to_lowercase();
    let stripped = SLUG_STRIP_RE.replace_all(lower.trim(), "");
    let dashed = SLUG_SPACE_RE.replace_all(&stripped, "-");
    SLUG_DASH_RE.replace_all(&dashed, "-").into_owned()
}
