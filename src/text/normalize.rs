use std::sync::LazyLock;

use regex::Regex;

static ENTITIES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)&nbsp;", " "),
        (r"(?i)&amp;", "&"),
        (r"(?i)&quot;", "\""),
        (r"(?i)&#39;|&apos;", "'"),
        (r"(?i)&lt;", "<"),
        (r"(?i)&gt;", ">"),
        (r"(?i)&#8217;|&#8216;|&rsquo;|&lsquo;", "'"),
        (r"(?i)&#8220;|&#8221;|&rdquo;|&ldquo;", "\""),
        (r"(?i)&#8211;|&#8212;|&ndash;|&mdash;", "-"),
        (r"(?i)&#\d+;|&#x[0-9a-f]+;", " "),
    ]
    .into_iter()
    .map(|(pattern, plain)| (Regex::new(pattern).unwrap(), plain))
    .collect()
});

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").unwrap());
static STYLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").unwrap());
static TABLE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:table|thead|tbody|tr|td|th)\b[^>]*>.*?</(?:table|thead|tbody|tr|td|th)\s*>").unwrap()
});
static TABLE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(?:img|table|thead|tbody|tr|td|th)\b[^>]*>").unwrap());
static BR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static BLOCK_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</(?:p|div|li|h\d|ul|ol|section|article)\s*>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static SPACE_BEFORE_PUNCT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+([,.;:!?])").unwrap());
static LINE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\n+\s*").unwrap());
static SEMICOLON_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*;\s*").unwrap());

const REPEATABLE_PUNCT: &[char] = &['.', ':', '!', '?', ';', ',', '-'];
const TERMINAL_PUNCT: &[char] = &['.', '!', '?'];

/// Replace the known HTML entities with plain characters. Unknown numeric
/// entities become a single space.
pub fn decode_entities(text: &str) -> String {
    let mut out = text.to_string();
    for (re, plain) in ENTITIES.iter() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *plain).into_owned();
        }
    }
    out
}

/// Drop script/style/table blocks, turn line and block breaks into newlines,
/// and remove every other tag.
pub fn strip_html(text: &str) -> String {
    let out = SCRIPT_RE.replace_all(text, " ");
    let out = STYLE_RE.replace_all(&out, " ");
    let out = TABLE_BLOCK_RE.replace_all(&out, " ");
    let out = TABLE_TAG_RE.replace_all(&out, " ");
    let out = BR_RE.replace_all(&out, "\n");
    let out = BLOCK_CLOSE_RE.replace_all(&out, "\n");
    TAG_RE.replace_all(&out, " ").into_owned()
}

/// Collapse whitespace, pull punctuation onto the preceding word and squash
/// runs like `!!!` down to one mark.
pub fn normalize(text: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(text, " ");
    let tightened = SPACE_BEFORE_PUNCT_RE.replace_all(&collapsed, "$1");
    collapse_repeated_punctuation(&tightened).trim().to_string()
}

/// `strip_html`, `decode_entities` and `normalize` in that order.
pub fn plain_text(text: &str) -> String {
    normalize(&decode_entities(&strip_html(text)))
}

/// Newlines and semicolons count as sentence ends. A sentence ends after
/// `.`, `!` or `?` followed by whitespace; the mark stays with the sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let marked = LINE_BREAK_RE.replace_all(text, ". ");
    let marked = SEMICOLON_RE.replace_all(&marked, ". ");
    split_after_terminal(&marked)
        .into_iter()
        .map(normalize)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Raw split points only: after terminal punctuation followed by a whitespace run.
pub(crate) fn split_after_terminal(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch.is_whitespace() && prev.is_some_and(|p| TERMINAL_PUNCT.contains(&p)) {
            parts.push(&text[start..idx]);
            let mut end = idx + ch.len_utf8();
            while let Some(&(next_idx, next)) = chars.peek() {
                if !next.is_whitespace() {
                    break;
                }
                end = next_idx + next.len_utf8();
                chars.next();
            }
            start = end;
            prev = None;
            continue;
        }
        prev = Some(ch);
    }

    parts.push(&text[start..]);
    parts
}

fn collapse_repeated_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    for ch in text.chars() {
        if prev == Some(ch) && REPEATABLE_PUNCT.contains(&ch) {
            continue;
        }
        out.push(ch);
        prev = Some(ch);
    }
    out
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// First `max` characters, pulled back to the last space when there is one.
pub fn cut_at_last_space(text: &str, max: usize) -> &str {
    let sliced = truncate_chars(text, max);
    match sliced.rfind(' ') {
        Some(idx) if idx > 0 => &sliced[..idx],
        _ => sliced,
    }
}
