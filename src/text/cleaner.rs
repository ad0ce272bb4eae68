use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::normalize::{char_len, cut_at_last_space, normalize, plain_text, split_sentences};

pub const DEFAULT_MAX_CHARS: usize = 900;
const MIN_SENTENCE_CHARS: usize = 8;

static EMPHASIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*+").unwrap());
static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[-*•·]+\s*").unwrap());
static NUMBERING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\d+\s*[).:-]+\s*").unwrap());
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:highlights?|details?|overview|illustrate|specifications?)\b\s*[:.-]*\s*").unwrap()
});
static DEDUPE_STRIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9 ]").unwrap());

static BOILERPLATE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(?:highlights?|details?|illustrate|overview|specifications?|warm tip|note)\s*[:.-]*$",
        r"please refer to the online information of the supplier",
        r"product notes?",
        r"dropshipping to 48 states",
        r"screenshots of communication records",
        r"return (?:and|&) refund",
        r"transit time is \d+-?\d*\s*business days",
        r"data-v-[a-z0-9]+",
        r"^\W+$",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
    .collect()
});

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanInput<'a> {
    pub description: Option<&'a str>,
    pub html_description: Option<&'a str>,
    pub name: Option<&'a str>,
    /// Zero means [`DEFAULT_MAX_CHARS`].
    pub max_chars: usize,
}

/// Storage-ready description: boilerplate removed, sentences deduplicated,
/// bounded by `max_chars`. `None` when there is nothing left and no name to
/// fall back on.
pub fn clean_description_for_storage(input: &CleanInput) -> Option<String> {
    let max_chars = if input.max_chars == 0 {
        DEFAULT_MAX_CHARS
    } else {
        input.max_chars
    };

    let plain_description = input.description.map(plain_text).unwrap_or_default();
    let plain_html = input.html_description.map(plain_text).unwrap_or_default();
    let source = if char_len(&plain_description) >= char_len(&plain_html) {
        plain_description
    } else {
        plain_html
    };
    let source = normalize(&EMPHASIS_RE.replace_all(&source, ""));

    let kept: Vec<String> = split_sentences(&source)
        .iter()
        .map(|s| sanitize_sentence(s))
        .filter(|s| !is_boilerplate(s))
        .collect();
    let joined = normalize(&dedupe_sentences(kept).join(" "));

    let result = if joined.is_empty() || is_boilerplate(&joined) {
        name_fallback(input.name).unwrap_or_default()
    } else {
        joined
    };

    let trimmed = trim_by_sentence(&result, max_chars);
    (!trimmed.is_empty()).then_some(trimmed)
}

pub(crate) fn name_fallback(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| format!("{n} built for outdoor use."))
}

/// Peel leading bullets, numbering and labels until none are left, so
/// stacked markers like `- - ` or `Highlights: Details:` all go.
fn sanitize_sentence(sentence: &str) -> String {
    let mut text = normalize(sentence);
    loop {
        let stripped = [&*BULLET_RE, &*NUMBERING_RE, &*LABEL_RE]
            .iter()
            .fold(text.clone(), |acc, re| re.replace(&acc, "").into_owned());
        let stripped = normalize(&stripped);
        if stripped == text {
            return text;
        }
        text = stripped;
    }
}

pub(crate) fn is_boilerplate(sentence: &str) -> bool {
    if char_len(sentence.trim()) < MIN_SENTENCE_CHARS {
        return true;
    }
    let text = sentence.to_lowercase();
    BOILERPLATE.iter().any(|re| re.is_match(&text))
}

fn dedupe_key(sentence: &str) -> String {
    let lower = sentence.to_lowercase();
    let stripped = DEDUPE_STRIP_RE.replace_all(&lower, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First occurrence wins.
fn dedupe_sentences(sentences: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    sentences
        .into_iter()
        .filter(|s| {
            let key = dedupe_key(s);
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

/// Keep whole sentences while they fit; when not even the first one fits,
/// cut at the last space inside the limit.
fn trim_by_sentence(text: &str, max_chars: usize) -> String {
    let normalized = normalize(text);
    if char_len(&normalized) <= max_chars {
        return normalized;
    }

    let mut result = String::new();
    let mut result_len = 0;
    for sentence in split_sentences(&normalized) {
        let sentence_len = char_len(&sentence);
        let next_len = if result.is_empty() {
            sentence_len
        } else {
            result_len + 1 + sentence_len
        };
        if next_len > max_chars {
            break;
        }
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(&sentence);
        result_len = next_len;
    }

    if !result.is_empty() {
        return result;
    }
    cut_at_last_space(&normalized, max_chars).trim().to_string()
}
