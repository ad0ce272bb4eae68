use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::cleaner::name_fallback;
use super::normalize::{normalize, split_after_terminal};
use crate::db::{PackagingRow, ParameterRow, VariationRow};

const LEAD_SENTENCES: usize = 2;
const MAX_HIGHLIGHTS: usize = 8;
const MAX_OPTIONS: usize = 8;
const MAX_PACKAGING: usize = 6;
const MAX_SHIPPING: usize = 5;
const MAX_SPECIFICATIONS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Shipping,
    Packaging,
    Options,
    Specifications,
    General,
}

/// Evaluated top to bottom, first match wins.
static SENTENCE_RULES: LazyLock<Vec<(Regex, Bucket)>> = LazyLock::new(|| {
    [
        (
            r"\b(?:ship|shipping|delivery|processing time|transit|ups|usps|freight|po box)\b",
            Bucket::Shipping,
        ),
        (
            r"\b(?:package|packaging|box|package includes?|includes?|in the box|carton)\b",
            Bucket::Packaging,
        ),
        (
            r"\b(?:option|optional|available|choose|selection|variant|color|size)\b",
            Bucket::Options,
        ),
        (
            r"\b(?:specifications?|dimensions?|material|weight|capacity)\b",
            Bucket::Specifications,
        ),
    ]
    .into_iter()
    .map(|(pattern, bucket)| (Regex::new(&format!("(?i){pattern}")).unwrap(), bucket))
    .collect()
});

static POLICY_NOISE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"return\s*(?:and|&)\s*refund",
        r"accept returns?",
        r"communication vouchers?",
        r"screenshot",
        r"wrong order|wrong purchase|customer dislike",
        r"please contact (?:the )?online customer service",
        r"items must be unworn|undamaged|original packaging",
        r"drop\s*shipping to 48 states",
        r"some remote states",
        r"warm\s*tip",
        r"no refund will be given",
        r"for any product problems?",
        r"orders must meet the following requirements?",
        r"with the buyer",
        r"product photos? or dynamic videos? showing the product in question",
        r"please provide a complete and (?:detailed |ed )?physical address",
        r"delivery to po box addresses?",
        r"please refer to the actual product for accuracy",
        r"measurement allowed error is \+/-?\s*1-?3\s*cm",
        r"pictures?,\s*videos?",
        r"\+/-?\s*10\s*g",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
    .collect()
});

static PACKAGING_NOISE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^details?$",
        r"^overview$",
        r"^specifications?$",
        r"^note:?$",
        r"^package:?$",
        r"^includes?:?$",
        r"outer packaging and label pictures?",
        r"communication vouchers?",
        r"distributor.?s order refund",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
    .collect()
});

static PACKAGING_SIGNAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:package|packaging|box|includes?|carton|bag|case|kit|set|qty|quantity)\b").unwrap()
});
static SHIPPING_CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ship|shipping|delivery|transit|carrier|processing|po box|freight|ups|usps|fedex|dhl)\b")
        .unwrap()
});
static BARE_SHIPPING_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(?:vulnerable|unlimited)$").unwrap());
static DROP_SHIPPING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bdrop\s*shipping\b").unwrap());
static OPTION_PARAMETER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)option|color|size|style|variant").unwrap());

static CLAUSE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*[;|]\s*").unwrap());
static NUMBERED_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" \d+\.(?:\s|$)").unwrap());
static NUMBERING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\d+\s*[).:-]+\s*").unwrap());
static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[-*•]+\s*").unwrap());
static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:details?|overview|highlights?|specifications?)\b\s*[:.-]*\s*").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DescriptionSections {
    pub description: String,
    pub highlights: Vec<String>,
    pub options: Vec<String>,
    pub packaging: Vec<String>,
    pub shipping: Vec<String>,
    pub specifications: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SectionInput<'a> {
    pub name: Option<&'a str>,
    pub long_description: Option<&'a str>,
    pub description: Option<&'a str>,
    pub variations: &'a [VariationRow],
    pub parameters: &'a [ParameterRow],
    pub packaging: &'a [PackagingRow],
    pub shipping_method: Option<&'a str>,
    pub shipping_limitations: Option<&'a str>,
    pub processing_time: Option<&'a str>,
}

/// Sort the product text into display sections and merge in the structured
/// variation, parameter and packaging rows.
pub fn build_description_sections(input: &SectionInput) -> DescriptionSections {
    let source = [input.long_description, input.description]
        .into_iter()
        .flatten()
        .map(normalize)
        .find(|s| !s.is_empty())
        .unwrap_or_default();

    let mut general = Vec::new();
    let mut options = build_options(input.variations, input.parameters);
    let mut packaging = build_packaging(input.packaging);
    let mut shipping = build_shipping_details(
        input.shipping_method,
        input.shipping_limitations,
        input.processing_time,
    );
    let mut specifications = Vec::new();

    for sentence in split_section_sentences(&source) {
        if is_policy_noise(&sentence) {
            continue;
        }
        match classify_sentence(&sentence) {
            Bucket::Shipping => shipping.push(sentence),
            Bucket::Packaging => {
                if PACKAGING_SIGNAL_RE.is_match(&sentence) && !is_packaging_noise(&sentence) {
                    packaging.push(sentence);
                }
            }
            Bucket::Options => options.push(sentence),
            Bucket::Specifications => specifications.push(sentence),
            Bucket::General => general.push(sentence),
        }
    }

    let mut lead: Vec<String> = general.iter().take(LEAD_SENTENCES).cloned().collect();
    let highlights: Vec<String> = general.into_iter().skip(LEAD_SENTENCES).collect();
    if lead.is_empty() {
        lead.extend(name_fallback(input.name));
    }

    DescriptionSections {
        description: lead.join(" "),
        highlights: clamp_items(highlights, MAX_HIGHLIGHTS),
        options: clamp_items(options, MAX_OPTIONS),
        packaging: clamp_items(packaging, MAX_PACKAGING),
        shipping: clamp_items(shipping, MAX_SHIPPING),
        specifications: clamp_items(specifications, MAX_SPECIFICATIONS),
    }
}

fn classify_sentence(sentence: &str) -> Bucket {
    SENTENCE_RULES
        .iter()
        .find(|(re, _)| re.is_match(sentence))
        .map(|(_, bucket)| *bucket)
        .unwrap_or(Bucket::General)
}

fn is_policy_noise(sentence: &str) -> bool {
    POLICY_NOISE.iter().any(|re| re.is_match(sentence))
}

fn is_packaging_noise(sentence: &str) -> bool {
    let text = normalize(sentence);
    text.is_empty() || PACKAGING_NOISE.iter().any(|re| re.is_match(&text))
}

/// Like the storage splitter, plus `;`/`|` clause breaks and a break before
/// inline numbered items (` 2.`).
fn split_section_sentences(text: &str) -> Vec<String> {
    let text = normalize(text);
    let text = CLAUSE_BREAK_RE.replace_all(&text, ". ");
    split_after_terminal(&text)
        .into_iter()
        .flat_map(split_before_numbered_items)
        .map(sanitize_section_sentence)
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_before_numbered_items(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for m in NUMBERED_ITEM_RE.find_iter(text) {
        parts.push(&text[start..m.start()]);
        start = m.start() + 1;
    }
    parts.push(&text[start..]);
    parts
}

fn sanitize_section_sentence(sentence: &str) -> String {
    let text = NUMBERING_RE.replace(sentence, "");
    let text = BULLET_RE.replace(&text, "");
    let text = LABEL_RE.replace(&text, "");
    normalize(&text)
}

/// Normalized, non-empty, case-insensitively unique; first occurrence wins.
fn unique_strings<I>(values: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|v| normalize(v.as_ref()))
        .filter(|text| !text.is_empty() && seen.insert(text.to_lowercase()))
        .collect()
}

fn clamp_items(values: Vec<String>, max_items: usize) -> Vec<String> {
    let mut items = unique_strings(values);
    items.truncate(max_items);
    items
}

fn labelled(label: Option<&str>, value: Option<&str>) -> String {
    let label = label.map(normalize).unwrap_or_default();
    let value = value.map(normalize).unwrap_or_default();
    match (label.is_empty(), value.is_empty()) {
        (false, false) => format!("{label}: {value}"),
        (true, _) => value,
        (false, true) => label,
    }
}

fn build_options(variations: &[VariationRow], parameters: &[ParameterRow]) -> Vec<String> {
    let from_variations = variations
        .iter()
        .map(|v| labelled(v.theme_name.as_deref(), v.variation_value.as_deref()));
    let from_parameters = parameters
        .iter()
        .filter(|p| {
            p.parameter_name
                .as_deref()
                .is_some_and(|name| OPTION_PARAMETER_RE.is_match(name))
        })
        .map(|p| labelled(p.parameter_name.as_deref(), p.parameter_value.as_deref()));

    unique_strings(from_variations.chain(from_parameters))
}

fn build_packaging(rows: &[PackagingRow]) -> Vec<String> {
    let rendered = rows.iter().map(|row| {
        let mut parts = Vec::new();
        if let Some(n) = row.package_number.filter(|n| *n != 0) {
            parts.push(format!("Package {n}"));
        }
        if let Some(size) = row.size.as_deref().map(normalize).filter(|s| !s.is_empty()) {
            parts.push(size);
        }
        if let Some(weight) = row.weight.filter(|w| *w != 0.0) {
            parts.push(format!("Weight {weight}"));
        }
        if let Some(content) = row.content.as_deref().map(normalize).filter(|s| !s.is_empty()) {
            parts.push(content);
        }
        parts.join(" - ")
    });

    unique_strings(rendered)
        .into_iter()
        .filter(|item| !is_packaging_noise(item))
        .collect()
}

fn build_shipping_details(
    method: Option<&str>,
    limitations: Option<&str>,
    processing_time: Option<&str>,
) -> Vec<String> {
    let method = method
        .map(normalize)
        .filter(|m| !m.is_empty())
        .map(|m| format!("Shipping method: {m}"));
    let processing = processing_time
        .map(normalize)
        .filter(|p| !p.is_empty())
        .map(|p| format!("Processing time: {p}"));
    let clauses = limitations
        .map(split_section_sentences)
        .unwrap_or_default()
        .into_iter()
        .filter(|clause| SHIPPING_CLAUSE_RE.is_match(clause));

    unique_strings(method.into_iter().chain(processing).chain(clauses))
        .into_iter()
        .filter(|item| {
            !is_policy_noise(item)
                && !BARE_SHIPPING_TOKEN_RE.is_match(item)
                && !DROP_SHIPPING_RE.is_match(item)
        })
        .collect()
}
