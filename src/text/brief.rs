use super::normalize::{char_len, cut_at_last_space, decode_entities, normalize, split_sentences, strip_html};

pub const BRIEF_MAX_CHARS: usize = 240;
const ELLIPSIS: char = '…';
const TRAILING_PUNCT: &[char] = &['.', ',', ';', ':', '!', '?', '-'];

#[derive(Debug, Clone, Copy, Default)]
pub struct BriefInput<'a> {
    pub description: Option<&'a str>,
    pub html_description: Option<&'a str>,
    pub name: Option<&'a str>,
}

/// One- or two-sentence teaser of at most [`BRIEF_MAX_CHARS`] characters.
/// No boilerplate filtering happens here.
pub fn generate_brief_description(input: &BriefInput) -> Option<String> {
    let source = [input.description, input.html_description]
        .into_iter()
        .flatten()
        .map(|raw| decode_entities(&strip_html(raw)))
        .find(|text| !normalize(text).is_empty());

    let Some(source) = source else {
        return input
            .name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| clamp_length(&format!("{n} — quality camping gear built for outdoor adventures.")));
    };

    let combined = match split_sentences(&source).as_slice() {
        [] => normalize(&source),
        [first] => first.clone(),
        [first, second, ..] => format!("{first} {second}"),
    };
    Some(clamp_length(&combined))
}

fn clamp_length(text: &str) -> String {
    if char_len(text) <= BRIEF_MAX_CHARS {
        return text.to_string();
    }
    // leave room for the ellipsis
    let compact = cut_at_last_space(text, BRIEF_MAX_CHARS - 1).trim();
    let compact = compact.strip_suffix(TRAILING_PUNCT).unwrap_or(compact);
    format!("{compact}{ELLIPSIS}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brief(description: &str) -> Option<String> {
        generate_brief_description(&BriefInput {
            description: Some(description),
            ..Default::default()
        })
    }

    #[test]
    fn takes_first_two_sentences() {
        assert_eq!(
            brief("Sleeps four. Sets up fast. Has two doors.").as_deref(),
            Some("Sleeps four. Sets up fast.")
        );
        assert_eq!(brief("Just one sentence here").as_deref(), Some("Just one sentence here"));
    }

    #[test]
    fn falls_through_to_html_when_description_is_blank() {
        let out = generate_brief_description(&BriefInput {
            description: Some("   "),
            html_description: Some("<p>Lightweight hammock.</p><p>Holds 200 kg.</p><p>Extra</p>"),
            name: Some("Hammock"),
        });
        assert_eq!(out.as_deref(), Some("Lightweight hammock. Holds 200 kg."));
    }

    #[test]
    fn long_text_is_clamped_with_ellipsis() {
        let long = vec!["rugged"; 80].join(" ");
        let out = brief(&format!("{long}. Second.")).unwrap();
        assert!(char_len(&out) <= BRIEF_MAX_CHARS);
        assert!(out.ends_with("rugged…"));
    }

    #[test]
    fn trailing_punctuation_is_dropped_before_ellipsis() {
        let words = vec!["tent,"; 60].join(" ");
        let out = brief(&words).unwrap();
        assert!(out.ends_with("tent…"));
        assert!(char_len(&out) <= BRIEF_MAX_CHARS);
    }

    #[test]
    fn unbroken_text_stays_within_limit() {
        let out = brief(&"a".repeat(500)).unwrap();
        assert_eq!(char_len(&out), BRIEF_MAX_CHARS);
    }

    #[test]
    fn name_fallback_and_empty() {
        let out = generate_brief_description(&BriefInput {
            name: Some("Camp Stove"),
            ..Default::default()
        });
        assert_eq!(
            out.as_deref(),
            Some("Camp Stove — quality camping gear built for outdoor adventures.")
        );
        assert_eq!(generate_brief_description(&BriefInput::default()), None);
    }
}
