//! Free-text product metadata to canonical category path.
//!
//! Rules are an ordered list; the first rule with a matching include pattern
//! and no matching exclude pattern decides the category. When nothing
//! matches, the raw category path is kept minus a leading "Outdoor(s)" root.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::path::{join_category_path, split_category_path};
use crate::error::{CatalogError, Result};

pub const FALLBACK_CATEGORY: &str = "Camp Accessories > General";

type RuleTable = &'static [(&'static str, &'static [&'static str], &'static [&'static str])];

const BUILTIN_RULES: RuleTable = &[
    (
        "Tents & Shelters > Tents",
        &[r"\b(tent|rooftop tent|pop up tent|dome tent|camping tent)\b"],
        &[r"\btarp\b"],
    ),
    (
        "Tents & Shelters > Canopies & Tarps",
        &[r"\b(canopy|tarp|rainfly|sunshade tent|shade shelter)\b"],
        &[r"\bchair\b"],
    ),
    ("Sleeping Gear > Sleeping Bags", &[r"\bsleeping bag\b"], &[]),
    (
        "Sleeping Gear > Sleeping Pads",
        &[r"\b(sleeping pad|sleeping mat|foam mat|self inflating|inflatable seat cushion|seat cushion)\b"],
        &[],
    ),
    (
        "Sleeping Gear > Air Mattresses",
        &[r"\b(air mattress|inflatable mattress|blow up bed|car air mattress)\b"],
        &[r"\b(sleeping pad|sleeping mat|foam mat)\b"],
    ),
    ("Camp Furniture > Hammocks", &[r"\bhammock\b"], &[]),
    (
        "Camp Furniture > Chairs",
        &[r"\b(camping chair|folding chair|rocking chair|beach chair|director.?s chair|camp stool|lawn chair|portable chair)\b"],
        &[],
    ),
    ("Camp Furniture > Tables", &[r"\bcamping table\b", r"\bfold(ing)? table\b"], &[]),
    (
        "Camp Furniture > Outdoor Utilities",
        &[r"\b(portable hand wash sink|hand wash sink|faucet station)\b"],
        &[],
    ),
    (
        "Backpacks & Bags > Backpacks",
        &[r"\b(backpack|daypack|mountaineering backpack|drawstring backpack)\b"],
        &[r"\bsleeping bag\b"],
    ),
    (
        "Backpacks & Bags > Pouches",
        &[r"\b(molle pouch|waist belt bag|edc pouch|utility pouch)\b"],
        &[],
    ),
    (
        "Camp Kitchen > Stoves & Burners",
        &[r"\b(stove|burner|hot plate|charcoal starter)\b"],
        &[],
    ),
    ("Camp Kitchen > Grills", &[r"\b(grill|grate|campfire grill|bbq)\b"], &[]),
    (
        "Camp Kitchen > Cooking Utensils",
        &[r"\b(spatula|utensil|tableware|fork|spoon|knife)\b"],
        &[],
    ),
    (
        "Camp Kitchen > Cookware",
        &[r"\b(skillet|cookware|pot\b|pan\b|teapot\b|sauce pan|cast iron)\b"],
        &[],
    ),
    (
        "Camp Kitchen > Coolers & Food Storage",
        &[r"\b(cooler bag|cooling bag|insulated grocery bag|lunch bag)\b"],
        &[],
    ),
];

static DEFAULT_RULES: LazyLock<RuleSet> = LazyLock::new(|| RuleSet {
    rules: BUILTIN_RULES
        .iter()
        .map(|(path, include, exclude)| CategoryRule {
            category_path: path.to_string(),
            include: include.iter().map(|p| case_insensitive(p).unwrap()).collect(),
            exclude: exclude.iter().map(|p| case_insensitive(p).unwrap()).collect(),
        })
        .collect(),
});

fn case_insensitive(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!("(?i){pattern}"))
}

#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub category_path: String,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl CategoryRule {
    pub fn matches(&self, context: &str) -> bool {
        self.include.iter().any(|re| re.is_match(context))
            && !self.exclude.iter().any(|re| re.is_match(context))
    }
}

/// Pattern as written in a rule file: `{"keyword": "hammock"}` or `{"regex": "..."}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternSpec {
    Keyword(String),
    Regex(String),
}

impl PatternSpec {
    fn compile(&self) -> std::result::Result<Regex, regex::Error> {
        match self {
            PatternSpec::Keyword(word) => case_insensitive(&format!(r"\b{}\b", regex::escape(word.trim()))),
            PatternSpec::Regex(pattern) => case_insensitive(pattern),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub category_path: String,
    pub include: Vec<PatternSpec>,
    #[serde(default)]
    pub exclude: Vec<PatternSpec>,
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<CategoryRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        DEFAULT_RULES.clone()
    }
}

impl RuleSet {
    pub fn from_specs(specs: Vec<RuleSpec>) -> Result<Self> {
        let rules = specs
            .into_iter()
            .map(|spec| {
                let compile = |patterns: &[PatternSpec]| {
                    patterns
                        .iter()
                        .map(PatternSpec::compile)
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map_err(|source| CatalogError::InvalidRule {
                            path: spec.category_path.clone(),
                            source,
                        })
                };
                Ok(CategoryRule {
                    include: compile(&spec.include)?,
                    exclude: compile(&spec.exclude)?,
                    category_path: spec.category_path,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RuleSet { rules })
    }

    /// Parse a JSON array of rules, in evaluation order.
    pub fn from_json(json: &str) -> Result<Self> {
        let specs: Vec<RuleSpec> = serde_json::from_str(json)?;
        Self::from_specs(specs)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Path of the first matching rule.
    pub fn classify(&self, context: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(context))
            .map(|rule| rule.category_path.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProductFields<'a> {
    pub name: Option<&'a str>,
    pub category: Option<&'a str>,
    pub description: Option<&'a str>,
    pub html_description: Option<&'a str>,
    pub brand: Option<&'a str>,
}

/// Lowercased `name | category | description | html | brand`, empty fields skipped.
fn build_context(fields: &ProductFields) -> String {
    let joined = [
        fields.name,
        fields.category,
        fields.description,
        fields.html_description,
        fields.brand,
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.trim().is_empty())
    .collect::<Vec<_>>()
    .join(" | ");

    joined.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn without_outdoor_root(raw: &str) -> Vec<String> {
    let mut parts = split_category_path(raw);
    if parts
        .first()
        .is_some_and(|first| first.eq_ignore_ascii_case("outdoor") || first.eq_ignore_ascii_case("outdoors"))
    {
        parts.remove(0);
    }
    parts
}

pub fn normalize_product_category(fields: &ProductFields, rules: &RuleSet) -> String {
    let context = build_context(fields);
    if let Some(path) = rules.classify(&context) {
        return path.to_string();
    }

    let trimmed = without_outdoor_root(fields.category.unwrap_or_default());
    if trimmed.is_empty() {
        return FALLBACK_CATEGORY.to_string();
    }
    join_category_path(&trimmed)
}

/// [`normalize_product_category`] with the built-in camping rules.
pub fn normalize_product_category_default(fields: &ProductFields) -> String {
    normalize_product_category(fields, &DEFAULT_RULES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(name: Option<&str>, category: &str) -> String {
        normalize_product_category_default(&ProductFields {
            name,
            category: Some(category),
            ..Default::default()
        })
    }

    #[test]
    fn builtin_table_is_complete() {
        assert_eq!(RuleSet::default().len(), 16);
    }

    #[test]
    fn dome_tent() {
        assert_eq!(
            classify(Some("4-Person Dome Camping Tent"), "Outdoor > Tents"),
            "Tents & Shelters > Tents"
        );
    }

    #[test]
    fn outdoor_root_is_stripped() {
        assert_eq!(classify(None, "Outdoor > Misc"), "Misc");
        assert_eq!(classify(None, "OUTDOORS / Lighting / Lanterns"), "Lighting > Lanterns");
        assert_eq!(classify(None, "Garden > Outdoor"), "Garden > Outdoor");
    }

    #[test]
    fn empty_category_uses_fallback() {
        assert_eq!(classify(None, ""), FALLBACK_CATEGORY);
        assert_eq!(classify(None, "  Outdoor  "), FALLBACK_CATEGORY);
        assert_eq!(normalize_product_category_default(&ProductFields::default()), FALLBACK_CATEGORY);
    }

    #[test]
    fn exclusions_pass_to_later_rules() {
        assert_eq!(
            classify(Some("Waterproof Tent Tarp 10x10"), ""),
            "Tents & Shelters > Canopies & Tarps"
        );
        assert_eq!(
            classify(Some("Air Mattress with Sleeping Pad"), ""),
            "Sleeping Gear > Sleeping Pads"
        );
        assert_eq!(
            classify(Some("Sleeping Bag Compression Backpack"), ""),
            "Sleeping Gear > Sleeping Bags"
        );
    }

    #[test]
    fn all_fields_feed_the_context() {
        let path = normalize_product_category_default(&ProductFields {
            name: Some("Model X200"),
            category: Some("Outdoor > Misc"),
            description: Some("Cast iron, pre-seasoned."),
            html_description: None,
            brand: Some("Lodge"),
        });
        assert_eq!(path, "Camp Kitchen > Cookware");

        let path = normalize_product_category_default(&ProductFields {
            name: Some("Model X200"),
            html_description: Some("<p>Two burner propane unit</p>"),
            ..Default::default()
        });
        assert_eq!(path, "Camp Kitchen > Stoves & Burners");
    }

    #[test]
    fn classification_is_deterministic() {
        let fields = ProductFields {
            name: Some("Folding Chair with Canopy"),
            category: Some("Outdoor > Furniture"),
            ..Default::default()
        };
        let first = normalize_product_category_default(&fields);
        for _ in 0..10 {
            assert_eq!(normalize_product_category_default(&fields), first);
        }
        // canopy rule excludes chairs, so the chair rule wins
        assert_eq!(first, "Camp Furniture > Chairs");
    }

    #[test]
    fn custom_rule_set_from_json() {
        let rules = RuleSet::from_json(
            r#"[
                {"category_path": "Lighting > Lanterns", "include": [{"keyword": "lantern"}], "exclude": [{"keyword": "string"}]},
                {"category_path": "Lighting > Other", "include": [{"regex": "\\b(light|lamp)s?\\b"}]}
            ]"#,
        )
        .unwrap();
        assert_eq!(rules.len(), 2);

        let fields = |name| ProductFields {
            name: Some(name),
            category: Some("Outdoor > Stuff"),
            ..Default::default()
        };
        assert_eq!(normalize_product_category(&fields("LED Lantern"), &rules), "Lighting > Lanterns");
        assert_eq!(normalize_product_category(&fields("Lantern String Lights"), &rules), "Lighting > Other");
        assert_eq!(normalize_product_category(&fields("Dome Tent"), &rules), "Stuff");
    }

    #[test]
    fn bad_rule_patterns_are_reported() {
        let err = RuleSet::from_json(r#"[{"category_path": "Broken", "include": [{"regex": "(unclosed"}]}]"#)
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRule { ref path, .. } if path == "Broken"));

        let err = RuleSet::from_json(r#"[{"category_path": "Broken"}]"#).unwrap_err();
        assert!(matches!(err, CatalogError::RuleFile(_)));
    }
}
