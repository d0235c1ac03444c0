use serde::{Deserialize, Serialize};

/// A photo category triggered by existing keyword metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCategory {
    pub label: String,
    /// Lowercase trigger words.
    pub triggers: Vec<String>,
    /// Triggers specific enough to become their own folder level.
    #[serde(default)]
    pub subtypes: Vec<String>,
}

impl KeywordCategory {
    fn new(label: &str, triggers: &[&str], subtypes: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            subtypes: subtypes.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch<'a> {
    pub category: &'a KeywordCategory,
    /// The keyword that decided the match (lowercased).
    pub trigger: String,
    /// Folder name for the subtype level, if any.
    pub subtype: Option<String>,
}

pub fn default_categories() -> Vec<KeywordCategory> {
    vec![
        KeywordCategory::new(
            "Wildlife",
            &[
                "wildlife", "bird", "eagle", "hawk", "owl", "bear", "deer", "fox", "animal",
            ],
            &["eagle", "hawk", "owl", "bear", "deer", "fox"],
        ),
        KeywordCategory::new(
            "Weddings",
            &["wedding", "bride", "groom", "ceremony", "reception"],
            &[],
        ),
        KeywordCategory::new(
            "Sports",
            &["sports", "racing", "football", "soccer", "basketball", "tennis"],
            &["racing", "football", "soccer", "basketball", "tennis"],
        ),
        KeywordCategory::new(
            "Portraits",
            &["portrait", "headshot", "people", "person", "face", "model"],
            &[],
        ),
        KeywordCategory::new(
            "Landscapes",
            &["landscape", "scenery", "mountain", "beach", "sunset", "sunrise"],
            &[],
        ),
        KeywordCategory::new("Pets", &["pet", "dog", "cat", "puppy", "kitten"], &[]),
    ]
}

/// First category (in declaration order) with any trigger among
/// `keywords`. Keywords are compared lowercased.
pub fn match_keywords<'a>(
    categories: &'a [KeywordCategory],
    keywords: &[String],
) -> Option<KeywordMatch<'a>> {
    let lowered: Vec<String> = keywords.iter().map(|k| k.trim().to_lowercase()).collect();
    categories.iter().find_map(|category| {
        let hits: Vec<&String> = lowered
            .iter()
            .filter(|k| category.triggers.contains(k))
            .collect();
        let first = hits.first()?;
        let subtype_hit = hits.iter().find(|k| category.subtypes.contains(k));
        Some(KeywordMatch {
            category,
            trigger: subtype_hit.copied().unwrap_or(first).clone(),
            subtype: subtype_hit.map(|k| capitalize(k)),
        })
    })
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
