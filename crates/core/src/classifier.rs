//! The priority classification pipeline.
//!
//! Steps, first applicable wins: duplicate, trusted keywords, rules,
//! photo heuristics / external verdict, fallback. Classification never
//! fails and never performs I/O; external verdicts are gathered by the
//! caller beforehand and passed in.

use crate::config::{ClassificationConfig, Thresholds, TrustLevel};
use crate::error::RuleError;
use crate::keywords::{default_categories, match_keywords, KeywordCategory, KeywordMatch};
use crate::models::{
    ClassificationResult, ClassificationSource, ClassifiedFile, Confidence, FileEntry,
};
use crate::paths::{is_contained, normalize_folder};
use crate::rules::RuleSet;
use providers::{ClassifyResponse, ProviderError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SCREENSHOT_MARKERS: &[&str] = &["screenshot", "screen shot", "screen_shot"];

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalVerdict {
    pub destination: String,
    pub confidence: Confidence,
    pub rationale: String,
}

/// What the external classifier said about one file.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalOutcome {
    Verdict(ExternalVerdict),
    Unavailable,
}

impl ExternalOutcome {
    /// Maps a provider reply onto confidence tiers. Errors, and scores
    /// below the review threshold, count as no verdict.
    pub fn from_response(
        response: Result<ClassifyResponse, ProviderError>,
        thresholds: &Thresholds,
    ) -> Self {
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "external classifier gave no verdict");
                return ExternalOutcome::Unavailable;
            }
        };
        let confidence = if response.confidence >= thresholds.accept {
            Confidence::High
        } else if response.confidence >= thresholds.review {
            Confidence::Medium
        } else {
            return ExternalOutcome::Unavailable;
        };
        ExternalOutcome::Verdict(ExternalVerdict {
            destination: response.destination,
            confidence,
            rationale: response.rationale.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    trust_level: TrustLevel,
    photo_mode: bool,
    duplicates_folder: String,
    categories: Vec<KeywordCategory>,
    rules: RuleSet,
    thresholds: Thresholds,
}

impl Classifier {
    pub fn new(config: &ClassificationConfig, rules: RuleSet) -> Self {
        let duplicates_folder = match normalize_folder(&config.duplicates_folder) {
            folder if is_contained(&folder) => folder,
            _ => "_Duplicates".to_string(),
        };
        Self {
            trust_level: config.trust_level,
            photo_mode: config.photo_mode,
            duplicates_folder,
            categories: default_categories(),
            rules,
            thresholds: config.thresholds.clone(),
        }
    }

    /// Uses the rule files in `rules_dir` when configured, the built-in
    /// rule set otherwise.
    pub fn from_config(config: &ClassificationConfig) -> Result<Self, RuleError> {
        let rules = match &config.rules_dir {
            Some(dir) => RuleSet::load_dir(Path::new(dir))?,
            None => RuleSet::builtin()?,
        };
        Ok(Self::new(config, rules))
    }

    pub fn with_categories(mut self, categories: Vec<KeywordCategory>) -> Self {
        self.categories = categories;
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// True when `entry` would reach the external tier, i.e. nothing
    /// earlier in the pipeline decides it.
    pub fn needs_external(&self, entry: &FileEntry) -> bool {
        self.photo_mode
            && entry.record.is_image_like
            && !entry.is_duplicate()
            && !self.keywords_trusted(entry)
            && self.rules.first_match(&entry.record).is_none()
            && !looks_like_screenshot(&entry.record.name)
    }

    pub fn classify(
        &self,
        entry: &FileEntry,
        external: Option<&ExternalOutcome>,
    ) -> ClassificationResult {
        let record = &entry.record;
        let year = record.year();

        if let Some(original) = &entry.duplicate_of {
            return ClassificationResult {
                destination: self.duplicates_folder.clone(),
                confidence: Confidence::High,
                source: ClassificationSource::Duplicate,
                rationale: format!("Duplicate check: same fingerprint as {}", display_name(original)),
            };
        }

        let keyword_hit = match_keywords(&self.categories, &record.keywords);

        if self.keywords_trusted(entry) {
            return match keyword_hit {
                Some(hit) => ClassificationResult {
                    destination: keyword_destination(&hit, year),
                    confidence: Confidence::High,
                    source: ClassificationSource::Keyword,
                    rationale: format!(
                        "Keyword category {} matched keyword '{}'",
                        hit.category.label, hit.trigger
                    ),
                },
                None => ClassificationResult {
                    destination: format!("Photos/General/{year}"),
                    confidence: Confidence::Medium,
                    source: ClassificationSource::Keyword,
                    rationale: format!(
                        "Keywords present but no category matched: {}",
                        record.keywords.join(", ")
                    ),
                },
            };
        }

        // Under `verify` the keywords only annotate whatever decides below.
        let note = match (&keyword_hit, self.trust_level) {
            (Some(hit), TrustLevel::Verify) => format!(
                " (keywords suggest {} via '{}', not trusted)",
                hit.category.label, hit.trigger
            ),
            _ => String::new(),
        };

        if let Some(rule) = self.rules.first_match(record) {
            return ClassificationResult {
                destination: rule.render(record),
                confidence: Confidence::High,
                source: ClassificationSource::Rule,
                rationale: format!(
                    "Rule '{}' matched pattern {}{note}",
                    rule.rule().name,
                    rule.rule().pattern
                ),
            };
        }

        if self.photo_mode && record.is_image_like {
            if looks_like_screenshot(&record.name) {
                return ClassificationResult {
                    destination: format!("Photos/Screenshots/{year}"),
                    confidence: Confidence::High,
                    source: ClassificationSource::Heuristic,
                    rationale: format!("Heuristic: file name indicates a screenshot{note}"),
                };
            }
            if let Some(ExternalOutcome::Verdict(verdict)) = external {
                let destination = normalize_folder(&verdict.destination);
                if is_contained(&destination) {
                    let detail = if verdict.rationale.is_empty() {
                        "no reason given".to_string()
                    } else {
                        verdict.rationale.clone()
                    };
                    return ClassificationResult {
                        destination,
                        confidence: verdict.confidence,
                        source: ClassificationSource::External,
                        rationale: format!("External classifier: {detail}{note}"),
                    };
                }
                debug!(
                    path = %record.path.display(),
                    destination = %verdict.destination,
                    "ignoring external verdict outside the target root"
                );
            }
        }

        ClassificationResult {
            destination: format!("Unsorted/{year}"),
            confidence: Confidence::Low,
            source: ClassificationSource::Fallback,
            rationale: format!("Fallback: no matching rule found{note}"),
        }
    }

    /// Classifies every entry in order, pairing each with its result.
    pub fn classify_all(
        &self,
        entries: Vec<FileEntry>,
        verdicts: &HashMap<PathBuf, ExternalOutcome>,
    ) -> Vec<ClassifiedFile> {
        let classified: Vec<ClassifiedFile> = entries
            .into_iter()
            .map(|entry| {
                let result = self.classify(&entry, verdicts.get(&entry.record.path));
                ClassifiedFile { entry, result }
            })
            .collect();

        let mut by_source: HashMap<ClassificationSource, usize> = HashMap::new();
        for c in &classified {
            *by_source.entry(c.result.source).or_default() += 1;
        }
        info!(total = classified.len(), ?by_source, "classification complete");
        classified
    }

    fn keywords_trusted(&self, entry: &FileEntry) -> bool {
        self.trust_level == TrustLevel::Trust && !entry.record.keywords.is_empty()
    }
}

fn keyword_destination(hit: &KeywordMatch<'_>, year: i32) -> String {
    match &hit.subtype {
        Some(subtype) => format!("Photos/{}/{subtype}/{year}", hit.category.label),
        None => format!("Photos/{}/{year}", hit.category.label),
    }
}

fn looks_like_screenshot(name: &str) -> bool {
    let lower = name.to_lowercase();
    SCREENSHOT_MARKERS.iter().any(|m| lower.contains(m))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileRecord;
    use crate::rules::ClassificationRule;
    use chrono::{TimeZone, Utc};

    fn rec(path: &str, keywords: &[&str]) -> FileRecord {
        let modified = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let mut r = FileRecord::new(path, 2048, modified);
        r.keywords = keywords.iter().map(|k| k.to_string()).collect();
        r
    }

    fn classifier(trust: TrustLevel, photo_mode: bool) -> Classifier {
        let config = ClassificationConfig {
            trust_level: trust,
            photo_mode,
            ..ClassificationConfig::default()
        };
        Classifier::from_config(&config).unwrap()
    }

    fn verdict(destination: &str) -> ExternalOutcome {
        ExternalOutcome::Verdict(ExternalVerdict {
            destination: destination.to_string(),
            confidence: Confidence::Medium,
            rationale: "looks like a beach".to_string(),
        })
    }

    #[test]
    fn trusted_keywords_with_subtype() {
        let c = classifier(TrustLevel::Trust, false);
        let entry = FileEntry::unique(rec("/in/IMG_1.jpg", &["eagle", "bird"]));
        let result = c.classify(&entry, None);
        assert_eq!(result.destination, "Photos/Wildlife/Eagle/2025");
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.source, ClassificationSource::Keyword);
        assert!(result.rationale.contains("Wildlife"));
        assert!(result.rationale.contains("eagle"));
    }

    #[test]
    fn trusted_keywords_without_category_go_to_general() {
        let c = classifier(TrustLevel::Trust, false);
        let entry = FileEntry::unique(rec("/in/IMG_2.jpg", &["invoice"]));
        let result = c.classify(&entry, None);
        assert_eq!(result.destination, "Photos/General/2025");
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(result.source, ClassificationSource::Keyword);
    }

    #[test]
    fn pdf_without_keywords_uses_rule() {
        let c = classifier(TrustLevel::Trust, false);
        let result = c.classify(&FileEntry::unique(rec("/in/taxes.pdf", &[])), None);
        assert_eq!(result.destination, "Documents/PDF/2025");
        assert_eq!(result.source, ClassificationSource::Rule);
        assert_eq!(result.confidence, Confidence::High);
        assert!(result.rationale.contains("'PDF'"));
    }

    #[test]
    fn unmatched_file_falls_back_to_unsorted() {
        let c = classifier(TrustLevel::Trust, false);
        let result = c.classify(&FileEntry::unique(rec("/in/blob.xyz", &[])), None);
        assert_eq!(result.destination, "Unsorted/2025");
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.source, ClassificationSource::Fallback);
        assert!(!result.rationale.is_empty());
    }

    #[test]
    fn duplicates_win_over_everything() {
        let c = classifier(TrustLevel::Trust, true);
        let entry = FileEntry {
            record: rec("/in/copy/IMG_1.jpg", &["eagle"]),
            duplicate_of: Some(PathBuf::from("/in/IMG_1.jpg")),
        };
        let result = c.classify(&entry, Some(&verdict("Photos/Beach")));
        assert_eq!(result.destination, "_Duplicates");
        assert_eq!(result.source, ClassificationSource::Duplicate);
        assert_eq!(result.confidence, Confidence::High);
        assert!(result.rationale.contains("IMG_1.jpg"));
        assert!(!c.needs_external(&entry));
    }

    #[test]
    fn ignore_and_verify_skip_keyword_tier() {
        let entry = FileEntry::unique(rec("/in/notes.txt", &["eagle"]));

        let ignored = classifier(TrustLevel::Ignore, false).classify(&entry, None);
        assert_eq!(ignored.source, ClassificationSource::Rule);
        assert!(!ignored.rationale.contains("keywords suggest"));

        let verified = classifier(TrustLevel::Verify, false).classify(&entry, None);
        assert_eq!(verified.destination, "Documents/Text/2025");
        assert!(verified.rationale.contains("keywords suggest Wildlife"));
    }

    #[test]
    fn photo_mode_heuristics_and_external_verdicts() {
        let c = classifier(TrustLevel::Trust, true);

        let shot = FileEntry::unique(rec("/in/Screen Shot 2025-06-01.png", &[]));
        assert!(!c.needs_external(&shot));
        let result = c.classify(&shot, None);
        assert_eq!(result.destination, "Photos/Screenshots/2025");
        assert_eq!(result.source, ClassificationSource::Heuristic);

        let photo = FileEntry::unique(rec("/in/DSC_0001.jpg", &[]));
        assert!(c.needs_external(&photo));
        let result = c.classify(&photo, Some(&verdict("/Photos/Beach/")));
        assert_eq!(result.destination, "Photos/Beach");
        assert_eq!(result.source, ClassificationSource::External);
        assert_eq!(result.confidence, Confidence::Medium);
        assert!(result.rationale.contains("looks like a beach"));

        let unavailable = c.classify(&photo, Some(&ExternalOutcome::Unavailable));
        assert_eq!(unavailable.source, ClassificationSource::Fallback);

        let escaping = c.classify(&photo, Some(&verdict("../outside")));
        assert_eq!(escaping.source, ClassificationSource::Fallback);
    }

    #[test]
    fn heuristic_tier_is_off_without_photo_mode() {
        let c = classifier(TrustLevel::Trust, false);
        let photo = FileEntry::unique(rec("/in/DSC_0001.jpg", &[]));
        assert!(!c.needs_external(&photo));
        let result = c.classify(&photo, Some(&verdict("Photos/Beach")));
        assert_eq!(result.source, ClassificationSource::Fallback);
    }

    #[test]
    fn provider_scores_map_through_thresholds() {
        let t = Thresholds::default();
        let reply = |confidence: f32| {
            Ok(ClassifyResponse {
                destination: "Photos/Beach".to_string(),
                confidence,
                rationale: None,
            })
        };
        match ExternalOutcome::from_response(reply(0.95), &t) {
            ExternalOutcome::Verdict(v) => assert_eq!(v.confidence, Confidence::High),
            other => panic!("unexpected {other:?}"),
        }
        match ExternalOutcome::from_response(reply(0.6), &t) {
            ExternalOutcome::Verdict(v) => assert_eq!(v.confidence, Confidence::Medium),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            ExternalOutcome::from_response(reply(0.2), &t),
            ExternalOutcome::Unavailable
        );
        assert_eq!(
            ExternalOutcome::from_response(Err(ProviderError::Unavailable), &t),
            ExternalOutcome::Unavailable
        );
    }

    #[test]
    fn custom_rules_replace_builtin_and_results_keep_order() {
        let rules = RuleSet::from_rules(vec![ClassificationRule::new(
            "Everything",
            ".",
            "All/{year}/{ext}",
        )])
        .unwrap();
        let c = Classifier::new(&ClassificationConfig::default(), rules);
        let entries = vec![
            FileEntry::unique(rec("/in/b.pdf", &[])),
            FileEntry::unique(rec("/in/a.zip", &[])),
        ];
        let classified = c.classify_all(entries, &HashMap::new());
        assert_eq!(classified[0].entry.record.name, "b.pdf");
        assert_eq!(classified[0].result.destination, "All/2025/pdf");
        assert_eq!(classified[1].result.destination, "All/2025/zip");
    }

    #[test]
    fn classification_is_repeatable() {
        let c = classifier(TrustLevel::Trust, true);
        let entry = FileEntry::unique(rec("/in/trip.mov", &["beach"]));
        assert_eq!(c.classify(&entry, None), c.classify(&entry, None));
    }
}
