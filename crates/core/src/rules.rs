use crate::error::RuleError;
use crate::models::FileRecord;
use crate::paths::normalize_folder;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// A pattern and the folder template used when it matches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClassificationRule {
    pub name: String,
    /// Case-insensitive regex tested against the extension (".pdf").
    pub pattern: String,
    /// Folder template; `{year}`, `{month}` and `{ext}` are substituted.
    pub destination: String,
    /// Also test the lowercase file name.
    #[serde(default)]
    pub match_name: bool,
}

impl ClassificationRule {
    pub fn new(name: &str, pattern: &str, destination: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            destination: destination.to_string(),
            match_name: false,
        }
    }

    pub fn name_sensitive(mut self) -> Self {
        self.match_name = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: ClassificationRule,
    regex: Regex,
}

impl CompiledRule {
    pub fn compile(rule: ClassificationRule) -> Result<Self, RuleError> {
        let regex = RegexBuilder::new(&rule.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| RuleError::InvalidPattern {
                name: rule.name.clone(),
                source,
            })?;
        Ok(Self { rule, regex })
    }

    pub fn rule(&self) -> &ClassificationRule {
        &self.rule
    }

    pub fn matches(&self, record: &FileRecord) -> bool {
        if self.regex.is_match(&record.extension) {
            return true;
        }
        self.rule.match_name && self.regex.is_match(&record.name.to_lowercase())
    }

    pub fn render(&self, record: &FileRecord) -> String {
        render_template(&self.rule.destination, record)
    }
}

/// Rules in evaluation order. The first match wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn from_rules(rules: Vec<ClassificationRule>) -> Result<Self, RuleError> {
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn builtin() -> Result<Self, RuleError> {
        Self::from_rules(default_rules())
    }

    /// Loads `*.toml` rule files from `dir`. A missing directory yields an
    /// empty set.
    pub fn load_dir(dir: &Path) -> Result<Self, RuleError> {
        Self::from_rules(load_rules_from_dir(dir)?)
    }

    pub fn first_match(&self, record: &FileRecord) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.matches(record))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<ClassificationRule>,
}

/// Reads every `*.toml` file in `dir` in file-name order; rules keep their
/// order within each file.
pub fn load_rules_from_dir(dir: &Path) -> Result<Vec<ClassificationRule>, RuleError> {
    let mut rules = Vec::new();
    if !dir.exists() {
        return Ok(rules);
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && path.extension().and_then(|e| e.to_str()) == Some("toml")
        {
            files.push(path);
        }
    }
    files.sort();
    for path in files {
        let content = fs::read_to_string(&path)?;
        let file: RuleFile =
            toml::from_str(&content).map_err(|source| RuleError::Parse {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), count = file.rules.len(), "loaded rule file");
        rules.extend(file.rules);
    }
    Ok(rules)
}

/// Substitutes `{year}`, `{month}` and `{ext}` from `record`.
pub fn render_template(template: &str, record: &FileRecord) -> String {
    let rendered = template
        .replace("{year}", &record.year().to_string())
        .replace("{month}", &format!("{:02}", record.month()))
        .replace("{ext}", record.extension.trim_start_matches('.'));
    normalize_folder(&rendered)
}

pub fn default_rules() -> Vec<ClassificationRule> {
    use ClassificationRule as R;
    vec![
        R::new("Disk Images", r"\.(dmg|iso|img)$", "Archives/Disk Images/{year}"),
        R::new("Compressed", r"\.(zip|rar|7z|tar|gz)$", "Archives/Compressed/{year}"),
        R::new("PDF", r"\.pdf$", "Documents/PDF/{year}"),
        R::new("Word Docs", r"\.(docx?|rtf)$", "Documents/Word/{year}"),
        R::new("Spreadsheets", r"\.(xlsx?|csv)$", "Documents/Spreadsheets/{year}"),
        R::new("Presentations", r"\.(pptx?|key)$", "Documents/Presentations/{year}"),
        R::new("Text Files", r"\.(txt|md|rst)$", "Documents/Text/{year}"),
        R::new("Python", r"\.(py|pyw)$", "Code/Python"),
        R::new("JavaScript", r"\.(js|ts|jsx|tsx)$", "Code/JavaScript"),
        R::new("Web", r"\.(html|htm|css|scss)$", "Code/Web"),
        R::new("Java", r"\.(java|kt)$", "Code/Java"),
        R::new("C/C++", r"\.(c|cpp|h|hpp)$", "Code/C++"),
        R::new("Swift", r"\.(swift|m)$", "Code/Swift"),
        R::new("Go", r"\.go$", "Code/Go"),
        R::new("Rust", r"\.rs$", "Code/Rust"),
        R::new("Shell", r"\.(sh|bash|zsh)$", "Code/Shell"),
        R::new("Config", r"\.(json|yaml|yml|toml|ini|cfg)$", "Config"),
        R::new("Videos", r"\.(mp4|mov|avi|mkv|wmv|flv|webm)$", "Videos/{year}"),
        R::new("Audio", r"\.(mp3|wav|flac|aac|ogg|m4a)$", "Audio/{year}"),
        R::new("Design", r"\.(svg|ai|eps|psd)$", "Graphics/Design/{year}"),
        R::new("Screenshots", "screenshot", "Images/Screenshots/{year}").name_sensitive(),
        R::new("Applications", r"\.(app|exe|msi|pkg)$", "Applications/{year}"),
        R::new("Fonts", r"\.(ttf|otf|woff|woff2)$", "Fonts"),
    ]
}
