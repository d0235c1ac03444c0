use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub classification: ClassificationConfig,
    pub plan: PlanConfig,
    pub execution: ExecutionConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub max_files: usize,
    pub include_subfolders: bool,
    pub detect_duplicates: bool,
    pub read_keywords: bool,
    /// Glob patterns matched against full paths.
    pub exclude: Vec<String>,
    pub workers: Option<usize>,
    /// Bytes hashed from each end of a file for its fingerprint.
    pub sample_bytes: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_files: 10_000,
            include_subfolders: true,
            detect_duplicates: true,
            read_keywords: true,
            exclude: Vec::new(),
            workers: None,
            sample_bytes: 8192,
        }
    }
}

impl ScanConfig {
    pub fn worker_count(&self) -> usize {
        self.workers
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(4)
            .max(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    #[default]
    Trust,
    Verify,
    Ignore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub trust_level: TrustLevel,
    pub photo_mode: bool,
    pub duplicates_folder: String,
    /// Directory of `*.toml` rule files; replaces the built-in rules when set.
    pub rules_dir: Option<String>,
    pub thresholds: Thresholds,
    pub external_concurrency: usize,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            trust_level: TrustLevel::Trust,
            photo_mode: false,
            duplicates_folder: "_Duplicates".to_string(),
            rules_dir: None,
            thresholds: Thresholds::default(),
            external_concurrency: 4,
        }
    }
}

/// Maps an external classifier's score onto confidence tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub accept: f32,
    pub review: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            accept: 0.8,
            review: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    #[default]
    Copy,
    Move,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    Rename,
    Skip,
    Overwrite,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateHandling {
    #[default]
    MoveToDuplicatesFolder,
    Skip,
    /// No prompt exists in the core; execution treats this like `Skip`.
    Ask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    pub action: PlanAction,
    pub on_conflict: ConflictPolicy,
    pub handle_duplicates: DuplicateHandling,
    pub create_folders: bool,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            action: PlanAction::Copy,
            on_conflict: ConflictPolicy::Rename,
            handle_duplicates: DuplicateHandling::MoveToDuplicatesFolder,
            create_folders: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub copy_then_delete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "noop".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        }
    }
}

impl PlanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanAction::Copy => "copy",
            PlanAction::Move => "move",
        }
    }
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Rename => "rename",
            ConflictPolicy::Skip => "skip",
            ConflictPolicy::Overwrite => "overwrite",
        }
    }
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "copy" => Ok(PlanAction::Copy),
            "move" => Ok(PlanAction::Move),
            other => Err(format!("unknown action `{other}` (expected copy|move)")),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rename" => Ok(ConflictPolicy::Rename),
            "skip" => Ok(ConflictPolicy::Skip),
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            other => Err(format!(
                "unknown conflict policy `{other}` (expected rename|skip|overwrite)"
            )),
        }
    }
}

impl FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trust" => Ok(TrustLevel::Trust),
            "verify" => Ok(TrustLevel::Verify),
            "ignore" => Ok(TrustLevel::Ignore),
            other => Err(format!(
                "unknown trust level `{other}` (expected trust|verify|ignore)"
            )),
        }
    }
}

/// Loads the configuration from `path` (or the optional `config/default`
/// file), then applies `TIDYPLAN_SECTION__KEY` environment overrides.
pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("TIDYPLAN")
            .separator("__")
            .try_parsing(true),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
