//! The organization plan: a deterministic, versioned description of every
//! proposed file operation.

use crate::config::{ConflictPolicy, DuplicateHandling, PlanAction, PlanConfig};
use crate::error::{PlanError, ValidationError};
use crate::models::{ClassificationSource, ClassifiedFile, Confidence};
use crate::paths::{is_contained, is_contained_destination, join_destination, parent_folder};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const PLAN_VERSION: &str = "1.0";
pub const SUPPORTED_MAJOR: u32 = 1;
pub const PRODUCER: &str = "tidyplan";

/// Aggregates derived from the move list. Never set independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStatistics {
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub folders_to_create: usize,
    pub duplicates_flagged: usize,
    pub confidence_high: usize,
    pub confidence_medium: usize,
    pub confidence_low: usize,
}

impl PlanStatistics {
    pub fn from_moves(moves: &[MoveEntry]) -> Self {
        let mut stats = PlanStatistics {
            total_files: moves.len(),
            folders_to_create: folders_of(moves).len(),
            ..Default::default()
        };
        for m in moves {
            stats.total_size_bytes += m.size_bytes;
            if m.is_duplicate {
                stats.duplicates_flagged += 1;
            }
            match m.confidence {
                Confidence::High => stats.confidence_high += 1,
                Confidence::Medium => stats.confidence_medium += 1,
                Confidence::Low => stats.confidence_low += 1,
            }
        }
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEntry {
    /// Absolute source path.
    pub source: String,
    /// Relative to the target root: folder plus file name.
    pub destination: String,
    pub filename: String,
    pub size_bytes: u64,
    pub confidence: Confidence,
    pub classification_source: ClassificationSource,
    pub reasoning: String,
    pub is_duplicate: bool,
    pub duplicate_of: Option<String>,
}

impl MoveEntry {
    pub fn from_classified(file: &ClassifiedFile) -> Self {
        let record = &file.entry.record;
        Self {
            source: record.path_string(),
            destination: join_destination(&file.result.destination, &record.name),
            filename: record.name.clone(),
            size_bytes: record.size,
            confidence: file.result.confidence,
            classification_source: file.result.source,
            reasoning: file.result.rationale.clone(),
            is_duplicate: file.entry.is_duplicate(),
            duplicate_of: file
                .entry
                .duplicate_of
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        }
    }

    /// Folder part of the destination; empty for top-level files.
    pub fn folder(&self) -> &str {
        parent_folder(&self.destination)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOptions {
    pub handle_duplicates: DuplicateHandling,
    pub create_folders: bool,
    pub on_conflict: ConflictPolicy,
}

impl From<&PlanConfig> for PlanOptions {
    fn from(cfg: &PlanConfig) -> Self {
        Self {
            handle_duplicates: cfg.handle_duplicates,
            create_folders: cfg.create_folders,
            on_conflict: cfg.on_conflict,
        }
    }
}

/// Everything a plan records besides its moves.
#[derive(Debug, Clone)]
pub struct PlanSettings {
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    pub action: PlanAction,
    pub options: PlanOptions,
}

impl PlanSettings {
    pub fn from_config(
        source_root: impl Into<PathBuf>,
        target_root: impl Into<PathBuf>,
        cfg: &PlanConfig,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            target_root: target_root.into(),
            action: cfg.action,
            options: PlanOptions::from(cfg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationPlan {
    plan_version: String,
    created_by: String,
    created_at: String,
    producer_version: String,
    source_root: String,
    target_root: String,
    action: PlanAction,
    statistics: PlanStatistics,
    folders: Vec<String>,
    moves: Vec<MoveEntry>,
    options: PlanOptions,
}

#[derive(Deserialize)]
struct VersionProbe {
    plan_version: String,
}

impl OrganizationPlan {
    pub fn build(
        files: &[ClassifiedFile],
        settings: &PlanSettings,
    ) -> Result<Self, ValidationError> {
        Self::build_at(files, settings, Utc::now())
    }

    /// Builds with a fixed creation time. Everything else in the plan
    /// depends only on `files` and `settings`.
    pub fn build_at(
        files: &[ClassifiedFile],
        settings: &PlanSettings,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let mut moves: Vec<MoveEntry> = files.iter().map(MoveEntry::from_classified).collect();
        moves.sort_by(|a, b| a.source.cmp(&b.source));

        let plan = Self {
            plan_version: PLAN_VERSION.to_string(),
            created_by: PRODUCER.to_string(),
            created_at: created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            source_root: settings.source_root.to_string_lossy().into_owned(),
            target_root: settings.target_root.to_string_lossy().into_owned(),
            action: settings.action,
            statistics: PlanStatistics::from_moves(&moves),
            folders: folders_of(&moves).into_iter().collect(),
            moves,
            options: settings.options,
        };
        plan.validate()?;
        info!(
            files = plan.statistics.total_files,
            folders = plan.folders.len(),
            duplicates = plan.statistics.duplicates_flagged,
            "plan built"
        );
        Ok(plan)
    }

    /// Checks the structural contract: roots set, every destination
    /// inside the target root, unique sources, statistics matching moves.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_root.trim().is_empty() {
            return Err(ValidationError::EmptySourceRoot);
        }
        if self.target_root.trim().is_empty() {
            return Err(ValidationError::EmptyTargetRoot);
        }
        require_absolute("source_root", &self.source_root)?;
        require_absolute("target_root", &self.target_root)?;
        let mut seen = HashSet::new();
        for m in &self.moves {
            require_absolute("moves[].source", &m.source)?;
            if !is_contained_destination(&m.destination) {
                return Err(ValidationError::EscapesTargetRoot {
                    entry: m.source.clone(),
                    destination: m.destination.clone(),
                });
            }
            if !seen.insert(m.source.as_str()) {
                return Err(ValidationError::DuplicateSource(m.source.clone()));
            }
        }
        if let Some(folder) = self.folders.iter().find(|f| !is_contained(f)) {
            return Err(ValidationError::EscapesTargetRoot {
                entry: "folders".to_string(),
                destination: folder.clone(),
            });
        }
        if PlanStatistics::from_moves(&self.moves) != self.statistics {
            return Err(ValidationError::StatisticsMismatch);
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, PlanError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses and validates a plan document. Plans from another major
    /// version are rejected before anything else is read.
    pub fn from_json(raw: &str) -> Result<Self, PlanError> {
        let probe: VersionProbe = serde_json::from_str(raw)?;
        let major = probe
            .plan_version
            .split('.')
            .next()
            .and_then(|m| m.trim().parse::<u32>().ok());
        if major != Some(SUPPORTED_MAJOR) {
            return Err(PlanError::UnsupportedVersion {
                found: probe.plan_version,
                supported: SUPPORTED_MAJOR,
            });
        }
        let plan: OrganizationPlan = serde_json::from_str(raw)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn save(&self, path: &Path) -> Result<(), PlanError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PlanError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn plan_version(&self) -> &str {
        &self.plan_version
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn producer_version(&self) -> &str {
        &self.producer_version
    }

    pub fn source_root(&self) -> &str {
        &self.source_root
    }

    pub fn target_root(&self) -> &str {
        &self.target_root
    }

    pub fn action(&self) -> PlanAction {
        self.action
    }

    pub fn statistics(&self) -> &PlanStatistics {
        &self.statistics
    }

    pub fn folders(&self) -> &[String] {
        &self.folders
    }

    pub fn moves(&self) -> &[MoveEntry] {
        &self.moves
    }

    pub fn options(&self) -> &PlanOptions {
        &self.options
    }
}

fn folders_of(moves: &[MoveEntry]) -> BTreeSet<String> {
    moves
        .iter()
        .map(|m| m.folder())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

fn require_absolute(field: &'static str, path: &str) -> Result<(), ValidationError> {
    if Path::new(path).is_absolute() {
        Ok(())
    } else {
        Err(ValidationError::RelativePath {
            field,
            path: path.to_string(),
        })
    }
}
