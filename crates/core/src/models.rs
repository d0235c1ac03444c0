use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions treated as photos without looking at file content.
pub const PHOTO_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".tif", ".raw", ".cr2", ".cr3", ".nef",
    ".arw", ".dng", ".orf", ".rw2", ".pef", ".srw", ".heic", ".heif",
];

pub fn is_photo_extension(ext: &str) -> bool {
    PHOTO_EXTENSIONS.contains(&ext)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// What the metadata source knows about a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub keywords: Vec<String>,
    pub description: String,
    pub gps: Option<GpsCoordinates>,
}

/// One observed file. Built once per scan and never changed after
/// classification starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    /// Lowercase, including the dot; empty when the file has none.
    pub extension: String,
    pub modified: DateTime<Utc>,
    pub keywords: Vec<String>,
    pub description: String,
    pub gps: Option<GpsCoordinates>,
    pub is_image_like: bool,
    /// Empty unless duplicate detection was requested.
    pub fingerprint: String,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: DateTime<Utc>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let is_image_like = is_photo_extension(&extension);
        Self {
            path,
            name,
            size,
            extension,
            modified,
            keywords: Vec::new(),
            description: String::new(),
            gps: None,
            is_image_like,
            fingerprint: String::new(),
        }
    }

    /// Stats `path` and builds a record with no metadata or fingerprint.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = fs::metadata(path)?;
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_default();
        Ok(Self::new(path, meta.len(), modified))
    }

    pub fn with_metadata(mut self, metadata: FileMetadata) -> Self {
        let mut seen = HashSet::new();
        self.keywords = metadata
            .keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && seen.insert(k.clone()))
            .collect();
        self.description = metadata.description.trim().to_string();
        self.gps = metadata.gps;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn year(&self) -> i32 {
        self.modified.year()
    }

    pub fn month(&self) -> u32 {
        self.modified.month()
    }

    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pipeline stage decided a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Duplicate,
    Keyword,
    Rule,
    Heuristic,
    External,
    Fallback,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationSource::Duplicate => "duplicate",
            ClassificationSource::Keyword => "keyword",
            ClassificationSource::Rule => "rule",
            ClassificationSource::Heuristic => "heuristic",
            ClassificationSource::External => "external",
            ClassificationSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Relative folder, '/'-separated, no leading slash.
    pub destination: String,
    pub confidence: Confidence,
    pub source: ClassificationSource,
    pub rationale: String,
}

/// A record after duplicate detection.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub record: FileRecord,
    pub duplicate_of: Option<PathBuf>,
}

impl FileEntry {
    pub fn unique(record: FileRecord) -> Self {
        Self {
            record,
            duplicate_of: None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

/// A record paired with the decision made about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedFile {
    pub entry: FileEntry,
    pub result: ClassificationResult,
}
