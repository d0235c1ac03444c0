use std::path::PathBuf;
use thiserror::Error;

/// Structural violations of the plan contract. Fatal to plan construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("source root must not be empty")]
    EmptySourceRoot,
    #[error("target root must not be empty")]
    EmptyTargetRoot,
    #[error("{field} must be an absolute path, got `{path}`")]
    RelativePath { field: &'static str, path: String },
    #[error("destination `{destination}` for {entry} escapes the target root")]
    EscapesTargetRoot { entry: String, destination: String },
    #[error("source {0} appears more than once")]
    DuplicateSource(String),
    #[error("plan statistics do not match its move list")]
    StatisticsMismatch,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unsupported plan version {found} (this build reads {supported}.x)")]
    UnsupportedVersion { found: String, supported: u32 },
    #[error("invalid plan document: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorKind {
    PermissionDenied,
    Io,
    Walk,
}

/// A path the scanner could not turn into a record. Recorded, never fatal.
#[derive(Debug, Clone, Error)]
#[error("{kind:?} at {}: {message}", .path.display())]
pub struct ScanError {
    pub path: PathBuf,
    pub kind: ScanErrorKind,
    pub message: String,
}

impl ScanError {
    pub fn from_io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        let kind = if err.kind() == std::io::ErrorKind::PermissionDenied {
            ScanErrorKind::PermissionDenied
        } else {
            ScanErrorKind::Io
        };
        Self {
            path: path.into(),
            kind,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule `{name}` has an invalid pattern: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("failed to parse rule file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why one move entry could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("source missing")]
    SourceMissing,
    #[error("destination folder missing: {0}")]
    FolderMissing(String),
    #[error("failed to create folder {folder}: {message}")]
    FolderCreation { folder: String, message: String },
    #[error("{op} failed: {message}")]
    Io { op: &'static str, message: String },
}

impl ExecutionError {
    pub fn io(op: &'static str, err: &std::io::Error) -> Self {
        Self::Io {
            op,
            message: err.to_string(),
        }
    }
}
