//! Read-only metadata sources. Nothing here ever writes to a file.

use crate::models::{FileMetadata, GpsCoordinates};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

pub trait MetadataSource: Send + Sync {
    /// Metadata for `path`; empty when nothing can be read.
    fn read(&self, path: &Path) -> FileMetadata;

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataSource for NoMetadata {
    fn read(&self, _path: &Path) -> FileMetadata {
        FileMetadata::default()
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Shells out to `exiftool`. Degrades to empty metadata when the tool is
/// not installed or fails on a file.
#[derive(Debug, Clone)]
pub struct ExiftoolReader {
    program: String,
    available: bool,
}

impl ExiftoolReader {
    pub fn new() -> Self {
        Self::with_program("exiftool")
    }

    pub fn with_program(program: &str) -> Self {
        let available = Command::new(program)
            .arg("-ver")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !available {
            warn!(program, "exiftool not found; keywords will not be read");
        }
        Self {
            program: program.to_string(),
            available,
        }
    }
}

impl Default for ExiftoolReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataSource for ExiftoolReader {
    fn read(&self, path: &Path) -> FileMetadata {
        if !self.available {
            return FileMetadata::default();
        }
        let output = Command::new(&self.program)
            .args([
                "-json",
                "-n",
                "-Keywords",
                "-Subject",
                "-Description",
                "-Caption-Abstract",
                "-GPSLatitude",
                "-GPSLongitude",
            ])
            .arg(path)
            .output();
        match output {
            Ok(o) if o.status.success() => {
                parse_exiftool_json(&String::from_utf8_lossy(&o.stdout)).unwrap_or_default()
            }
            Ok(o) => {
                debug!(path = %path.display(), status = ?o.status, "exiftool returned an error");
                FileMetadata::default()
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "exiftool failed to run");
                FileMetadata::default()
            }
        }
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<serde_json::Value>),
    One(serde_json::Value),
}

impl OneOrMany {
    fn into_strings(self) -> Vec<String> {
        let values = match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(v) => vec![v],
        };
        values
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct ExiftoolItem {
    #[serde(rename = "Keywords")]
    keywords: Option<OneOrMany>,
    #[serde(rename = "Subject")]
    subject: Option<OneOrMany>,
    #[serde(rename = "Description")]
    description: Option<String>,
    #[serde(rename = "Caption-Abstract")]
    caption: Option<String>,
    #[serde(rename = "GPSLatitude")]
    latitude: Option<f64>,
    #[serde(rename = "GPSLongitude")]
    longitude: Option<f64>,
}

/// Parses `exiftool -json -n` output for a single file.
pub fn parse_exiftool_json(raw: &str) -> Option<FileMetadata> {
    let items: Vec<ExiftoolItem> = serde_json::from_str(raw).ok()?;
    let item = items.into_iter().next()?;
    let mut keywords = item.keywords.map(OneOrMany::into_strings).unwrap_or_default();
    keywords.extend(item.subject.map(OneOrMany::into_strings).unwrap_or_default());
    let description = item
        .description
        .filter(|d| !d.trim().is_empty())
        .or(item.caption)
        .unwrap_or_default();
    let gps = match (item.latitude, item.longitude) {
        (Some(latitude), Some(longitude)) => Some(GpsCoordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };
    Some(FileMetadata {
        keywords,
        description,
        gps,
    })
}
