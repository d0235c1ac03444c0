//! Groups records that share a fingerprint.
//!
//! The first record seen with a fingerprint is the original; every later
//! one is a duplicate of it. Zero-length files are never grouped.

use crate::models::{FileEntry, FileRecord};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub fingerprint: String,
    pub original: PathBuf,
    /// In scan order; never empty.
    pub duplicates: Vec<PathBuf>,
}

impl DuplicateGroup {
    pub fn member_count(&self) -> usize {
        1 + self.duplicates.len()
    }
}

#[derive(Debug, Default, Clone)]
pub struct DuplicateReport {
    groups: Vec<DuplicateGroup>,
    by_fingerprint: HashMap<String, usize>,
    original_of: HashMap<PathBuf, PathBuf>,
}

impl DuplicateReport {
    /// Groups ordered by when their original was first seen.
    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    pub fn group(&self, fingerprint: &str) -> Option<&DuplicateGroup> {
        self.by_fingerprint.get(fingerprint).map(|&i| &self.groups[i])
    }

    pub fn original_of(&self, path: &std::path::Path) -> Option<&PathBuf> {
        self.original_of.get(path)
    }

    pub fn duplicate_count(&self) -> usize {
        self.original_of.len()
    }

    /// Attaches each record's duplicate status, keeping scan order.
    pub fn mark(&self, records: Vec<FileRecord>) -> Vec<FileEntry> {
        records
            .into_iter()
            .map(|record| {
                let duplicate_of = self.original_of.get(&record.path).cloned();
                FileEntry {
                    record,
                    duplicate_of,
                }
            })
            .collect()
    }
}

/// Detects duplicates using the fingerprint stored on each record.
pub fn detect(records: &[FileRecord]) -> DuplicateReport {
    detect_with(records, |r| {
        (!r.fingerprint.is_empty()).then(|| r.fingerprint.clone())
    })
}

/// Detects duplicates using `fingerprint`; records it maps to `None` are
/// left alone.
pub fn detect_with<F>(records: &[FileRecord], fingerprint: F) -> DuplicateReport
where
    F: Fn(&FileRecord) -> Option<String>,
{
    let mut first_seen: Vec<String> = Vec::new();
    let mut members: HashMap<String, (PathBuf, Vec<PathBuf>)> = HashMap::new();

    for record in records.iter().filter(|r| r.size > 0) {
        let Some(fp) = fingerprint(record).filter(|fp| !fp.is_empty()) else {
            continue;
        };
        match members.get_mut(&fp) {
            Some((_, dups)) => dups.push(record.path.clone()),
            None => {
                first_seen.push(fp.clone());
                members.insert(fp, (record.path.clone(), Vec::new()));
            }
        }
    }

    let mut report = DuplicateReport::default();
    for fp in first_seen {
        let Some((original, duplicates)) = members.remove(&fp) else {
            continue;
        };
        if duplicates.is_empty() {
            continue;
        }
        for dup in &duplicates {
            report.original_of.insert(dup.clone(), original.clone());
        }
        report.by_fingerprint.insert(fp.clone(), report.groups.len());
        report.groups.push(DuplicateGroup {
            fingerprint: fp,
            original,
            duplicates,
        });
    }

    info!(
        groups = report.groups.len(),
        duplicates = report.duplicate_count(),
        "duplicate detection complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::sample_fingerprint;
    use chrono::{TimeZone, Utc};
    use std::fs;

    fn rec(path: &str, size: u64, fp: &str) -> FileRecord {
        let modified = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        FileRecord::new(path, size, modified).with_fingerprint(fp)
    }

    #[test]
    fn first_seen_record_is_the_original() {
        let records = vec![
            rec("/in/b.jpg", 10, "f1"),
            rec("/in/a.jpg", 10, "f1"),
            rec("/in/c.jpg", 20, "f2"),
            rec("/in/d.jpg", 10, "f1"),
        ];
        let report = detect(&records);
        assert_eq!(report.groups().len(), 1);
        let group = report.group("f1").unwrap();
        assert_eq!(group.original, PathBuf::from("/in/b.jpg"));
        assert_eq!(
            group.duplicates,
            vec![PathBuf::from("/in/a.jpg"), PathBuf::from("/in/d.jpg")]
        );
        assert_eq!(group.member_count(), 3);
        assert!(report.group("f2").is_none());
        assert_eq!(report.duplicate_count(), 2);

        let entries = report.mark(records);
        let flags: Vec<bool> = entries.iter().map(FileEntry::is_duplicate).collect();
        assert_eq!(flags, vec![false, true, false, true]);
        assert_eq!(
            entries[3].duplicate_of.as_deref(),
            Some(std::path::Path::new("/in/b.jpg"))
        );
    }

    #[test]
    fn empty_files_and_missing_fingerprints_are_ignored() {
        let records = vec![
            rec("/in/empty1", 0, "zero"),
            rec("/in/empty2", 0, "zero"),
            rec("/in/x", 5, ""),
            rec("/in/y", 5, ""),
        ];
        let report = detect(&records);
        assert!(report.groups().is_empty());
        assert!(report.mark(records).iter().all(|e| !e.is_duplicate()));
    }

    #[test]
    fn custom_fingerprint_function_is_used() {
        let records = vec![rec("/in/a.txt", 3, ""), rec("/in/b.txt", 3, "")];
        let report = detect_with(&records, |r| Some(r.size.to_string()));
        assert_eq!(report.groups().len(), 1);
        assert_eq!(
            report.original_of(std::path::Path::new("/in/b.txt")),
            Some(&PathBuf::from("/in/a.txt"))
        );
    }

    #[test]
    fn same_size_and_boundaries_group_even_when_middles_differ() {
        let dir = tempfile::tempdir().unwrap();
        let sample = 64;
        let mut left = vec![7u8; sample * 4];
        let mut right = left.clone();
        left[sample * 2] = 1;
        right[sample * 2] = 2;
        let left_path = dir.path().join("left.raw");
        let right_path = dir.path().join("right.raw");
        fs::write(&left_path, &left).unwrap();
        fs::write(&right_path, &right).unwrap();
        assert_ne!(fs::read(&left_path).unwrap(), fs::read(&right_path).unwrap());

        let records: Vec<FileRecord> = [&left_path, &right_path]
            .iter()
            .map(|p| {
                FileRecord::from_path(p)
                    .unwrap()
                    .with_fingerprint(sample_fingerprint(p, sample).unwrap())
            })
            .collect();
        let report = detect(&records);
        assert_eq!(report.groups().len(), 1);
        assert_eq!(report.groups()[0].original, left_path);
        assert_eq!(report.groups()[0].duplicates, vec![right_path]);
    }
}
