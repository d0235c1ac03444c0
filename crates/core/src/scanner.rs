//! Walks a source tree and turns every file into a `FileRecord`.
//!
//! Discovery runs on a blocking thread and yields paths in file-name
//! order. Record building (stat, metadata, fingerprint) then fans out over
//! a bounded pool of blocking workers that report back on one channel.
//! Results are re-sorted into discovery order once the channel drains, so
//! duplicate detection always sees the same first-seen order.

use crate::cancel::Cancellation;
use crate::config::ScanConfig;
use crate::error::{ScanError, ScanErrorKind};
use crate::metadata::MetadataSource;
use crate::models::FileRecord;
use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub completed: usize,
    pub total: usize,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// In discovery order.
    pub records: Vec<FileRecord>,
    pub errors: Vec<ScanError>,
    /// Discovery stopped at `max_files`.
    pub truncated: bool,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct Discovery {
    paths: Vec<PathBuf>,
    errors: Vec<ScanError>,
    truncated: bool,
}

#[derive(Debug, Clone, Copy)]
struct RecordOptions {
    read_keywords: bool,
    detect_duplicates: bool,
    sample_bytes: usize,
}

pub async fn scan(
    root: &Path,
    cfg: &ScanConfig,
    metadata: Arc<dyn MetadataSource>,
    cancel: &Cancellation,
    progress: Option<mpsc::UnboundedSender<ScanProgress>>,
) -> anyhow::Result<ScanOutcome> {
    let root = root
        .canonicalize()
        .with_context(|| format!("source root {:?} is not accessible", root))?;
    anyhow::ensure!(root.is_dir(), "source root {:?} is not a directory", root);

    let discovery = {
        let root = root.clone();
        let cfg = cfg.clone();
        let cancel = cancel.clone();
        task::spawn_blocking(move || discover(&root, &cfg, &cancel)).await??
    };
    let total = discovery.paths.len();
    info!(root = %root.display(), files = total, truncated = discovery.truncated, "discovery complete");

    let options = RecordOptions {
        read_keywords: cfg.read_keywords,
        detect_duplicates: cfg.detect_duplicates,
        sample_bytes: cfg.sample_bytes,
    };
    let (tx, mut rx) = mpsc::channel::<(usize, Result<FileRecord, ScanError>)>(100);
    let semaphore = Arc::new(Semaphore::new(cfg.worker_count()));

    // Feeder task: hands paths to blocking workers, at most `workers` at a time.
    let feeder = {
        let cancel = cancel.clone();
        let paths = discovery.paths;
        task::spawn(async move {
            for (idx, path) in paths.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };
                let tx = tx.clone();
                let metadata = metadata.clone();
                let cancel = cancel.clone();
                task::spawn_blocking(move || {
                    let _permit = permit;
                    if cancel.is_cancelled() {
                        return;
                    }
                    let result = build_record(&path, options, metadata.as_ref());
                    // Receiver dropped means the scan was abandoned.
                    let _ = tx.blocking_send((idx, result));
                });
            }
        })
    };

    let mut collected = Vec::with_capacity(total);
    while let Some((idx, result)) = rx.recv().await {
        if let Some(progress) = &progress {
            let path = match &result {
                Ok(record) => record.path.clone(),
                Err(err) => err.path.clone(),
            };
            let _ = progress.send(ScanProgress {
                completed: collected.len() + 1,
                total,
                path,
            });
        }
        collected.push((idx, result));
    }
    feeder.await?;
    collected.sort_by_key(|(idx, _)| *idx);

    let mut outcome = ScanOutcome {
        errors: discovery.errors,
        truncated: discovery.truncated,
        cancelled: cancel.is_cancelled(),
        ..ScanOutcome::default()
    };
    for (_, result) in collected {
        match result {
            Ok(record) => outcome.records.push(record),
            Err(err) => {
                warn!(error = %err, "skipping unreadable file");
                outcome.errors.push(err);
            }
        }
    }
    info!(
        records = outcome.records.len(),
        errors = outcome.errors.len(),
        cancelled = outcome.cancelled,
        "scan complete"
    );
    Ok(outcome)
}

fn discover(root: &Path, cfg: &ScanConfig, cancel: &Cancellation) -> anyhow::Result<Discovery> {
    let excludes = build_globset(&cfg.exclude)?;
    let mut walker = WalkDir::new(root).sort_by_file_name();
    if !cfg.include_subfolders {
        walker = walker.max_depth(1);
    }

    let mut out = Discovery::default();
    for entry in walker
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || should_descend(e.path(), &excludes))
    {
        if cancel.is_cancelled() {
            break;
        }
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                out.errors.push(walk_error(root, &err));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if out.paths.len() >= cfg.max_files {
            out.truncated = true;
            break;
        }
        out.paths.push(entry.into_path());
    }
    Ok(out)
}

fn build_record(
    path: &Path,
    options: RecordOptions,
    metadata: &dyn MetadataSource,
) -> Result<FileRecord, ScanError> {
    let mut record = FileRecord::from_path(path).map_err(|e| ScanError::from_io(path, &e))?;
    if record.extension.is_empty() && record.size > 0 {
        record.is_image_like = sniff_image(path);
    }
    if options.read_keywords {
        record = record.with_metadata(metadata.read(path));
    }
    if options.detect_duplicates && record.size > 0 {
        match sample_fingerprint(path, options.sample_bytes) {
            Ok(fp) => record = record.with_fingerprint(fp),
            Err(e) => warn!(path = %path.display(), error = %e, "fingerprint failed; file will not be deduplicated"),
        }
    }
    debug!(path = %path.display(), size = record.size, "record built");
    Ok(record)
}

fn sniff_image(path: &Path) -> bool {
    infer::get_from_path(path)
        .ok()
        .flatten()
        .map(|t| t.matcher_type() == infer::MatcherType::Image)
        .unwrap_or(false)
}

/// Size plus the first and last `sample_bytes` of the file, hashed with
/// blake3. Files that differ only in their unsampled middle collide; that
/// is accepted in exchange for not reading large files in full.
pub fn sample_fingerprint(path: &Path, sample_bytes: usize) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let sample = sample_bytes.max(1) as u64;
    let mut hasher = blake3::Hasher::new();

    let mut head = vec![0u8; size.min(sample) as usize];
    file.read_exact(&mut head)?;
    hasher.update(&head);

    if size > sample {
        let tail_len = sample.min(size - sample);
        file.seek(SeekFrom::End(-(tail_len as i64)))?;
        let mut tail = vec![0u8; tail_len as usize];
        file.read_exact(&mut tail)?;
        hasher.update(&tail);
    }

    hasher.update(size.to_string().as_bytes());
    Ok(hasher.finalize().to_hex().to_string())
}

fn walk_error(root: &Path, err: &walkdir::Error) -> ScanError {
    let kind = match err.io_error().map(|e| e.kind()) {
        Some(std::io::ErrorKind::PermissionDenied) => ScanErrorKind::PermissionDenied,
        Some(_) => ScanErrorKind::Io,
        None => ScanErrorKind::Walk,
    };
    ScanError {
        path: err
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf()),
        kind,
        message: err.to_string(),
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid exclude glob `{pat}`"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn should_descend(path: &Path, excludes: &GlobSet) -> bool {
    !is_hidden(path) && !excludes.is_match(path)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::NoMetadata;
    use crate::models::FileMetadata;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.txt"), "alpha").unwrap();
        fs::write(root.join("z.pdf"), "zulu").unwrap();
        fs::write(root.join(".hidden"), "secret").unwrap();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("sub").join("b.mp3"), "bravo").unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git").join("HEAD"), "ref").unwrap();
        fs::create_dir_all(root.join("node_modules")).unwrap();
        fs::write(root.join("node_modules").join("x.js"), "x").unwrap();
        dir
    }

    fn names(outcome: &ScanOutcome) -> Vec<String> {
        outcome.records.iter().map(|r| r.name.clone()).collect()
    }

    #[tokio::test]
    async fn scans_in_discovery_order_and_skips_hidden() {
        let dir = tree();
        let cfg = ScanConfig {
            workers: Some(3),
            ..ScanConfig::default()
        };
        let outcome = scan(
            dir.path(),
            &cfg,
            Arc::new(NoMetadata),
            &Cancellation::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(names(&outcome), vec!["a.txt", "x.js", "b.mp3", "z.pdf"]);
        assert!(outcome.errors.is_empty());
        assert!(!outcome.truncated);
        assert!(outcome.records.iter().all(|r| r.path.is_absolute()));
        assert!(outcome.records.iter().all(|r| !r.fingerprint.is_empty()));
    }

    #[tokio::test]
    async fn honours_subfolder_exclude_and_limit_options() {
        let dir = tree();
        let flat = ScanConfig {
            include_subfolders: false,
            ..ScanConfig::default()
        };
        let outcome = scan(dir.path(), &flat, Arc::new(NoMetadata), &Cancellation::new(), None)
            .await
            .unwrap();
        assert_eq!(names(&outcome), vec!["a.txt", "z.pdf"]);

        let excluded = ScanConfig {
            exclude: vec!["**/node_modules".to_string()],
            detect_duplicates: false,
            ..ScanConfig::default()
        };
        let outcome = scan(dir.path(), &excluded, Arc::new(NoMetadata), &Cancellation::new(), None)
            .await
            .unwrap();
        assert_eq!(names(&outcome), vec!["a.txt", "b.mp3", "z.pdf"]);
        assert!(outcome.records.iter().all(|r| r.fingerprint.is_empty()));

        let limited = ScanConfig {
            max_files: 2,
            ..ScanConfig::default()
        };
        let outcome = scan(dir.path(), &limited, Arc::new(NoMetadata), &Cancellation::new(), None)
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.truncated);
    }

    struct FixedKeywords;

    impl MetadataSource for FixedKeywords {
        fn read(&self, _path: &Path) -> FileMetadata {
            FileMetadata {
                keywords: vec!["eagle".into()],
                ..FileMetadata::default()
            }
        }
    }

    #[tokio::test]
    async fn reads_metadata_only_when_asked() {
        let dir = tree();
        let cfg = ScanConfig::default();
        let outcome = scan(dir.path(), &cfg, Arc::new(FixedKeywords), &Cancellation::new(), None)
            .await
            .unwrap();
        assert!(outcome.records.iter().all(|r| r.keywords == vec!["eagle"]));

        let cfg = ScanConfig {
            read_keywords: false,
            ..ScanConfig::default()
        };
        let outcome = scan(dir.path(), &cfg, Arc::new(FixedKeywords), &Cancellation::new(), None)
            .await
            .unwrap();
        assert!(outcome.records.iter().all(|r| r.keywords.is_empty()));
    }

    #[tokio::test]
    async fn cancelled_scan_reports_cancellation() {
        let dir = tree();
        let cancel = Cancellation::new();
        cancel.cancel();
        let outcome = scan(dir.path(), &ScanConfig::default(), Arc::new(NoMetadata), &cancel, None)
            .await
            .unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.records.is_empty());
    }

    #[tokio::test]
    async fn reports_progress_for_every_file() {
        let dir = tree();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = scan(
            dir.path(),
            &ScanConfig::default(),
            Arc::new(NoMetadata),
            &Cancellation::new(),
            Some(tx),
        )
        .await
        .unwrap();
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert_eq!(events.len(), outcome.records.len());
        assert_eq!(events.last().map(|e| e.completed), Some(4));
        assert!(events.iter().all(|e| e.total == 4));
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let res = scan(&missing, &ScanConfig::default(), Arc::new(NoMetadata), &Cancellation::new(), None).await;
        assert!(res.is_err());
    }

    #[test]
    fn fingerprint_ignores_unsampled_middle() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = vec![b'a'; 48];
        let mut second = first.clone();
        first[24] = b'x';
        second[24] = b'y';
        fs::write(dir.path().join("one.bin"), &first).unwrap();
        fs::write(dir.path().join("two.bin"), &second).unwrap();

        let one = sample_fingerprint(&dir.path().join("one.bin"), 16).unwrap();
        let two = sample_fingerprint(&dir.path().join("two.bin"), 16).unwrap();
        assert_eq!(one, two);

        // A change inside the sampled tail is seen.
        second[47] = b'z';
        fs::write(dir.path().join("two.bin"), &second).unwrap();
        let two = sample_fingerprint(&dir.path().join("two.bin"), 16).unwrap();
        assert_ne!(one, two);
    }

    #[test]
    fn fingerprint_depends_on_size() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("short.bin"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join("long.bin"), vec![0u8; 11]).unwrap();
        let short = sample_fingerprint(&dir.path().join("short.bin"), 8192).unwrap();
        let long = sample_fingerprint(&dir.path().join("long.bin"), 8192).unwrap();
        assert_ne!(short, long);
    }
}
