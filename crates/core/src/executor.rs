//! Applies a plan directly to a local filesystem.
//!
//! Entries run sequentially in plan order. Every per-entry problem is
//! recorded in the summary and the batch carries on.

use crate::cancel::Cancellation;
use crate::config::{ConflictPolicy, DuplicateHandling, PlanAction};
use crate::error::ExecutionError;
use crate::paths::resolve;
use crate::plan::{MoveEntry, OrganizationPlan};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Resolve everything but leave the filesystem untouched.
    pub dry_run: bool,
    /// Replaces the plan's `on_conflict` when set.
    pub conflict: Option<ConflictPolicy>,
    pub copy_then_delete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Destination existed and the policy was `skip`.
    Conflict,
    /// Duplicate entry while duplicates are skipped or left for review.
    Duplicate,
    /// Destination resolves to the source file itself.
    SameFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Applied { destination: PathBuf, renamed: bool },
    Skipped(SkipReason),
    Failed(ExecutionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub source: String,
    pub outcome: EntryOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionSummary {
    pub reports: Vec<EntryReport>,
    /// Set when cancellation stopped the batch; remaining entries were
    /// not attempted.
    pub cancelled: bool,
    pub dry_run: bool,
}

impl ExecutionSummary {
    pub fn succeeded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, EntryOutcome::Applied { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, EntryOutcome::Skipped(_)))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ExecutionError)> {
        self.reports.iter().filter_map(|r| match &r.outcome {
            EntryOutcome::Failed(e) => Some((r.source.as_str(), e)),
            _ => None,
        })
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }
}

pub fn execute(
    plan: &OrganizationPlan,
    opts: &ExecuteOptions,
    cancel: &Cancellation,
) -> ExecutionSummary {
    let target_root = PathBuf::from(plan.target_root());
    let options = plan.options();
    let policy = opts.conflict.unwrap_or(options.on_conflict);
    let mut summary = ExecutionSummary {
        dry_run: opts.dry_run,
        ..Default::default()
    };

    let mut folder_errors: HashMap<&str, ExecutionError> = HashMap::new();
    if options.create_folders && !opts.dry_run {
        for folder in plan.folders() {
            let dir = resolve(&target_root, folder);
            if let Err(e) = fs::create_dir_all(&dir) {
                warn!(folder = %folder, error = %e, "failed to create folder");
                folder_errors.insert(
                    folder.as_str(),
                    ExecutionError::FolderCreation {
                        folder: folder.clone(),
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    // Destinations taken earlier in this run; a dry run writes nothing,
    // so existence checks alone would miss them.
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    for entry in plan.moves() {
        if cancel.is_cancelled() {
            info!(
                remaining = plan.moves().len() - summary.reports.len(),
                "execution cancelled"
            );
            summary.cancelled = true;
            break;
        }

        let outcome = if entry.is_duplicate
            && matches!(
                options.handle_duplicates,
                DuplicateHandling::Skip | DuplicateHandling::Ask
            ) {
            EntryOutcome::Skipped(SkipReason::Duplicate)
        } else if let Some(err) = folder_errors.get(entry.folder()) {
            EntryOutcome::Failed(err.clone())
        } else {
            apply_entry(
                entry,
                &target_root,
                plan.action(),
                policy,
                options.create_folders,
                opts,
                &mut claimed,
            )
        };

        match &outcome {
            EntryOutcome::Failed(e) => warn!(source = %entry.source, error = %e, "entry failed"),
            EntryOutcome::Skipped(reason) => debug!(source = %entry.source, ?reason, "entry skipped"),
            EntryOutcome::Applied { destination, .. } => {
                debug!(source = %entry.source, destination = %destination.display(), "entry applied")
            }
        }
        summary.reports.push(EntryReport {
            source: entry.source.clone(),
            outcome,
        });
    }

    info!(
        succeeded = summary.succeeded(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        dry_run = opts.dry_run,
        "execution finished"
    );
    summary
}

fn apply_entry(
    entry: &MoveEntry,
    target_root: &Path,
    action: PlanAction,
    policy: ConflictPolicy,
    folders_created: bool,
    opts: &ExecuteOptions,
    claimed: &mut HashSet<PathBuf>,
) -> EntryOutcome {
    let source = PathBuf::from(&entry.source);
    if !source.exists() {
        return EntryOutcome::Failed(ExecutionError::SourceMissing);
    }

    let dest = resolve(target_root, &entry.destination);
    let folder_ready = dest.parent().map(Path::is_dir).unwrap_or(false);
    // Without pre-creation the folder must already be there; a dry run
    // with pre-creation assumes the folders would be made.
    if !folder_ready && !(opts.dry_run && folders_created) {
        return EntryOutcome::Failed(ExecutionError::FolderMissing(entry.folder().to_string()));
    }

    if is_same_file(&source, &dest) {
        return EntryOutcome::Skipped(SkipReason::SameFile);
    }

    let occupied = |p: &Path| p.exists() || claimed.contains(p);
    let (target, renamed) = if occupied(&dest) {
        match policy {
            ConflictPolicy::Skip => return EntryOutcome::Skipped(SkipReason::Conflict),
            ConflictPolicy::Overwrite => (dest, false),
            ConflictPolicy::Rename => (resolve_conflict(&dest, occupied), true),
        }
    } else {
        (dest, false)
    };

    if !opts.dry_run {
        if let Err(e) = transfer(&source, &target, action, opts.copy_then_delete) {
            return EntryOutcome::Failed(e);
        }
    }
    claimed.insert(target.clone());
    EntryOutcome::Applied {
        destination: target,
        renamed,
    }
}

fn is_same_file(source: &Path, dest: &Path) -> bool {
    match (fs::canonicalize(source), fs::canonicalize(dest)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// First free `stem (n).ext` next to `dest`, counting from 1.
fn resolve_conflict(dest: &Path, occupied: impl Fn(&Path) -> bool) -> PathBuf {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let ext = dest
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut counter = 1;
    loop {
        let name = if ext.is_empty() {
            format!("{stem} ({counter})")
        } else {
            format!("{stem} ({counter}).{ext}")
        };
        let candidate = parent.join(name);
        if !occupied(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

fn transfer(
    from: &Path,
    to: &Path,
    action: PlanAction,
    copy_then_delete: bool,
) -> Result<(), ExecutionError> {
    match action {
        PlanAction::Copy => {
            fs::copy(from, to).map_err(|e| ExecutionError::io("copy", &e))?;
        }
        PlanAction::Move if copy_then_delete => copy_and_remove(from, to)?,
        PlanAction::Move => {
            if let Err(e) = fs::rename(from, to) {
                // Typically a cross-device move.
                debug!(error = %e, "rename failed, falling back to copy and remove");
                copy_and_remove(from, to)?;
            }
        }
    }
    Ok(())
}

fn copy_and_remove(from: &Path, to: &Path) -> Result<(), ExecutionError> {
    fs::copy(from, to).map_err(|e| ExecutionError::io("copy", &e))?;
    fs::remove_file(from).map_err(|e| ExecutionError::io("remove source", &e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanConfig;
    use crate::models::{
        ClassificationResult, ClassificationSource, ClassifiedFile, Confidence, FileEntry,
        FileRecord,
    };
    use crate::plan::PlanSettings;
    use chrono::Utc;
    use tempfile::TempDir;

    struct Fixture {
        src: TempDir,
        dst: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                src: tempfile::tempdir().unwrap(),
                dst: tempfile::tempdir().unwrap(),
            }
        }

        fn file(&self, rel: &str, body: &str) -> PathBuf {
            let path = self.src.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, body).unwrap();
            path
        }

        fn plan(
            &self,
            files: &[(&PathBuf, &str, Option<&PathBuf>)],
            cfg: PlanConfig,
        ) -> OrganizationPlan {
            let classified: Vec<ClassifiedFile> = files
                .iter()
                .map(|(path, folder, dup)| ClassifiedFile {
                    entry: FileEntry {
                        record: FileRecord::from_path(path)
                            .unwrap_or_else(|_| FileRecord::new(path.as_path(), 1, Utc::now())),
                        duplicate_of: dup.cloned(),
                    },
                    result: ClassificationResult {
                        destination: folder.to_string(),
                        confidence: Confidence::High,
                        source: ClassificationSource::Rule,
                        rationale: "test".to_string(),
                    },
                })
                .collect();
            let settings = PlanSettings::from_config(self.src.path(), self.dst.path(), &cfg);
            OrganizationPlan::build(&classified, &settings).unwrap()
        }

        fn target(&self, rel: &str) -> PathBuf {
            resolve(self.dst.path(), rel)
        }
    }

    fn run(plan: &OrganizationPlan, opts: ExecuteOptions) -> ExecutionSummary {
        execute(plan, &opts, &Cancellation::new())
    }

    #[test]
    fn copies_into_created_folders() {
        let fx = Fixture::new();
        let a = fx.file("a.jpg", "A");
        let b = fx.file("nested/b.pdf", "B");
        let plan = fx.plan(
            &[(&a, "Photos/2025", None), (&b, "Documents/PDF/2025", None)],
            PlanConfig::default(),
        );
        let summary = run(&plan, ExecuteOptions::default());
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 0);
        assert_eq!(fs::read_to_string(fx.target("Photos/2025/a.jpg")).unwrap(), "A");
        assert_eq!(fs::read_to_string(fx.target("Documents/PDF/2025/b.pdf")).unwrap(), "B");
        assert!(a.exists());
    }

    #[test]
    fn rename_policy_counts_upwards() {
        let fx = Fixture::new();
        let a = fx.file("a.jpg", "new");
        let plan = fx.plan(&[(&a, "Photos/2025", None)], PlanConfig::default());
        fs::create_dir_all(fx.target("Photos/2025")).unwrap();
        fs::write(fx.target("Photos/2025/a.jpg"), "old").unwrap();

        let first = run(&plan, ExecuteOptions::default());
        assert_eq!(
            first.reports[0].outcome,
            EntryOutcome::Applied {
                destination: fx.target("Photos/2025/a (1).jpg"),
                renamed: true
            }
        );
        let second = run(&plan, ExecuteOptions::default());
        assert_eq!(
            second.reports[0].outcome,
            EntryOutcome::Applied {
                destination: fx.target("Photos/2025/a (2).jpg"),
                renamed: true
            }
        );
        assert_eq!(fs::read_to_string(fx.target("Photos/2025/a.jpg")).unwrap(), "old");
        assert_eq!(fs::read_to_string(fx.target("Photos/2025/a (2).jpg")).unwrap(), "new");
    }

    #[test]
    fn skip_and_overwrite_policies() {
        let fx = Fixture::new();
        let a = fx.file("a.txt", "new");
        let plan = fx.plan(&[(&a, "Docs", None)], PlanConfig::default());
        fs::create_dir_all(fx.target("Docs")).unwrap();
        fs::write(fx.target("Docs/a.txt"), "old").unwrap();

        let skipped = run(
            &plan,
            ExecuteOptions {
                conflict: Some(ConflictPolicy::Skip),
                ..Default::default()
            },
        );
        assert_eq!(skipped.reports[0].outcome, EntryOutcome::Skipped(SkipReason::Conflict));
        assert_eq!(fs::read_to_string(fx.target("Docs/a.txt")).unwrap(), "old");

        let overwritten = run(
            &plan,
            ExecuteOptions {
                conflict: Some(ConflictPolicy::Overwrite),
                ..Default::default()
            },
        );
        assert_eq!(overwritten.succeeded(), 1);
        assert_eq!(fs::read_to_string(fx.target("Docs/a.txt")).unwrap(), "new");
    }

    #[test]
    fn missing_source_fails_without_stopping_the_batch() {
        let fx = Fixture::new();
        let gone = fx.file("gone.txt", "x");
        let kept = fx.file("kept.txt", "y");
        let plan = fx.plan(&[(&gone, "Docs", None), (&kept, "Docs", None)], PlanConfig::default());
        fs::remove_file(&gone).unwrap();

        let summary = run(&plan, ExecuteOptions::default());
        assert_eq!(summary.succeeded(), 1);
        let failures: Vec<_> = summary.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].1, &ExecutionError::SourceMissing);
        assert!(fx.target("Docs/kept.txt").exists());
    }

    #[test]
    fn move_removes_source_with_and_without_copy_then_delete() {
        let fx = Fixture::new();
        let a = fx.file("a.txt", "A");
        let b = fx.file("b.txt", "B");
        let cfg = PlanConfig {
            action: PlanAction::Move,
            ..PlanConfig::default()
        };
        let plan = fx.plan(&[(&a, "Docs", None)], cfg.clone());
        run(&plan, ExecuteOptions::default());
        assert!(!a.exists());
        assert!(fx.target("Docs/a.txt").exists());

        let plan = fx.plan(&[(&b, "Docs", None)], cfg);
        run(
            &plan,
            ExecuteOptions {
                copy_then_delete: true,
                ..Default::default()
            },
        );
        assert!(!b.exists());
        assert_eq!(fs::read_to_string(fx.target("Docs/b.txt")).unwrap(), "B");
    }

    #[test]
    fn dry_run_touches_nothing_but_resolves_renames() {
        let fx = Fixture::new();
        let one = fx.file("one/x.txt", "1");
        let two = fx.file("two/x.txt", "2");
        let plan = fx.plan(&[(&one, "Docs", None), (&two, "Docs", None)], PlanConfig::default());

        let summary = run(
            &plan,
            ExecuteOptions {
                dry_run: true,
                ..Default::default()
            },
        );
        assert!(summary.dry_run);
        let destinations: Vec<PathBuf> = summary
            .reports
            .iter()
            .map(|r| match &r.outcome {
                EntryOutcome::Applied { destination, .. } => destination.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            destinations,
            vec![fx.target("Docs/x.txt"), fx.target("Docs/x (1).txt")]
        );
        assert!(!fx.target("Docs").exists());
    }

    #[test]
    fn duplicates_are_skipped_when_configured() {
        let fx = Fixture::new();
        let orig = fx.file("a.jpg", "same");
        let dup = fx.file("copy/a.jpg", "same");
        let cfg = PlanConfig {
            handle_duplicates: DuplicateHandling::Ask,
            ..PlanConfig::default()
        };
        let plan = fx.plan(
            &[(&orig, "Photos", None), (&dup, "_Duplicates", Some(&orig))],
            cfg,
        );
        let summary = run(&plan, ExecuteOptions::default());
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.skipped(), 1);
        assert!(!fx.target("_Duplicates/a.jpg").exists());
    }

    #[test]
    fn missing_folder_fails_when_folders_are_not_created() {
        let fx = Fixture::new();
        let a = fx.file("a.txt", "A");
        let cfg = PlanConfig {
            create_folders: false,
            ..PlanConfig::default()
        };
        let plan = fx.plan(&[(&a, "Docs/Text", None)], cfg);
        let summary = run(&plan, ExecuteOptions::default());
        assert_eq!(
            summary.reports[0].outcome,
            EntryOutcome::Failed(ExecutionError::FolderMissing("Docs/Text".to_string()))
        );
        assert!(!fx.target("Docs").exists());
    }

    #[test]
    fn cancellation_stops_between_entries() {
        let fx = Fixture::new();
        let a = fx.file("a.txt", "A");
        let plan = fx.plan(&[(&a, "Docs", None)], PlanConfig::default());
        let cancel = Cancellation::new();
        cancel.cancel();
        let summary = execute(&plan, &ExecuteOptions::default(), &cancel);
        assert!(summary.cancelled);
        assert!(summary.reports.is_empty());
        assert!(!fx.target("Docs/a.txt").exists());
    }

    #[test]
    fn entry_already_at_its_destination_is_left_alone() {
        let root = tempfile::tempdir().unwrap();
        let doc = root.path().join("Docs").join("a.txt");
        fs::create_dir_all(doc.parent().unwrap()).unwrap();
        fs::write(&doc, "precious data").unwrap();
        let files = vec![ClassifiedFile {
            entry: FileEntry::unique(FileRecord::from_path(&doc).unwrap()),
            result: ClassificationResult {
                destination: "Docs".to_string(),
                confidence: Confidence::High,
                source: ClassificationSource::Rule,
                rationale: "test".to_string(),
            },
        }];

        for (action, policy) in [
            (PlanAction::Copy, ConflictPolicy::Overwrite),
            (PlanAction::Move, ConflictPolicy::Rename),
        ] {
            let cfg = PlanConfig {
                action,
                on_conflict: policy,
                ..PlanConfig::default()
            };
            let settings = PlanSettings::from_config(root.path(), root.path(), &cfg);
            let plan = OrganizationPlan::build(&files, &settings).unwrap();
            let summary = run(&plan, ExecuteOptions::default());
            assert_eq!(
                summary.reports[0].outcome,
                EntryOutcome::Skipped(SkipReason::SameFile)
            );
            assert_eq!(fs::read_to_string(&doc).unwrap(), "precious data");
            assert!(!root.path().join("Docs").join("a (1).txt").exists());
        }
    }
}
