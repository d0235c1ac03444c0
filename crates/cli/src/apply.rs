use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tidyplan_core::cancel::Cancellation;
use tidyplan_core::executor::{self, EntryOutcome, ExecuteOptions, ExecutionSummary, SkipReason};
use tidyplan_core::plan::OrganizationPlan;

#[derive(Debug, Serialize)]
pub struct ActionView {
    pub source: String,
    pub destination: Option<String>,
    pub status: String,
    pub error: Option<String>,
}

impl ActionView {
    fn from_outcome(source: &str, outcome: &EntryOutcome, dry_run: bool) -> Self {
        let (destination, status, error) = match outcome {
            EntryOutcome::Applied {
                destination,
                renamed,
            } => {
                let status = match (dry_run, renamed) {
                    (true, _) => "planned",
                    (false, true) => "renamed",
                    (false, false) => "executed",
                };
                (
                    Some(destination.to_string_lossy().into_owned()),
                    status,
                    None,
                )
            }
            EntryOutcome::Skipped(SkipReason::Conflict) => (None, "skipped", Some("destination exists".to_string())),
            EntryOutcome::Skipped(SkipReason::Duplicate) => (None, "skipped", Some("duplicate".to_string())),
            EntryOutcome::Skipped(SkipReason::SameFile) => (None, "skipped", Some("already in place".to_string())),
            EntryOutcome::Failed(e) => (None, "error", Some(e.to_string())),
        };
        Self {
            source: source.to_string(),
            destination,
            status: status.to_string(),
            error,
        }
    }
}

pub struct ApplyReport {
    pub views: Vec<ActionView>,
    pub summary: ExecutionSummary,
}

/// Loads and validates a plan file, then executes it.
pub fn apply_plan_file(
    plan_path: &Path,
    opts: &ExecuteOptions,
    cancel: &Cancellation,
) -> Result<ApplyReport> {
    let plan = OrganizationPlan::load(plan_path)
        .with_context(|| format!("loading plan {}", plan_path.display()))?;
    Ok(apply_plan(&plan, opts, cancel))
}

pub fn apply_plan(plan: &OrganizationPlan, opts: &ExecuteOptions, cancel: &Cancellation) -> ApplyReport {
    let summary = executor::execute(plan, opts, cancel);
    let views = summary
        .reports
        .iter()
        .map(|r| ActionView::from_outcome(&r.source, &r.outcome, summary.dry_run))
        .collect();
    ApplyReport { views, summary }
}

pub fn summary_line(summary: &ExecutionSummary) -> String {
    let mut line = if summary.dry_run {
        format!(
            "dry-run: {} would apply, {} skipped, {} failed",
            summary.succeeded(),
            summary.skipped(),
            summary.failed()
        )
    } else {
        format!(
            "apply summary: success={}, skipped={}, failed={}",
            summary.succeeded(),
            summary.skipped(),
            summary.failed()
        )
    };
    if summary.cancelled {
        line.push_str(" (cancelled)");
    }
    line
}
