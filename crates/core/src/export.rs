//! Alternate renderings of a plan: CSV, a text summary, and a shell script.

use crate::config::PlanAction;
use crate::error::PlanError;
use crate::plan::OrganizationPlan;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

const SUMMARY_MOVE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Txt,
    Sh,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "txt" | "text" => Ok(ExportFormat::Txt),
            "sh" | "shell" => Ok(ExportFormat::Sh),
            other => Err(format!("unknown format `{other}` (expected json|csv|txt|sh)")),
        }
    }
}

pub fn render(plan: &OrganizationPlan, format: ExportFormat) -> Result<String, PlanError> {
    Ok(match format {
        ExportFormat::Json => plan.to_json()?,
        ExportFormat::Csv => to_csv(plan),
        ExportFormat::Txt => to_summary(plan),
        ExportFormat::Sh => to_shell_script(plan),
    })
}

pub fn to_csv(plan: &OrganizationPlan) -> String {
    let mut out =
        String::from("Source,Destination,Filename,Size,Confidence,Classification,Reason,IsDuplicate\n");
    for m in plan.moves() {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{}",
            csv_field(&m.source),
            csv_field(&m.destination),
            csv_field(&m.filename),
            m.size_bytes,
            m.confidence,
            m.classification_source,
            csv_field(&m.reasoning),
            m.is_duplicate
        );
    }
    out
}

pub fn to_summary(plan: &OrganizationPlan) -> String {
    let stats = plan.statistics();
    let mut out = String::new();
    let _ = writeln!(out, "Organization plan");
    let _ = writeln!(out, "Generated: {}", plan.created_at());
    let _ = writeln!(out, "{}", "=".repeat(50));
    let _ = writeln!(out);
    let _ = writeln!(out, "Source: {}", plan.source_root());
    let _ = writeln!(out, "Target: {}", plan.target_root());
    let _ = writeln!(out, "Action: {}", plan.action().as_str().to_uppercase());
    let _ = writeln!(out);
    let _ = writeln!(out, "STATISTICS");
    let _ = writeln!(out, "  Files: {}", stats.total_files);
    let _ = writeln!(out, "  Size: {}", format_size(stats.total_size_bytes));
    let _ = writeln!(out, "  Folders to create: {}", stats.folders_to_create);
    let _ = writeln!(out, "  Duplicates found: {}", stats.duplicates_flagged);
    let _ = writeln!(
        out,
        "  Confidence: {} high, {} medium, {} low",
        stats.confidence_high, stats.confidence_medium, stats.confidence_low
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "FOLDER STRUCTURE");

    let mut top_level: BTreeMap<&str, usize> = BTreeMap::new();
    for m in plan.moves() {
        let top = m.destination.split('/').next().unwrap_or_default();
        *top_level.entry(top).or_default() += 1;
    }
    for (folder, count) in &top_level {
        let _ = writeln!(out, "  {folder}/ ({count} files)");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "FILE MOVES (first {SUMMARY_MOVE_LIMIT})");
    for m in plan.moves().iter().take(SUMMARY_MOVE_LIMIT) {
        let _ = writeln!(out, "  {} -> {}", m.filename, m.destination);
    }
    if plan.moves().len() > SUMMARY_MOVE_LIMIT {
        let _ = writeln!(
            out,
            "  ... and {} more files",
            plan.moves().len() - SUMMARY_MOVE_LIMIT
        );
    }
    out
}

pub fn to_shell_script(plan: &OrganizationPlan) -> String {
    let target = plan.target_root().trim_end_matches('/');
    let cmd = match plan.action() {
        PlanAction::Copy => "cp",
        PlanAction::Move => "mv",
    };
    let mut out = String::from("#!/bin/sh\n");
    let _ = writeln!(out, "# Generated: {}", plan.created_at());
    let _ = writeln!(out, "# Source: {}", plan.source_root());
    let _ = writeln!(out, "# Target: {}", plan.target_root());
    let _ = writeln!(out, "# Action: {}", plan.action());
    let _ = writeln!(out);
    let _ = writeln!(out, "set -e");
    let _ = writeln!(out);
    let _ = writeln!(out, "# Create folders");
    for folder in plan.folders() {
        let _ = writeln!(out, "mkdir -p {}", sh_quote(&format!("{target}/{folder}")));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "# Files");
    for m in plan.moves() {
        let _ = writeln!(
            out,
            "{cmd} {} {}",
            sh_quote(&m.source),
            sh_quote(&format!("{target}/{}", m.destination))
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "echo 'Done. Processed {} files.'", plan.moves().len());
    out
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}
