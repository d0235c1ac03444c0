use serde::Serialize;
use std::collections::BTreeMap;
use tidyplan_core::export::format_size;
use tidyplan_core::pipeline::PipelineOutput;

#[derive(Debug, Serialize)]
pub struct ScanSummary {
    pub status: &'static str,
    pub source_root: String,
    pub target_root: String,
    pub files: usize,
    pub total_size_bytes: u64,
    pub folders: usize,
    pub duplicate_groups: usize,
    pub duplicates: usize,
    pub external_requests: usize,
    pub by_source: BTreeMap<String, usize>,
    pub scan_errors: Vec<String>,
    pub truncated: bool,
    pub cancelled: bool,
}

impl ScanSummary {
    pub fn from_output(output: &PipelineOutput) -> Self {
        let plan = &output.plan;
        let stats = plan.statistics();
        let mut by_source = BTreeMap::new();
        for m in plan.moves() {
            *by_source
                .entry(m.classification_source.to_string())
                .or_insert(0) += 1;
        }
        Self {
            status: if output.cancelled { "cancelled" } else { "ok" },
            source_root: plan.source_root().to_string(),
            target_root: plan.target_root().to_string(),
            files: stats.total_files,
            total_size_bytes: stats.total_size_bytes,
            folders: stats.folders_to_create,
            duplicate_groups: output.duplicate_groups,
            duplicates: stats.duplicates_flagged,
            external_requests: output.external_requests,
            by_source,
            scan_errors: output.scan_errors.iter().map(|e| e.to_string()).collect(),
            truncated: output.truncated,
            cancelled: output.cancelled,
        }
    }

    pub fn to_text(&self) -> String {
        let mut lines = vec![format!(
            "scan: {} files ({}) into {} folders, {} duplicates in {} groups",
            self.files,
            format_size(self.total_size_bytes),
            self.folders,
            self.duplicates,
            self.duplicate_groups
        )];
        let sources: Vec<String> = self
            .by_source
            .iter()
            .map(|(source, count)| format!("{source}={count}"))
            .collect();
        if !sources.is_empty() {
            lines.push(format!("classified by: {}", sources.join(", ")));
        }
        if self.truncated {
            lines.push("file limit reached; remaining files were not scanned".to_string());
        }
        if self.cancelled {
            lines.push("scan cancelled".to_string());
        }
        for err in &self.scan_errors {
            lines.push(format!("error: {err}"));
        }
        lines.join("\n")
    }
}
