use crate::cancel::Cancellation;
use crate::classifier::{Classifier, ExternalOutcome};
use crate::config::AppConfig;
use crate::duplicates;
use crate::error::ScanError;
use crate::metadata::MetadataSource;
use crate::models::{FileEntry, FileRecord};
use crate::plan::{OrganizationPlan, PlanSettings};
use crate::scanner::{self, ScanProgress};
use anyhow::Context;
use providers::noop::NoopProvider;
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::{ClassifyRequest, ExternalClassifier, ProviderRegistry};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com";

pub struct PipelineRequest {
    pub source_root: PathBuf,
    /// Defaults to a `<source>_Organized` sibling of the source root.
    pub target_root: Option<PathBuf>,
    pub progress: Option<mpsc::UnboundedSender<ScanProgress>>,
}

impl PipelineRequest {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            target_root: None,
            progress: None,
        }
    }

    pub fn with_target(mut self, target_root: impl Into<PathBuf>) -> Self {
        self.target_root = Some(target_root.into());
        self
    }
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub plan: OrganizationPlan,
    pub scan_errors: Vec<ScanError>,
    pub truncated: bool,
    /// The scan was cancelled; the plan covers only what was scanned.
    pub cancelled: bool,
    pub duplicate_groups: usize,
    pub external_requests: usize,
}

/// Scan, detect duplicates, gather external verdicts, classify, and build
/// the plan.
pub async fn run(
    config: &AppConfig,
    request: PipelineRequest,
    metadata: Arc<dyn MetadataSource>,
    provider: Option<Arc<dyn ExternalClassifier>>,
    cancel: &Cancellation,
) -> anyhow::Result<PipelineOutput> {
    let classifier =
        Classifier::from_config(&config.classification).context("loading classification rules")?;

    let source_root = request
        .source_root
        .canonicalize()
        .with_context(|| format!("source root {:?} is not accessible", request.source_root))?;
    let target_root = match request.target_root {
        Some(t) => absolute(&t)?,
        None => default_target(&source_root),
    };

    let outcome = scanner::scan(
        &source_root,
        &config.scan,
        metadata,
        cancel,
        request.progress,
    )
    .await?;

    let (entries, duplicate_groups) = if config.scan.detect_duplicates {
        let report = duplicates::detect(&outcome.records);
        let groups = report.groups().len();
        (report.mark(outcome.records), groups)
    } else {
        (outcome.records.into_iter().map(FileEntry::unique).collect(), 0)
    };

    let pending: Vec<&FileEntry> = entries
        .iter()
        .filter(|e| classifier.needs_external(e))
        .collect();
    let external_requests = pending.len();
    let verdicts = match provider {
        Some(provider) if !pending.is_empty() => {
            gather_verdicts(
                &classifier,
                provider,
                &pending,
                config.classification.external_concurrency,
                cancel,
            )
            .await
        }
        _ => HashMap::new(),
    };

    let classified = classifier.classify_all(entries, &verdicts);
    let settings = PlanSettings::from_config(&source_root, &target_root, &config.plan);
    let plan = OrganizationPlan::build(&classified, &settings)?;

    info!(
        files = plan.moves().len(),
        scan_errors = outcome.errors.len(),
        external_requests,
        cancelled = outcome.cancelled,
        "pipeline complete"
    );
    Ok(PipelineOutput {
        plan,
        scan_errors: outcome.errors,
        truncated: outcome.truncated,
        cancelled: outcome.cancelled,
        duplicate_groups,
        external_requests,
    })
}

/// Asks the provider about each pending entry, at most `concurrency` at a
/// time. Failures become `Unavailable`.
async fn gather_verdicts(
    classifier: &Classifier,
    provider: Arc<dyn ExternalClassifier>,
    pending: &[&FileEntry],
    concurrency: usize,
    cancel: &Cancellation,
) -> HashMap<PathBuf, ExternalOutcome> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let thresholds = classifier.thresholds().clone();
    let mut join_set = JoinSet::new();

    for entry in pending {
        if cancel.is_cancelled() {
            break;
        }
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let provider = provider.clone();
        let thresholds = thresholds.clone();
        let path = entry.record.path.clone();
        let request = classify_request(&entry.record);
        join_set.spawn(async move {
            let _permit = permit;
            let outcome = ExternalOutcome::from_response(provider.classify(&request).await, &thresholds);
            (path, outcome)
        });
    }

    let mut verdicts = HashMap::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((path, outcome)) => {
                verdicts.insert(path, outcome);
            }
            Err(e) => warn!(error = %e, "external classification task failed"),
        }
    }
    verdicts
}

fn classify_request(record: &FileRecord) -> ClassifyRequest {
    ClassifyRequest {
        path: record.path_string(),
        file_name: record.name.clone(),
        extension: record.extension.clone(),
        keywords: record.keywords.clone(),
        description: record.description.clone(),
    }
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("reading current directory")?;
    Ok(cwd.join(path))
}

fn default_target(source_root: &Path) -> PathBuf {
    let name = source_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "files".to_string());
    source_root.with_file_name(format!("{name}_Organized"))
}

/// Registers the no-op provider, plus OpenAI when `OPENAI_API_KEY` is set,
/// and prefers the configured one.
pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let mut reg = ProviderRegistry::new().with_classifier("noop", Arc::new(NoopProvider));

    if let Some(key) = std::env::var_os("OPENAI_API_KEY") {
        let base_url = config
            .provider
            .base_url
            .clone()
            .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE.to_string());
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_key: key.to_string_lossy().into_owned(),
            base_url,
            chat_model: config.provider.model.clone(),
        });
        reg = reg.with_classifier("openai", Arc::new(provider));
    }

    reg.set_preferred(&config.provider.name)
}

/// The configured external classifier, or `None` when photo mode is off
/// or the provider cannot be resolved.
pub fn select_classifier(config: &AppConfig) -> Option<Arc<dyn ExternalClassifier>> {
    if !config.classification.photo_mode {
        return None;
    }
    match build_registry(config).classifier(None) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(provider = %config.provider.name, error = %e, "external classifier disabled");
            None
        }
    }
}
