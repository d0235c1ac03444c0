use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::apply;
use cli::report::ScanSummary;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tidyplan_core::cancel::Cancellation;
use tidyplan_core::config::{self, AppConfig, ConflictPolicy, PlanAction};
use tidyplan_core::executor::ExecuteOptions;
use tidyplan_core::export::{self, ExportFormat};
use tidyplan_core::metadata::{ExiftoolReader, MetadataSource, NoMetadata};
use tidyplan_core::pipeline::{self, PipelineOutput, PipelineRequest};
use tidyplan_core::plan::OrganizationPlan;
use tidyplan_core::scanner::ScanProgress;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    let cancel = Cancellation::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping after the current file");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Scan { source, json } => run_scan(cfg, source, json, &cancel).await,
        Commands::Plan {
            source,
            target,
            action,
            output,
            format,
        } => run_plan(cfg, source, target, action, output, format, &cancel).await,
        Commands::Apply {
            plan,
            dry_run,
            conflict,
            json,
        } => run_apply(cfg, plan, dry_run, conflict, json, &cancel),
        Commands::Show { plan, format } => run_show(plan, format),
    }
}

#[derive(Parser)]
#[command(name = "tidyplan")]
#[command(about = "Plan-first file organizer", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan and classify a folder, printing a summary
    Scan {
        source: PathBuf,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Build an organization plan for a folder
    Plan {
        source: PathBuf,
        /// Target root (default: <source>_Organized)
        #[arg(long)]
        target: Option<PathBuf>,
        /// copy|move, overrides the config
        #[arg(long)]
        action: Option<PlanAction>,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// json|csv|txt|sh
        #[arg(long, default_value = "json")]
        format: ExportFormat,
    },
    /// Apply a saved plan to the filesystem
    Apply {
        plan: PathBuf,
        /// Do not actually perform changes, only print what would happen
        #[arg(long)]
        dry_run: bool,
        /// Conflict policy: rename|skip|overwrite (default: the plan's)
        #[arg(long)]
        conflict: Option<ConflictPolicy>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a saved plan and render it
    Show {
        plan: PathBuf,
        /// json|csv|txt|sh
        #[arg(long, default_value = "txt")]
        format: ExportFormat,
    },
}

async fn build_plan(
    cfg: &AppConfig,
    request: PipelineRequest,
    cancel: &Cancellation,
) -> Result<PipelineOutput> {
    let metadata: Arc<dyn MetadataSource> = if cfg.scan.read_keywords {
        Arc::new(ExiftoolReader::new())
    } else {
        Arc::new(NoMetadata)
    };
    let provider = pipeline::select_classifier(cfg);

    let (tx, mut rx) = mpsc::unbounded_channel::<ScanProgress>();
    let progress = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            if p.completed % 500 == 0 || p.completed == p.total {
                debug!(completed = p.completed, total = p.total, "scan progress");
            }
        }
    });

    let request = PipelineRequest {
        progress: Some(tx),
        ..request
    };
    let output = pipeline::run(cfg, request, metadata, provider, cancel).await?;
    let _ = progress.await;
    Ok(output)
}

async fn run_scan(cfg: AppConfig, source: PathBuf, json: bool, cancel: &Cancellation) -> Result<()> {
    let output = build_plan(&cfg, PipelineRequest::new(source), cancel).await?;
    let summary = ScanSummary::from_output(&output);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary.to_text());
    }
    Ok(())
}

async fn run_plan(
    mut cfg: AppConfig,
    source: PathBuf,
    target: Option<PathBuf>,
    action: Option<PlanAction>,
    output: Option<PathBuf>,
    format: ExportFormat,
    cancel: &Cancellation,
) -> Result<()> {
    if let Some(action) = action {
        cfg.plan.action = action;
    }
    let mut request = PipelineRequest::new(source);
    request.target_root = target;
    let result = build_plan(&cfg, request, cancel).await?;
    let rendered = export::render(&result.plan, format)?;
    match output {
        Some(path) => {
            fs::write(&path, rendered)
                .with_context(|| format!("writing plan to {}", path.display()))?;
            info!(path = %path.display(), files = result.plan.moves().len(), "plan written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn run_apply(
    cfg: AppConfig,
    plan: PathBuf,
    dry_run: bool,
    conflict: Option<ConflictPolicy>,
    json: bool,
    cancel: &Cancellation,
) -> Result<()> {
    let opts = ExecuteOptions {
        dry_run,
        conflict,
        copy_then_delete: cfg.execution.copy_then_delete,
    };
    let report = apply::apply_plan_file(&plan, &opts, cancel)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report.views)?);
    } else {
        for v in &report.views {
            let detail = v
                .destination
                .as_deref()
                .or(v.error.as_deref())
                .unwrap_or("");
            println!("{:<9} {} -> {}", v.status, v.source, detail);
        }
        println!("{}", apply::summary_line(&report.summary));
    }
    Ok(())
}

fn run_show(plan: PathBuf, format: ExportFormat) -> Result<()> {
    let plan = OrganizationPlan::load(&plan)
        .with_context(|| format!("loading plan {}", plan.display()))?;
    println!("{}", export::render(&plan, format)?);
    Ok(())
}
