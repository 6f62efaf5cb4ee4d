//! CLI entry point: run a recorder transcript through the pipeline, or
//! inspect knowledge-base/performance state.

use std::sync::Arc;

use anyhow::{Context, Result};
use automation_core::config::SiteConfigManager;
use automation_core::knowledge_base::FileStorageAdapter;
use automation_core::AutomationCore;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "automation-core")]
#[command(about = "Learning automation core: recorder-transcript ingestion, selector healing, adaptive execution")]
struct Cli {
    /// Path to the knowledge-base JSON file.
    #[arg(long, global = true, default_value = "data/knowledge.json")]
    knowledge_base: String,

    /// Path to a site-config JSON file (defaults apply if absent).
    #[arg(long, global = true)]
    site_config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recorder transcript file against a site, using a headless
    /// mock page (no real browser wired in by this binary).
    Run {
        /// Path to the raw recorder transcript JSON file.
        transcript: String,
        /// Site identifier the transcript's selector history is scoped to.
        #[arg(long)]
        site: String,
    },
    /// Print the current performance report as JSON.
    Report,
    /// Print the current performance metrics in Prometheus text format.
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse();

    let site_config = match &cli.site_config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading site config {path}"))?;
            SiteConfigManager::from_json(&raw).with_context(|| format!("parsing site config {path}"))?
        }
        None => SiteConfigManager::default(),
    };

    let adapter = Arc::new(FileStorageAdapter::new(cli.knowledge_base.clone()));
    let core = AutomationCore::new(adapter, site_config).await.context("initializing automation core")?;

    match cli.command {
        Commands::Run { transcript, site } => run_transcript(&core, &transcript, &site).await?,
        Commands::Report => print_report(&core).await,
        Commands::Metrics => print_metrics(&core).await,
    }

    core.shutdown().await.context("flushing knowledge base on shutdown")?;
    Ok(())
}

async fn run_transcript(core: &AutomationCore, transcript_path: &str, site: &str) -> Result<()> {
    let raw = std::fs::read_to_string(transcript_path).with_context(|| format!("reading transcript {transcript_path}"))?;
    let value: serde_json::Value = serde_json::from_str(&raw).with_context(|| format!("parsing transcript {transcript_path}"))?;

    let page = automation_core::browser_driver::MockPage::new();
    info!(site, "running transcript against a mock page; wire a real BrowserDriver for production use");

    let (job_id, run) = core
        .run_recording(&value, page.as_ref(), site)
        .await
        .context("running recording through pipeline")?;

    println!(
        "job {job_id}: {:?}, {} actions, {} commands",
        run.result.status,
        run.actions.len(),
        run.result.commands.len()
    );
    Ok(())
}

async fn print_report(core: &AutomationCore) {
    let report = core.performance.report(10).await;
    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
}

async fn print_metrics(core: &AutomationCore) {
    print!("{}", core.performance.export_prometheus().await);
}

fn init_logger() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
