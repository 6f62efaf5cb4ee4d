//! Learning automation core: ingest browser-recorder transcripts, turn
//! them into reusable skills and driver-agnostic command plans, execute
//! them with selector healing and adaptive retry, and learn from every
//! run so later executions of the same site get more reliable.

pub mod error;
pub mod types;

pub mod domain;
pub mod config;
pub mod cache;

pub mod browser_driver;
pub mod preprocessor;
pub mod intent;
pub mod skill_generator;
pub mod command_planner;

pub mod knowledge_base;
pub mod selector_healer;
pub mod strategy;

pub mod page_analyzer;
pub mod intelligence;
pub mod performance_monitor;

pub mod executor;
pub mod task_executor;
pub mod pipeline;

pub mod scheduler;

use std::sync::Arc;

use crate::browser_driver::Page;
use crate::config::SiteConfigManager;
use crate::error::Result;
use crate::executor::Executor;
use crate::knowledge_base::{FileStorageAdapter, KnowledgeBase, StorageAdapter};
use crate::performance_monitor::PerformanceMonitor;
use crate::pipeline::{Pipeline, PipelineRun};
use crate::scheduler::{JobManager, Scheduler};
use crate::selector_healer::SelectorHealer;
use crate::strategy::StrategyManager;
use crate::task_executor::TaskExecutor;
use uuid::Uuid;

/// Everything wired together: the knowledge base, the execution stack
/// built on top of it, the ingest-to-execute pipeline, the task
/// orchestrator, the per-site config, and the job/scheduling layer. This
/// is the type a CLI or embedding application constructs once at startup.
pub struct AutomationCore {
    pub knowledge_base: Arc<KnowledgeBase>,
    pub pipeline: Arc<Pipeline>,
    pub task_executor: Arc<TaskExecutor>,
    pub performance: Arc<PerformanceMonitor>,
    pub site_config: SiteConfigManager,
    pub jobs: Arc<JobManager>,
    pub scheduler: Arc<Scheduler>,
}

impl AutomationCore {
    /// Build the core against a storage adapter, loading whatever
    /// knowledge the adapter already holds.
    pub async fn new(adapter: Arc<dyn StorageAdapter>, site_config: SiteConfigManager) -> Result<Self> {
        let knowledge_base = Arc::new(KnowledgeBase::new(adapter));
        knowledge_base.load().await?;

        let healer = Arc::new(SelectorHealer::new(knowledge_base.clone()));
        let strategy = Arc::new(StrategyManager::new());
        let performance = Arc::new(PerformanceMonitor::new());
        let executor = Arc::new(Executor::new(knowledge_base.clone(), healer, strategy, performance.clone()));
        let pipeline = Arc::new(Pipeline::new(executor.clone(), knowledge_base.clone()));
        let task_executor = Arc::new(TaskExecutor::new(knowledge_base.clone(), executor, site_config.clone()));

        Ok(Self {
            knowledge_base,
            pipeline,
            task_executor,
            performance,
            site_config,
            jobs: Arc::new(JobManager::new()),
            scheduler: Arc::new(Scheduler::new()),
        })
    }

    /// Convenience constructor backed by the file storage adapter at
    /// `path`, with default site configuration.
    pub async fn with_file_storage(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        let adapter = Arc::new(FileStorageAdapter::new(path));
        Self::new(adapter, SiteConfigManager::default()).await
    }

    /// Run one raw recorder transcript end to end against an already
    /// navigated page, recording a job and persisting what was learned.
    pub async fn run_recording(&self, raw_transcript: &serde_json::Value, page: &dyn Page, site: &str) -> Result<(Uuid, PipelineRun)> {
        let job_id = Uuid::new_v4();
        let run = self.pipeline.run_recording(raw_transcript, page, site, job_id).await?;
        Ok((job_id, run))
    }

    /// Run a learned task end to end (spec §4.10): hub-or-direct
    /// navigation, login hand-off, arrival verification, recording
    /// execution with cross-task selector fallback, and scraping.
    pub async fn run_task(
        &self,
        arena: &crate::types::SiteArena,
        task_id: Uuid,
        target_url: &str,
        parameters: &std::collections::HashMap<String, String>,
        page: &dyn Page,
        hub_url: Option<&str>,
    ) -> Result<crate::task_executor::TaskRunOutcome> {
        let job_id = Uuid::new_v4();
        self.task_executor
            .run_task(arena, task_id, target_url, parameters, page, hub_url, job_id)
            .await
    }

    /// Flush any pending knowledge-base writes and shut down cleanly.
    pub async fn shutdown(&self) -> Result<()> {
        self.knowledge_base.shutdown().await
    }
}

/// Common imports for embedding applications.
pub mod prelude {
    pub use crate::browser_driver::{BrowserDriver, Page};
    pub use crate::command_planner::Command;
    pub use crate::config::{SiteCfg, SiteConfigManager};
    pub use crate::error::{CoreError, ErrorKind, Result};
    pub use crate::executor::Executor;
    pub use crate::knowledge_base::KnowledgeBase;
    pub use crate::pipeline::{Pipeline, PipelineRun};
    pub use crate::scheduler::{JobManager, ScheduledBinding, Scheduler};
    pub use crate::task_executor::{TaskExecutor, TaskRunOutcome};
    pub use crate::types::{CanonicalAction, ExecutionResult, Job, JobStatus, RecordingTranscript, SiteArena};
    pub use crate::AutomationCore;
}
