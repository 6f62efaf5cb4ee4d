//! Executor (spec §4.9): runs a planned command sequence against a live
//! page with human-like delays, page-analysis-driven navigation control,
//! selector healing, and adaptive retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use uuid::Uuid;

use crate::browser_driver::Page;
use crate::command_planner::{selector_to_target, Command};
use crate::error::{CommandError, ErrorKind};
use crate::intelligence::{Decision, IntelligenceEngine};
use crate::knowledge_base::KnowledgeBase;
use crate::page_analyzer::{ExpectedPage, PageAnalyzer};
use crate::performance_monitor::PerformanceMonitor;
use crate::selector_healer::{ElementContext, SelectorHealer};
use crate::strategy::{calculate_delay, should_retry, StrategyManager};
use crate::types::{
    now_utc, CommandRecord, CommandStatus, ExecutionArtifacts, ExecutionMetrics, ExecutionResult, JobStatus,
};

const CONTEXT_ATTRIBUTES: [&str; 7] = ["name", "id", "aria-label", "data-testid", "placeholder", "role", "type"];

pub struct Executor {
    knowledge_base: Arc<KnowledgeBase>,
    healer: Arc<SelectorHealer>,
    strategy: Arc<StrategyManager>,
    performance: Arc<PerformanceMonitor>,
    analyzer: PageAnalyzer,
    intelligence: IntelligenceEngine,
}

impl Executor {
    pub fn new(
        knowledge_base: Arc<KnowledgeBase>,
        healer: Arc<SelectorHealer>,
        strategy: Arc<StrategyManager>,
        performance: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            knowledge_base,
            healer,
            strategy,
            performance,
            analyzer: PageAnalyzer::new(),
            intelligence: IntelligenceEngine::new(),
        }
    }

    pub async fn execute(&self, page: &dyn Page, commands: Vec<Command>, site: &str, job_id: Uuid) -> ExecutionResult {
        let start_time = now_utc();
        let started = Instant::now();
        let mut records = Vec::new();
        let mut screenshots = Vec::new();
        let mut metrics = ExecutionMetrics {
            selector_healing_attempts: 0,
            selector_healing_successes: 0,
            retries: 0,
        };
        let mut status = JobStatus::Success;

        'commands: for command in commands {
            if let Command::Goto { url, .. } = &command {
                if let Ok(analysis) = self.analyzer.analyze(page, &ExpectedPage::default()).await {
                    match self.intelligence.decide(&analysis, None, Some(url)) {
                        Decision::Wait { wait_ms, .. } => tokio::time::sleep(Duration::from_millis(wait_ms)).await,
                        Decision::Pause { requires_human } => {
                            status = pause_status(requires_human);
                            break 'commands;
                        }
                        Decision::Abort => {
                            status = JobStatus::Failed;
                            break 'commands;
                        }
                        _ => {}
                    }
                }
            }

            let command_label = command.kind().to_string();
            let command_start = Instant::now();
            let outcome = self.run_with_recovery(page, command.clone(), site, &mut metrics).await;
            let duration = command_start.elapsed();
            self.performance.record_command(command.kind(), site, duration, outcome.is_ok()).await;

            match outcome {
                Ok(()) => {
                    records.push(CommandRecord {
                        command: command_label,
                        status: CommandStatus::Success,
                        duration_ms: duration.as_millis() as u64,
                        error: None,
                        screenshot: None,
                    });

                    if let Ok(analysis) = self.analyzer.analyze(page, &ExpectedPage::default()).await {
                        match self.intelligence.decide(&analysis, None, None) {
                            Decision::Pause { requires_human } => {
                                status = pause_status(requires_human);
                                break 'commands;
                            }
                            Decision::Abort => {
                                status = JobStatus::Failed;
                                break 'commands;
                            }
                            Decision::Wait { wait_ms, .. } => tokio::time::sleep(Duration::from_millis(wait_ms)).await,
                            _ => {}
                        }
                    }
                }
                Err(err) => {
                    let screenshot_path = page
                        .screenshot()
                        .await
                        .ok()
                        .map(|_| format!("job-{job_id}-cmd-{}.png", records.len()));
                    records.push(CommandRecord {
                        command: command_label,
                        status: CommandStatus::Failed,
                        duration_ms: duration.as_millis() as u64,
                        error: Some(err.message.clone()),
                        screenshot: screenshot_path.clone(),
                    });
                    if let Some(path) = screenshot_path {
                        screenshots.push(path);
                    }
                    if command.is_critical() {
                        status = JobStatus::Failed;
                        break 'commands;
                    }
                }
            }
        }

        let end_time = now_utc();
        ExecutionResult {
            status,
            job_id,
            start_time,
            end_time,
            duration_ms: started.elapsed().as_millis() as u64,
            commands: records,
            artifacts: ExecutionArtifacts { screenshots },
            metrics,
        }
    }

    /// Run one command with selector healing and adaptive retry (spec §4.9).
    async fn run_with_recovery(
        &self,
        page: &dyn Page,
        command: Command,
        site: &str,
        metrics: &mut ExecutionMetrics,
    ) -> Result<(), CommandError> {
        let command_key = format!("{}:{}", command.kind(), selector_of(&command).unwrap_or_default());
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.strategy.retry.record_attempt(&command_key).await;
            human_delay(&command).await;

            match run_single(page, &command).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let kind = err.kind;

                    if kind == ErrorKind::Selector {
                        if let Some(selector) = selector_of(&command) {
                            metrics.selector_healing_attempts += 1;
                            let ctx = gather_element_context(page, &selector, site).await;
                            let candidates = self.healer.heal_selector(&selector, &ctx).await;
                            for candidate in candidates.iter().take(5) {
                                let healed = with_selector(&command, candidate.selector.clone());
                                if run_single(page, &healed).await.is_ok() {
                                    metrics.selector_healing_successes += 1;
                                    let strategy = selector_to_target(&candidate.selector).strategy;
                                    self.knowledge_base
                                        .record_healed_selector(site, &selector, &candidate.selector, strategy)
                                        .await;
                                    return Ok(());
                                }
                            }
                        }
                    }

                    let retry_strategy = self.strategy.strategy_for(site, kind, &command_key).await;
                    self.strategy.record_outcome(site, kind, false).await;
                    if !should_retry(&retry_strategy, kind, attempt, &err.message) {
                        return Err(err);
                    }
                    metrics.retries += 1;
                    let delay = calculate_delay(&retry_strategy, attempt);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }
}

fn pause_status(requires_human: bool) -> JobStatus {
    if requires_human {
        JobStatus::Captcha
    } else {
        JobStatus::Blocked
    }
}

async fn run_single(page: &dyn Page, command: &Command) -> Result<(), CommandError> {
    let label = command.kind();
    let result = match command {
        Command::Goto { url, timeout_ms } => page.goto(url, *timeout_ms).await,
        Command::Fill { selector, value, timeout_ms } => page.fill(selector, value, *timeout_ms).await,
        Command::Click { selector, timeout_ms } => page.click(selector, *timeout_ms).await,
        Command::WaitForSelector { selector, timeout_ms } => page.wait_for_selector(selector, *timeout_ms).await,
        Command::Sleep { timeout_ms } => {
            tokio::time::sleep(Duration::from_millis(*timeout_ms)).await;
            Ok(())
        }
        Command::SelectOption { selector, value } => page.select_option(selector, value).await,
        Command::Press { selector, key } => match selector {
            Some(selector) => page.press(selector, key).await,
            None => page.press("body", key).await,
        },
        Command::Hover { selector } => page.hover(selector).await,
        Command::Scroll { x, y } => page.evaluate(&format!("window.scrollTo({x}, {y})")).await.map(|_| ()),
    };
    result.map_err(|err| CommandError::new(label, err.to_string()))
}

/// Exposed to the pipeline to correlate a `CommandRecord` back to the
/// selector it targeted, for `KnowledgeBase::learn_from_job`.
pub(crate) fn selector_of(command: &Command) -> Option<String> {
    match command {
        Command::Fill { selector, .. }
        | Command::Click { selector, .. }
        | Command::WaitForSelector { selector, .. }
        | Command::SelectOption { selector, .. }
        | Command::Hover { selector } => Some(selector.clone()),
        Command::Press { selector, .. } => selector.clone(),
        _ => None,
    }
}

fn with_selector(command: &Command, new_selector: String) -> Command {
    match command.clone() {
        Command::Fill { value, timeout_ms, .. } => Command::Fill { selector: new_selector, value, timeout_ms },
        Command::Click { timeout_ms, .. } => Command::Click { selector: new_selector, timeout_ms },
        Command::WaitForSelector { timeout_ms, .. } => Command::WaitForSelector { selector: new_selector, timeout_ms },
        Command::SelectOption { value, .. } => Command::SelectOption { selector: new_selector, value },
        Command::Hover { .. } => Command::Hover { selector: new_selector },
        Command::Press { key, .. } => Command::Press { selector: Some(new_selector), key },
        other => other,
    }
}

/// 200-800ms before a click, 300-800ms before a fill (spec §4.9).
async fn human_delay(command: &Command) {
    let ms = match command {
        Command::Click { .. } => Some(rand::thread_rng().gen_range(200..=800)),
        Command::Fill { .. } => Some(rand::thread_rng().gen_range(300..=800)),
        _ => None,
    };
    if let Some(ms) = ms {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Best-effort element context for a failing selector: try the selector
/// itself for a handful of stable attributes and text, per spec §4.9.
async fn gather_element_context(page: &dyn Page, selector: &str, site: &str) -> ElementContext {
    let mut attributes = HashMap::new();
    for name in CONTEXT_ATTRIBUTES {
        if let Ok(Some(value)) = page.get_attribute(selector, name).await {
            attributes.insert(name.to_string(), value);
        }
    }
    let element_text = page.text_content(selector).await.ok().flatten();
    let element_type = attributes.get("type").cloned();
    let bounding_box = page.bounding_box(selector).await.ok().flatten();

    ElementContext {
        site: Some(site.to_string()),
        element_text,
        element_attributes: attributes,
        element_type,
        sibling_tags: Vec::new(),
        container_tags: Vec::new(),
        bounding_box,
        reference_bounding_box: None,
    }
}
