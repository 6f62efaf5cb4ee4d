//! Core data model (spec §3).
//!
//! Recording transcripts, canonical actions/steps, skill specs, and the
//! knowledge-base aggregate records. Kept free of any subsystem logic —
//! subsystems import these types and operate on them.

use std::collections::HashMap;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A strategy tag for one alternative reference in a selector group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefStrategy {
    Css,
    Xpath,
    Accessibility,
    Piercing,
    Text,
    Role,
    TestId,
    Label,
    Visual,
}

impl RefStrategy {
    /// Infer a strategy from a raw reference string's well-known prefix.
    /// Unprefixed strings are assumed CSS.
    pub fn from_raw(raw: &str) -> (Self, &str) {
        if let Some(rest) = raw.strip_prefix("aria/") {
            (RefStrategy::Accessibility, rest)
        } else if let Some(rest) = raw.strip_prefix("xpath/") {
            (RefStrategy::Xpath, rest)
        } else if let Some(rest) = raw.strip_prefix("pierce/") {
            (RefStrategy::Piercing, rest)
        } else {
            (RefStrategy::Css, raw)
        }
    }
}

/// One alternative reference within a selector group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub strategy: RefStrategy,
    pub value: String,
}

impl Reference {
    pub fn parse(raw: &str) -> Self {
        let (strategy, value) = RefStrategy::from_raw(raw);
        Self {
            strategy,
            value: value.to_string(),
        }
    }
}

/// The closed set of recorder step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    Click,
    Input,
    Navigate,
    WaitForSelector,
    WaitForTimeout,
    Wait,
    Pause,
    Assert,
    Scroll,
    KeyDown,
    KeyUp,
    Scrape,
}

/// A structured field inside a `scrape` step with `structure` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeField {
    pub key: String,
    pub selector: String,
    pub attribute: String,
    #[serde(default)]
    pub required: bool,
    pub transform: Option<String>,
}

/// One raw step from a recorder transcript, after preprocessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,
    /// Ordered alternative-reference groups (one outer group per recorded
    /// target; `selectors[0]` is preferred).
    #[serde(default)]
    pub selectors: Vec<Vec<Reference>>,
    pub text: Option<String>,
    pub value: Option<String>,
    pub url: Option<String>,
    pub frame: Option<String>,
    pub key: Option<String>,
    pub offset_x: Option<f64>,
    pub offset_y: Option<f64>,
    pub data_key: Option<String>,
    pub attribute: Option<String>,
    #[serde(default)]
    pub multiple: bool,
    pub structure: Option<Vec<ScrapeField>>,
    pub container_selector: Option<String>,
    pub timestamp: u64,
}

/// An ordered recorder transcript plus optional title/seed URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingTranscript {
    pub title: Option<String>,
    pub url: Option<String>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Metadata extracted from a normalised transcript (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMetadata {
    pub site: Option<String>,
    pub url: Option<String>,
    pub target_url: Option<String>,
    pub step_count: usize,
    pub has_navigation: bool,
    pub has_input: bool,
    pub has_assertion: bool,
}

/// A driver-neutral primitive action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalActionKind {
    Navigate,
    Fill,
    Click,
    WaitFor,
    Select,
    Press,
    Hover,
    Scroll,
    Assert,
}

/// An abstract element reference with optional fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub strategy: RefStrategy,
    pub selector: Option<String>,
    pub value: Option<String>,
    #[serde(default)]
    pub fallbacks: Vec<Target>,
}

impl Target {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            strategy: RefStrategy::Css,
            selector: Some(selector.into()),
            value: None,
            fallbacks: Vec::new(),
        }
    }
}

/// One primitive operation inside a canonical action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalStep {
    pub action: CanonicalActionKind,
    pub target: Option<Target>,
    pub value: Option<String>,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Provenance + confidence for a canonical action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMetadata {
    pub source: String,
    pub site: Option<String>,
    pub confidence: f32,
}

/// A chunk of steps sharing one high-level intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalAction {
    pub intent: String,
    pub steps: Vec<CanonicalStep>,
    pub metadata: ActionMetadata,
}

/// Retry policy attached to a skill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: BackoffFamily,
    pub base_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffFamily {
    Exponential,
    Linear,
    Fibonacci,
    Fixed,
}

/// A declared rate limit for an intent category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimit {
    pub per_host: u32,
    pub per_global: u32,
    pub window_secs: u64,
}

/// A generated skill: canonical steps plus declared inputs/outputs, retry
/// policy, safety checks, and optional rate limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSpec {
    pub name: String,
    pub description: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub steps: Vec<CanonicalStep>,
    pub retry_policy: RetryPolicy,
    pub safety_checks: Vec<String>,
    pub rate_limit: Option<RateLimit>,
}

/// Per-`(site, originalSelector, strategy)` selector history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorHistory {
    pub site: String,
    pub original_selector: String,
    pub healed_selector: String,
    pub strategy: RefStrategy,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_used: DateTime<Utc>,
}

impl SelectorHistory {
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            0.0
        } else {
            self.success_count as f64 / total as f64
        }
    }
}

/// Per-intent learned skill template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillTemplate {
    pub intent: String,
    pub skill_spec: SkillSpec,
    pub success_rate: f64,
    pub usage_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// Per-site aggregate pattern.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SitePattern {
    pub site: String,
    pub common_intents: HashMap<String, u64>,
    pub common_selectors: HashMap<String, u64>,
    pub common_flows: Vec<String>,
    pub success_rate: f64,
    pub total_jobs: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Per-URL aggregate pattern.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UrlPattern {
    pub url: String,
    pub intents: Vec<String>,
    pub selectors: HashMap<String, u64>,
    pub success_rate: f64,
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

/// A recognised anti-automation challenge kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    Cloudflare,
    Captcha,
    Error,
    RateLimit,
    Blocked,
}

/// Observed time-of-day / trigger context for a challenge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimePattern {
    pub hours: Vec<u32>,
    pub days_of_week: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengePattern {
    pub site: String,
    pub challenge_type: ChallengeKind,
    pub time_pattern: Option<TimePattern>,
    pub trigger_pattern: Vec<String>,
    pub recovery_strategy: String,
    pub success_rate: f64,
    pub last_seen: DateTime<Utc>,
    pub occurrences: u64,
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Retrying,
    Blocked,
    Captcha,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

/// Advisory signal describing a situation the core could not handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KnowledgeGap {
    LoginNeeded { site: String },
    TargetUnreachable { url: String },
    NoLearnedSelector { site: String, selector: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub recording: RecordingTranscript,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<ExecutionResult>,
    pub error: Option<String>,
    #[serde(default)]
    pub knowledge_gaps: Vec<KnowledgeGap>,
    #[serde(default)]
    pub logs: Vec<LogLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: String,
    pub status: CommandStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub selector_healing_attempts: u64,
    pub selector_healing_successes: u64,
    pub retries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionArtifacts {
    pub screenshots: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: JobStatus,
    pub job_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub commands: Vec<CommandRecord>,
    pub artifacts: ExecutionArtifacts,
    pub metrics: ExecutionMetrics,
}

/// Scraped field values keyed by data key.
pub type ScrapedData = HashMap<String, serde_json::Value>;

/// Arena-owned records for the Website/Task/TaskRecording cyclic model
/// (Design Notes §9): parent ids, not back-pointers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecording {
    pub id: Uuid,
    pub transcript: RecordingTranscript,
    pub actions: Vec<CanonicalAction>,
    pub recorded_success: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub website_id: Uuid,
    pub name: String,
    pub recordings: Vec<Uuid>,
    pub successful_executions: u64,
    pub total_executions: u64,
}

impl Task {
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64
        }
    }

    /// §3 invariant (iii): dedicated-login regex family, case-insensitive, trimmed.
    pub fn is_dedicated_login(&self) -> bool {
        let name = self.name.trim().to_lowercase();
        matches!(
            name.as_str(),
            "login" | "sign in" | "signin" | "authenticate" | "auth"
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: Uuid,
    pub domain: String,
    pub tasks: Vec<Uuid>,
}

/// An arena of Website/Task/TaskRecording records with an index rebuilt on
/// load, per Design Notes §9 (no back-pointers).
#[derive(Debug, Default)]
pub struct SiteArena {
    pub websites: HashMap<Uuid, Website>,
    pub tasks: HashMap<Uuid, Task>,
    pub recordings: HashMap<Uuid, TaskRecording>,
    /// taskId -> (websiteId, taskIndex)
    task_index: HashMap<Uuid, (Uuid, usize)>,
}

impl SiteArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild_index(&mut self) {
        self.task_index.clear();
        for website in self.websites.values() {
            for (i, task_id) in website.tasks.iter().enumerate() {
                self.task_index.insert(*task_id, (website.id, i));
            }
        }
    }

    pub fn website_of_task(&self, task_id: &Uuid) -> Option<&Website> {
        self.task_index
            .get(task_id)
            .and_then(|(website_id, _)| self.websites.get(website_id))
    }

    pub fn add_website(&mut self, domain: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.websites.insert(
            id,
            Website {
                id,
                domain: domain.into(),
                tasks: Vec::new(),
            },
        );
        id
    }

    pub fn add_task(&mut self, website_id: Uuid, name: impl Into<String>) -> Option<Uuid> {
        let task_id = Uuid::new_v4();
        let task = Task {
            id: task_id,
            website_id,
            name: name.into(),
            recordings: Vec::new(),
            successful_executions: 0,
            total_executions: 0,
        };
        let website = self.websites.get_mut(&website_id)?;
        let index = website.tasks.len();
        website.tasks.push(task_id);
        self.tasks.insert(task_id, task);
        self.task_index.insert(task_id, (website_id, index));
        Some(task_id)
    }

    pub fn add_recording(&mut self, task_id: Uuid, recording: TaskRecording) -> Option<()> {
        let id = recording.id;
        self.recordings.insert(id, recording);
        let task = self.tasks.get_mut(&task_id)?;
        task.recordings.push(id);
        Some(())
    }

    /// Website.successRate is a weighted mean of per-task execution success
    /// rates (spec §3).
    pub fn website_success_rate(&self, website_id: &Uuid) -> f64 {
        let Some(website) = self.websites.get(website_id) else {
            return 0.0;
        };
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for task_id in &website.tasks {
            if let Some(task) = self.tasks.get(task_id) {
                let weight = task.total_executions as f64;
                weighted += task.success_rate() * weight;
                total_weight += weight;
            }
        }
        if total_weight == 0.0 {
            0.0
        } else {
            weighted / total_weight
        }
    }

    /// The dedicated login task for a website, if any (at most one per
    /// invariant iii).
    pub fn dedicated_login_task(&self, website_id: &Uuid) -> Option<&Task> {
        let website = self.websites.get(website_id)?;
        website
            .tasks
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .find(|task| task.is_dedicated_login())
    }
}

/// Convenience for callers that need a timestamp not tied to a job.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

pub fn system_time_now() -> SystemTime {
    SystemTime::now()
}
