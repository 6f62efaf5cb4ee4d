//! KnowledgeBase (spec §4.6): three persisted in-memory maps (selector
//! history, skill templates, site patterns) plus a transient URL-pattern
//! map, backed by a pluggable [`StorageAdapter`].

pub mod adapter;
pub mod file_adapter;
#[cfg(feature = "relational-storage")]
pub mod relational_adapter;

pub use adapter::StorageAdapter;
pub use file_adapter::FileStorageAdapter;
#[cfg(feature = "relational-storage")]
pub use relational_adapter::RelationalStorageAdapter;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::domain::canonical_url;
use crate::error::Result;
use crate::types::{
    now_utc, CanonicalAction, RefStrategy, RecordingTranscript, SelectorHistory, SitePattern,
    SkillTemplate, StepKind, UrlPattern,
};

/// Flush coalescing window (spec §3 invariant vi).
const DEBOUNCE: Duration = Duration::from_secs(2);

/// Key into the selector-history map: `(site, originalSelector, strategy)`.
type SelectorKey = (String, String, RefStrategy);

/// One correlated selector outcome from an executed plan, as produced by
/// the Executor: the selector that was ultimately used (possibly a healed
/// candidate), its strategy, and whether the command succeeded.
#[derive(Debug, Clone)]
pub struct SelectorOutcome {
    pub original_selector: String,
    pub healed_selector: String,
    pub strategy: RefStrategy,
    pub success: bool,
}

pub struct KnowledgeBase {
    adapter: Arc<dyn StorageAdapter>,
    selector_history: RwLock<HashMap<SelectorKey, SelectorHistory>>,
    skill_templates: RwLock<HashMap<String, SkillTemplate>>,
    site_patterns: RwLock<HashMap<String, SitePattern>>,
    url_patterns: RwLock<HashMap<String, UrlPattern>>,
    generation: AtomicU64,
}

impl KnowledgeBase {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            selector_history: RwLock::new(HashMap::new()),
            skill_templates: RwLock::new(HashMap::new()),
            site_patterns: RwLock::new(HashMap::new()),
            url_patterns: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Cold start: populate in-memory maps from the adapter's bulk reads.
    pub async fn load(&self) -> Result<()> {
        self.adapter.initialize().await?;

        let mut history = self.selector_history.write().await;
        for entry in self.adapter.get_all_selector_histories().await? {
            history.insert(
                (entry.site.clone(), entry.original_selector.clone(), entry.strategy),
                entry,
            );
        }
        drop(history);

        let mut templates = self.skill_templates.write().await;
        for tpl in self.adapter.get_all_skill_templates().await? {
            templates.insert(tpl.intent.clone(), tpl);
        }
        drop(templates);

        let mut patterns = self.site_patterns.write().await;
        for pattern in self.adapter.get_all_site_patterns().await? {
            patterns.insert(pattern.site.clone(), pattern);
        }

        Ok(())
    }

    /// `bestSelector(site, originalSelector)`: among entries whose
    /// original or healed selector equals the argument, the one with the
    /// highest success rate (spec §4.6).
    pub async fn best_selector(&self, site: &str, original_selector: &str) -> Option<SelectorHistory> {
        let history = self.selector_history.read().await;
        history
            .values()
            .filter(|h| {
                h.site == site && (h.original_selector == original_selector || h.healed_selector == original_selector)
            })
            .max_by(|a, b| a.success_rate().partial_cmp(&b.success_rate()).unwrap())
            .cloned()
    }

    /// `getKnownUrl(url)`: exact match first, else normalised comparison.
    pub async fn get_known_url(&self, url: &str) -> Option<UrlPattern> {
        let patterns = self.url_patterns.read().await;
        if let Some(exact) = patterns.get(url) {
            return Some(exact.clone());
        }
        let canonical = canonical_url(url)?;
        patterns
            .values()
            .find(|p| canonical_url(&p.url).as_deref() == Some(canonical.as_str()))
            .cloned()
    }

    pub async fn record_selector_success(self: &Arc<Self>, site: &str, selector: &str, strategy: RefStrategy) {
        self.upsert_history(site, selector, selector, strategy, true).await;
        self.schedule_flush();
    }

    pub async fn record_selector_failure(self: &Arc<Self>, site: &str, selector: &str, strategy: RefStrategy) {
        self.upsert_history(site, selector, selector, strategy, false).await;
        self.schedule_flush();
    }

    /// Record a healing success: `originalSelector` failed, `healedSelector`
    /// worked. Used by the Executor when a healed candidate succeeds.
    pub async fn record_healed_selector(
        self: &Arc<Self>,
        site: &str,
        original_selector: &str,
        healed_selector: &str,
        strategy: RefStrategy,
    ) {
        self.upsert_history(site, original_selector, healed_selector, strategy, true).await;
        self.schedule_flush();
    }

    async fn upsert_history(
        &self,
        site: &str,
        original_selector: &str,
        healed_selector: &str,
        strategy: RefStrategy,
        success: bool,
    ) {
        let key = (site.to_string(), original_selector.to_string(), strategy);
        let mut history = self.selector_history.write().await;
        let entry = history.entry(key).or_insert_with(|| SelectorHistory {
            site: site.to_string(),
            original_selector: original_selector.to_string(),
            healed_selector: healed_selector.to_string(),
            strategy,
            success_count: 0,
            failure_count: 0,
            last_used: now_utc(),
        });
        entry.healed_selector = healed_selector.to_string();
        if success {
            entry.success_count += 1;
        } else {
            entry.failure_count += 1;
        }
        entry.last_used = now_utc();
    }

    /// `learnFromJob(site, actions, result, recording)` (spec §4.6).
    pub async fn learn_from_job(
        self: &Arc<Self>,
        site: &str,
        actions: &[CanonicalAction],
        outcomes: &[SelectorOutcome],
        overall_success: bool,
        recording: &RecordingTranscript,
    ) {
        for outcome in outcomes {
            self.upsert_history(
                site,
                &outcome.original_selector,
                &outcome.healed_selector,
                outcome.strategy,
                outcome.success,
            )
            .await;
        }

        self.update_skill_templates(actions, overall_success).await;
        self.update_site_pattern(site, actions, outcomes, overall_success).await;
        self.update_url_patterns(recording, outcomes, overall_success).await;

        self.schedule_flush();
    }

    async fn update_skill_templates(&self, actions: &[CanonicalAction], overall_success: bool) {
        let mut templates = self.skill_templates.write().await;
        for action in actions {
            let entry = templates.entry(action.intent.clone()).or_insert_with(|| SkillTemplate {
                intent: action.intent.clone(),
                skill_spec: crate::types::SkillSpec {
                    name: action.intent.clone(),
                    description: String::new(),
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                    steps: action.steps.clone(),
                    retry_policy: crate::types::RetryPolicy {
                        max_retries: 2,
                        backoff: crate::types::BackoffFamily::Linear,
                        base_ms: 500,
                    },
                    safety_checks: Vec::new(),
                    rate_limit: None,
                },
                success_rate: 0.0,
                usage_count: 0,
                last_updated: now_utc(),
            });

            // Running mean (spec §3 invariant ii): usageCount strictly increases.
            let n = entry.usage_count as f64;
            let observed = if overall_success { 1.0 } else { 0.0 };
            entry.success_rate = (entry.success_rate * n + observed) / (n + 1.0);
            entry.usage_count += 1;
            entry.last_updated = now_utc();

            if overall_success {
                entry.skill_spec.steps = action.steps.clone();
            }
        }
    }

    async fn update_site_pattern(
        &self,
        site: &str,
        actions: &[CanonicalAction],
        outcomes: &[SelectorOutcome],
        overall_success: bool,
    ) {
        let mut patterns = self.site_patterns.write().await;
        let pattern = patterns.entry(site.to_string()).or_insert_with(|| SitePattern {
            site: site.to_string(),
            ..Default::default()
        });

        for action in actions {
            *pattern.common_intents.entry(action.intent.clone()).or_insert(0) += 1;
        }
        for outcome in outcomes {
            *pattern.common_selectors.entry(outcome.healed_selector.clone()).or_insert(0) += 1;
        }
        for pair in actions.windows(2) {
            pattern.common_flows.push(format!("{} -> {}", pair[0].intent, pair[1].intent));
        }

        let n = pattern.total_jobs as f64;
        let observed = if overall_success { 1.0 } else { 0.0 };
        pattern.success_rate = (pattern.success_rate * n + observed) / (n + 1.0);
        pattern.total_jobs += 1;
        pattern.last_updated = Some(now_utc());
    }

    async fn update_url_patterns(
        &self,
        recording: &RecordingTranscript,
        outcomes: &[SelectorOutcome],
        overall_success: bool,
    ) {
        let navigate_urls: Vec<&str> = recording
            .steps
            .iter()
            .filter(|s| s.kind == StepKind::Navigate)
            .filter_map(|s| s.url.as_deref())
            .collect();

        if navigate_urls.is_empty() {
            return;
        }

        let mut patterns = self.url_patterns.write().await;
        for url in navigate_urls {
            let pattern = patterns.entry(url.to_string()).or_insert_with(|| UrlPattern {
                url: url.to_string(),
                ..Default::default()
            });
            for outcome in outcomes {
                *pattern.selectors.entry(outcome.healed_selector.clone()).or_insert(0) += 1;
            }
            let n = pattern.usage_count as f64;
            let observed = if overall_success { 1.0 } else { 0.0 };
            pattern.success_rate = (pattern.success_rate * n + observed) / (n + 1.0);
            pattern.usage_count += 1;
            pattern.last_used = Some(now_utc());
        }
    }

    /// Schedule a debounced flush: coalesces bursts of mutations into one
    /// save roughly 2s after the last one (spec §3 invariant vi).
    pub fn schedule_flush(self: &Arc<Self>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let kb = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            if kb.generation.load(Ordering::SeqCst) == generation {
                let _ = kb.flush().await;
            }
        });
    }

    /// Flush all in-memory state to the adapter, grouped per the storage
    /// contract's per-site / per-intent shape. Must be called on shutdown
    /// (spec §3 invariant vi).
    pub async fn flush(&self) -> Result<()> {
        let mut by_site: HashMap<String, Vec<SelectorHistory>> = HashMap::new();
        for entry in self.selector_history.read().await.values() {
            by_site.entry(entry.site.clone()).or_default().push(entry.clone());
        }
        for (site, list) in by_site {
            self.adapter.save_selector_history(&site, list).await?;
        }

        for tpl in self.skill_templates.read().await.values() {
            self.adapter.save_skill_template(&tpl.intent, tpl.clone()).await?;
        }

        for pattern in self.site_patterns.read().await.values() {
            self.adapter.save_site_pattern(&pattern.site, pattern.clone()).await?;
        }

        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.flush().await?;
        self.adapter.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionMetadata, Step};

    fn transcript_with_nav(url: &str) -> RecordingTranscript {
        RecordingTranscript {
            title: None,
            url: Some(url.to_string()),
            steps: vec![Step {
                kind: StepKind::Navigate,
                selectors: Vec::new(),
                text: None,
                value: None,
                url: Some(url.to_string()),
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
            }],
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn best_selector_picks_highest_success_rate() {
        let kb = KnowledgeBase::new(Arc::new(FileStorageAdapter::new("/tmp/unused-kb-test.json")));
        kb.upsert_history("x.test", ".old", "#good", RefStrategy::Css, true).await;
        kb.upsert_history("x.test", ".old", "#good", RefStrategy::Css, true).await;
        kb.upsert_history("x.test", ".old", "#bad", RefStrategy::Xpath, false).await;

        let best = kb.best_selector("x.test", ".old").await.unwrap();
        assert_eq!(best.healed_selector, "#good");
    }

    #[tokio::test]
    async fn learn_from_job_updates_templates_and_patterns() {
        let kb = Arc::new(KnowledgeBase::new(Arc::new(FileStorageAdapter::new(
            "/tmp/unused-kb-test-2.json",
        ))));
        let action = CanonicalAction {
            intent: "submit-login".to_string(),
            steps: Vec::new(),
            metadata: ActionMetadata {
                source: "pattern".to_string(),
                site: Some("x.test".to_string()),
                confidence: 0.7,
            },
        };
        let outcome = SelectorOutcome {
            original_selector: ".old".to_string(),
            healed_selector: "#new".to_string(),
            strategy: RefStrategy::Css,
            success: true,
        };
        kb.learn_from_job(
            "x.test",
            &[action],
            &[outcome],
            true,
            &transcript_with_nav("https://x.test/login"),
        )
        .await;

        let templates = kb.skill_templates.read().await;
        let tpl = templates.get("submit-login").unwrap();
        assert_eq!(tpl.usage_count, 1);
        assert_eq!(tpl.success_rate, 1.0);

        let patterns = kb.site_patterns.read().await;
        let pattern = patterns.get("x.test").unwrap();
        assert_eq!(pattern.total_jobs, 1);
        assert_eq!(*pattern.common_intents.get("submit-login").unwrap(), 1);

        let known = kb.get_known_url("https://x.test/login").await;
        assert!(known.is_some());
    }
}
