//! SelectorHealer (spec §4.5): given a failing reference plus element
//! context, produces a ranked list of candidate references using six
//! strategies plus a bare-tag heuristic fallback.

mod scoring;
mod strategies;

pub use scoring::Candidate;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::cache::LruTtlCache;
use crate::knowledge_base::KnowledgeBase;

const CACHE_TTL: Duration = Duration::from_secs(24 * 3600);
const CACHE_MAX_ENTRIES: usize = 1000;
const STABILITY_CACHE_TTL: Duration = Duration::from_secs(3600);
const STABILITY_CACHE_MAX_ENTRIES: usize = 1000;
const MAX_CANDIDATES: usize = 10;

/// Live-element context available at the time of healing, best-effort
/// gathered by the caller (Executor/TaskExecutor).
#[derive(Debug, Clone, Default)]
pub struct ElementContext {
    pub site: Option<String>,
    pub element_text: Option<String>,
    pub element_attributes: std::collections::HashMap<String, String>,
    pub element_type: Option<String>,
    /// Tag names of stable siblings/containers discovered on the page,
    /// used by the structure/semantic strategies.
    pub sibling_tags: Vec<String>,
    pub container_tags: Vec<String>,
    pub bounding_box: Option<crate::browser_driver::BoundingBox>,
    pub reference_bounding_box: Option<crate::browser_driver::BoundingBox>,
}

type CandidateCacheKey = (String, String, Option<String>, Option<String>);
type StabilityCacheKey = (String, Option<String>, Option<String>);

pub struct SelectorHealer {
    knowledge_base: Arc<KnowledgeBase>,
    candidate_cache: Mutex<LruTtlCache<CandidateCacheKey, Vec<Candidate>>>,
    stability_cache: Mutex<LruTtlCache<StabilityCacheKey, f64>>,
}

impl SelectorHealer {
    pub fn new(knowledge_base: Arc<KnowledgeBase>) -> Self {
        Self {
            knowledge_base,
            candidate_cache: Mutex::new(LruTtlCache::new(CACHE_TTL, CACHE_MAX_ENTRIES)),
            stability_cache: Mutex::new(LruTtlCache::new(STABILITY_CACHE_TTL, STABILITY_CACHE_MAX_ENTRIES)),
        }
    }

    /// `healSelector`: up to 10 candidates sorted by score non-increasingly,
    /// deduplicated by selector string, cached by
    /// `(site, original, elementText, elementType)` for 24h.
    pub async fn heal_selector(&self, failing_selector: &str, ctx: &ElementContext) -> Vec<Candidate> {
        let key: CandidateCacheKey = (
            ctx.site.clone().unwrap_or_default(),
            failing_selector.to_string(),
            ctx.element_text.clone(),
            ctx.element_type.clone(),
        );

        if let Some(cached) = self.candidate_cache.lock().await.get(&key) {
            return cached;
        }

        let mut candidates = Vec::new();

        if let Some(site) = &ctx.site {
            if let Some(learned) = self.knowledge_base.best_selector(site, failing_selector).await {
                if learned.success_count > learned.failure_count {
                    candidates.push(Candidate {
                        selector: learned.healed_selector,
                        score: 0.95,
                        source: "learned".to_string(),
                    });
                }
            }
        }

        candidates.extend(strategies::stable_attributes(ctx));
        candidates.extend(strategies::text(ctx));
        candidates.extend(strategies::structure(ctx));
        candidates.extend(strategies::semantic(ctx));
        candidates.extend(strategies::visual(ctx));

        if candidates.is_empty() {
            candidates.extend(strategies::heuristic_fallback(ctx));
        }

        let candidates = scoring::score_and_rank(candidates, ctx, MAX_CANDIDATES);

        self.candidate_cache.lock().await.put(key, candidates.clone());
        candidates
    }

    /// Rule-based stability prediction for a candidate selector, cached
    /// per `(selector, site, type)` for 1h (spec §4.5).
    pub async fn predict_stability(&self, selector: &str, ctx: &ElementContext) -> f64 {
        let key: StabilityCacheKey = (selector.to_string(), ctx.site.clone(), ctx.element_type.clone());
        if let Some(cached) = self.stability_cache.lock().await.get(&key) {
            return cached;
        }
        let score = scoring::stability_score(selector);
        self.stability_cache.lock().await.put(key, score);
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_base::FileStorageAdapter;

    fn kb() -> Arc<KnowledgeBase> {
        Arc::new(KnowledgeBase::new(Arc::new(FileStorageAdapter::new(
            "/tmp/unused-healer-test.json",
        ))))
    }

    #[tokio::test]
    async fn heal_with_no_history_returns_heuristic_candidates_sorted_and_capped() {
        let healer = SelectorHealer::new(kb());
        let ctx = ElementContext {
            element_type: Some("button".to_string()),
            ..Default::default()
        };
        let candidates = healer.heal_selector(".jsx-abc123", &ctx).await;
        assert!(!candidates.is_empty());
        assert!(candidates.len() <= 10);
        for pair in candidates.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn heal_with_stable_attribute_context_scores_high() {
        let healer = SelectorHealer::new(kb());
        let mut attrs = std::collections::HashMap::new();
        attrs.insert("name".to_string(), "email".to_string());
        let ctx = ElementContext {
            element_attributes: attrs,
            ..Default::default()
        };
        let candidates = healer.heal_selector(".jsx-abc123", &ctx).await;
        let top = &candidates[0];
        assert!(top.selector.contains("email"));
        assert!(top.score >= 0.6);
    }

    #[tokio::test]
    async fn no_duplicate_selectors_in_result() {
        let healer = SelectorHealer::new(kb());
        let mut attrs = std::collections::HashMap::new();
        attrs.insert("name".to_string(), "email".to_string());
        attrs.insert("aria-label".to_string(), "email".to_string());
        let ctx = ElementContext {
            element_attributes: attrs,
            element_text: Some("Email".to_string()),
            ..Default::default()
        };
        let candidates = healer.heal_selector(".x", &ctx).await;
        let mut seen = std::collections::HashSet::new();
        for c in &candidates {
            assert!(seen.insert(c.selector.clone()));
        }
    }
}
