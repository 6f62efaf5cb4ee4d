//! Challenge-pattern recognition (spec §4.7): records observed
//! anti-automation challenges by time-of-day/day-of-week/trigger and
//! predicts the most likely one for a site given the current context.

use std::collections::HashMap;

use chrono::{Datelike, Timelike, Utc};
use tokio::sync::RwLock;

use crate::types::{now_utc, ChallengeKind, ChallengePattern, TimePattern};

pub struct ChallengeTracker {
    patterns: RwLock<HashMap<(String, ChallengeKind), ChallengePattern>>,
}

impl ChallengeTracker {
    pub fn new() -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
        }
    }

    pub async fn record(&self, site: &str, kind: ChallengeKind, trigger: Option<&str>, recovered: bool) {
        let now = now_utc();
        let mut patterns = self.patterns.write().await;
        let pattern = patterns
            .entry((site.to_string(), kind))
            .or_insert_with(|| ChallengePattern {
                site: site.to_string(),
                challenge_type: kind,
                time_pattern: Some(TimePattern::default()),
                trigger_pattern: Vec::new(),
                recovery_strategy: String::new(),
                success_rate: 0.0,
                last_seen: now,
                occurrences: 0,
            });

        let time_pattern = pattern.time_pattern.get_or_insert_with(TimePattern::default);
        let hour = now.hour();
        if !time_pattern.hours.contains(&hour) {
            time_pattern.hours.push(hour);
        }
        let dow = now.weekday().num_days_from_monday();
        if !time_pattern.days_of_week.contains(&dow) {
            time_pattern.days_of_week.push(dow);
        }

        if let Some(trigger) = trigger {
            if !pattern.trigger_pattern.iter().any(|t| t == trigger) {
                pattern.trigger_pattern.push(trigger.to_string());
            }
        }

        let n = pattern.occurrences as f64;
        let observed = if recovered { 1.0 } else { 0.0 };
        pattern.success_rate = (pattern.success_rate * n + observed) / (n + 1.0);
        pattern.occurrences += 1;
        pattern.last_seen = now;
    }

    /// The pattern with the highest occurrence count among those whose time
    /// window includes the current hour/day and whose trigger substrings
    /// match `action`, if any (spec §4.7).
    pub async fn predict(&self, site: &str, action: &str) -> Option<ChallengePattern> {
        let now = Utc::now();
        let hour = now.hour();
        let dow = now.weekday().num_days_from_monday();

        let patterns = self.patterns.read().await;
        patterns
            .values()
            .filter(|p| p.site == site)
            .filter(|p| {
                p.time_pattern
                    .as_ref()
                    .map(|tp| tp.hours.contains(&hour) && tp.days_of_week.contains(&dow))
                    .unwrap_or(true)
            })
            .filter(|p| p.trigger_pattern.is_empty() || p.trigger_pattern.iter().any(|t| action.contains(t.as_str())))
            .max_by_key(|p| p.occurrences)
            .cloned()
    }
}

impl Default for ChallengeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn predicts_highest_occurrence_match() {
        let tracker = ChallengeTracker::new();
        for _ in 0..3 {
            tracker.record("x.test", ChallengeKind::Cloudflare, Some("checking your browser"), true).await;
        }
        tracker.record("x.test", ChallengeKind::Captcha, Some("verify you are human"), false).await;

        let predicted = tracker.predict("x.test", "checking your browser now").await.unwrap();
        assert_eq!(predicted.challenge_type, ChallengeKind::Cloudflare);
        assert_eq!(predicted.occurrences, 3);
    }

    #[tokio::test]
    async fn no_match_for_unknown_site() {
        let tracker = ChallengeTracker::new();
        tracker.record("x.test", ChallengeKind::Cloudflare, None, true).await;
        assert!(tracker.predict("y.test", "anything").await.is_none());
    }
}
