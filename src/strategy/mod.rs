//! StrategyManager + AdaptiveRetry (spec §4.7): retry-policy selection per
//! error kind and challenge-pattern learning, combined behind one façade
//! used by the Executor.

mod challenge;
mod retry;

pub use challenge::ChallengeTracker;
pub use retry::{calculate_delay, default_strategy, should_retry, AdaptiveRetry, RetryStrategy};

use crate::error::ErrorKind;
use crate::types::ChallengePattern;

pub struct StrategyManager {
    pub retry: AdaptiveRetry,
    pub challenges: ChallengeTracker,
}

impl StrategyManager {
    pub fn new() -> Self {
        Self {
            retry: AdaptiveRetry::new(),
            challenges: ChallengeTracker::new(),
        }
    }

    pub async fn strategy_for(&self, site: &str, kind: ErrorKind, command_key: &str) -> RetryStrategy {
        self.retry.strategy_for(site, kind, command_key).await
    }

    pub async fn record_outcome(&self, site: &str, kind: ErrorKind, success: bool) {
        self.retry.record_outcome(site, kind, success).await
    }

    pub async fn predict_challenge(&self, site: &str, action: &str) -> Option<ChallengePattern> {
        self.challenges.predict(site, action).await
    }
}

impl Default for StrategyManager {
    fn default() -> Self {
        Self::new()
    }
}
