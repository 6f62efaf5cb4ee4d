//! AdaptiveRetry (spec §4.7): per-error-kind retry policy table, delay
//! schedule, and in-flight adaptation based on observed success rates.

use rand::Rng;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::ErrorKind;
use crate::types::BackoffFamily;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryStrategy {
    pub max_retries: u32,
    pub backoff: BackoffFamily,
    pub base_ms: u64,
    pub cap_ms: u64,
    pub jitter: bool,
    pub adaptive: bool,
}

/// Default strategies per error kind (spec §4.7 table).
pub fn default_strategy(kind: ErrorKind) -> RetryStrategy {
    match kind {
        ErrorKind::Network => RetryStrategy {
            max_retries: 5,
            backoff: BackoffFamily::Exponential,
            base_ms: 1000,
            cap_ms: 30_000,
            jitter: true,
            adaptive: true,
        },
        ErrorKind::Selector => RetryStrategy {
            max_retries: 3,
            backoff: BackoffFamily::Linear,
            base_ms: 500,
            cap_ms: 5_000,
            jitter: false,
            adaptive: true,
        },
        ErrorKind::Timeout => RetryStrategy {
            max_retries: 4,
            backoff: BackoffFamily::Exponential,
            base_ms: 2000,
            cap_ms: 20_000,
            jitter: true,
            adaptive: true,
        },
        ErrorKind::Http500 => RetryStrategy {
            max_retries: 3,
            backoff: BackoffFamily::Exponential,
            base_ms: 2000,
            cap_ms: 15_000,
            jitter: true,
            adaptive: true,
        },
        ErrorKind::Http403 => RetryStrategy {
            max_retries: 0,
            backoff: BackoffFamily::Fixed,
            base_ms: 0,
            cap_ms: 0,
            jitter: false,
            adaptive: false,
        },
        ErrorKind::Other => RetryStrategy {
            max_retries: 2,
            backoff: BackoffFamily::Linear,
            base_ms: 1000,
            cap_ms: 5_000,
            jitter: false,
            adaptive: true,
        },
    }
}

fn backoff_factor(backoff: BackoffFamily, n: u32) -> f64 {
    match backoff {
        BackoffFamily::Exponential => 2f64.powi(n as i32 - 1),
        BackoffFamily::Linear => n as f64,
        BackoffFamily::Fibonacci => fibonacci(n) as f64,
        BackoffFamily::Fixed => 1.0,
    }
}

fn fibonacci(n: u32) -> u64 {
    if n == 0 {
        return 0;
    }
    let (mut a, mut b) = (1u64, 1u64);
    for _ in 1..n {
        let next = a + b;
        a = b;
        b = next;
    }
    a
}

/// `delay(n) = cap(base * f(n)) * (1 + U(-0.1,0.1) if jitter)` (spec §4.7).
pub fn calculate_delay(strategy: &RetryStrategy, n: u32) -> u64 {
    let raw = strategy.base_ms as f64 * backoff_factor(strategy.backoff, n);
    let capped = raw.min(strategy.cap_ms as f64);
    let jittered = if strategy.jitter {
        let jitter: f64 = rand::thread_rng().gen_range(-0.1..=0.1);
        capped * (1.0 + jitter)
    } else {
        capped
    };
    jittered.max(0.0) as u64
}

/// `shouldRetry` (spec §4.7/§7): false when `n` exceeds `maxRetries`, the
/// strategy is 403, or the error message contains a non-retryable marker.
pub fn should_retry(strategy: &RetryStrategy, kind: ErrorKind, n: u32, error_message: &str) -> bool {
    if n > strategy.max_retries {
        return false;
    }
    if kind == ErrorKind::Http403 {
        return false;
    }
    !ErrorKind::is_non_retryable_message(error_message)
}

#[derive(Debug, Default)]
struct SiteKindStats {
    successes: u64,
    failures: u64,
}

impl SiteKindStats {
    fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            1.0
        } else {
            self.successes as f64 / total as f64
        }
    }
}

/// Tracks per-(site, errorKind) outcomes and per-command attempt counts to
/// drive the adaptation rules in spec §4.7.
pub struct AdaptiveRetry {
    stats: RwLock<HashMap<(String, ErrorKind), SiteKindStats>>,
    command_attempts: RwLock<HashMap<String, u32>>,
}

impl AdaptiveRetry {
    pub fn new() -> Self {
        Self {
            stats: RwLock::new(HashMap::new()),
            command_attempts: RwLock::new(HashMap::new()),
        }
    }

    pub async fn record_outcome(&self, site: &str, kind: ErrorKind, success: bool) {
        let mut stats = self.stats.write().await;
        let entry = stats.entry((site.to_string(), kind)).or_default();
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
    }

    pub async fn record_attempt(&self, command_key: &str) -> u32 {
        let mut attempts = self.command_attempts.write().await;
        let count = attempts.entry(command_key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Adapted strategy for `(site, kind)`: reduce maxRetries by 1 (floor 1)
    /// when success rate < 0.3; increase by 1 (ceiling 7) when > 0.8; reduce
    /// by 1 when more than three prior attempts for the same logical command
    /// (spec §4.7).
    pub async fn strategy_for(&self, site: &str, kind: ErrorKind, command_key: &str) -> RetryStrategy {
        let mut strategy = default_strategy(kind);
        if !strategy.adaptive {
            return strategy;
        }

        let stats = self.stats.read().await;
        if let Some(entry) = stats.get(&(site.to_string(), kind)) {
            let rate = entry.success_rate();
            if rate < 0.3 {
                strategy.max_retries = strategy.max_retries.saturating_sub(1).max(1);
            } else if rate > 0.8 {
                strategy.max_retries = (strategy.max_retries + 1).min(7);
            }
        }
        drop(stats);

        let attempts = self.command_attempts.read().await;
        if attempts.get(command_key).copied().unwrap_or(0) > 3 {
            strategy.max_retries = strategy.max_retries.saturating_sub(1).max(1);
        }

        strategy
    }
}

impl Default for AdaptiveRetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_schedule_matches_scenario_3() {
        let strategy = RetryStrategy {
            max_retries: 7,
            backoff: BackoffFamily::Exponential,
            base_ms: 1000,
            cap_ms: 30_000,
            jitter: false,
            adaptive: false,
        };
        let expected = [1000, 2000, 4000, 8000, 16000, 30000, 30000];
        for (n, exp) in (1..=7u32).zip(expected) {
            assert_eq!(calculate_delay(&strategy, n), exp);
        }
    }

    #[test]
    fn delay_never_exceeds_cap() {
        let strategy = default_strategy(ErrorKind::Network);
        for n in 1..20 {
            assert!(calculate_delay(&strategy, n) as u64 <= strategy.cap_ms + strategy.cap_ms / 10 + 1);
        }
    }

    #[test]
    fn should_retry_false_for_403() {
        let strategy = default_strategy(ErrorKind::Http403);
        assert!(!should_retry(&strategy, ErrorKind::Http403, 0, "forbidden"));
    }

    #[test]
    fn should_retry_false_beyond_max_retries() {
        let strategy = default_strategy(ErrorKind::Selector);
        assert!(!should_retry(&strategy, ErrorKind::Selector, 4, "selector timeout"));
    }

    #[test]
    fn should_retry_false_for_non_retryable_message() {
        let strategy = default_strategy(ErrorKind::Selector);
        assert!(!should_retry(&strategy, ErrorKind::Selector, 1, "element not found"));
    }

    #[tokio::test]
    async fn low_success_rate_reduces_max_retries() {
        let retry = AdaptiveRetry::new();
        for _ in 0..8 {
            retry.record_outcome("x.test", ErrorKind::Network, false).await;
        }
        retry.record_outcome("x.test", ErrorKind::Network, true).await;
        let strategy = retry.strategy_for("x.test", ErrorKind::Network, "goto#1").await;
        assert_eq!(strategy.max_retries, default_strategy(ErrorKind::Network).max_retries - 1);
    }

    #[tokio::test]
    async fn many_attempts_reduce_max_retries() {
        let retry = AdaptiveRetry::new();
        for _ in 0..4 {
            retry.record_attempt("fill#email").await;
        }
        let strategy = retry.strategy_for("x.test", ErrorKind::Selector, "fill#email").await;
        assert_eq!(strategy.max_retries, default_strategy(ErrorKind::Selector).max_retries - 1);
    }
}
