//! PerformanceMonitor (spec §4.11): rolling latency/outcome statistics per
//! command, per selector, and per page-operation, plus bottleneck
//! classification and Prometheus/JSON export.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

const ROLLING_WINDOW_COMMAND: usize = 1000;
const ROLLING_WINDOW_OPERATION: usize = 100;
const SLOW_COMMAND_P95_MS: u64 = 5_000;
const SLOW_COMMAND_P95_HIGH_MS: u64 = 10_000;
const HIGH_FAILURE_MIN_SAMPLES: u64 = 10;
const HIGH_FAILURE_RATE: f64 = 0.3;
const HIGH_FAILURE_RATE_SEVERE: f64 = 0.5;

#[derive(Debug, Default, Clone)]
struct CommandStats {
    total: u64,
    successful: u64,
    failed: u64,
    total_duration_ms: u64,
    min_duration_ms: u64,
    max_duration_ms: u64,
    durations: Vec<u64>,
}

impl CommandStats {
    fn record(&mut self, duration: Duration, success: bool) {
        let ms = duration.as_millis() as u64;
        self.total += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.total_duration_ms += ms;
        self.min_duration_ms = if self.total == 1 { ms } else { self.min_duration_ms.min(ms) };
        self.max_duration_ms = self.max_duration_ms.max(ms);
        self.durations.push(ms);
        if self.durations.len() > ROLLING_WINDOW_COMMAND {
            self.durations.remove(0);
        }
    }

    fn avg_duration_ms(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.total as f64
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }

    fn percentile(&self, p: f64) -> u64 {
        percentile(&self.durations, p)
    }
}

#[derive(Debug, Default, Clone)]
struct SelectorStats {
    total: u64,
    successful: u64,
    failed: u64,
}

impl SelectorStats {
    fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.successful as f64 / self.total as f64
        }
    }

    /// `successRate * min(1, uses/10)` (spec §4.11).
    fn stability_score(&self) -> f64 {
        self.success_rate() * (self.total as f64 / 10.0).min(1.0)
    }
}

#[derive(Debug, Default, Clone)]
struct OperationStats {
    durations: Vec<u64>,
}

impl OperationStats {
    fn record(&mut self, duration: Duration) {
        self.durations.push(duration.as_millis() as u64);
        if self.durations.len() > ROLLING_WINDOW_OPERATION {
            self.durations.remove(0);
        }
    }

    fn optimal_wait_ms(&self) -> u64 {
        percentile(&self.durations, 0.95)
    }
}

fn percentile(durations: &[u64], p: f64) -> u64 {
    if durations.is_empty() {
        return 0;
    }
    let mut sorted = durations.to_vec();
    sorted.sort_unstable();
    let rank = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bottleneck {
    pub kind: String,
    pub subject: String,
    pub site: String,
    pub severity: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowCommandEntry {
    pub command: String,
    pub site: String,
    pub p95_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnstableSelectorEntry {
    pub selector: String,
    pub strategy: String,
    pub site: String,
    pub stability_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub slow_commands: Vec<SlowCommandEntry>,
    pub unstable_selectors: Vec<UnstableSelectorEntry>,
    pub bottlenecks: Vec<Bottleneck>,
}

pub struct PerformanceMonitor {
    commands: RwLock<HashMap<(String, String), CommandStats>>,
    selectors: RwLock<HashMap<(String, String, String), SelectorStats>>,
    operations: RwLock<HashMap<(String, String, String), OperationStats>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            selectors: RwLock::new(HashMap::new()),
            operations: RwLock::new(HashMap::new()),
        }
    }

    pub async fn record_command(&self, command: &str, site: &str, duration: Duration, success: bool) {
        let mut commands = self.commands.write().await;
        commands
            .entry((command.to_string(), site.to_string()))
            .or_default()
            .record(duration, success);
    }

    pub async fn record_selector(&self, selector: &str, strategy: &str, site: &str, success: bool) {
        let mut selectors = self.selectors.write().await;
        let entry = selectors
            .entry((selector.to_string(), strategy.to_string(), site.to_string()))
            .or_default();
        entry.total += 1;
        if success {
            entry.successful += 1;
        } else {
            entry.failed += 1;
        }
    }

    pub async fn record_operation(&self, operation: &str, site: &str, page_type: &str, duration: Duration) {
        let mut operations = self.operations.write().await;
        operations
            .entry((operation.to_string(), site.to_string(), page_type.to_string()))
            .or_default()
            .record(duration);
    }

    pub async fn stability_score(&self, selector: &str, strategy: &str, site: &str) -> f64 {
        self.selectors
            .read()
            .await
            .get(&(selector.to_string(), strategy.to_string(), site.to_string()))
            .map(|s| s.stability_score())
            .unwrap_or(0.0)
    }

    pub async fn optimal_wait_ms(&self, operation: &str, site: &str, page_type: &str) -> u64 {
        self.operations
            .read()
            .await
            .get(&(operation.to_string(), site.to_string(), page_type.to_string()))
            .map(|s| s.optimal_wait_ms())
            .unwrap_or(0)
    }

    /// Top-N slow commands, unstable selectors, and derived bottlenecks
    /// (spec §4.11).
    pub async fn report(&self, top_n: usize) -> PerformanceReport {
        let commands = self.commands.read().await;
        let selectors = self.selectors.read().await;

        let mut slow_commands: Vec<SlowCommandEntry> = commands
            .iter()
            .map(|((command, site), stats)| SlowCommandEntry {
                command: command.clone(),
                site: site.clone(),
                p95_ms: stats.percentile(0.95),
            })
            .collect();
        slow_commands.sort_by(|a, b| b.p95_ms.cmp(&a.p95_ms));
        slow_commands.truncate(top_n);

        let mut unstable_selectors: Vec<UnstableSelectorEntry> = selectors
            .iter()
            .map(|((selector, strategy, site), stats)| UnstableSelectorEntry {
                selector: selector.clone(),
                strategy: strategy.clone(),
                site: site.clone(),
                stability_score: stats.stability_score(),
            })
            .collect();
        unstable_selectors.sort_by(|a, b| a.stability_score.partial_cmp(&b.stability_score).unwrap());
        unstable_selectors.truncate(top_n);

        let mut bottlenecks = Vec::new();
        for ((command, site), stats) in commands.iter() {
            let p95 = stats.percentile(0.95);
            if p95 > SLOW_COMMAND_P95_MS {
                let severity = if p95 > SLOW_COMMAND_P95_HIGH_MS { Severity::High } else { Severity::Normal };
                bottlenecks.push(Bottleneck {
                    kind: "slow_command".to_string(),
                    subject: command.clone(),
                    site: site.clone(),
                    severity: severity_label(severity),
                    recommendation: format!("p95 latency {p95}ms exceeds threshold; consider caching or a faster wait strategy"),
                });
            }
            if stats.total > HIGH_FAILURE_MIN_SAMPLES && stats.failure_rate() > HIGH_FAILURE_RATE {
                let severity = if stats.failure_rate() > HIGH_FAILURE_RATE_SEVERE { Severity::High } else { Severity::Normal };
                bottlenecks.push(Bottleneck {
                    kind: "high_failure_rate".to_string(),
                    subject: command.clone(),
                    site: site.clone(),
                    severity: severity_label(severity),
                    recommendation: "failure rate exceeds threshold; review selector health and retry policy".to_string(),
                });
            }
        }

        PerformanceReport { slow_commands, unstable_selectors, bottlenecks }
    }

    pub async fn export_prometheus(&self) -> String {
        let commands = self.commands.read().await;
        let mut out = String::new();
        out.push_str("# HELP automation_core_command_duration_ms Command duration in milliseconds\n");
        out.push_str("# TYPE automation_core_command_duration_avg_ms gauge\n");
        for ((command, site), stats) in commands.iter() {
            out.push_str(&format!(
                "automation_core_command_duration_avg_ms{{command=\"{command}\",site=\"{site}\"}} {}\n",
                stats.avg_duration_ms()
            ));
            out.push_str(&format!(
                "automation_core_command_total{{command=\"{command}\",site=\"{site}\"}} {}\n",
                stats.total
            ));
            out.push_str(&format!(
                "automation_core_command_failure_rate{{command=\"{command}\",site=\"{site}\"}} {}\n",
                stats.failure_rate()
            ));
        }
        out
    }

    pub async fn export_json(&self) -> serde_json::Value {
        let commands = self.commands.read().await;
        let per_command: Vec<_> = commands
            .iter()
            .map(|((command, site), stats)| {
                json!({
                    "command": command,
                    "site": site,
                    "total": stats.total,
                    "successful": stats.successful,
                    "failed": stats.failed,
                    "avgDurationMs": stats.avg_duration_ms(),
                    "p50Ms": stats.percentile(0.5),
                    "p95Ms": stats.percentile(0.95),
                    "p99Ms": stats.percentile(0.99),
                })
            })
            .collect();
        json!({ "commands": per_command })
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn severity_label(severity: Severity) -> String {
    match severity {
        Severity::Normal => "normal".to_string(),
        Severity::High => "high".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn percentiles_follow_rolling_window() {
        let monitor = PerformanceMonitor::new();
        for ms in 1..=100u64 {
            monitor.record_command("goto", "x.test", Duration::from_millis(ms), true).await;
        }
        let report = monitor.report(10).await;
        let entry = report.slow_commands.iter().find(|c| c.command == "goto").unwrap();
        assert_eq!(entry.p95_ms, 95);
    }

    #[tokio::test]
    async fn stability_score_combines_rate_and_usage() {
        let monitor = PerformanceMonitor::new();
        for _ in 0..5 {
            monitor.record_selector("#email", "stable-attribute", "x.test", true).await;
        }
        let score = monitor.stability_score("#email", "stable-attribute", "x.test").await;
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn high_failure_rate_flagged_as_bottleneck() {
        let monitor = PerformanceMonitor::new();
        for i in 0..20 {
            monitor.record_command("click", "x.test", Duration::from_millis(10), i % 2 == 0).await;
        }
        let report = monitor.report(10).await;
        assert!(report.bottlenecks.iter().any(|b| b.kind == "high_failure_rate"));
    }

    #[tokio::test]
    async fn slow_command_flagged_high_severity_above_ten_seconds() {
        let monitor = PerformanceMonitor::new();
        for _ in 0..5 {
            monitor.record_command("goto", "x.test", Duration::from_millis(12_000), true).await;
        }
        let report = monitor.report(10).await;
        let bottleneck = report.bottlenecks.iter().find(|b| b.kind == "slow_command").unwrap();
        assert_eq!(bottleneck.severity, "high");
    }
}
