//! Scheduler (spec §4.12/§6): cron-triggered task bindings, reloaded and
//! reconciled against the on-disk binding file within one minute.

pub mod job_manager;

pub use job_manager::JobManager;

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::types::now_utc;

/// One `(taskId, targetUrl, parameters, schedule, enabled)` binding (spec
/// §4.12). Persisted as its own JSON file under `data/` per spec §6, one
/// array entry per binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledBinding {
    pub id: Uuid,
    pub task_id: Uuid,
    pub target_url: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// Cron expression in the `cron` crate's seconds-first syntax
    /// (`sec min hour day-of-month month day-of-week [year]`), evaluated
    /// in UTC.
    pub schedule: String,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

/// In-memory scheduler state: the binding table plus each binding's next
/// fire time, recomputed whenever the table is reloaded or a run completes.
pub struct Scheduler {
    bindings: RwLock<HashMap<Uuid, ScheduledBinding>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { bindings: RwLock::new(HashMap::new()) }
    }

    /// Replace the binding table wholesale (e.g. after reading the bindings
    /// file back off disk) and recompute every `next_run`. Disabled
    /// bindings keep `next_run = None`.
    pub async fn reload(&self, mut incoming: Vec<ScheduledBinding>) -> Result<()> {
        for binding in &mut incoming {
            binding.next_run = compute_next_run(binding)?;
        }
        let mut bindings = self.bindings.write().await;
        bindings.clear();
        for binding in incoming {
            bindings.insert(binding.id, binding);
        }
        Ok(())
    }

    pub async fn upsert(&self, mut binding: ScheduledBinding) -> Result<()> {
        binding.next_run = compute_next_run(&binding)?;
        self.bindings.write().await.insert(binding.id, binding);
        Ok(())
    }

    pub async fn remove(&self, id: Uuid) {
        self.bindings.write().await.remove(&id);
    }

    pub async fn get(&self, id: Uuid) -> Option<ScheduledBinding> {
        self.bindings.read().await.get(&id).cloned()
    }

    /// Bindings whose `next_run` has arrived, enabled only (spec §4.12
    /// "due bindings").
    pub async fn due(&self, now: DateTime<Utc>) -> Vec<ScheduledBinding> {
        self.bindings
            .read()
            .await
            .values()
            .filter(|b| b.enabled)
            .filter(|b| b.next_run.map(|n| n <= now).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Record that a binding fired at `ran_at` and recompute its next fire
    /// time. The invariant `next_run > last_run` (spec §8) follows directly
    /// from asking the cron schedule for the next tick strictly after
    /// `ran_at`.
    pub async fn record_run(&self, id: Uuid, ran_at: DateTime<Utc>) -> Result<()> {
        let mut bindings = self.bindings.write().await;
        let binding = bindings.get_mut(&id).ok_or_else(|| CoreError::Config(format!("no such binding: {id}")))?;
        binding.last_run = Some(ran_at);
        binding.next_run = next_after(&binding.schedule, ran_at)?;
        Ok(())
    }

    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<()> {
        let mut bindings = self.bindings.write().await;
        let binding = bindings.get_mut(&id).ok_or_else(|| CoreError::Config(format!("no such binding: {id}")))?;
        binding.enabled = enabled;
        binding.next_run = if enabled { next_after(&binding.schedule, now_utc())? } else { None };
        Ok(())
    }

    pub async fn all(&self) -> Vec<ScheduledBinding> {
        self.bindings.read().await.values().cloned().collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn compute_next_run(binding: &ScheduledBinding) -> Result<Option<DateTime<Utc>>> {
    if !binding.enabled {
        return Ok(None);
    }
    let after = binding.last_run.unwrap_or_else(now_utc);
    next_after(&binding.schedule, after)
}

fn next_after(expression: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    let schedule = Schedule::from_str(expression).map_err(|e| CoreError::Config(format!("invalid cron expression {expression:?}: {e}")))?;
    Ok(schedule.after(&after).next())
}
