//! JobManager (spec §4.12): owns the job table, enforces the
//! `pending -> running -> {success, failed, retrying, blocked, captcha}`
//! status lifecycle, and accumulates timestamped logs per job.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::types::{now_utc, ExecutionResult, Job, JobStatus, KnowledgeGap, LogLine, RecordingTranscript};

/// Legal next statuses for a job currently in `from` (spec §4.12). Terminal
/// statuses (`Success`, `Failed`) have no legal successors.
fn legal_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    match from {
        Pending => matches!(to, Running),
        Running => matches!(to, Success | Failed | Retrying | Blocked | Captcha),
        Retrying => matches!(to, Running | Failed),
        Blocked | Captcha => matches!(to, Running | Failed),
        Success | Failed => false,
    }
}

pub struct JobManager {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self { jobs: RwLock::new(HashMap::new()) }
    }

    pub async fn create_job(&self, recording: RecordingTranscript) -> Uuid {
        let id = Uuid::new_v4();
        let job = Job {
            id,
            status: JobStatus::Pending,
            recording,
            created_at: now_utc(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            knowledge_gaps: Vec::new(),
            logs: Vec::new(),
        };
        self.jobs.write().await.insert(id, job);
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    pub async fn append_log(&self, id: Uuid, message: impl Into<String>) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| CoreError::JobNotFound(id.to_string()))?;
        job.logs.push(LogLine { timestamp: now_utc(), message: message.into() });
        Ok(())
    }

    pub async fn add_knowledge_gap(&self, id: Uuid, gap: KnowledgeGap) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| CoreError::JobNotFound(id.to_string()))?;
        job.knowledge_gaps.push(gap);
        Ok(())
    }

    /// Transition `id` to `status`, rejecting illegal transitions (spec
    /// §4.12 status lifecycle).
    pub async fn transition(&self, id: Uuid, status: JobStatus) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| CoreError::JobNotFound(id.to_string()))?;
        if !legal_transition(job.status, status) {
            return Err(CoreError::Config(format!("illegal job transition {:?} -> {:?}", job.status, status)));
        }
        if status == JobStatus::Running && job.started_at.is_none() {
            job.started_at = Some(now_utc());
        }
        if status.is_terminal() {
            job.completed_at = Some(now_utc());
        }
        job.status = status;
        Ok(())
    }

    /// Record a completed execution, transitioning the job to the
    /// execution's final status and attaching the result.
    pub async fn complete(&self, id: Uuid, result: ExecutionResult) -> Result<()> {
        let status = result.status;
        {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get_mut(&id).ok_or_else(|| CoreError::JobNotFound(id.to_string()))?;
            if !legal_transition(job.status, status) {
                return Err(CoreError::Config(format!("illegal job transition {:?} -> {:?}", job.status, status)));
            }
            job.result = Some(result);
            if status.is_terminal() {
                job.completed_at = Some(now_utc());
            }
            job.status = status;
        }
        Ok(())
    }

    pub async fn fail(&self, id: Uuid, error: impl Into<String>) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| CoreError::JobNotFound(id.to_string()))?;
        if !legal_transition(job.status, JobStatus::Failed) {
            return Err(CoreError::Config(format!("illegal job transition {:?} -> Failed", job.status)));
        }
        job.error = Some(error.into());
        job.status = JobStatus::Failed;
        job.completed_at = Some(now_utc());
        Ok(())
    }
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordingTranscript;

    fn blank_recording() -> RecordingTranscript {
        RecordingTranscript { title: None, url: None, steps: Vec::new(), metadata: Default::default() }
    }

    #[tokio::test]
    async fn job_lifecycle_runs_pending_to_success() {
        let manager = JobManager::new();
        let id = manager.create_job(blank_recording()).await;
        manager.transition(id, JobStatus::Running).await.unwrap();
        manager.transition(id, JobStatus::Success).await.unwrap();
        let job = manager.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Success);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let manager = JobManager::new();
        let id = manager.create_job(blank_recording()).await;
        let err = manager.transition(id, JobStatus::Success).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn blocked_job_can_resume_to_running() {
        let manager = JobManager::new();
        let id = manager.create_job(blank_recording()).await;
        manager.transition(id, JobStatus::Running).await.unwrap();
        manager.transition(id, JobStatus::Blocked).await.unwrap();
        manager.transition(id, JobStatus::Running).await.unwrap();
        manager.transition(id, JobStatus::Failed).await.unwrap();
        let job = manager.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn logs_accumulate_in_order() {
        let manager = JobManager::new();
        let id = manager.create_job(blank_recording()).await;
        manager.append_log(id, "starting").await.unwrap();
        manager.append_log(id, "navigating").await.unwrap();
        let job = manager.get(id).await.unwrap();
        assert_eq!(job.logs.len(), 2);
        assert_eq!(job.logs[0].message, "starting");
    }
}
