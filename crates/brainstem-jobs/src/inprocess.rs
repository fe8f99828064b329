use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::Result;
use brainstem_core::ids::new_job_id;
use chrono::Utc;

use crate::traits::JobQueue;
use crate::types::{JobKind, JobRecord, JobStatus};

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<String, JobRecord>,
    queue: VecDeque<String>,
    dead_letters: Vec<String>,
}

/// FIFO in-memory queue, single background worker.
#[derive(Debug, Default)]
pub struct InProcessJobQueue {
    state: Mutex<State>,
}

impl InProcessJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobQueue for InProcessJobQueue {
    fn enqueue(
        &self,
        kind: JobKind,
        tenant_id: &str,
        agent_id: &str,
        payload: serde_json::Value,
        max_attempts: u32,
    ) -> Result<JobRecord> {
        let job = JobRecord {
            job_id: new_job_id(),
            kind,
            tenant_id: tenant_id.to_owned(),
            agent_id: agent_id.to_owned(),
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            payload,
            result: None,
            error: None,
            attempts: 0,
            max_attempts,
        };

        let mut state = self.state.lock().expect("job queue lock poisoned");
        state.queue.push_back(job.job_id.clone());
        state.jobs.insert(job.job_id.clone(), job.clone());
        Ok(job)
    }

    fn claim_next(&self) -> Result<Option<JobRecord>> {
        let mut state = self.state.lock().expect("job queue lock poisoned");
        let Some(job_id) = state.queue.pop_front() else {
            return Ok(None);
        };
        let now = Utc::now();
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        job.status = JobStatus::Running;
        job.started_at = Some(now);
        job.attempts += 1;
        Ok(Some(job.clone()))
    }

    fn complete(&self, job_id: &str, result: serde_json::Value) -> Result<()> {
        let mut state = self.state.lock().expect("job queue lock poisoned");
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.status = JobStatus::Completed;
            job.finished_at = Some(Utc::now());
            job.result = Some(result);
            job.error = None;
        }
        Ok(())
    }

    fn retry_or_fail(&self, job_id: &str, error: String) -> Result<bool> {
        let mut state = self.state.lock().expect("job queue lock poisoned");
        let Some(job) = state.jobs.get_mut(job_id) else {
            return Ok(false);
        };
        job.error = Some(error);
        if job.attempts < job.max_attempts {
            job.status = JobStatus::Queued;
            job.finished_at = None;
            state.queue.push_back(job_id.to_owned());
            Ok(true)
        } else {
            job.status = JobStatus::Failed;
            job.finished_at = Some(Utc::now());
            state.dead_letters.push(job_id.to_owned());
            Ok(false)
        }
    }

    fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let state = self.state.lock().expect("job queue lock poisoned");
        Ok(state.jobs.get(job_id).cloned())
    }

    fn list_dead_letters(&self, tenant_id: &str, limit: usize) -> Result<Vec<JobRecord>> {
        let state = self.state.lock().expect("job queue lock poisoned");
        let mut records: Vec<JobRecord> = state
            .dead_letters
            .iter()
            .filter_map(|job_id| state.jobs.get(job_id))
            .filter(|job| job.tenant_id == tenant_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            let a_key = a.finished_at.unwrap_or(a.created_at);
            let b_key = b.finished_at.unwrap_or(b.created_at);
            b_key.cmp(&a_key)
        });
        records.truncate(limit.max(1));
        Ok(records)
    }
}
