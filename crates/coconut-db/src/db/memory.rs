//! In-memory repository
//!
//! Same semantics as the PostgreSQL repository, including the unique
//! `(source, format)` rule. Used when `DATABASE_URL` is not set and in tests.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use coconut_core::models::{Job, Output, OutputStatus};

use super::transcode::{JobCreation, TranscodeRepository};

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    outputs: HashMap<Uuid, Output>,
}

impl State {
    fn output_for(&self, source: &str, format: &str) -> Option<&Output> {
        self.outputs
            .values()
            .find(|o| o.source == source && o.format == format)
    }

    fn sorted(mut outputs: Vec<Output>) -> Vec<Output> {
        outputs.sort_by(|a, b| a.format.cmp(&b.format));
        outputs
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTranscodeRepository {
    state: Arc<RwLock<State>>,
}

impl InMemoryTranscodeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job_count(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn output_count(&self) -> usize {
        self.state.read().await.outputs.len()
    }
}

#[async_trait]
impl TranscodeRepository for InMemoryTranscodeRepository {
    async fn create_job(&self, job: &Job, outputs: &[Output]) -> Result<JobCreation> {
        let mut state = self.state.write().await;
        if state.jobs.contains_key(&job.id) {
            return Err(anyhow::anyhow!("Transcode job {} already exists", job.id));
        }

        let mut creation = JobCreation::default();
        let mut staged: Vec<Output> = Vec::new();
        let mut replaced: Vec<Uuid> = Vec::new();

        for output in outputs {
            let staged_conflict = staged
                .iter()
                .any(|o| o.source == output.source && o.format == output.format);
            match state.output_for(&output.source, &output.format) {
                Some(existing) if existing.status != OutputStatus::Errored => {
                    creation.reused.push(existing.clone());
                }
                _ if staged_conflict => {
                    if let Some(existing) = staged
                        .iter()
                        .find(|o| o.source == output.source && o.format == output.format)
                    {
                        creation.reused.push(existing.clone());
                    }
                }
                existing => {
                    if let Some(errored) = existing {
                        replaced.push(errored.id);
                    }
                    let mut output = output.clone();
                    output.job_id = job.id;
                    staged.push(output);
                }
            }
        }

        if staged.is_empty() {
            return Ok(creation);
        }

        for id in replaced {
            state.outputs.remove(&id);
        }
        state.jobs.insert(job.id, job.clone());
        for output in staged {
            state.outputs.insert(output.id, output.clone());
            creation.inserted.push(output);
        }

        Ok(creation)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.state.read().await.jobs.get(&id).cloned())
    }

    async fn find_job_by_remote_id(&self, remote_id: &str) -> Result<Option<Job>> {
        Ok(self
            .state
            .read()
            .await
            .jobs
            .values()
            .find(|j| j.remote_id.as_deref() == Some(remote_id))
            .cloned())
    }

    async fn assign_remote_id(&self, job_id: Uuid, remote_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        if state
            .jobs
            .values()
            .any(|j| j.id != job_id && j.remote_id.as_deref() == Some(remote_id))
        {
            return Err(anyhow::anyhow!(
                "Remote id {} is already assigned to another job",
                remote_id
            ));
        }
        match state.jobs.get_mut(&job_id) {
            Some(job) if job.remote_id.is_none() => {
                job.remote_id = Some(remote_id.to_string());
                job.updated_at = chrono::Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        self.apply_transition(job, &[]).await
    }

    async fn apply_transition(&self, job: &Job, outputs: &[Output]) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| anyhow::anyhow!("Transcode job {} not found", job.id))?;
        stored.status = job.status;
        stored.progress = job.progress.clone();
        stored.error_code = job.error_code.clone();
        stored.message = job.message.clone();
        stored.updated_at = job.updated_at;

        for output in outputs {
            if let Some(stored) = state.outputs.get_mut(&output.id) {
                stored.status = output.status;
                stored.url = output.url.clone();
                stored.error = output.error.clone();
                stored.updated_at = output.updated_at;
            }
        }
        Ok(())
    }

    async fn find_output(&self, source: &str, format: &str) -> Result<Option<Output>> {
        Ok(self.state.read().await.output_for(source, format).cloned())
    }

    async fn outputs_by_source(&self, source: &str) -> Result<Vec<Output>> {
        let state = self.state.read().await;
        Ok(State::sorted(
            state
                .outputs
                .values()
                .filter(|o| o.source == source)
                .cloned()
                .collect(),
        ))
    }

    async fn outputs_for_job(&self, job_id: Uuid) -> Result<Vec<Output>> {
        let state = self.state.read().await;
        Ok(State::sorted(
            state
                .outputs
                .values()
                .filter(|o| o.job_id == job_id)
                .cloned()
                .collect(),
        ))
    }

    async fn find_pending_output_at(&self, volume: &str, path: &str) -> Result<Option<Output>> {
        let state = self.state.read().await;
        Ok(state
            .outputs
            .values()
            .filter(|o| {
                o.volume() == volume && o.path == path && o.status == OutputStatus::Pending
            })
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn delete_outputs_by_source(&self, source: &str) -> Result<Vec<Output>> {
        let mut state = self.state.write().await;
        let ids: Vec<Uuid> = state
            .outputs
            .values()
            .filter(|o| o.source == source)
            .map(|o| o.id)
            .collect();
        let deleted = ids
            .iter()
            .filter_map(|id| state.outputs.remove(id))
            .collect();
        Ok(State::sorted(deleted))
    }

    async fn prune_orphan_jobs(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        let orphans: Vec<Uuid> = state
            .jobs
            .values()
            .filter(|j| j.is_terminal())
            .filter(|j| !state.outputs.values().any(|o| o.job_id == j.id))
            .map(|j| j.id)
            .collect();
        for id in &orphans {
            state.jobs.remove(id);
        }
        Ok(orphans.len() as u64)
    }
}
