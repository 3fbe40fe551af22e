//! Transcoding job and output repositories

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use coconut_core::models::{Job, JobStatus, Output, OutputStatus, StorageDescriptor};

/// Result of persisting a new job with its outputs.
#[derive(Debug, Clone, Default)]
pub struct JobCreation {
    /// Outputs stored for the new job.
    pub inserted: Vec<Output>,
    /// Outputs that already existed for the same `(source, format)` and were kept.
    pub reused: Vec<Output>,
}

impl JobCreation {
    /// Whether the job row was stored. A job whose outputs all already exist is not.
    pub fn job_created(&self) -> bool {
        !self.inserted.is_empty()
    }
}

/// Persistence for jobs and outputs.
///
/// Outputs are unique per `(source, format)`. Errored outputs are replaced when a
/// new job requests the same pair; pending and ready outputs are reused.
#[async_trait]
pub trait TranscodeRepository: Send + Sync {
    /// Store `job` and `outputs` atomically.
    ///
    /// The job row is only kept when at least one output was inserted.
    async fn create_job(&self, job: &Job, outputs: &[Output]) -> Result<JobCreation>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>>;

    async fn find_job_by_remote_id(&self, remote_id: &str) -> Result<Option<Job>>;

    /// Set the remote id of a job that has none yet. Returns false if one was already set.
    async fn assign_remote_id(&self, job_id: Uuid, remote_id: &str) -> Result<bool>;

    /// Persist the mutable job fields (status, progress, error code, message).
    async fn save_job(&self, job: &Job) -> Result<()>;

    /// Persist a job update together with updates to its outputs in one transaction.
    async fn apply_transition(&self, job: &Job, outputs: &[Output]) -> Result<()>;

    async fn find_output(&self, source: &str, format: &str) -> Result<Option<Output>>;

    async fn outputs_by_source(&self, source: &str) -> Result<Vec<Output>>;

    async fn outputs_for_job(&self, job_id: Uuid) -> Result<Vec<Output>>;

    /// The pending output waiting for an upload at `path` on `volume`.
    async fn find_pending_output_at(&self, volume: &str, path: &str) -> Result<Option<Output>>;

    /// Delete every output of `source`, returning the deleted rows.
    async fn delete_outputs_by_source(&self, source: &str) -> Result<Vec<Output>>;

    /// Delete terminal jobs that no longer have outputs. Returns the number deleted.
    async fn prune_orphan_jobs(&self) -> Result<u64>;
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    remote_id: Option<String>,
    input: String,
    status: String,
    progress: String,
    error_code: Option<String>,
    message: Option<String>,
    storage_params: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            id: row.id,
            remote_id: row.remote_id,
            input: row.input,
            status: row.status.parse::<JobStatus>()?,
            progress: row.progress,
            error_code: row.error_code,
            message: row.message,
            storage_params: row.storage_params,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OutputRow {
    id: Uuid,
    job_id: Uuid,
    source: String,
    format: String,
    path: String,
    storage: serde_json::Value,
    url: Option<String>,
    status: String,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OutputRow> for Output {
    type Error = anyhow::Error;

    fn try_from(row: OutputRow) -> Result<Self> {
        let storage: StorageDescriptor = serde_json::from_value(row.storage)
            .with_context(|| format!("Invalid storage descriptor on output {}", row.id))?;
        Ok(Output {
            id: row.id,
            job_id: row.job_id,
            source: row.source,
            format: row.format,
            storage,
            path: row.path,
            url: row.url,
            status: row.status.parse::<OutputStatus>()?,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, remote_id, input, status, progress, error_code, message, \
     storage_params, created_at, updated_at";

const OUTPUT_COLUMNS: &str = "id, job_id, source, format, path, storage, url, status, error, \
     created_at, updated_at";

fn into_outputs(rows: Vec<OutputRow>) -> Result<Vec<Output>> {
    rows.into_iter().map(Output::try_from).collect()
}

#[derive(Clone)]
pub struct PgTranscodeRepository {
    pool: PgPool,
}

impl PgTranscodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn update_job(tx: &mut Transaction<'_, Postgres>, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transcode_jobs
            SET status = $2, progress = $3, error_code = $4, message = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.to_string())
        .bind(&job.progress)
        .bind(job.error_code.as_deref())
        .bind(job.message.as_deref())
        .bind(job.updated_at)
        .execute(&mut **tx)
        .await
        .context("Failed to update transcode job")?;
        Ok(())
    }

    async fn update_output(tx: &mut Transaction<'_, Postgres>, output: &Output) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transcode_outputs
            SET status = $2, url = $3, error = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(output.id)
        .bind(output.status.to_string())
        .bind(output.url.as_deref())
        .bind(output.error.as_deref())
        .bind(output.updated_at)
        .execute(&mut **tx)
        .await
        .context("Failed to update transcode output")?;
        Ok(())
    }
}

#[async_trait]
impl TranscodeRepository for PgTranscodeRepository {
    #[tracing::instrument(skip(self, job, outputs), fields(job_id = %job.id, outputs = outputs.len()))]
    async fn create_job(&self, job: &Job, outputs: &[Output]) -> Result<JobCreation> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin database transaction")?;

        sqlx::query(
            r#"
            INSERT INTO transcode_jobs (
                id, remote_id, input, status, progress, error_code, message,
                storage_params, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.id)
        .bind(job.remote_id.as_deref())
        .bind(&job.input)
        .bind(job.status.to_string())
        .bind(&job.progress)
        .bind(job.error_code.as_deref())
        .bind(job.message.as_deref())
        .bind(&job.storage_params)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to create transcode job")?;

        let mut creation = JobCreation::default();
        for output in outputs {
            sqlx::query(
                r#"
                DELETE FROM transcode_outputs
                WHERE source = $1 AND format = $2 AND status = 'errored'
                "#,
            )
            .bind(&output.source)
            .bind(&output.format)
            .execute(&mut *tx)
            .await
            .context("Failed to replace errored transcode output")?;

            let storage = serde_json::to_value(&output.storage)?;
            let inserted = sqlx::query_as::<Postgres, OutputRow>(&format!(
                r#"
                INSERT INTO transcode_outputs (
                    id, job_id, source, format, volume, path, storage, url, status, error,
                    created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (source, format) DO NOTHING
                RETURNING {}
                "#,
                OUTPUT_COLUMNS
            ))
            .bind(output.id)
            .bind(job.id)
            .bind(&output.source)
            .bind(&output.format)
            .bind(output.volume())
            .bind(&output.path)
            .bind(&storage)
            .bind(output.url.as_deref())
            .bind(output.status.to_string())
            .bind(output.error.as_deref())
            .bind(output.created_at)
            .bind(output.updated_at)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to create transcode output")?;

            match inserted {
                Some(row) => creation.inserted.push(Output::try_from(row)?),
                None => {
                    let existing = sqlx::query_as::<Postgres, OutputRow>(&format!(
                        "SELECT {} FROM transcode_outputs WHERE source = $1 AND format = $2",
                        OUTPUT_COLUMNS
                    ))
                    .bind(&output.source)
                    .bind(&output.format)
                    .fetch_one(&mut *tx)
                    .await
                    .context("Failed to load existing transcode output")?;
                    tracing::debug!(
                        source = %output.source,
                        format = %output.format,
                        "Output already exists, reusing"
                    );
                    creation.reused.push(Output::try_from(existing)?);
                }
            }
        }

        if creation.job_created() {
            tx.commit()
                .await
                .context("Failed to commit database transaction")?;
        } else {
            tx.rollback()
                .await
                .context("Failed to rollback database transaction")?;
        }

        Ok(creation)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<Postgres, JobRow>(&format!(
            "SELECT {} FROM transcode_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get transcode job")?;
        row.map(Job::try_from).transpose()
    }

    async fn find_job_by_remote_id(&self, remote_id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<Postgres, JobRow>(&format!(
            "SELECT {} FROM transcode_jobs WHERE remote_id = $1",
            JOB_COLUMNS
        ))
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find transcode job by remote id")?;
        row.map(Job::try_from).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn assign_remote_id(&self, job_id: Uuid, remote_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transcode_jobs
            SET remote_id = $2, updated_at = NOW()
            WHERE id = $1 AND remote_id IS NULL
            "#,
        )
        .bind(job_id)
        .bind(remote_id)
        .execute(&self.pool)
        .await
        .context("Failed to assign remote id")?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        self.apply_transition(job, &[]).await
    }

    #[tracing::instrument(skip(self, job, outputs), fields(job_id = %job.id, status = %job.status))]
    async fn apply_transition(&self, job: &Job, outputs: &[Output]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin database transaction")?;

        Self::update_job(&mut tx, job).await?;
        for output in outputs {
            Self::update_output(&mut tx, output).await?;
        }

        tx.commit()
            .await
            .context("Failed to commit database transaction")?;
        Ok(())
    }

    async fn find_output(&self, source: &str, format: &str) -> Result<Option<Output>> {
        let row = sqlx::query_as::<Postgres, OutputRow>(&format!(
            "SELECT {} FROM transcode_outputs WHERE source = $1 AND format = $2",
            OUTPUT_COLUMNS
        ))
        .bind(source)
        .bind(format)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find transcode output")?;
        row.map(Output::try_from).transpose()
    }

    async fn outputs_by_source(&self, source: &str) -> Result<Vec<Output>> {
        let rows = sqlx::query_as::<Postgres, OutputRow>(&format!(
            "SELECT {} FROM transcode_outputs WHERE source = $1 ORDER BY format ASC",
            OUTPUT_COLUMNS
        ))
        .bind(source)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transcode outputs by source")?;
        into_outputs(rows)
    }

    async fn outputs_for_job(&self, job_id: Uuid) -> Result<Vec<Output>> {
        let rows = sqlx::query_as::<Postgres, OutputRow>(&format!(
            "SELECT {} FROM transcode_outputs WHERE job_id = $1 ORDER BY format ASC",
            OUTPUT_COLUMNS
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transcode outputs for job")?;
        into_outputs(rows)
    }

    async fn find_pending_output_at(&self, volume: &str, path: &str) -> Result<Option<Output>> {
        let row = sqlx::query_as::<Postgres, OutputRow>(&format!(
            r#"
            SELECT {} FROM transcode_outputs
            WHERE volume = $1 AND path = $2 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            OUTPUT_COLUMNS
        ))
        .bind(volume)
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find pending transcode output")?;
        row.map(Output::try_from).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn delete_outputs_by_source(&self, source: &str) -> Result<Vec<Output>> {
        let rows = sqlx::query_as::<Postgres, OutputRow>(&format!(
            "DELETE FROM transcode_outputs WHERE source = $1 RETURNING {}",
            OUTPUT_COLUMNS
        ))
        .bind(source)
        .fetch_all(&self.pool)
        .await
        .context("Failed to delete transcode outputs")?;
        into_outputs(rows)
    }

    async fn prune_orphan_jobs(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM transcode_jobs j
            WHERE j.status IN ('completed', 'error', 'cancelled')
              AND NOT EXISTS (SELECT 1 FROM transcode_outputs o WHERE o.job_id = j.id)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to prune orphan transcode jobs")?;
        Ok(result.rows_affected())
    }
}
