use bytes::Bytes;
use coconut_core::events::{CancelJobEvent, JobEvent, OutputEvent, UploadEvent};
use coconut_core::models::{
    default_output_path, BatchTranscodeRequest, Job, JobResponse, JobStatus, Output,
    OutputRequest, OutputStatus, StorageDescriptor, TranscodeRequest, VolumeSet,
};
use coconut_core::{AppError, AssociativeValidator, TranscodingEvents};
use coconut_db::TranscodeRepository;
use coconut_storage::keys::{join_key, normalize_key};
use coconut_storage::{AdapterRegistry, Storage};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::outcome::{
    BatchItemError, BatchReport, ClearReport, NotificationOutcome, TranscodeOutcome,
};
use crate::coconut::{JobPayload, Notification, NotificationKind, RemoteOutput, TranscodingApi};

/// Keys reserved for the output location, never accepted in output params.
const FORBIDDEN_OUTPUT_PARAMS: [&str; 3] = ["url", "path", "key"];
/// Keys accepted in manual storage settings.
const MANUAL_STORAGE_KEYS: [&str; 2] = ["volume", "sub_path"];

/// An output that passed validation and is ready to be submitted.
struct PlannedOutput {
    format: String,
    path: String,
    descriptor: StorageDescriptor,
    upload_url: String,
    params: Option<Map<String, Value>>,
}

/// Orchestrates the transcoding job lifecycle: submission to the remote
/// service, notification handling, cancellation and output clearing.
pub struct TranscodingService {
    repository: Arc<dyn TranscodeRepository>,
    api: Arc<dyn TranscodingApi>,
    volumes: VolumeSet,
    adapters: AdapterRegistry,
    storages: HashMap<String, Arc<dyn Storage>>,
    events: Arc<TranscodingEvents>,
    notification_url: String,
}

impl TranscodingService {
    pub fn new(
        repository: Arc<dyn TranscodeRepository>,
        api: Arc<dyn TranscodingApi>,
        volumes: VolumeSet,
        adapters: AdapterRegistry,
        notification_url: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            api,
            volumes,
            adapters,
            storages: HashMap::new(),
            events: Arc::new(TranscodingEvents::new()),
            notification_url: notification_url.into(),
        }
    }

    pub fn with_events(mut self, events: Arc<TranscodingEvents>) -> Self {
        self.events = events;
        self
    }

    /// Attach the byte storage used for proxy uploads and file removal on a volume.
    pub fn with_storage(mut self, volume: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        self.storages.insert(volume.into(), storage);
        self
    }

    pub fn volumes(&self) -> &VolumeSet {
        &self.volumes
    }

    pub fn events(&self) -> &TranscodingEvents {
        &self.events
    }

    /// Submit `request`, reusing outputs that already exist for the same
    /// `(source, format)`.
    ///
    /// Validation and volume resolution happen before anything is stored. Once the
    /// job is stored, a remote failure marks it `error` and is returned to the caller.
    #[tracing::instrument(skip(self, request), fields(input = %request.input, outputs = request.outputs.len()))]
    pub async fn transcode(&self, request: &TranscodeRequest) -> Result<TranscodeOutcome, AppError> {
        request.validate()?;
        let source = request.source().to_string();

        let mut formats = HashSet::new();
        let mut plans = Vec::with_capacity(request.outputs.len());
        for output_request in &request.outputs {
            if !formats.insert(output_request.format.as_str()) {
                return Err(AppError::InvalidInput(format!(
                    "Format '{}' is requested more than once",
                    output_request.format
                )));
            }
            plans.push(self.plan_output(&source, output_request)?);
        }

        let mut reused = Vec::new();
        let mut fresh = Vec::new();
        for plan in plans {
            match self.repository.find_output(&source, &plan.format).await? {
                Some(existing) if existing.is_reusable() => {
                    tracing::debug!(
                        source = %source,
                        format = %plan.format,
                        status = %existing.status,
                        "Reusing existing output"
                    );
                    reused.push(existing);
                }
                _ => fresh.push(plan),
            }
        }

        if fresh.is_empty() {
            tracing::info!(source = %source, reused = reused.len(), "All outputs already exist");
            return Ok(TranscodeOutcome {
                job: None,
                reused: reused.len(),
                outputs: reused,
            });
        }

        let storage_params = Value::Array(
            fresh
                .iter()
                .map(|plan| {
                    serde_json::json!({
                        "format": plan.format,
                        "path": plan.path,
                        "storage": plan.descriptor,
                    })
                })
                .collect(),
        );
        let mut job_event = JobEvent::new(Job::new(&request.input, storage_params), true);
        if !self.events.before_save_job.trigger_cancellable(&mut job_event) {
            return Err(AppError::Vetoed(format!(
                "Saving the job for {} was vetoed",
                request.input
            )));
        }
        let mut job = job_event.job;

        let mut outputs = Vec::with_capacity(fresh.len());
        for plan in &fresh {
            let output = Output::new(
                job.id,
                &source,
                &plan.format,
                plan.descriptor.clone(),
                &plan.path,
            );
            let mut event = OutputEvent::new(output, true);
            if self.events.before_save_output.trigger_cancellable(&mut event) {
                outputs.push(event.output);
            } else {
                tracing::debug!(format = %plan.format, "Output vetoed by listener");
            }
        }
        if outputs.is_empty() {
            return Err(AppError::Vetoed(format!(
                "Every output for {} was vetoed",
                request.input
            )));
        }

        let creation = self.repository.create_job(&job, &outputs).await?;
        reused.extend(creation.reused.iter().cloned());
        if !creation.job_created() {
            tracing::info!(source = %source, "Outputs were created concurrently, reusing them");
            return Ok(TranscodeOutcome {
                job: None,
                reused: reused.len(),
                outputs: reused,
            });
        }

        let mut inserted = creation.inserted;
        self.events.after_save_job.trigger(&mut JobEvent::new(job.clone(), true));
        for output in &inserted {
            self.events
                .after_save_output
                .trigger(&mut OutputEvent::new(output.clone(), true));
        }

        let mut payload = JobPayload::new(&job.input, &self.notification_url);
        for output in &inserted {
            if let Some(plan) = fresh.iter().find(|plan| plan.format == output.format) {
                payload.add_output(&plan.format, &plan.upload_url, plan.params.as_ref());
            }
        }

        match self.api.create_job(&payload).await {
            Ok(remote) => {
                job.assign_remote_id(&remote.id)?;
                if !self.repository.assign_remote_id(job.id, &remote.id).await? {
                    return Err(AppError::Conflict(format!(
                        "Job {} already has a remote id",
                        job.id
                    )));
                }

                // Outputs settle only on terminal notifications.
                match remote.status.as_deref().and_then(JobStatus::from_remote) {
                    Some(status) if status.is_terminal() => {
                        tracing::debug!(
                            remote_id = %remote.id,
                            status = %status,
                            "Ignoring terminal status in submission response"
                        );
                    }
                    Some(status) if status != job.status && job.status.can_transition_to(status) => {
                        job.transition_to(status)?;
                    }
                    _ => {}
                }
                if let Some(progress) = remote.progress.as_deref() {
                    job.set_progress(progress);
                }
                self.repository.save_job(&job).await?;

                tracing::info!(
                    job_id = %job.id,
                    remote_id = %remote.id,
                    outputs = inserted.len(),
                    reused = reused.len(),
                    "Transcoding job submitted"
                );
            }
            Err(err) => {
                let message = err.message();
                job.fail(err.error_code(), Some(message.clone()))?;
                for output in &mut inserted {
                    output.mark_errored(format!("Submission failed: {}", message));
                }
                self.repository.apply_transition(&job, &inserted).await?;
                self.events.after_save_job.trigger(&mut JobEvent::new(job.clone(), false));

                tracing::warn!(
                    job_id = %job.id,
                    error_code = %err.error_code(),
                    error = %err,
                    "Transcoding job submission failed"
                );
                return Err(err.into());
            }
        }

        let reused_count = reused.len();
        let mut all_outputs = inserted.clone();
        all_outputs.extend(reused);
        Ok(TranscodeOutcome {
            job: Some(JobResponse::new(job, inserted)),
            reused: reused_count,
            outputs: all_outputs,
        })
    }

    /// Submit each item in turn. Failures are counted and logged, never fatal.
    #[tracing::instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn transcode_batch(
        &self,
        request: &BatchTranscodeRequest,
    ) -> Result<BatchReport, AppError> {
        request.validate()?;

        let mut report = BatchReport::default();
        for (index, item) in request.items.iter().enumerate() {
            match self.transcode(item).await {
                Ok(outcome) => {
                    if outcome.submitted() {
                        report.submitted += 1;
                    }
                    report.reused += outcome.reused;
                }
                Err(e) => {
                    tracing::warn!(
                        index,
                        input = %item.input,
                        error = %e,
                        "Batch item failed"
                    );
                    report.failed += 1;
                    report.errors.push(BatchItemError {
                        index,
                        input: item.input.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            submitted = report.submitted,
            reused = report.reused,
            failed = report.failed,
            "Batch transcoding finished"
        );
        Ok(report)
    }

    /// Apply a notification from the transcoding service.
    ///
    /// Events that no longer apply (stale or out-of-order, unknown kinds) are
    /// acknowledged without changing anything.
    #[tracing::instrument(skip(self, notification), fields(remote_id = %notification.job_id, event = %notification.event))]
    pub async fn handle_notification(
        &self,
        notification: &Notification,
    ) -> Result<NotificationOutcome, AppError> {
        let mut job = self
            .repository
            .find_job_by_remote_id(&notification.job_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No job with remote id {}", notification.job_id))
            })?;

        let kind = notification.kind();
        if let NotificationKind::Unknown(event) = &kind {
            return Ok(ignored(&job, notification, format!("Unhandled event {}", event)));
        }
        if job.is_terminal() {
            return Ok(ignored(
                &job,
                notification,
                format!("Job is already {}", job.status),
            ));
        }

        let mut outputs = self.repository.outputs_for_job(job.id).await?;
        let mut changed: Vec<usize> = Vec::new();

        match kind {
            NotificationKind::StatusChanged(JobStatus::Cancelled) => {
                job.transition_to(JobStatus::Cancelled)?;
                changed = error_pending(&mut outputs, "Job cancelled by the transcoding service");
            }
            NotificationKind::StatusChanged(status) => {
                if status != job.status {
                    if !job.status.can_transition_to(status) {
                        return Ok(ignored(
                            &job,
                            notification,
                            format!("Cannot move from {} to {}", job.status, status),
                        ));
                    }
                    job.transition_to(status)?;
                }
            }
            NotificationKind::JobCompleted => {
                job.transition_to(JobStatus::Completed)?;
                changed = self.reconcile(&mut outputs, &notification.outputs());
            }
            NotificationKind::JobFailed => {
                let message = notification.error_message();
                job.fail(notification.error_code(), message.clone())?;
                changed = error_pending(
                    &mut outputs,
                    &message.unwrap_or_else(|| "Job failed".to_string()),
                );
            }
            NotificationKind::OutputCompleted | NotificationKind::OutputFailed => {
                let failed = kind == NotificationKind::OutputFailed;
                for remote in notification.outputs() {
                    if let Some(index) = self.settle_output(&mut outputs, &remote, failed) {
                        changed.push(index);
                    }
                }
                if job.status == JobStatus::Starting {
                    job.transition_to(JobStatus::Processing)?;
                }
            }
            NotificationKind::Unknown(_) => {}
        }

        if job.status != JobStatus::Completed {
            if let Some(progress) = notification.progress() {
                job.set_progress(&progress);
            }
        }

        let changed_outputs: Vec<Output> = changed.iter().map(|&i| outputs[i].clone()).collect();
        self.repository
            .apply_transition(&job, &changed_outputs)
            .await?;

        self.events.after_save_job.trigger(&mut JobEvent::new(job.clone(), false));
        for output in &changed_outputs {
            self.events
                .after_save_output
                .trigger(&mut OutputEvent::new(output.clone(), false));
        }

        tracing::info!(
            job_id = %job.id,
            status = %job.status,
            progress = %job.progress,
            updated_outputs = changed_outputs.len(),
            "Notification applied"
        );

        Ok(NotificationOutcome {
            job_id: job.id,
            remote_id: notification.job_id.clone(),
            event: notification.event.clone(),
            status: job.status,
            applied: true,
            reason: None,
            updated_outputs: changed_outputs.len(),
        })
    }

    /// Cancel a job that has not finished yet. Listeners may veto.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<JobResponse, AppError> {
        let mut job = self
            .repository
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

        if job.is_terminal() {
            return Err(AppError::InvalidTransition {
                from: job.status,
                to: JobStatus::Cancelled,
            });
        }

        let mut event = CancelJobEvent::new(job.clone());
        if !self.events.before_cancel_job.trigger_cancellable(&mut event) {
            tracing::info!(job_id = %job_id, "Cancellation vetoed by listener");
            return Err(AppError::Vetoed(format!(
                "Cancellation of job {} was vetoed",
                job_id
            )));
        }

        job.transition_to(JobStatus::Cancelled)?;
        let mut outputs = self.repository.outputs_for_job(job.id).await?;
        let changed = error_pending(&mut outputs, "Job cancelled");
        let changed_outputs: Vec<Output> = changed.iter().map(|&i| outputs[i].clone()).collect();
        self.repository
            .apply_transition(&job, &changed_outputs)
            .await?;

        self.events
            .after_cancel_job
            .trigger(&mut CancelJobEvent::new(job.clone()));

        tracing::info!(job_id = %job_id, cancelled_outputs = changed_outputs.len(), "Job cancelled");
        Ok(JobResponse::new(job, outputs))
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<JobResponse, AppError> {
        let job = self
            .repository
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;
        let outputs = self.repository.outputs_for_job(job_id).await?;
        Ok(JobResponse::new(job, outputs))
    }

    pub async fn outputs_for_source(&self, source: &str) -> Result<Vec<Output>, AppError> {
        Ok(self.repository.outputs_by_source(source).await?)
    }

    /// Delete every output of `source`, remove their files where possible and
    /// prune finished jobs left without outputs.
    #[tracing::instrument(skip(self))]
    pub async fn clear_source_outputs(&self, source: &str) -> Result<ClearReport, AppError> {
        let deleted = self.repository.delete_outputs_by_source(source).await?;

        let mut removed_files = 0;
        for output in deleted.iter().filter(|o| o.status == OutputStatus::Ready) {
            let Some(storage) = self.storages.get(output.volume()) else {
                tracing::debug!(volume = %output.volume(), path = %output.path, "No storage for volume, file left in place");
                continue;
            };
            match storage.delete(&output.path).await {
                Ok(()) => removed_files += 1,
                Err(e) => tracing::warn!(
                    error = %e,
                    volume = %output.volume(),
                    path = %output.path,
                    "Failed to delete output file"
                ),
            }
        }

        let pruned_jobs = self.repository.prune_orphan_jobs().await?;

        tracing::info!(
            source = %source,
            deleted_outputs = deleted.len(),
            removed_files,
            pruned_jobs,
            "Cleared source outputs"
        );

        Ok(ClearReport {
            deleted_outputs: deleted.len(),
            removed_files,
            pruned_jobs,
        })
    }

    /// Store a file delivered by the transcoding service through the upload proxy.
    ///
    /// Only accepted when a pending output expects a file at that location.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn accept_upload(
        &self,
        volume: &str,
        path: &str,
        data: Bytes,
    ) -> Result<Output, AppError> {
        let path = normalize_key(path)?;
        if self.volumes.get(volume).is_none() {
            return Err(AppError::NotFound(format!("Unknown volume: {}", volume)));
        }

        let output = self
            .repository
            .find_pending_output_at(volume, &path)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No pending output at {}:{}", volume, path))
            })?;

        let storage = self.storages.get(volume).ok_or_else(|| {
            AppError::Configuration(format!("Volume '{}' does not accept uploads", volume))
        })?;

        let mut event = UploadEvent::new(volume, &path, data.len());
        if !self.events.before_upload.trigger_cancellable(&mut event) {
            return Err(AppError::Vetoed(format!(
                "Upload to {}:{} was vetoed",
                volume, path
            )));
        }

        storage.put(&path, data).await?;
        self.events.after_upload.trigger(&mut event);

        tracing::info!(
            output_id = %output.id,
            volume = %volume,
            path = %path,
            "Stored proxied upload"
        );
        Ok(output)
    }

    /// Validate one output request and resolve where its file goes.
    fn plan_output(&self, source: &str, request: &OutputRequest) -> Result<PlannedOutput, AppError> {
        let params = match &request.params {
            Some(params) => {
                AssociativeValidator::new()
                    .forbidden_keys(FORBIDDEN_OUTPUT_PARAMS)
                    .check_all_keys(true)
                    .validate("params", params)?;
                params.as_object().cloned()
            }
            None => None,
        };

        let (storage_volume, sub_path) = match &request.storage {
            Some(storage) => manual_storage(storage)?,
            None => (None, None),
        };

        let volume_handle = request.volume.as_deref().or(storage_volume.as_deref());
        let volume = self.volumes.resolve(volume_handle)?;
        let adapter = self.adapters.adapter_for(volume)?;

        let relative = match &request.path {
            Some(path) => path.clone(),
            None => default_output_path(source, &request.format),
        };
        let path = normalize_key(&join_key(sub_path.as_deref(), &normalize_key(&relative)?))?;
        let upload_url = adapter.upload_url(&path)?;

        Ok(PlannedOutput {
            format: request.format.clone(),
            descriptor: StorageDescriptor::for_volume(volume, sub_path),
            path,
            upload_url,
            params,
        })
    }

    /// Settle pending outputs from a completion payload. Returns changed indices.
    fn reconcile(&self, outputs: &mut [Output], reported: &[RemoteOutput]) -> Vec<usize> {
        let mut changed = Vec::new();
        for (index, output) in outputs.iter_mut().enumerate() {
            if output.status != OutputStatus::Pending {
                continue;
            }
            match reported
                .iter()
                .find(|remote| remote.format_key() == Some(output.format.as_str()))
            {
                Some(remote) if !remote.is_failed() => self.mark_output_ready(output),
                Some(remote) => output.mark_errored(failure_reason(remote)),
                None => output.mark_errored("Output missing from completion notification"),
            }
            changed.push(index);
        }
        changed
    }

    fn settle_output(
        &self,
        outputs: &mut [Output],
        remote: &RemoteOutput,
        failed: bool,
    ) -> Option<usize> {
        let format = remote.format_key()?;
        let index = outputs
            .iter()
            .position(|o| o.format == format && o.status == OutputStatus::Pending)?;
        let output = &mut outputs[index];
        if failed || remote.is_failed() {
            output.mark_errored(failure_reason(remote));
        } else {
            self.mark_output_ready(output);
        }
        Some(index)
    }

    fn mark_output_ready(&self, output: &mut Output) {
        let public_url = self
            .volumes
            .get(output.volume())
            .ok_or_else(|| format!("Volume '{}' is no longer configured", output.volume()))
            .and_then(|volume| self.adapters.adapter_for(volume).map_err(|e| e.to_string()))
            .and_then(|adapter| adapter.public_url(&output.path).map_err(|e| e.to_string()));

        match public_url {
            Ok(url) => output.mark_ready(url),
            Err(reason) => {
                tracing::warn!(output_id = %output.id, reason = %reason, "Cannot resolve public URL");
                output.mark_errored(reason);
            }
        }
    }
}

fn ignored(job: &Job, notification: &Notification, reason: String) -> NotificationOutcome {
    tracing::debug!(job_id = %job.id, reason = %reason, "Notification ignored");
    NotificationOutcome {
        job_id: job.id,
        remote_id: notification.job_id.clone(),
        event: notification.event.clone(),
        status: job.status,
        applied: false,
        reason: Some(reason),
        updated_outputs: 0,
    }
}

fn error_pending(outputs: &mut [Output], reason: &str) -> Vec<usize> {
    outputs
        .iter_mut()
        .enumerate()
        .filter(|(_, output)| output.status == OutputStatus::Pending)
        .map(|(index, output)| {
            output.mark_errored(reason);
            index
        })
        .collect()
}

fn failure_reason(remote: &RemoteOutput) -> String {
    match (&remote.error, &remote.status) {
        (Some(error), _) => error.clone(),
        (None, Some(status)) => format!("Transcoding failed ({})", status),
        (None, None) => "Transcoding failed".to_string(),
    }
}

/// Parse manual storage settings into `(volume, sub_path)`.
fn manual_storage(storage: &Value) -> Result<(Option<String>, Option<String>), AppError> {
    AssociativeValidator::new()
        .allowed_keys(MANUAL_STORAGE_KEYS)
        .check_all_keys(true)
        .validate("storage", storage)?;

    let text = |key: &str| -> Result<Option<String>, AppError> {
        match storage.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(_) => Err(AppError::InvalidInput(format!(
                "storage.{} must be a string",
                key
            ))),
        }
    };

    let sub_path = match text("sub_path")? {
        Some(sub_path) => Some(normalize_key(&sub_path)?),
        None => None,
    };
    Ok((text("volume")?, sub_path))
}
