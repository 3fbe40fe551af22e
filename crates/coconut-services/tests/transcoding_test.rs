use async_trait::async_trait;
use bytes::Bytes;
use coconut_core::models::{
    default_output_path, BatchTranscodeRequest, JobStatus, OutputRequest, OutputStatus, TranscodeRequest, Volume,
    VolumeSet,
};
use coconut_core::{AppError, TranscodingEvents};
use coconut_db::{InMemoryTranscodeRepository, TranscodeRepository};
use coconut_services::{
    AdapterRegistry, JobPayload, LocalStorage, Notification, RemoteError, RemoteJob, Storage,
    TranscodingApi, TranscodingService,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const INPUT: &str = "https://cdn.example.com/videos/intro.mov";
const NOTIFY_URL: &str = "https://bridge.example.com/api/v1/notifications?token=t";

#[derive(Default)]
struct FakeApi {
    payloads: Mutex<Vec<JobPayload>>,
    failure: Mutex<Option<RemoteError>>,
    remote_status: Option<String>,
    counter: AtomicUsize,
}

impl FakeApi {
    fn with_status(status: &str) -> Self {
        Self {
            remote_status: Some(status.to_string()),
            ..Default::default()
        }
    }

    fn failing(err: RemoteError) -> Self {
        Self {
            failure: Mutex::new(Some(err)),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    fn last_payload(&self) -> JobPayload {
        self.payloads.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl TranscodingApi for FakeApi {
    async fn create_job(&self, payload: &JobPayload) -> Result<RemoteJob, RemoteError> {
        self.payloads.lock().unwrap().push(payload.clone());
        if let Some(err) = self.failure.lock().unwrap().take() {
            return Err(err);
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RemoteJob {
            id: format!("remote-{}", n),
            status: Some(
                self.remote_status
                    .clone()
                    .unwrap_or_else(|| "job.starting".to_string()),
            ),
            progress: Some("0%".to_string()),
        })
    }
}

struct Harness {
    service: TranscodingService,
    repo: Arc<InMemoryTranscodeRepository>,
    api: Arc<FakeApi>,
    storage: Arc<LocalStorage>,
    _dir: TempDir,
}

async fn harness_with(api: FakeApi, events: TranscodingEvents) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let volumes = VolumeSet::new(
        vec![
            Volume::new("local", "local")
                .with_root_url("https://bridge.example.com/files")
                .with_setting("base_path", dir.path().to_str().unwrap()),
            Volume::new("cloud", "s3")
                .with_setting("key_id", "AKIA")
                .with_setting("secret_key", "secret")
                .with_setting("bucket", "media")
                .with_setting("url", "https://media.example.com"),
        ],
        Some("local".to_string()),
    )
    .unwrap();

    let repo = Arc::new(InMemoryTranscodeRepository::new());
    let api = Arc::new(api);
    let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
    let service = TranscodingService::new(
        repo.clone(),
        api.clone(),
        volumes,
        AdapterRegistry::new("https://bridge.example.com"),
        NOTIFY_URL,
    )
    .with_events(Arc::new(events))
    .with_storage("local", storage.clone());

    Harness {
        service,
        repo,
        api,
        storage,
        _dir: dir,
    }
}

async fn harness() -> Harness {
    harness_with(FakeApi::default(), TranscodingEvents::new()).await
}

fn request(formats: &[&str]) -> TranscodeRequest {
    TranscodeRequest::new(
        INPUT,
        formats.iter().map(|f| OutputRequest::new(*f)).collect(),
    )
}

/// Default path of `format` for the test input.
fn path_of(format: &str) -> String {
    default_output_path(INPUT, format)
}

fn notification(value: Value) -> Notification {
    Notification::parse(value.to_string().as_bytes()).unwrap()
}

#[tokio::test]
async fn test_transcode_submits_job_with_upload_urls() {
    let h = harness().await;

    let outcome = h
        .service
        .transcode(&request(&["mp4:720p", "webm"]))
        .await
        .unwrap();

    let job = outcome.job.as_ref().unwrap();
    assert_eq!(job.remote_id.as_deref(), Some("remote-1"));
    assert_eq!(job.status, JobStatus::Starting);
    assert_eq!(outcome.outputs.len(), 2);
    assert_eq!(outcome.reused, 0);
    assert!(outcome
        .outputs
        .iter()
        .all(|o| o.status == OutputStatus::Pending && o.source == INPUT));

    let payload = h.api.last_payload();
    assert_eq!(payload.input.url, INPUT);
    assert_eq!(payload.notification.url, NOTIFY_URL);
    assert_eq!(
        payload.outputs["mp4:720p"]["url"],
        format!(
            "https://bridge.example.com/api/v1/uploads?volume=local&path={}",
            path_of("mp4:720p").replace('/', "%2F")
        )
    );
    assert!(payload.outputs.contains_key("webm"));

    let stored = h.repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.remote_id.as_deref(), Some("remote-1"));
}

#[tokio::test]
async fn test_resubmission_reuses_pending_and_ready_outputs() {
    let h = harness().await;
    h.service.transcode(&request(&["mp4:720p"])).await.unwrap();

    let again = h.service.transcode(&request(&["mp4:720p"])).await.unwrap();

    assert!(again.job.is_none());
    assert_eq!(again.reused, 1);
    assert_eq!(h.api.calls(), 1);
    assert_eq!(h.repo.job_count().await, 1);
}

#[tokio::test]
async fn test_resubmission_only_submits_missing_outputs() {
    let h = harness().await;
    h.service.transcode(&request(&["mp4:720p"])).await.unwrap();

    let outcome = h
        .service
        .transcode(&request(&["mp4:720p", "webm"]))
        .await
        .unwrap();

    assert_eq!(outcome.reused, 1);
    assert_eq!(outcome.outputs.len(), 2);
    let payload = h.api.last_payload();
    assert_eq!(payload.output_count(), 1);
    assert!(payload.outputs.contains_key("webm"));
}

#[tokio::test]
async fn test_errored_output_is_resubmitted() {
    let h = harness_with(
        FakeApi::failing(RemoteError::Unreachable("connection refused".to_string())),
        TranscodingEvents::new(),
    )
    .await;

    let err = h
        .service
        .transcode(&request(&["mp4:720p"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RemoteUnavailable(_)));

    let outcome = h.service.transcode(&request(&["mp4:720p"])).await.unwrap();
    assert!(outcome.job.is_some());
    assert_eq!(outcome.reused, 0);
    assert_eq!(h.repo.output_count().await, 1);
    assert_eq!(h.api.calls(), 2);
}

#[tokio::test]
async fn test_remote_rejection_marks_job_error() {
    let h = harness_with(
        FakeApi::failing(RemoteError::Rejected {
            status: 401,
            code: "authentication_failed".to_string(),
            message: "Invalid API key".to_string(),
        }),
        TranscodingEvents::new(),
    )
    .await;

    let err = h
        .service
        .transcode(&request(&["mp4:720p"]))
        .await
        .unwrap_err();
    match err {
        AppError::RemoteRejected { code, .. } => assert_eq!(code, "authentication_failed"),
        other => panic!("unexpected {:?}", other),
    }

    let outputs = h.service.outputs_for_source(INPUT).await.unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].status, OutputStatus::Errored);

    let job = h.service.get_job(outputs[0].job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error_code.as_deref(), Some("authentication_failed"));
    assert!(job.remote_id.is_none());
}

#[tokio::test]
async fn test_forbidden_params_fail_before_any_state() {
    let h = harness().await;
    let request = TranscodeRequest::new(
        INPUT,
        vec![OutputRequest::new("mp4").with_params(json!({"url": "x", "path": "y", "fps": 30}))],
    );

    let err = h.service.transcode(&request).await.unwrap_err();

    match err {
        AppError::InvalidInput(message) => {
            assert!(message.contains("url"));
            assert!(message.contains("path"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(h.repo.job_count().await, 0);
    assert_eq!(h.api.calls(), 0);
}

#[tokio::test]
async fn test_unknown_volume_and_bad_storage_rejected() {
    let h = harness().await;

    let unknown = TranscodeRequest::new(INPUT, vec![OutputRequest::new("mp4").with_volume("nope")]);
    assert!(matches!(
        h.service.transcode(&unknown).await,
        Err(AppError::InvalidInput(_))
    ));

    let list_storage =
        TranscodeRequest::new(INPUT, vec![OutputRequest::new("mp4").with_storage(json!(["a"]))]);
    assert!(matches!(
        h.service.transcode(&list_storage).await,
        Err(AppError::InvalidInput(_))
    ));

    let extra_key = TranscodeRequest::new(
        INPUT,
        vec![OutputRequest::new("mp4").with_storage(json!({"bucket": "other"}))],
    );
    assert!(matches!(
        h.service.transcode(&extra_key).await,
        Err(AppError::InvalidInput(_))
    ));

    let duplicate = request(&["mp4", "mp4"]);
    assert!(matches!(
        h.service.transcode(&duplicate).await,
        Err(AppError::InvalidInput(_))
    ));

    assert_eq!(h.repo.job_count().await, 0);
}

#[tokio::test]
async fn test_manual_storage_selects_volume_and_sub_path() {
    let h = harness().await;
    let request = TranscodeRequest::new(
        INPUT,
        vec![OutputRequest::new("mp4:720p")
            .with_storage(json!({"volume": "cloud", "sub_path": "/encoded/"}))],
    );

    let outcome = h.service.transcode(&request).await.unwrap();

    let output = &outcome.outputs[0];
    assert_eq!(output.volume(), "cloud");
    assert_eq!(output.path, format!("encoded/{}", path_of("mp4:720p")));
    assert_eq!(output.storage.sub_path.as_deref(), Some("encoded"));
    assert!(!output.storage.public);

    let payload = h.api.last_payload();
    assert_eq!(
        payload.outputs["mp4:720p"]["url"],
        format!(
            "s3://AKIA:secret@media/encoded/{}?x-amz-acl=private",
            path_of("mp4:720p")
        )
    );
}

#[tokio::test]
async fn test_processing_notification_keeps_remote_id() {
    let h = harness().await;
    let outcome = h.service.transcode(&request(&["mp4"])).await.unwrap();
    let job_id = outcome.job.unwrap().id;

    let result = h
        .service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "job.processing",
            "progress": "45%"
        })))
        .await
        .unwrap();

    assert!(result.applied);
    let job = h.service.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.progress, "45%");
    assert_eq!(job.remote_id.as_deref(), Some("remote-1"));
}

#[tokio::test]
async fn test_completion_reconciles_outputs_individually() {
    let h = harness().await;
    let outcome = h
        .service
        .transcode(&request(&["jpg:300x", "mp4:720p", "webm"]))
        .await
        .unwrap();
    let job_id = outcome.job.unwrap().id;

    h.service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "job.completed",
            "data": {"outputs": [
                {"key": "mp4:720p", "status": "video.encoded"},
                {"key": "jpg:300x", "status": "image.created"}
            ]}
        })))
        .await
        .unwrap();

    let job = h.service.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, "100%");
    assert!(job.completed_with_errors);

    let by_format = |format: &str| {
        job.outputs
            .iter()
            .find(|o| o.format == format)
            .cloned()
            .unwrap()
    };
    let mp4 = by_format("mp4:720p");
    assert_eq!(mp4.status, OutputStatus::Ready);
    assert_eq!(
        mp4.url.as_deref(),
        Some(format!("https://bridge.example.com/files/{}", path_of("mp4:720p")).as_str())
    );
    assert_eq!(by_format("jpg:300x").status, OutputStatus::Ready);
    let webm = by_format("webm");
    assert_eq!(webm.status, OutputStatus::Errored);
    assert!(webm.url.is_none());
}

#[tokio::test]
async fn test_reported_failure_marks_output_errored() {
    let h = harness().await;
    let outcome = h.service.transcode(&request(&["mp4", "webm"])).await.unwrap();
    let job_id = outcome.job.unwrap().id;

    h.service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "job.completed",
            "data": {"outputs": [
                {"key": "mp4", "status": "video.encoded"},
                {"key": "webm", "status": "video.failed", "error": "Unsupported codec"}
            ]}
        })))
        .await
        .unwrap();

    let job = h.service.get_job(job_id).await.unwrap();
    let webm = job.outputs.iter().find(|o| o.format == "webm").unwrap();
    assert_eq!(webm.status, OutputStatus::Errored);
    assert_eq!(webm.error.as_deref(), Some("Unsupported codec"));
}

#[tokio::test]
async fn test_output_events_settle_single_outputs() {
    let h = harness().await;
    let outcome = h.service.transcode(&request(&["mp4", "webm"])).await.unwrap();
    let job_id = outcome.job.unwrap().id;

    let result = h
        .service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "output.completed",
            "data": {"key": "mp4", "status": "video.encoded"}
        })))
        .await
        .unwrap();
    assert_eq!(result.updated_outputs, 1);

    let job = h.service.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    let mp4 = job.outputs.iter().find(|o| o.format == "mp4").unwrap();
    assert_eq!(mp4.status, OutputStatus::Ready);
    let webm = job.outputs.iter().find(|o| o.format == "webm").unwrap();
    assert_eq!(webm.status, OutputStatus::Pending);

    // The completion payload no longer needs to list the settled output.
    h.service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "job.completed",
            "data": {"outputs": [{"key": "webm", "status": "video.encoded"}]}
        })))
        .await
        .unwrap();
    let job = h.service.get_job(job_id).await.unwrap();
    assert!(!job.completed_with_errors);
}

#[tokio::test]
async fn test_job_failure_errors_pending_outputs() {
    let h = harness().await;
    let outcome = h.service.transcode(&request(&["mp4"])).await.unwrap();
    let job_id = outcome.job.unwrap().id;

    h.service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "job.failed",
            "data": {"error_code": "input_not_found", "message": "Input returned 404"}
        })))
        .await
        .unwrap();

    let job = h.service.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error_code.as_deref(), Some("input_not_found"));
    assert_eq!(job.outputs[0].status, OutputStatus::Errored);
    assert_eq!(job.outputs[0].error.as_deref(), Some("Input returned 404"));
}

#[tokio::test]
async fn test_bare_completion_event_reconciles_outputs() {
    let h = harness().await;
    let outcome = h.service.transcode(&request(&["mp4", "webm"])).await.unwrap();
    let job_id = outcome.job.unwrap().id;

    let result = h
        .service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "completed",
            "data": {"outputs": [{"key": "mp4"}]}
        })))
        .await
        .unwrap();
    assert!(result.applied);
    assert_eq!(result.updated_outputs, 2);

    let job = h.service.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_with_errors);
    let mp4 = job.outputs.iter().find(|o| o.format == "mp4").unwrap();
    assert_eq!(mp4.status, OutputStatus::Ready);
    let webm = job.outputs.iter().find(|o| o.format == "webm").unwrap();
    assert_eq!(webm.status, OutputStatus::Errored);
}

#[tokio::test]
async fn test_bare_failure_event_errors_pending_outputs() {
    let h = harness().await;
    let outcome = h.service.transcode(&request(&["mp4"])).await.unwrap();
    let job_id = outcome.job.unwrap().id;

    h.service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "failed"
        })))
        .await
        .unwrap();

    let job = h.service.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error_code.as_deref(), Some("job_failed"));
    assert_eq!(job.outputs[0].status, OutputStatus::Errored);
}

#[tokio::test]
async fn test_terminal_submission_status_waits_for_notification() {
    let h = harness_with(FakeApi::with_status("job.completed"), TranscodingEvents::new()).await;

    let outcome = h.service.transcode(&request(&["mp4", "webm"])).await.unwrap();

    let job = outcome.job.unwrap();
    assert_eq!(job.status, JobStatus::Starting);
    let stored = h.service.get_job(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Starting);
    assert!(stored
        .outputs
        .iter()
        .all(|o| o.status == OutputStatus::Pending));

    let result = h
        .service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "job.completed",
            "data": {"outputs": [
                {"key": "mp4", "status": "video.encoded"},
                {"key": "webm", "status": "video.encoded"}
            ]}
        })))
        .await
        .unwrap();
    assert!(result.applied);
    assert_eq!(result.updated_outputs, 2);

    let settled = h.service.get_job(job.id).await.unwrap();
    assert_eq!(settled.status, JobStatus::Completed);
    assert!(settled
        .outputs
        .iter()
        .all(|o| o.status == OutputStatus::Ready));
}

#[tokio::test]
async fn test_stale_notifications_are_ignored() {
    let h = harness().await;
    let outcome = h.service.transcode(&request(&["mp4"])).await.unwrap();
    let job_id = outcome.job.unwrap().id;

    h.service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "job.completed",
            "data": {"outputs": [{"key": "mp4", "status": "video.encoded"}]}
        })))
        .await
        .unwrap();

    let late = h
        .service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "job.processing",
            "progress": "50%"
        })))
        .await
        .unwrap();
    assert!(!late.applied);
    assert_eq!(late.status, JobStatus::Completed);

    let unknown = h
        .service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "account.updated"
        })))
        .await
        .unwrap();
    assert!(!unknown.applied);

    let job = h.service.get_job(job_id).await.unwrap();
    assert_eq!(job.progress, "100%");
}

#[tokio::test]
async fn test_notification_for_unknown_job() {
    let h = harness().await;
    let err = h
        .service
        .handle_notification(&notification(json!({
            "job_id": "missing",
            "event": "job.completed"
        })))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_cancel_veto_leaves_job_unchanged() {
    let mut events = TranscodingEvents::new();
    events
        .before_cancel_job
        .listen(|event| event.is_valid = false);
    let h = harness_with(FakeApi::default(), events).await;
    let outcome = h.service.transcode(&request(&["mp4"])).await.unwrap();
    let job_id = outcome.job.unwrap().id;

    let err = h.service.cancel_job(job_id).await.unwrap_err();

    assert!(matches!(err, AppError::Vetoed(_)));
    let job = h.service.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Starting);
    assert_eq!(job.outputs[0].status, OutputStatus::Pending);
}

#[tokio::test]
async fn test_cancel_marks_pending_outputs_errored() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let mut events = TranscodingEvents::new();
    let counter = cancelled.clone();
    events.after_cancel_job.listen(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let h = harness_with(FakeApi::default(), events).await;
    let outcome = h.service.transcode(&request(&["mp4"])).await.unwrap();
    let job_id = outcome.job.unwrap().id;

    let job = h.service.cancel_job(job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.outputs[0].status, OutputStatus::Errored);
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);

    let again = h.service.cancel_job(job_id).await.unwrap_err();
    assert!(matches!(again, AppError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_before_save_job_veto_stores_nothing() {
    let mut events = TranscodingEvents::new();
    events.before_save_job.listen(|event| event.is_valid = false);
    let h = harness_with(FakeApi::default(), events).await;

    let err = h.service.transcode(&request(&["mp4"])).await.unwrap_err();

    assert!(matches!(err, AppError::Vetoed(_)));
    assert_eq!(h.repo.job_count().await, 0);
    assert_eq!(h.api.calls(), 0);
}

#[tokio::test]
async fn test_before_save_job_listener_edits_are_stored() {
    let mut events = TranscodingEvents::new();
    events.before_save_job.listen(|event| {
        if event.is_new {
            event.job.message = Some("tagged".to_string());
        }
    });
    let h = harness_with(FakeApi::default(), events).await;

    let outcome = h.service.transcode(&request(&["mp4"])).await.unwrap();

    let job = h.service.get_job(outcome.job.unwrap().id).await.unwrap();
    assert_eq!(job.message.as_deref(), Some("tagged"));
}

#[tokio::test]
async fn test_upload_proxy_requires_pending_output() {
    let h = harness().await;
    h.service.transcode(&request(&["mp4:720p"])).await.unwrap();

    let output = h
        .service
        .accept_upload("local", &path_of("mp4:720p"), Bytes::from_static(b"video"))
        .await
        .unwrap();
    assert_eq!(output.format, "mp4:720p");
    assert_eq!(
        h.storage.download(&path_of("mp4:720p")).await.unwrap(),
        b"video".to_vec()
    );

    let err = h
        .service
        .accept_upload("local", "intro/other.mp4", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = h
        .service
        .accept_upload("local", "../escape.mp4", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_clear_outputs_removes_files_and_prunes_jobs() {
    let h = harness().await;
    h.service.transcode(&request(&["mp4"])).await.unwrap();
    h.service
        .accept_upload("local", &path_of("mp4"), Bytes::from_static(b"video"))
        .await
        .unwrap();
    h.service
        .handle_notification(&notification(json!({
            "job_id": "remote-1",
            "event": "job.completed",
            "data": {"outputs": [{"key": "mp4", "status": "video.encoded"}]}
        })))
        .await
        .unwrap();

    let report = h.service.clear_source_outputs(INPUT).await.unwrap();

    assert_eq!(report.deleted_outputs, 1);
    assert_eq!(report.removed_files, 1);
    assert_eq!(report.pruned_jobs, 1);
    assert!(!h.storage.exists(&path_of("mp4")).await.unwrap());
    assert_eq!(h.repo.job_count().await, 0);
    assert!(h.service.outputs_for_source(INPUT).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_same_named_sources_get_separate_files() {
    const OTHER: &str = "https://media.example.org/archive/intro.mov";
    let h = harness().await;
    h.service.transcode(&request(&["mp4"])).await.unwrap();
    h.service
        .transcode(&TranscodeRequest::new(OTHER, vec![OutputRequest::new("mp4")]))
        .await
        .unwrap();

    let first = h.service.outputs_for_source(INPUT).await.unwrap();
    let second = h.service.outputs_for_source(OTHER).await.unwrap();
    assert_ne!(first[0].path, second[0].path);

    h.service
        .accept_upload("local", &first[0].path, Bytes::from_static(b"first"))
        .await
        .unwrap();
    h.service
        .accept_upload("local", &second[0].path, Bytes::from_static(b"second"))
        .await
        .unwrap();
    for remote_id in ["remote-1", "remote-2"] {
        h.service
            .handle_notification(&notification(json!({
                "job_id": remote_id,
                "event": "job.completed",
                "data": {"outputs": [{"key": "mp4", "status": "video.encoded"}]}
            })))
            .await
            .unwrap();
    }

    let report = h.service.clear_source_outputs(INPUT).await.unwrap();

    assert_eq!(report.removed_files, 1);
    assert!(!h.storage.exists(&first[0].path).await.unwrap());
    assert_eq!(
        h.storage.download(&second[0].path).await.unwrap(),
        b"second".to_vec()
    );
}

#[tokio::test]
async fn test_batch_counts_failures_without_aborting() {
    let h = harness().await;
    h.service.transcode(&request(&["mp4"])).await.unwrap();

    let batch = BatchTranscodeRequest {
        items: vec![
            request(&["mp4"]),
            TranscodeRequest::new("https://cdn.example.com/b.mov", vec![OutputRequest::new("webm")]),
            TranscodeRequest::new(
                "https://cdn.example.com/c.mov",
                vec![OutputRequest::new("webm").with_volume("missing")],
            ),
        ],
    };

    let report = h.service.transcode_batch(&batch).await.unwrap();

    assert_eq!(report.submitted, 1);
    assert_eq!(report.reused, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors[0].index, 2);
}
