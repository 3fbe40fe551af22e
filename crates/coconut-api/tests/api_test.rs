mod helpers;

use axum::http::StatusCode;
use bytes::Bytes;
use coconut_services::RemoteError;
use coconut_storage::upload_token;
use helpers::{spawn_app, spawn_app_with, FakeApi, INPUT, TOKEN};
use serde_json::{json, Value};

fn transcode_body(formats: &[&str]) -> Value {
    json!({
        "input": INPUT,
        "outputs": formats.iter().map(|f| json!({"format": f})).collect::<Vec<_>>()
    })
}

fn upload_token_for(path: &str) -> String {
    upload_token::sign(TOKEN, "local", path).unwrap()
}

fn output_path(body: &Value, format: &str) -> String {
    body["outputs"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["format"] == format)
        .and_then(|o| o["path"].as_str())
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;

    let response = app.server.get("/api/v1/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "in_memory");
    assert_eq!(body["volumes"], 1);
    assert_eq!(body["default_volume"], "local");
}

#[tokio::test]
async fn test_transcode_creates_job() {
    let app = spawn_app().await;

    let response = app
        .server
        .post("/api/v1/transcode")
        .json(&transcode_body(&["mp4:720p", "webm"]))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["job"]["remote_id"], "remote-1");
    assert_eq!(body["job"]["status"], "starting");
    assert_eq!(body["outputs"].as_array().unwrap().len(), 2);
    assert_eq!(body["reused"], 0);

    let payload = app.api.last_payload();
    assert_eq!(payload.input.url, INPUT);
    assert_eq!(
        payload.notification.url,
        format!("https://bridge.example.com/api/v1/notifications?token={}", TOKEN)
    );
    assert_eq!(payload.output_count(), 2);
}

#[tokio::test]
async fn test_repeated_transcode_reuses_outputs() {
    let app = spawn_app().await;

    app.server
        .post("/api/v1/transcode")
        .json(&transcode_body(&["mp4:720p"]))
        .await
        .assert_status(StatusCode::CREATED);

    let response = app
        .server
        .post("/api/v1/transcode")
        .json(&transcode_body(&["mp4:720p"]))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert!(body["job"].is_null());
    assert_eq!(body["reused"], 1);
    assert_eq!(app.api.calls(), 1);
}

#[tokio::test]
async fn test_transcode_rejects_invalid_requests() {
    let app = spawn_app().await;

    let malformed = app
        .server
        .post("/api/v1/transcode")
        .json(&json!({"input": INPUT}))
        .await;
    assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);

    let bad_url = app
        .server
        .post("/api/v1/transcode")
        .json(&json!({"input": "not a url", "outputs": [{"format": "mp4"}]}))
        .await;
    assert_eq!(bad_url.status_code(), StatusCode::BAD_REQUEST);

    let forbidden = app
        .server
        .post("/api/v1/transcode")
        .json(&json!({
            "input": INPUT,
            "outputs": [{"format": "mp4", "params": {"url": "s3://elsewhere"}}]
        }))
        .await;
    assert_eq!(forbidden.status_code(), StatusCode::BAD_REQUEST);

    let unknown_volume = app
        .server
        .post("/api/v1/transcode")
        .json(&json!({"input": INPUT, "outputs": [{"format": "mp4", "volume": "nope"}]}))
        .await;
    assert_eq!(unknown_volume.status_code(), StatusCode::BAD_REQUEST);

    assert_eq!(app.api.calls(), 0);
}

#[tokio::test]
async fn test_remote_failures_map_to_statuses() {
    let rejected = spawn_app_with(FakeApi::failing(RemoteError::Rejected {
        status: 401,
        code: "authentication_failed".to_string(),
        message: "Invalid API key".to_string(),
    }))
    .await;
    let response = rejected
        .server
        .post("/api/v1/transcode")
        .json(&transcode_body(&["mp4"]))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let unavailable =
        spawn_app_with(FakeApi::failing(RemoteError::Unreachable("timeout".to_string()))).await;
    let response = unavailable
        .server
        .post("/api/v1/transcode")
        .json(&transcode_body(&["mp4"]))
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);

    // The failed submission leaves errored outputs behind, which a retry resubmits.
    let outputs = unavailable
        .server
        .get("/api/v1/outputs")
        .add_query_param("source", INPUT)
        .await;
    let body: Value = outputs.json();
    assert_eq!(body["outputs"][0]["status"], "errored");

    unavailable
        .server
        .post("/api/v1/transcode")
        .json(&transcode_body(&["mp4"]))
        .await
        .assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn test_notification_requires_token() {
    let app = spawn_app().await;
    let notification = json!({"job_id": "remote-1", "event": "job.completed"});

    let missing = app
        .server
        .post("/api/v1/notifications")
        .json(&notification)
        .await;
    assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .server
        .post("/api/v1/notifications")
        .add_query_param("token", "guess")
        .json(&notification)
        .await;
    assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_notification_errors() {
    let app = spawn_app().await;

    let malformed = app
        .server
        .post("/api/v1/notifications")
        .add_query_param("token", TOKEN)
        .text("{not json")
        .await;
    assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);

    let unknown = app
        .server
        .post("/api/v1/notifications")
        .add_query_param("token", TOKEN)
        .json(&json!({"job_id": "remote-404", "event": "job.completed"}))
        .await;
    assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_full_job_lifecycle() {
    let app = spawn_app().await;

    let created: Value = app
        .server
        .post("/api/v1/transcode")
        .json(&transcode_body(&["mp4:720p", "webm"]))
        .await
        .json();
    let job_id = created["job"]["id"].as_str().unwrap().to_string();
    let mp4_path = output_path(&created, "mp4:720p");

    // Coconut pushes the encoded file through the upload proxy.
    let upload = app
        .server
        .put("/api/v1/uploads")
        .add_query_param("volume", "local")
        .add_query_param("path", &mp4_path)
        .add_query_param("token", upload_token_for(&mp4_path))
        .bytes(Bytes::from_static(b"encoded video"))
        .await;
    assert_eq!(upload.status_code(), StatusCode::CREATED);
    let uploaded: Value = upload.json();
    assert_eq!(uploaded["format"], "mp4:720p");
    assert_eq!(uploaded["status"], "pending");

    let progress = app
        .server
        .post("/api/v1/notifications")
        .add_query_param("token", TOKEN)
        .json(&json!({"job_id": "remote-1", "event": "job.processing", "progress": "40%"}))
        .await;
    assert_eq!(progress.status_code(), StatusCode::OK);
    let progress: Value = progress.json();
    assert_eq!(progress["applied"], true);
    assert_eq!(progress["status"], "processing");

    let completed = app
        .server
        .post("/api/v1/notifications")
        .add_query_param("token", TOKEN)
        .json(&json!({
            "job_id": "remote-1",
            "event": "job.completed",
            "data": {"outputs": [
                {"key": "mp4:720p", "status": "video.encoded"},
                {"key": "webm", "status": "video.failed", "error": "codec error"}
            ]}
        }))
        .await;
    assert_eq!(completed.status_code(), StatusCode::OK);
    let completed: Value = completed.json();
    assert_eq!(completed["status"], "completed");
    assert_eq!(completed["updated_outputs"], 2);

    let job: Value = app
        .server
        .get(&format!("/api/v1/jobs/{}", job_id))
        .await
        .json();
    assert_eq!(job["status"], "completed");
    assert_eq!(job["progress"], "100%");
    assert_eq!(job["completed_with_errors"], true);

    let outputs = job["outputs"].as_array().unwrap();
    let mp4 = outputs.iter().find(|o| o["format"] == "mp4:720p").unwrap();
    assert_eq!(mp4["status"], "ready");
    assert_eq!(
        mp4["url"],
        format!("https://bridge.example.com/files/{}", mp4_path)
    );
    let webm = outputs.iter().find(|o| o["format"] == "webm").unwrap();
    assert_eq!(webm["status"], "errored");

    // Local volume files are served by the bridge itself.
    let file = app.server.get(&format!("/files/{}", mp4_path)).await;
    assert_eq!(file.status_code(), StatusCode::OK);
    assert_eq!(file.as_bytes().as_ref(), b"encoded video");

    // Late events for a finished job are acknowledged but ignored.
    let late = app
        .server
        .post("/api/v1/notifications")
        .add_query_param("token", TOKEN)
        .json(&json!({"job_id": "remote-1", "event": "job.processing"}))
        .await;
    assert_eq!(late.status_code(), StatusCode::OK);
    let late: Value = late.json();
    assert_eq!(late["applied"], false);
}

#[tokio::test]
async fn test_upload_without_pending_output_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .server
        .post("/api/v1/uploads")
        .add_query_param("volume", "local")
        .add_query_param("path", "intro/unexpected.mp4")
        .add_query_param("token", upload_token_for("intro/unexpected.mp4"))
        .bytes(Bytes::from_static(b"data"))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let traversal = app
        .server
        .post("/api/v1/uploads")
        .add_query_param("volume", "local")
        .add_query_param("path", "../etc/passwd")
        .add_query_param("token", upload_token_for("../etc/passwd"))
        .bytes(Bytes::from_static(b"data"))
        .await;
    assert_eq!(traversal.status_code(), StatusCode::BAD_REQUEST);

    let empty = app
        .server
        .post("/api/v1/uploads")
        .add_query_param("volume", "local")
        .add_query_param("path", "intro/mp4.mp4")
        .add_query_param("token", upload_token_for("intro/mp4.mp4"))
        .await;
    assert_eq!(empty.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_requires_signed_token() {
    let app = spawn_app().await;

    let created: Value = app
        .server
        .post("/api/v1/transcode")
        .json(&transcode_body(&["mp4"]))
        .await
        .json();
    let path = output_path(&created, "mp4");

    // The URL handed to Coconut already carries the token.
    let payload = app.api.last_payload();
    let upload_url = payload.outputs["mp4"]["url"].as_str().unwrap().to_string();
    assert!(upload_url.ends_with(&format!("&token={}", upload_token_for(&path))));

    let missing = app
        .server
        .put("/api/v1/uploads")
        .add_query_param("volume", "local")
        .add_query_param("path", &path)
        .bytes(Bytes::from_static(b"video"))
        .await;
    assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .server
        .put("/api/v1/uploads")
        .add_query_param("volume", "local")
        .add_query_param("path", &path)
        .add_query_param("token", upload_token_for("intro/other.mp4"))
        .bytes(Bytes::from_static(b"video"))
        .await;
    assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);
    assert!(!app.dir.path().join(&path).exists());

    let signed = app
        .server
        .put("/api/v1/uploads")
        .add_query_param("volume", "local")
        .add_query_param("path", &path)
        .add_query_param("token", upload_token_for(&path))
        .bytes(Bytes::from_static(b"video"))
        .await;
    assert_eq!(signed.status_code(), StatusCode::CREATED);
    assert!(app.dir.path().join(&path).exists());
}

#[tokio::test]
async fn test_cancel_job() {
    let app = spawn_app().await;

    let created: Value = app
        .server
        .post("/api/v1/transcode")
        .json(&transcode_body(&["mp4"]))
        .await
        .json();
    let job_id = created["job"]["id"].as_str().unwrap().to_string();

    let response = app
        .server
        .post(&format!("/api/v1/jobs/{}/cancel", job_id))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let job: Value = response.json();
    assert_eq!(job["status"], "cancelled");
    assert_eq!(job["outputs"][0]["status"], "errored");

    let again = app
        .server
        .post(&format!("/api/v1/jobs/{}/cancel", job_id))
        .await;
    assert_eq!(again.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_get_unknown_job() {
    let app = spawn_app().await;

    let response = app
        .server
        .get(&format!("/api/v1/jobs/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_and_clear_outputs() {
    let app = spawn_app().await;

    app.server
        .post("/api/v1/transcode")
        .json(&transcode_body(&["mp4", "webm"]))
        .await
        .assert_status(StatusCode::CREATED);

    let listed: Value = app
        .server
        .get("/api/v1/outputs")
        .add_query_param("source", INPUT)
        .await
        .json();
    assert_eq!(listed["count"], 2);

    let cleared = app
        .server
        .delete("/api/v1/outputs")
        .add_query_param("source", INPUT)
        .await;
    assert_eq!(cleared.status_code(), StatusCode::OK);
    let report: Value = cleared.json();
    assert_eq!(report["deleted_outputs"], 2);
    // The job is still running, so it is kept.
    assert_eq!(report["pruned_jobs"], 0);
    assert_eq!(app.repo.output_count().await, 0);

    let blank = app
        .server
        .get("/api/v1/outputs")
        .add_query_param("source", " ")
        .await;
    assert_eq!(blank.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_reports_failures() {
    let app = spawn_app().await;

    let response = app
        .server
        .post("/api/v1/transcode/batch")
        .json(&json!({"items": [
            transcode_body(&["mp4"]),
            {"input": "https://cdn.example.com/videos/outro.mov",
             "outputs": [{"format": "mp4", "volume": "missing"}]}
        ]}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let report: Value = response.json();
    assert_eq!(report["submitted"], 1);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["errors"][0]["index"], 1);
}
