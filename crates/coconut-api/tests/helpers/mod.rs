#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::TestServer;
use coconut_api::setup::routes::setup_routes;
use coconut_api::setup::services::build_transcoding_service;
use coconut_api::AppState;
use coconut_core::{Config, Hook, TranscodingEvents};
use coconut_db::InMemoryTranscodeRepository;
use coconut_services::{JobPayload, RemoteError, RemoteJob, TranscodingApi};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const BASE_URL: &str = "https://bridge.example.com";
pub const TOKEN: &str = "notify-secret";
pub const INPUT: &str = "https://cdn.example.com/videos/intro.mov";

/// Records submitted payloads instead of calling Coconut.
#[derive(Default)]
pub struct FakeApi {
    payloads: Mutex<Vec<JobPayload>>,
    failure: Mutex<Option<RemoteError>>,
    counter: AtomicUsize,
}

impl FakeApi {
    pub fn failing(err: RemoteError) -> Self {
        Self {
            failure: Mutex::new(Some(err)),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    pub fn last_payload(&self) -> JobPayload {
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
            status: Some("job.starting".to_string()),
            progress: None,
        })
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub api: Arc<FakeApi>,
    pub repo: Arc<InMemoryTranscodeRepository>,
    pub dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(FakeApi::default()).await
}

/// Full router over an in-memory repository and a local volume in a temp dir.
pub async fn spawn_app_with(api: FakeApi) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let storage_path = dir.path().to_str().unwrap().to_string();

    let config = Config::from_lookup(|key| match key {
        "COCONUT_API_KEY" => Some("test-key".to_string()),
        "PUBLIC_BASE_URL" => Some(BASE_URL.to_string()),
        "NOTIFICATION_TOKEN" => Some(TOKEN.to_string()),
        "LOCAL_STORAGE_PATH" => Some(storage_path.clone()),
        _ => None,
    })
    .expect("test config");

    let repo = Arc::new(InMemoryTranscodeRepository::new());
    let api = Arc::new(api);
    let service = build_transcoding_service(
        &config,
        repo.clone(),
        api.clone(),
        Arc::new(TranscodingEvents::new()),
        &Hook::new(),
    )
    .await
    .expect("transcoding service");

    let state = Arc::new(AppState::new(config.clone(), Arc::new(service), None));
    let router = setup_routes(&config, state).expect("router");
    let server = TestServer::new(router.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        api,
        repo,
        dir,
    }
}
