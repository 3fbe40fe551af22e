//! Service initialization and application state setup

use crate::setup::validation::validate_volumes;
use crate::state::AppState;
use anyhow::{Context, Result};
use coconut_core::{Config, Hook, StorageBackend, TranscodingEvents};
use coconut_db::TranscodeRepository;
use coconut_services::{
    create_volume_storage, AdapterRegistry, CoconutClient, RegisterVolumeAdapters, TranscodingApi,
    TranscodingService,
};
use sqlx::PgPool;
use std::sync::Arc;

/// Initialize all services, returning the application state
pub async fn initialize_services(
    config: &Config,
    repository: Arc<dyn TranscodeRepository>,
    db_pool: Option<PgPool>,
) -> Result<Arc<AppState>> {
    let client = CoconutClient::new(
        config.coconut_api_url(),
        config.coconut_api_key(),
        config.coconut_timeout_seconds(),
    )?;
    tracing::info!(
        api_url = %config.coconut_api_url(),
        timeout_seconds = config.coconut_timeout_seconds(),
        "Coconut client initialized"
    );

    let transcoding = build_transcoding_service(
        config,
        repository,
        Arc::new(client),
        Arc::new(TranscodingEvents::new()),
        &Hook::new(),
    )
    .await?;

    Ok(Arc::new(AppState::new(
        config.clone(),
        Arc::new(transcoding),
        db_pool,
    )))
}

/// Wire the transcoding service: volumes, adapters and the byte storage of
/// every volume with a built-in backend.
///
/// `adapter_hook` listeners may register adapters for extra volume kinds.
pub async fn build_transcoding_service(
    config: &Config,
    repository: Arc<dyn TranscodeRepository>,
    api: Arc<dyn TranscodingApi>,
    events: Arc<TranscodingEvents>,
    adapter_hook: &Hook<RegisterVolumeAdapters>,
) -> Result<TranscodingService> {
    let volumes = config.load_volumes().context("Failed to load volumes")?;
    let adapters = AdapterRegistry::with_upload_secret(
        config.public_base_url(),
        config.notification_token().map(str::to_string),
    )
    .extend_from_hook(adapter_hook);
    validate_volumes(&volumes, &adapters)?;

    let mut backends = Vec::new();
    for volume in volumes.iter() {
        if volume.kind.parse::<StorageBackend>().is_err() {
            tracing::debug!(
                volume = %volume.handle,
                kind = %volume.kind,
                "Volume has no built-in storage backend"
            );
            continue;
        }
        let storage = create_volume_storage(volume)
            .await
            .with_context(|| format!("Failed to initialize storage for volume '{}'", volume.handle))?;
        backends.push((volume.handle.clone(), storage));
    }

    tracing::info!(
        volumes = volumes.len(),
        default_volume = ?volumes.default_handle(),
        storage_backends = backends.len(),
        "Volumes loaded"
    );

    let mut service = TranscodingService::new(
        repository,
        api,
        volumes,
        adapters,
        config.notification_url(),
    )
    .with_events(events);
    for (handle, storage) in backends {
        service = service.with_storage(handle, storage);
    }

    Ok(service)
}
