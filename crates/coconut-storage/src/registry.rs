//! Adapter registry for resolving volumes to their adapters

use std::collections::HashMap;
use std::sync::Arc;

use coconut_core::models::Volume;
use coconut_core::Hook;

use crate::adapter::{GenericAdapter, S3Adapter, VolumeAdapter, GENERIC_ADAPTER, S3_ADAPTER};
use crate::{StorageError, StorageResult};

pub type AdapterFactory =
    Arc<dyn Fn(&Volume) -> StorageResult<Box<dyn VolumeAdapter>> + Send + Sync>;

/// Fired once while the registry is built so listeners can add or replace factories.
#[derive(Default)]
pub struct RegisterVolumeAdapters {
    factories: Vec<(String, AdapterFactory)>,
}

impl RegisterVolumeAdapters {
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&Volume) -> StorageResult<Box<dyn VolumeAdapter>> + Send + Sync + 'static,
    {
        self.factories.push((kind.into(), Arc::new(factory)));
    }
}

/// Registry of adapter factories keyed by volume type tag.
#[derive(Clone)]
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    /// Create a registry with the built-in adapters only
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self::with_upload_secret(public_base_url, None)
    }

    /// Create a registry with the built-in adapters, signing upload proxy URLs
    /// with `upload_secret` when set.
    pub fn with_upload_secret(
        public_base_url: impl Into<String>,
        upload_secret: Option<String>,
    ) -> Self {
        let public_base_url = public_base_url.into();
        let mut factories: HashMap<String, AdapterFactory> = HashMap::new();

        factories.insert(
            GENERIC_ADAPTER.to_string(),
            Arc::new(move |volume: &Volume| -> StorageResult<Box<dyn VolumeAdapter>> {
                let adapter = GenericAdapter::new(volume, &public_base_url)?
                    .with_upload_secret(upload_secret.clone());
                Ok(Box::new(adapter) as Box<dyn VolumeAdapter>)
            }),
        );
        factories.insert(
            S3_ADAPTER.to_string(),
            Arc::new(|volume: &Volume| -> StorageResult<Box<dyn VolumeAdapter>> {
                let adapter = S3Adapter::new(volume)?;
                Ok(Box::new(adapter) as Box<dyn VolumeAdapter>)
            }),
        );

        Self { factories }
    }

    /// Create a registry with the built-in adapters, then let `hook` listeners
    /// register theirs. Later registrations replace earlier ones.
    pub fn with_hook(
        public_base_url: impl Into<String>,
        hook: &Hook<RegisterVolumeAdapters>,
    ) -> Self {
        Self::new(public_base_url).extend_from_hook(hook)
    }

    /// Let `hook` listeners register their factories on top of this registry.
    pub fn extend_from_hook(mut self, hook: &Hook<RegisterVolumeAdapters>) -> Self {
        let mut event = RegisterVolumeAdapters::default();
        hook.trigger(&mut event);
        for (kind, factory) in event.factories {
            tracing::debug!(kind = %kind, "Registering volume adapter");
            self.factories.insert(kind, factory);
        }
        self
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: AdapterFactory) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Build the adapter for `volume`.
    pub fn adapter_for(&self, volume: &Volume) -> StorageResult<Box<dyn VolumeAdapter>> {
        let factory = self
            .factories
            .get(&volume.kind)
            .ok_or_else(|| StorageError::UnknownAdapter(volume.kind.clone()))?;
        factory(volume)
    }

    /// Sorted list of registered type tags.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
