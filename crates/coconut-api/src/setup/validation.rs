//! Configuration validation
//!
//! Validates critical configuration values at startup to catch misconfigurations early.

use anyhow::Result;
use coconut_core::models::VolumeSet;
use coconut_core::Config;
use coconut_storage::AdapterRegistry;

/// Validate critical configuration values
///
/// Runs the config's own checks, then the startup-only ones that need the
/// database settings or the loaded volumes.
pub fn validate_config(config: &Config) -> Result<()> {
    config.validate()?;

    if config.database_url().is_some() {
        if config.db_max_connections() == 0 {
            return Err(anyhow::anyhow!("Database max connections cannot be 0"));
        }
        if config.db_timeout_seconds() == 0 {
            return Err(anyhow::anyhow!("Database timeout cannot be 0"));
        }
    } else if config.is_production() {
        tracing::warn!("DATABASE_URL not set in production - jobs are kept in memory only");
    }

    if config.is_production() && config.public_base_url().contains("localhost") {
        tracing::warn!(
            public_base_url = %config.public_base_url(),
            "PUBLIC_BASE_URL points at localhost - Coconut will not reach the notification endpoint"
        );
    }

    Ok(())
}

/// Build an adapter for every volume so bad credentials or missing settings
/// stop the service at startup instead of on the first submission.
pub fn validate_volumes(volumes: &VolumeSet, adapters: &AdapterRegistry) -> Result<()> {
    for volume in volumes.iter() {
        adapters.adapter_for(volume).map_err(|e| {
            anyhow::anyhow!("Volume '{}' is misconfigured: {}", volume.handle, e)
        })?;
    }
    Ok(())
}
