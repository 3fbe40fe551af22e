//! Application state shared by all handlers.

use coconut_core::Config;
use coconut_services::TranscodingService;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub transcoding: Arc<TranscodingService>,
    /// `None` when running on the in-memory repository.
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn new(config: Config, transcoding: Arc<TranscodingService>, db_pool: Option<PgPool>) -> Self {
        Self {
            config,
            transcoding,
            db_pool,
        }
    }
}
