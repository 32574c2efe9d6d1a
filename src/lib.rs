pub mod agent;
pub mod auth;
pub mod config;
pub mod rest;
pub mod storage;

use std::sync::Arc;

use config::AppConfig;
use storage::Storage;

/// Shared application state passed to every route handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub storage: Arc<Storage>,
    pub started_at: std::time::Instant,
    /// HS256 secret used to mint and verify bearer tokens.  Resolved once at
    /// startup: env var > config.toml > generated and persisted under the
    /// data dir.  Never an empty string.
    pub jwt_secret: String,
}
