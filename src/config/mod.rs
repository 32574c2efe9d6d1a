use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_CHAT_MAX_CALLS: u32 = 60;
const DEFAULT_CHAT_WINDOW_SECS: u64 = 3600;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── AuthConfig ───────────────────────────────────────────────────────────────

/// Token signing configuration (`[auth]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret.  None = generate one on first start and persist
    /// it to `{data_dir}/jwt_secret`.  Also settable via `TODOD_JWT_SECRET`.
    pub secret: Option<String>,
    /// Access token lifetime in hours (default: 24).
    pub token_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
        }
    }
}

// ─── CorsConfig ───────────────────────────────────────────────────────────────

/// Allowed browser origins (`[cors]` in config.toml).
///
/// A single `"*"` entry allows any origin but disables credentials — the two
/// are mutually exclusive at the HTTP level.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://127.0.0.1:3001".to_string(),
            ],
        }
    }
}

// ─── LimitsConfig ─────────────────────────────────────────────────────────────

/// Chat rate limit (`[limits]` in config.toml).
///
/// A single global fixed window — not partitioned per caller.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum chat calls per window (default: 60).
    pub chat_max_calls: u32,
    /// Window length in seconds (default: 3600).
    pub chat_window_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            chat_max_calls: DEFAULT_CHAT_MAX_CALLS,
            chat_window_secs: DEFAULT_CHAT_WINDOW_SECS,
        }
    }
}

// ─── ObservabilityConfig ─────────────────────────────────────────────────────

/// Observability configuration (`[observability]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log SQLite queries that exceed this threshold (milliseconds). Default: 100.
    /// Set to 0 to disable slow query logging.
    pub slow_query_threshold_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 100,
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// HTTP server port (default: 8000).
    port: Option<u16>,
    /// Log level filter string, e.g. "debug", "info,todod=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json" (structured for log aggregators).
    log_format: Option<String>,
    /// Bind address for the HTTP server (default: "127.0.0.1"; use "0.0.0.0" for LAN access).
    bind_address: Option<String>,
    /// Token signing configuration (`[auth]`).
    auth: Option<AuthConfig>,
    /// Allowed browser origins (`[cors]`).
    cors: Option<CorsConfig>,
    /// Chat rate limit (`[limits]`).
    limits: Option<LimitsConfig>,
    /// Observability configuration (`[observability]`).
    observability: Option<ObservabilityConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
    /// Bind address for the HTTP server (TODOD_BIND env var, default: "127.0.0.1").
    pub bind_address: String,
    /// Token signing — secret source and TTL.
    pub auth: AuthConfig,
    /// Allowed browser origins.
    pub cors: CorsConfig,
    /// Chat rate limit — global fixed window.
    pub limits: LimitsConfig,
    /// Observability: slow query threshold.
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let log_format = std::env::var("TODOD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let bind_address = bind_address
            .or(std::env::var("TODOD_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let mut auth = toml.auth.unwrap_or_default();
        if let Some(secret) = std::env::var("TODOD_JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
        {
            auth.secret = Some(secret);
        }

        let cors = toml.cors.unwrap_or_default();
        let limits = toml.limits.unwrap_or_default();
        let observability = toml.observability.unwrap_or_default();

        Self {
            port,
            data_dir,
            log,
            log_format,
            bind_address,
            auth,
            cors,
            limits,
            observability,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/todod
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("todod");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/todod or ~/.local/share/todod
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("todod");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("todod");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\todod
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("todod");
        }
    }
    // Fallback
    PathBuf::from(".todod")
}
