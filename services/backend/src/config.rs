use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Fallback location for application data when `APP_DATA_DIRECTORY` is unset
pub const DEFAULT_APP_DATA_DIRECTORY: &str = "/tmp/presenton";

/// Main configuration for the backend service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Database pool configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Database pool configuration.
///
/// The connection URL itself comes from `DATABASE_URL` through the
/// connection resolver, not from here.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Region passed to the S3 client
    #[serde(default = "default_region")]
    pub region: String,
    /// S3-compatible endpoint
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    /// Force path-style access
    #[serde(default = "default_true")]
    pub force_path_style: bool,
}

// Default value functions
fn default_service_name() -> String {
    "presenton-backend".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_endpoint_url() -> String {
    "https://storage.googleapis.com".to_string()
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "presenton-backend")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .add_source(config::File::with_name("config/presenton").required(false))
            .add_source(config::File::with_name("/etc/presenton/backend").required(false))
            // PRESENTON__API__PORT -> api.port
            .add_source(
                config::Environment::with_prefix("PRESENTON")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: default_endpoint_url(),
            force_path_style: true,
        }
    }
}

/// Raw values of the unprefixed environment variables the service reads.
///
/// Values are kept exactly as found; callers normalize them with
/// [`normalize_env_value`] at the point of use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    /// `DATABASE_URL`
    pub database_url: Option<String>,
    /// `APP_DATA_DIRECTORY`
    pub app_data_directory: Option<String>,
    /// `GCS_BUCKET`
    pub gcs_bucket: Option<String>,
    /// `GCS_PREFIX`
    pub gcs_prefix: Option<String>,
    /// `IMAGE_PROVIDER`
    pub image_provider: Option<String>,
    /// `DISABLE_IMAGE_GENERATION`
    pub disable_image_generation: Option<String>,
}

impl EnvSnapshot {
    /// Capture the current process environment
    pub fn from_env() -> Self {
        let read = |name: &str| env::var(name).ok();

        Self {
            database_url: read("DATABASE_URL"),
            app_data_directory: read("APP_DATA_DIRECTORY"),
            gcs_bucket: read("GCS_BUCKET"),
            gcs_prefix: read("GCS_PREFIX"),
            image_provider: read("IMAGE_PROVIDER"),
            disable_image_generation: read("DISABLE_IMAGE_GENERATION"),
        }
    }

    /// Application data directory, falling back to `/tmp/presenton`
    pub fn app_data_directory(&self) -> String {
        normalize_env_value(self.app_data_directory.as_deref())
            .unwrap_or_else(|| DEFAULT_APP_DATA_DIRECTORY.to_string())
    }
}

/// Clean up a raw environment value.
///
/// Surrounding whitespace is trimmed and one matching pair of `"` or `'`
/// quotes is removed. Empty values and the sentinels `none`/`null` (any
/// case) are treated as unset.
pub fn normalize_env_value(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }

    let unquoted = match strip_matching_quotes(trimmed) {
        Some(inner) => inner.trim(),
        None => trimmed,
    };

    if unquoted.is_empty()
        || unquoted.eq_ignore_ascii_case("none")
        || unquoted.eq_ignore_ascii_case("null")
    {
        return None;
    }

    Some(unquoted.to_string())
}

/// A lone quote character counts as both ends and yields an empty string.
fn strip_matching_quotes(value: &str) -> Option<&str> {
    ['"', '\'']
        .into_iter()
        .find(|&quote| value.starts_with(quote) && value.ends_with(quote))
        .map(|_| value.get(1..value.len() - 1).unwrap_or(""))
}
