//! Configuration loading and types.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct, then selected fields may be overridden from the
//! environment (see [`apply_env_overrides`]).  Each subsection governs a
//! different part of the system: the HTTP listener, the object store
//! connection, the installed extensions, and logging.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Object store connection settings.
    #[serde(default)]
    pub minio: MinioConfig,

    /// Object store backend selection.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Extension settings.
    #[serde(default)]
    pub ext: ExtensionsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// TLS certificate and key.  HTTPS is served only when both are set.
    #[serde(default)]
    pub ssl: SslConfig,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ssl: SslConfig::default(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// TLS certificate configuration (PEM files).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SslConfig {
    /// Path to the certificate chain.
    #[serde(default)]
    pub cert: String,
    /// Path to the private key.
    #[serde(default)]
    pub key: String,
}

impl SslConfig {
    /// Whether both certificate and key are configured.
    pub fn enabled(&self) -> bool {
        !self.cert.is_empty() && !self.key.is_empty()
    }
}

/// S3-compatible endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MinioConfig {
    /// Endpoint as `host:port`, or a full URL.  Empty means AWS default.
    #[serde(default)]
    pub endpoint: String,
    /// Access key (falls back to the AWS credential chain when empty).
    #[serde(alias = "accesskey", default)]
    pub access_key: String,
    /// Secret key (falls back to the AWS credential chain when empty).
    #[serde(alias = "secretkey", default)]
    pub secret_key: String,
    /// Use HTTPS when the endpoint carries no scheme.
    #[serde(default)]
    pub secure: bool,
    /// Region; empty means `us-east-1`.
    #[serde(default)]
    pub region: String,
    /// Force path-style addressing (required by MinIO).
    #[serde(default = "default_true")]
    pub path_style: bool,
}

impl Default for MinioConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            secure: false,
            region: String::new(),
            path_style: true,
        }
    }
}

/// Object store backend selection.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `s3` or `memory`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

/// Extension settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionsConfig {
    /// Static bucket name.  Empty means "first path segment is the bucket".
    #[serde(alias = "bucketname", default)]
    pub bucket_name: String,

    /// Static key prefix prepended to every object key.
    #[serde(default)]
    pub prefix: String,

    /// Comma-separated list of index filenames (spaces are ignored).
    #[serde(alias = "defaulthtml", default)]
    pub default_html: String,

    /// Path to a fallback favicon file.  Empty disables the extension.
    #[serde(default)]
    pub favicon: String,

    /// Maximum number of cached resources.  0 disables caching.
    #[serde(alias = "cachesize", default = "default_cache_size")]
    pub cache_size: usize,

    /// Resources at least this large (bytes) are never cached.
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: u64,

    /// Time-to-live of a cached resource, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Path to the HTML template used to render markdown.  Empty disables
    /// markdown rendering.
    #[serde(alias = "markdowntemplate", default)]
    pub markdown_template: String,

    /// Render a listing when nothing else resolves a request.
    #[serde(alias = "listfolder", default)]
    pub list_folder: bool,

    /// Glob for objects to include in listings.  Empty lists folders only.
    #[serde(alias = "listfolderobjects", default)]
    pub list_folder_objects: String,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            bucket_name: String::new(),
            prefix: String::new(),
            default_html: String::new(),
            favicon: String::new(),
            cache_size: default_cache_size(),
            max_cache_size: default_max_cache_size(),
            cache_ttl_seconds: default_cache_ttl(),
            markdown_template: String::new(),
            list_folder: false,
            list_folder_objects: String::new(),
        }
    }
}

impl ExtensionsConfig {
    /// Index filenames parsed from `default_html`, in order.
    pub fn index_files(&self) -> Vec<String> {
        self.default_html
            .replace(' ', "")
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default)]
    pub metrics: bool,
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_storage_backend() -> String {
    "s3".to_string()
}

fn default_cache_size() -> usize {
    1000
}

fn default_max_cache_size() -> u64 {
    10 * 1024 * 1024 // 10 MiB
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

/// Override configuration fields from environment variables.
///
/// Recognized variables: `MINIO_ENDPOINT`, `MINIO_ACCESS_KEY`,
/// `MINIO_SECRET_KEY`, `MINIO_SECURE`, `MINIO_REGION`, `EXT_BUCKET_NAME`,
/// `EXT_PREFIX`, `SERVER_PORT`.
pub fn apply_env_overrides(config: &mut Config) -> anyhow::Result<()> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

fn apply_overrides<F>(config: &mut Config, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("MINIO_ENDPOINT") {
        config.minio.endpoint = v;
    }
    if let Some(v) = lookup("MINIO_ACCESS_KEY") {
        config.minio.access_key = v;
    }
    if let Some(v) = lookup("MINIO_SECRET_KEY") {
        config.minio.secret_key = v;
    }
    if let Some(v) = lookup("MINIO_SECURE") {
        config.minio.secure = v
            .parse()
            .map_err(|_| anyhow::anyhow!("MINIO_SECURE must be true or false, got '{v}'"))?;
    }
    if let Some(v) = lookup("MINIO_REGION") {
        config.minio.region = v;
    }
    if let Some(v) = lookup("EXT_BUCKET_NAME") {
        config.ext.bucket_name = v;
    }
    if let Some(v) = lookup("EXT_PREFIX") {
        config.ext.prefix = v;
    }
    if let Some(v) = lookup("SERVER_PORT") {
        config.server.port = v
            .parse()
            .map_err(|_| anyhow::anyhow!("SERVER_PORT must be a port number, got '{v}'"))?;
    }
    Ok(())
}
